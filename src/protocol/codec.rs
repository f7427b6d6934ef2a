//! Wire codec
//!
//! Two message shapes share one byte stream:
//!
//! ```text
//! Text slot:     [64 bytes UTF-8, NUL padded]
//! Binary frame:  [u64 LE length][length bytes]
//! ```
//!
//! In legacy framing nothing marks which shape comes next. The reader peeks a
//! full text slot and, if it is not valid UTF-8, treats those bytes as the
//! start of a binary frame. Tagged framing prefixes every message with a type
//! byte instead (`0x01` text, `0x02` binary).
//!
//! Broadcast snapshots going to displays always use the binary frame shape:
//!
//! ```text
//! u32 camera_count
//!   u16 id_len | id (UTF-8 peer address)
//!   u32 width | u32 height
//!   u32 frame_count
//!     u64 frame_len | frame bytes
//! ```

use std::net::SocketAddr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, ProtocolError, Result};
use crate::registry::{BroadcastSnapshot, CameraSnapshot};

use super::constants::*;

/// How messages are delimited on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Untagged; binary frames are detected by UTF-8 decode failure
    #[default]
    Legacy,
    /// Every message starts with a one-byte type tag
    Tagged,
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Trimmed contents of a text slot
    Text(String),
    /// Binary frame payload
    Binary(Bytes),
}

/// Buffered message reader over any async byte stream
pub struct FrameReader<R> {
    reader: R,
    buf: BytesMut,
    framing: Framing,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, framing: Framing, max_frame_size: usize) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(TEXT_SLOT_SIZE * 2),
            framing,
            max_frame_size,
        }
    }

    /// Read the next message of either shape
    pub async fn read_message(&mut self) -> Result<Message> {
        match self.framing {
            Framing::Legacy => {
                self.fill(TEXT_SLOT_SIZE).await?;
                match decode_slot(&self.buf[..TEXT_SLOT_SIZE]) {
                    Some(text) => {
                        self.buf.advance(TEXT_SLOT_SIZE);
                        Ok(Message::Text(text))
                    }
                    // Peeked bytes stay buffered as the start of the frame
                    None => self.read_binary_body().await.map(Message::Binary),
                }
            }
            Framing::Tagged => match self.read_tag().await? {
                TAG_TEXT => self.read_slot().await.map(Message::Text),
                TAG_BINARY => self.read_binary_body().await.map(Message::Binary),
                tag => Err(ProtocolError::UnknownTag(tag).into()),
            },
        }
    }

    /// Read a message that must be a text slot (dimensions, motion flag)
    pub async fn read_text(&mut self) -> Result<String> {
        match self.framing {
            Framing::Legacy => self.read_slot().await,
            Framing::Tagged => match self.read_tag().await? {
                TAG_TEXT => self.read_slot().await,
                TAG_BINARY => {
                    // Drain the frame so the stream stays aligned
                    self.read_binary_body().await?;
                    Err(ProtocolError::ExpectedText.into())
                }
                tag => Err(ProtocolError::UnknownTag(tag).into()),
            },
        }
    }

    /// Read a message that must be a binary frame (after `stream`)
    pub async fn read_binary(&mut self) -> Result<Bytes> {
        match self.framing {
            Framing::Legacy => self.read_binary_body().await,
            Framing::Tagged => match self.read_tag().await? {
                TAG_BINARY => self.read_binary_body().await,
                TAG_TEXT => {
                    self.read_slot().await?;
                    Err(ProtocolError::ExpectedBinary.into())
                }
                tag => Err(ProtocolError::UnknownTag(tag).into()),
            },
        }
    }

    /// Read and decode one broadcast snapshot
    pub async fn read_snapshot(&mut self) -> Result<BroadcastSnapshot> {
        let body = self.read_binary_body().await?;
        decode_snapshot(body)
    }

    async fn read_tag(&mut self) -> Result<u8> {
        self.fill(1).await?;
        Ok(self.buf.get_u8())
    }

    async fn read_slot(&mut self) -> Result<String> {
        self.fill(TEXT_SLOT_SIZE).await?;
        let slot = self.buf.split_to(TEXT_SLOT_SIZE);
        decode_slot(&slot).ok_or_else(|| ProtocolError::ExpectedText.into())
    }

    async fn read_binary_body(&mut self) -> Result<Bytes> {
        self.fill(LENGTH_HEADER_SIZE).await?;

        let mut header = [0u8; LENGTH_HEADER_SIZE];
        header.copy_from_slice(&self.buf[..LENGTH_HEADER_SIZE]);
        let size = u64::from_le_bytes(header);

        if size > self.max_frame_size as u64 {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            }
            .into());
        }

        let size = size as usize;
        self.fill(LENGTH_HEADER_SIZE + size).await?;
        self.buf.advance(LENGTH_HEADER_SIZE);
        Ok(self.buf.split_to(size).freeze())
    }

    /// Buffer at least `n` bytes, or fail with `ConnectionClosed` on EOF
    async fn fill(&mut self, n: usize) -> Result<()> {
        while self.buf.len() < n {
            self.buf.reserve(n - self.buf.len());
            let read = self.reader.read_buf(&mut self.buf).await?;
            if read == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
        Ok(())
    }
}

/// Decode a text slot, trimming NUL padding and whitespace
///
/// Returns `None` if the slot is not valid UTF-8.
pub fn decode_slot(slot: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(slot).ok()?;
    Some(
        text.trim_end_matches('\0')
            .trim_matches(|c: char| c.is_ascii_whitespace())
            .to_string(),
    )
}

/// Encode a text slot; text longer than a slot is cut at a char boundary
pub fn encode_text(text: &str, framing: Framing) -> Bytes {
    let mut end = text.len().min(TEXT_SLOT_SIZE);
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    let mut buf = BytesMut::with_capacity(TEXT_SLOT_SIZE + 1);
    if framing == Framing::Tagged {
        buf.put_u8(TAG_TEXT);
    }
    buf.put_slice(&text.as_bytes()[..end]);
    buf.put_bytes(0, TEXT_SLOT_SIZE - end);
    buf.freeze()
}

/// Encode a length-prefixed binary frame
pub fn encode_binary(payload: &[u8], framing: Framing) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + LENGTH_HEADER_SIZE + payload.len());
    if framing == Framing::Tagged {
        buf.put_u8(TAG_BINARY);
    }
    buf.put_u64_le(payload.len() as u64);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encode a snapshot as one length-prefixed message
pub fn encode_snapshot(snapshot: &BroadcastSnapshot) -> Bytes {
    let body_len: usize = 4 + snapshot
        .cameras
        .iter()
        .map(|c| {
            2 + c.id.to_string().len()
                + 12
                + c.frames
                    .iter()
                    .map(|f| LENGTH_HEADER_SIZE + f.len())
                    .sum::<usize>()
        })
        .sum::<usize>();

    let mut buf = BytesMut::with_capacity(LENGTH_HEADER_SIZE + body_len);
    buf.put_u64_le(body_len as u64);
    buf.put_u32_le(snapshot.cameras.len() as u32);

    for camera in &snapshot.cameras {
        let id = camera.id.to_string();
        buf.put_u16_le(id.len() as u16);
        buf.put_slice(id.as_bytes());
        buf.put_u32_le(camera.width);
        buf.put_u32_le(camera.height);
        buf.put_u32_le(camera.frames.len() as u32);
        for frame in &camera.frames {
            buf.put_u64_le(frame.len() as u64);
            buf.put_slice(frame);
        }
    }

    debug_assert_eq!(buf.len(), LENGTH_HEADER_SIZE + body_len);
    buf.freeze()
}

/// Decode a snapshot body (without its length header)
pub fn decode_snapshot(mut body: Bytes) -> Result<BroadcastSnapshot> {
    let malformed = || Error::from(ProtocolError::MalformedSnapshot);

    if body.remaining() < 4 {
        return Err(malformed());
    }
    let count = body.get_u32_le() as usize;
    let mut cameras = Vec::with_capacity(count.min(64));

    for _ in 0..count {
        if body.remaining() < 2 {
            return Err(malformed());
        }
        let id_len = body.get_u16_le() as usize;
        if body.remaining() < id_len + 12 {
            return Err(malformed());
        }
        let id_bytes = body.split_to(id_len);
        let id: SocketAddr = std::str::from_utf8(&id_bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(malformed)?;

        let width = body.get_u32_le();
        let height = body.get_u32_le();
        let frame_count = body.get_u32_le() as usize;

        let mut frames = Vec::with_capacity(frame_count.min(1024));
        for _ in 0..frame_count {
            if body.remaining() < LENGTH_HEADER_SIZE {
                return Err(malformed());
            }
            let len = body.get_u64_le() as usize;
            if body.remaining() < len {
                return Err(malformed());
            }
            frames.push(body.split_to(len));
        }

        cameras.push(CameraSnapshot {
            id,
            width,
            height,
            frames,
        });
    }

    Ok(BroadcastSnapshot::new(cameras))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn slot(text: &str) -> Vec<u8> {
        encode_text(text, Framing::Legacy).to_vec()
    }

    #[test]
    fn test_encode_text_pads_slot() {
        let encoded = encode_text("stream", Framing::Legacy);
        assert_eq!(encoded.len(), TEXT_SLOT_SIZE);
        assert_eq!(&encoded[..6], b"stream");
        assert!(encoded[6..].iter().all(|b| *b == 0));

        let tagged = encode_text("stream", Framing::Tagged);
        assert_eq!(tagged.len(), TEXT_SLOT_SIZE + 1);
        assert_eq!(tagged[0], TAG_TEXT);
    }

    #[test]
    fn test_encode_text_truncates_on_char_boundary() {
        let long = "é".repeat(40); // 80 bytes
        let encoded = encode_text(&long, Framing::Legacy);
        assert_eq!(encoded.len(), TEXT_SLOT_SIZE);
        assert_eq!(decode_slot(&encoded).unwrap(), "é".repeat(32));
    }

    #[test]
    fn test_decode_slot_rejects_invalid_utf8() {
        let mut bytes = vec![0xffu8; TEXT_SLOT_SIZE];
        bytes[0] = 0xe8;
        assert!(decode_slot(&bytes).is_none());
    }

    #[tokio::test]
    async fn test_read_commands_split_across_reads() {
        let data = slot("camera_join");
        let mock = Builder::new()
            .read(&data[..10])
            .read(&data[10..])
            .read(&slot("640x480"))
            .build();
        let mut reader = FrameReader::new(mock, Framing::Legacy, DEFAULT_MAX_FRAME_SIZE);

        assert_eq!(
            reader.read_message().await.unwrap(),
            Message::Text("camera_join".into())
        );
        assert_eq!(reader.read_text().await.unwrap(), "640x480");
    }

    #[tokio::test]
    async fn test_read_binary_after_stream() {
        let mock = Builder::new()
            .read(&slot("stream"))
            .read(&encode_binary(b"tiny", Framing::Legacy))
            .build();
        let mut reader = FrameReader::new(mock, Framing::Legacy, DEFAULT_MAX_FRAME_SIZE);

        assert_eq!(
            reader.read_message().await.unwrap(),
            Message::Text("stream".into())
        );
        assert_eq!(reader.read_binary().await.unwrap(), Bytes::from_static(b"tiny"));
    }

    #[tokio::test]
    async fn test_legacy_detects_binary_by_decode_failure() {
        // 0xff bytes can never be UTF-8, so the peeked slot is rejected
        let payload = vec![0xffu8; 100];
        let frame = encode_binary(&payload, Framing::Legacy);
        let mock = Builder::new().read(&frame).read(&slot("store_video")).build();
        let mut reader = FrameReader::new(mock, Framing::Legacy, DEFAULT_MAX_FRAME_SIZE);

        assert_eq!(
            reader.read_message().await.unwrap(),
            Message::Binary(Bytes::from(payload))
        );
        assert_eq!(
            reader.read_message().await.unwrap(),
            Message::Text("store_video".into())
        );
    }

    #[tokio::test]
    async fn test_tagged_framing() {
        let mock = Builder::new()
            .read(&encode_text("stream", Framing::Tagged))
            .read(&encode_binary(b"abc", Framing::Tagged))
            .read(&[0x7f])
            .build();
        let mut reader = FrameReader::new(mock, Framing::Tagged, DEFAULT_MAX_FRAME_SIZE);

        assert_eq!(
            reader.read_message().await.unwrap(),
            Message::Text("stream".into())
        );
        assert_eq!(reader.read_binary().await.unwrap(), Bytes::from_static(b"abc"));
        assert!(matches!(
            reader.read_message().await,
            Err(Error::Protocol(ProtocolError::UnknownTag(0x7f)))
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_connection_closed() {
        let frame = encode_binary(&[1, 2, 3, 4, 5, 6, 7, 8], Framing::Legacy);
        let mock = Builder::new().read(&frame[..12]).build();
        let mut reader = FrameReader::new(mock, Framing::Legacy, DEFAULT_MAX_FRAME_SIZE);

        assert!(matches!(
            reader.read_binary().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_frame_too_large() {
        let mut header = Vec::new();
        header.extend_from_slice(&1_000u64.to_le_bytes());
        let mock = Builder::new().read(&header).build();
        let mut reader = FrameReader::new(mock, Framing::Legacy, 100);

        let err = reader.read_binary().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::FrameTooLarge { size: 1000, max: 100 })
        ));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_snapshot_wire_format() {
        let snapshot = BroadcastSnapshot::new(vec![
            CameraSnapshot {
                id: "10.0.0.2:5000".parse().unwrap(),
                width: 640,
                height: 480,
                frames: vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")],
            },
            CameraSnapshot {
                id: "10.0.0.3:5001".parse().unwrap(),
                width: 320,
                height: 240,
                frames: vec![],
            },
        ]);

        let encoded = encode_snapshot(&snapshot);
        let declared = u64::from_le_bytes(encoded[..8].try_into().unwrap()) as usize;
        assert_eq!(declared, encoded.len() - 8);

        let mock = Builder::new().read(&encoded).build();
        let mut reader = FrameReader::new(mock, Framing::Legacy, DEFAULT_MAX_FRAME_SIZE);
        let decoded = reader.read_snapshot().await.unwrap();

        assert_eq!(decoded.cameras, snapshot.cameras);
    }

    #[test]
    fn test_decode_truncated_snapshot() {
        let mut body = BytesMut::new();
        body.put_u32_le(1);
        body.put_u16_le(40);
        assert!(matches!(
            decode_snapshot(body.freeze()),
            Err(Error::Protocol(ProtocolError::MalformedSnapshot))
        ));
    }
}
