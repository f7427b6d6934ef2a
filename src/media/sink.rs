//! Video sink
//!
//! Turns an ordered sequence of raw frames into a file. Real encoders plug in
//! through [`VideoSink`]; [`RawVideoSink`] is the built-in writer and stores
//! frames uncompressed in a small container:
//!
//! ```text
//! +==========+=======+========+======+=============+==================+
//! | "CAMRAW01" | width | height | fps  | frame_count | frames ...       |
//! | (8 bytes)  | u32LE | u32LE  | u32LE| u32LE       | u64LE len + data |
//! +==========+=======+========+======+=============+==================+
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::PersistenceError;

/// Container signature
pub const RAW_VIDEO_MAGIC: [u8; 8] = *b"CAMRAW01";

/// Everything a sink needs to write one video
#[derive(Debug, Clone)]
pub struct VideoRequest {
    /// Frames in arrival order
    pub frames: Vec<Bytes>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Destination file
    pub path: PathBuf,
}

/// Writes frame sequences to playable files
///
/// Called from a blocking thread, so implementations may do synchronous I/O.
pub trait VideoSink: Send + Sync + 'static {
    /// Write all frames of `request` to `request.path`
    fn write(&self, request: &VideoRequest) -> io::Result<()>;

    /// File extension this sink produces, without the dot
    fn extension(&self) -> &str;
}

/// Run a sink on the blocking pool
pub async fn persist(sink: Arc<dyn VideoSink>, request: VideoRequest) -> Result<(), PersistenceError> {
    let path = request.path.clone();

    let result = tokio::task::spawn_blocking(move || sink.write(&request))
        .await
        .unwrap_or_else(|e| Err(io::Error::other(e)));

    result.map_err(|source| PersistenceError { path, source })
}

/// Built-in sink writing the uncompressed `CAMRAW01` container
#[derive(Debug, Clone, Default)]
pub struct RawVideoSink;

impl RawVideoSink {
    pub fn new() -> Self {
        Self
    }
}

impl VideoSink for RawVideoSink {
    fn write(&self, request: &VideoRequest) -> io::Result<()> {
        // Write beside the target and rename, so failures leave no partial file
        let mut partial = request.path.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let result = (|| {
            let mut writer = BufWriter::new(File::create(&partial)?);
            write_header(&mut writer, request)?;
            for frame in &request.frames {
                write_frame(&mut writer, frame)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()
        })();

        match result {
            Ok(()) => std::fs::rename(&partial, &request.path),
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    fn extension(&self) -> &str {
        "camraw"
    }
}

fn write_header(writer: &mut impl Write, request: &VideoRequest) -> io::Result<()> {
    writer.write_all(&RAW_VIDEO_MAGIC)?;
    writer.write_all(&request.width.to_le_bytes())?;
    writer.write_all(&request.height.to_le_bytes())?;
    writer.write_all(&request.frame_rate.to_le_bytes())?;
    writer.write_all(&(request.frames.len() as u32).to_le_bytes())?;
    Ok(())
}

fn write_frame(writer: &mut impl Write, frame: &[u8]) -> io::Result<()> {
    writer.write_all(&(frame.len() as u64).to_le_bytes())?;
    writer.write_all(frame)
}

/// A `CAMRAW01` file read back into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVideo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub frames: Vec<Bytes>,
}

/// Read a file written by [`RawVideoSink`]
pub fn read_raw_video(path: &Path) -> io::Result<RawVideo> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if magic != RAW_VIDEO_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a CAMRAW01 file",
        ));
    }

    let width = read_u32(&mut reader)?;
    let height = read_u32(&mut reader)?;
    let frame_rate = read_u32(&mut reader)?;
    let count = read_u32(&mut reader)? as usize;

    let mut frames = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let mut len = [0u8; 8];
        reader.read_exact(&mut len)?;
        let len = u64::from_le_bytes(len);

        // Grow with the bytes actually present, never with the claimed length
        let mut data = Vec::new();
        (&mut reader).take(len).read_to_end(&mut data)?;
        if data.len() as u64 != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated frame",
            ));
        }
        frames.push(Bytes::from(data));
    }

    Ok(RawVideo {
        width,
        height,
        frame_rate,
        frames,
    })
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
