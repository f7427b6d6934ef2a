//! Persistence collaborators
//!
//! - [`sink`]: writes buffered frames to a video file
//! - [`naming`]: unique output filenames

pub mod naming;
pub mod sink;

pub use naming::{FilenameGenerator, UniqueFilenames};
pub use sink::{persist, read_raw_video, RawVideo, RawVideoSink, VideoRequest, VideoSink};
