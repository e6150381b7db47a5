pub mod probe;
pub mod transcode;

pub use probe::{MediaInfo, probe_media};
pub use transcode::{AudioFormat, Quality, TranscodeError, Transcoder};
