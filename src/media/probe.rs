use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;

/**
    Error type for media probing operations.
*/
#[derive(Debug)]
pub enum ProbeError {
    /// Failed to execute ffprobe
    ExecutionFailed(std::io::Error),
    /// ffprobe returned non-zero exit code
    NonZeroExit(i32),
    /// Failed to parse ffprobe JSON output
    ParseFailed(serde_json::Error),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::ExecutionFailed(e) => write!(f, "Failed to execute ffprobe: {}", e),
            ProbeError::NonZeroExit(code) => write!(f, "ffprobe exited with code {}", code),
            ProbeError::ParseFailed(e) => write!(f, "Failed to parse ffprobe output: {}", e),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Container-level metadata for a stored media file.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub format_name: String,
    pub duration: Option<Duration>,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    duration: Option<String>,
    size: Option<String>,
}

/**
    Probe a media file with ffprobe and return its container metadata.

    Only format-level fields are requested; duration and size come back as
    strings in the JSON and may be absent for some containers.
*/
pub async fn probe_media(ffprobe: &str, path: &Path) -> Result<MediaInfo, ProbeError> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .await
        .map_err(ProbeError::ExecutionFailed)?;

    if !output.status.success() {
        return Err(ProbeError::NonZeroExit(output.status.code().unwrap_or(-1)));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(bytes: &[u8]) -> Result<MediaInfo, ProbeError> {
    let parsed: FfprobeOutput = serde_json::from_slice(bytes).map_err(ProbeError::ParseFailed)?;

    let duration = parsed
        .format
        .duration
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64);

    let size = parsed.format.size.and_then(|s| s.parse::<u64>().ok());

    Ok(MediaInfo {
        format_name: parsed.format.format_name,
        duration,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_output() {
        let json = br#"{
            "format": {
                "filename": "clip.mp4",
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "12.480000",
                "size": "1048576"
            }
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.format_name, "mov,mp4,m4a,3gp,3g2,mj2");
        assert_eq!(info.duration.unwrap().as_millis(), 12480);
        assert_eq!(info.size, Some(1048576));
    }

    #[test]
    fn test_parse_missing_duration() {
        let json = br#"{"format": {"format_name": "matroska,webm"}}"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.format_name, "matroska,webm");
        assert!(info.duration.is_none());
        assert!(info.size.is_none());
    }

    #[test]
    fn test_parse_garbage_duration() {
        let json = br#"{"format": {"format_name": "mp4", "duration": "N/A"}}"#;

        let info = parse_probe_output(json).unwrap();
        assert!(info.duration.is_none());
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(ProbeError::ParseFailed(_))
        ));
    }
}
