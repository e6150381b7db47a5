use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;

use super::probe;

/// Flags passed to every invocation. `-loglevel error` keeps stderr down to
/// the text worth showing a user when the run fails.
const GLOBAL_FLAGS: &[&str] = &["-y", "-hide_banner", "-loglevel", "error"];

const AUDIO_BITRATE: u64 = 128_000;
const MIN_VIDEO_BITRATE: u64 = 150_000;
const MAX_VIDEO_BITRATE: u64 = 8_000_000;

/**
    Typed transcode error for the subprocess boundary.
*/
#[derive(Debug)]
pub enum TranscodeError {
    /// The transcoder binary could not be launched.
    Spawn(std::io::Error),
    /// The transcoder ran and exited non-zero; holds its stderr text.
    Failed(String),
    /// Staging files around the invocation failed.
    Io(std::io::Error),
}

impl std::fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscodeError::Spawn(e) => write!(f, "could not launch transcoder: {}", e),
            TranscodeError::Failed(msg) => write!(f, "{}", msg),
            TranscodeError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for TranscodeError {}

/// Compression tier selected on the compress form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    High,
    Medium,
    Low,
}

impl Quality {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Some(Quality::High),
            "medium" => Some(Quality::Medium),
            "low" => Some(Quality::Low),
            _ => None,
        }
    }

    fn crf(&self) -> &'static str {
        match self {
            Quality::High => "20",
            Quality::Medium => "26",
            Quality::Low => "30",
        }
    }

    /// Optional downscale filter; higher tiers keep the source resolution.
    fn scale(&self) -> Option<&'static str> {
        match self {
            Quality::High => None,
            Quality::Medium => Some("scale='min(1280,iw)':-2"),
            Quality::Low => Some("scale='min(854,iw)':-2"),
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Medium
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Quality::High => "high",
            Quality::Medium => "medium",
            Quality::Low => "low",
        };
        write!(f, "{}", name)
    }
}

/// Audio target for the convert (extract) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Aac,
    M4a,
}

impl AudioFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "wav" => Some(AudioFormat::Wav),
            "aac" => Some(AudioFormat::Aac),
            "m4a" => Some(AudioFormat::M4a),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Aac => "aac",
            AudioFormat::M4a => "m4a",
        }
    }

    /// Encoder arguments; the container is inferred from the output
    /// extension (adts for .aac, ipod for .m4a).
    fn codec_args(&self) -> &'static [&'static str] {
        match self {
            AudioFormat::Mp3 => &["-c:a", "libmp3lame", "-q:a", "2"],
            AudioFormat::Wav => &["-c:a", "pcm_s16le"],
            AudioFormat::Aac => &["-c:a", "aac", "-b:a", "192k"],
            AudioFormat::M4a => &["-c:a", "aac", "-b:a", "192k"],
        }
    }
}

/**
    Wraps the external ffmpeg/ffprobe binaries. One invocation per call,
    awaited to completion; a failed run removes its partial output file.
*/
pub struct Transcoder {
    ffmpeg: String,
    ffprobe: String,
}

impl Transcoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// First line of `ffmpeg -version`, or `None` when the binary is absent.
    pub async fn version(&self) -> Option<String> {
        let output = Command::new(&self.ffmpeg)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|line| line.to_string())
    }

    /// Re-encode a video, either to a quality preset or toward an explicit
    /// target size. The target-size path needs the source duration; when
    /// probing fails it falls back to the preset.
    pub async fn compress(
        &self,
        input: &Path,
        output: &Path,
        quality: Quality,
        target_size_mb: Option<u64>,
    ) -> Result<(), TranscodeError> {
        let args = match target_size_mb {
            Some(mb) => {
                let duration = self.probe_duration(input).await;
                match duration.and_then(|d| target_bitrate(mb * 1024 * 1024, d, AUDIO_BITRATE)) {
                    Some(bps) => {
                        println!(
                            "[transcode] targeting {} MB -> {} kbps video",
                            mb,
                            bps / 1000
                        );
                        bitrate_args(input, output, bps)
                    }
                    None => {
                        eprintln!(
                            "[transcode] duration unknown for {}, using '{}' preset",
                            input.display(),
                            quality
                        );
                        preset_args(input, output, quality)
                    }
                }
            }
            None => preset_args(input, output, quality),
        };

        self.run(args, output).await
    }

    /// Extract the audio track into the requested format.
    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
        format: AudioFormat,
    ) -> Result<(), TranscodeError> {
        self.run(convert_args(input, output, format), output).await
    }

    /// Concatenate the inputs, in order, into one mp4. Uses the concat
    /// demuxer with a generated list file and re-encodes to a uniform
    /// codec pair so mixed inputs merge cleanly.
    pub async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), TranscodeError> {
        let mut list = tempfile::NamedTempFile::new().map_err(TranscodeError::Io)?;
        for input in inputs {
            let abs = tokio::fs::canonicalize(input)
                .await
                .map_err(TranscodeError::Io)?;
            writeln!(list, "{}", concat_entry(&abs)).map_err(TranscodeError::Io)?;
        }
        list.flush().map_err(TranscodeError::Io)?;

        self.run(merge_args(list.path(), output), output).await
    }

    /// Source duration in seconds, if ffprobe can determine one.
    pub async fn probe_duration(&self, input: &Path) -> Option<f64> {
        match probe::probe_media(&self.ffprobe, input).await {
            Ok(info) => info.duration.map(|d| d.as_secs_f64()),
            Err(e) => {
                eprintln!("[transcode] probe failed for {}: {}", input.display(), e);
                None
            }
        }
    }

    async fn run(&self, args: Vec<String>, output: &Path) -> Result<(), TranscodeError> {
        let started = Instant::now();

        let result = Command::new(&self.ffmpeg)
            .args(GLOBAL_FLAGS)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(TranscodeError::Spawn)?;

        if result.status.success() {
            println!(
                "[transcode] {} finished in {:.1}s",
                output.file_name().unwrap_or_default().to_string_lossy(),
                started.elapsed().as_secs_f64()
            );
            return Ok(());
        }

        // Drop any partial output before reporting.
        let _ = tokio::fs::remove_file(output).await;

        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        let msg = if stderr.is_empty() {
            format!("transcoder exited with {}", result.status)
        } else {
            stderr
        };
        Err(TranscodeError::Failed(msg))
    }
}

/**
    Back-calculate the video bitrate that lands an encode near the target
    size: 15% container headroom, audio reserved at its own bitrate, result
    clamped to a usable range. `None` when the duration is unusable.
*/
pub(crate) fn target_bitrate(target_bytes: u64, duration_secs: f64, audio_bps: u64) -> Option<u64> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return None;
    }

    let budget = target_bytes as f64 * 0.85 - audio_bps as f64 / 8.0 * duration_secs;
    if budget <= 0.0 {
        // Target smaller than the audio alone; encode at the floor.
        return Some(MIN_VIDEO_BITRATE);
    }

    let bps = (budget * 8.0 / duration_secs) as u64;
    Some(bps.clamp(MIN_VIDEO_BITRATE, MAX_VIDEO_BITRATE))
}

fn audio_mux_tail(args: &mut Vec<String>) {
    for arg in ["-c:a", "aac", "-b:a", "128k", "-movflags", "+faststart"] {
        args.push(arg.to_string());
    }
}

fn preset_args(input: &Path, output: &Path, quality: Quality) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        input.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        quality.crf().to_string(),
    ];
    if let Some(scale) = quality.scale() {
        args.push("-vf".to_string());
        args.push(scale.to_string());
    }
    audio_mux_tail(&mut args);
    args.push(output.display().to_string());
    args
}

fn bitrate_args(input: &Path, output: &Path, video_bps: u64) -> Vec<String> {
    let kbps = video_bps / 1000;
    let mut args = vec![
        "-i".to_string(),
        input.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-b:v".to_string(),
        format!("{}k", kbps),
        "-maxrate".to_string(),
        format!("{}k", kbps),
        "-bufsize".to_string(),
        format!("{}k", kbps * 2),
    ];
    audio_mux_tail(&mut args);
    args.push(output.display().to_string());
    args
}

fn convert_args(input: &Path, output: &Path, format: AudioFormat) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        input.display().to_string(),
        "-vn".to_string(),
    ];
    args.extend(format.codec_args().iter().map(|s| s.to_string()));
    args.push(output.display().to_string());
    args
}

fn merge_args(list: &Path, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "23".to_string(),
    ];
    audio_mux_tail(&mut args);
    args.push(output.display().to_string());
    args
}

/// One line of a concat demuxer list file. Single quotes in the path are
/// closed, escaped, and reopened, per the demuxer's quoting rules.
fn concat_entry(path: &Path) -> String {
    let escaped = path.display().to_string().replace('\'', "'\\''");
    format!("file '{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_parse() {
        assert_eq!(Quality::parse("high"), Some(Quality::High));
        assert_eq!(Quality::parse("MEDIUM"), Some(Quality::Medium));
        assert_eq!(Quality::parse("low"), Some(Quality::Low));
        assert_eq!(Quality::parse("ultra"), None);
    }

    #[test]
    fn test_audio_format_parse() {
        assert_eq!(AudioFormat::parse("mp3"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::parse("M4A"), Some(AudioFormat::M4a));
        assert_eq!(AudioFormat::parse("ogg"), None);
    }

    #[test]
    fn test_preset_args_scale_per_tier() {
        let high = preset_args(Path::new("in.mp4"), Path::new("out.mp4"), Quality::High);
        assert!(!high.contains(&"-vf".to_string()));
        assert!(high.contains(&"20".to_string()));

        let low = preset_args(Path::new("in.mp4"), Path::new("out.mp4"), Quality::Low);
        let vf = low.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(low[vf + 1], "scale='min(854,iw)':-2");
        assert_eq!(low.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_bitrate_args_rates() {
        let args = bitrate_args(Path::new("in.mp4"), Path::new("out.mp4"), 900_000);
        let bv = args.iter().position(|a| a == "-b:v").unwrap();
        assert_eq!(args[bv + 1], "900k");
        let bufsize = args.iter().position(|a| a == "-bufsize").unwrap();
        assert_eq!(args[bufsize + 1], "1800k");
    }

    #[test]
    fn test_convert_args_drop_video() {
        let args = convert_args(Path::new("in.mp4"), Path::new("out.mp3"), AudioFormat::Mp3);
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.contains(&"libmp3lame".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp3");

        let wav = convert_args(Path::new("in.mp4"), Path::new("out.wav"), AudioFormat::Wav);
        assert!(wav.contains(&"pcm_s16le".to_string()));
    }

    #[test]
    fn test_merge_args_use_concat_demuxer() {
        let args = merge_args(Path::new("/tmp/list.txt"), Path::new("out.mp4"));
        assert_eq!(&args[..4], &["-f", "concat", "-safe", "0"]);
        assert!(args.contains(&"/tmp/list.txt".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_concat_entry_escapes_quotes() {
        let entry = concat_entry(Path::new("/tmp/it's here.mp4"));
        assert_eq!(entry, "file '/tmp/it'\\''s here.mp4'");
    }

    #[test]
    fn test_target_bitrate_basic() {
        // 10 MB over 60s with 128k audio: well within the clamp range.
        let bps = target_bitrate(10 * 1024 * 1024, 60.0, AUDIO_BITRATE).unwrap();
        assert!(bps > MIN_VIDEO_BITRATE && bps < MAX_VIDEO_BITRATE);
    }

    #[test]
    fn test_target_bitrate_floors_tiny_targets() {
        // 1 MB for an hour of audio-reserved video cannot fit; floor it.
        let bps = target_bitrate(1024 * 1024, 3600.0, AUDIO_BITRATE).unwrap();
        assert_eq!(bps, MIN_VIDEO_BITRATE);
    }

    #[test]
    fn test_target_bitrate_caps_short_clips() {
        let bps = target_bitrate(500 * 1024 * 1024, 1.0, AUDIO_BITRATE).unwrap();
        assert_eq!(bps, MAX_VIDEO_BITRATE);
    }

    #[test]
    fn test_target_bitrate_rejects_bad_duration() {
        assert!(target_bitrate(1024, 0.0, AUDIO_BITRATE).is_none());
        assert!(target_bitrate(1024, -5.0, AUDIO_BITRATE).is_none());
        assert!(target_bitrate(1024, f64::NAN, AUDIO_BITRATE).is_none());
    }

    #[test]
    fn test_error_display_passes_stderr_through() {
        let err = TranscodeError::Failed("in.mp4: Invalid data found".to_string());
        assert_eq!(err.to_string(), "in.mp4: Invalid data found");
    }
}
