use crate::error::{Error, Result};
use crate::probe::{ProbeInfo, ProbeRunner};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A media file plus what ffprobe had to say about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub path: PathBuf,
    pub info: ProbeInfo,
}

impl Video {
    pub fn new(path: impl Into<PathBuf>, info: ProbeInfo) -> Self {
        Self {
            path: path.into(),
            info,
        }
    }

    pub async fn probe<R: ProbeRunner>(path: &Path, runner: &R) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let info = ProbeInfo::probe(runner, path).await?;
        Ok(Self::new(path, info))
    }

    pub fn name(&self, with_extension: bool) -> String {
        let part = if with_extension {
            self.path.file_name()
        } else {
            self.path.file_stem()
        };
        part.map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Playable media has a positive, numeric duration
    pub fn is_valid(&self) -> bool {
        self.duration().is_some_and(|d| d > 0.0)
    }

    pub fn duration(&self) -> Option<f64> {
        self.format_field("duration")
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite())
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.format_field("size").and_then(|s| s.parse().ok())
    }

    pub fn bit_rate(&self) -> Option<u64> {
        self.format_field("bit_rate").and_then(|s| s.parse().ok())
    }

    pub fn format_name(&self) -> Option<&str> {
        self.format_field("format_long_name")
            .or_else(|| self.format_field("format_name"))
    }

    pub fn video_codec(&self) -> Option<&str> {
        self.info.video_info.get("codec_name").map(String::as_str)
    }

    pub fn audio_codec(&self) -> Option<&str> {
        self.info.audio_info.get("codec_name").map(String::as_str)
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        let w = self.info.video_info.get("width")?.parse().ok()?;
        let h = self.info.video_info.get("height")?.parse().ok()?;
        Some((w, h))
    }

    pub fn subtitle_language(&self) -> Option<&str> {
        self.info.subtitle_info.get("TAG:language").map(String::as_str)
    }

    pub fn has_subtitles(&self) -> bool {
        self.info.subtitle_info.contains_key("codec_name")
    }

    fn format_field(&self, key: &str) -> Option<&str> {
        self.info.format_info.get(key).map(String::as_str)
    }
}

/// `HH:MM:SS`, rounding fractional seconds down
pub fn format_duration(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Human-readable size in KiB/MiB/GiB
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::FakeRunner;

    fn sample() -> Video {
        let mut info = ProbeInfo::default();
        info.format_info
            .insert("duration".to_string(), "120.045000".to_string());
        info.format_info.insert("size".to_string(), "2048".to_string());
        info.video_info.insert("width".to_string(), "352".to_string());
        info.video_info.insert("height".to_string(), "240".to_string());
        Video::new("./Dad.mpg", info)
    }

    #[test]
    fn name_without_extension() {
        assert_eq!(sample().name(false), "Dad");
    }

    #[test]
    fn name_with_extension() {
        assert_eq!(sample().name(true), "Dad.mpg");
    }

    #[test]
    fn valid_with_positive_duration() {
        assert!(sample().is_valid());
    }

    #[test]
    fn invalid_with_zero_duration() {
        let mut video = sample();
        video.info.format_info.insert("duration".into(), "0".into());
        assert!(!video.is_valid());
    }

    #[test]
    fn invalid_without_duration() {
        let mut video = sample();
        video.info.format_info.remove("duration");
        assert!(!video.is_valid());
    }

    #[test]
    fn invalid_with_non_numeric_duration() {
        let mut video = sample();
        video.info.format_info.insert("duration".into(), "N/A".into());
        assert!(!video.is_valid());
        video.info.format_info.insert("duration".into(), "[]".into());
        assert!(!video.is_valid());
    }

    #[test]
    fn accessors_read_probe_maps() {
        let video = sample();
        assert_eq!(video.resolution(), Some((352, 240)));
        assert_eq!(video.size_bytes(), Some(2048));
        assert_eq!(video.audio_codec(), None);
        assert!(!video.has_subtitles());
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0.0), "00:00:00");
        assert_eq!(format_duration(59.9), "00:00:59");
        assert_eq!(format_duration(3723.4), "01:02:03");
        assert_eq!(format_duration(f64::NAN), "00:00:00");
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[tokio::test]
    async fn probe_missing_file_is_an_error() {
        let runner = FakeRunner::default();
        let err = Video::probe(Path::new("/definitely/not/here.mkv"), &runner)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn probe_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.mkv");
        std::fs::write(&path, b"not really a video").unwrap();

        let video = Video::probe(&path, &FakeRunner::default()).await.unwrap();
        assert!(video.is_valid());
        assert_eq!(video.name(false), "clip");
        assert_eq!(video.subtitle_language(), Some("eng"));
    }
}
