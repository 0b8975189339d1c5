use crate::error::{Error, Result};
use crate::paths::LibraryPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub conversion: ConversionConfig,
    pub tools: ToolsConfig,
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    pub output_dir: PathBuf,
    pub default_quality: String,
    pub tagged_output: bool,
    pub insert_subtitles: bool,
    pub delete_original: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

/// Language used for quality names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    English,
    Spanish,
}

impl Locale {
    /// `es_*` in `LC_ALL`/`LANG` selects Spanish
    pub fn from_env() -> Self {
        let lang = std::env::var("LC_ALL")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| std::env::var("LANG").ok())
            .unwrap_or_default();
        Self::from_tag(&lang)
    }

    pub fn from_tag(tag: &str) -> Self {
        if tag.to_ascii_lowercase().starts_with("es") {
            Locale::Spanish
        } else {
            Locale::English
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let output_dir = directories::UserDirs::new()
            .and_then(|u| u.video_dir().map(|v| v.to_path_buf()))
            .or_else(|| directories::UserDirs::new().map(|u| u.home_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            conversion: ConversionConfig {
                output_dir,
                default_quality: "MP4 Widescreen (16:9)".to_string(),
                tagged_output: false,
                insert_subtitles: false,
                delete_original: false,
            },
            tools: ToolsConfig::default(),
            locale: Locale::from_env(),
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("org", "videomorph", "VideoMorph")
            .ok_or_else(|| Error::Config("cannot determine config directory".into()))?;
        Ok(dirs.config_dir().join("config.json"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        let config: Self = serde_json::from_str(&content).map_err(Error::Json)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(Error::Json)?;
        std::fs::write(path, content).map_err(Error::Io)?;
        Ok(())
    }

    /// Ensure the output directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.conversion.output_dir).map_err(Error::Io)?;
        Ok(())
    }

    /// Detected tool locations with the configured overrides applied
    pub fn library_paths(&self) -> LibraryPaths {
        LibraryPaths::detect().with_overrides(self.tools.ffmpeg.clone(), self.tools.ffprobe.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cfg").join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert!(!config.conversion.tagged_output);
        assert_eq!(config.conversion.default_quality, "MP4 Widescreen (16:9)");
    }

    #[test]
    fn save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");

        let mut config = Config::default();
        config.conversion.tagged_output = true;
        config.conversion.output_dir = tmp.path().join("out");
        config.locale = Locale::Spanish;
        config.tools.ffmpeg = Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.conversion.tagged_output);
        assert_eq!(loaded.locale, Locale::Spanish);
        assert_eq!(loaded.tools.ffmpeg, Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")));

        loaded.ensure_dirs().unwrap();
        assert!(tmp.path().join("out").is_dir());
    }

    #[test]
    fn corrupt_config_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Json(_))));
    }

    #[test]
    fn locale_tags() {
        assert_eq!(Locale::from_tag("es_ES.UTF-8"), Locale::Spanish);
        assert_eq!(Locale::from_tag("en_US.UTF-8"), Locale::English);
        assert_eq!(Locale::from_tag(""), Locale::English);
    }
}
