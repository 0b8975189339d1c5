use crate::error::{Error, Result};
use crate::process::run_ffprobe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub type InfoMap = BTreeMap<String, String>;

const FORMAT_KEYS: &[&str] = &[
    "filename",
    "nb_streams",
    "format_name",
    "format_long_name",
    "duration",
    "size",
    "bit_rate",
];
const VIDEO_KEYS: &[&str] = &["codec_name", "codec_long_name", "bit_rate", "width", "height"];
const AUDIO_KEYS: &[&str] = &["codec_name", "codec_long_name"];
const SUBTITLE_KEYS: &[&str] = &["codec_name", "codec_long_name", "TAG:language"];

/// Something that can run ffprobe with the given arguments and hand back stdout
#[allow(async_fn_in_trait)]
pub trait ProbeRunner {
    async fn run(&self, args: &[String]) -> Result<String>;
}

/// Runs the real ffprobe binary
#[derive(Debug, Clone)]
pub struct FfprobeRunner {
    pub path: PathBuf,
}

impl FfprobeRunner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_paths(paths: &crate::paths::LibraryPaths) -> Result<Self> {
        paths
            .ffprobe
            .clone()
            .map(Self::new)
            .ok_or(Error::FfprobeNotFound)
    }
}

impl ProbeRunner for FfprobeRunner {
    async fn run(&self, args: &[String]) -> Result<String> {
        run_ffprobe(&self.path, args).await
    }
}

/// Metadata for one media file, one map per ffprobe section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    pub format_info: InfoMap,
    pub video_info: InfoMap,
    pub audio_info: InfoMap,
    pub subtitle_info: InfoMap,
}

impl ProbeInfo {
    pub async fn probe<R: ProbeRunner>(runner: &R, media: &Path) -> Result<Self> {
        Ok(Self {
            format_info: query(runner, media, &["-show_format"], FORMAT_KEYS).await?,
            video_info: query(
                runner,
                media,
                &["-show_streams", "-select_streams", "v"],
                VIDEO_KEYS,
            )
            .await?,
            audio_info: query(
                runner,
                media,
                &["-show_streams", "-select_streams", "a"],
                AUDIO_KEYS,
            )
            .await?,
            subtitle_info: query(
                runner,
                media,
                &["-show_streams", "-select_streams", "s"],
                SUBTITLE_KEYS,
            )
            .await?,
        })
    }
}

async fn query<R: ProbeRunner>(
    runner: &R,
    media: &Path,
    flags: &[&str],
    selected: &[&str],
) -> Result<InfoMap> {
    let args = probe_args(flags, media);
    let output = runner.run(&args).await?;
    Ok(parse_probe_output(&output, selected))
}

/// `<flags...> <media>`; the runner supplies the binary
pub fn probe_args(flags: &[&str], media: &Path) -> Vec<String> {
    let mut args: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
    args.push(media.to_string_lossy().to_string());
    args
}

/// Collect the selected `key=value` pairs of ffprobe's default writer output.
///
/// The first occurrence of a key is stored as-is. Repeats are stored as
/// `key_<n>`, where `n` is the zero-based index of the `[STREAM]` section
/// the line belongs to.
pub fn parse_probe_output(output: &str, selected: &[&str]) -> InfoMap {
    let mut info = InfoMap::new();
    let mut stream_count: i64 = -1;

    for line in output.lines().map(str::trim) {
        if line.contains("[STREAM]") {
            stream_count += 1;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if !selected.contains(&key) {
            continue;
        }

        if info.contains_key(key) {
            info.insert(format!("{key}_{stream_count}"), value.to_string());
        } else {
            info.insert(key.to_string(), value.to_string());
        }
    }

    info
}
