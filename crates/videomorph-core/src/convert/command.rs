use crate::media::Video;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Builds ffmpeg argument vectors for a conversion
#[derive(Debug, Default)]
pub struct ConversionCommand {
    args: Vec<String>,
}

impl ConversionCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, path: &Path) -> Self {
        self.args
            .extend(["-i".to_string(), path.to_string_lossy().to_string()]);
        self
    }

    /// Preset parameters, split on whitespace
    pub fn with_params(mut self, params: &str) -> Self {
        self.args.extend(params.split_whitespace().map(str::to_string));
        self
    }

    /// Burn a subtitle file into the video
    pub fn with_subtitles(mut self, srt: &Path) -> Self {
        self.args.extend([
            "-vf".to_string(),
            format!("subtitles={}", escape_filter_path(srt)),
        ]);
        self
    }

    /// Overwrite the output without asking
    pub fn with_output(mut self, path: &Path) -> Self {
        self.args
            .extend(["-y".to_string(), path.to_string_lossy().to_string()]);
        self
    }

    pub fn build(self) -> Vec<String> {
        self.args
    }
}

/// Escape a path for use inside an ffmpeg filter argument
fn escape_filter_path(path: &Path) -> String {
    let mut out = String::new();
    for c in path.to_string_lossy().chars() {
        if matches!(c, '\\' | ':' | '\'' | ',' | '[' | ']' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Where converted files go and what happens around each conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub output_dir: PathBuf,
    pub tagged_output: bool,
    pub insert_subtitles: bool,
    pub delete_original: bool,
}

impl From<&crate::config::ConversionConfig> for ConversionOptions {
    fn from(config: &crate::config::ConversionConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            tagged_output: config.tagged_output,
            insert_subtitles: config.insert_subtitles,
            delete_original: config.delete_original,
        }
    }
}

/// `<output_dir>/<name><ext>`, or `<output_dir>/<tag>-<name><ext>` when tagged.
/// The tag is forced when the plain name would overwrite the input.
pub fn output_path(video: &Video, output_dir: &Path, extension: &str, tag: &str, tagged: bool) -> PathBuf {
    let plain = output_dir.join(format!("{}{}", video.name(false), extension));
    if !tagged && !same_file(&plain, &video.path) {
        return plain;
    }
    output_dir.join(format!("{}-{}{}", tag, video.name(false), extension))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// A sidecar `<stem>.srt` next to the input, if there is one
pub fn find_subtitle_file(input: &Path) -> Option<PathBuf> {
    let srt = input.with_extension("srt");
    srt.is_file().then_some(srt)
}

/// One file to convert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub params: String,
    pub subtitles: Option<PathBuf>,
}

impl ConversionJob {
    pub fn new(video: &Video, params: &str, extension: &str, tag: &str, options: &ConversionOptions) -> Self {
        let subtitles = if options.insert_subtitles && !has_video_filter(params) {
            find_subtitle_file(&video.path)
        } else {
            None
        };

        Self {
            input: video.path.clone(),
            output: output_path(video, &options.output_dir, extension, tag, options.tagged_output),
            params: params.to_string(),
            subtitles,
        }
    }

    /// `-i <input> <params...> [-vf subtitles=<srt>] -y <output>`
    pub fn build_args(&self) -> Vec<String> {
        let mut command = ConversionCommand::new()
            .with_input(&self.input)
            .with_params(&self.params);
        if let Some(srt) = &self.subtitles {
            command = command.with_subtitles(srt);
        }
        command.with_output(&self.output).build()
    }
}

fn has_video_filter(params: &str) -> bool {
    params
        .split_whitespace()
        .any(|p| p == "-vf" || p == "-filter:v" || p == "-filter_complex")
}
