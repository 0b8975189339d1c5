use crate::config::Config;
use crate::paths::LibraryPaths;
use crate::process::tool_version;
use crate::profile::parse_profiles;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub checks: Vec<DiagnosticCheck>,
}

impl DiagnosticReport {
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Pass => write!(f, "PASS"),
            CheckStatus::Warn => write!(f, "WARN"),
            CheckStatus::Fail => write!(f, "FAIL"),
        }
    }
}

pub async fn run_diagnostics(config: &Config, tools: &LibraryPaths, profiles_file: &Path) -> DiagnosticReport {
    let (ffmpeg, ffprobe) = tokio::join!(
        check_tool("FFmpeg", tools.ffmpeg.as_deref()),
        check_tool("FFprobe", tools.ffprobe.as_deref()),
    );

    DiagnosticReport {
        checks: vec![
            ffmpeg,
            ffprobe,
            check_profiles(profiles_file),
            check_output_dir(&config.conversion.output_dir),
        ],
    }
}

async fn check_tool(name: &str, path: Option<&Path>) -> DiagnosticCheck {
    let Some(path) = path else {
        return DiagnosticCheck {
            name: name.to_string(),
            status: CheckStatus::Fail,
            detail: format!("{name} not found"),
            recommendation: Some("Install FFmpeg: sudo apt install ffmpeg".to_string()),
        };
    };

    match tool_version(path).await {
        Ok(version) => DiagnosticCheck {
            name: name.to_string(),
            status: CheckStatus::Pass,
            detail: format!("{} ({})", version, path.display()),
            recommendation: None,
        },
        Err(e) => DiagnosticCheck {
            name: name.to_string(),
            status: CheckStatus::Fail,
            detail: format!("{} did not run: {}", path.display(), e),
            recommendation: Some("Check the tool path in the config file".to_string()),
        },
    }
}

fn check_profiles(path: &Path) -> DiagnosticCheck {
    let name = "Profiles".to_string();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => {
            return DiagnosticCheck {
                name,
                status: CheckStatus::Warn,
                detail: format!("{} missing", path.display()),
                recommendation: Some("It will be created from the defaults on first use".to_string()),
            }
        }
    };

    match parse_profiles(&text) {
        Ok(profiles) => DiagnosticCheck {
            name,
            status: CheckStatus::Pass,
            detail: format!(
                "{} profiles, {} presets",
                profiles.len(),
                profiles.iter().map(|p| p.presets.len()).sum::<usize>()
            ),
            recommendation: None,
        },
        Err(e) => DiagnosticCheck {
            name,
            status: CheckStatus::Warn,
            detail: format!("{} is corrupt: {}", path.display(), e),
            recommendation: Some("Run `videomorph profiles restore`".to_string()),
        },
    }
}

fn check_output_dir(dir: &Path) -> DiagnosticCheck {
    let name = "Output Directory".to_string();
    let writable = std::fs::create_dir_all(dir).is_ok() && tempfile::tempfile_in(dir).is_ok();

    if writable {
        DiagnosticCheck {
            name,
            status: CheckStatus::Pass,
            detail: format!("{} is writable", dir.display()),
            recommendation: None,
        }
    } else {
        DiagnosticCheck {
            name,
            status: CheckStatus::Fail,
            detail: format!("{} is not writable", dir.display()),
            recommendation: Some("Pick another directory with --output-dir".to_string()),
        }
    }
}
