use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

/// Where the conversion tools live on this machine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryPaths {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl LibraryPaths {
    /// Look for a bundled copy next to the executable, then fall back to PATH.
    pub fn detect() -> Self {
        let base = install_base_dir();
        Self::detect_in(base.as_deref())
    }

    pub fn detect_in(base_dir: Option<&Path>) -> Self {
        let local = base_dir.map(local_tool_dir);
        Self {
            ffmpeg: find_tool(FFMPEG, local.as_deref()),
            ffprobe: find_tool(FFPROBE, local.as_deref()),
        }
    }

    /// Explicit paths from the config win over detection.
    pub fn with_overrides(mut self, ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        if ffmpeg.is_some() {
            self.ffmpeg = ffmpeg;
        }
        if ffprobe.is_some() {
            self.ffprobe = ffprobe;
        }
        self
    }
}

fn local_tool_dir(base: &Path) -> PathBuf {
    let dir = base.join(FFMPEG);
    if cfg!(windows) {
        dir.join("bin")
    } else {
        dir
    }
}

fn tool_file_name(app: &str) -> String {
    if cfg!(windows) {
        format!("{app}.exe")
    } else {
        app.to_string()
    }
}

fn find_tool(app: &str, local_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = local_dir.filter(|d| d.is_dir()) {
        let candidate = dir.join(tool_file_name(app));
        if candidate.exists() {
            debug!(path = %candidate.display(), "using bundled {app}");
            return Some(candidate);
        }
    }

    which::which(app).ok()
}

/// Directory holding the running executable
fn install_base_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Installed data directories plus the per-user config directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysPaths {
    pub config: PathBuf,
    pub profiles: PathBuf,
    pub doc: PathBuf,
    pub icons: PathBuf,
    pub bin: PathBuf,
}

impl SysPaths {
    pub fn detect() -> Self {
        let home = directories::UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        if cfg!(windows) {
            let program_files = std::env::var_os("ProgramFiles")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("C:\\Program Files"));
            Self::windows(&program_files, &home)
        } else {
            // The binary is installed as <prefix>/bin/videomorph
            let prefix = install_base_dir()
                .and_then(|bin| bin.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from("/usr"));
            Self::unix(&prefix, &home)
        }
    }

    pub fn unix(prefix: &Path, home: &Path) -> Self {
        Self {
            config: home.join(".videomorph"),
            profiles: prefix.join("share").join("videomorph").join("profiles"),
            doc: prefix.join("share").join("doc").join("videomorph"),
            icons: prefix.join("share").join("icons"),
            bin: prefix.join("bin"),
        }
    }

    pub fn windows(program_files: &Path, home: &Path) -> Self {
        let app_dir = program_files.join("VideoMorph");
        Self {
            config: home.join(".videomorph"),
            profiles: app_dir.join("profiles"),
            doc: app_dir.join("doc"),
            icons: app_dir.join("icons"),
            bin: app_dir.join("bin"),
        }
    }

    /// The user's editable profile file
    pub fn user_profiles_file(&self) -> PathBuf {
        self.config.join("profiles.xml")
    }

    /// The installed read-only defaults, if a system install exists
    pub fn system_profiles_file(&self) -> PathBuf {
        self.profiles.join("profiles.xml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_paths_live_under_prefix() {
        let paths = SysPaths::unix(Path::new("/usr/local"), Path::new("/home/ana"));
        assert_eq!(paths.config, PathBuf::from("/home/ana/.videomorph"));
        assert_eq!(
            paths.profiles,
            PathBuf::from("/usr/local/share/videomorph/profiles")
        );
        assert_eq!(
            paths.user_profiles_file(),
            PathBuf::from("/home/ana/.videomorph/profiles.xml")
        );
        assert_eq!(
            paths.system_profiles_file(),
            PathBuf::from("/usr/local/share/videomorph/profiles/profiles.xml")
        );
    }

    #[test]
    fn windows_paths_live_under_program_files() {
        let paths = SysPaths::windows(Path::new("C:/Program Files"), Path::new("C:/Users/ana"));
        assert_eq!(paths.profiles, PathBuf::from("C:/Program Files/VideoMorph/profiles"));
        assert_eq!(paths.config, PathBuf::from("C:/Users/ana/.videomorph"));
    }

    #[test]
    fn bundled_tool_is_preferred() {
        let tmp = tempfile::tempdir().unwrap();
        let local = local_tool_dir(tmp.path());
        std::fs::create_dir_all(&local).unwrap();
        let bundled = local.join(tool_file_name(FFPROBE));
        std::fs::write(&bundled, "").unwrap();

        let paths = LibraryPaths::detect_in(Some(tmp.path()));
        assert_eq!(paths.ffprobe, Some(bundled));
    }

    #[test]
    fn overrides_replace_detected_paths() {
        let paths = LibraryPaths::default()
            .with_overrides(Some(PathBuf::from("/opt/ffmpeg")), None);
        assert_eq!(paths.ffmpeg, Some(PathBuf::from("/opt/ffmpeg")));
        assert_eq!(paths.ffprobe, None);
    }
}
