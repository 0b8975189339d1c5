use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("FFmpeg process failed: {0}")]
    FfmpegFailed(String),

    #[error("FFmpeg not found")]
    FfmpegNotFound,

    #[error("FFprobe not found")]
    FfprobeNotFound,

    #[error("FFprobe failed: {0}")]
    ProbeFailed(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Profile name must not be blank")]
    ProfileBlankName,

    #[error("Preset name must not be blank")]
    ProfileBlankPreset,

    #[error("Preset parameters must not be blank")]
    ProfileBlankParams,

    #[error("Invalid file extension: {0}")]
    ProfileExtension(String),

    #[error("Unknown target quality: {0}")]
    ProfileNotFound(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("File already in the list: {0}")]
    DuplicateFile(PathBuf),

    #[error("Not a valid video: {0}")]
    InvalidVideo(PathBuf),

    #[error("No task with id {0}")]
    TaskNotFound(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Map a copy failure to `PermissionDenied` when the OS says so.
    pub(crate) fn from_copy(err: std::io::Error, path: PathBuf) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Error::PermissionDenied(path)
        } else {
            Error::Io(err)
        }
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_output_for_known_variants() {
        assert_eq!(Error::FfmpegNotFound.to_string(), "FFmpeg not found");
        assert_eq!(
            Error::ProfileBlankName.to_string(),
            "Profile name must not be blank"
        );
        assert_eq!(
            Error::ProfileExtension(".xyz".into()).to_string(),
            "Invalid file extension: .xyz"
        );
        assert_eq!(
            Error::Config("bad value".into()).to_string(),
            "Config error: bad value"
        );
    }

    #[test]
    fn serialize_produces_quoted_string() {
        let err = Error::FfprobeNotFound;
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"FFprobe not found\"");
    }

    #[test]
    fn io_wraps_inner_error_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::Io(io_err);
        let msg = err.to_string();
        assert!(msg.contains("file missing"), "got: {msg}");
    }

    #[test]
    fn copy_permission_error_maps_to_permission_denied() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = Error::from_copy(io_err, PathBuf::from("/root/profiles.xml"));
        assert!(matches!(err, Error::PermissionDenied(p) if p == PathBuf::from("/root/profiles.xml")));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::from_copy(io_err, PathBuf::from("/tmp/x"));
        assert!(matches!(err, Error::Io(_)));
    }
}
