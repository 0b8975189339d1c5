use crate::config::Locale;
use crate::error::{Error, Result};
use crate::profile::store::{letters_with_digit, PresetAttr, XmlProfileStore};
use tracing::debug;

/// The profile store plus the quality currently selected for conversion
#[derive(Debug)]
pub struct ConversionProfile {
    store: XmlProfileStore,
    pub quality: Option<String>,
    pub params: Option<String>,
    pub extension: Option<String>,
}

impl ConversionProfile {
    pub fn new(store: XmlProfileStore) -> Self {
        Self {
            store,
            quality: None,
            params: None,
            extension: None,
        }
    }

    pub fn store(&self) -> &XmlProfileStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut XmlProfileStore {
        &mut self.store
    }

    /// Select a target quality and pull its parameters and extension
    pub fn update(&mut self, quality: &str) -> Result<()> {
        let preset = self
            .store
            .find_preset(quality)
            .ok_or_else(|| Error::ProfileNotFound(quality.to_string()))?;

        self.params = Some(preset.attr(PresetAttr::PresetParams).to_string());
        self.extension = Some(preset.attr(PresetAttr::FileExtension).to_string());
        self.quality = Some(quality.to_string());
        debug!(quality, params = ?self.params, "target quality updated");
        Ok(())
    }

    /// Short tag built from the capitals of the quality name:
    /// `MP4 Widescreen HD (16:9)` -> `[MP4WHD]`
    pub fn quality_tag(&self) -> String {
        quality_tag(self.quality.as_deref().unwrap_or_default())
    }

    pub fn qualities(&self, locale: Locale) -> Vec<(String, Vec<String>)> {
        self.store.qualities(locale)
    }
}

pub fn quality_tag(quality: &str) -> String {
    format!("[{}]", letters_with_digit(quality, |c| c.is_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::store::ProfileDefaults;

    fn profile(dir: &std::path::Path) -> ConversionProfile {
        let store =
            XmlProfileStore::open(dir.join("profiles.xml"), ProfileDefaults::default()).unwrap();
        ConversionProfile::new(store)
    }

    #[test]
    fn update_pulls_params_and_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let mut profile = profile(tmp.path());

        profile.update("DVD Fullscreen PAL (4:3)").unwrap();
        assert_eq!(profile.quality.as_deref(), Some("DVD Fullscreen PAL (4:3)"));
        assert_eq!(
            profile.params.as_deref(),
            Some("-target pal-dvd -aspect 4:3 -threads 0")
        );
        assert_eq!(profile.extension.as_deref(), Some(".mpg"));
    }

    #[test]
    fn update_accepts_spanish_names() {
        let tmp = tempfile::tempdir().unwrap();
        let mut profile = profile(tmp.path());
        profile.update("MKV H264 Alta Calidad").unwrap();
        assert_eq!(profile.extension.as_deref(), Some(".mkv"));
    }

    #[test]
    fn update_unknown_quality_keeps_previous_selection() {
        let tmp = tempfile::tempdir().unwrap();
        let mut profile = profile(tmp.path());
        profile.update("MP4 Fullscreen (4:3)").unwrap();

        let err = profile.update("Betamax").unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound(q) if q == "Betamax"));
        assert_eq!(profile.quality.as_deref(), Some("MP4 Fullscreen (4:3)"));
    }

    #[test]
    fn quality_tags() {
        assert_eq!(quality_tag("MP4 Widescreen HD (16:9)"), "[MP4WHD]");
        assert_eq!(quality_tag("DVD Fullscreen PAL (4:3)"), "[DVDFPAL]");
        assert_eq!(quality_tag("lowercase only"), "[]");

        let tmp = tempfile::tempdir().unwrap();
        let mut profile = profile(tmp.path());
        assert_eq!(profile.quality_tag(), "[]");
        profile.update("WEBM Fullscreen (4:3)").unwrap();
        assert_eq!(profile.quality_tag(), "[WEBMF]");
    }
}
