use crate::config::Locale;
use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ROOT_TAG: &str = "VIDEOMORPH";
const EMBEDDED_PROFILES: &str = include_str!("../../data/profiles.xml");

/// Output extensions ffmpeg can write that the profile store accepts
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mov", ".f4v", ".webm", ".dat", ".ogg", ".mkv", ".wv", ".wmv", ".flv", ".vob", ".avi",
    ".mpg", ".mpeg", ".mp4", ".3gp", ".3g2",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresetAttr {
    PresetName,
    PresetParams,
    FileExtension,
    PresetNameEs,
}

impl PresetAttr {
    fn tag(self) -> &'static str {
        match self {
            PresetAttr::PresetName => "preset_name",
            PresetAttr::PresetParams => "preset_params",
            PresetAttr::FileExtension => "file_extension",
            PresetAttr::PresetNameEs => "preset_name_es",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub tag: String,
    pub name: String,
    pub params: String,
    pub extension: String,
    pub name_es: String,
}

impl Preset {
    pub fn attr(&self, attr: PresetAttr) -> &str {
        match attr {
            PresetAttr::PresetName => &self.name,
            PresetAttr::PresetParams => &self.params,
            PresetAttr::FileExtension => &self.extension,
            PresetAttr::PresetNameEs => &self.name_es,
        }
    }

    pub fn display_name(&self, locale: Locale) -> &str {
        match locale {
            Locale::Spanish => &self.name_es,
            Locale::English => &self.name,
        }
    }

    fn matches(&self, quality: &str) -> bool {
        self.name == quality || self.name_es == quality
    }
}

/// A named group of presets, e.g. `MP4`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub presets: Vec<Preset>,
}

/// Where the pristine profiles come from when the user file must be rebuilt
#[derive(Debug, Clone, Default)]
pub struct ProfileDefaults {
    pub system_file: Option<PathBuf>,
}

impl ProfileDefaults {
    pub fn new(system_file: impl Into<PathBuf>) -> Self {
        Self {
            system_file: Some(system_file.into()),
        }
    }

    /// Installed defaults when present, otherwise the copy built into the binary
    pub fn contents(&self) -> Result<String> {
        match &self.system_file {
            Some(path) if path.is_file() => {
                debug!(path = %path.display(), "reading system profiles");
                Ok(std::fs::read_to_string(path)?)
            }
            _ => Ok(EMBEDDED_PROFILES.to_string()),
        }
    }
}

/// The user's `profiles.xml`, loaded into memory
#[derive(Debug)]
pub struct XmlProfileStore {
    path: PathBuf,
    defaults: ProfileDefaults,
    profiles: Vec<Profile>,
}

impl XmlProfileStore {
    /// Load the user file, rebuilding it from the defaults when it is
    /// missing, empty or unparseable.
    pub fn open(path: impl Into<PathBuf>, defaults: ProfileDefaults) -> Result<Self> {
        let path = path.into();
        let needs_defaults = std::fs::metadata(&path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let mut store = Self {
            path,
            defaults,
            profiles: Vec::new(),
        };
        if needs_defaults {
            store.write_defaults()?;
        }
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Re-read the file from disk, falling back to the defaults on a parse error
    pub fn reload(&mut self) -> Result<()> {
        let text = std::fs::read_to_string(&self.path)?;
        self.profiles = match parse_profiles(&text) {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt profiles file, restoring defaults");
                self.write_defaults()?;
                parse_profiles(&std::fs::read_to_string(&self.path)?)?
            }
        };
        debug!(profiles = self.profiles.len(), "profiles loaded");
        Ok(())
    }

    /// Overwrite the user file with the defaults and reload
    pub fn restore(&mut self) -> Result<()> {
        self.write_defaults()?;
        self.reload()
    }

    fn write_defaults(&self) -> Result<()> {
        let contents = self.defaults.contents()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, contents)?;
        info!(path = %self.path.display(), "default profiles written");
        Ok(())
    }

    /// Add a preset, creating its profile when needed. New entries go first.
    pub fn add_profile(
        &mut self,
        profile_name: &str,
        preset: &str,
        params: &str,
        extension: &str,
    ) -> Result<()> {
        let profile_name = profile_tag(profile_name).ok_or(Error::ProfileBlankName)?;

        let preset = preset.trim();
        if preset.is_empty() {
            return Err(Error::ProfileBlankPreset);
        }
        let params = params.trim();
        if params.is_empty() {
            return Err(Error::ProfileBlankParams);
        }

        let extension = extension.trim().to_lowercase();
        if !extension.starts_with('.') || !VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            return Err(Error::ProfileExtension(extension));
        }

        let tag = preset_tag(preset);
        if tag.is_empty() {
            return Err(Error::ProfileBlankPreset);
        }

        let new_preset = Preset {
            tag,
            name: preset.to_string(),
            params: params.to_string(),
            extension,
            name_es: preset.to_string(),
        };

        match self.profiles.iter_mut().find(|p| p.name == profile_name) {
            Some(profile) => profile.presets.insert(0, new_preset),
            None => self.profiles.insert(
                0,
                Profile {
                    name: profile_name.clone(),
                    presets: vec![new_preset],
                },
            ),
        }

        self.save()?;
        info!(profile = %profile_name, preset, "preset added");
        Ok(())
    }

    /// Copy the user file into `dst_dir`, creating it if needed, and return
    /// the written path
    pub fn export(&self, dst_dir: &Path) -> Result<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("profiles.xml"));
        std::fs::create_dir_all(dst_dir).map_err(|e| Error::from_copy(e, dst_dir.to_path_buf()))?;
        let dst = dst_dir.join(file_name);

        std::fs::copy(&self.path, &dst).map_err(|e| Error::from_copy(e, dst.clone()))?;
        info!(dst = %dst.display(), "profiles exported");
        Ok(dst)
    }

    /// Replace the user file with `src_file` and reload it
    pub fn import(&mut self, src_file: &Path) -> Result<()> {
        if !src_file.is_file() {
            return Err(Error::FileNotFound(src_file.to_path_buf()));
        }
        std::fs::copy(src_file, &self.path).map_err(|e| Error::from_copy(e, self.path.clone()))?;
        info!(src = %src_file.display(), "profiles imported");
        self.reload()
    }

    /// Look up one field of the first preset named `quality` (English or Spanish)
    pub fn attr(&self, quality: &str, attr: PresetAttr) -> Option<&str> {
        self.find_preset(quality).map(|p| p.attr(attr))
    }

    pub fn find_preset(&self, quality: &str) -> Option<&Preset> {
        self.profiles
            .iter()
            .flat_map(|p| p.presets.iter())
            .find(|p| p.matches(quality))
    }

    /// Quality names per profile, in file order
    pub fn qualities(&self, locale: Locale) -> Vec<(String, Vec<String>)> {
        self.profiles
            .iter()
            .map(|profile| {
                let names = profile
                    .presets
                    .iter()
                    .map(|p| p.display_name(locale).to_string())
                    .collect();
                (profile.name.clone(), names)
            })
            .collect()
    }

    fn save(&self) -> Result<()> {
        let bytes = write_profiles(&self.profiles)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        debug!(path = %self.path.display(), "profiles saved");
        Ok(())
    }
}

/// Uppercased profile name usable as an XML element name
fn profile_tag(name: &str) -> Option<String> {
    let mut tag: String = name
        .trim()
        .to_uppercase()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    if tag.is_empty() {
        return None;
    }
    if !tag.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        tag.insert(0, '_');
    }
    Some(tag)
}

/// Every letter of the preset name, each keeping one trailing digit:
/// `MP4 Widescreen HD (16:9)` -> `MP4WidescreenHD`
pub fn preset_tag(preset: &str) -> String {
    letters_with_digit(preset, |c| c.is_ascii_alphabetic() || c == '_')
}

pub(crate) fn letters_with_digit(text: &str, is_letter: impl Fn(char) -> bool) -> String {
    let mut out = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if is_letter(c) {
            out.push(c);
            if let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                out.push(d);
            }
        }
    }
    out
}

fn xml_err(e: impl std::fmt::Display) -> Error {
    Error::Xml(e.to_string())
}

#[derive(Default)]
struct PresetFields {
    tag: String,
    name: Option<String>,
    params: Option<String>,
    extension: Option<String>,
    name_es: Option<String>,
}

impl PresetFields {
    fn set(&mut self, field: &str, value: String) {
        match field {
            "preset_name" => self.name = Some(value),
            "preset_params" => self.params = Some(value),
            "file_extension" => self.extension = Some(value),
            "preset_name_es" => self.name_es = Some(value),
            _ => {}
        }
    }

    fn finish(self) -> Result<Preset> {
        let missing = |field: &str| Error::Xml(format!("preset <{}> lacks <{}>", self.tag, field));
        let name = self.name.clone().ok_or_else(|| missing("preset_name"))?;
        let params = self.params.clone().ok_or_else(|| missing("preset_params"))?;
        let extension = self.extension.clone().ok_or_else(|| missing("file_extension"))?;
        Ok(Preset {
            name_es: self.name_es.unwrap_or_else(|| name.clone()),
            tag: self.tag,
            name,
            params,
            extension,
        })
    }
}

/// Parse `<root><PROFILE><preset>fields</preset></PROFILE></root>`
pub fn parse_profiles(text: &str) -> Result<Vec<Profile>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut profiles: Vec<Profile> = Vec::new();
    let mut preset: Option<PresetFields> = None;
    let mut field: Option<(String, String)> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                depth += 1;
                match depth {
                    1 if saw_root => return Err(Error::Xml("multiple root elements".into())),
                    1 => saw_root = true,
                    2 => profiles.push(Profile {
                        name,
                        presets: Vec::new(),
                    }),
                    3 => {
                        preset = Some(PresetFields {
                            tag: name,
                            ..Default::default()
                        })
                    }
                    4 => field = Some((name, String::new())),
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match depth {
                    0 if saw_root => return Err(Error::Xml("multiple root elements".into())),
                    0 => saw_root = true,
                    1 => profiles.push(Profile {
                        name,
                        presets: Vec::new(),
                    }),
                    2 => {
                        return Err(Error::Xml(format!("preset <{name}> has no fields")));
                    }
                    3 => {
                        if let Some(p) = preset.as_mut() {
                            p.set(&name, String::new());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some((_, value)) = field.as_mut() {
                    value.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Event::CData(c) => {
                if let Some((_, value)) = field.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                match depth {
                    4 => {
                        if let (Some((name, value)), Some(p)) = (field.take(), preset.as_mut()) {
                            p.set(&name, value);
                        }
                    }
                    3 => {
                        if let (Some(p), Some(profile)) = (preset.take(), profiles.last_mut()) {
                            profile.presets.push(p.finish()?);
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(Error::Xml("document has no root element".into()));
    }
    if depth != 0 {
        return Err(Error::Xml("unexpected end of document".into()));
    }
    Ok(profiles)
}

/// Serialize profiles back to the on-disk layout
pub fn write_profiles(profiles: &[Profile]) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new(ROOT_TAG)))
        .map_err(xml_err)?;

    for profile in profiles {
        writer
            .write_event(Event::Start(BytesStart::new(profile.name.as_str())))
            .map_err(xml_err)?;
        for preset in &profile.presets {
            writer
                .write_event(Event::Start(BytesStart::new(preset.tag.as_str())))
                .map_err(xml_err)?;
            for attr in [
                PresetAttr::PresetName,
                PresetAttr::PresetParams,
                PresetAttr::FileExtension,
                PresetAttr::PresetNameEs,
            ] {
                writer
                    .write_event(Event::Start(BytesStart::new(attr.tag())))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::Text(BytesText::new(preset.attr(attr))))
                    .map_err(xml_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new(attr.tag())))
                    .map_err(xml_err)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(preset.tag.as_str())))
                .map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(profile.name.as_str())))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(ROOT_TAG)))
        .map_err(xml_err)?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}
