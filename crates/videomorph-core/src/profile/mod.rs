pub mod conversion;
pub mod store;

pub use conversion::ConversionProfile;
pub use store::{
    parse_profiles, preset_tag, write_profiles, Preset, PresetAttr, Profile, ProfileDefaults,
    XmlProfileStore, VIDEO_EXTENSIONS,
};
