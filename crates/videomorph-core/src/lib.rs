pub mod config;
pub mod convert;
pub mod doctor;
pub mod error;
pub mod media;
pub mod paths;
pub mod probe;
pub mod process;
pub mod profile;

pub use error::{Error, Result};
