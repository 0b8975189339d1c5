pub mod command;
pub mod pipeline;

pub use command::{ConversionCommand, ConversionJob, ConversionOptions};
pub use pipeline::{ConversionEvent, Converter, QueueSummary};
