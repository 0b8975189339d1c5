pub mod list;
pub mod video;

pub use list::{MediaList, Task, TaskStatus};
pub use video::{format_duration, format_size, Video};
