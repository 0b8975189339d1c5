use crate::error::{Error, Result};
use crate::media::video::Video;
use crate::probe::ProbeRunner;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    ToDo,
    Running,
    Done,
    Stopped,
    Failed,
    Skipped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::ToDo => "To Convert",
            TaskStatus::Running => "Converting",
            TaskStatus::Done => "Done!",
            TaskStatus::Stopped => "Stopped!",
            TaskStatus::Failed => "Failed!",
            TaskStatus::Skipped => "Skipped!",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub video: Video,
    pub quality: String,
    pub status: TaskStatus,
    pub added_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The queue of files waiting to be converted
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MediaList {
    tasks: Vec<Task>,
}

impl MediaList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe a file and queue it
    pub async fn add_file<R: ProbeRunner>(
        &mut self,
        path: &Path,
        runner: &R,
        quality: &str,
    ) -> Result<Uuid> {
        if self.contains(path) {
            return Err(Error::DuplicateFile(path.to_path_buf()));
        }
        let video = Video::probe(path, runner).await?;
        self.add_video(video, quality)
    }

    pub fn add_video(&mut self, video: Video, quality: &str) -> Result<Uuid> {
        if self.contains(&video.path) {
            return Err(Error::DuplicateFile(video.path));
        }
        if !video.is_valid() {
            return Err(Error::InvalidVideo(video.path));
        }

        let id = Uuid::new_v4();
        info!(id = %id, path = %video.path.display(), quality, "task added");
        self.tasks.push(Task {
            id,
            video,
            quality: quality.to_string(),
            status: TaskStatus::ToDo,
            added_at: Utc::now(),
            finished_at: None,
        });
        Ok(id)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tasks.iter().any(|t| t.video.path == path)
    }

    pub fn remove(&mut self, id: Uuid) -> Result<Task> {
        let idx = self.index_of(id)?;
        debug!(id = %id, "task removed");
        Ok(self.tasks.remove(idx))
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn set_target_quality(&mut self, id: Uuid, quality: &str) -> Result<()> {
        let idx = self.index_of(id)?;
        self.tasks[idx].quality = quality.to_string();
        Ok(())
    }

    /// Change every task's target quality
    pub fn set_all_qualities(&mut self, quality: &str) {
        for task in &mut self.tasks {
            task.quality = quality.to_string();
        }
    }

    pub fn set_status(&mut self, id: Uuid, status: TaskStatus) -> Result<()> {
        let idx = self.index_of(id)?;
        let task = &mut self.tasks[idx];
        task.status = status;
        if matches!(
            status,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Stopped | TaskStatus::Skipped
        ) {
            task.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::ToDo)
    }

    pub fn next_pending(&self) -> Option<&Task> {
        self.pending().next()
    }

    /// Nothing is left to convert
    pub fn is_exhausted(&self) -> bool {
        self.next_pending().is_none()
    }

    /// Seconds of media still waiting for conversion
    pub fn total_duration(&self) -> f64 {
        self.pending().filter_map(|t| t.video.duration()).sum()
    }

    /// Put stopped tasks back in the queue
    pub fn reset_stopped(&mut self) {
        for task in &mut self.tasks {
            if task.status == TaskStatus::Stopped {
                task.status = TaskStatus::ToDo;
                task.finished_at = None;
            }
        }
    }

    fn index_of(&self, id: Uuid) -> Result<usize> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::FakeRunner;
    use crate::probe::ProbeInfo;

    fn video(path: &str, duration: &str) -> Video {
        let mut info = ProbeInfo::default();
        info.format_info
            .insert("duration".to_string(), duration.to_string());
        Video::new(path, info)
    }

    #[test]
    fn add_and_lookup() {
        let mut list = MediaList::new();
        let id = list.add_video(video("/v/a.mkv", "10.0"), "MP4 Fullscreen").unwrap();
        assert_eq!(list.len(), 1);
        let task = list.task(id).unwrap();
        assert_eq!(task.status, TaskStatus::ToDo);
        assert_eq!(task.quality, "MP4 Fullscreen");
        assert!(list.contains(Path::new("/v/a.mkv")));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut list = MediaList::new();
        list.add_video(video("/v/a.mkv", "10.0"), "q").unwrap();
        let err = list.add_video(video("/v/a.mkv", "10.0"), "q").unwrap_err();
        assert!(matches!(err, Error::DuplicateFile(_)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn invalid_videos_are_rejected() {
        let mut list = MediaList::new();
        let err = list.add_video(video("/v/a.txt", "N/A"), "q").unwrap_err();
        assert!(matches!(err, Error::InvalidVideo(_)));
        assert!(list.is_empty());
    }

    #[test]
    fn remove_and_clear() {
        let mut list = MediaList::new();
        let a = list.add_video(video("/v/a.mkv", "1"), "q").unwrap();
        list.add_video(video("/v/b.mkv", "1"), "q").unwrap();

        let removed = list.remove(a).unwrap();
        assert_eq!(removed.video.name(false), "a");
        assert_eq!(list.len(), 1);
        assert!(matches!(list.remove(a), Err(Error::TaskNotFound(_))));

        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn status_drives_pending_queue() {
        let mut list = MediaList::new();
        let a = list.add_video(video("/v/a.mkv", "10"), "q").unwrap();
        let b = list.add_video(video("/v/b.mkv", "20"), "q").unwrap();
        assert!((list.total_duration() - 30.0).abs() < f64::EPSILON);
        assert_eq!(list.next_pending().unwrap().id, a);

        list.set_status(a, TaskStatus::Done).unwrap();
        assert!(list.task(a).unwrap().finished_at.is_some());
        assert_eq!(list.next_pending().unwrap().id, b);
        assert!((list.total_duration() - 20.0).abs() < f64::EPSILON);

        list.set_status(b, TaskStatus::Stopped).unwrap();
        assert!(list.is_exhausted());

        list.reset_stopped();
        assert_eq!(list.next_pending().unwrap().id, b);
        assert_eq!(list.task(a).unwrap().status, TaskStatus::Done);
    }

    #[test]
    fn target_quality_can_change() {
        let mut list = MediaList::new();
        let a = list.add_video(video("/v/a.mkv", "10"), "old").unwrap();
        list.set_target_quality(a, "new").unwrap();
        assert_eq!(list.get(0).unwrap().quality, "new");

        list.set_all_qualities("all");
        assert_eq!(list.get(0).unwrap().quality, "all");
    }

    #[tokio::test]
    async fn add_file_probes_and_queues() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.mpg");
        std::fs::write(&path, b"data").unwrap();

        let mut list = MediaList::new();
        let runner = FakeRunner::default();
        list.add_file(&path, &runner, "q").await.unwrap();
        assert_eq!(runner.calls.lock().unwrap().len(), 4);

        // duplicate is caught before probing again
        let err = list.add_file(&path, &runner, "q").await.unwrap_err();
        assert!(matches!(err, Error::DuplicateFile(_)));
        assert_eq!(runner.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn add_file_rejects_zero_duration() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.mpg");
        std::fs::write(&path, b"").unwrap();

        let mut list = MediaList::new();
        let runner = FakeRunner::with_duration("0");
        let err = list.add_file(&path, &runner, "q").await.unwrap_err();
        assert!(matches!(err, Error::InvalidVideo(_)));
    }
}
