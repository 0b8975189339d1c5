use crate::convert::command::{ConversionJob, ConversionOptions};
use crate::error::{Error, Result};
use crate::media::{MediaList, TaskStatus};
use crate::process::{ConversionProcess, ConversionProgress};
use crate::profile::ConversionProfile;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

/// What happened to each task while the queue ran
#[derive(Debug, Clone, Serialize)]
pub enum ConversionEvent {
    Started {
        id: Uuid,
        input: PathBuf,
        output: PathBuf,
    },
    Progress {
        id: Uuid,
        percent: f64,
        progress: ConversionProgress,
    },
    Finished {
        id: Uuid,
        output: PathBuf,
    },
    Failed {
        id: Uuid,
        error: String,
    },
    Stopped {
        id: Uuid,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub done: usize,
    pub failed: usize,
    pub stopped: bool,
}

enum Outcome {
    Exited(Result<()>),
    Cancelled,
}

/// Runs the media list through ffmpeg, one task at a time
pub struct Converter {
    ffmpeg: PathBuf,
    options: ConversionOptions,
}

impl Converter {
    pub fn new(ffmpeg: impl Into<PathBuf>, options: ConversionOptions) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            options,
        }
    }

    /// Convert every pending task in order.
    ///
    /// Setting `cancel` to `true` stops the running ffmpeg, marks its task
    /// `Stopped`, deletes the partial output and ends the run. A failing task
    /// is marked `Failed` and the queue moves on.
    pub async fn run_queue(
        &self,
        list: &mut MediaList,
        profile: &mut ConversionProfile,
        mut on_event: impl FnMut(ConversionEvent),
        mut cancel: watch::Receiver<bool>,
    ) -> Result<QueueSummary> {
        std::fs::create_dir_all(&self.options.output_dir)?;
        let mut summary = QueueSummary::default();

        while let Some(task) = list.next_pending() {
            if *cancel.borrow() {
                summary.stopped = true;
                break;
            }

            let id = task.id;
            let video = task.video.clone();
            let quality = task.quality.clone();

            if let Err(e) = profile.update(&quality) {
                warn!(id = %id, quality = %quality, "no preset for task");
                list.set_status(id, TaskStatus::Failed)?;
                summary.failed += 1;
                on_event(ConversionEvent::Failed {
                    id,
                    error: e.to_string(),
                });
                continue;
            }

            let job = ConversionJob::new(
                &video,
                profile.params.as_deref().unwrap_or_default(),
                profile.extension.as_deref().unwrap_or_default(),
                &profile.quality_tag(),
                &self.options,
            );

            list.set_status(id, TaskStatus::Running)?;
            on_event(ConversionEvent::Started {
                id,
                input: job.input.clone(),
                output: job.output.clone(),
            });
            info!(id = %id, input = %job.input.display(), output = %job.output.display(), "conversion started");

            let mut process = match ConversionProcess::spawn(&self.ffmpeg, job.build_args()).await {
                Ok(p) => p,
                Err(e @ Error::FfmpegNotFound) => {
                    list.set_status(id, TaskStatus::Failed)?;
                    return Err(e);
                }
                Err(e) => {
                    list.set_status(id, TaskStatus::Failed)?;
                    summary.failed += 1;
                    on_event(ConversionEvent::Failed {
                        id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let duration = video.duration().unwrap_or(0.0);
            let mut progress_rx = process.subscribe_progress();
            let mut progress_open = true;
            let mut cancel_open = true;

            let outcome = {
                let wait = process.wait();
                tokio::pin!(wait);
                loop {
                    tokio::select! {
                        res = &mut wait => break Outcome::Exited(res),
                        changed = progress_rx.changed(), if progress_open => {
                            if changed.is_err() {
                                progress_open = false;
                                continue;
                            }
                            let progress = progress_rx.borrow_and_update().clone();
                            on_event(ConversionEvent::Progress {
                                id,
                                percent: progress.percent(duration),
                                progress,
                            });
                        }
                        changed = cancel.changed(), if cancel_open => {
                            if changed.is_err() {
                                cancel_open = false;
                            } else if *cancel.borrow_and_update() {
                                break Outcome::Cancelled;
                            }
                        }
                    }
                }
            };

            match outcome {
                Outcome::Exited(Ok(())) => {
                    list.set_status(id, TaskStatus::Done)?;
                    summary.done += 1;
                    info!(id = %id, output = %job.output.display(), "conversion finished");
                    if self.options.delete_original {
                        if let Err(e) = std::fs::remove_file(&job.input) {
                            warn!(input = %job.input.display(), error = %e, "could not delete original");
                        }
                    }
                    on_event(ConversionEvent::Finished {
                        id,
                        output: job.output,
                    });
                }
                Outcome::Exited(Err(e)) => {
                    list.set_status(id, TaskStatus::Failed)?;
                    summary.failed += 1;
                    warn!(id = %id, error = %e, "conversion failed");
                    on_event(ConversionEvent::Failed {
                        id,
                        error: e.to_string(),
                    });
                }
                Outcome::Cancelled => {
                    let stopped = process.stop_graceful().await;
                    mark_stopped(list, id, &job.output, stopped)?;
                    summary.stopped = true;
                    on_event(ConversionEvent::Stopped { id });
                    break;
                }
            }
        }

        Ok(summary)
    }
}

/// The task ends `Stopped` without its partial output even when ffmpeg
/// could not be stopped cleanly
fn mark_stopped(list: &mut MediaList, id: Uuid, output: &Path, stopped: Result<()>) -> Result<()> {
    list.set_status(id, TaskStatus::Stopped)?;
    remove_partial(output);
    match stopped {
        Ok(()) => info!(id = %id, "conversion stopped"),
        Err(e) => warn!(id = %id, error = %e, "ffmpeg did not stop cleanly"),
    }
    Ok(())
}

fn remove_partial(output: &Path) {
    if output.exists() {
        if let Err(e) = std::fs::remove_file(output) {
            warn!(output = %output.display(), error = %e, "could not remove partial output");
        }
    }
}
