use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ProcessState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConversionProgress {
    pub frame: u64,
    pub fps: f64,
    pub time: String,
    pub speed: String,
    pub size_kb: u64,
}

impl ConversionProgress {
    /// Seconds of output written so far, from the `time=` field
    pub fn time_secs(&self) -> Option<f64> {
        parse_timestamp(&self.time)
    }

    /// Completion percentage against the input duration, clamped to 0..=100
    pub fn percent(&self, duration: f64) -> f64 {
        match self.time_secs() {
            Some(done) if duration > 0.0 => (done / duration * 100.0).clamp(0.0, 100.0),
            _ => 0.0,
        }
    }
}

/// A running ffmpeg conversion
pub struct ConversionProcess {
    child: Child,
    // Held apart from `child` since `Child::wait` closes the child's stdin
    stdin: Option<ChildStdin>,
    state_tx: watch::Sender<ProcessState>,
    state_rx: watch::Receiver<ProcessState>,
    progress_rx: watch::Receiver<ConversionProgress>,
    stderr_task: Option<JoinHandle<VecDeque<String>>>,
}

impl ConversionProcess {
    pub async fn spawn(ffmpeg: &Path, args: Vec<String>) -> Result<Self> {
        info!(ffmpeg = %ffmpeg.display(), args = ?args, "spawning ffmpeg");

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::FfmpegNotFound
                } else {
                    Error::Io(e)
                }
            })?;

        let (state_tx, state_rx) = watch::channel(ProcessState::Starting);
        let (progress_tx, progress_rx) = watch::channel(ConversionProgress::default());

        let stdin = child.stdin.take();
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Other("ffmpeg stderr was not captured".into()))?;
        let state_tx_clone = state_tx.clone();

        // ffmpeg rewrites its stats line with '\r', so split on both terminators
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut buf = Vec::new();
            let mut saw_output = false;

            loop {
                buf.clear();
                match reader.read_until(b'\r', &mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }

                let chunk = String::from_utf8_lossy(&buf);
                for line in chunk.split(['\r', '\n']).map(str::trim).filter(|l| !l.is_empty()) {
                    debug!(line = %line, "ffmpeg stderr");

                    if !saw_output && (line.contains("Output #0") || line.contains("frame=")) {
                        saw_output = true;
                        let _ = state_tx_clone.send(ProcessState::Running);
                    }

                    if let Some(progress) = parse_progress(line) {
                        let _ = progress_tx.send(progress);
                    } else {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line.to_string());
                    }
                }
            }
            tail
        });

        Ok(Self {
            child,
            stdin,
            state_tx,
            state_rx,
            progress_rx,
            stderr_task: Some(stderr_task),
        })
    }

    /// Wait for ffmpeg to exit on its own
    pub async fn wait(&mut self) -> Result<()> {
        let status = self.child.wait().await.map_err(Error::Io)?;
        let tail = self.collect_stderr().await;
        self.finish(status, tail)
    }

    fn finish(&self, status: ExitStatus, tail: String) -> Result<()> {
        if status.success() {
            let _ = self.state_tx.send(ProcessState::Finished);
            info!("ffmpeg finished");
            Ok(())
        } else if *self.state_rx.borrow() == ProcessState::Stopping {
            // 'q' makes ffmpeg exit with 255
            let _ = self.state_tx.send(ProcessState::Stopped);
            Ok(())
        } else {
            let _ = self.state_tx.send(ProcessState::Failed);
            warn!(status = ?status, "ffmpeg failed");
            Err(Error::ConversionFailed(if tail.is_empty() {
                format!("ffmpeg exited with {status}")
            } else {
                tail
            }))
        }
    }

    async fn collect_stderr(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => task
                .await
                .map(|lines| lines.into_iter().collect::<Vec<_>>().join("\n"))
                .unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Sends 'q' to stdin for graceful FFmpeg shutdown
    pub async fn stop_graceful(&mut self) -> Result<()> {
        let _ = self.state_tx.send(ProcessState::Stopping);

        match self.stdin.as_mut() {
            Some(stdin) => {
                let sent = match stdin.write_all(b"q").await {
                    Ok(()) => stdin.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    warn!(error = %e, "failed to write 'q' to ffmpeg stdin, force killing");
                    return self.kill().await;
                }
            }
            None => {
                warn!("ffmpeg stdin is closed, force killing");
                return self.kill().await;
            }
        }

        match tokio::time::timeout(std::time::Duration::from_secs(10), self.child.wait()).await {
            Ok(Ok(status)) => {
                let _ = self.state_tx.send(ProcessState::Stopped);
                info!(status = ?status, "ffmpeg stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = self.state_tx.send(ProcessState::Failed);
                Err(Error::Io(e))
            }
            Err(_) => {
                warn!("ffmpeg didn't exit within 10s, force killing");
                self.kill().await
            }
        }
    }

    /// Force kill the FFmpeg process
    pub async fn kill(&mut self) -> Result<()> {
        let _ = self.state_tx.send(ProcessState::Stopping);
        self.child.kill().await.map_err(Error::Io)?;
        let _ = self.child.wait().await;
        let _ = self.state_tx.send(ProcessState::Stopped);
        info!("ffmpeg force killed");
        Ok(())
    }

    pub fn state(&self) -> ProcessState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.state_rx.clone()
    }

    pub fn progress(&self) -> ConversionProgress {
        self.progress_rx.borrow().clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ConversionProgress> {
        self.progress_rx.clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

fn parse_progress(line: &str) -> Option<ConversionProgress> {
    // frame=  123 fps= 60 q=20.0 size=    1234kB time=00:00:02.05 speed=1.00x
    if !line.contains("time=") || !(line.contains("frame=") || line.contains("size=")) {
        return None;
    }

    let mut progress = ConversionProgress::default();

    for part in line.split_whitespace() {
        if let Some(val) = part.strip_prefix("frame=") {
            progress.frame = val.parse().unwrap_or(0);
        } else if let Some(val) = part.strip_prefix("fps=") {
            progress.fps = val.parse().unwrap_or(0.0);
        } else if let Some(val) = part.strip_prefix("time=") {
            progress.time = val.to_string();
        } else if let Some(val) = part.strip_prefix("speed=") {
            progress.speed = val.to_string();
        } else if let Some(val) = part.strip_prefix("size=") {
            let val = val.trim_end_matches("kB").trim_end_matches("KiB");
            progress.size_kb = val.trim().parse().unwrap_or(0);
        }
    }

    // "key=  value" puts the value in the next token
    if progress.frame == 0 {
        progress.frame = value_after(line, "frame=")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
    }
    if progress.fps == 0.0 {
        progress.fps = value_after(line, "fps=")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);
    }
    if progress.size_kb == 0 {
        progress.size_kb = value_after(line, "size=")
            .map(|v| v.trim_end_matches("kB").trim_end_matches("KiB").to_string())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
    }
    if progress.time.is_empty() {
        progress.time = value_after(line, "time=").unwrap_or_default();
    }
    if progress.speed.is_empty() {
        progress.speed = value_after(line, "speed=").unwrap_or_default();
    }

    Some(progress)
}

fn value_after(line: &str, key: &str) -> Option<String> {
    let idx = line.find(key)?;
    let rest = line[idx + key.len()..].trim_start();
    let val: String = rest.chars().take_while(|c| !c.is_whitespace()).collect();
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Parse `HH:MM:SS.ss` (or plain seconds) into seconds
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('-') || value == "N/A" {
        return None;
    }

    let mut secs = 0.0;
    for part in value.split(':') {
        let n: f64 = part.parse().ok()?;
        secs = secs * 60.0 + n;
    }
    Some(secs)
}

/// Run ffprobe and return stdout
pub async fn run_ffprobe(ffprobe: &Path, args: &[String]) -> Result<String> {
    debug!(ffprobe = %ffprobe.display(), args = ?args, "running ffprobe");

    let output = Command::new(ffprobe)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FfprobeNotFound
            } else {
                Error::Io(e)
            }
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Err(Error::ProbeFailed(stderr))
    }
}

/// Run a tool with `-version` and return its first output line
pub async fn tool_version(tool: &Path) -> Result<String> {
    let output = Command::new(tool)
        .arg("-version")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(Error::Io)?;

    if !output.status.success() {
        return Err(Error::FfmpegFailed(format!(
            "{} -version exited with {}",
            tool.display(),
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or("unknown")
        .to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write an executable `sh` script standing in for ffmpeg
    #[cfg(unix)]
    pub(crate) fn fake_ffmpeg(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn parse_progress_standard_line() {
        let line = "frame=  123 fps= 60.0 q=20.0 size=    1234kB time=00:00:02.05 speed=1.00x";
        let progress = parse_progress(line).expect("should parse");
        assert_eq!(progress.frame, 123);
        assert!((progress.fps - 60.0).abs() < 0.1);
        assert_eq!(progress.size_kb, 1234);
        assert_eq!(progress.time, "00:00:02.05");
        assert_eq!(progress.speed, "1.00x");
    }

    #[test]
    fn parse_progress_non_progress_line_returns_none() {
        assert!(parse_progress("Input #0, matroska,webm").is_none());
        assert!(parse_progress("Stream #0:0: Video").is_none());
        assert!(parse_progress("").is_none());
    }

    #[test]
    fn parse_progress_audio_only_line() {
        let line = "size=     512kB time=00:01:00.00 bitrate=  69.9kbits/s speed=30x";
        let progress = parse_progress(line).expect("should parse");
        assert_eq!(progress.frame, 0);
        assert_eq!(progress.size_kb, 512);
        assert_eq!(progress.time_secs(), Some(60.0));
    }

    #[test]
    fn parse_timestamp_variants() {
        assert_eq!(parse_timestamp("00:00:10.50"), Some(10.5));
        assert_eq!(parse_timestamp("01:02:03"), Some(3723.0));
        assert_eq!(parse_timestamp("42.0"), Some(42.0));
        assert_eq!(parse_timestamp("N/A"), None);
        assert_eq!(parse_timestamp("-00:00:00.02"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn percent_is_clamped_to_duration() {
        let progress = ConversionProgress {
            time: "00:00:30.00".to_string(),
            ..Default::default()
        };
        assert!((progress.percent(60.0) - 50.0).abs() < 0.01);
        assert_eq!(progress.percent(10.0), 100.0);
        assert_eq!(progress.percent(0.0), 0.0);
        assert_eq!(ConversionProgress::default().percent(60.0), 0.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn wait_reports_finish_and_last_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(
            tmp.path(),
            r#"echo "Output #0, mp4, to 'out.mp4':" >&2
printf 'frame=   25 fps=0.0 q=28.0 size=     256kB time=00:00:05.00 speed=10x\r' >&2
exit 0"#,
        );

        let mut process = ConversionProcess::spawn(&ffmpeg, vec!["out.mp4".into()]).await.unwrap();
        assert!(process.pid().is_some());
        process.wait().await.unwrap();

        assert_eq!(process.state(), ProcessState::Finished);
        assert_eq!(process.progress().time, "00:00:05.00");
        assert_eq!(process.progress().frame, 25);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn wait_returns_stderr_tail_on_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = fake_ffmpeg(tmp.path(), "echo \"Unknown encoder 'libnope'\" >&2\nexit 1");

        let mut process = ConversionProcess::spawn(&ffmpeg, Vec::new()).await.unwrap();
        match process.wait().await {
            Err(Error::ConversionFailed(msg)) => assert!(msg.contains("Unknown encoder"), "{msg}"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(process.state(), ProcessState::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_graceful_reaches_ffmpeg_after_an_interrupted_wait() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("stdin.txt");
        let ffmpeg = fake_ffmpeg(
            tmp.path(),
            &format!(
                r#"echo "Output #0" >&2
c=$(dd bs=1 count=1 2>/dev/null)
printf '%s' "$c" > '{}'
[ "$c" = q ] && exit 255
exit 0"#,
                marker.display()
            ),
        );

        let mut process = ConversionProcess::spawn(&ffmpeg, Vec::new()).await.unwrap();
        tokio::select! {
            res = process.wait() => panic!("exited before stop: {res:?}"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {}
        }

        let started = std::time::Instant::now();
        process.stop_graceful().await.unwrap();

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(process.state(), ProcessState::Stopped);
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "q");
    }
}
