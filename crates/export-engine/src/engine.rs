//! The external media engine.
//!
//! The export pipeline only needs four things from an engine: a private input
//! space to write named files into, a way to run a token-list command with
//! progress, and a way to read the result back. [`FfmpegEngine`] provides
//! them with a per-session working directory and the `ffmpeg` binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use framecut_common::config::EngineConfig;
use framecut_common::error::{FramecutError, FramecutResult};

/// Creates a fresh engine each time the export service (re)initialises.
pub type EngineFactory = Box<dyn Fn() -> Box<dyn MediaEngine> + Send + Sync>;

/// What a successful run left behind.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub stderr: String,
}

/// Abstract interface for the media-encoding engine.
#[async_trait::async_trait]
pub trait MediaEngine: Send {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Start the engine and allocate its input space.
    async fn load(&mut self) -> FramecutResult<()>;

    /// Store `data` under `name` in the input space.
    async fn write_file(&mut self, name: &str, data: &[u8]) -> FramecutResult<()>;

    /// Run a command. `on_progress` receives the completed fraction in
    /// `[0, 1]` relative to `expected_duration_secs`.
    async fn exec(
        &mut self,
        args: &[String],
        expected_duration_secs: f64,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> FramecutResult<ExecOutcome>;

    /// Read a file produced by a previous [`MediaEngine::exec`].
    async fn read_file(&mut self, name: &str) -> FramecutResult<Vec<u8>>;

    /// Release all engine state. Safe to call more than once.
    async fn terminate(&mut self) -> FramecutResult<()>;
}

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Engine backed by the `ffmpeg` binary.
pub struct FfmpegEngine {
    binary: String,
    work_root: PathBuf,
    keep_work_dir: bool,
    session_dir: Option<PathBuf>,
}

impl FfmpegEngine {
    pub fn new(binary: impl Into<String>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_root: work_root.into(),
            keep_work_dir: false,
            session_dir: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.ffmpeg_binary, &config.work_dir).keep_work_dir(config.keep_work_dir)
    }

    /// Leave the session directory on disk after termination.
    pub fn keep_work_dir(mut self, keep: bool) -> Self {
        self.keep_work_dir = keep;
        self
    }

    pub fn session_dir(&self) -> Option<&Path> {
        self.session_dir.as_deref()
    }

    fn session(&self) -> FramecutResult<&Path> {
        self.session_dir
            .as_deref()
            .ok_or(FramecutError::NotInitialized)
    }

    fn path_for(&self, name: &str) -> FramecutResult<PathBuf> {
        if !is_plain_file_name(name) {
            return Err(FramecutError::input_write(
                name,
                "file names must not contain path separators or '..'",
            ));
        }
        Ok(self.session()?.join(name))
    }
}

#[async_trait::async_trait]
impl MediaEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load(&mut self) -> FramecutResult<()> {
        if self.session_dir.is_some() {
            return Ok(());
        }

        let version = probe_version(&self.binary).await?;
        tracing::info!(binary = %self.binary, %version, "ffmpeg available");

        let dir = self.work_root.join(format!(
            "session-{}-{}",
            std::process::id(),
            SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            FramecutError::engine_init(format!(
                "Failed to create work directory {}: {e}",
                dir.display()
            ))
        })?;
        tracing::debug!(dir = %dir.display(), "Engine session directory created");
        self.session_dir = Some(dir);
        Ok(())
    }

    async fn write_file(&mut self, name: &str, data: &[u8]) -> FramecutResult<()> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| FramecutError::input_write(name, e.to_string()))?;
        tracing::debug!(name, bytes = data.len(), "Wrote engine input");
        Ok(())
    }

    async fn exec(
        &mut self,
        args: &[String],
        expected_duration_secs: f64,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> FramecutResult<ExecOutcome> {
        let session = self.session()?.to_path_buf();
        tracing::debug!(?args, "Running ffmpeg");

        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&session)
            .args(["-hide_banner", "-nostats", "-progress", "pipe:1"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = std::time::Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| FramecutError::execution(format!("Failed to start ffmpeg: {e}"), ""))?;
        tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FramecutError::execution("Failed to capture ffmpeg stdout", ""))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FramecutError::execution("Failed to capture ffmpeg stderr", ""))?;

        // ffmpeg blocks once the stderr pipe fills up.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        loop {
            let line = lines.next_line().await.map_err(|e| {
                FramecutError::execution(format!("Failed reading ffmpeg progress: {e}"), "")
            })?;
            let Some(line) = line else {
                break;
            };

            if let Some((key, value)) = line.trim().split_once('=') {
                state.update(key, value);
                if key == "progress" {
                    on_progress(state.fraction(expected_duration_secs));
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| FramecutError::execution(format!("Failed to wait on ffmpeg: {e}"), ""))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        tracing::info!(
            %status,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "ffmpeg process finished"
        );

        if !status.success() {
            let tail = last_lines(&stderr_output, 5);
            return Err(FramecutError::execution(
                format!("ffmpeg exited with {status}: {tail}"),
                stderr_output,
            ));
        }

        on_progress(1.0);
        Ok(ExecOutcome {
            stderr: stderr_output,
        })
    }

    async fn read_file(&mut self, name: &str) -> FramecutResult<Vec<u8>> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FramecutError::FileNotFound { path })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn terminate(&mut self) -> FramecutResult<()> {
        let Some(dir) = self.session_dir.take() else {
            return Ok(());
        };
        if self.keep_work_dir {
            tracing::info!(dir = %dir.display(), "Keeping engine work directory");
            return Ok(());
        }
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// First line of `<binary> -version`; errors when the binary cannot run.
pub async fn probe_version(binary: &str) -> FramecutResult<String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| FramecutError::engine_init(format!("Failed to run {binary}: {e}")))?;

    if !output.status.success() {
        return Err(FramecutError::engine_init(format!(
            "{binary} -version exited with {}",
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

/// Whether `name` stays inside the directory it is joined onto.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\'])
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join(" | ")
}

/// Key/value state accumulated from `-progress` output.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, ffmpeg reports this one in microseconds too.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_duration_secs: f64) -> f64 {
        if self.complete {
            1.0
        } else if expected_duration_secs <= 0.0 {
            0.0
        } else {
            (self.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
        }
    }
}
