//! Export orchestration.
//!
//! [`ExportService`] owns one engine and drives a project through
//! `initializing -> processing -> rendering -> finalizing -> completed`,
//! reporting phased progress along the way. Any failure lands in `error`;
//! [`ExportService::terminate`] or a [`TerminationHandle`] lands in
//! `terminated`, after which the service must be initialised again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use framecut_common::config::AppConfig;
use framecut_common::error::{FramecutError, FramecutResult};
use framecut_common::ExportLogger;
use framecut_timeline::{ExportFormat, ExportProject, ExportQuality};

use crate::command::{BuiltCommand, CommandBuilder};
use crate::engine::{EngineFactory, FfmpegEngine, MediaEngine};
use crate::fonts::{DirectoryFontSource, FontManager, FontSource};
use crate::media::{InputDeclaration, MediaPassOutput, MediaProcessor};
use crate::text::{TextPassOutput, TextProcessor};

/// Where an export currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportPhase {
    Idle,
    Initializing,
    Processing,
    Rendering,
    Finalizing,
    Completed,
    Error,
    Terminated,
}

impl ExportPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Processing => "processing",
            Self::Rendering => "rendering",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export progress report.
#[derive(Debug, Clone, Serialize)]
pub struct ExportProgress {
    pub phase: ExportPhase,

    /// Overall progress, 0 to 100.
    pub progress: f64,

    pub message: String,

    /// Everything logged so far in this service.
    pub logs: Vec<String>,
}

/// Progress callback. Invoked inline, so it must not block.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// The rendered file.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

impl ExportArtifact {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Requests termination of an in-flight export from another task.
///
/// The export notices at its next phase boundary.
#[derive(Debug, Clone)]
pub struct TerminationHandle {
    flag: Arc<AtomicBool>,
}

impl TerminationHandle {
    pub fn terminate(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Snapshot of everything the compiler would do for a project.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugData {
    pub project: ProjectSummary,
    pub processing: ProcessingSummary,
    pub command: CommandSummary,
    pub state: ServiceState,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub quality: ExportQuality,
    pub format: ExportFormat,
    pub background_color: Option<String>,
    pub track_count: usize,
    pub media_item_count: usize,
    pub element_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSummary {
    pub video_stages: Vec<String>,
    pub text_stages: Vec<String>,
    pub audio_stages: Vec<String>,
    pub inputs: Vec<InputDeclaration>,
    pub video_layer_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSummary {
    pub command_line: String,
    #[serde(flatten)]
    pub built: BuiltCommand,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceState {
    pub phase: ExportPhase,
    pub initialized: bool,
    pub engine: Option<String>,
    pub fonts_ready: bool,
}

/// Emits progress to the caller's callback.
struct ProgressReporter<'a> {
    callback: Option<&'a ProgressCallback>,
    logger: &'a ExportLogger,
}

impl ProgressReporter<'_> {
    fn report(&self, phase: ExportPhase, progress: f64, message: &str) {
        tracing::debug!(%phase, progress, msg = message, "Export progress");
        if let Some(callback) = self.callback {
            callback(ExportProgress {
                phase,
                progress: progress.clamp(0.0, 100.0),
                message: message.to_string(),
                logs: self.logger.lines(),
            });
        }
    }
}

/// Compiles projects into engine commands and runs them.
pub struct ExportService {
    logger: ExportLogger,
    factory: EngineFactory,
    engine: Option<Box<dyn MediaEngine>>,
    fonts: FontManager,
    media: MediaProcessor,
    text: TextProcessor,
    builder: CommandBuilder,
    on_progress: Option<ProgressCallback>,
    phase: ExportPhase,
    last_command: Option<BuiltCommand>,
    terminate_flag: Arc<AtomicBool>,
}

impl ExportService {
    pub fn new(
        factory: EngineFactory,
        font_source: Arc<dyn FontSource>,
        default_family: impl Into<String>,
    ) -> Self {
        let logger = ExportLogger::new();
        Self {
            factory,
            engine: None,
            fonts: FontManager::new(font_source, default_family, logger.clone()),
            media: MediaProcessor::new(logger.clone()),
            text: TextProcessor::new(logger.clone()),
            builder: CommandBuilder::new(logger.clone()),
            logger,
            on_progress: None,
            phase: ExportPhase::Idle,
            last_command: None,
            terminate_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Service driving the ffmpeg binary with fonts from the configured directory.
    pub fn from_config(config: &AppConfig) -> Self {
        let engine_config = config.engine.clone();
        let factory: EngineFactory = Box::new(move || {
            Box::new(FfmpegEngine::from_config(&engine_config)) as Box<dyn MediaEngine>
        });
        Self::new(
            factory,
            Arc::new(DirectoryFontSource::from_config(&config.fonts)),
            config.fonts.default_family.clone(),
        )
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.on_progress = Some(callback);
    }

    pub fn state(&self) -> ExportPhase {
        self.phase
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    pub fn termination_handle(&self) -> TerminationHandle {
        TerminationHandle {
            flag: self.terminate_flag.clone(),
        }
    }

    /// Most recently assembled command, kept after an execution failure.
    pub fn last_command(&self) -> Option<&BuiltCommand> {
        self.last_command.as_ref()
    }

    pub fn get_logs(&self) -> Vec<String> {
        self.logger.lines()
    }

    pub fn clear_logs(&self) {
        self.logger.clear();
    }

    pub fn logger(&self) -> &ExportLogger {
        &self.logger
    }

    /// Start a fresh engine and load the default font. No-op when already
    /// initialised.
    pub async fn initialize(&mut self) -> FramecutResult<()> {
        if self.engine.is_some() {
            self.logger.log("Engine already initialized");
            return Ok(());
        }

        self.terminate_flag.store(false, Ordering::SeqCst);
        self.set_phase(ExportPhase::Initializing, 0.0, "Initializing engine...");

        match self.start_engine().await {
            Ok(engine) => {
                self.logger
                    .log(format!("{} engine initialized", engine.name()));
                self.engine = Some(engine);
                self.set_phase(ExportPhase::Initializing, 100.0, "Engine initialized successfully");
                self.phase = ExportPhase::Idle;
                Ok(())
            }
            Err(err) => {
                self.logger
                    .error(format!("Engine initialization failed: {err}"));
                self.set_phase(
                    ExportPhase::Error,
                    0.0,
                    &format!("Initialization failed: {err}"),
                );
                Err(err)
            }
        }
    }

    async fn start_engine(&mut self) -> FramecutResult<Box<dyn MediaEngine>> {
        let mut engine = (self.factory)();
        engine.load().await?;

        let default_family = self.fonts.default_family().to_string();
        if let Err(err) = self.fonts.resolve(&default_family).await {
            if let Err(stop_err) = engine.terminate().await {
                self.logger
                    .warn(format!("Engine cleanup after failed init: {stop_err}"));
            }
            return Err(err);
        }
        Ok(engine)
    }

    /// Export `project`, returning the rendered file.
    pub async fn export(&mut self, project: &ExportProject) -> FramecutResult<ExportArtifact> {
        if self.engine.is_none() {
            return Err(FramecutError::NotInitialized);
        }

        match self.run_export(project).await {
            Ok(artifact) => Ok(artifact),
            // A failure after a termination request is part of the teardown.
            Err(err) if self.checkpoint().is_err() => {
                if !matches!(err, FramecutError::Terminated) {
                    self.logger
                        .debug(format!("Error after termination request: {err}"));
                }
                self.logger.warn("Export abandoned after termination request");
                self.shutdown().await;
                Err(FramecutError::Terminated)
            }
            Err(err) => {
                self.logger.error(format!("Export failed: {err}"));
                self.set_phase(ExportPhase::Error, 0.0, &format!("Export failed: {err}"));
                Err(err)
            }
        }
    }

    async fn run_export(&mut self, project: &ExportProject) -> FramecutResult<ExportArtifact> {
        self.checkpoint()?;
        self.set_phase(ExportPhase::Processing, 0.0, "Starting video export...");

        self.write_media_inputs(project).await?;
        self.checkpoint()?;
        self.set_phase(ExportPhase::Processing, 20.0, "Media files loaded");

        let media = self.media.process(project);
        self.set_phase(ExportPhase::Processing, 40.0, "Media elements processed");

        let text = self
            .text
            .process(project, &mut self.fonts, media.layers)
            .await;
        self.write_font_inputs().await?;
        self.checkpoint()?;
        self.set_phase(ExportPhase::Processing, 60.0, "Text overlays processed");

        let command = self.build_command(project, &media, &text);
        self.logger
            .log(format!("Engine command: {}", command.command_line()));
        self.last_command = Some(command.clone());

        self.set_phase(ExportPhase::Rendering, 70.0, "Rendering video...");
        let reporter = ProgressReporter {
            callback: self.on_progress.as_ref(),
            logger: &self.logger,
        };
        let on_engine_progress = |fraction: f64| {
            reporter.report(
                ExportPhase::Rendering,
                70.0 + fraction.clamp(0.0, 1.0) * 20.0,
                "Rendering video...",
            );
        };
        let engine = self.engine.as_mut().ok_or(FramecutError::NotInitialized)?;
        let outcome = engine
            .exec(&command.args, command.duration_secs, &on_engine_progress)
            .await?;
        if !outcome.stderr.is_empty() {
            self.logger.debug(format!(
                "Engine stderr ({} bytes) captured",
                outcome.stderr.len()
            ));
        }
        self.checkpoint()?;
        self.set_phase(ExportPhase::Rendering, 90.0, "Video rendered");

        self.set_phase(ExportPhase::Finalizing, 90.0, "Reading output file...");
        let engine = self.engine.as_mut().ok_or(FramecutError::NotInitialized)?;
        let data = engine.read_file(&command.output_name).await?;
        self.checkpoint()?;

        let artifact = ExportArtifact {
            file_name: command.output_name.clone(),
            mime_type: project.settings.format.mime_type(),
            data,
        };
        self.logger.log(format!(
            "Export produced {} ({} bytes)",
            artifact.file_name,
            artifact.len()
        ));
        self.set_phase(ExportPhase::Completed, 100.0, "Export completed successfully");
        Ok(artifact)
    }

    async fn write_media_inputs(&mut self, project: &ExportProject) -> FramecutResult<()> {
        let engine = self.engine.as_mut().ok_or(FramecutError::NotInitialized)?;
        let mut written = 0usize;
        for item in &project.media_items {
            let Some(payload) = &item.payload else {
                continue;
            };
            let name = item.input_file_name();
            engine.write_file(&name, payload).await?;
            self.logger
                .debug(format!("Loaded media file: {name} ({} bytes)", payload.len()));
            written += 1;
        }
        self.logger.log(format!("Loaded {written} media file(s)"));
        Ok(())
    }

    async fn write_font_inputs(&mut self) -> FramecutResult<()> {
        let engine = self.engine.as_mut().ok_or(FramecutError::NotInitialized)?;
        for (name, bytes) in self.fonts.resources() {
            engine.write_file(name, bytes).await?;
            self.logger.debug(format!("Loaded font file: {name}"));
        }
        Ok(())
    }

    fn build_command(
        &self,
        project: &ExportProject,
        media: &MediaPassOutput,
        text: &TextPassOutput,
    ) -> BuiltCommand {
        let video_stages: Vec<_> = media
            .video_stages
            .iter()
            .chain(&text.text_stages)
            .cloned()
            .collect();
        self.builder.build(
            project,
            &video_stages,
            &media.audio_stages,
            &media.inputs,
            text.layers,
        )
    }

    /// Release the engine and leave the service in `terminated`.
    pub async fn terminate(&mut self) {
        self.terminate_flag.store(true, Ordering::SeqCst);
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        self.logger.log("Terminating export process...");
        if let Some(mut engine) = self.engine.take() {
            if let Err(err) = engine.terminate().await {
                self.logger
                    .error(format!("Error during termination: {err}"));
            }
        }
        self.fonts.clear();
        self.logger.log("Export process terminated");
        self.set_phase(ExportPhase::Terminated, 0.0, "Export terminated");
    }

    /// Compile `project` without touching the engine.
    pub async fn debug_data(&mut self, project: &ExportProject) -> DebugData {
        if !self.fonts.is_ready() {
            let family = self.fonts.default_family().to_string();
            if let Err(err) = self.fonts.resolve(&family).await {
                self.logger
                    .warn(format!("Default font unavailable, text will be skipped: {err}"));
            }
        }

        let media = self.media.process(project);
        let text = self
            .text
            .process(project, &mut self.fonts, media.layers)
            .await;
        let built = self.build_command(project, &media, &text);

        let strings = |stages: &[crate::stage::Stage]| -> Vec<String> {
            stages.iter().map(ToString::to_string).collect()
        };

        DebugData {
            project: ProjectSummary {
                duration: project.duration,
                width: project.settings.width,
                height: project.settings.height,
                fps: project.settings.fps,
                quality: project.settings.quality,
                format: project.settings.format,
                background_color: project.settings.background_color.clone(),
                track_count: project.tracks.len(),
                media_item_count: project.media_items.len(),
                element_count: project.element_count(),
            },
            processing: ProcessingSummary {
                video_stages: strings(&media.video_stages),
                text_stages: strings(&text.text_stages),
                audio_stages: strings(&media.audio_stages),
                inputs: media.inputs.clone(),
                video_layer_count: text.layers.count(),
            },
            command: CommandSummary {
                command_line: built.command_line(),
                built,
            },
            state: ServiceState {
                phase: self.phase,
                initialized: self.is_initialized(),
                engine: self.engine.as_ref().map(|e| e.name().to_string()),
                fonts_ready: self.fonts.is_ready(),
            },
            logs: self.logger.lines(),
        }
    }

    fn checkpoint(&self) -> FramecutResult<()> {
        if self.terminate_flag.load(Ordering::SeqCst) {
            Err(FramecutError::Terminated)
        } else {
            Ok(())
        }
    }

    fn set_phase(&mut self, phase: ExportPhase, progress: f64, message: &str) {
        self.phase = phase;
        ProgressReporter {
            callback: self.on_progress.as_ref(),
            logger: &self.logger,
        }
        .report(phase, progress, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecOutcome;
    use crate::fonts::InMemoryFontSource;
    use framecut_common::ErrorClass;
    use framecut_timeline::{
        ElementTiming, ExportSettings, MediaElement, MediaItem, MediaType, TimelineElement,
        TimelineTrack, TrackType,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeState {
        loads: usize,
        files: HashMap<String, Vec<u8>>,
        execs: Vec<Vec<String>>,
        terminations: usize,
        fail_load: bool,
        fail_exec: bool,
        /// Fired from inside `exec`, as if the user cancelled mid-render.
        terminate_during_exec: Option<TerminationHandle>,
    }

    struct FakeEngine {
        state: Arc<Mutex<FakeState>>,
    }

    #[async_trait::async_trait]
    impl MediaEngine for FakeEngine {
        fn name(&self) -> &str {
            "fake"
        }

        async fn load(&mut self) -> FramecutResult<()> {
            let mut state = self.state.lock().unwrap();
            state.loads += 1;
            if state.fail_load {
                return Err(FramecutError::engine_init("no engine here"));
            }
            Ok(())
        }

        async fn write_file(&mut self, name: &str, data: &[u8]) -> FramecutResult<()> {
            self.state
                .lock()
                .unwrap()
                .files
                .insert(name.to_string(), data.to_vec());
            Ok(())
        }

        async fn exec(
            &mut self,
            args: &[String],
            _expected_duration_secs: f64,
            on_progress: &(dyn Fn(f64) + Send + Sync),
        ) -> FramecutResult<ExecOutcome> {
            let fail = {
                let mut state = self.state.lock().unwrap();
                state.execs.push(args.to_vec());
                if let Some(handle) = &state.terminate_during_exec {
                    handle.terminate();
                }
                state.fail_exec
            };
            if fail {
                return Err(FramecutError::execution("bad graph", "Invalid filter"));
            }
            on_progress(0.5);
            on_progress(1.0);
            let output = args.last().cloned().unwrap_or_default();
            self.state
                .lock()
                .unwrap()
                .files
                .insert(output, b"rendered".to_vec());
            Ok(ExecOutcome::default())
        }

        async fn read_file(&mut self, name: &str) -> FramecutResult<Vec<u8>> {
            self.state
                .lock()
                .unwrap()
                .files
                .get(name)
                .cloned()
                .ok_or_else(|| FramecutError::FileNotFound { path: name.into() })
        }

        async fn terminate(&mut self) -> FramecutResult<()> {
            self.state.lock().unwrap().terminations += 1;
            Ok(())
        }
    }

    fn service_with(state: Arc<Mutex<FakeState>>, fonts: InMemoryFontSource) -> ExportService {
        let factory: EngineFactory = Box::new(move || {
            Box::new(FakeEngine {
                state: state.clone(),
            }) as Box<dyn MediaEngine>
        });
        ExportService::new(factory, Arc::new(fonts), "Inter")
    }

    fn inter() -> InMemoryFontSource {
        InMemoryFontSource::new().with_font("Inter", b"inter-bytes".to_vec())
    }

    fn sample_project() -> ExportProject {
        let mut project = ExportProject::new(ExportSettings::new(1280, 720, 30), 6.0);
        project.media_items.push(
            MediaItem::new("clip", MediaType::Video)
                .with_audio(true)
                .with_payload(b"video".to_vec()),
        );
        project.tracks.push(
            TimelineTrack::new("main", TrackType::Media).with_element(TimelineElement::Media(
                MediaElement {
                    id: "e1".to_string(),
                    name: "Intro".to_string(),
                    media_id: "clip".to_string(),
                    timing: ElementTiming::new(0.0, 6.0),
                },
            )),
        );
        project
    }

    fn recorder(service: &mut ExportService) -> Arc<Mutex<Vec<(ExportPhase, f64)>>> {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        service.set_progress_callback(Box::new(move |p: ExportProgress| {
            sink.lock().unwrap().push((p.phase, p.progress));
        }));
        seen
    }

    #[tokio::test]
    async fn test_export_requires_initialization() {
        let mut service = service_with(Arc::default(), inter());
        let err = service.export(&sample_project()).await.unwrap_err();
        assert!(matches!(err, FramecutError::NotInitialized));
        assert_eq!(service.state(), ExportPhase::Idle);
    }

    #[tokio::test]
    async fn test_full_export_reports_checkpoints() {
        let state: Arc<Mutex<FakeState>> = Arc::default();
        let mut service = service_with(state.clone(), inter());
        let seen = recorder(&mut service);

        service.initialize().await.unwrap();
        service.initialize().await.unwrap();
        assert_eq!(state.lock().unwrap().loads, 1);

        let artifact = service.export(&sample_project()).await.unwrap();
        assert_eq!(artifact.file_name, "output.mp4");
        assert_eq!(artifact.mime_type, "video/mp4");
        assert_eq!(artifact.data, b"rendered".to_vec());
        assert_eq!(service.state(), ExportPhase::Completed);

        {
            let state = state.lock().unwrap();
            assert_eq!(
                state.files.get("media_clip").map(Vec::as_slice),
                Some(&b"video"[..])
            );
            assert!(state.files.contains_key("inter.ttf"));
        }

        let seen = seen.lock().unwrap().clone();
        let export_part: Vec<(ExportPhase, f64)> = seen
            .into_iter()
            .skip_while(|(phase, _)| *phase != ExportPhase::Processing)
            .collect();
        assert_eq!(
            export_part,
            vec![
                (ExportPhase::Processing, 0.0),
                (ExportPhase::Processing, 20.0),
                (ExportPhase::Processing, 40.0),
                (ExportPhase::Processing, 60.0),
                (ExportPhase::Rendering, 70.0),
                (ExportPhase::Rendering, 80.0),
                (ExportPhase::Rendering, 90.0),
                (ExportPhase::Rendering, 90.0),
                (ExportPhase::Finalizing, 90.0),
                (ExportPhase::Completed, 100.0),
            ]
        );

        // Reusable without re-initialising.
        service.export(&sample_project()).await.unwrap();
        assert_eq!(state.lock().unwrap().execs.len(), 2);
    }

    #[tokio::test]
    async fn test_engine_load_failure_is_a_resource_error() {
        let state = Arc::new(Mutex::new(FakeState {
            fail_load: true,
            ..FakeState::default()
        }));
        let mut service = service_with(state, inter());

        let err = service.initialize().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Resource);
        assert_eq!(service.state(), ExportPhase::Error);
        assert!(!service.is_initialized());
    }

    #[tokio::test]
    async fn test_missing_default_font_aborts_initialization() {
        let state: Arc<Mutex<FakeState>> = Arc::default();
        let mut service = service_with(state.clone(), InMemoryFontSource::new());

        let err = service.initialize().await.unwrap_err();
        assert!(matches!(err, FramecutError::Font { .. }));
        assert_eq!(state.lock().unwrap().terminations, 1);
        assert!(!service.is_initialized());
    }

    #[tokio::test]
    async fn test_execution_failure_keeps_command_and_logs() {
        let state = Arc::new(Mutex::new(FakeState {
            fail_exec: true,
            ..FakeState::default()
        }));
        let mut service = service_with(state, inter());
        service.initialize().await.unwrap();

        let err = service.export(&sample_project()).await.unwrap_err();
        assert!(matches!(err, FramecutError::Execution { ref stderr, .. } if stderr == "Invalid filter"));
        assert_eq!(service.state(), ExportPhase::Error);
        assert!(service.last_command().is_some());
        assert!(service.get_logs().iter().any(|l| l.contains("Export failed")));
        assert!(service.is_initialized());
    }

    #[tokio::test]
    async fn test_termination_handle_abandons_export() {
        let state: Arc<Mutex<FakeState>> = Arc::default();
        let mut service = service_with(state.clone(), inter());
        service.initialize().await.unwrap();

        service.termination_handle().terminate();
        let err = service.export(&sample_project()).await.unwrap_err();
        assert!(matches!(err, FramecutError::Terminated));
        assert_eq!(service.state(), ExportPhase::Terminated);
        assert!(!service.is_initialized());
        assert!(state.lock().unwrap().execs.is_empty());
        assert_eq!(state.lock().unwrap().terminations, 1);
    }

    #[tokio::test]
    async fn test_termination_during_render_discards_result() {
        let state: Arc<Mutex<FakeState>> = Arc::default();
        let mut service = service_with(state.clone(), inter());
        let seen = recorder(&mut service);
        service.initialize().await.unwrap();
        state.lock().unwrap().terminate_during_exec = Some(service.termination_handle());

        let result = service.export(&sample_project()).await;
        assert!(matches!(result, Err(FramecutError::Terminated)));
        assert_eq!(service.state(), ExportPhase::Terminated);
        assert!(!service.is_initialized());

        let state = state.lock().unwrap();
        assert_eq!(state.execs.len(), 1);
        assert_eq!(state.terminations, 1);
        let seen = seen.lock().unwrap();
        assert!(!seen.iter().any(|(phase, _)| *phase == ExportPhase::Finalizing));
        assert!(!seen.iter().any(|(phase, _)| *phase == ExportPhase::Completed));
        assert_eq!(seen.last().map(|(phase, _)| *phase), Some(ExportPhase::Terminated));
    }

    #[tokio::test]
    async fn test_engine_failure_after_termination_reports_terminated() {
        let state = Arc::new(Mutex::new(FakeState {
            fail_exec: true,
            ..FakeState::default()
        }));
        let mut service = service_with(state.clone(), inter());
        service.initialize().await.unwrap();
        state.lock().unwrap().terminate_during_exec = Some(service.termination_handle());

        let err = service.export(&sample_project()).await.unwrap_err();
        assert!(matches!(err, FramecutError::Terminated));
        assert_eq!(service.state(), ExportPhase::Terminated);
        assert!(!service
            .get_logs()
            .iter()
            .any(|l| l.contains("Export failed")));
    }

    #[tokio::test]
    async fn test_colliding_media_ids_keep_separate_inputs() {
        let state: Arc<Mutex<FakeState>> = Arc::default();
        let mut service = service_with(state.clone(), inter());
        service.initialize().await.unwrap();

        let mut project = ExportProject::new(ExportSettings::new(1280, 720, 30), 4.0);
        let mut track = TimelineTrack::new("main", TrackType::Media);
        for (id, bytes) in [("clip 1", b"A"), ("clip_1", b"B")] {
            project
                .media_items
                .push(MediaItem::new(id, MediaType::Video).with_payload(bytes.to_vec()));
            track = track.with_element(TimelineElement::Media(MediaElement {
                id: format!("e-{id}"),
                name: String::new(),
                media_id: id.to_string(),
                timing: ElementTiming::new(0.0, 2.0),
            }));
        }
        project.tracks.push(track);

        service.export(&project).await.unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.files.get("media_clip_201").map(Vec::as_slice), Some(&b"A"[..]));
        assert_eq!(state.files.get("media_clip__1").map(Vec::as_slice), Some(&b"B"[..]));
        let args = &state.execs[0];
        assert!(args.windows(2).any(|w| w == ["-i", "media_clip_201"]));
        assert!(args.windows(2).any(|w| w == ["-i", "media_clip__1"]));
    }

    #[tokio::test]
    async fn test_terminate_requires_reinitialization() {
        let state: Arc<Mutex<FakeState>> = Arc::default();
        let mut service = service_with(state.clone(), inter());
        service.initialize().await.unwrap();

        service.terminate().await;
        assert_eq!(service.state(), ExportPhase::Terminated);
        assert!(matches!(
            service.export(&sample_project()).await,
            Err(FramecutError::NotInitialized)
        ));

        service.initialize().await.unwrap();
        assert!(service.export(&sample_project()).await.is_ok());
        assert_eq!(state.lock().unwrap().loads, 2);
    }

    #[tokio::test]
    async fn test_debug_data_never_touches_engine() {
        let state: Arc<Mutex<FakeState>> = Arc::default();
        let mut service = service_with(state.clone(), inter());

        let debug = service.debug_data(&sample_project()).await;
        assert_eq!(debug.processing.video_layer_count, 1);
        assert_eq!(debug.processing.audio_stages, vec!["[1:a]anull[audio_1]"]);
        assert_eq!(debug.command.built.video_map, "overlay_0");
        assert_eq!(debug.command.built.audio_map.as_deref(), Some("audio_1"));
        assert!(debug.command.command_line.starts_with("-f lavfi -i color="));
        assert!(!debug.state.initialized);
        assert_eq!(state.lock().unwrap().loads, 0);

        let json = serde_json::to_value(&debug).unwrap();
        assert_eq!(json["project"]["elementCount"], 1);
        assert_eq!(json["command"]["videoMap"], "overlay_0");
    }

    #[tokio::test]
    async fn test_clear_logs() {
        let mut service = service_with(Arc::default(), inter());
        service.initialize().await.unwrap();
        assert!(!service.get_logs().is_empty());
        service.clear_logs();
        assert!(service.get_logs().is_empty());
    }
}
