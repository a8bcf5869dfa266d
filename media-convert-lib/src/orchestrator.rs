//! Conversion orchestrator
//!
//! Entry point for a single conversion. Each call walks the same state
//! machine:
//!
//! ```text
//! Validating -> ResourceAcquired -> Converting -> Finalizing -> Succeeded | Failed
//! ```
//!
//! Validation happens before anything touches the filesystem; a rejected
//! request goes from `Validating` straight to `Failed`. Every temp
//! resource acquired afterwards is released in `Finalizing`, which runs on
//! every return path; if the future is dropped instead, the resources'
//! `Drop` impls release them and `kill_on_drop` ends any running tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::audio;
use crate::error::{ConversionError, Result, ValidationError};
use crate::observer::{ConversionObserver, ConversionState, RequestContext, TracingObserver};
use crate::policy::{self, FormatEntry, Strategy};
use crate::process::{ProcessInvocation, ProcessOutput, ProcessRunner, DEFAULT_TAIL_LINES};
use crate::temp::{TempKind, TempResource};
use crate::types::{ConversionRequest, ConversionResult, MediaKind};

const MB: u64 = 1024 * 1024;

/// Maximum accepted input size per media kind, in bytes. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    pub audio: Option<u64>,
    pub image: Option<u64>,
    pub video: Option<u64>,
    pub document: Option<u64>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            audio: None,
            image: Some(50 * MB),
            video: Some(200 * MB),
            document: Some(50 * MB),
        }
    }
}

impl UploadLimits {
    pub fn limit_for(&self, kind: MediaKind) -> Option<u64> {
        match kind {
            MediaKind::Audio => self.audio,
            MediaKind::Image => self.image,
            MediaKind::Video => self.video,
            MediaKind::Document => self.document,
        }
    }
}

/// Programs invoked for the external strategies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommands {
    pub transcoder: String,
    pub document_converter: String,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            transcoder: "ffmpeg".to_string(),
            document_converter: "soffice".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Directory temp files and directories are created in
    pub temp_dir: PathBuf,
    pub limits: UploadLimits,
    pub tools: ToolCommands,
    /// Output lines kept for `ExternalTool` diagnostics
    pub tail_lines: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            limits: UploadLimits::default(),
            tools: ToolCommands::default(),
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

/// Runs conversions; cheap to share behind an `Arc`
pub struct Converter {
    config: ConverterConfig,
    runner: ProcessRunner,
    observer: Arc<dyn ConversionObserver>,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        let runner = ProcessRunner::new(config.tail_lines);
        Self {
            config,
            runner,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConversionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Convert `request`, or fail with a classified error.
    ///
    /// Firing `cancel` kills a running external tool or stops the in-process
    /// decoder at the next frame boundary; the call then returns `Cancelled`.
    pub async fn convert(
        &self,
        request: ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<ConversionResult> {
        let started = Instant::now();
        let format = request.normalized_format();
        let ctx = RequestContext {
            request_id: &request.request_id,
            kind: request.source_kind,
            format: &format,
            input_bytes: request.source_bytes.len() as u64,
        };

        self.observer.on_state(&ctx, ConversionState::Validating);

        // Nothing is acquired yet, so a rejected request skips Finalizing
        let entry = match self.validate(&request, &format) {
            Ok(entry) => entry,
            Err(e) => return self.finish(&ctx, Err(e), started),
        };

        let mut resources: Vec<TempResource> = Vec::with_capacity(2);
        let outcome = self
            .execute(&request, entry, &ctx, &mut resources, cancel)
            .await;

        self.observer.on_state(&ctx, ConversionState::Finalizing);
        for mut resource in resources.drain(..) {
            if resource.release() {
                self.observer
                    .on_resource_released(&ctx, resource.kind(), resource.path());
            }
        }

        self.finish(&ctx, outcome, started)
    }

    /// Report the terminal state and hand the outcome back
    fn finish(
        &self,
        ctx: &RequestContext<'_>,
        outcome: Result<ConversionResult>,
        started: Instant,
    ) -> Result<ConversionResult> {
        let elapsed = started.elapsed();
        match outcome {
            Ok(result) => {
                self.observer.on_state(ctx, ConversionState::Succeeded);
                self.observer
                    .on_succeeded(ctx, result.bytes.len() as u64, elapsed);
                Ok(result)
            }
            Err(e) => {
                self.observer.on_state(ctx, ConversionState::Failed);
                self.observer.on_failed(ctx, &e, elapsed);
                Err(e)
            }
        }
    }

    fn validate(&self, request: &ConversionRequest, format: &str) -> Result<&'static FormatEntry> {
        let kind = request.source_kind;
        let entry = policy::entry_for(kind, format).ok_or_else(|| {
            ValidationError::UnsupportedFormat {
                kind,
                format: request.target_format.clone(),
                supported: policy::supported_formats_display(kind),
            }
        })?;

        let size = request.source_bytes.len() as u64;
        if let Some(limit) = self.config.limits.limit_for(kind) {
            if size > limit {
                return Err(ValidationError::TooLarge { kind, size, limit }.into());
            }
        }

        Ok(entry)
    }

    fn acquire(
        &self,
        ctx: &RequestContext<'_>,
        resources: &mut Vec<TempResource>,
        kind: TempKind,
        prefix: &str,
        suffix: &str,
    ) -> Result<PathBuf> {
        let resource = TempResource::acquire(&self.config.temp_dir, kind, prefix, suffix)?;
        let path = resource.path().to_path_buf();
        self.observer.on_resource_acquired(ctx, kind, &path);
        resources.push(resource);
        Ok(path)
    }

    async fn execute(
        &self,
        request: &ConversionRequest,
        entry: &'static FormatEntry,
        ctx: &RequestContext<'_>,
        resources: &mut Vec<TempResource>,
        cancel: &CancellationToken,
    ) -> Result<ConversionResult> {
        let kind = request.source_kind;

        let input = self.acquire(
            ctx,
            resources,
            TempKind::File,
            &format!("{}_input_", kind),
            &request.source_extension(),
        )?;
        tokio::fs::write(&input, &request.source_bytes)
            .await
            .map_err(|e| ConversionError::resource("writing upload to temp file", e))?;

        let output = match entry.strategy {
            Strategy::DocumentConverter => {
                self.acquire(ctx, resources, TempKind::Directory, "document_conversion_", "")?
            }
            _ => self.acquire(
                ctx,
                resources,
                TempKind::File,
                &format!("{}_output_", kind),
                &format!(".{}", entry.format),
            )?,
        };
        self.observer.on_state(ctx, ConversionState::ResourceAcquired);

        if cancel.is_cancelled() {
            return Err(ConversionError::Cancelled);
        }

        self.observer.on_state(ctx, ConversionState::Converting);
        let bytes = match entry.strategy {
            Strategy::InProcessPcm => {
                decode_to_wav_file(&input, &output, cancel).await?;
                read_output(&output).await?
            }
            Strategy::Transcoder => {
                let arguments = policy::transcoder_arguments(kind, &input, &output);
                let run = self
                    .run_tool(&self.config.tools.transcoder, arguments, cancel)
                    .await?;
                let bytes = read_output(&output).await?;
                if bytes.is_empty() {
                    return Err(missing_output(&self.config.tools.transcoder, run));
                }
                bytes
            }
            Strategy::DocumentConverter => {
                let tool = &self.config.tools.document_converter;
                let arguments = policy::document_converter_arguments(entry.format, &input, &output);
                let run = self.run_tool(tool, arguments, cancel).await?;
                match find_document_output(&output, entry.format).await? {
                    Some(path) => {
                        let bytes = read_output(&path).await?;
                        if bytes.is_empty() {
                            return Err(missing_output(tool, run));
                        }
                        bytes
                    }
                    None => return Err(missing_output(tool, run)),
                }
            }
        };

        Ok(ConversionResult {
            bytes,
            mime_type: entry.mime_type,
            suggested_filename: request.suggested_filename(),
        })
    }

    async fn run_tool(
        &self,
        program: &str,
        arguments: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        let invocation = ProcessInvocation::new(program, arguments);
        self.runner.run(&invocation, cancel).await
    }
}

/// Decode the MPEG audio at `input` on the blocking pool and write a WAV file to `output`
async fn decode_to_wav_file(input: &Path, output: &Path, cancel: &CancellationToken) -> Result<()> {
    // Stops the decoder if this future is dropped
    let token = cancel.child_token();
    let _guard = token.clone().drop_guard();

    let input = input.to_path_buf();
    let wav = tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&input)
            .map_err(|e| ConversionError::resource("opening audio input", e))?;
        audio::mpeg_to_wav(file, Some(&token))
    })
    .await
    .map_err(|e| ConversionError::resource("audio decode task", e.into()))??;

    tokio::fs::write(output, &wav)
        .await
        .map_err(|e| ConversionError::resource("writing WAV output", e))
}

async fn read_output(path: &Path) -> Result<Bytes> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|e| ConversionError::resource(format!("reading output {}", path.display()), e))
}

/// First entry in `dir` (by name) whose name ends with `.<format>`.
///
/// The document converter names its output after the input; matching on the
/// extension alone can pick the wrong file if the tool ever writes more than
/// one.
async fn find_document_output(dir: &Path, format: &str) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConversionError::resource("listing document output directory", e))?;

    let suffix = format!(".{}", format.to_ascii_lowercase());
    let mut candidates = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConversionError::resource("listing document output directory", e))?
    {
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && name.ends_with(&suffix) {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Exit status 0 but nothing usable was written
fn missing_output(program: &str, run: ProcessOutput) -> ConversionError {
    let tool = Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string());
    tracing::warn!(tool = %tool, "tool exited successfully but produced no output");
    ConversionError::ExternalTool {
        tool,
        exit_code: run.exit_code,
        last_output_lines: run.combined_output,
    }
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .finish()
    }
}

/// Cancel `token` once `timeout` elapses. Dropping the returned guard stops the timer.
pub fn cancel_after(token: &CancellationToken, timeout: Duration) -> tokio_util::sync::DropGuard {
    let timer = CancellationToken::new();
    let stop = timer.clone();
    let target = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "conversion deadline reached; cancelling");
                target.cancel();
            }
            _ = stop.cancelled() => {}
        }
    });
    timer.drop_guard()
}
