//! Fetch engine backed by the external `yt-dlp` binary

use async_trait::async_trait;
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::parser::{
    FILE_MARKER, OutputLine, POSTPROCESS_MARKER, PROGRESS_MARKER, classify_error, error_summary,
    escape_template, is_conversion_step, parse_line,
};
use super::sink::ProgressSink;
use super::traits::{Artifact, FetchCapability, FetchProgress};
use crate::config::ToolsConfig;
use crate::error::{Error, FetchError, Result};
use crate::filesystem::{Filesystem, LocalFilesystem};
use crate::types::{DownloadFormat, DownloadRequest};

/// Number of trailing stderr lines kept for error reporting
const STDERR_TAIL_LINES: usize = 50;

/// yt-dlp based fetch engine
///
/// Runs the binary twice per attempt: once to resolve the title (which names the
/// output file) and once to download. Progress is read from templated output lines,
/// and the child process is killed as soon as cancellation is observed.
///
/// # Examples
///
/// ```no_run
/// use ydl_core::fetch::YtDlpFetcher;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let engine = YtDlpFetcher::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let engine = YtDlpFetcher::from_path().expect("yt-dlp not found in PATH");
/// ```
pub struct YtDlpFetcher {
    binary_path: PathBuf,
    supported_hosts: Vec<String>,
    audio_quality: String,
    filesystem: Arc<dyn Filesystem>,
}

impl YtDlpFetcher {
    /// Create an engine with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            supported_hosts: Vec::new(),
            audio_quality: ToolsConfig::default().audio_quality,
            filesystem: Arc::new(LocalFilesystem),
        }
    }

    /// Attempt to find yt-dlp in PATH
    ///
    /// Returns `None` if the binary is not found.
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Build an engine from the tools configuration
    ///
    /// An explicit `ytdlp_path` wins; otherwise PATH is searched if allowed.
    pub fn from_config(tools: &ToolsConfig) -> Result<Self> {
        let binary_path = match &tools.ytdlp_path {
            Some(path) => path.clone(),
            None if tools.search_path => which::which("yt-dlp")
                .map_err(|e| Error::ExternalTool(format!("yt-dlp not found in PATH: {e}")))?,
            None => {
                return Err(Error::ExternalTool(
                    "no yt-dlp path configured and PATH search is disabled".to_string(),
                ));
            }
        };

        Ok(Self::new(binary_path)
            .with_supported_hosts(tools.supported_hosts.clone())
            .with_audio_quality(tools.audio_quality.clone()))
    }

    /// Restrict the engine to these hosts (and their subdomains); empty allows all
    pub fn with_supported_hosts(mut self, hosts: Vec<String>) -> Self {
        self.supported_hosts = hosts
            .into_iter()
            .map(|h| h.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        self
    }

    /// Quality passed to the MP3 extractor (e.g., "192K")
    pub fn with_audio_quality(mut self, quality: impl Into<String>) -> Self {
        self.audio_quality = quality.into();
        self
    }

    /// Use a different filesystem for output naming and cleanup
    pub fn with_filesystem(mut self, filesystem: Arc<dyn Filesystem>) -> Self {
        self.filesystem = filesystem;
        self
    }

    /// Path of the yt-dlp binary
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn host_allowed(&self, host: &str) -> bool {
        if self.supported_hosts.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.supported_hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    fn format_args(&self, format: DownloadFormat) -> Vec<String> {
        match format {
            DownloadFormat::Audio => vec![
                "-f".to_string(),
                "bestaudio/best".to_string(),
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                self.audio_quality.clone(),
            ],
            DownloadFormat::Video => vec![
                "-f".to_string(),
                "bestvideo+bestaudio/best".to_string(),
                "--merge-output-format".to_string(),
                "mp4".to_string(),
            ],
        }
    }

    /// Ask yt-dlp for the content title without downloading
    async fn resolve_title(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<String>, FetchError> {
        let output = Command::new(&self.binary_path)
            .args(["--no-playlist", "--no-warnings", "--skip-download"])
            .args(["--print", "title", "--", url])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            output = output => output.map_err(|e| {
                FetchError::engine(format!("failed to execute yt-dlp: {e}"))
            })?,
            _ = cancel.cancelled() => return Err(FetchError::cancelled()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::new(
                classify_error(&stderr),
                error_summary(&stderr),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }

    fn download_command(&self, request: &DownloadRequest, template: &Path) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args([
            "--no-playlist",
            "--no-warnings",
            "--newline",
            "--no-color",
            "--progress",
            "--no-simulate",
        ])
        .arg("--progress-template")
        .arg(format!(
            "download:{PROGRESS_MARKER}%(progress._percent_str)s|%(progress.eta)s|%(progress._speed_str)s|%(progress.tmpfilename)s"
        ))
        .arg("--progress-template")
        .arg(format!(
            "postprocess:{POSTPROCESS_MARKER}%(progress.postprocessor)s|%(progress.status)s"
        ))
        .arg("--print")
        .arg(format!("after_move:{FILE_MARKER}%(filepath)s"))
        .arg("-o")
        .arg(template)
        .args(self.format_args(request.format))
        .arg("--")
        .arg(request.url.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }
}

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::Sender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((stream, line)).await.is_err() {
                break;
            }
        }
    });
}

/// Deletes the files an unfinished attempt wrote, unless disarmed
///
/// Runs on every exit path, including the fetch future being dropped mid-flight.
struct IntermediateFiles {
    filesystem: Arc<dyn Filesystem>,
    paths: BTreeSet<PathBuf>,
    armed: bool,
}

impl IntermediateFiles {
    fn new(filesystem: Arc<dyn Filesystem>) -> Self {
        Self {
            filesystem,
            paths: BTreeSet::new(),
            armed: true,
        }
    }

    /// Track a file, plus the name it gets once its `.part` suffix is dropped
    fn track(&mut self, path: &Path) {
        if let Some(finished) = path.to_str().and_then(|p| p.strip_suffix(".part")) {
            self.paths.insert(PathBuf::from(finished));
        }
        self.paths.insert(path.to_path_buf());
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for IntermediateFiles {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for path in &self.paths {
            match self.filesystem.delete_if_exists(path) {
                Ok(true) => tracing::debug!(path = %path.display(), "Removed intermediate file"),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove intermediate file")
                }
            }
        }
    }
}

#[async_trait]
impl FetchCapability for YtDlpFetcher {
    fn supports(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| self.host_allowed(h))
    }

    async fn fetch(
        &self,
        request: &DownloadRequest,
        sink: &mut ProgressSink,
        cancel: &CancellationToken,
    ) -> std::result::Result<Artifact, FetchError> {
        sink.checkpoint()?;

        let title = self.resolve_title(request.url.as_str(), cancel).await?;
        if let Some(title) = &title {
            sink.metadata(title).await?;
        }

        let extension = request.format.extension();
        let planned = self
            .filesystem
            .unique_name(
                &request.destination_dir,
                title.as_deref().unwrap_or_default(),
                extension,
            )
            .map_err(|e| FetchError::engine(format!("cannot name output file: {e}")))?;
        let stem = planned
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());
        let template = request
            .destination_dir
            .join(format!("{}.%(ext)s", escape_template(&stem)));

        let mut intermediates = IntermediateFiles::new(self.filesystem.clone());
        intermediates.track(&planned);
        intermediates.track(&request.destination_dir.join(format!("{stem}.temp.{extension}")));

        tracing::debug!(
            url = %request.url,
            output = %planned.display(),
            format = request.format.as_str(),
            "Starting yt-dlp"
        );

        let mut child = self
            .download_command(request, &template)
            .spawn()
            .map_err(|e| FetchError::engine(format!("failed to execute yt-dlp: {e}")))?;

        let (line_tx, mut lines) = mpsc::channel(64);
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::engine("yt-dlp stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::engine("yt-dlp stderr was not captured"))?;
        forward_lines(stdout, Stream::Stdout, line_tx.clone());
        forward_lines(stderr, Stream::Stderr, line_tx);

        let mut final_path = None;
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        loop {
            let next = tokio::select! {
                next = lines.recv() => next,
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill yt-dlp");
                    }
                    return Err(FetchError::cancelled());
                }
            };
            let Some((stream, line)) = next else {
                break;
            };

            match parse_line(&line) {
                OutputLine::Progress {
                    percent,
                    eta_seconds,
                    speed,
                    tmp_file,
                } => {
                    if let Some(tmp_file) = &tmp_file {
                        intermediates.track(tmp_file);
                    }
                    if let Some(percent) = percent {
                        sink.progress(FetchProgress {
                            percent,
                            eta_seconds,
                            speed,
                            partial_path: tmp_file,
                        })
                        .await?;
                    }
                }
                OutputLine::PostProcess { name, status } => {
                    if status == "started" && is_conversion_step(&name) {
                        tracing::debug!(postprocessor = %name, "Conversion started");
                        sink.processing().await?;
                    }
                }
                OutputLine::FinalPath(path) => {
                    intermediates.track(&path);
                    final_path = Some(path);
                }
                OutputLine::Other => {
                    if stream == Stream::Stderr {
                        if stderr_tail.len() == STDERR_TAIL_LINES {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(line);
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| FetchError::engine(format!("failed to wait for yt-dlp: {e}")))?;
        sink.checkpoint()?;

        if !status.success() {
            let stderr = stderr_tail.make_contiguous().join("\n");
            let kind = classify_error(&stderr);
            tracing::debug!(exit_status = %status, kind = %kind, "yt-dlp failed");
            return Err(FetchError::new(kind, error_summary(&stderr)));
        }

        let path = final_path.unwrap_or(planned);
        if !path.is_file() {
            return Err(FetchError::engine(format!(
                "download finished but {} was not found",
                path.display()
            )));
        }

        intermediates.disarm();
        let artifact = Artifact::new(path);
        Ok(match title {
            Some(title) => artifact.with_title(title),
            None => artifact,
        })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
