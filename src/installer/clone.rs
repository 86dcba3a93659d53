//! Repository clone backend.
//!
//! `Cloner` is the seam installs go through to materialize remote content.
//! `GitCli` is the production implementation that runs the `git` program.

use super::transport::{Progress, ProgressFn};
use super::InstallOptions;
use crate::error::InstallError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, trace};

/// `<phase>: NN% (done/total)`, optionally relayed by the remote.
static PROGRESS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:remote: )?([A-Za-z ]+):\s+\d+% \((\d+)/(\d+)\)").expect("valid regex")
});

const RECEIVING: &str = "Receiving objects";

#[async_trait]
pub trait Cloner: Send + Sync {
    /// Clone `url` at branch `reference` into `dest`, which must not exist.
    ///
    /// Reports transfer progress through `options.progress` and stops with
    /// [`InstallError::Aborted`] once `options.abort` fires.
    async fn clone_repo(
        &self,
        url: &str,
        reference: &str,
        dest: &Path,
        options: &InstallOptions,
    ) -> Result<(), InstallError>;

    /// Branch names published by `url`.
    async fn list_refs(&self, url: &str) -> Result<Vec<String>, InstallError>;
}

/// Clones by spawning the `git` command line.
pub struct GitCli {
    program: String,
}

impl GitCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.env("GIT_TERMINAL_PROMPT", "0").kill_on_drop(true);
        command
    }

    fn clone_error(url: &str, message: String) -> InstallError {
        InstallError::Clone {
            url: url.to_string(),
            message,
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl Cloner for GitCli {
    async fn clone_repo(
        &self,
        url: &str,
        reference: &str,
        dest: &Path,
        options: &InstallOptions,
    ) -> Result<(), InstallError> {
        let mut command = self.command();
        command
            .arg("clone")
            .arg("--progress")
            .arg("--single-branch")
            .arg("--branch")
            .arg(reference)
            .arg(url)
            .arg(dest)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        debug!(url, reference, dest = %dest.display(), "Cloning");

        let mut child = command.spawn().map_err(|e| {
            Self::clone_error(url, format!("Failed to execute {}: {}", self.program, e))
        })?;
        let stderr = child.stderr.take();
        let progress = options.progress.clone();
        let finished = async {
            let diagnostics = match stderr {
                Some(stderr) => read_clone_output(stderr, progress.as_ref()).await,
                None => String::new(),
            };
            (child.wait().await, diagnostics)
        };

        let (status, diagnostics) = match &options.abort {
            Some(signal) => {
                tokio::select! {
                    result = finished => result,
                    _ = signal.aborted() => return Err(InstallError::Aborted(url.to_string())),
                }
            }
            None => finished.await,
        };
        let status = status.map_err(|e| {
            Self::clone_error(url, format!("Failed to wait for {}: {}", self.program, e))
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(Self::clone_error(url, diagnostics))
        }
    }

    async fn list_refs(&self, url: &str) -> Result<Vec<String>, InstallError> {
        let mut command = self.command();
        command.arg("ls-remote").arg("--heads").arg(url);
        let output = command.output().await.map_err(|e| {
            Self::clone_error(url, format!("Failed to execute {}: {}", self.program, e))
        })?;
        if !output.status.success() {
            return Err(Self::clone_error(
                url,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_heads(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Object counts from one `git clone --progress` line.
///
/// Returns the phase name with its progress; `None` for any other line.
pub(crate) fn parse_progress_line(line: &str) -> Option<(&str, Progress)> {
    let captures = PROGRESS_LINE.captures(line)?;
    let phase = captures.get(1)?.as_str();
    let loaded = captures.get(2)?.as_str().parse().ok()?;
    let total = captures.get(3)?.as_str().parse().ok()?;
    Some((
        phase,
        Progress {
            loaded,
            total: Some(total),
        },
    ))
}

/// Drain git's stderr until it closes.
///
/// Git redraws progress with carriage returns, so `\r` and `\n` both end a
/// line. Received object counts go to `progress`; other non-progress lines
/// are returned for the error message.
pub(crate) async fn read_clone_output<R: AsyncRead + Unpin>(
    mut stderr: R,
    progress: Option<&ProgressFn>,
) -> String {
    let mut diagnostics: Vec<String> = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    let mut handle = |raw: &[u8]| {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        match parse_progress_line(line) {
            Some((phase, report)) => {
                trace!(phase, loaded = report.loaded, "Clone progress");
                if phase == RECEIVING {
                    if let Some(callback) = progress {
                        callback(report);
                    }
                }
            }
            None if !line.is_empty() => diagnostics.push(line.to_string()),
            None => {}
        }
    };

    loop {
        let read = match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        pending.extend_from_slice(&buf[..read]);
        while let Some(end) = pending.iter().position(|b| *b == b'\r' || *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=end).collect();
            handle(&line);
        }
    }
    handle(&pending);

    diagnostics.join("\n")
}

/// Branch names from `git ls-remote --heads` output.
pub(crate) fn parse_heads(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|name| name.strip_prefix("refs/heads/"))
        .map(str::to_string)
        .collect()
}
