//! Decryption providers.
//!
//! A provider turns an encrypted source file and a credential file into the
//! raw diagnostic text of the decryption tool. The parser only ever sees that
//! text, so tests can swap in a provider that returns canned output.
//!
//! # Security
//!
//! - The credential file is never opened or read here; only its path is
//!   handed to the tool
//! - The synthetic inventory lives in a uniquely named temporary file that is
//!   removed when the invocation ends, whatever the outcome
//! - stdin of the tool is closed so a bad credential path cannot block on an
//!   interactive password prompt

use crate::error::{ExtractError, Result};
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of one tool run. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the tool was killed by a signal
    pub status: Option<i32>,
}

impl RawToolOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Source of decrypted diagnostic output.
pub trait DecryptionProvider {
    /// Tool name used in messages.
    fn name(&self) -> &str;

    /// Run the decryption for `source` using the credential at `credential`.
    fn decrypt(&self, source: &Path, credential: &Path) -> Result<RawToolOutput>;
}

/// Check that an input file exists and can be opened.
///
/// `role` names the input in the error message ("YAML", "vault password").
pub fn check_input(role: &'static str, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(ExtractError::InputNotFound {
            role,
            path: path.to_path_buf(),
        });
    }
    File::open(path)?;
    Ok(())
}

/// Invokes `ansible` ad-hoc `debug` against a one-host temporary inventory.
#[derive(Debug, Clone)]
pub struct AnsibleProvider {
    tool: String,
    host: String,
    payload_key: String,
    timeout: Option<Duration>,
    interrupted: Option<Arc<AtomicBool>>,
}

impl AnsibleProvider {
    pub fn new(tool: impl Into<String>, host: impl Into<String>, payload_key: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            host: host.into(),
            payload_key: payload_key.into(),
            timeout: None,
            interrupted: None,
        }
    }

    /// Kill the tool if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Kill the tool as soon as `flag` is set (e.g. by a Ctrl+C handler).
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(flag);
        self
    }

    fn locate_tool(&self) -> Result<PathBuf> {
        which::which(&self.tool).map_err(|_| ExtractError::ToolNotAvailable {
            tool: self.tool.clone(),
        })
    }

    fn command(&self, program: &Path, inventory: &Path, source: &Path, credential: &Path) -> Command {
        let mut extra_vars = OsString::from("@");
        extra_vars.push(source);

        let mut cmd = Command::new(program);
        cmd.arg(&self.host)
            .arg("-i")
            .arg(inventory)
            .arg("--vault-password-file")
            .arg(credential)
            .arg("-e")
            .arg(extra_vars)
            .args(["-m", "debug", "-a"])
            .arg(format!("var={}", self.payload_key))
            .env("ANSIBLE_NOCOLOR", "1")
            .env("ANSIBLE_FORCE_COLOR", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Wait for the child, honoring the timeout and the interrupt flag.
    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let started = Instant::now();

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }

            if self.interrupted.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                kill(child);
                return Err(ExtractError::Interrupted {
                    tool: self.tool.clone(),
                });
            }

            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    kill(child);
                    return Err(ExtractError::ToolTimeout {
                        tool: self.tool.clone(),
                        timeout: limit,
                    });
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl DecryptionProvider for AnsibleProvider {
    fn name(&self) -> &str {
        &self.tool
    }

    fn decrypt(&self, source: &Path, credential: &Path) -> Result<RawToolOutput> {
        check_input("YAML", source)?;
        check_input("vault password", credential)?;

        let program = self.locate_tool()?;
        let inventory = write_inventory(&self.host)?;
        debug!(
            tool = %program.display(),
            inventory = %inventory.path().display(),
            source = %source.display(),
            "invoking decryption tool"
        );

        let mut child = self
            .command(&program, inventory.path(), source, credential)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ExtractError::ToolNotAvailable {
                    tool: self.tool.clone(),
                },
                _ => ExtractError::Io(e),
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait(&mut child)?;

        let output = RawToolOutput {
            stdout: collect(stdout)?,
            stderr: collect(stderr)?,
            status: status.code(),
        };
        debug!(status = ?output.status, stdout_bytes = output.stdout.len(), "tool finished");

        // removes the temporary inventory
        drop(inventory);

        if !output.success() {
            return Err(ExtractError::ToolInvocationFailed {
                tool: self.tool.clone(),
                code: output.status,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

/// Write the one-host inventory to a fresh temporary file.
fn write_inventory(host: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("vault-extract-")
        .suffix(".ini")
        .tempfile()?;
    writeln!(file, "{} ansible_connection=local", host)?;
    file.flush()?;
    Ok(file)
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(error = %e, "failed to kill tool process");
    }
    let _ = child.wait();
}

/// Read a child pipe to the end on its own thread so neither pipe can fill up
/// and stall the tool.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<io::Result<Vec<u8>>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn collect(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> Result<String> {
    let Some(handle) = handle else {
        return Ok(String::new());
    };
    let bytes = handle
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "pipe reader thread panicked"))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
