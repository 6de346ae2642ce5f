use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{error, info};

use crate::error::ProcessError;
use crate::platform::Platform;

/// Builds and runs a child process with the local tool directories on its
/// `PATH`, so a spawned npm finds the bundled node before any system one.
///
/// Two modes: [`capture`](ProcessExecutor::capture) runs to completion and
/// returns stdout (used for `--version` probes), while
/// [`stream`](ProcessExecutor::stream) logs output line by line and hands
/// the raw exit code back to the caller. There are no timeouts: a hung
/// child hangs the enclosing build.
pub struct ProcessExecutor {
    working_directory: PathBuf,
    command: Vec<String>,
    platform: Platform,
    env: HashMap<String, String>,
    extra_paths: Vec<PathBuf>,
}

impl ProcessExecutor {
    pub fn new(
        working_directory: &Path,
        command: Vec<String>,
        platform: Platform,
        env: HashMap<String, String>,
    ) -> ProcessExecutor {
        ProcessExecutor {
            working_directory: working_directory.to_path_buf(),
            command,
            platform,
            env,
            extra_paths: Vec::new(),
        }
    }

    /// Directories prepended to `PATH`, highest priority first. Installers
    /// pass `<install>/node` and friends here.
    pub fn with_paths(mut self, paths: Vec<PathBuf>) -> ProcessExecutor {
        self.extra_paths = paths;
        self
    }

    /// Runs to completion and returns trimmed stdout. A non-zero exit is
    /// an error carrying the merged stdout + stderr.
    pub fn capture(&self) -> Result<String, ProcessError> {
        let mut command = self.build_command();
        let output = command
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.io_error(e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(ProcessError::NonZeroExit {
                command: self.display_command(),
                exit_code: output.status.code(),
                output: format!("{stdout} {stderr}").trim().to_string(),
            })
        }
    }

    /// Spawns the process, logs every output line as it is produced and
    /// returns the raw exit code; deciding whether non-zero is fatal is
    /// the caller's business.
    ///
    /// One reader thread per stream keeps draining while we wait, so a
    /// verbose tool can't fill the OS pipe buffer and deadlock itself.
    pub fn stream(&self) -> Result<i32, ProcessError> {
        let mut command = self.build_command();
        let mut child = command
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.io_error(e))?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let out_reader = spawn_line_logger(stdout, false);
        let err_reader = spawn_line_logger(stderr, true);

        let status = child.wait().map_err(|e| self.io_error(e))?;
        let _ = out_reader.join();
        let _ = err_reader.join();

        Ok(status.code().unwrap_or(-1))
    }

    fn build_command(&self) -> Command {
        let path_value = self.augmented_path();

        let mut command = if self.platform.is_windows() {
            // Windows resolves the executable itself; PATH is adjusted in
            // the child environment only.
            let mut c = Command::new(&self.command[0]);
            c.args(&self.command[1..]);
            c
        } else {
            // A small shell shim re-exports PATH before exec'ing the real
            // command, so the command name itself resolves against the
            // local tool directories.
            let mut c = Command::new("sh");
            c.arg("-c")
                .arg("PATH=\"$NODEKIT_PATH\" exec \"$@\"")
                .arg("sh")
                .args(&self.command);
            c.env("NODEKIT_PATH", &path_value);
            c
        };

        command.current_dir(&self.working_directory);
        command.env("PATH", &path_value);
        // overrides merge into the inherited environment
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }

    fn augmented_path(&self) -> String {
        let separator = if self.platform.is_windows() { ";" } else { ":" };
        let mut parts: Vec<String> = self
            .extra_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        if let Ok(existing) = std::env::var("PATH") {
            parts.push(existing);
        }
        parts.join(separator)
    }

    fn display_command(&self) -> String {
        self.command.join(" ")
    }

    fn io_error(&self, source: std::io::Error) -> ProcessError {
        ProcessError::Io {
            command: self.display_command(),
            source,
        }
    }
}

fn spawn_line_logger<R: Read + Send + 'static>(
    stream: R,
    is_stderr: bool,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if is_stderr {
                        error!("{line}");
                    } else {
                        info!("{line}");
                    }
                }
                Err(_) => break,
            }
        }
    })
}
