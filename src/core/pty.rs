//! Pseudo terminal wrapper
//!
//! Thin layer over `portable-pty`: open a PTY pair at a given size, spawn a
//! shell on the subordinate side and keep the controlling side for I/O.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to spawn shell: {0:#}")]
    Spawn(anyhow::Error),

    #[error("PTY I/O failed: {0}")]
    Io(#[source] io::Error),

    #[error("Session has ended")]
    Closed,

    #[error("Failed to resize PTY: {0:#}")]
    Resize(anyhow::Error),

    #[error("Invalid terminal size {cols}x{rows}")]
    InvalidSize { cols: u16, rows: u16 },
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// Program, arguments and environment for the child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub term: String,
}

impl Default for ShellCommand {
    fn default() -> Self {
        Self::new(default_shell())
    }
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            term: "xterm-256color".to_string(),
        }
    }

    /// Command described by the configuration file
    pub fn from_config(config: &Config) -> Self {
        let program = config.shell.clone().unwrap_or_else(default_shell);
        let mut command = Self::new(program).args(config.shell_args.iter().cloned());
        command.term = config.term.clone();
        command.env = config.env.clone();
        command
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    fn to_builder(&self) -> CommandBuilder {
        let mut builder = CommandBuilder::new(&self.program);
        builder.args(&self.args);
        builder.env("TERM", &self.term);
        builder.env("COLORTERM", "truecolor");
        builder.env("TERM_PROGRAM", "lexterm");
        for (key, value) in &self.env {
            builder.env(key, value);
        }
        match &self.cwd {
            Some(dir) => builder.cwd(dir),
            None => {
                if let Ok(dir) = std::env::current_dir() {
                    builder.cwd(dir);
                }
            }
        }
        builder
    }
}

/// `$SHELL` if it points at an existing file, otherwise `/bin/sh`
pub fn default_shell() -> String {
    if let Ok(shell) = std::env::var("SHELL") {
        if !shell.is_empty() && Path::new(&shell).exists() {
            return shell;
        }
    }
    "/bin/sh".to_string()
}

/// Controlling side of a PTY with its child process
pub struct Pty {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl Pty {
    /// Open a PTY at `cols x rows` and spawn `command` on it
    pub fn spawn(command: &ShellCommand, cols: u16, rows: u16) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(pty_size(cols, rows))
            .map_err(PtyError::Spawn)?;

        let child = pair
            .slave
            .spawn_command(command.to_builder())
            .map_err(PtyError::Spawn)?;
        // Keeping the subordinate side open would hide EOF from the reader
        drop(pair.slave);

        let writer = pair.master.take_writer().map_err(PtyError::Spawn)?;

        tracing::info!(
            "Spawned {:?} (pid {:?}) at {}x{}",
            command.program,
            child.process_id(),
            cols,
            rows
        );

        Ok(Self {
            master: pair.master,
            writer,
            child,
        })
    }

    /// Write all bytes to the child's input
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).map_err(PtyError::Io)?;
        self.writer.flush().map_err(PtyError::Io)
    }

    /// Notify the kernel (and through it the child) of a new size
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(pty_size(cols, rows))
            .map_err(PtyError::Resize)
    }

    /// Independent reader over the child's output
    pub fn try_clone_reader(&self) -> Result<Box<dyn Read + Send>> {
        self.master
            .try_clone_reader()
            .map_err(|e| PtyError::Io(io::Error::new(io::ErrorKind::Other, format!("{:#}", e))))
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Whether the child is still running
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Exit code once the child has exited
    pub fn exit_code(&mut self) -> Option<u32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            _ => None,
        }
    }

    /// Terminate the child
    pub fn kill(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.child.kill().map_err(PtyError::Io)
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            tracing::warn!("Failed to kill child process: {}", e);
        }
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_methods() {
        let command = ShellCommand::new("/bin/sh")
            .arg("-c")
            .arg("true")
            .env("FOO", "bar")
            .cwd("/tmp");
        assert_eq!(command.program, "/bin/sh");
        assert_eq!(command.args, vec!["-c", "true"]);
        assert_eq!(command.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(command.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(command.term, "xterm-256color");
    }

    #[test]
    fn test_command_from_config() {
        let mut config = Config::default();
        config.shell = Some("/bin/bash".to_string());
        config.shell_args = vec!["-l".to_string()];
        config.term = "xterm".to_string();
        config.env.insert("EDITOR".to_string(), "vim".to_string());

        let command = ShellCommand::from_config(&config);
        assert_eq!(command.program, "/bin/bash");
        assert_eq!(command.args, vec!["-l"]);
        assert_eq!(command.term, "xterm");
        assert_eq!(command.env.get("EDITOR").map(String::as_str), Some("vim"));
    }

    #[test]
    fn test_default_shell_is_not_empty() {
        assert!(!default_shell().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_and_exit_code() {
        let command = ShellCommand::new("/bin/sh").args(["-c", "exit 3"]);
        let mut pty = Pty::spawn(&command, 80, 24).unwrap();
        assert!(pty.process_id().is_some());

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while pty.is_running() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert_eq!(pty.exit_code(), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_missing_program_fails() {
        let command = ShellCommand::new("/nonexistent/lexterm-shell");
        assert!(matches!(
            Pty::spawn(&command, 80, 24),
            Err(PtyError::Spawn(_))
        ));
    }
}
