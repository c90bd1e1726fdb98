//! Session management
//!
//! A [`Session`] owns a child process attached to a PTY. It is the only
//! writer of the logical terminal size and the only issuer of size-change
//! notifications to the child.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::pty::{Pty, PtyError, Result, ShellCommand};

type EndCallback = Box<dyn FnOnce() + Send>;

/// End-of-session notification shared between the session and its reader.
/// The callback runs at most once, whichever side observes the end first.
pub struct EndSignal {
    fired: AtomicBool,
    callback: Mutex<Option<EndCallback>>,
}

impl EndSignal {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            fired: AtomicBool::new(false),
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// Mark the session ended and run the callback if nobody has yet
    pub fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = match self.callback.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// A shell running behind a PTY
pub struct Session {
    pty: Pty,
    cols: u16,
    rows: u16,
    end: Arc<EndSignal>,
}

impl Session {
    /// Spawn `command` on a new `cols x rows` PTY. `on_end` runs once when
    /// the session ends (reader reached end of stream or [`Session::close`]).
    pub fn spawn<F>(command: &ShellCommand, cols: u16, rows: u16, on_end: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        validate_size(cols, rows)?;
        let pty = Pty::spawn(command, cols, rows)?;
        Ok(Self {
            pty,
            cols,
            rows,
            end: Arc::new(EndSignal::new(on_end)),
        })
    }

    /// Forward bytes verbatim to the child. Fails with [`PtyError::Closed`]
    /// once the session has ended.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.end.is_fired() {
            return Err(PtyError::Closed);
        }
        self.pty.write(data).map_err(|e| {
            tracing::warn!("Write to PTY failed: {}", e);
            e
        })
    }

    /// Resize the PTY. Both dimensions must be non-zero.
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        validate_size(cols, rows)?;
        if self.end.is_fired() {
            return Err(PtyError::Closed);
        }
        self.pty.resize(cols, rows)?;
        self.cols = cols;
        self.rows = rows;
        tracing::debug!("Resized session to {}x{}", cols, rows);
        Ok(())
    }

    /// `(cols, rows)`
    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    pub fn is_running(&mut self) -> bool {
        !self.end.is_fired() && self.pty.is_running()
    }

    pub fn exit_code(&mut self) -> Option<u32> {
        self.pty.exit_code()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.pty.process_id()
    }

    /// Kill the child and fire the end-of-session signal. Closing an ended
    /// session does nothing; the child is still killed on drop.
    pub fn close(&mut self) -> Result<()> {
        if self.end.is_fired() {
            return Ok(());
        }
        let result = self.pty.kill();
        self.end.fire();
        tracing::info!("Session closed");
        result
    }

    pub(crate) fn try_clone_reader(&self) -> Result<Box<dyn Read + Send>> {
        self.pty.try_clone_reader()
    }

    pub(crate) fn end_signal(&self) -> Arc<EndSignal> {
        self.end.clone()
    }
}

fn validate_size(cols: u16, rows: u16) -> Result<()> {
    if cols == 0 || rows == 0 {
        return Err(PtyError::InvalidSize { cols, rows });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_end_signal_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let signal = Arc::new(EndSignal::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                std::thread::spawn(move || signal.fire())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        signal.fire();

        assert!(signal.is_fired());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_size_rejected() {
        let command = ShellCommand::new("/bin/sh");
        assert!(matches!(
            Session::spawn(&command, 0, 24, || {}),
            Err(PtyError::InvalidSize { cols: 0, rows: 24 })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_resize_and_close() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let command = ShellCommand::new("/bin/sh").args(["-c", "sleep 5"]);
        let mut session = Session::spawn(&command, 80, 24, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(session.size(), (80, 24));
        session.resize(100, 30).unwrap();
        session.resize(100, 30).unwrap();
        assert_eq!(session.size(), (100, 30));
        assert!(matches!(
            session.resize(100, 0),
            Err(PtyError::InvalidSize { .. })
        ));
        assert_eq!(session.size(), (100, 30));

        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!session.is_running());
        assert!(matches!(session.write(b"echo hi\n"), Err(PtyError::Closed)));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_fails_after_child_exits() {
        use crate::core::reader::{AsyncReader, ReaderEvent};

        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let command = ShellCommand::new("/bin/sh").args(["-c", "exit 0"]);
        let mut session = Session::spawn(&command, 80, 24, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let (reader, rx) = AsyncReader::channel(&session).unwrap();
        for event in rx.iter() {
            if event == ReaderEvent::Closed {
                break;
            }
        }
        reader.join();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(matches!(session.write(b"echo hi\n"), Err(PtyError::Closed)));
        session.close().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
