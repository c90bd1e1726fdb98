//! Async PTY reader
//!
//! A dedicated OS thread performs blocking reads on a cloned PTY reader and
//! hands each chunk to a callback in the order it was read. It never touches
//! the [`Lexer`](super::term::Lexer); use [`AsyncReader::channel`] to marshal
//! chunks to the thread that owns the screen.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::pty::{PtyError, Result};
use super::session::{EndSignal, Session};

const READ_BUFFER_SIZE: usize = 0x1000;

/// Events delivered by [`AsyncReader::channel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    Data(Vec<u8>),
    Closed,
}

/// Handle to the background read loop
pub struct AsyncReader {
    handle: Option<JoinHandle<()>>,
}

impl AsyncReader {
    /// Start reading `session` output immediately. `on_data` receives every
    /// non-empty chunk; `on_close` runs once at end of stream or on a read
    /// error, after which the session's end signal fires.
    pub fn start<D, C>(session: &Session, on_data: D, on_close: C) -> Result<Self>
    where
        D: FnMut(&[u8]) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let reader = session.try_clone_reader()?;
        spawn_loop(reader, Some(session.end_signal()), on_data, on_close)
    }

    /// Start reading and deliver chunks over a channel
    pub fn channel(session: &Session) -> Result<(Self, Receiver<ReaderEvent>)> {
        let (tx, rx) = mpsc::channel();
        let close_tx = tx.clone();
        let reader = Self::start(
            session,
            move |chunk| {
                // The receiver going away only means nobody is listening
                let _ = tx.send(ReaderEvent::Data(chunk.to_vec()));
            },
            move || {
                let _ = close_tx.send(ReaderEvent::Closed);
            },
        )?;
        Ok((reader, rx))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the read loop to exit
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("PTY reader thread panicked");
            }
        }
    }
}

pub(crate) fn spawn_loop<R, D, C>(
    mut reader: R,
    end: Option<Arc<EndSignal>>,
    mut on_data: D,
    on_close: C,
) -> Result<AsyncReader>
where
    R: Read + Send + 'static,
    D: FnMut(&[u8]) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("lexterm-pty-reader".into())
        .spawn(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        tracing::info!("PTY reached end of stream");
                        break;
                    }
                    Ok(n) => on_data(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // Linux reports EIO once the child side is gone
                        tracing::info!("PTY read ended: {}", e);
                        break;
                    }
                }
            }
            on_close();
            if let Some(end) = end {
                end.fire();
            }
        })
        .map_err(PtyError::Io)?;

    Ok(AsyncReader {
        handle: Some(handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Reader returning fixed chunks, then an interruption, then EOF
    struct Chunked {
        chunks: Vec<Vec<u8>>,
        interrupted: bool,
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_chunks_arrive_in_order_then_close() {
        let (tx, rx) = mpsc::channel();
        let close_tx = tx.clone();
        let source = Chunked {
            chunks: vec![b"\x1b[3".to_vec(), b"1mred".to_vec(), b"!".to_vec()],
            interrupted: false,
        };

        let ends = Arc::new(AtomicUsize::new(0));
        let counter = ends.clone();
        let end = Arc::new(EndSignal::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let reader = spawn_loop(
            source,
            Some(end.clone()),
            move |chunk| tx.send(ReaderEvent::Data(chunk.to_vec())).unwrap(),
            move || close_tx.send(ReaderEvent::Closed).unwrap(),
        )
        .unwrap();
        reader.join();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ReaderEvent::Data(b"\x1b[3".to_vec()),
                ReaderEvent::Data(b"1mred".to_vec()),
                ReaderEvent::Data(b"!".to_vec()),
                ReaderEvent::Closed,
            ]
        );
        assert!(end.is_fired());
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_read_error_closes() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "EIO"))
            }
        }

        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        let reader = spawn_loop(Broken, None, |_| panic!("no data expected"), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        reader.join();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_session_output_reaches_channel() {
        use crate::core::pty::ShellCommand;

        let command = ShellCommand::new("/bin/sh").args(["-c", "printf hello"]);
        let session = Session::spawn(&command, 80, 24, || {}).unwrap();
        let (_reader, rx) = AsyncReader::channel(&session).unwrap();

        let mut output = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)) {
                Ok(ReaderEvent::Data(chunk)) => output.extend_from_slice(&chunk),
                Ok(ReaderEvent::Closed) | Err(_) => break,
            }
        }
        assert!(String::from_utf8_lossy(&output).contains("hello"));
    }
}
