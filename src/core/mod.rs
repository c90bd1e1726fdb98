//! Core terminal emulation components.
//!
//! - **term**: screen model, escape-sequence parser and the [`Lexer`](term::Lexer) façade
//! - **pty**: `portable-pty` wrapper for pseudo-terminal operations
//! - **session**: shell process behind a PTY, sole owner of the terminal size
//! - **reader**: background thread delivering PTY output in order
//!
//! # Architecture
//!
//! ```text
//! Session ──(cloned reader)──> AsyncReader thread
//! │                                 │ ReaderEvent::Data
//! │ write / resize                  v
//! └──────────────────────── owning thread ── Lexer
//!                                            ├── TerminalState (grid, cursor, damage)
//!                                            └── VtParser
//! ```

pub mod pty;
pub mod reader;
pub mod session;
pub mod term;
