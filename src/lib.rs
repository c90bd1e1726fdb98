//! lexterm - a terminal emulation engine
//!
//! The [`core`] module holds the engine: the escape-sequence interpreter
//! ([`core::term::Lexer`]) with its cell grid and damage tracking, the PTY
//! shell session and the background reader. [`ui`] contains the crossterm
//! host used by the `lexterm` binary, and [`config`] the TOML configuration
//! and color schemes.

pub mod config;
pub mod core;
pub mod ui;
