//! Host terminal rendering and input handling.
//!
//! - **renderer**: paints damaged rows with crossterm
//! - **keymapper**: binding tables and keyboard input to PTY byte mapping

pub mod keymapper;
pub mod renderer;

pub use keymapper::*;
pub use renderer::*;
