//! Terminal emulation engine
//!
//! [`Lexer`] owns the screen model and the escape-sequence parser. Feed it
//! raw PTY output with [`Lexer::lex`], then repaint the rows reported by
//! [`Lexer::take_damaged`] using [`Lexer::get_line`].

pub mod markup;
pub mod parser;
pub mod state;

pub use parser::{ParserState, Response, Signal, VtParser};
pub use state::{
    AttrFlags, Cell, Color, Cursor, Damage, Grid, Row, Style, TerminalModes, TerminalState,
};

use crate::config::ColorScheme;
use thiserror::Error;

/// Errors raised by the engine for out-of-range requests
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TermError {
    #[error("row {row} is out of range (rows: {rows})")]
    RowOutOfRange { row: usize, rows: usize },
}

type TitleCallback = Box<dyn FnMut(&str) + Send>;
type BellCallback = Box<dyn FnMut() + Send>;

/// Escape-sequence interpreter plus the screen it drives
pub struct Lexer {
    state: TerminalState,
    parser: VtParser,
    scheme: ColorScheme,
    title: String,
    responses: Vec<Response>,
    on_title: TitleCallback,
    on_bell: BellCallback,
}

impl Lexer {
    /// Create an interpreter for a `cols x rows` screen.
    ///
    /// `on_title` runs for every OSC title change, `on_bell` for every BEL
    /// received outside a string sequence. A zero dimension is clamped to 1.
    pub fn new<T, B>(cols: u16, rows: u16, on_title: T, on_bell: B) -> Self
    where
        T: FnMut(&str) + Send + 'static,
        B: FnMut() + Send + 'static,
    {
        Self {
            state: TerminalState::new(cols, rows),
            parser: VtParser::new(),
            scheme: ColorScheme::default(),
            title: String::new(),
            responses: Vec::new(),
            on_title: Box::new(on_title),
            on_bell: Box::new(on_bell),
        }
    }

    /// Use `scheme` to resolve colors in [`Lexer::get_line`]
    pub fn with_color_scheme(mut self, scheme: ColorScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn set_color_scheme(&mut self, scheme: ColorScheme) {
        self.scheme = scheme;
        self.state.mark_all_damaged();
    }

    pub fn color_scheme(&self) -> &ColorScheme {
        &self.scheme
    }

    /// Feed a chunk of PTY output. Sequences may be split across calls.
    pub fn lex(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if let Some(signal) = self.parser.feed(byte, &mut self.state) {
                self.dispatch(signal);
            }
            if let Some(signal) = self.parser.take_pending() {
                self.dispatch(signal);
            }
        }
    }

    fn dispatch(&mut self, signal: Signal) {
        match signal {
            Signal::Bell => (self.on_bell)(),
            Signal::Title(title) => {
                (self.on_title)(&title);
                self.title = title;
            }
            Signal::Reply(response) => self.responses.push(response),
        }
    }

    /// Render `row` as markup
    pub fn get_line(&self, row: usize) -> Result<String, TermError> {
        let grid = self.state.active_grid();
        let line = grid.row(row).ok_or(TermError::RowOutOfRange {
            row,
            rows: grid.height(),
        })?;
        Ok(markup::render_row(line, &self.scheme))
    }

    /// Resize the screen, keeping overlapping content top-left aligned.
    /// Every row is marked damaged. Zero dimensions are ignored.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        if cols == 0 || rows == 0 {
            tracing::warn!("Ignoring resize to {}x{}", cols, rows);
            return;
        }
        self.state.resize(cols, rows);
    }

    /// Rows changed since the damage set was last drained
    pub fn damaged(&self) -> &Damage {
        &self.state.damage
    }

    /// Drain the damage set, returning rows in ascending order
    pub fn take_damaged(&mut self) -> Vec<usize> {
        self.state.damage.take()
    }

    pub fn clear_damaged(&mut self) {
        self.state.damage.clear();
    }

    /// Force a full repaint
    pub fn mark_all_damaged(&mut self) {
        self.state.mark_all_damaged();
    }

    /// Cursor position as `(x, y)`
    pub fn cursor(&self) -> (u16, u16) {
        let cursor = self.state.active_cursor();
        (cursor.col, cursor.row)
    }

    pub fn cursor_visible(&self) -> bool {
        self.state.active_cursor().visible
    }

    /// `(cols, rows)`
    pub fn size(&self) -> (u16, u16) {
        (self.state.cols, self.state.rows)
    }

    /// Last title set through OSC 0 or 2
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn modes(&self) -> &TerminalModes {
        &self.state.modes
    }

    pub fn grid(&self) -> &Grid {
        self.state.active_grid()
    }

    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    /// Replies (cursor reports, device attributes) to write back to the PTY
    pub fn take_responses(&mut self) -> Vec<Response> {
        std::mem::take(&mut self.responses)
    }
}
