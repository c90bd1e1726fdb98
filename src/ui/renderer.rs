//! Terminal renderer using crossterm
//!
//! Paints the rows the engine reports as damaged onto the host terminal.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    queue,
    style::{Attribute, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen, SetTitle,
    },
};

use crate::core::term::markup::effective_colors;
use crate::core::term::{AttrFlags, Lexer, Row, Style};

/// Terminal renderer
pub struct Renderer {
    /// Whether the terminal has been initialized
    initialized: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self { initialized: false }
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        queue!(
            stdout,
            EnterAlternateScreen,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        stdout.flush()?;
        self.initialized = true;
        tracing::debug!("Renderer initialized");
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = queue!(
            stdout,
            ResetColor,
            SetAttribute(Attribute::Reset),
            Show,
            EnableLineWrap,
            LeaveAlternateScreen
        );
        let _ = stdout.flush();

        terminal::disable_raw_mode()
    }

    /// Drain the damage set and repaint those rows, then place the caret
    pub fn render(&mut self, lexer: &mut Lexer) -> io::Result<()> {
        let damaged = lexer.take_damaged();
        let stdout = io::stdout();
        let mut stdout = io::BufWriter::with_capacity(65536, stdout.lock());

        // Synchronized update
        write!(stdout, "\x1b[?2026h")?;
        self.render_rows(&mut stdout, lexer, &damaged)?;
        write!(stdout, "\x1b[?2026l")?;
        stdout.flush()
    }

    /// Paint `rows` of the lexer's grid into `out`
    pub fn render_rows<W: Write>(&self, out: &mut W, lexer: &Lexer, rows: &[usize]) -> io::Result<()> {
        queue!(out, Hide)?;

        let grid = lexer.grid();
        for &row_idx in rows {
            let row = match grid.row(row_idx) {
                Some(r) => r,
                None => continue,
            };
            queue!(out, MoveTo(0, row_idx as u16))?;
            self.render_row(out, lexer, row)?;
        }

        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;

        let (x, y) = lexer.cursor();
        queue!(out, MoveTo(x, y))?;
        if lexer.cursor_visible() {
            queue!(out, Show)?;
        }
        Ok(())
    }

    fn render_row<W: Write>(&self, out: &mut W, lexer: &Lexer, row: &Row) -> io::Result<()> {
        let mut current: Option<&Style> = None;
        let mut line_buffer = String::with_capacity(256);

        for cell in &row.cells {
            if cell.is_continuation() {
                continue;
            }
            if current != Some(&cell.style) {
                if let Some(style) = current {
                    self.apply_style(out, lexer, style)?;
                    write!(out, "{}", line_buffer)?;
                    line_buffer.clear();
                }
                current = Some(&cell.style);
            }
            line_buffer.push_str(cell.display_char());
        }

        if let Some(style) = current {
            self.apply_style(out, lexer, style)?;
            write!(out, "{}", line_buffer)?;
        }
        Ok(())
    }

    /// Apply cell attributes with colors resolved through the scheme
    fn apply_style<W: Write>(&self, out: &mut W, lexer: &Lexer, style: &Style) -> io::Result<()> {
        queue!(out, SetAttribute(Attribute::Reset))?;

        let flags = style.flags;
        if flags.contains(AttrFlags::BOLD) {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if flags.contains(AttrFlags::DIM) {
            queue!(out, SetAttribute(Attribute::Dim))?;
        }
        if flags.contains(AttrFlags::ITALIC) {
            queue!(out, SetAttribute(Attribute::Italic))?;
        }
        if flags.contains(AttrFlags::UNDERLINE) {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        if flags.contains(AttrFlags::BLINK) {
            queue!(out, SetAttribute(Attribute::SlowBlink))?;
        }
        if flags.contains(AttrFlags::STRIKETHROUGH) {
            queue!(out, SetAttribute(Attribute::CrossedOut))?;
        }

        // Inverse and hidden are folded into the colors
        let (fg, bg) = effective_colors(style, lexer.color_scheme());
        queue!(
            out,
            SetForegroundColor(fg.to_crossterm()),
            SetBackgroundColor(bg.to_crossterm())
        )
    }

    /// Repaint everything on the next render
    pub fn invalidate(&mut self, lexer: &mut Lexer) -> io::Result<()> {
        lexer.mark_all_damaged();
        let mut stdout = io::stdout();
        queue!(stdout, ResetColor, Clear(ClearType::All))?;
        stdout.flush()
    }

    pub fn set_title(&self, title: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        queue!(stdout, SetTitle(title))?;
        stdout.flush()
    }

    pub fn bell(&self) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(b"\x07")?;
        stdout.flush()
    }

    /// Get terminal size
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_rows_writes_text_and_colors() {
        let mut lexer = Lexer::new(20, 3, |_| {}, || {});
        lexer.lex(b"plain \x1b[31mred\x1b[0m");
        let rows = lexer.take_damaged();
        assert_eq!(rows, vec![0]);

        let renderer = Renderer::new();
        let mut out = Vec::new();
        renderer.render_rows(&mut out, &lexer, &rows).unwrap();
        let text = String::from_utf8_lossy(&out);

        assert!(text.contains("plain "));
        assert!(text.contains("red"));
        // Red from the default scheme, #cd0000
        assert!(text.contains("38;2;205;0;0"));
    }

    #[test]
    fn test_render_skips_missing_rows_and_places_cursor() {
        let mut lexer = Lexer::new(10, 2, |_| {}, || {});
        lexer.lex(b"\x1b[2;4H\x1b[?25l");

        let renderer = Renderer::new();
        let mut out = Vec::new();
        renderer.render_rows(&mut out, &lexer, &[7]).unwrap();
        let text = String::from_utf8_lossy(&out);

        // MoveTo is 1-based on the wire
        assert!(text.contains("\x1b[2;4H"));
        assert!(!text.contains("\x1b[?25h"));
    }
}
