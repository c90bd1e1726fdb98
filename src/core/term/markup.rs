//! Row to Pango markup conversion
//!
//! Consecutive cells sharing a style are grouped into one run. Default-style
//! runs are emitted as plain escaped text; every other run is wrapped in a
//! single `<span>`.

use super::state::{AttrFlags, Cell, Color, Row, Style};
use crate::config::{self, ColorScheme};
use std::fmt::Write;

/// Resolve a cell color against the scheme; `Default` maps to `default`
pub fn resolve_color(color: Color, default: config::Color, scheme: &ColorScheme) -> config::Color {
    match color {
        Color::Default => default,
        Color::Indexed(idx) => scheme.indexed(idx),
        Color::Rgb(r, g, b) => config::Color::new(r, g, b),
    }
}

/// Effective (foreground, background) after inverse and hidden are applied
pub fn effective_colors(style: &Style, scheme: &ColorScheme) -> (config::Color, config::Color) {
    let mut fg = resolve_color(style.fg, scheme.foreground, scheme);
    let mut bg = resolve_color(style.bg, scheme.background, scheme);
    if style.flags.contains(AttrFlags::INVERSE) {
        std::mem::swap(&mut fg, &mut bg);
    }
    if style.flags.contains(AttrFlags::HIDDEN) {
        fg = bg;
    }
    (fg, bg)
}

/// Render one row as markup
pub fn render_row(row: &Row, scheme: &ColorScheme) -> String {
    let end = row
        .cells
        .iter()
        .rposition(|cell| !(cell.is_empty() && cell.style.is_default()))
        .map_or(0, |i| i + 1);

    let mut out = String::new();
    let mut run = String::new();
    let mut run_style: Option<&Style> = None;

    for cell in &row.cells[..end] {
        if cell.is_continuation() {
            continue;
        }
        if run_style != Some(&cell.style) {
            if let Some(style) = run_style {
                flush_run(&mut out, &run, style, scheme);
            }
            run.clear();
            run_style = Some(&cell.style);
        }
        push_cell(&mut run, cell);
    }
    if let Some(style) = run_style {
        flush_run(&mut out, &run, style, scheme);
    }
    out
}

fn push_cell(run: &mut String, cell: &Cell) {
    for ch in cell.display_char().chars() {
        match ch {
            '&' => run.push_str("&amp;"),
            '<' => run.push_str("&lt;"),
            '>' => run.push_str("&gt;"),
            '\'' => run.push_str("&apos;"),
            '"' => run.push_str("&quot;"),
            _ => run.push(ch),
        }
    }
}

fn flush_run(out: &mut String, text: &str, style: &Style, scheme: &ColorScheme) {
    if style.is_default() {
        out.push_str(text);
        return;
    }

    let attrs = span_attributes(style, scheme);
    if attrs.is_empty() {
        // Only blink is set
        out.push_str(text);
        return;
    }
    let _ = write!(out, "<span{}>{}</span>", attrs, text);
}

fn span_attributes(style: &Style, scheme: &ColorScheme) -> String {
    let flags = style.flags;
    let recolored = style.fg != Color::Default
        || style.bg != Color::Default
        || flags.intersects(AttrFlags::INVERSE | AttrFlags::HIDDEN);

    let mut attrs = String::new();
    if recolored {
        let (fg, bg) = effective_colors(style, scheme);
        if style.fg != Color::Default || flags.intersects(AttrFlags::INVERSE | AttrFlags::HIDDEN) {
            let _ = write!(attrs, " foreground=\"{}\"", fg.to_hex());
        }
        if style.bg != Color::Default || flags.contains(AttrFlags::INVERSE) {
            let _ = write!(attrs, " background=\"{}\"", bg.to_hex());
        }
    }
    if flags.contains(AttrFlags::BOLD) {
        attrs.push_str(" weight=\"bold\"");
    }
    if flags.contains(AttrFlags::DIM) {
        attrs.push_str(" fgalpha=\"50%\"");
    }
    if flags.contains(AttrFlags::ITALIC) {
        attrs.push_str(" style=\"italic\"");
    }
    if flags.contains(AttrFlags::UNDERLINE) {
        attrs.push_str(" underline=\"single\"");
    }
    if flags.contains(AttrFlags::STRIKETHROUGH) {
        attrs.push_str(" strikethrough=\"true\"");
    }
    attrs
}
