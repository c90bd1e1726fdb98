//! VT sequence parser
//!
//! Byte-at-a-time state machine over ANSI/VT escape sequences. All parse
//! state (including a partially decoded UTF-8 character) survives between
//! calls, so a sequence split across two reads completes correctly.

use super::state::{AttrFlags, Color, TerminalState};

/// Maximum number of CSI parameters kept; extra ones are dropped
const MAX_PARAMS: usize = 32;

/// Maximum OSC payload length; extra bytes are dropped
const MAX_OSC_LEN: usize = 4096;

/// Response that needs to be sent back to the PTY
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Cursor position report: ESC [ row ; col R
    CursorPosition(u16, u16),
    /// Device status report: terminal OK
    StatusOk,
    /// Device attributes response
    DeviceAttributes,
    /// Secondary device attributes response
    SecondaryDeviceAttributes,
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::CursorPosition(row, col) => format!("\x1b[{};{}R", row, col).into_bytes(),
            Response::StatusOk => b"\x1b[0n".to_vec(),
            // VT220
            Response::DeviceAttributes => b"\x1b[?62;c".to_vec(),
            Response::SecondaryDeviceAttributes => b"\x1b[>1;10;0c".to_vec(),
        }
    }
}

/// Side effect of a byte that does not touch the grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Bell,
    Title(String),
    Reply(Response),
}

/// Parser state machine
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    current_param: Option<u16>,
    private: Option<u8>,
    intermediates: Vec<u8>,
    osc: Vec<u8>,
    utf8: Utf8Decoder,
    /// Second signal produced by a single byte, see [`VtParser::take_pending`]
    pending: Option<Signal>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParserState {
    #[default]
    Ground,
    EscapeSeen,
    EscapeIntermediate,
    CsiCollecting,
    CsiIntermediate,
    OscCollecting,
    /// ESC received within OSC, waiting for backslash
    OscEscape,
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            current_param: None,
            private: None,
            intermediates: Vec::with_capacity(4),
            osc: Vec::new(),
            utf8: Utf8Decoder::default(),
            pending: None,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Signal left over from the last [`VtParser::feed`] call.
    ///
    /// A byte that ends an OSC without ST is re-fed as the start of a new
    /// sequence, so it can produce a title and then a bell.
    pub fn take_pending(&mut self) -> Option<Signal> {
        self.pending.take()
    }

    /// Feed a single byte to the parser
    pub fn feed(&mut self, byte: u8, state: &mut TerminalState) -> Option<Signal> {
        if self.in_osc() {
            return self.osc_byte(byte, state);
        }

        // A pending UTF-8 character interrupted by anything but a continuation byte
        if self.utf8.is_pending() {
            if byte & 0xC0 == 0x80 {
                if let Some(ch) = self.utf8.push(byte) {
                    state.put_char(ch);
                }
                return None;
            }
            self.utf8.reset();
            state.put_char(char::REPLACEMENT_CHARACTER);
        }

        // C0 controls are executed anywhere outside OSC
        if byte < 0x20 {
            return self.control(byte, state);
        }

        match self.state {
            ParserState::Ground => self.ground(byte, state),
            ParserState::EscapeSeen => self.escape(byte, state),
            ParserState::EscapeIntermediate => self.escape_intermediate(byte),
            ParserState::CsiCollecting => self.csi_collecting(byte, state),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, state),
            ParserState::OscCollecting | ParserState::OscEscape => None,
        }
    }

    fn in_osc(&self) -> bool {
        matches!(self.state, ParserState::OscCollecting | ParserState::OscEscape)
    }

    fn control(&mut self, byte: u8, state: &mut TerminalState) -> Option<Signal> {
        match byte {
            0x1B => self.enter_escape(),
            0x07 => return Some(Signal::Bell),
            0x08 => state.backspace(),
            0x09 => state.horizontal_tab(),
            0x0A..=0x0C => {
                state.linefeed();
                if state.modes.linefeed_newline {
                    state.carriage_return();
                }
            }
            0x0D => state.carriage_return(),
            // CAN and SUB cancel the sequence in progress
            0x18 | 0x1A => self.enter_ground(),
            _ => {}
        }
        None
    }

    fn enter_ground(&mut self) {
        self.state = ParserState::Ground;
        self.clear_params();
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::EscapeSeen;
        self.clear_params();
    }

    fn clear_params(&mut self) {
        self.params.clear();
        self.current_param = None;
        self.private = None;
        self.intermediates.clear();
    }

    fn ground(&mut self, byte: u8, state: &mut TerminalState) -> Option<Signal> {
        match byte {
            0x20..=0x7E => state.put_char(byte as char),
            0x7F => {}
            _ => match self.utf8.push(byte) {
                Some(ch) => state.put_char(ch),
                None if self.utf8.is_pending() => {}
                // Not a valid lead byte
                None => state.put_char(char::REPLACEMENT_CHARACTER),
            },
        }
        None
    }

    fn escape(&mut self, byte: u8, state: &mut TerminalState) -> Option<Signal> {
        self.state = ParserState::Ground;
        match byte {
            b'[' => {
                self.clear_params();
                self.state = ParserState::CsiCollecting;
            }
            b']' => {
                self.osc.clear();
                self.state = ParserState::OscCollecting;
            }
            // DECSC - Save cursor
            b'7' => state.save_cursor(),
            // DECRC - Restore cursor
            b'8' => state.restore_cursor(),
            // IND - Index
            b'D' => state.index(),
            // NEL - Next line
            b'E' => {
                state.carriage_return();
                state.linefeed();
            }
            // RI - Reverse index
            b'M' => state.reverse_index(),
            // RIS - Full reset
            b'c' => state.reset(),
            // Keypad modes have no effect on the grid
            b'=' | b'>' => {}
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::EscapeIntermediate;
            }
            0x7F => self.state = ParserState::EscapeSeen,
            _ => {
                tracing::debug!("Discarding unknown escape: ESC {:?}", byte as char);
            }
        }
        None
    }

    fn escape_intermediate(&mut self, byte: u8) -> Option<Signal> {
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            0x7F => {}
            // Final byte; charset designations and the like are ignored
            _ => self.enter_ground(),
        }
        None
    }

    fn csi_collecting(&mut self, byte: u8, state: &mut TerminalState) -> Option<Signal> {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            // Sub-parameters are treated as regular parameters
            b';' | b':' => {
                let param = self.current_param.take().unwrap_or(0);
                self.push_param(param);
            }
            b'<'..=b'?' => {
                let at_start = self.params.is_empty() && self.current_param.is_none();
                if at_start && self.private.is_none() {
                    self.private = Some(byte);
                } else {
                    tracing::debug!("Aborting CSI: misplaced private marker {:?}", byte as char);
                    self.enter_ground();
                }
            }
            0x20..=0x2F => {
                self.finish_param();
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                self.finish_param();
                return self.dispatch_csi(byte, state);
            }
            0x7F => {}
            _ => {
                tracing::debug!("Aborting CSI on byte {:#04x}", byte);
                self.enter_ground();
            }
        }
        None
    }

    fn csi_intermediate(&mut self, byte: u8, state: &mut TerminalState) -> Option<Signal> {
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            0x40..=0x7E => return self.dispatch_csi(byte, state),
            0x7F => {}
            _ => {
                tracing::debug!("Aborting CSI on byte {:#04x}", byte);
                self.enter_ground();
            }
        }
        None
    }

    fn push_param(&mut self, param: u16) {
        if self.params.len() < MAX_PARAMS {
            self.params.push(param);
        }
    }

    fn finish_param(&mut self) {
        if let Some(p) = self.current_param.take() {
            self.push_param(p);
        }
    }

    fn osc_byte(&mut self, byte: u8, state: &mut TerminalState) -> Option<Signal> {
        match (self.state, byte) {
            // BEL terminates OSC
            (ParserState::OscCollecting, 0x07) => self.finish_osc(),
            (ParserState::OscCollecting, 0x1B) => {
                self.state = ParserState::OscEscape;
                None
            }
            (ParserState::OscCollecting, 0x18 | 0x1A) => {
                self.enter_ground();
                None
            }
            (ParserState::OscCollecting, _) => {
                if self.osc.len() < MAX_OSC_LEN {
                    self.osc.push(byte);
                }
                None
            }
            // ST (ESC \) - String Terminator
            (_, b'\\') => self.finish_osc(),
            _ => {
                // Not ST: finish the OSC and treat this byte as following a fresh ESC
                let signal = self.finish_osc();
                self.enter_escape();
                let next = self.feed(byte, state);
                match signal {
                    Some(signal) => {
                        self.pending = next;
                        Some(signal)
                    }
                    None => next,
                }
            }
        }
    }

    fn finish_osc(&mut self) -> Option<Signal> {
        self.enter_ground();
        let payload = String::from_utf8_lossy(&self.osc).into_owned();
        self.osc.clear();

        let (selector, text) = match payload.split_once(';') {
            Some(parts) => parts,
            None => {
                tracing::debug!("Discarding OSC without selector: {:?}", payload);
                return None;
            }
        };

        match selector {
            "0" | "2" => Some(Signal::Title(text.to_string())),
            _ => {
                tracing::debug!("Discarding OSC {}", selector);
                None
            }
        }
    }

    fn dispatch_csi(&mut self, final_byte: u8, state: &mut TerminalState) -> Option<Signal> {
        let signal = self.execute_csi(final_byte, state);
        self.enter_ground();
        signal
    }

    fn execute_csi(&self, final_byte: u8, state: &mut TerminalState) -> Option<Signal> {
        let params = &self.params;
        // Movement and line counts treat a missing or zero parameter as 1
        let count = params.first().copied().unwrap_or(1).max(1);
        let mode = params.first().copied().unwrap_or(0);

        if !self.intermediates.is_empty() {
            tracing::debug!(
                "Discarding CSI with intermediates {:?}, params={:?}, final={:?}",
                self.intermediates,
                params,
                final_byte as char
            );
            return None;
        }

        match (self.private, final_byte) {
            // Cursor movement
            (None, b'A') => state.cursor_up(count),
            (None, b'B') => state.cursor_down(count),
            (None, b'C') => state.cursor_forward(count),
            (None, b'D') => state.cursor_backward(count),
            // CNL - Cursor Next Line
            (None, b'E') => {
                state.cursor_down(count);
                state.carriage_return();
            }
            // CPL - Cursor Previous Line
            (None, b'F') => {
                state.cursor_up(count);
                state.carriage_return();
            }
            // CHA - Cursor Character Absolute
            (None, b'G') => state.cursor_column(params.first().copied().unwrap_or(1)),
            // CUP - Cursor Position
            (None, b'H') | (None, b'f') => {
                let row = params.first().copied().unwrap_or(1);
                let col = params.get(1).copied().unwrap_or(1);
                state.cursor_position(row, col);
            }
            // VPA - Line Position Absolute
            (None, b'd') => state.cursor_row(params.first().copied().unwrap_or(1)),

            // Erase
            (None, b'J') => state.erase_in_display(mode),
            (None, b'K') => state.erase_in_line(mode),

            // Line and character operations
            (None, b'L') => state.insert_lines(count),
            (None, b'M') => state.delete_lines(count),
            (None, b'@') => state.insert_chars(count),
            (None, b'P') => state.delete_chars(count),
            (None, b'X') => state.erase_chars(count),

            // Scroll
            (None, b'S') => state.scroll_up(count),
            (None, b'T') => state.scroll_down(count),

            // DECSTBM - Scroll region
            (None, b'r') => {
                let top = params.first().copied().unwrap_or(1).max(1);
                let bottom = match params.get(1).copied() {
                    Some(b) if b > 0 => b,
                    _ => state.rows,
                };
                state.set_scroll_region(top, bottom);
                state.cursor_position(1, 1);
            }

            // SGR - Select Graphic Rendition
            (None, b'm') => execute_sgr(params, state),

            // Save/restore cursor
            (None, b's') => state.save_cursor(),
            (None, b'u') => state.restore_cursor(),

            // Device Status Report
            (None, b'n') => match mode {
                5 => return Some(Signal::Reply(Response::StatusOk)),
                6 => {
                    let cursor = state.active_cursor();
                    return Some(Signal::Reply(Response::CursorPosition(
                        cursor.row + 1,
                        cursor.col + 1,
                    )));
                }
                _ => {}
            },

            // Device Attributes
            (None, b'c') => return Some(Signal::Reply(Response::DeviceAttributes)),
            (Some(b'>'), b'c') => return Some(Signal::Reply(Response::SecondaryDeviceAttributes)),

            // Private modes (DEC)
            (Some(b'?'), b'h') | (Some(b'?'), b'l') => {
                for &p in params {
                    state.set_private_mode(p, final_byte == b'h');
                }
            }

            // Standard modes
            (None, b'h') | (None, b'l') => {
                let enable = final_byte == b'h';
                for &p in params {
                    match p {
                        4 => state.modes.insert_mode = enable,
                        20 => state.modes.linefeed_newline = enable,
                        _ => tracing::debug!("Ignoring mode {} ({})", p, enable),
                    }
                }
            }

            _ => {
                tracing::debug!(
                    "Unknown CSI: private={:?}, params={:?}, final={:?}",
                    self.private.map(|b| b as char),
                    params,
                    final_byte as char
                );
            }
        }
        None
    }
}

fn execute_sgr(params: &[u16], state: &mut TerminalState) {
    let style = state.style_mut();
    if params.is_empty() {
        style.reset();
        return;
    }

    let mut iter = params.iter().copied();

    while let Some(param) = iter.next() {
        match param {
            0 => style.reset(),
            1 => style.flags |= AttrFlags::BOLD,
            2 => style.flags |= AttrFlags::DIM,
            3 => style.flags |= AttrFlags::ITALIC,
            4 => style.flags |= AttrFlags::UNDERLINE,
            5 | 6 => style.flags |= AttrFlags::BLINK,
            7 => style.flags |= AttrFlags::INVERSE,
            8 => style.flags |= AttrFlags::HIDDEN,
            9 => style.flags |= AttrFlags::STRIKETHROUGH,

            22 => style.flags &= !(AttrFlags::BOLD | AttrFlags::DIM),
            23 => style.flags &= !AttrFlags::ITALIC,
            24 => style.flags &= !AttrFlags::UNDERLINE,
            25 => style.flags &= !AttrFlags::BLINK,
            27 => style.flags &= !AttrFlags::INVERSE,
            28 => style.flags &= !AttrFlags::HIDDEN,
            29 => style.flags &= !AttrFlags::STRIKETHROUGH,

            30..=37 => style.fg = Color::Indexed((param - 30) as u8),
            38 => {
                if let Some(color) = extended_color(&mut iter) {
                    style.fg = color;
                }
            }
            39 => style.fg = Color::Default,

            40..=47 => style.bg = Color::Indexed((param - 40) as u8),
            48 => {
                if let Some(color) = extended_color(&mut iter) {
                    style.bg = color;
                }
            }
            49 => style.bg = Color::Default,

            90..=97 => style.fg = Color::Indexed((param - 90 + 8) as u8),
            100..=107 => style.bg = Color::Indexed((param - 100 + 8) as u8),

            _ => tracing::debug!("Ignoring SGR {}", param),
        }
    }
}

/// Parse the tail of SGR 38/48: `5;n` or `2;r;g;b`
fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
    match iter.next()? {
        5 => iter.next().map(|n| Color::Indexed(n.min(255) as u8)),
        2 => {
            let r = iter.next().unwrap_or(0).min(255) as u8;
            let g = iter.next().unwrap_or(0).min(255) as u8;
            let b = iter.next().unwrap_or(0).min(255) as u8;
            Some(Color::Rgb(r, g, b))
        }
        _ => None,
    }
}

/// Incremental UTF-8 decoder that keeps partial characters between reads
#[derive(Default)]
struct Utf8Decoder {
    buf: [u8; 4],
    len: u8,
    need: u8,
}

impl Utf8Decoder {
    fn is_pending(&self) -> bool {
        self.need > 0
    }

    fn reset(&mut self) {
        self.len = 0;
        self.need = 0;
    }

    /// Push a byte; returns a char once complete. A lead byte that starts no
    /// valid sequence returns `None` without leaving the decoder pending.
    fn push(&mut self, byte: u8) -> Option<char> {
        if self.need == 0 {
            self.need = match byte {
                0xC2..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF4 => 4,
                _ => return None,
            };
            self.buf[0] = byte;
            self.len = 1;
            return None;
        }

        self.buf[self.len as usize] = byte;
        self.len += 1;
        if self.len < self.need {
            return None;
        }

        let decoded = std::str::from_utf8(&self.buf[..self.len as usize])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        self.reset();
        Some(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut VtParser, state: &mut TerminalState, bytes: &[u8]) -> Vec<Signal> {
        let mut signals = Vec::new();
        for &b in bytes {
            signals.extend(parser.feed(b, state));
            signals.extend(parser.take_pending());
        }
        signals
    }

    #[test]
    fn test_cursor_movement() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[5;10H");
        assert_eq!(state.active_cursor().row, 4);
        assert_eq!(state.active_cursor().col, 9);

        feed_all(&mut parser, &mut state, b"\x1b[2A\x1b[3C");
        assert_eq!(state.active_cursor().row, 2);
        assert_eq!(state.active_cursor().col, 12);

        // Zero counts as one
        feed_all(&mut parser, &mut state, b"\x1b[0D");
        assert_eq!(state.active_cursor().col, 11);
    }

    #[test]
    fn test_cursor_position_clamps() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[999;999H");
        assert_eq!((state.active_cursor().col, state.active_cursor().row), (79, 23));

        feed_all(&mut parser, &mut state, b"\x1b[99999999999B");
        assert_eq!(state.active_cursor().row, 23);

        feed_all(&mut parser, &mut state, b"\x1b[H");
        assert_eq!((state.active_cursor().col, state.active_cursor().row), (0, 0));
    }

    #[test]
    fn test_sgr_colors() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[31m");
        assert_eq!(state.style().fg, Color::Indexed(1));

        feed_all(&mut parser, &mut state, b"\x1b[1;4;44m");
        assert!(state.style().flags.contains(AttrFlags::BOLD | AttrFlags::UNDERLINE));
        assert_eq!(state.style().bg, Color::Indexed(4));

        feed_all(&mut parser, &mut state, b"\x1b[38;5;208;48;2;1;2;3m");
        assert_eq!(state.style().fg, Color::Indexed(208));
        assert_eq!(state.style().bg, Color::Rgb(1, 2, 3));

        feed_all(&mut parser, &mut state, b"\x1b[22;95m");
        assert!(!state.style().flags.contains(AttrFlags::BOLD));
        assert_eq!(state.style().fg, Color::Indexed(13));

        feed_all(&mut parser, &mut state, b"\x1b[m");
        assert!(state.style().is_default());
        assert!(state.damage.is_empty());
    }

    #[test]
    fn test_sgr_does_not_touch_grid() {
        let mut state = TerminalState::new(10, 2);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"a\x1b[7mb");
        let row = &state.active_grid().rows[0];
        assert!(row.cells[0].style.is_default());
        assert!(row.cells[1].style.flags.contains(AttrFlags::INVERSE));
    }

    #[test]
    fn test_osc_title_with_bel_and_st() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let signals = feed_all(&mut parser, &mut state, b"\x1b]0;MyTitle\x07");
        assert_eq!(signals, vec![Signal::Title("MyTitle".to_string())]);

        let signals = feed_all(&mut parser, &mut state, b"\x1b]2;T\xc3\x9ctel\x1b\\");
        assert_eq!(signals, vec![Signal::Title("TÜtel".to_string())]);
        assert_eq!(parser.state(), ParserState::Ground);
        assert!(state.damage.is_empty());
    }

    #[test]
    fn test_osc_unknown_selector_discarded() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let signals = feed_all(&mut parser, &mut state, b"\x1b]7;file:///tmp\x07\x1b]noselector\x07");
        assert!(signals.is_empty());
        assert_eq!(parser.state(), ParserState::Ground);
    }

    #[test]
    fn test_osc_esc_without_backslash_starts_new_sequence() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let signals = feed_all(&mut parser, &mut state, b"\x1b]0;abc\x1b[3;4H");
        assert_eq!(signals, vec![Signal::Title("abc".to_string())]);
        assert_eq!((state.active_cursor().col, state.active_cursor().row), (3, 2));
    }

    #[test]
    fn test_osc_esc_then_bel_keeps_both_signals() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let signals = feed_all(&mut parser, &mut state, b"\x1b]0;t\x1b\x07");
        assert_eq!(signals, vec![Signal::Title("t".to_string()), Signal::Bell]);
        assert_eq!(parser.state(), ParserState::Ground);
        assert!(parser.take_pending().is_none());
    }

    #[test]
    fn test_bell_outside_sequences() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let signals = feed_all(&mut parser, &mut state, b"\x07");
        assert_eq!(signals, vec![Signal::Bell]);
        assert!(state.damage.is_empty());
    }

    #[test]
    fn test_unknown_csi_final_returns_to_ground() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[5y");
        assert_eq!(parser.state(), ParserState::Ground);
        assert!(state.damage.is_empty());

        feed_all(&mut parser, &mut state, b"ok");
        assert_eq!(state.active_grid().rows[0].text(), "ok");
    }

    #[test]
    fn test_garbage_inside_csi_aborts() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[1;2\xffx");
        assert_eq!(parser.state(), ParserState::Ground);
        assert_eq!(state.active_grid().rows[0].text(), "x");

        feed_all(&mut parser, &mut state, b"\x1b[1?h");
        assert_eq!(parser.state(), ParserState::Ground);
        assert_eq!(state.active_grid().rows[0].text(), "xh");
    }

    #[test]
    fn test_cancel_aborts_sequence() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[31\x18m");
        assert!(state.style().is_default());
        assert_eq!(state.active_grid().rows[0].text(), "m");
    }

    #[test]
    fn test_c0_inside_csi_executes() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"abc\x1b[\r2Cx");
        assert_eq!(state.active_grid().rows[0].text(), "abx");
    }

    #[test]
    fn test_unknown_short_escape_discarded() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1bQ\x1b(Bok");
        assert_eq!(parser.state(), ParserState::Ground);
        assert_eq!(state.active_grid().rows[0].text(), "ok");
    }

    #[test]
    fn test_save_restore_escape() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[3;3H\x1b7\x1b[10;10H\x1b8");
        assert_eq!((state.active_cursor().col, state.active_cursor().row), (2, 2));
    }

    #[test]
    fn test_device_status_reports() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let signals = feed_all(&mut parser, &mut state, b"\x1b[4;7H\x1b[6n\x1b[5n\x1b[c\x1b[>c");
        assert_eq!(
            signals,
            vec![
                Signal::Reply(Response::CursorPosition(4, 7)),
                Signal::Reply(Response::StatusOk),
                Signal::Reply(Response::DeviceAttributes),
                Signal::Reply(Response::SecondaryDeviceAttributes),
            ]
        );
        assert_eq!(Response::CursorPosition(4, 7).to_bytes(), b"\x1b[4;7R".to_vec());
    }

    #[test]
    fn test_private_modes() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[?1;2004h\x1b[?25l");
        assert!(state.modes.application_cursor);
        assert!(state.modes.bracketed_paste);
        assert!(!state.active_cursor().visible);

        feed_all(&mut parser, &mut state, b"\x1b[?1049h");
        assert!(state.using_alternate);
        feed_all(&mut parser, &mut state, b"\x1b[?1049l");
        assert!(!state.using_alternate);
    }

    #[test]
    fn test_utf8_split_and_invalid() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        // "é" split in two, then a truncated sequence followed by ASCII
        feed_all(&mut parser, &mut state, b"\xc3");
        feed_all(&mut parser, &mut state, b"\xa9\xe2\x82z");
        assert_eq!(state.active_grid().rows[0].text(), "é\u{fffd}z");
    }

    #[test]
    fn test_scroll_region_homes_cursor() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[5;5H\x1b[2;10r");
        assert_eq!(state.scroll_region, (1, 9));
        assert_eq!((state.active_cursor().col, state.active_cursor().row), (0, 0));
    }

    #[test]
    fn test_param_overflow_is_bounded() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let mut seq = b"\x1b[".to_vec();
        for _ in 0..100 {
            seq.extend_from_slice(b"1;");
        }
        seq.push(b'm');
        feed_all(&mut parser, &mut state, &seq);
        assert!(state.style().flags.contains(AttrFlags::BOLD));
        assert_eq!(parser.state(), ParserState::Ground);
    }
}
