//! Key mapping for terminal input
//!
//! Named keys are looked up in static binding tables keyed by [`Key`];
//! printable characters are encoded directly. The result is written to the
//! session as-is.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::core::term::TerminalModes;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Keys with a fixed escape sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    Backspace,
    Tab,
    BackTab,
    Escape,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

impl Key {
    /// Host key code to key identifier; `None` means "not a special key"
    pub fn from_key_code(code: KeyCode) -> Option<Self> {
        let key = match code {
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Right => Key::Right,
            KeyCode::Left => Key::Left,
            KeyCode::Home => Key::Home,
            KeyCode::End => Key::End,
            KeyCode::PageUp => Key::PageUp,
            KeyCode::PageDown => Key::PageDown,
            KeyCode::Insert => Key::Insert,
            KeyCode::Delete => Key::Delete,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Tab => Key::Tab,
            KeyCode::BackTab => Key::BackTab,
            KeyCode::Esc => Key::Escape,
            KeyCode::F(n) => return Self::function(n),
            _ => return None,
        };
        Some(key)
    }

    fn function(n: u8) -> Option<Self> {
        const KEYS: [Key; 12] = [
            Key::F1,
            Key::F2,
            Key::F3,
            Key::F4,
            Key::F5,
            Key::F6,
            Key::F7,
            Key::F8,
            Key::F9,
            Key::F10,
            Key::F11,
            Key::F12,
        ];
        KEYS.get((n as usize).checked_sub(1)?).copied()
    }
}

/// Unmodified sequences
static SPECIAL_KEYS: &[(Key, &[u8])] = &[
    (Key::Up, b"\x1b[A"),
    (Key::Down, b"\x1b[B"),
    (Key::Right, b"\x1b[C"),
    (Key::Left, b"\x1b[D"),
    (Key::Home, b"\x1b[H"),
    (Key::End, b"\x1b[F"),
    (Key::PageUp, b"\x1b[5~"),
    (Key::PageDown, b"\x1b[6~"),
    (Key::Insert, b"\x1b[2~"),
    (Key::Delete, b"\x1b[3~"),
    (Key::Backspace, b"\x7f"),
    (Key::Tab, b"\t"),
    (Key::BackTab, b"\x1b[Z"),
    (Key::Escape, b"\x1b"),
    (Key::F1, b"\x1bOP"),
    (Key::F2, b"\x1bOQ"),
    (Key::F3, b"\x1bOR"),
    (Key::F4, b"\x1bOS"),
    (Key::F5, b"\x1b[15~"),
    (Key::F6, b"\x1b[17~"),
    (Key::F7, b"\x1b[18~"),
    (Key::F8, b"\x1b[19~"),
    (Key::F9, b"\x1b[20~"),
    (Key::F10, b"\x1b[21~"),
    (Key::F11, b"\x1b[23~"),
    (Key::F12, b"\x1b[24~"),
];

/// Control-modified sequences
static CONTROL_KEYS: &[(Key, &[u8])] = &[
    (Key::Up, b"\x1b[1;5A"),
    (Key::Down, b"\x1b[1;5B"),
    (Key::Right, b"\x1b[1;5C"),
    (Key::Left, b"\x1b[1;5D"),
    (Key::Home, b"\x1b[1;5H"),
    (Key::End, b"\x1b[1;5F"),
    (Key::PageUp, b"\x1b[5;5~"),
    (Key::PageDown, b"\x1b[6;5~"),
    (Key::Insert, b"\x1b[2;5~"),
    (Key::Delete, b"\x1b[3;5~"),
    (Key::Backspace, b"\x08"),
    (Key::F1, b"\x1b[1;5P"),
    (Key::F2, b"\x1b[1;5Q"),
    (Key::F3, b"\x1b[1;5R"),
    (Key::F4, b"\x1b[1;5S"),
    (Key::F5, b"\x1b[15;5~"),
    (Key::F6, b"\x1b[17;5~"),
    (Key::F7, b"\x1b[18;5~"),
    (Key::F8, b"\x1b[19;5~"),
    (Key::F9, b"\x1b[20;5~"),
    (Key::F10, b"\x1b[21;5~"),
    (Key::F11, b"\x1b[23;5~"),
    (Key::F12, b"\x1b[24;5~"),
];

/// Cursor keys while DECCKM (application cursor) is set
static APP_CURSOR_KEYS: &[(Key, &[u8])] = &[
    (Key::Up, b"\x1bOA"),
    (Key::Down, b"\x1bOB"),
    (Key::Right, b"\x1bOC"),
    (Key::Left, b"\x1bOD"),
    (Key::Home, b"\x1bOH"),
    (Key::End, b"\x1bOF"),
];

fn lookup(table: &'static [(Key, &'static [u8])], key: Key) -> Option<&'static [u8]> {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, bytes)| *bytes)
}

/// Read-only key to byte sequence tables
pub struct BindingTable;

impl BindingTable {
    pub fn special(key: Key) -> Option<&'static [u8]> {
        lookup(SPECIAL_KEYS, key)
    }

    pub fn control(key: Key) -> Option<&'static [u8]> {
        lookup(CONTROL_KEYS, key)
    }

    pub fn application_cursor(key: Key) -> Option<&'static [u8]> {
        lookup(APP_CURSOR_KEYS, key)
    }
}

/// Key mapper for converting key events to bytes
pub struct KeyMapper;

impl KeyMapper {
    /// Map a crossterm KeyEvent to bytes for PTY
    pub fn map(event: &KeyEvent, modes: &TerminalModes) -> Option<Vec<u8>> {
        let mods = Modifiers::from(event.modifiers);

        match event.code {
            KeyCode::Char(ch) => Some(Self::map_char(ch, mods)),
            KeyCode::Enter => {
                let enter: &[u8] = if modes.linefeed_newline { b"\r\n" } else { b"\r" };
                Some(Self::with_alt(enter, mods))
            }
            code => Self::map_key(Key::from_key_code(code)?, mods, modes),
        }
    }

    fn map_key(key: Key, mods: Modifiers, modes: &TerminalModes) -> Option<Vec<u8>> {
        // Shift is already folded into BackTab
        let mods = if key == Key::BackTab {
            mods - Modifiers::SHIFT
        } else {
            mods
        };

        if mods.is_empty() {
            let app = modes
                .application_cursor
                .then(|| BindingTable::application_cursor(key))
                .flatten();
            return app.or_else(|| BindingTable::special(key)).map(<[u8]>::to_vec);
        }

        if mods == Modifiers::CTRL {
            if let Some(bytes) = BindingTable::control(key) {
                return Some(bytes.to_vec());
            }
        }

        let base = BindingTable::special(key)?;
        if mods == Modifiers::ALT || !base.starts_with(b"\x1b") || base.len() < 3 {
            return Some(Self::with_alt(base, mods));
        }
        Some(Self::with_modifier(base, Self::modifier_code(mods)))
    }

    /// Prefix ESC when Alt is held
    fn with_alt(bytes: &[u8], mods: Modifiers) -> Vec<u8> {
        let mut out = Vec::with_capacity(bytes.len() + 1);
        if mods.contains(Modifiers::ALT) {
            out.push(0x1B);
        }
        out.extend_from_slice(bytes);
        out
    }

    /// Rewrite `ESC [ X`, `ESC O X` and `ESC [ n ~` into their xterm
    /// modified forms
    fn with_modifier(base: &[u8], mod_code: u8) -> Vec<u8> {
        let last = base[base.len() - 1];
        if last == b'~' {
            let code = String::from_utf8_lossy(&base[2..base.len() - 1]);
            format!("\x1b[{};{}~", code, mod_code).into_bytes()
        } else {
            format!("\x1b[1;{}{}", mod_code, last as char).into_bytes()
        }
    }

    /// Map a character with modifiers
    fn map_char(ch: char, mods: Modifiers) -> Vec<u8> {
        // Ctrl + letter = control character
        if mods.contains(Modifiers::CTRL) && !mods.contains(Modifiers::ALT) {
            if ch.is_ascii_alphabetic() {
                return vec![(ch.to_ascii_lowercase() as u8) - b'a' + 1];
            }
            match ch {
                '@' | '`' | ' ' => return vec![0x00],
                '[' => return vec![0x1B],
                '\\' => return vec![0x1C],
                ']' => return vec![0x1D],
                '^' | '~' => return vec![0x1E],
                '_' | '?' => return vec![0x1F],
                _ => {}
            }
        }

        // Ctrl + Alt + letter
        if mods.contains(Modifiers::CTRL | Modifiers::ALT) && ch.is_ascii_alphabetic() {
            let ctrl_code = (ch.to_ascii_lowercase() as u8) - b'a' + 1;
            return vec![0x1B, ctrl_code];
        }

        let mut buf = [0u8; 4];
        Self::with_alt(ch.encode_utf8(&mut buf).as_bytes(), mods)
    }

    /// Calculate xterm modifier code
    fn modifier_code(mods: Modifiers) -> u8 {
        1 + if mods.contains(Modifiers::SHIFT) { 1 } else { 0 }
            + if mods.contains(Modifiers::ALT) { 2 } else { 0 }
            + if mods.contains(Modifiers::CTRL) { 4 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    fn map(code: KeyCode, mods: KeyModifiers) -> Option<Vec<u8>> {
        KeyMapper::map(&key_event(code, mods), &TerminalModes::default())
    }

    #[test]
    fn test_tables_cover_every_key() {
        for n in 1..=12 {
            let key = Key::from_key_code(KeyCode::F(n)).unwrap();
            assert!(BindingTable::special(key).is_some());
            assert!(BindingTable::control(key).is_some());
        }
        assert_eq!(Key::from_key_code(KeyCode::F(13)), None);
        assert_eq!(Key::from_key_code(KeyCode::F(0)), None);
        assert_eq!(Key::from_key_code(KeyCode::Char('a')), None);
        assert_eq!(BindingTable::control(Key::Tab), None);
        assert_eq!(BindingTable::application_cursor(Key::PageUp), None);
    }

    #[test]
    fn test_char_keys() {
        assert_eq!(map(KeyCode::Char('a'), KeyModifiers::NONE), Some(b"a".to_vec()));
        assert_eq!(map(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(vec![0x03]));
        assert_eq!(map(KeyCode::Char('x'), KeyModifiers::ALT), Some(vec![0x1B, b'x']));
        assert_eq!(
            map(KeyCode::Char('é'), KeyModifiers::NONE),
            Some("é".as_bytes().to_vec())
        );
        assert_eq!(
            map(KeyCode::Char('b'), KeyModifiers::CONTROL | KeyModifiers::ALT),
            Some(vec![0x1B, 0x02])
        );
    }

    #[test]
    fn test_arrow_keys() {
        assert_eq!(map(KeyCode::Up, KeyModifiers::NONE), Some(b"\x1b[A".to_vec()));
        assert_eq!(map(KeyCode::Up, KeyModifiers::CONTROL), Some(b"\x1b[1;5A".to_vec()));
        assert_eq!(map(KeyCode::Left, KeyModifiers::SHIFT), Some(b"\x1b[1;2D".to_vec()));
        assert_eq!(map(KeyCode::Right, KeyModifiers::ALT), Some(b"\x1b\x1b[C".to_vec()));
    }

    #[test]
    fn test_application_cursor_mode() {
        let modes = TerminalModes {
            application_cursor: true,
            ..TerminalModes::default()
        };
        let up = key_event(KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&up, &modes), Some(b"\x1bOA".to_vec()));

        let page_up = key_event(KeyCode::PageUp, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&page_up, &modes), Some(b"\x1b[5~".to_vec()));
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(map(KeyCode::F(1), KeyModifiers::NONE), Some(b"\x1bOP".to_vec()));
        assert_eq!(map(KeyCode::F(5), KeyModifiers::NONE), Some(b"\x1b[15~".to_vec()));
        assert_eq!(map(KeyCode::F(5), KeyModifiers::SHIFT), Some(b"\x1b[15;2~".to_vec()));
        assert_eq!(map(KeyCode::F(2), KeyModifiers::SHIFT), Some(b"\x1b[1;2Q".to_vec()));
    }

    #[test]
    fn test_editing_keys() {
        assert_eq!(map(KeyCode::Enter, KeyModifiers::NONE), Some(b"\r".to_vec()));
        assert_eq!(map(KeyCode::Backspace, KeyModifiers::NONE), Some(vec![0x7F]));
        assert_eq!(map(KeyCode::Backspace, KeyModifiers::ALT), Some(vec![0x1B, 0x7F]));
        assert_eq!(map(KeyCode::Backspace, KeyModifiers::CONTROL), Some(vec![0x08]));
        assert_eq!(map(KeyCode::Tab, KeyModifiers::NONE), Some(vec![0x09]));
        assert_eq!(map(KeyCode::BackTab, KeyModifiers::SHIFT), Some(b"\x1b[Z".to_vec()));
        assert_eq!(map(KeyCode::Esc, KeyModifiers::NONE), Some(vec![0x1B]));
        assert_eq!(map(KeyCode::CapsLock, KeyModifiers::NONE), None);

        let modes = TerminalModes {
            linefeed_newline: true,
            ..TerminalModes::default()
        };
        let enter = key_event(KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&enter, &modes), Some(b"\r\n".to_vec()));
    }
}
