//! Configuration and color scheme management for lexterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.lexterm/config.toml`
//! - Built-in color schemes used to resolve indexed cell colors
//!
//! # Configuration File
//!
//! ```toml
//! # Shell to run (default: $SHELL, then /bin/sh)
//! shell = "/bin/bash"
//! shell_args = ["-l"]
//!
//! # TERM exported to the child
//! term = "xterm-256color"
//!
//! # Color scheme: default, solarized-dark, solarized-light,
//! #               monokai, nord, dracula, gruvbox-dark, tokyo-night
//! color_scheme = "tokyo-night"
//!
//! log_level = "info"
//! log_file = "/tmp/lexterm.log"
//!
//! [env]
//! EDITOR = "vim"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config")]
    Serialize(#[from] toml::ser::Error),
    #[error("could not determine home directory")]
    NoHome,
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell command; falls back to `$SHELL`, then `/bin/sh`
    pub shell: Option<String>,
    /// Extra arguments passed to the shell
    pub shell_args: Vec<String>,
    /// TERM value exported to the child
    pub term: String,
    /// Color scheme name
    pub color_scheme: String,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Log file path; defaults to `~/.lexterm/lexterm.log`
    pub log_file: Option<PathBuf>,
    /// Extra environment for the child
    pub env: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            shell_args: Vec::new(),
            term: "xterm-256color".to_string(),
            color_scheme: "default".to_string(),
            log_level: "info".to_string(),
            log_file: None,
            env: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from `~/.lexterm/config.toml`.
    ///
    /// Never fails: on error the defaults are returned together with the
    /// error, so the caller can report it once logging is up.
    pub fn load() -> (Self, Option<ConfigError>) {
        match Self::config_path() {
            Ok(path) => Self::load_or_default(&path),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Like [`Config::load`] for an explicit path. A missing file yields the
    /// defaults without an error.
    pub fn load_or_default(path: &Path) -> (Self, Option<ConfigError>) {
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load_from(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `~/.lexterm`
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        home_dir()
            .map(|home| home.join(".lexterm"))
            .ok_or(ConfigError::NoHome)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Configured log file, or `~/.lexterm/lexterm.log`
    pub fn log_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.log_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("lexterm.log")),
        }
    }

    /// Get the color scheme
    pub fn get_color_scheme(&self) -> ColorScheme {
        ColorScheme::by_name(&self.color_scheme)
    }
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Color scheme definition: default colors plus the 16 ANSI colors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub name: String,
    pub foreground: Color,
    pub background: Color,
    /// Indices 0-7 normal, 8-15 bright
    pub ansi: [Color; 16],
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::default_scheme()
    }
}

impl ColorScheme {
    /// Resolve a 256-color palette index
    pub fn indexed(&self, index: u8) -> Color {
        const CUBE: [u8; 6] = [0, 95, 135, 175, 215, 255];
        match index {
            0..=15 => self.ansi[index as usize],
            16..=231 => {
                let i = index - 16;
                Color::new(
                    CUBE[(i / 36) as usize],
                    CUBE[((i / 6) % 6) as usize],
                    CUBE[(i % 6) as usize],
                )
            }
            _ => {
                let level = 8 + (index - 232) * 10;
                Color::new(level, level, level)
            }
        }
    }

    /// Default color scheme (xterm palette)
    pub fn default_scheme() -> Self {
        Self {
            name: "default".to_string(),
            foreground: Color::new(229, 229, 229),
            background: Color::new(0, 0, 0),
            ansi: [
                Color::new(0, 0, 0),
                Color::new(205, 0, 0),
                Color::new(0, 205, 0),
                Color::new(205, 205, 0),
                Color::new(0, 0, 238),
                Color::new(205, 0, 205),
                Color::new(0, 205, 205),
                Color::new(229, 229, 229),
                // bright
                Color::new(127, 127, 127),
                Color::new(255, 0, 0),
                Color::new(0, 255, 0),
                Color::new(255, 255, 0),
                Color::new(92, 92, 255),
                Color::new(255, 0, 255),
                Color::new(0, 255, 255),
                Color::new(255, 255, 255),
            ],
        }
    }

    /// Solarized Dark scheme
    pub fn solarized_dark() -> Self {
        Self {
            name: "solarized-dark".to_string(),
            foreground: Color::new(131, 148, 150),
            background: Color::new(0, 43, 54),
            ansi: [
                Color::new(7, 54, 66),
                Color::new(220, 50, 47),
                Color::new(133, 153, 0),
                Color::new(181, 137, 0),
                Color::new(38, 139, 210),
                Color::new(211, 54, 130),
                Color::new(42, 161, 152),
                Color::new(238, 232, 213),
                // bright
                Color::new(0, 43, 54),
                Color::new(203, 75, 22),
                Color::new(88, 110, 117),
                Color::new(101, 123, 131),
                Color::new(131, 148, 150),
                Color::new(108, 113, 196),
                Color::new(147, 161, 161),
                Color::new(253, 246, 227),
            ],
        }
    }

    /// Solarized Light scheme
    pub fn solarized_light() -> Self {
        Self {
            name: "solarized-light".to_string(),
            foreground: Color::new(101, 123, 131),
            background: Color::new(253, 246, 227),
            ansi: [
                Color::new(7, 54, 66),
                Color::new(220, 50, 47),
                Color::new(133, 153, 0),
                Color::new(181, 137, 0),
                Color::new(38, 139, 210),
                Color::new(211, 54, 130),
                Color::new(42, 161, 152),
                Color::new(238, 232, 213),
                // bright
                Color::new(0, 43, 54),
                Color::new(203, 75, 22),
                Color::new(88, 110, 117),
                Color::new(101, 123, 131),
                Color::new(131, 148, 150),
                Color::new(108, 113, 196),
                Color::new(147, 161, 161),
                Color::new(253, 246, 227),
            ],
        }
    }

    /// Monokai scheme
    pub fn monokai() -> Self {
        Self {
            name: "monokai".to_string(),
            foreground: Color::new(248, 248, 242),
            background: Color::new(39, 40, 34),
            ansi: [
                Color::new(39, 40, 34),
                Color::new(249, 38, 114),
                Color::new(166, 226, 46),
                Color::new(244, 191, 117),
                Color::new(102, 217, 239),
                Color::new(174, 129, 255),
                Color::new(161, 239, 228),
                Color::new(248, 248, 242),
                // bright
                Color::new(117, 113, 94),
                Color::new(249, 38, 114),
                Color::new(166, 226, 46),
                Color::new(244, 191, 117),
                Color::new(102, 217, 239),
                Color::new(174, 129, 255),
                Color::new(161, 239, 228),
                Color::new(249, 248, 245),
            ],
        }
    }

    /// Nord scheme
    pub fn nord() -> Self {
        Self {
            name: "nord".to_string(),
            foreground: Color::new(216, 222, 233),
            background: Color::new(46, 52, 64),
            ansi: [
                Color::new(59, 66, 82),
                Color::new(191, 97, 106),
                Color::new(163, 190, 140),
                Color::new(235, 203, 139),
                Color::new(129, 161, 193),
                Color::new(180, 142, 173),
                Color::new(136, 192, 208),
                Color::new(229, 233, 240),
                // bright
                Color::new(76, 86, 106),
                Color::new(191, 97, 106),
                Color::new(163, 190, 140),
                Color::new(235, 203, 139),
                Color::new(129, 161, 193),
                Color::new(180, 142, 173),
                Color::new(143, 188, 187),
                Color::new(236, 239, 244),
            ],
        }
    }

    /// Dracula scheme
    pub fn dracula() -> Self {
        Self {
            name: "dracula".to_string(),
            foreground: Color::new(248, 248, 242),
            background: Color::new(40, 42, 54),
            ansi: [
                Color::new(33, 34, 44),
                Color::new(255, 85, 85),
                Color::new(80, 250, 123),
                Color::new(241, 250, 140),
                Color::new(189, 147, 249),
                Color::new(255, 121, 198),
                Color::new(139, 233, 253),
                Color::new(248, 248, 242),
                // bright
                Color::new(98, 114, 164),
                Color::new(255, 110, 110),
                Color::new(105, 255, 148),
                Color::new(255, 255, 165),
                Color::new(214, 172, 255),
                Color::new(255, 146, 223),
                Color::new(164, 255, 255),
                Color::new(255, 255, 255),
            ],
        }
    }

    /// Gruvbox Dark scheme
    pub fn gruvbox_dark() -> Self {
        Self {
            name: "gruvbox-dark".to_string(),
            foreground: Color::new(235, 219, 178),
            background: Color::new(40, 40, 40),
            ansi: [
                Color::new(40, 40, 40),
                Color::new(204, 36, 29),
                Color::new(152, 151, 26),
                Color::new(215, 153, 33),
                Color::new(69, 133, 136),
                Color::new(177, 98, 134),
                Color::new(104, 157, 106),
                Color::new(168, 153, 132),
                // bright
                Color::new(146, 131, 116),
                Color::new(251, 73, 52),
                Color::new(184, 187, 38),
                Color::new(250, 189, 47),
                Color::new(131, 165, 152),
                Color::new(211, 134, 155),
                Color::new(142, 192, 124),
                Color::new(235, 219, 178),
            ],
        }
    }

    /// Tokyo Night scheme
    pub fn tokyo_night() -> Self {
        Self {
            name: "tokyo-night".to_string(),
            foreground: Color::new(192, 202, 245),
            background: Color::new(26, 27, 38),
            ansi: [
                Color::new(21, 22, 30),
                Color::new(247, 118, 142),
                Color::new(158, 206, 106),
                Color::new(224, 175, 104),
                Color::new(122, 162, 247),
                Color::new(187, 154, 247),
                Color::new(125, 207, 255),
                Color::new(169, 177, 214),
                // bright
                Color::new(65, 72, 104),
                Color::new(247, 118, 142),
                Color::new(158, 206, 106),
                Color::new(224, 175, 104),
                Color::new(122, 162, 247),
                Color::new(187, 154, 247),
                Color::new(125, 207, 255),
                Color::new(192, 202, 245),
            ],
        }
    }

    /// Get scheme by name; unknown names fall back to the default scheme
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "solarized-dark" | "solarized_dark" => Self::solarized_dark(),
            "solarized-light" | "solarized_light" => Self::solarized_light(),
            "monokai" => Self::monokai(),
            "nord" => Self::nord(),
            "dracula" => Self::dracula(),
            "gruvbox-dark" | "gruvbox_dark" | "gruvbox" => Self::gruvbox_dark(),
            "tokyo-night" | "tokyo_night" | "tokyonight" => Self::tokyo_night(),
            other => {
                if other != "default" {
                    tracing::warn!("Unknown color scheme {:?}, using default", name);
                }
                Self::default_scheme()
            }
        }
    }

    /// List available schemes
    pub fn list() -> Vec<&'static str> {
        vec![
            "default",
            "solarized-dark",
            "solarized-light",
            "monokai",
            "nord",
            "dracula",
            "gruvbox-dark",
            "tokyo-night",
        ]
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.term, "xterm-256color");
        assert_eq!(config.color_scheme, "default");
        assert!(config.shell.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            shell = "/bin/bash"
            color_scheme = "nord"
            [env]
            EDITOR = "vim"
            "#,
        )
        .unwrap();
        assert_eq!(config.shell.as_deref(), Some("/bin/bash"));
        assert_eq!(config.get_color_scheme().name, "nord");
        assert_eq!(config.env.get("EDITOR").map(String::as_str), Some("vim"));
        assert_eq!(config.term, "xterm-256color");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.shell_args = vec!["-l".to_string()];
        config.log_file = Some(dir.path().join("out.log"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load_from(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "color_scheme = [").unwrap();
        assert!(matches!(Config::load_from(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_or_default_reports_errors() {
        let dir = tempfile::tempdir().unwrap();

        let (config, error) = Config::load_or_default(&dir.path().join("missing.toml"));
        assert_eq!(config, Config::default());
        assert!(error.is_none());

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "log_level = 3").unwrap();
        let (config, error) = Config::load_or_default(&bad);
        assert_eq!(config, Config::default());
        assert!(matches!(error, Some(ConfigError::Parse { .. })));

        let good = dir.path().join("good.toml");
        fs::write(&good, "color_scheme = \"nord\"\n").unwrap();
        let (config, error) = Config::load_or_default(&good);
        assert_eq!(config.get_color_scheme().name, "nord");
        assert!(error.is_none());
    }

    #[test]
    fn test_scheme_lookup() {
        for name in ColorScheme::list() {
            assert_eq!(ColorScheme::by_name(name).name, name);
        }
        assert_eq!(ColorScheme::by_name("Tokyo_Night").name, "tokyo-night");
        assert_eq!(ColorScheme::by_name("nope").name, "default");
    }

    #[test]
    fn test_indexed_palette() {
        let scheme = ColorScheme::default_scheme();
        assert_eq!(scheme.indexed(1).to_hex(), "#cd0000");
        assert_eq!(scheme.indexed(16), Color::new(0, 0, 0));
        assert_eq!(scheme.indexed(196), Color::new(255, 0, 0));
        assert_eq!(scheme.indexed(231), Color::new(255, 255, 255));
        assert_eq!(scheme.indexed(232), Color::new(8, 8, 8));
        assert_eq!(scheme.indexed(255), Color::new(238, 238, 238));
    }
}
