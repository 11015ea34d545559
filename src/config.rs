use std::path::{Path, PathBuf};

use anyhow::Context;
use home::home_dir;
use ratatui::{style::Color, widgets::BorderType};
use serde::{
    de::{DeserializeOwned, Visitor},
    Deserialize,
};
use tokio::io::AsyncReadExt;

use crate::{lyrics::Ticks, script::ScriptCategory};

pub const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

#[derive(Debug, Clone)]
pub struct LyricviewConfig {
    pub server: ServerConfiguration,
    pub general: GeneralConfiguration,
    pub theme: ThemeConfiguration,
}

impl LyricviewConfig {
    pub async fn read_from_str(str: &str) -> anyhow::Result<Self> {
        let unresolved = toml::from_str::<LyricviewConfigUnresolved>(str)?;
        let theme = unresolved.theme.resolve().await?;
        let server = unresolved.server.resolve().await?;
        let general = unresolved.general.resolve().await?;
        Ok(Self {
            server,
            general,
            theme,
        })
    }

    /// Reads `path`, or `~/.config/lyricview/config.toml` when no path is
    /// given. A missing default file means the built-in defaults.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = config_dir()?.join("config.toml");
                if !tokio::fs::try_exists(&default).await? {
                    return Self::read_from_str(DEFAULT_CONFIG).await;
                }
                default
            }
        };
        let mut file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open config {}", path.display()))?;
        let mut str = String::new();
        file.read_to_string(&mut str).await?;
        Self::read_from_str(&str)
            .await
            .with_context(|| format!("Invalid config {}", path.display()))
    }
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    home_dir()
        .map(|home| home.join(".config").join("lyricview"))
        .context("Could not locate the home directory")
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfiguration {
    pub url: String,
    pub api_key: String,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfiguration {
    /// Lyric ticks per millisecond of playback position.
    pub ticks_per_millisecond: Ticks,
    pub poll_interval_ms: u64,
    pub romanize: bool,
    #[serde(default)]
    pub romanize_exclude: Vec<ScriptCategory>,
    pub scroll_offset: u16,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    pub title_format: String,
    pub show_info: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeConfiguration {
    pub lyrics: ThemeLyrics,
    pub borders: ThemeBorders,
    pub progress_bar: ThemeProgress,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeLyrics {
    pub past_text_color: ThemeColor,
    pub current_text_color: ThemeColor,
    pub future_text_color: ThemeColor,
    pub static_text_color: ThemeColor,
    pub reading_text_color: ThemeColor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeBorders {
    pub lyrics_border_color: ThemeColor,
    pub lyrics_border_text_color: ThemeColor,
    pub lyrics_border_style: BorderStyle,
    pub info_border_color: ThemeColor,
    pub info_text_color: ThemeColor,
    pub info_border_style: BorderStyle,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeProgress {
    pub color: ThemeColor,
    pub is_percentage: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(transparent)]
pub struct ThemeColor(pub Color);

impl<'de> Deserialize<'de> for ThemeColor {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        de.deserialize_str(ColorVisitor)
    }
}

struct ColorVisitor;

impl<'v> Visitor<'v> for ColorVisitor {
    type Value = ThemeColor;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a string representing a color")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        if let Some(stripped) = v.strip_prefix('#') {
            let color_rgb = u32::from_str_radix(stripped, 16).map_err(|e| {
                serde::de::Error::custom(format!("Invalid hex string for color {e}"))
            })?;
            let r = (color_rgb & 0xFF0000) >> 16;
            let g = (color_rgb & 0x00FF00) >> 8;
            let b = color_rgb & 0x0000FF;
            Ok(ThemeColor(Color::Rgb(r as u8, g as u8, b as u8)))
        } else {
            v.parse::<Color>()
                .map_err(|e| serde::de::Error::custom(format!("Invalid named color format {e}")))
                .map(ThemeColor)
        }
    }
}

#[derive(Debug, Clone)]
#[repr(transparent)]
pub struct BorderStyle(pub BorderType);

impl<'de> Deserialize<'de> for BorderStyle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(BorderVisitor).map(BorderStyle)
    }
}

struct BorderVisitor;

impl<'v> Visitor<'v> for BorderVisitor {
    type Value = BorderType;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a string representing a border style")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse::<BorderType>()
            .map_err(|e| serde::de::Error::custom(format!("Invalid border style: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LyricviewConfigUnresolved {
    general: MaybeLink<GeneralConfiguration>,
    server: MaybeLink<ServerConfiguration>,
    theme: MaybeLink<ThemeConfiguration>,
}

/// A section written inline, or `{ include = "file.toml" }` relative to the
/// config directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MaybeLink<V> {
    Explicit(V),
    Link { include: PathBuf },
}

impl<V: DeserializeOwned> MaybeLink<V> {
    async fn resolve(self) -> anyhow::Result<V> {
        match self {
            MaybeLink::Explicit(value) => Ok(value),
            MaybeLink::Link { include } => {
                let path = config_dir()?.join(include);
                let mut file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("Failed to open included {}", path.display()))?;
                let mut str = String::new();
                file.read_to_string(&mut str).await?;
                toml::from_str(&str).map_err(anyhow::Error::from)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_parses() {
        let config = LyricviewConfig::read_from_str(DEFAULT_CONFIG).await.unwrap();
        assert_eq!(config.general.ticks_per_millisecond, 10_000);
        assert!(config.general.romanize);
        assert!(config.general.romanize_exclude.is_empty());
        assert_eq!(config.server.device_name, None);
    }

    #[tokio::test]
    async fn test_exclusions_and_hex_colors() {
        let source = DEFAULT_CONFIG
            .replace("romanize_exclude = []", "romanize_exclude = [\"korean\", \"japanese\"]")
            .replace("current_text_color = \"lightgreen\"", "current_text_color = \"#12ab3c\"");
        let config = LyricviewConfig::read_from_str(&source).await.unwrap();
        assert_eq!(
            config.general.romanize_exclude,
            vec![ScriptCategory::Korean, ScriptCategory::Japanese]
        );
        assert_eq!(
            config.theme.lyrics.current_text_color,
            ThemeColor(Color::Rgb(0x12, 0xab, 0x3c))
        );
    }

    #[tokio::test]
    async fn test_bad_color_is_rejected() {
        let source = DEFAULT_CONFIG.replace(
            "current_text_color = \"lightgreen\"",
            "current_text_color = \"#zz\"",
        );
        assert!(LyricviewConfig::read_from_str(&source).await.is_err());
    }
}
