use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::event::NowPlayingItem;

/// Integer time unit shared by lyric timestamps and the playback position.
pub type Ticks = i64;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LyricLine {
    #[serde(rename = "Text", default)]
    pub text: String,
    #[serde(rename = "Start", default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Ticks>,
}

impl LyricLine {
    pub fn new(text: impl Into<String>, start: Option<Ticks>) -> Self {
        Self {
            text: text.into(),
            start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyricMode {
    /// Time indexed, follows playback.
    Dynamic,
    Static,
}

/// Lines of one item. Never empty, and the mode is fixed by the first line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricSet {
    lines: Vec<LyricLine>,
    mode: LyricMode,
}

impl LyricSet {
    pub fn new(lines: Vec<LyricLine>) -> Option<Self> {
        let mode = if lines.first()?.start.is_some() {
            LyricMode::Dynamic
        } else {
            LyricMode::Static
        };
        Some(Self { lines, mode })
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn mode(&self) -> LyricMode {
        self.mode
    }

    pub fn is_dynamic(&self) -> bool {
        self.mode == LyricMode::Dynamic
    }

    /// Never zero, see [`LyricSet::new`].
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LyricsObject {
    #[serde(rename = "Lyrics", default)]
    lyrics: Option<Vec<LyricLine>>,
}

/// Parses the `/Audio/{id}/Lyrics` payload. A missing or empty `Lyrics`
/// array means the item has no lyrics.
pub fn parse_lyrics(json: &str) -> anyhow::Result<Option<LyricSet>> {
    let object = serde_json::from_str::<LyricsObject>(json)?;
    Ok(object.lyrics.and_then(LyricSet::new))
}

#[async_trait::async_trait]
pub trait LyricFetcher: Send + Sync {
    async fn fetch_lyrics(&self, item: &NowPlayingItem) -> anyhow::Result<Option<LyricSet>>;
}

/// Reads `<dir>/<item id>.json` files in the server's payload format.
#[derive(Debug, Clone)]
pub struct FileLyrics {
    dir: PathBuf,
}

impl FileLyrics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait::async_trait]
impl LyricFetcher for FileLyrics {
    async fn fetch_lyrics(&self, item: &NowPlayingItem) -> anyhow::Result<Option<LyricSet>> {
        let path = self.dir.join(format!("{}.json", item.id));
        if !tokio::fs::try_exists(&path).await? {
            // Item does not have lyrics
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&path).await?;
        parse_lyrics(&json)
    }
}
