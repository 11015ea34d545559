use log::debug;

use crate::lyrics::{LyricLine, LyricMode, LyricSet, Ticks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Past,
    Current,
    Future,
}

/// Whether reaching a new current line scrolls the view to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoScrollLevel {
    /// Jump without animation; used once after the view is shown.
    #[default]
    Instant,
    Smooth,
    /// The user scrolled or navigated on their own.
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollRequest {
    pub index: usize,
    pub smooth: bool,
}

/// Result of feeding one playback position into the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub active: Option<usize>,
    /// Lines whose state differs from the previous update.
    pub changed: Vec<(usize, LineState)>,
    pub scroll: Option<ScrollRequest>,
}

/// Greatest index whose start is at or before `position`.
///
/// Lines are expected to be sorted by start. Lines without a start never
/// match.
pub fn find_active_index(position: Ticks, lines: &[LyricLine]) -> Option<usize> {
    lines
        .iter()
        .rposition(|line| matches!(line.start, Some(start) if start <= position))
}

#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    lyrics: Option<LyricSet>,
    states: Vec<LineState>,
    active: Option<usize>,
    painted: bool,
    scroll: AutoScrollLevel,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the loaded lines and rearms instant scrolling.
    pub fn clear(&mut self) {
        self.lyrics = None;
        self.states.clear();
        self.active = None;
        self.painted = false;
        self.scroll = AutoScrollLevel::Instant;
    }

    /// Replaces the loaded lines wholesale. Static sets get no line states.
    pub fn load(&mut self, lyrics: LyricSet) {
        self.states = match lyrics.mode() {
            LyricMode::Dynamic => vec![LineState::Future; lyrics.len()],
            LyricMode::Static => Vec::new(),
        };
        self.lyrics = Some(lyrics);
        self.active = None;
        self.painted = false;
    }

    pub fn lyrics(&self) -> Option<&LyricSet> {
        self.lyrics.as_ref()
    }

    pub fn mode(&self) -> Option<LyricMode> {
        self.lyrics.as_ref().map(LyricSet::mode)
    }

    pub fn states(&self) -> &[LineState] {
        &self.states
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn scroll_level(&self) -> AutoScrollLevel {
        self.scroll
    }

    pub fn suspend_scroll(&mut self) {
        if self.scroll != AutoScrollLevel::Suspended {
            debug!("Auto-scroll suspended");
        }
        self.scroll = AutoScrollLevel::Suspended;
    }

    pub fn resume_scroll(&mut self) {
        self.scroll = AutoScrollLevel::Smooth;
    }

    pub fn reset_scroll(&mut self) {
        self.scroll = AutoScrollLevel::Instant;
    }

    /// Start of a line in a time-indexed set.
    pub fn line_start(&self, index: usize) -> Option<Ticks> {
        let lyrics = self.lyrics.as_ref().filter(|it| it.is_dynamic())?;
        lyrics.lines().get(index)?.start
    }

    /// Recomputes every line state for `position`. A no-op unless a
    /// time-indexed set is loaded.
    pub fn update(&mut self, position: Ticks) -> Transition {
        let Some(lyrics) = self.lyrics.as_ref().filter(|it| it.is_dynamic()) else {
            return Transition::default();
        };

        let active = find_active_index(position, lyrics.lines());
        let mut changed = Vec::new();
        for (index, state) in self.states.iter_mut().enumerate() {
            let next = match active {
                Some(current) if index < current => LineState::Past,
                Some(current) if index == current => LineState::Current,
                _ => LineState::Future,
            };
            if !self.painted || *state != next {
                *state = next;
                changed.push((index, next));
            }
        }
        self.painted = true;

        let previous = std::mem::replace(&mut self.active, active);
        let scroll = match active {
            Some(index) if previous != Some(index) => {
                debug!("Line {index} is now current");
                match self.scroll {
                    AutoScrollLevel::Suspended => None,
                    level => {
                        self.scroll = AutoScrollLevel::Smooth;
                        Some(ScrollRequest {
                            index,
                            smooth: level == AutoScrollLevel::Smooth,
                        })
                    }
                }
            }
            _ => None,
        };

        Transition {
            active,
            changed,
            scroll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(starts: &[Ticks]) -> Vec<LyricLine> {
        starts
            .iter()
            .enumerate()
            .map(|(idx, start)| LyricLine::new(format!("line {idx}"), Some(*start)))
            .collect()
    }

    fn engine_with(lines: Vec<LyricLine>) -> SyncEngine {
        let mut engine = SyncEngine::new();
        engine.load(LyricSet::new(lines).unwrap());
        engine
    }

    #[test]
    fn test_find_active_index_bounds() {
        let lines = timed(&[100, 200, 300]);
        assert_eq!(find_active_index(-5, &lines), None);
        assert_eq!(find_active_index(99, &lines), None);
        assert_eq!(find_active_index(100, &lines), Some(0));
        assert_eq!(find_active_index(250, &lines), Some(1));
        assert_eq!(find_active_index(300, &lines), Some(2));
        assert_eq!(find_active_index(i64::MAX, &lines), Some(2));
        assert_eq!(find_active_index(0, &[]), None);
    }

    #[test]
    fn test_find_active_index_is_monotonic() {
        let lines = timed(&[0, 10, 10, 35, 90]);
        let mut last = None;
        for position in -10..120 {
            let active = find_active_index(position, &lines);
            assert!(active >= last, "went backwards at {position}");
            last = active;
        }
    }

    #[test]
    fn test_dynamic_scenario() {
        let mut engine = engine_with(vec![
            LyricLine::new("你好", Some(0)),
            LyricLine::new("世界", Some(50000)),
        ]);
        assert_eq!(engine.update(25000).active, Some(0));
        assert_eq!(engine.states(), &[LineState::Current, LineState::Future]);
        assert_eq!(engine.update(50000).active, Some(1));
        assert_eq!(engine.states(), &[LineState::Past, LineState::Current]);
    }

    #[test]
    fn test_before_first_line_everything_is_future() {
        let mut engine = engine_with(timed(&[100, 200]));
        let transition = engine.update(10);
        assert_eq!(transition.active, None);
        assert_eq!(transition.scroll, None);
        assert_eq!(
            transition.changed,
            vec![(0, LineState::Future), (1, LineState::Future)]
        );
        assert!(engine.states().iter().all(|it| *it == LineState::Future));
    }

    #[test]
    fn test_only_changed_lines_are_reported() {
        let mut engine = engine_with(timed(&[0, 10, 20, 30]));
        assert_eq!(engine.update(0).changed.len(), 4);
        assert!(engine.update(5).changed.is_empty());
        assert_eq!(
            engine.update(15).changed,
            vec![(0, LineState::Past), (1, LineState::Current)]
        );
        // seeking backwards
        assert_eq!(
            engine.update(0).changed,
            vec![(0, LineState::Current), (1, LineState::Future)]
        );
    }

    #[test]
    fn test_first_scroll_is_instant_then_smooth() {
        let mut engine = engine_with(timed(&[0, 10, 20]));
        assert_eq!(
            engine.update(0).scroll,
            Some(ScrollRequest {
                index: 0,
                smooth: false
            })
        );
        assert_eq!(engine.scroll_level(), AutoScrollLevel::Smooth);
        // same line again, nothing new
        assert_eq!(engine.update(5).scroll, None);
        assert_eq!(
            engine.update(10).scroll,
            Some(ScrollRequest {
                index: 1,
                smooth: true
            })
        );
    }

    #[test]
    fn test_suspended_until_resumed() {
        let mut engine = engine_with(timed(&[0, 10, 20, 30]));
        engine.update(0);
        engine.suspend_scroll();
        assert_eq!(engine.update(10).scroll, None);
        assert_eq!(engine.update(20).scroll, None);
        assert_eq!(engine.active_index(), Some(2));

        engine.resume_scroll();
        assert_eq!(engine.scroll_level(), AutoScrollLevel::Smooth);
        assert_eq!(
            engine.update(30).scroll,
            Some(ScrollRequest {
                index: 3,
                smooth: true
            })
        );
    }

    #[test]
    fn test_static_set_ignores_positions() {
        let mut engine = engine_with(vec![
            LyricLine::new("no", None),
            LyricLine::new("timing", None),
        ]);
        assert_eq!(engine.mode(), Some(LyricMode::Static));
        assert_eq!(engine.update(1_000), Transition::default());
        assert!(engine.states().is_empty());
        assert_eq!(engine.active_index(), None);
        assert_eq!(engine.line_start(0), None);
    }

    #[test]
    fn test_clear_rearms_instant_scroll() {
        let mut engine = engine_with(timed(&[0]));
        engine.update(0);
        engine.suspend_scroll();
        engine.clear();
        assert_eq!(engine.scroll_level(), AutoScrollLevel::Instant);
        assert!(engine.lyrics().is_none());
        assert_eq!(engine.update(0), Transition::default());
    }
}
