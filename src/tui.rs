use std::{io::Stdout, sync::Arc, thread::JoinHandle, time::Duration};

use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind,
        MouseEventKind,
    },
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use handlebars::Handlebars;
use log::warn;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame, Terminal,
};
use serde::Serialize;

use crate::{
    annotate::{AnnotatedSegment, Annotation},
    config::LyricviewConfig,
    event::{NowPlayingItem, ViewInput},
    lyrics::LyricMode,
    session::{LyricsView, RenderedLine},
    sync::LineState,
};

type Term = Terminal<CrosstermBackend<Stdout>>;

#[derive(Serialize)]
struct TitleContext<'a> {
    name: &'a str,
    artists: String,
    album: &'a str,
}

/// Paints the lyrics in the terminal, readings on the row above their text.
pub struct TerminalView {
    terminal: Term,
    screen: Screen,
}

struct Screen {
    config: Arc<LyricviewConfig>,
    titles: Handlebars<'static>,
    item: Option<NowPlayingItem>,
    lines: Vec<RenderedLine>,
    states: Vec<Option<LineState>>,
    mode: Option<LyricMode>,
    placeholder: bool,
    focus: Option<usize>,
    scroll: u16,
    scroll_target: u16,
    position: Duration,
}

impl TerminalView {
    pub fn open(config: Arc<LyricviewConfig>) -> anyhow::Result<Self> {
        let mut titles = Handlebars::new();
        titles.register_escape_fn(handlebars::no_escape);
        titles.register_template_string("title", &config.general.display.title_format)?;

        let terminal = setup_terminal()?;
        Ok(Self {
            terminal,
            screen: Screen {
                config,
                titles,
                item: None,
                lines: Vec::new(),
                states: Vec::new(),
                mode: None,
                placeholder: false,
                focus: None,
                scroll: 0,
                scroll_target: 0,
                position: Duration::ZERO,
            },
        })
    }
}

impl Drop for TerminalView {
    fn drop(&mut self) {
        if let Err(err) = restore_terminal(&mut self.terminal) {
            warn!("Failed to restore the terminal: {err:#}");
        }
    }
}

impl LyricsView for TerminalView {
    fn render_lines(&mut self, lines: Vec<RenderedLine>, mode: LyricMode) {
        let screen = &mut self.screen;
        screen.states = vec![None; lines.len()];
        screen.lines = lines;
        screen.mode = Some(mode);
        screen.placeholder = false;
        screen.focus = None;
        screen.scroll = 0;
        screen.scroll_target = 0;
    }

    fn render_no_lyrics(&mut self) {
        let screen = &mut self.screen;
        screen.lines.clear();
        screen.states.clear();
        screen.mode = None;
        screen.placeholder = true;
        screen.focus = None;
    }

    fn set_line_state(&mut self, index: usize, state: LineState) {
        if let Some(slot) = self.screen.states.get_mut(index) {
            *slot = Some(state);
        }
    }

    fn scroll_to_line(&mut self, index: usize, smooth: bool) {
        let screen = &mut self.screen;
        screen.focus = Some(index);
        screen.scroll_target = screen.anchor_row(index);
        if !smooth {
            screen.scroll = screen.scroll_target;
        }
    }

    fn show_item(&mut self, item: Option<&NowPlayingItem>) {
        self.screen.item = item.cloned();
        self.screen.position = Duration::ZERO;
        self.screen.lines.clear();
        self.screen.placeholder = false;
    }

    fn show_position(&mut self, position: Duration) {
        self.screen.position = position;
    }

    fn navigate(&mut self, input: ViewInput) {
        let screen = &mut self.screen;
        let last = screen.lines.len().saturating_sub(1);
        match input {
            ViewInput::ArrowUp | ViewInput::ArrowDown if !screen.lines.is_empty() => {
                let focus = match (screen.focus, input) {
                    (None, _) => 0,
                    (Some(focus), ViewInput::ArrowUp) => focus.saturating_sub(1),
                    (Some(focus), _) => (focus + 1).min(last),
                };
                screen.focus = Some(focus);
                screen.scroll = screen.anchor_row(focus);
                screen.scroll_target = screen.scroll;
            }
            ViewInput::Wheel { delta } => {
                let max = screen.row_of(screen.lines.len());
                let scroll = (screen.scroll as i32 + delta as i32).clamp(0, max as i32) as u16;
                screen.scroll = scroll;
                screen.scroll_target = scroll;
            }
            _ => {}
        }
    }

    fn focused_line(&self) -> Option<usize> {
        self.screen.focus
    }

    fn redraw(&mut self) -> anyhow::Result<()> {
        self.screen.step_scroll();
        self.terminal.draw(|frame| self.screen.draw(frame))?;
        Ok(())
    }
}

impl Screen {
    fn line_height(line: &RenderedLine) -> u16 {
        if line.annotation.is_ruby() {
            2
        } else {
            1
        }
    }

    fn row_of(&self, index: usize) -> u16 {
        self.lines.iter().take(index).map(Self::line_height).sum()
    }

    /// Scroll position that puts `index` a few rows below the top.
    fn anchor_row(&self, index: usize) -> u16 {
        self.row_of(index)
            .saturating_sub(self.config.general.scroll_offset)
    }

    /// Moves halfway towards the target on every frame.
    fn step_scroll(&mut self) {
        let distance = self.scroll_target as i32 - self.scroll as i32;
        let step = match distance / 2 {
            0 => distance.signum(),
            half => half,
        };
        self.scroll = (self.scroll as i32 + step) as u16;
    }

    fn text_style(&self, index: usize) -> Style {
        let theme = &self.config.theme.lyrics;
        let state = self.states.get(index).copied().flatten();
        let mut style = match (self.mode, state) {
            (Some(LyricMode::Static), _) => Style::default().fg(theme.static_text_color.0),
            (_, Some(LineState::Current)) => Style::default()
                .fg(theme.current_text_color.0)
                .add_modifier(Modifier::BOLD),
            (_, Some(LineState::Past)) => Style::default().fg(theme.past_text_color.0),
            _ => Style::default().fg(theme.future_text_color.0),
        };
        if self.focus == Some(index) {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        style
    }

    fn lyric_rows(&self) -> Vec<Line<'static>> {
        if self.placeholder {
            return vec![Line::from("No lyrics available".to_owned())];
        }
        let reading_style = Style::default().fg(self.config.theme.lyrics.reading_text_color.0);
        let mut rows = Vec::new();
        for line in &self.lines {
            let style = self.text_style(line.index);
            match &line.annotation {
                Annotation::Ruby(annotated) => {
                    let (readings, bases) = ruby_rows(&annotated.segments, style, reading_style);
                    rows.push(readings);
                    rows.push(bases);
                }
                Annotation::Plain(text) => {
                    rows.push(Line::from(Span::styled(text.clone(), style)))
                }
            }
        }
        rows
    }

    fn title(&self) -> String {
        let Some(item) = &self.item else {
            return "Nothing playing".to_owned();
        };
        let context = TitleContext {
            name: &item.name,
            artists: item.artists.join(", "),
            album: item.album.as_deref().unwrap_or_default(),
        };
        self.titles
            .render("title", &context)
            .unwrap_or_else(|_| item.name.clone())
    }

    fn draw(&self, f: &mut Frame<CrosstermBackend<Stdout>>) {
        let size = f.size();
        let display = &self.config.general.display;
        let borders = &self.config.theme.borders;

        // Layouts
        let vertical_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(if display.show_progress {
                vec![Constraint::Min(3), Constraint::Length(1)]
            } else {
                vec![Constraint::Min(3)]
            })
            .split(size);

        let horizontal_layout = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(if display.show_info {
                vec![Constraint::Percentage(75), Constraint::Percentage(25)]
            } else {
                vec![Constraint::Percentage(100)]
            })
            .split(vertical_layout[0]);

        // Lyrics
        let lyrics_block = Block::default()
            .borders(Borders::ALL)
            .border_type(borders.lyrics_border_style.0)
            .border_style(Style::default().fg(borders.lyrics_border_color.0))
            .title(Span::styled(
                self.title(),
                Style::default().fg(borders.lyrics_border_text_color.0),
            ))
            .title_alignment(Alignment::Left);
        let lyrics_part = Paragraph::new(self.lyric_rows())
            .alignment(Alignment::Center)
            .scroll((self.scroll, 0))
            .block(lyrics_block);
        f.render_widget(lyrics_part, horizontal_layout[0]);

        // Track info
        if display.show_info {
            let info_block = Block::default()
                .borders(Borders::ALL)
                .border_type(borders.info_border_style.0)
                .border_style(Style::default().fg(borders.info_border_color.0))
                .title("About this track")
                .title_alignment(Alignment::Right);
            let mode = match self.mode {
                Some(LyricMode::Dynamic) => "synced",
                Some(LyricMode::Static) => "unsynced",
                None => "none",
            };
            let (artists, album) = self
                .item
                .as_ref()
                .map(|it| (it.artists.join(", "), it.album.clone().unwrap_or_default()))
                .unwrap_or_default();
            let info_part = Paragraph::new(vec![
                Line::from(format!("Artists: {artists}")),
                Line::from(format!("Album: {album}")),
                Line::from(format!("Lyrics: {} lines, {mode}", self.lines.len())),
                Line::from(""),
                Line::from("↑/↓ move  enter seek  q quit"),
            ])
            .style(Style::default().fg(borders.info_text_color.0))
            .alignment(Alignment::Left)
            .block(info_block);
            f.render_widget(info_part, horizontal_layout[1]);
        }

        // Track progress
        if display.show_progress {
            let progress = &self.config.theme.progress_bar;
            let ticks_per_millisecond = self.config.general.ticks_per_millisecond.max(1);
            let duration_ms = self
                .item
                .as_ref()
                .and_then(|it| it.run_time_ticks)
                .map(|ticks| (ticks / ticks_per_millisecond).max(0) as u64)
                .unwrap_or_default();
            let position_ms = self.position.as_millis() as u64;
            let percent = if duration_ms == 0 {
                0
            } else {
                (position_ms * 100 / duration_ms).min(100) as u16
            };
            let label = if progress.is_percentage {
                format!("{percent}%")
            } else {
                format!("{} / {}", fmt_duration(position_ms), fmt_duration(duration_ms))
            };
            let track_progress = Gauge::default()
                .gauge_style(Style::default().fg(progress.color.0))
                .percent(percent)
                .label(label);
            f.render_widget(track_progress, vertical_layout[1]);
        }
    }
}

/// Reading row and text row of one annotated line, each segment padded to
/// the wider of its two parts.
fn ruby_rows(
    segments: &[AnnotatedSegment],
    text_style: Style,
    reading_style: Style,
) -> (Line<'static>, Line<'static>) {
    let mut readings = Vec::new();
    let mut bases = Vec::new();
    for (idx, segment) in segments.iter().enumerate() {
        if idx > 0 {
            readings.push(Span::raw(" "));
            bases.push(Span::raw(" "));
        }
        let base = match segment.base.trim() {
            "" => " ",
            trimmed => trimmed,
        };
        let base_width = Span::raw(base).width();
        let reading_width = Span::raw(segment.reading.as_str()).width();
        let width = base_width.max(reading_width);
        readings.push(Span::styled(
            centered(&segment.reading, reading_width, width),
            reading_style,
        ));
        bases.push(Span::styled(centered(base, base_width, width), text_style));
    }
    (Line::from(readings), Line::from(bases))
}

fn centered(text: &str, width: usize, target: usize) -> String {
    let total = target.saturating_sub(width);
    let left = total / 2;
    format!("{}{text}{}", " ".repeat(left), " ".repeat(total - left))
}

fn fmt_duration(duration_ms: u64) -> String {
    let mut seconds = duration_ms / 1000;
    let minutes = seconds / 60;
    seconds %= 60;
    format!("{minutes:0>2}:{seconds:0>2}")
}

/// Forwards key presses and wheel scrolls until the receiving side is gone.
pub fn spawn_input_reader(tx: flume::Sender<ViewInput>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        if let Err(err) = read_input(&tx) {
            warn!("Terminal input stopped: {err:#}");
        }
    })
}

fn read_input(tx: &flume::Sender<ViewInput>) -> anyhow::Result<()> {
    while !tx.is_disconnected() {
        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        let input = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => ViewInput::Quit,
                KeyCode::Up => ViewInput::ArrowUp,
                KeyCode::Down => ViewInput::ArrowDown,
                KeyCode::Enter => ViewInput::Activate(None),
                _ => continue,
            },
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => ViewInput::Wheel { delta: -1 },
                MouseEventKind::ScrollDown => ViewInput::Wheel { delta: 1 },
                _ => continue,
            },
            _ => continue,
        };
        if tx.send(input).is_err() {
            break;
        }
    }
    Ok(())
}

fn setup_terminal() -> anyhow::Result<Term> {
    let mut stdout = std::io::stdout();
    enable_raw_mode()?;
    crossterm::execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(terminal: &mut Term) -> anyhow::Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor().map_err(anyhow::Error::from)
}
