//! One lyrics view session: binds to the current player, loads the lyric set
//! of the playing item and keeps the line states in step with playback.

use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};

use crate::{
    annotate::{Annotation, Annotator},
    event::{LeaveReason, NowPlayingItem, PlayerEvent, ViewInput},
    lyrics::{LyricFetcher, LyricMode, LyricSet, Ticks},
    player::{PlaybackManager, Player},
    script::{classify, ScriptCategory},
    sync::{LineState, SyncEngine, Transition},
};

/// Ticks per millisecond used by Jellyfin-style servers (100ns ticks).
pub const DEFAULT_TICKS_PER_MILLISECOND: Ticks = 10_000;

/// A line ready for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLine {
    pub index: usize,
    pub text: String,
    pub start: Option<Ticks>,
    pub category: ScriptCategory,
    pub annotation: Annotation,
}

/// Rendering collaborator. Owns the display, the session only tells it what
/// to show.
pub trait LyricsView {
    fn render_lines(&mut self, lines: Vec<RenderedLine>, mode: LyricMode);

    fn render_no_lyrics(&mut self);

    fn set_line_state(&mut self, index: usize, state: LineState);

    /// Scroll to and focus a line.
    fn scroll_to_line(&mut self, index: usize, smooth: bool);

    fn show_item(&mut self, _item: Option<&NowPlayingItem>) {}

    fn show_position(&mut self, _position: Duration) {}

    /// Manual scrolling and cursor movement.
    fn navigate(&mut self, _input: ViewInput) {}

    fn focused_line(&self) -> Option<usize> {
        None
    }

    fn redraw(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub trait Navigator {
    fn leave(&mut self, reason: LeaveReason);
}

struct Binding {
    player: Arc<dyn Player>,
    events: flume::Receiver<PlayerEvent>,
}

/// A lyric fetch the caller has to run and report back with
/// [`LyricsSession::finish_load`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub generation: u64,
    pub item: NowPlayingItem,
}

#[derive(Debug)]
pub enum LoadOutcome {
    Fetched(anyhow::Result<Option<LyricSet>>),
    /// The fetch task died.
    Crashed(String),
}

#[derive(Debug)]
pub struct LoadResult {
    pub generation: u64,
    pub outcome: LoadOutcome,
}

enum Step {
    Player(Option<PlayerEvent>),
    PlayerChanged(Option<()>),
    Input(Option<ViewInput>),
    Loaded(Option<LoadResult>),
}

pub struct LyricsSession<V: LyricsView, N: Navigator> {
    playback: Arc<dyn PlaybackManager>,
    fetcher: Arc<dyn LyricFetcher>,
    annotator: Annotator,
    view: V,
    navigator: N,
    ticks_per_millisecond: Ticks,
    binding: Option<Binding>,
    item: Option<NowPlayingItem>,
    engine: SyncEngine,
    generation: u64,
    left: Option<LeaveReason>,
}

impl<V: LyricsView, N: Navigator> LyricsSession<V, N> {
    pub fn new(
        playback: Arc<dyn PlaybackManager>,
        fetcher: Arc<dyn LyricFetcher>,
        annotator: Annotator,
        view: V,
        navigator: N,
    ) -> Self {
        Self {
            playback,
            fetcher,
            annotator,
            view,
            navigator,
            ticks_per_millisecond: DEFAULT_TICKS_PER_MILLISECOND,
            binding: None,
            item: None,
            engine: SyncEngine::new(),
            generation: 0,
            left: None,
        }
    }

    pub fn ticks_per_millisecond(mut self, ticks: Ticks) -> Self {
        self.ticks_per_millisecond = ticks;
        self
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn tracked_item(&self) -> Option<&NowPlayingItem> {
        self.item.as_ref()
    }

    pub fn bound_player(&self) -> Option<&str> {
        self.binding.as_ref().map(|it| it.player.id())
    }

    pub fn left(&self) -> Option<LeaveReason> {
        self.left
    }

    /// Playback position in lyric ticks.
    pub fn to_ticks(&self, position: Duration) -> Ticks {
        position.as_millis() as Ticks * self.ticks_per_millisecond
    }

    /// Binds to `player`, dropping any previous subscription first. Binding
    /// to the player already bound does nothing.
    pub fn bind(&mut self, player: Option<Arc<dyn Player>>) {
        if let (Some(bound), Some(player)) = (&self.binding, &player) {
            if bound.player.id() == player.id() {
                return;
            }
        }
        self.release();
        if let Some(player) = player {
            debug!("Binding to player {}", player.id());
            let events = player.subscribe();
            self.binding = Some(Binding { player, events });
        }
    }

    pub fn release(&mut self) {
        if let Some(binding) = self.binding.take() {
            debug!("Releasing player {}", binding.player.id());
        }
    }

    /// The view was shown.
    pub fn activate(&mut self) -> Option<LoadRequest> {
        self.engine.reset_scroll();
        self.begin_load()
    }

    /// The view is about to hide.
    pub fn deactivate(&mut self) {
        self.release();
    }

    /// The playback manager switched players.
    pub fn player_changed(&mut self) {
        self.bind(self.playback.current_player());
    }

    /// The bound player closed its event stream. Moves on to whatever player
    /// is current now, or leaves when that is the same one or none.
    pub fn player_gone(&mut self) {
        let gone = self.binding.take().map(|it| it.player.id().to_owned());
        debug!("Player {gone:?} went away");
        match self.playback.current_player() {
            Some(player) if gone.as_deref() != Some(player.id()) => self.bind(Some(player)),
            _ => self.leave(LeaveReason::NoPlayer),
        }
    }

    fn leave(&mut self, reason: LeaveReason) {
        info!("Leaving lyrics view: {reason:?}");
        self.left = Some(reason);
        self.navigator.leave(reason);
    }

    /// Resets the session and resolves what to load. Every call supersedes
    /// loads started before it.
    pub fn begin_load(&mut self) -> Option<LoadRequest> {
        self.generation += 1;
        self.engine.clear();
        self.item = None;

        let Some(player) = self.playback.current_player() else {
            self.leave(LeaveReason::NoPlayer);
            return None;
        };
        self.bind(Some(Arc::clone(&player)));

        let Some(item) = player.state().item else {
            self.leave(LeaveReason::NoPlayer);
            return None;
        };
        info!("Loading lyrics for {} ({})", item.name, item.id);
        self.view.show_item(Some(&item));
        self.item = Some(item.clone());
        Some(LoadRequest {
            generation: self.generation,
            item,
        })
    }

    pub fn finish_load(&mut self, result: LoadResult) {
        if result.generation != self.generation {
            debug!(
                "Discarding lyrics of load {} (current is {})",
                result.generation, self.generation
            );
            return;
        }
        match result.outcome {
            LoadOutcome::Fetched(Ok(Some(lyrics))) => self.render(lyrics),
            LoadOutcome::Fetched(Ok(None)) => {
                info!("No lyrics available");
                self.view.render_no_lyrics();
            }
            LoadOutcome::Fetched(Err(err)) => {
                warn!("Failed to fetch lyrics: {err:#}");
                self.view.render_no_lyrics();
            }
            LoadOutcome::Crashed(message) => {
                warn!("Lyric load crashed: {message}");
                self.leave(LeaveReason::LoadFailed);
            }
        }
    }

    fn render(&mut self, lyrics: LyricSet) {
        let mode = lyrics.mode();
        let lines = lyrics
            .lines()
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let category = classify(&line.text);
                RenderedLine {
                    index,
                    text: line.text.clone(),
                    start: line.start,
                    category,
                    annotation: self.annotator.annotate(&line.text, category),
                }
            })
            .collect();
        info!("Rendering {} {mode:?} lines", lyrics.len());
        self.view.render_lines(lines, mode);
        self.engine.load(lyrics);

        if mode == LyricMode::Dynamic {
            let position = self
                .binding
                .as_ref()
                .map(|it| it.player.state().position)
                .unwrap_or_default();
            self.sync_to(self.to_ticks(position));
        }
    }

    fn sync_to(&mut self, position: Ticks) {
        let Transition {
            changed, scroll, ..
        } = self.engine.update(position);
        for (index, state) in changed {
            self.view.set_line_state(index, state);
        }
        if let Some(scroll) = scroll {
            self.view.scroll_to_line(scroll.index, scroll.smooth);
        }
    }

    /// Returns a load to run when the event switched items.
    pub fn handle_player_event(&mut self, event: PlayerEvent) -> Option<LoadRequest> {
        match event {
            PlayerEvent::TimeUpdate { position } => {
                self.view.show_position(position);
                if self.engine.mode() == Some(LyricMode::Dynamic) {
                    self.sync_to(self.to_ticks(position));
                }
                None
            }
            PlayerEvent::PlaybackStart { item } => {
                let tracked = self.item.as_ref().map(|it| it.id.as_str());
                if tracked != Some(item.id.as_str()) {
                    self.begin_load()
                } else {
                    None
                }
            }
            PlayerEvent::PlaybackStop { next_media_type } => {
                if next_media_type.is_none() {
                    self.leave(LeaveReason::PlaybackEnded);
                }
                None
            }
        }
    }

    pub async fn handle_input(&mut self, input: ViewInput) {
        match input {
            ViewInput::Wheel { .. }
            | ViewInput::TouchMove
            | ViewInput::ArrowUp
            | ViewInput::ArrowDown => {
                self.engine.suspend_scroll();
                self.view.navigate(input);
            }
            ViewInput::Activate(index) => {
                if let Some(index) = index.or_else(|| self.view.focused_line()) {
                    if let Err(err) = self.click_line(index).await {
                        warn!("Failed to seek to line {index}: {err:#}");
                    }
                }
            }
            ViewInput::Quit => self.leave(LeaveReason::UserQuit),
        }
    }

    /// Seeks to the start of a line and resumes smooth auto-scroll. Lines of
    /// a static set are inert.
    pub async fn click_line(&mut self, index: usize) -> anyhow::Result<()> {
        let Some(start) = self.engine.line_start(index) else {
            return Ok(());
        };
        self.engine.resume_scroll();
        let Some(player) = self.binding.as_ref().map(|it| Arc::clone(&it.player)) else {
            return Ok(());
        };
        player.seek(start).await?;
        if player.state().paused {
            player.unpause().await?;
        }
        Ok(())
    }

    /// Drives the session until it leaves the view. `input` closing counts as
    /// the user quitting.
    pub async fn run(mut self, input: flume::Receiver<ViewInput>) -> anyhow::Result<LeaveReason> {
        let (load_tx, load_rx) = flume::unbounded();
        let mut changes = Some(self.playback.subscribe_changes());
        if let Some(request) = self.activate() {
            spawn_load(Arc::clone(&self.fetcher), request, load_tx.clone());
        }
        self.view.redraw()?;

        let reason = loop {
            if let Some(reason) = self.left {
                break reason;
            }
            let player_events = self.binding.as_ref().map(|it| it.events.clone());
            let step = tokio::select! {
                event = next_event(player_events) => Step::Player(event),
                changed = next_event(changes.clone()) => Step::PlayerChanged(changed),
                input = input.recv_async() => Step::Input(input.ok()),
                loaded = load_rx.recv_async() => Step::Loaded(loaded.ok()),
            };
            match step {
                Step::Player(Some(event)) => {
                    if let Some(request) = self.handle_player_event(event) {
                        spawn_load(Arc::clone(&self.fetcher), request, load_tx.clone());
                    }
                }
                Step::Player(None) => self.player_gone(),
                Step::PlayerChanged(Some(())) => self.player_changed(),
                Step::PlayerChanged(None) => {
                    debug!("Playback manager stopped reporting player changes");
                    changes = None;
                }
                Step::Input(Some(input)) => self.handle_input(input).await,
                Step::Input(None) => self.leave(LeaveReason::UserQuit),
                Step::Loaded(Some(result)) => self.finish_load(result),
                Step::Loaded(None) => {}
            }
            self.view.redraw()?;
        };

        self.deactivate();
        Ok(reason)
    }
}

async fn next_event<T>(events: Option<flume::Receiver<T>>) -> Option<T> {
    match events {
        Some(events) => events.recv_async().await.ok(),
        None => std::future::pending().await,
    }
}

fn spawn_load(fetcher: Arc<dyn LyricFetcher>, request: LoadRequest, tx: flume::Sender<LoadResult>) {
    let LoadRequest { generation, item } = request;
    tokio::spawn(async move {
        let fetch = tokio::spawn(async move { fetcher.fetch_lyrics(&item).await });
        let outcome = match fetch.await {
            Ok(lyrics) => LoadOutcome::Fetched(lyrics),
            Err(err) => LoadOutcome::Crashed(err.to_string()),
        };
        // The session may be gone already
        let _ = tx.send(LoadResult {
            generation,
            outcome,
        });
    });
}
