use std::{fs::File, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::{Env, Target};
use log::info;
use lyricview::{
    annotate::Annotator,
    config::{config_dir, LyricviewConfig},
    event::{LeaveReason, NowPlayingItem},
    lyrics::{FileLyrics, LyricFetcher},
    player::{ClockPlayer, PlaybackManager, RemotePlayer, SinglePlayer},
    script::classify,
    server::MediaServer,
    session::{LyricsSession, Navigator},
    tui::{spawn_input_reader, TerminalView},
};

#[derive(Parser)]
#[command(version, about = "Synced lyrics with readings for Chinese, Japanese and Korean lines")]
struct Cli {
    /// Config file to use instead of ~/.config/lyricview/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the playing session of the media server
    Watch {
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        /// Only follow sessions of this device
        #[arg(long)]
        device: Option<String>,
    },
    /// Play a local lyric file against a simulated clock
    Play {
        file: PathBuf,
        /// Track length in seconds
        #[arg(long, default_value_t = 240)]
        duration: u64,
    },
    /// Print the script and ruby markup of a line
    Annotate { text: String },
}

/// Records why the view closed, the terminal is gone by then.
struct LogNavigator;

impl Navigator for LogNavigator {
    fn leave(&mut self, reason: LeaveReason) {
        info!("Navigating away from lyrics: {reason:?}");
    }
}

fn init_logging() -> anyhow::Result<()> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)?;
    let file = File::create(dir.join("lyricview.log"))
        .with_context(|| format!("Failed to create log file in {}", dir.display()))?;
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn annotator(config: &LyricviewConfig) -> Annotator {
    Annotator::default()
        .enabled(config.general.romanize)
        .excluding(config.general.romanize_exclude.iter().copied())
}

async fn run_view(
    config: Arc<LyricviewConfig>,
    playback: Arc<dyn PlaybackManager>,
    fetcher: Arc<dyn LyricFetcher>,
) -> anyhow::Result<LeaveReason> {
    let view = TerminalView::open(Arc::clone(&config))?;
    let (input_tx, input_rx) = flume::unbounded();
    spawn_input_reader(input_tx);

    LyricsSession::new(playback, fetcher, annotator(&config), view, LogNavigator)
        .ticks_per_millisecond(config.general.ticks_per_millisecond)
        .run(input_rx)
        .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging()?;
    let mut config = LyricviewConfig::load(cli.config.as_deref()).await?;

    let reason = match cli.command {
        Command::Annotate { text } => {
            let category = classify(&text);
            println!("{category:?}");
            println!("{}", annotator(&config).annotate(&text, category).to_html());
            return Ok(());
        }
        Command::Watch {
            server,
            api_key,
            device,
        } => {
            if let Some(url) = server {
                config.server.url = url;
            }
            if let Some(api_key) = api_key {
                config.server.api_key = api_key;
            }
            if device.is_some() {
                config.server.device_name = device;
            }
            let config = Arc::new(config);

            let server = MediaServer::new(&config.server);
            let player = RemotePlayer::new(
                server.clone(),
                config.server.device_name.clone(),
                config.general.ticks_per_millisecond,
            );
            player
                .poll()
                .await
                .with_context(|| format!("Could not reach {}", config.server.url))?;
            player.spawn(Duration::from_millis(config.general.poll_interval_ms));

            run_view(
                Arc::clone(&config),
                Arc::new(SinglePlayer::new(player)),
                Arc::new(server),
            )
            .await?
        }
        Command::Play { file, duration } => {
            let stem = file
                .file_stem()
                .and_then(|it| it.to_str())
                .with_context(|| format!("Not a lyric file: {}", file.display()))?;
            let dir = file
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let config = Arc::new(config);
            let ticks_per_millisecond = config.general.ticks_per_millisecond;

            let duration = Duration::from_secs(duration);
            let item = NowPlayingItem {
                name: stem.to_owned(),
                run_time_ticks: Some(duration.as_millis() as i64 * ticks_per_millisecond),
                ..NowPlayingItem::new(stem)
            };
            let player = ClockPlayer::new(item, duration, ticks_per_millisecond);
            player.spawn(Duration::from_millis(config.general.poll_interval_ms));

            run_view(
                Arc::clone(&config),
                Arc::new(SinglePlayer::new(player)),
                Arc::new(FileLyrics::new(dir)),
            )
            .await?
        }
    };

    match reason {
        LeaveReason::NoPlayer => println!("Nothing is playing."),
        LeaveReason::LoadFailed => println!("Could not load lyrics, see the log for details."),
        LeaveReason::PlaybackEnded | LeaveReason::UserQuit => {}
    }
    Ok(())
}
