mod ui;

use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use keysprint::{
    app::{App, AppSettings, Control},
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    passage::{BundledPassages, CustomPassage, FilePassages, PassageSource},
    report::{Identity, ReportError, Reporter, StatRecord, StatSink},
    runtime::{AppEvent, CrosstermEventSource, EventSource, FixedTicker, Runner, Ticker},
    session::Clock,
    store::{SharedStatsDb, StatsDb},
};

const LOG_FILE: &str = "keysprint.log";

/// timed typing test on themed passages, with a local leaderboard
#[derive(Parser, Debug, Clone, Default)]
#[clap(version, about)]
pub struct Cli {
    /// passage theme to draw from (see --list-themes)
    #[clap(short = 't', long)]
    theme: Option<String>,

    /// countdown length in seconds before typing starts
    #[clap(short = 'c', long)]
    countdown: Option<u32>,

    /// player name for saved results; omit to play as guest
    #[clap(short = 'n', long, env = "KEYSPRINT_NAME")]
    name: Option<String>,

    /// custom text to type instead of a stored passage
    #[clap(short = 'p', long)]
    prompt: Option<String>,

    /// JSON file of passages to use instead of the bundled ones
    #[clap(long)]
    passages: Option<PathBuf>,

    /// stats database file
    #[clap(long)]
    db: Option<PathBuf>,

    /// extra attempts when saving a result fails
    #[clap(long)]
    retries: Option<u32>,

    /// number of rows on the leaderboard
    #[clap(long)]
    leaderboard_size: Option<usize>,

    /// log filter, overridden by RUST_LOG
    #[clap(long)]
    log_level: Option<String>,

    /// write the merged settings back to the config file
    #[clap(long)]
    save_config: bool,

    /// print the available themes and exit
    #[clap(long)]
    list_themes: bool,
}

impl Cli {
    /// Overlay the flags that were given on top of stored settings.
    fn merge_into(&self, mut cfg: Config) -> Config {
        if let Some(theme) = &self.theme {
            cfg.theme = theme.clone();
        }
        if let Some(secs) = self.countdown {
            cfg.countdown_secs = secs;
        }
        if let Some(name) = &self.name {
            cfg.player_name = Some(name.clone());
        }
        if let Some(path) = &self.passages {
            cfg.passages_file = Some(path.clone());
        }
        if let Some(path) = &self.db {
            cfg.db_path = Some(path.clone());
        }
        if let Some(retries) = self.retries {
            cfg.report_retries = retries;
        }
        if let Some(size) = self.leaderboard_size {
            cfg.leaderboard_size = size;
        }
        if let Some(level) = &self.log_level {
            cfg.log_level = level.clone();
        }
        cfg
    }

    fn passage_source(&self, cfg: &Config) -> Arc<dyn PassageSource> {
        if let Some(prompt) = &self.prompt {
            Arc::new(CustomPassage::new(prompt.clone()))
        } else if let Some(path) = &cfg.passages_file {
            Arc::new(FilePassages::new(path))
        } else {
            Arc::new(BundledPassages)
        }
    }
}

fn identity(cfg: &Config) -> Identity {
    cfg.player_name
        .as_deref()
        .map(Identity::named)
        .unwrap_or_default()
}

/// Stand-in sink when the stats database could not be opened.
struct UnavailableSink;

impl StatSink for UnavailableSink {
    fn submit_stat(&mut self, _record: &StatRecord) -> Result<(), ReportError> {
        Err(ReportError::Storage("stats database unavailable".to_string()))
    }
}

fn open_stats(cfg: &Config) -> Option<SharedStatsDb> {
    let path = cfg.db_path();
    match StatsDb::open(&path) {
        Ok(db) => Some(db.shared()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "stats database unavailable");
            None
        }
    }
}

fn configure_logging(level: &str) -> Option<WorkerGuard> {
    let log_dir = AppDirs::log_dir();
    std::fs::create_dir_all(&log_dir).ok()?;

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(nb_writer)
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(guard)
}

/// Leaves raw mode and the alternate screen when dropped.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let store = FileConfigStore::new();
    let cfg = cli.merge_into(store.load());
    let _log_guard = configure_logging(&cfg.log_level);

    if cli.save_config {
        store.save(&cfg)?;
        info!(path = %store.path().display(), "config saved");
    }

    let source = cli.passage_source(&cfg);
    if cli.list_themes {
        for theme in source.themes() {
            println!("{theme}");
        }
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let stats = open_stats(&cfg);
    let reporter = match &stats {
        Some(db) => Reporter::spawn(Arc::clone(db), cfg.report_retries),
        None => Reporter::spawn(UnavailableSink, 0),
    };
    let mut app = App::new(
        AppSettings::from(&cfg),
        source,
        reporter,
        stats,
        identity(&cfg),
        keysprint::session::SystemClock,
    );

    let guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::default());
    let result = run_tui(&mut terminal, &mut app, &runner);
    drop(guard);

    if let Err(e) = &result {
        error!(error = %e, "terminal loop failed");
    }
    result
}

fn run_tui<B: Backend, C: Clock, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App<C>,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    loop {
        app.poll_background();
        app.on_tick(Instant::now());
        terminal.draw(|f| ui::screen::draw(app, f))?;

        match runner.step() {
            AppEvent::Key(key) => {
                if app.on_key(key, Instant::now()) == Control::Quit {
                    break;
                }
            }
            AppEvent::Resize | AppEvent::Tick => {}
            AppEvent::Closed => {
                warn!("terminal input closed; exiting");
                break;
            }
        }
    }
    Ok(())
}
