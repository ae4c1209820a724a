//! The orchestrating context: one session, its timers, the passage loader
//! and the results reporter, driven by key events and clock ticks.

use std::sync::Arc;
use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_COUNTDOWN_SECS, DEFAULT_LEADERBOARD_SIZE, DEFAULT_PASSAGE_COUNT};
use crate::input::{apply_key, KeyDisposition};
use crate::passage::{LoadState, Passage, PassageError, PassageLoader, PassageRequest, PassageSource};
use crate::report::{Identity, ReportError, ReportOutcome, Reporter, StatRecord};
use crate::runtime::CountdownTimer;
use crate::session::{Clock, Phase, Session, SystemClock};
use crate::store::{HistoryEntry, HistorySort, LeaderboardEntry, PlayerSummary, SharedStatsDb};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Screen {
    #[default]
    Typing,
    Leaderboard,
    MyStats,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// A non-blocking message for the status line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warn,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppSettings {
    pub theme: String,
    pub countdown_secs: u32,
    pub passage_count: usize,
    pub leaderboard_size: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: crate::config::DEFAULT_THEME.to_string(),
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            passage_count: DEFAULT_PASSAGE_COUNT,
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
        }
    }
}

impl From<&Config> for AppSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            theme: cfg.theme.clone(),
            countdown_secs: cfg.countdown_secs,
            passage_count: cfg.passage_count,
            leaderboard_size: cfg.leaderboard_size,
        }
    }
}

pub struct App<C: Clock = SystemClock> {
    session: Session<C>,
    loader: PassageLoader,
    reporter: Reporter,
    countdown: CountdownTimer,
    identity: Identity,
    settings: AppSettings,
    stats: Option<SharedStatsDb>,
    passage: Option<Passage>,
    screen: Screen,
    notice: Option<Notice>,
    history_sort: HistorySort,
    leaderboard: Vec<LeaderboardEntry>,
    history: Vec<HistoryEntry>,
    summary: Option<PlayerSummary>,
    best_wpm: Option<u32>,
}

impl<C: Clock> std::fmt::Debug for App<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("phase", &self.session.phase())
            .field("screen", &self.screen)
            .field("passage", &self.passage.as_ref().map(|p| &p.id))
            .field("notice", &self.notice)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> App<C> {
    /// Build the app and kick off the first passage fetch.
    pub fn new(
        settings: AppSettings,
        source: Arc<dyn PassageSource>,
        reporter: Reporter,
        stats: Option<SharedStatsDb>,
        identity: Identity,
        clock: C,
    ) -> Self {
        let mut app = Self {
            session: Session::with_clock(clock),
            loader: PassageLoader::new(source),
            reporter,
            countdown: CountdownTimer::default(),
            identity,
            settings,
            stats,
            passage: None,
            screen: Screen::Typing,
            notice: None,
            history_sort: HistorySort::default(),
            leaderboard: Vec::new(),
            history: Vec::new(),
            summary: None,
            best_wpm: None,
        };
        app.refresh_best();
        app.request_passage();
        app
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn passage(&self) -> Option<&Passage> {
        self.passage.as_ref()
    }

    pub fn load_state(&self) -> &LoadState {
        self.loader.state()
    }

    pub fn passage_error(&self) -> Option<&PassageError> {
        match self.loader.state() {
            LoadState::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.passage.is_some() && self.session.has_text()
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn countdown_armed(&self) -> bool {
        self.countdown.is_armed()
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn history_sort(&self) -> HistorySort {
        self.history_sort
    }

    pub fn summary(&self) -> Option<&PlayerSummary> {
        self.summary.as_ref()
    }

    pub fn best_wpm(&self) -> Option<u32> {
        self.best_wpm
    }

    /// Drop the current attempt and fetch a fresh passage.
    pub fn request_passage(&mut self) {
        self.countdown.cancel();
        self.session.restart();
        // no stale text while the new fetch is in flight or after it fails
        self.session.seed_text("");
        self.passage = None;
        self.notice = None;
        let request = PassageRequest::new(self.settings.theme.clone(), self.settings.passage_count);
        self.loader.request(request);
    }

    pub fn new_passage(&mut self) {
        self.request_passage();
    }

    /// Begin the countdown on the loaded passage. Returns whether it started.
    pub fn start(&mut self, now: Instant) -> bool {
        if !self.is_ready() || self.loader.is_loading() {
            debug!(target: "app", "start ignored: passage not ready");
            return false;
        }
        match self.session.phase() {
            Phase::Idle => {}
            Phase::Finished => self.session.restart(),
            Phase::Countdown | Phase::Running => return false,
        }
        self.countdown.cancel();
        self.session.begin_countdown(self.settings.countdown_secs);
        if self.session.phase() != Phase::Countdown {
            return false;
        }
        self.countdown.arm(now);
        self.notice = None;
        true
    }

    /// Back to Idle on the same passage.
    pub fn restart(&mut self) {
        self.countdown.cancel();
        self.session.restart();
        self.notice = None;
    }

    /// Restart and immediately count down again on the same passage.
    pub fn retry(&mut self, now: Instant) -> bool {
        self.restart();
        self.start(now)
    }

    /// Advance timers. Safe to call at any cadence.
    pub fn on_tick(&mut self, now: Instant) {
        if !self.countdown.poll(now) {
            return;
        }
        // a fire that outlived its phase does nothing
        if self.session.phase() != Phase::Countdown {
            return;
        }
        self.session.tick_countdown();
        if self.session.phase() == Phase::Countdown {
            self.countdown.arm(now);
        }
    }

    /// Collect finished passage fetches and report outcomes.
    pub fn poll_background(&mut self) {
        if let Some(result) = self.loader.poll() {
            self.accept_passage(result);
        }
        while let Some(outcome) = self.reporter.poll() {
            self.accept_report(outcome);
        }
    }

    /// Block up to `timeout` for the pending passage fetch.
    pub fn wait_for_passage(&mut self, timeout: std::time::Duration) -> bool {
        match self.loader.wait(timeout) {
            Some(result) => {
                self.accept_passage(result);
                self.is_ready()
            }
            None => false,
        }
    }

    /// Block up to `timeout` for the next report outcome.
    pub fn wait_for_report(&mut self, timeout: std::time::Duration) -> Option<ReportOutcome> {
        let outcome = self.reporter.wait(timeout)?;
        self.accept_report(outcome.clone());
        Some(outcome)
    }

    pub fn on_key(&mut self, key: KeyEvent, now: Instant) -> Control {
        if key.kind == KeyEventKind::Release {
            return Control::Continue;
        }
        if key.code == KeyCode::Esc
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        {
            return Control::Quit;
        }

        match self.screen {
            Screen::Typing => self.on_typing_key(key, now),
            Screen::Leaderboard => self.on_leaderboard_key(key),
            Screen::MyStats => self.on_my_stats_key(key),
        }
        Control::Continue
    }

    fn on_typing_key(&mut self, key: KeyEvent, now: Instant) {
        if key.code == KeyCode::Tab {
            self.restart();
            return;
        }

        let before = self.session.phase();
        let disposition = apply_key(&mut self.session, &key);
        if before == Phase::Running && self.session.phase() == Phase::Finished {
            self.on_finished();
        }
        if disposition != KeyDisposition::Ignored || before == Phase::Running {
            return;
        }

        match key.code {
            KeyCode::Enter => {
                self.start(now);
            }
            KeyCode::Char('r') => {
                self.retry(now);
            }
            KeyCode::Char('n') => self.new_passage(),
            KeyCode::Char('l') => self.show_leaderboard(),
            KeyCode::Char('m') => self.show_my_stats(),
            _ => {}
        }
    }

    fn on_leaderboard_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('b') | KeyCode::Backspace => self.screen = Screen::Typing,
            KeyCode::Char('m') => self.show_my_stats(),
            KeyCode::Char('r') => self.refresh_leaderboard(),
            _ => {}
        }
    }

    fn on_my_stats_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('b') | KeyCode::Backspace => self.screen = Screen::Typing,
            KeyCode::Char('l') => self.show_leaderboard(),
            KeyCode::Char('s') => {
                self.history_sort = self.history_sort.toggled();
                self.refresh_my_stats();
            }
            _ => {}
        }
    }

    pub fn show_leaderboard(&mut self) {
        if matches!(self.session.phase(), Phase::Countdown | Phase::Running) {
            return;
        }
        self.refresh_leaderboard();
        self.screen = Screen::Leaderboard;
    }

    pub fn show_my_stats(&mut self) {
        if matches!(self.session.phase(), Phase::Countdown | Phase::Running) {
            return;
        }
        self.refresh_my_stats();
        self.screen = Screen::MyStats;
    }

    fn refresh_leaderboard(&mut self) {
        let Some(stats) = &self.stats else {
            self.leaderboard.clear();
            return;
        };
        let result = match stats.lock() {
            Ok(db) => db.fetch_leaderboard(self.settings.leaderboard_size),
            Err(_) => Err(crate::store::StoreError::LockPoisoned),
        };
        match result {
            Ok(rows) => self.leaderboard = rows,
            Err(e) => {
                warn!(target: "app", error = %e, "leaderboard unavailable");
                self.notice = Some(Notice::error(format!("leaderboard unavailable: {e}")));
            }
        }
    }

    fn refresh_my_stats(&mut self) {
        self.history.clear();
        self.summary = None;
        let (Some(stats), Some(player)) = (&self.stats, self.identity.display_name()) else {
            return;
        };
        let result = match stats.lock() {
            Ok(db) => db
                .player_history(player, self.history_sort)
                .and_then(|history| Ok((history, db.player_summary(player)?))),
            Err(_) => Err(crate::store::StoreError::LockPoisoned),
        };
        match result {
            Ok((history, summary)) => {
                self.history = history;
                self.summary = summary;
            }
            Err(e) => {
                warn!(target: "app", error = %e, "player stats unavailable");
                self.notice = Some(Notice::error(format!("stats unavailable: {e}")));
            }
        }
    }

    fn refresh_best(&mut self) {
        let (Some(stats), Some(player)) = (&self.stats, self.identity.display_name()) else {
            return;
        };
        if let Ok(db) = stats.lock() {
            self.best_wpm = db.best_wpm(player).ok().flatten();
        }
    }

    fn accept_passage(&mut self, result: Result<Passage, PassageError>) {
        match result {
            Ok(passage) => {
                if self.session.seed_text(&passage.body) {
                    self.passage = Some(passage);
                } else {
                    warn!(target: "app", id = %passage.id, "passage arrived mid-attempt; ignored");
                }
            }
            Err(e) => {
                self.passage = None;
                self.notice = Some(Notice::error(format!("{e}; press (n) to retry")));
            }
        }
    }

    fn on_finished(&mut self) {
        self.countdown.cancel();
        let passage_id = self
            .passage
            .as_ref()
            .map_or_else(|| crate::passage::CUSTOM_THEME.to_string(), |p| p.id.clone());

        match StatRecord::from_session(&self.session, &passage_id, &self.identity) {
            Ok(record) => {
                self.notice = Some(if self.reporter.report(record) {
                    Notice::info("submitting result...")
                } else {
                    Notice::warn("result not saved: reporter stopped")
                });
            }
            Err(ReportError::NotLoggedIn) => {
                info!(target: "app", "anonymous session finished; result not submitted");
                self.notice = Some(Notice::info("playing as guest; set --name to join the leaderboard"));
            }
            Err(e) => warn!(target: "app", error = %e, "could not build stat record"),
        }
    }

    fn accept_report(&mut self, outcome: ReportOutcome) {
        self.notice = Some(match &outcome.result {
            Ok(()) => {
                if self.best_wpm.map_or(true, |best| outcome.wpm > best) {
                    self.best_wpm = Some(outcome.wpm);
                }
                Notice::info(format!("result saved ({} wpm)", outcome.wpm))
            }
            Err(e) => Notice::warn(format!("result not saved: {e}")),
        });
        match self.screen {
            Screen::Leaderboard => self.refresh_leaderboard(),
            Screen::MyStats => self.refresh_my_stats(),
            Screen::Typing => {}
        }
    }
}
