//! Handing finished results to the stats store without blocking the session.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::session::{Clock, Phase, Session};

/// Pause before the first retry; doubles for each further attempt.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("stats storage failed: {0}")]
    Storage(String),
    #[error("stats reporter is not running")]
    Disconnected,
    #[error("not signed in; results are not submitted")]
    NotLoggedIn,
    #[error("session has not finished")]
    NotFinished,
}

/// Who is typing. Anonymous players can type but do not submit results.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    display_name: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        Self {
            display_name: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.display_name.is_some()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

/// Outcome of one finished attempt, as submitted to the stats store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatRecord {
    pub passage_id: String,
    pub player: String,
    pub wpm: u32,
    pub accuracy: u32,
    pub completed_at: DateTime<Utc>,
}

impl StatRecord {
    pub fn from_session<C: Clock>(
        session: &Session<C>,
        passage_id: &str,
        identity: &Identity,
    ) -> Result<Self, ReportError> {
        let player = identity.display_name().ok_or(ReportError::NotLoggedIn)?;
        let (Phase::Finished, Some(metrics), Some(finished_at)) =
            (session.phase(), session.result(), session.finished_at())
        else {
            return Err(ReportError::NotFinished);
        };

        Ok(Self {
            passage_id: passage_id.to_string(),
            player: player.to_string(),
            wpm: metrics.wpm,
            accuracy: metrics.accuracy,
            completed_at: DateTime::<Utc>::from(finished_at),
        })
    }

    pub fn completed_at_iso(&self) -> String {
        self.completed_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn completed_at_system(&self) -> SystemTime {
        self.completed_at.into()
    }
}

/// Destination for finished results. Receiving the same record twice
/// must be harmless.
pub trait StatSink: Send {
    fn submit_stat(&mut self, record: &StatRecord) -> Result<(), ReportError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportOutcome {
    pub passage_id: String,
    pub wpm: u32,
    pub attempts: u32,
    pub result: Result<(), ReportError>,
}

/// Fire-and-forget delivery of stat records on a worker thread.
#[derive(Debug)]
pub struct Reporter {
    tx: Option<Sender<StatRecord>>,
    outcomes: Receiver<ReportOutcome>,
    worker: Option<JoinHandle<()>>,
}

impl Reporter {
    /// Start a worker that tries each record `1 + retries` times.
    pub fn spawn<S: StatSink + 'static>(sink: S, retries: u32) -> Self {
        Self::with_backoff(sink, retries, RETRY_BACKOFF)
    }

    /// Like [`Reporter::spawn`], sleeping `backoff`, then twice that, and
    /// so on between attempts.
    pub fn with_backoff<S: StatSink + 'static>(mut sink: S, retries: u32, backoff: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<StatRecord>();
        let (outcome_tx, outcomes) = mpsc::channel();

        let worker = std::thread::spawn(move || {
            for record in rx {
                let outcome = deliver(&mut sink, &record, retries, backoff);
                if outcome_tx.send(outcome).is_err() {
                    break;
                }
            }
        });

        Self {
            tx: Some(tx),
            outcomes,
            worker: Some(worker),
        }
    }

    /// Queue a record. Never blocks; returns false when the worker is gone
    /// and the record was dropped.
    pub fn report(&self, record: StatRecord) -> bool {
        let passage_id = record.passage_id.clone();
        let sent = self.tx.as_ref().is_some_and(|tx| tx.send(record).is_ok());
        if !sent {
            warn!(target: "report", %passage_id, error = %ReportError::Disconnected, "stat dropped");
        }
        sent
    }

    pub fn poll(&self) -> Option<ReportOutcome> {
        self.outcomes.try_recv().ok()
    }

    pub fn wait(&self, timeout: Duration) -> Option<ReportOutcome> {
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        // closing the channel ends the worker loop once the queue drains
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn deliver<S: StatSink>(
    sink: &mut S,
    record: &StatRecord,
    retries: u32,
    backoff: Duration,
) -> ReportOutcome {
    let max_attempts = retries.saturating_add(1);
    let mut attempts = 0;
    let mut result = Err(ReportError::Disconnected);
    let mut delay = backoff;

    while attempts < max_attempts {
        if attempts > 0 {
            std::thread::sleep(delay);
            delay = delay.saturating_mul(2);
        }
        attempts += 1;
        result = sink.submit_stat(record);
        match &result {
            Ok(()) => {
                info!(
                    target: "report",
                    passage_id = %record.passage_id,
                    wpm = record.wpm,
                    attempts,
                    "stat submitted"
                );
                break;
            }
            Err(e) => warn!(
                target: "report",
                passage_id = %record.passage_id,
                attempt = attempts,
                max_attempts,
                error = %e,
                "stat submission failed"
            ),
        }
    }

    ReportOutcome {
        passage_id: record.passage_id.clone(),
        wpm: record.wpm,
        attempts,
        result,
    }
}
