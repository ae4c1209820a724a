use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::report::{ReportError, StatRecord, StatSink};
use crate::util::{mean, std_dev};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create stats directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("stats database lock poisoned")]
    LockPoisoned,
}

/// One row of the public leaderboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub player_name: String,
    pub wpm: u32,
    pub completed_at_iso: String,
    pub passage_id: String,
}

/// One of the player's own results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub passage_id: String,
    pub wpm: u32,
    pub accuracy: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::Display)]
pub enum HistorySort {
    #[default]
    Date,
    Wpm,
}

impl HistorySort {
    pub fn toggled(self) -> Self {
        match self {
            HistorySort::Date => HistorySort::Wpm,
            HistorySort::Wpm => HistorySort::Date,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerSummary {
    pub tests: usize,
    pub best_wpm: u32,
    pub mean_wpm: f64,
    pub wpm_std_dev: f64,
    pub mean_accuracy: f64,
}

/// Local results database.
#[derive(Debug)]
pub struct StatsDb {
    conn: Connection,
}

/// Handle shared between the reporter worker and the screens that read.
pub type SharedStatsDb = Arc<Mutex<StatsDb>>;

impl StatsDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    pub fn shared(self) -> SharedStatsDb {
        Arc::new(Mutex::new(self))
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player TEXT NOT NULL,
                passage_id TEXT NOT NULL,
                wpm INTEGER NOT NULL,
                accuracy INTEGER NOT NULL,
                completed_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_stats_unique
                ON stats(player, passage_id, completed_at);
            CREATE INDEX IF NOT EXISTS idx_stats_wpm ON stats(wpm);
            CREATE INDEX IF NOT EXISTS idx_stats_player ON stats(player);
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Store a result. Re-submitting the same record is a no-op; returns
    /// whether a row was written.
    pub fn insert_stat(&self, record: &StatRecord) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO stats (player, passage_id, wpm, accuracy, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.player,
                record.passage_id,
                record.wpm,
                record.accuracy,
                record.completed_at_iso(),
            ],
        )?;
        debug!(target: "store", passage_id = %record.passage_id, changed, "stat stored");
        Ok(changed > 0)
    }

    /// Best results first; ties go to whoever got there earlier.
    pub fn fetch_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT player, wpm, completed_at, passage_id
            FROM stats
            ORDER BY wpm DESC, completed_at ASC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(LeaderboardEntry {
                player_name: row.get(0)?,
                wpm: row.get(1)?,
                completed_at_iso: row.get(2)?,
                passage_id: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn player_history(
        &self,
        player: &str,
        sort: HistorySort,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let order = match sort {
            HistorySort::Date => "completed_at DESC",
            HistorySort::Wpm => "wpm DESC, completed_at DESC",
        };
        let sql = format!(
            "SELECT passage_id, wpm, accuracy, completed_at FROM stats WHERE player = ?1 ORDER BY {order}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([player], |row| {
            let completed_at: String = row.get(3)?;
            let completed_at = DateTime::parse_from_rfc3339(&completed_at)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?
                .with_timezone(&Utc);
            Ok(HistoryEntry {
                passage_id: row.get(0)?,
                wpm: row.get(1)?,
                accuracy: row.get(2)?,
                completed_at,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn player_summary(&self, player: &str) -> Result<Option<PlayerSummary>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT wpm, accuracy FROM stats WHERE player = ?1")?;
        let rows = stmt
            .query_map([player], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }
        let wpms: Vec<f64> = rows.iter().map(|(w, _)| f64::from(*w)).collect();
        let accuracies: Vec<f64> = rows.iter().map(|(_, a)| f64::from(*a)).collect();

        Ok(Some(PlayerSummary {
            tests: rows.len(),
            best_wpm: rows.iter().map(|(w, _)| *w).max().unwrap_or(0),
            mean_wpm: mean(&wpms).unwrap_or(0.0),
            wpm_std_dev: std_dev(&wpms).unwrap_or(0.0),
            mean_accuracy: mean(&accuracies).unwrap_or(0.0),
        }))
    }

    pub fn best_wpm(&self, player: &str) -> Result<Option<u32>, StoreError> {
        let best = self
            .conn
            .query_row(
                "SELECT MAX(wpm) FROM stats WHERE player = ?1",
                [player],
                |row| row.get::<_, Option<u32>>(0),
            )
            .optional()?
            .flatten();
        Ok(best)
    }
}

impl StatSink for StatsDb {
    fn submit_stat(&mut self, record: &StatRecord) -> Result<(), ReportError> {
        self.insert_stat(record)
            .map(|_| ())
            .map_err(|e| ReportError::Storage(e.to_string()))
    }
}

impl StatSink for SharedStatsDb {
    fn submit_stat(&mut self, record: &StatRecord) -> Result<(), ReportError> {
        let mut db = self
            .lock()
            .map_err(|_| ReportError::Storage(StoreError::LockPoisoned.to_string()))?;
        db.submit_stat(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn rec(player: &str, passage: &str, wpm: u32, secs: i64) -> StatRecord {
        StatRecord {
            passage_id: passage.to_string(),
            player: player.to_string(),
            wpm,
            accuracy: 90,
            completed_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn leaderboard_orders_by_wpm_then_time() {
        let db = StatsDb::open_in_memory().unwrap();
        db.insert_stat(&rec("ada", "p1", 80, 10)).unwrap();
        db.insert_stat(&rec("bob", "p1", 95, 20)).unwrap();
        db.insert_stat(&rec("cy", "p2", 80, 5)).unwrap();

        let board = db.fetch_leaderboard(10).unwrap();
        let names: Vec<&str> = board.iter().map(|e| e.player_name.as_str()).collect();
        assert_eq!(names, vec!["bob", "cy", "ada"]);
        assert_eq!(board[0].wpm, 95);
        assert!(board[0].completed_at_iso.starts_with("2023-11-14T22:13:40"));
    }

    #[test]
    fn leaderboard_respects_limit() {
        let db = StatsDb::open_in_memory().unwrap();
        for i in 0..5 {
            db.insert_stat(&rec("ada", "p", 50 + i, i64::from(i))).unwrap();
        }
        assert_eq!(db.fetch_leaderboard(3).unwrap().len(), 3);
    }

    #[test]
    fn duplicate_submission_is_ignored() {
        let db = StatsDb::open_in_memory().unwrap();
        let r = rec("ada", "p1", 70, 0);
        assert!(db.insert_stat(&r).unwrap());
        assert!(!db.insert_stat(&r).unwrap());
        assert_eq!(db.fetch_leaderboard(10).unwrap().len(), 1);
    }

    #[test]
    fn history_sorting() {
        let db = StatsDb::open_in_memory().unwrap();
        db.insert_stat(&rec("ada", "old", 90, 0)).unwrap();
        db.insert_stat(&rec("ada", "new", 60, 100)).unwrap();
        db.insert_stat(&rec("bob", "other", 99, 50)).unwrap();

        let by_date = db.player_history("ada", HistorySort::Date).unwrap();
        assert_eq!(by_date.len(), 2);
        assert_eq!(by_date[0].passage_id, "new");

        let by_wpm = db.player_history("ada", HistorySort::Wpm).unwrap();
        assert_eq!(by_wpm[0].passage_id, "old");
        assert_eq!(by_wpm[0].completed_at, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    }

    #[test]
    fn summary_for_player() {
        let db = StatsDb::open_in_memory().unwrap();
        assert!(db.player_summary("ada").unwrap().is_none());
        assert_eq!(db.best_wpm("ada").unwrap(), None);

        db.insert_stat(&rec("ada", "a", 60, 0)).unwrap();
        db.insert_stat(&rec("ada", "b", 80, 1)).unwrap();

        let s = db.player_summary("ada").unwrap().unwrap();
        assert_eq!(s.tests, 2);
        assert_eq!(s.best_wpm, 80);
        assert_eq!(s.mean_wpm, 70.0);
        assert_eq!(s.wpm_std_dev, 10.0);
        assert_eq!(s.mean_accuracy, 90.0);
        assert_eq!(db.best_wpm("ada").unwrap(), Some(80));
    }

    #[test]
    fn shared_db_is_a_sink() {
        let mut shared = StatsDb::open_in_memory().unwrap().shared();
        shared.submit_stat(&rec("ada", "p", 40, 0)).unwrap();
        let board = shared.lock().unwrap().fetch_leaderboard(5).unwrap();
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.db");
        let db = StatsDb::open(&path).unwrap();
        db.insert_stat(&rec("ada", "p", 40, 0)).unwrap();
        assert!(path.exists());
    }
}
