use chrono::{DateTime, Local, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};

use keysprint::{
    app::{App, NoticeLevel},
    session::Clock,
    store::{HistoryEntry, HistorySort, LeaderboardEntry, PlayerSummary},
};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

fn local_date(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(DATE_FORMAT).to_string()
}

fn local_date_iso(iso: &str) -> String {
    DateTime::parse_from_rfc3339(iso)
        .map(|at| local_date(&at.with_timezone(&Utc)))
        .unwrap_or_else(|_| iso.to_string())
}

fn wpm_color(wpm: u32) -> Color {
    if wpm >= 80 {
        Color::Green
    } else if wpm >= 40 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn header_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

fn title(text: String, block_title: &str) -> Paragraph<'static> {
    Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(block_title.to_string()))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center)
}

fn row_style(entry: &LeaderboardEntry, highlight: Option<&str>) -> Style {
    if highlight == Some(entry.player_name.as_str()) {
        Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED)
    } else {
        Style::default()
    }
}

/// Pure presenter for a single leaderboard row; `rank` is 1-based.
pub fn leaderboard_row(rank: usize, entry: &LeaderboardEntry, highlight: Option<&str>) -> Row<'static> {
    Row::new(vec![
        Cell::from(format!("{rank}.")),
        Cell::from(entry.player_name.clone()),
        Cell::from(entry.wpm.to_string()).style(Style::default().fg(wpm_color(entry.wpm))),
        Cell::from(local_date_iso(&entry.completed_at_iso)),
        Cell::from(entry.passage_id.clone()),
    ])
    .style(row_style(entry, highlight))
}

/// Pure presenter for a single history row
pub fn history_row(entry: &HistoryEntry) -> Row<'static> {
    Row::new(vec![
        Cell::from(local_date(&entry.completed_at)),
        Cell::from(entry.wpm.to_string()).style(Style::default().fg(wpm_color(entry.wpm))),
        Cell::from(format!("{}%", entry.accuracy)),
        Cell::from(entry.passage_id.clone()),
    ])
}

pub fn summary_line(summary: &PlayerSummary) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{} tests", summary.tests), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            "   best {} wpm   mean {:.1} ± {:.1} wpm   accuracy {:.1}%",
            summary.best_wpm, summary.mean_wpm, summary.wpm_std_dev, summary.mean_accuracy
        )),
    ])
}

fn render_notice<C: Clock>(app: &App<C>, f: &mut Frame, area: Rect) {
    let Some(notice) = app.notice() else {
        return;
    };
    let color = match notice.level {
        NoticeLevel::Info => Color::Cyan,
        NoticeLevel::Warn => Color::Yellow,
        NoticeLevel::Error => Color::Red,
    };
    f.render_widget(
        Paragraph::new(Span::styled(notice.message.clone(), Style::default().fg(color)))
            .alignment(Alignment::Center),
        area,
    );
}

fn render_instructions(f: &mut Frame, area: Rect, text: &str) {
    f.render_widget(
        Paragraph::new(text.to_string())
            .block(Block::default().borders(Borders::ALL))
            .style(Style::default().add_modifier(Modifier::ITALIC))
            .alignment(Alignment::Center),
        area,
    );
}

fn screen_chunks(area: Rect) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(0),    // Table
            Constraint::Length(1), // Notice
            Constraint::Length(3), // Instructions
        ])
        .split(area)
}

/// Render the top scores across all players
pub fn render_leaderboard<C: Clock>(app: &App<C>, f: &mut Frame) {
    let chunks = screen_chunks(f.area());
    f.render_widget(
        title(
            format!("Top {} scores", app.settings().leaderboard_size),
            "Leaderboard",
        ),
        chunks[0],
    );

    if app.leaderboard().is_empty() {
        f.render_widget(
            Paragraph::new("No results yet. Finish a test with --name set to get on the board.")
                .block(Block::default().borders(Borders::ALL))
                .alignment(Alignment::Center),
            chunks[1],
        );
    } else {
        let me = app.identity().display_name();
        let rows: Vec<Row> = app
            .leaderboard()
            .iter()
            .enumerate()
            .map(|(i, entry)| leaderboard_row(i + 1, entry, me))
            .collect();
        let header = Row::new(vec!["#", "Player", "WPM", "Date", "Passage"]).style(header_style());
        let table = Table::new(
            rows,
            [
                Constraint::Length(4),
                Constraint::Min(12),
                Constraint::Length(5),
                Constraint::Length(17),
                Constraint::Min(12),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(table, chunks[1]);
    }

    render_notice(app, f, chunks[2]);
    render_instructions(f, chunks[3], "(r)efresh / (m)y stats / (b)ack / (esc) quit");
}

/// Render the current player's history and summary
pub fn render_my_stats<C: Clock>(app: &App<C>, f: &mut Frame) {
    let chunks = screen_chunks(f.area());
    let sort = match app.history_sort() {
        HistorySort::Date => "date",
        HistorySort::Wpm => "wpm",
    };
    let name = app.identity().display_name().unwrap_or("guest");
    f.render_widget(
        title(format!("{name} (sort: {sort})"), "My stats"),
        chunks[0],
    );

    let body = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[1]);

    match app.summary() {
        Some(summary) => f.render_widget(
            Paragraph::new(summary_line(summary)).alignment(Alignment::Center),
            body[0],
        ),
        None => f.render_widget(
            Paragraph::new(if app.identity().is_logged_in() {
                "No finished tests yet."
            } else {
                "Playing as guest; set --name to keep stats."
            })
            .alignment(Alignment::Center),
            body[0],
        ),
    }

    if !app.history().is_empty() {
        let table_height = body[1].height.saturating_sub(3) as usize;
        let rows: Vec<Row> = app
            .history()
            .iter()
            .take(table_height)
            .map(history_row)
            .collect();
        let header = Row::new(vec!["Date", "WPM", "Accuracy", "Passage"]).style(header_style());
        let table = Table::new(
            rows,
            [
                Constraint::Length(17),
                Constraint::Length(5),
                Constraint::Length(9),
                Constraint::Min(12),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(table, body[1]);
    }

    render_notice(app, f, chunks[2]);
    render_instructions(f, chunks[3], "(s)ort / (l)eaderboard / (b)ack / (esc) quit");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, wpm: u32) -> LeaderboardEntry {
        LeaderboardEntry {
            player_name: name.to_string(),
            wpm,
            completed_at_iso: "2024-03-01T10:00:00.000Z".to_string(),
            passage_id: "novel-austen-001".to_string(),
        }
    }

    #[test]
    fn leaderboard_row_highlights_current_player() {
        let mine = row_style(&entry("ada", 90), Some("ada"));
        let theirs = row_style(&entry("bob", 30), Some("ada"));
        let guest = row_style(&entry("ada", 90), None);
        assert!(mine.add_modifier.contains(Modifier::REVERSED));
        assert!(!theirs.add_modifier.contains(Modifier::REVERSED));
        assert_eq!(guest, Style::default());
    }

    #[test]
    fn unparseable_date_is_shown_raw() {
        assert_eq!(local_date_iso("yesterday"), "yesterday");
        assert_ne!(local_date_iso("2024-03-01T10:00:00.000Z"), "2024-03-01T10:00:00.000Z");
    }

    #[test]
    fn wpm_colors_by_band() {
        assert_eq!(wpm_color(100), Color::Green);
        assert_eq!(wpm_color(40), Color::Yellow);
        assert_eq!(wpm_color(12), Color::Red);
    }

    #[test]
    fn summary_line_mentions_best() {
        let line = summary_line(&PlayerSummary {
            tests: 3,
            best_wpm: 72,
            mean_wpm: 60.0,
            wpm_std_dev: 8.5,
            mean_accuracy: 97.25,
        });
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(text.contains("3 tests"));
        assert!(text.contains("best 72 wpm"));
        assert!(text.contains("8.5"));
    }
}
