pub mod screen;
pub mod tables;

use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use keysprint::{
    app::{App, NoticeLevel},
    metrics::{classify, live_wpm, CharState, RenderChar},
    passage::LoadState,
    session::{Clock, Phase},
};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim_bold() -> Style {
    bold().add_modifier(Modifier::DIM)
}

fn italic() -> Style {
    Style::default().add_modifier(Modifier::ITALIC)
}

fn char_style(c: &RenderChar) -> Style {
    let style = match c.state {
        CharState::Correct => bold().fg(Color::Green),
        CharState::Incorrect => bold().fg(Color::Red),
        CharState::Pending => dim_bold(),
    };
    if c.is_cursor {
        style.add_modifier(Modifier::UNDERLINED)
    } else {
        style
    }
}

fn display_char(c: &RenderChar) -> char {
    match (c.state, c.typed) {
        (CharState::Incorrect, Some(' ')) => '·',
        (CharState::Incorrect, Some(typed)) => typed,
        _ => c.expected,
    }
}

/// The passage colored against what has been typed, with runs of equal
/// style merged into one span.
pub fn passage_line(target: &[char], input: &[char]) -> Line<'static> {
    let rendered = classify(target, input);
    let spans: Vec<Span<'static>> = rendered
        .iter()
        .chunk_by(|c| char_style(c))
        .into_iter()
        .map(|(style, run)| Span::styled(run.map(display_char).collect::<String>(), style))
        .collect();
    Line::from(spans)
}

fn notice_line(app_notice: Option<&keysprint::app::Notice>) -> Option<Span<'static>> {
    app_notice.map(|n| {
        let color = match n.level {
            NoticeLevel::Info => Color::Cyan,
            NoticeLevel::Warn => Color::Yellow,
            NoticeLevel::Error => Color::Red,
        };
        Span::styled(n.message.clone(), italic().fg(color))
    })
}

/// Typing screen: idle preview, countdown, live passage, or results.
pub struct TypingView<'a, C: Clock> {
    pub app: &'a App<C>,
}

impl<C: Clock> Widget for TypingView<'_, C> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let app = self.app;
        let session = app.session();

        let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
        let text_width = session.target_text().width();
        let prompt_lines = if text_width <= max_chars_per_line as usize {
            1
        } else {
            (text_width as f64 / max_chars_per_line as f64).ceil() as u16 + 1
        };
        let padding = area.height.saturating_sub(prompt_lines + 6 + VERTICAL_MARGIN * 2) / 2;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(padding),
                Constraint::Length(1), // caption
                Constraint::Length(1), // timer / countdown / results
                Constraint::Length(1),
                Constraint::Length(prompt_lines),
                Constraint::Length(1),
                Constraint::Length(1), // notice
                Constraint::Min(0),
                Constraint::Length(1), // legend
            ])
            .split(area);

        let caption = match app.passage() {
            Some(p) => {
                let mut parts = vec![p.theme.clone()];
                if let Some(source) = &p.source {
                    parts.push(source.clone());
                }
                if let Some(difficulty) = p.difficulty {
                    parts.push(difficulty.to_string());
                }
                parts.join(" · ")
            }
            None => String::new(),
        };
        Paragraph::new(Span::styled(caption, italic().add_modifier(Modifier::DIM)))
            .alignment(Alignment::Center)
            .render(chunks[1], buf);

        let status = match session.phase() {
            Phase::Idle => match app.load_state() {
                LoadState::Loading => Span::styled("loading passage...", dim_bold()),
                LoadState::Failed(_) => {
                    Span::styled("passage unavailable", bold().fg(Color::Red))
                }
                _ => Span::styled("press (enter) to start", dim_bold()),
            },
            Phase::Countdown => Span::styled(
                session.countdown_remaining().to_string(),
                bold().fg(Color::Yellow),
            ),
            Phase::Running => {
                let elapsed = session.elapsed_secs_now();
                Span::styled(
                    format!(
                        "{elapsed:.1}s   {} wpm",
                        live_wpm(session.target(), session.input(), elapsed)
                    ),
                    dim_bold(),
                )
            }
            Phase::Finished => match session.result() {
                Some(m) => Span::styled(
                    format!(
                        "{} wpm   {}% acc   {} incorrect   {:.1}s",
                        m.wpm, m.accuracy, m.incorrect_chars, m.elapsed_secs
                    ),
                    bold().fg(Color::Magenta),
                ),
                None => Span::raw(""),
            },
        };
        Paragraph::new(status)
            .alignment(Alignment::Center)
            .render(chunks[2], buf);

        if app.passage().is_some() && session.has_text() {
            let line = if session.phase() == Phase::Countdown {
                Line::from(Span::styled(session.target_text(), dim_bold()))
            } else {
                passage_line(session.target(), session.input())
            };
            Paragraph::new(line)
                .alignment(if prompt_lines == 1 {
                    Alignment::Center
                } else {
                    Alignment::Left
                })
                .wrap(Wrap { trim: false })
                .render(chunks[4], buf);
        }

        if let Some(notice) = notice_line(app.notice()) {
            Paragraph::new(notice)
                .alignment(Alignment::Center)
                .render(chunks[6], buf);
        }

        let legend = match session.phase() {
            Phase::Countdown | Phase::Running => "(tab) restart / (esc) quit".to_string(),
            Phase::Finished => {
                let best = app
                    .best_wpm()
                    .map(|b| format!("best {b} wpm   "))
                    .unwrap_or_default();
                format!("{best}(r)etry / (n)ew / (l)eaderboard / (m)y stats / (esc) quit")
            }
            Phase::Idle => "(enter) start / (n)ew / (l)eaderboard / (m)y stats / (esc) quit".to_string(),
        };
        Paragraph::new(Span::styled(legend, italic()))
            .alignment(Alignment::Center)
            .render(chunks[8], buf);
    }
}
