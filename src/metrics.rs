//! Pure derivations over `(target, input)`: speed, accuracy and the
//! per-character render classification. Nothing here is cached; callers
//! recompute on every read.

use crate::util::round_to_u32;

/// Average word length used by the WPM convention.
pub const CHARS_PER_WORD: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharState {
    Correct,
    Incorrect,
    Pending,
}

/// One character of the passage as the presentation layer should draw it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderChar {
    pub expected: char,
    pub typed: Option<char>,
    pub state: CharState,
    pub is_cursor: bool,
}

/// Final results of a finished session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionMetrics {
    pub wpm: u32,
    pub accuracy: u32,
    pub correct_chars: usize,
    pub incorrect_chars: usize,
    pub typed_chars: usize,
    pub elapsed_secs: f64,
}

impl SessionMetrics {
    pub fn compute(target: &[char], input: &[char], elapsed_secs: f64) -> Self {
        let correct_chars = correct_count(target, input);
        let typed_chars = input.len();

        Self {
            wpm: calculate_wpm(correct_chars, elapsed_secs),
            accuracy: calculate_accuracy(correct_chars, typed_chars),
            correct_chars,
            incorrect_chars: typed_chars - correct_chars,
            typed_chars,
            elapsed_secs: elapsed_secs.max(0.0),
        }
    }
}

/// Number of positions where the typed character matches the passage.
pub fn correct_count(target: &[char], input: &[char]) -> usize {
    input
        .iter()
        .zip(target.iter())
        .filter(|(typed, expected)| typed == expected)
        .count()
}

/// Net words per minute. Zero when no time has elapsed.
pub fn calculate_wpm(correct_chars: usize, elapsed_secs: f64) -> u32 {
    if elapsed_secs.is_nan() || elapsed_secs <= 0.0 {
        return 0;
    }
    let words = correct_chars as f64 / CHARS_PER_WORD;
    let minutes = elapsed_secs / 60.0;
    round_to_u32(words / minutes)
}

/// Percentage of typed characters that are correct; 100 when nothing was typed.
pub fn calculate_accuracy(correct_chars: usize, typed_chars: usize) -> u32 {
    if typed_chars == 0 {
        return 100;
    }
    round_to_u32(correct_chars as f64 / typed_chars as f64 * 100.0)
}

/// WPM of the buffer as it stands, for the running display.
pub fn live_wpm(target: &[char], input: &[char], elapsed_secs: f64) -> u32 {
    calculate_wpm(correct_count(target, input), elapsed_secs)
}

pub fn classify(target: &[char], input: &[char]) -> Vec<RenderChar> {
    let cursor = input.len();
    target
        .iter()
        .enumerate()
        .map(|(idx, &expected)| {
            let typed = input.get(idx).copied();
            let state = match typed {
                Some(c) if c == expected => CharState::Correct,
                Some(_) => CharState::Incorrect,
                None => CharState::Pending,
            };
            RenderChar {
                expected,
                typed,
                state,
                is_cursor: idx == cursor,
            }
        })
        .collect()
}
