//! Keyboard policy: which key events reach the session and how.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::session::{Clock, Phase, Session};

/// What happened to a key event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyDisposition {
    /// A character was appended to the buffer.
    Typed,
    /// The last character was removed.
    Erased,
    /// Consumed while typing without changing anything; must not be
    /// interpreted as a command.
    Suppressed,
    /// Not meant for the session; the caller may handle it.
    Ignored,
}

impl KeyDisposition {
    pub fn is_consumed(self) -> bool {
        !matches!(self, KeyDisposition::Ignored)
    }
}

/// Printable input: a plain or shifted character, no control chords.
pub fn printable_char(key: &KeyEvent) -> Option<char> {
    match key.code {
        KeyCode::Char(c)
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
                && !c.is_control() =>
        {
            Some(c)
        }
        _ => None,
    }
}

/// Route one key event into the session. Phase and buffer length are read
/// through the same borrow that mutates, so a check can never go stale
/// before its action.
pub fn apply_key<C: Clock>(session: &mut Session<C>, key: &KeyEvent) -> KeyDisposition {
    if key.kind == KeyEventKind::Release || session.phase() != Phase::Running {
        return KeyDisposition::Ignored;
    }

    if key.code == KeyCode::Backspace {
        return if session.backspace() {
            KeyDisposition::Erased
        } else {
            KeyDisposition::Suppressed
        };
    }

    match printable_char(key) {
        Some(c) if !session.is_full() => {
            session.type_character(c);
            KeyDisposition::Typed
        }
        Some(_) => KeyDisposition::Suppressed,
        None => KeyDisposition::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ManualClock;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn running(text: &str) -> Session<ManualClock> {
        let mut s = Session::with_clock(ManualClock::default());
        s.seed_text(text);
        s.begin_countdown(1);
        s.tick_countdown();
        s
    }

    #[test]
    fn ignores_everything_when_not_running() {
        let mut s = Session::with_clock(ManualClock::default());
        s.seed_text("abc");
        assert_eq!(apply_key(&mut s, &key(KeyCode::Char('a'))), KeyDisposition::Ignored);
        assert_eq!(apply_key(&mut s, &key(KeyCode::Backspace)), KeyDisposition::Ignored);
        assert!(s.input().is_empty());
    }

    #[test]
    fn types_and_erases() {
        let mut s = running("ab c");
        assert_eq!(apply_key(&mut s, &key(KeyCode::Char('a'))), KeyDisposition::Typed);
        assert_eq!(apply_key(&mut s, &key(KeyCode::Char('b'))), KeyDisposition::Typed);
        assert_eq!(apply_key(&mut s, &key(KeyCode::Char(' '))), KeyDisposition::Typed);
        assert_eq!(apply_key(&mut s, &key(KeyCode::Backspace)), KeyDisposition::Erased);
        assert_eq!(s.input_text(), "ab");
    }

    #[test]
    fn backspace_on_empty_buffer_is_suppressed() {
        let mut s = running("ab");
        let d = apply_key(&mut s, &key(KeyCode::Backspace));
        assert_eq!(d, KeyDisposition::Suppressed);
        assert!(d.is_consumed());
    }

    #[test]
    fn shifted_chars_are_printable() {
        let mut s = running("A");
        let shifted = KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT);
        assert_eq!(apply_key(&mut s, &shifted), KeyDisposition::Typed);
        assert_eq!(s.phase(), Phase::Finished);
    }

    #[test]
    fn control_chords_and_navigation_are_ignored() {
        let mut s = running("abc");
        let ctrl_a = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::CONTROL);
        assert_eq!(apply_key(&mut s, &ctrl_a), KeyDisposition::Ignored);
        assert_eq!(apply_key(&mut s, &key(KeyCode::Left)), KeyDisposition::Ignored);
        assert_eq!(apply_key(&mut s, &key(KeyCode::Enter)), KeyDisposition::Ignored);
        assert_eq!(apply_key(&mut s, &key(KeyCode::Tab)), KeyDisposition::Ignored);
        assert!(s.input().is_empty());
    }

    #[test]
    fn key_release_is_ignored() {
        let mut s = running("abc");
        let release = KeyEvent {
            code: KeyCode::Char('a'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        assert_eq!(apply_key(&mut s, &release), KeyDisposition::Ignored);
        assert!(s.input().is_empty());
    }

    #[test]
    fn keys_apply_in_order_received() {
        let mut s = running("abcd");
        for c in ['a', 'x', 'c'] {
            apply_key(&mut s, &key(KeyCode::Char(c)));
        }
        apply_key(&mut s, &key(KeyCode::Backspace));
        apply_key(&mut s, &key(KeyCode::Backspace));
        apply_key(&mut s, &key(KeyCode::Char('b')));
        assert_eq!(s.input_text(), "ab");
    }

    #[test]
    fn finishing_key_stops_further_input() {
        let mut s = running("a");
        assert_eq!(apply_key(&mut s, &key(KeyCode::Char('a'))), KeyDisposition::Typed);
        assert_eq!(s.phase(), Phase::Finished);
        assert_eq!(apply_key(&mut s, &key(KeyCode::Char('b'))), KeyDisposition::Ignored);
        assert_eq!(s.input_text(), "a");
    }
}
