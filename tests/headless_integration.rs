use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use keysprint::app::{App, AppSettings, Control};
use keysprint::passage::CustomPassage;
use keysprint::report::{Identity, ReportError, Reporter, StatRecord, StatSink};
use keysprint::runtime::{AppEvent, FixedTicker, Runner, TestEventSource};
use keysprint::session::{ManualClock, Phase};

struct NullSink;

impl StatSink for NullSink {
    fn submit_stat(&mut self, _record: &StatRecord) -> Result<(), ReportError> {
        Ok(())
    }
}

fn key(code: KeyCode) -> AppEvent {
    AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
}

fn guest_app(text: &str, countdown_secs: u32, clock: &ManualClock) -> App<ManualClock> {
    let mut app = App::new(
        AppSettings {
            countdown_secs,
            ..AppSettings::default()
        },
        Arc::new(CustomPassage::new(text)),
        Reporter::spawn(NullSink, 0),
        None,
        Identity::anonymous(),
        clock.clone(),
    );
    assert!(app.wait_for_passage(Duration::from_secs(5)));
    app
}

/// Drive the app from the runner until `done` holds or the step budget
/// runs out. Every step advances the simulated wall clock by one second.
fn drive(
    app: &mut App<ManualClock>,
    runner: &Runner<TestEventSource, FixedTicker>,
    now: &mut Instant,
    done: impl Fn(&App<ManualClock>) -> bool,
) -> bool {
    for _ in 0..50u32 {
        match runner.step() {
            AppEvent::Key(k) => {
                if app.on_key(k, *now) == Control::Quit {
                    return done(app);
                }
            }
            AppEvent::Resize => {}
            AppEvent::Tick => *now += Duration::from_secs(1),
            AppEvent::Closed => return done(app),
        }
        app.on_tick(*now);
        app.poll_background();
        if done(app) {
            return true;
        }
    }
    false
}

#[test]
fn headless_typing_flow_completes() {
    let clock = ManualClock::default();
    let mut app = guest_app("hi", 2, &clock);

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(1)),
    );
    let mut now = Instant::now();

    tx.send(key(KeyCode::Enter)).unwrap();
    assert!(drive(&mut app, &runner, &mut now, |a| a.session().phase()
        == Phase::Running));

    clock.advance(Duration::from_secs(6));
    tx.send(key(KeyCode::Char('h'))).unwrap();
    tx.send(key(KeyCode::Char('i'))).unwrap();
    assert!(drive(&mut app, &runner, &mut now, |a| a.session().phase()
        == Phase::Finished));

    let result = app.session().result().expect("result computed on finish");
    assert_eq!(result.wpm, 4);
    assert_eq!(result.accuracy, 100);
    assert!((result.elapsed_secs - 6.0).abs() < 1e-9);
}

#[test]
fn keys_during_countdown_are_not_typed() {
    let clock = ManualClock::default();
    let mut app = guest_app("abc", 3, &clock);

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(1)),
    );
    let mut now = Instant::now();

    tx.send(key(KeyCode::Enter)).unwrap();
    tx.send(key(KeyCode::Char('a'))).unwrap();
    tx.send(key(KeyCode::Char('b'))).unwrap();
    assert!(drive(&mut app, &runner, &mut now, |a| a.session().phase()
        == Phase::Running));
    assert_eq!(app.session().input_text(), "");
}

#[test]
fn backspace_then_correction_finishes_clean() {
    let clock = ManualClock::default();
    let mut app = guest_app("abc", 1, &clock);

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(1)),
    );
    let mut now = Instant::now();

    tx.send(key(KeyCode::Enter)).unwrap();
    assert!(drive(&mut app, &runner, &mut now, |a| a.session().phase()
        == Phase::Running));

    clock.advance(Duration::from_secs(30));
    for code in [
        KeyCode::Char('a'),
        KeyCode::Char('x'),
        KeyCode::Backspace,
        KeyCode::Char('b'),
        KeyCode::Char('c'),
    ] {
        tx.send(key(code)).unwrap();
    }
    assert!(drive(&mut app, &runner, &mut now, |a| a.session().phase()
        == Phase::Finished));

    let result = app.session().result().unwrap();
    assert_eq!(result.accuracy, 100);
    assert_eq!(result.wpm, 1);
}

#[test]
fn filling_the_buffer_finishes_before_any_correction() {
    let clock = ManualClock::default();
    let mut app = guest_app("ab", 1, &clock);

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(1)),
    );
    let mut now = Instant::now();

    tx.send(key(KeyCode::Enter)).unwrap();
    assert!(drive(&mut app, &runner, &mut now, |a| a.session().phase()
        == Phase::Running));

    clock.advance(Duration::from_secs(30));
    tx.send(key(KeyCode::Char('a'))).unwrap();
    tx.send(key(KeyCode::Char('x'))).unwrap();
    assert!(drive(&mut app, &runner, &mut now, |a| a.session().phase()
        == Phase::Finished));
    assert_eq!(app.session().result().unwrap().accuracy, 50);

    // a late correction cannot reopen a finished attempt
    tx.send(key(KeyCode::Backspace)).unwrap();
    tx.send(key(KeyCode::Char('b'))).unwrap();
    drop(tx);
    drive(&mut app, &runner, &mut now, |_| false);
    assert_eq!(app.session().phase(), Phase::Finished);
    assert_eq!(app.session().input_text(), "ax");
    assert_eq!(app.session().result().unwrap().accuracy, 50);
}

#[test]
fn restart_mid_attempt_returns_to_idle_and_quit_stops() {
    let clock = ManualClock::default();
    let mut app = guest_app("hello", 1, &clock);

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(1)),
    );
    let mut now = Instant::now();

    tx.send(key(KeyCode::Enter)).unwrap();
    assert!(drive(&mut app, &runner, &mut now, |a| a.session().phase()
        == Phase::Running));

    tx.send(key(KeyCode::Char('h'))).unwrap();
    tx.send(key(KeyCode::Tab)).unwrap();
    assert!(drive(&mut app, &runner, &mut now, |a| a.session().phase()
        == Phase::Idle));
    assert_eq!(app.session().input_text(), "");
    assert_eq!(app.session().target_text(), "hello");

    let esc = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
    assert_eq!(app.on_key(esc, now), Control::Quit);
}
