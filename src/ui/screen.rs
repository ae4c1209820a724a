use ratatui::Frame;

use keysprint::{
    app::{App, Screen},
    session::Clock,
};

use crate::ui::{
    tables::{render_leaderboard, render_my_stats},
    TypingView,
};

/// A UI screen boundary: renders one view of the app
pub trait View<C: Clock> {
    fn render(&self, app: &App<C>, f: &mut Frame);
}

pub struct TypingScreen;

impl<C: Clock> View<C> for TypingScreen {
    fn render(&self, app: &App<C>, f: &mut Frame) {
        f.render_widget(TypingView { app }, f.area());
    }
}

pub struct LeaderboardScreen;

impl<C: Clock> View<C> for LeaderboardScreen {
    fn render(&self, app: &App<C>, f: &mut Frame) {
        render_leaderboard(app, f);
    }
}

pub struct MyStatsScreen;

impl<C: Clock> View<C> for MyStatsScreen {
    fn render(&self, app: &App<C>, f: &mut Frame) {
        render_my_stats(app, f);
    }
}

/// Helper to construct the view for the screen the app is on
pub fn current_view<C: Clock>(screen: Screen) -> Box<dyn View<C>> {
    match screen {
        Screen::Typing => Box::new(TypingScreen),
        Screen::Leaderboard => Box::new(LeaderboardScreen),
        Screen::MyStats => Box::new(MyStatsScreen),
    }
}

pub fn draw<C: Clock>(app: &App<C>, f: &mut Frame) {
    current_view::<C>(app.screen()).render(app, f);
}
