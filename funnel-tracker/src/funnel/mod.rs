//! Quiz funnel screens and navigation
//!
//! The screen graph is static: each screen knows its path, its view event and
//! (for quiz screens) where an answer leads. [`FunnelNavigator`] drives the
//! graph and emits the events.

pub mod loader;
pub mod navigator;
pub mod pricing;
pub mod quiz;

pub use loader::{loader_progress, LoaderTask};
pub use navigator::{FunnelNavigator, MailSubmission, PaymentResult};
pub use pricing::{is_valid_email, Plan, OFFER_PLAN, STANDARD_PLANS};
pub use quiz::{progress_percent, QuizStep, QUIZZES};

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Start,
    Quiz1,
    Quiz2,
    Quiz3,
    Quiz4,
    Quiz5,
    Quiz6,
    Quiz7,
    Quiz8,
    Quiz9,
    Loader,
    Mail,
    Plan,
    PriceStandard,
    PriceOffer,
    Thanks,
    Error,
    SkillsFact,
    TalkFact,
}

/// Screens reachable through the router, in funnel order
pub const ROUTES: [Screen; 16] = [
    Screen::Start,
    Screen::Quiz1,
    Screen::Quiz2,
    Screen::Quiz3,
    Screen::Quiz4,
    Screen::Quiz5,
    Screen::Quiz6,
    Screen::Quiz7,
    Screen::Quiz8,
    Screen::Loader,
    Screen::Mail,
    Screen::Plan,
    Screen::PriceStandard,
    Screen::PriceOffer,
    Screen::Thanks,
    Screen::Error,
];

const UNROUTED: [Screen; 3] = [Screen::Quiz9, Screen::SkillsFact, Screen::TalkFact];

impl Screen {
    pub fn path(self) -> &'static str {
        match self {
            Screen::Start => "/start",
            Screen::Quiz1 => "/quiz1",
            Screen::Quiz2 => "/quiz2",
            Screen::Quiz3 => "/quiz3",
            Screen::Quiz4 => "/quiz4",
            Screen::Quiz5 => "/quiz5",
            Screen::Quiz6 => "/quiz6",
            Screen::Quiz7 => "/quiz7",
            Screen::Quiz8 => "/quiz8",
            Screen::Quiz9 => "/quiz9",
            Screen::Loader => "/loader",
            Screen::Mail => "/mail",
            Screen::Plan => "/plan",
            Screen::PriceStandard => "/price-standart",
            Screen::PriceOffer => "/price-offer",
            Screen::Thanks => "/thanks",
            Screen::Error => "/error",
            Screen::SkillsFact => "/skillsfact",
            Screen::TalkFact => "/talkfact",
        }
    }

    /// Look up a screen by path; `/` and the empty path land on start
    ///
    /// A query carried inside the route (`/quiz3?x=1`) is ignored. Unrouted
    /// screens resolve too, since they can still be entered programmatically.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split_once('?').map_or(path, |(route, _)| route);
        if path.is_empty() || path == "/" {
            return Some(Screen::Start);
        }
        ROUTES
            .iter()
            .chain(UNROUTED.iter())
            .copied()
            .find(|s| s.path() == path)
    }

    pub fn is_routed(self) -> bool {
        ROUTES.contains(&self)
    }

    /// Event tracked when the screen is entered
    pub fn view_event(self) -> &'static str {
        match self {
            Screen::Start => "view_start_screen",
            Screen::Quiz1 => "view_landing",
            Screen::Loader => "view_loader",
            Screen::Mail => "view_mail",
            Screen::Plan => "view_plan",
            Screen::PriceStandard => "view_price_standart",
            Screen::PriceOffer => "view_price_offer",
            Screen::Thanks => "view_thanks_page",
            Screen::Error => "view_error_page",
            Screen::SkillsFact => "view_skillsfact",
            Screen::TalkFact => "view_talkfact",
            Screen::Quiz2 => "view_question_2",
            Screen::Quiz3 => "view_question_3",
            Screen::Quiz4 => "view_question_4",
            Screen::Quiz5 => "view_question_5",
            Screen::Quiz6 => "view_question_6",
            Screen::Quiz7 => "view_question_7",
            Screen::Quiz8 => "view_question_8",
            Screen::Quiz9 => "view_question_9",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
