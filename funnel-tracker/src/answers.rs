//! Quiz answers, email and plan selection for the current visit
//!
//! Held in memory only; a new visit starts empty.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Replace every run of whitespace with a single `_`
///
/// `"hello   world"` becomes `"hello_world"`. Leading and trailing runs are
/// replaced too, not trimmed.
pub fn normalize_answer(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, "_").into_owned()
}

/// Turn a stored answer back into display text (`_` to space)
pub fn denormalize_answer(stored: &str) -> String {
    stored.replace('_', " ")
}

/// Subscription length offered on the pricing screens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum PlanWeeks {
    Four,
    #[default]
    Twelve,
    TwentyFour,
}

impl PlanWeeks {
    pub const ALL: [PlanWeeks; 3] = [PlanWeeks::Four, PlanWeeks::Twelve, PlanWeeks::TwentyFour];

    pub fn weeks(self) -> u32 {
        match self {
            PlanWeeks::Four => 4,
            PlanWeeks::Twelve => 12,
            PlanWeeks::TwentyFour => 24,
        }
    }

    pub fn from_weeks(weeks: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.weeks() == weeks)
    }
}

impl fmt::Display for PlanWeeks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.weeks())
    }
}

impl From<PlanWeeks> for u32 {
    fn from(plan: PlanWeeks) -> Self {
        plan.weeks()
    }
}

impl TryFrom<u32> for PlanWeeks {
    type Error = String;

    fn try_from(weeks: u32) -> Result<Self, Self::Error> {
        PlanWeeks::from_weeks(weeks).ok_or_else(|| format!("no {}-week plan", weeks))
    }
}

#[derive(Debug, Clone, Default)]
struct AnswersState {
    answers: BTreeMap<String, String>,
    email: String,
    selected_plan: PlanWeeks,
}

#[derive(Debug, Default)]
pub struct AnswerStore {
    state: Mutex<AnswersState>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an answer under its question key (e.g. `question_3`), replacing any earlier one
    pub fn set_answer(&self, question: &str, answer: &str) {
        self.lock()
            .answers
            .insert(question.to_string(), answer.to_string());
    }

    pub fn answer(&self, question: &str) -> Option<String> {
        self.lock().answers.get(question).cloned()
    }

    pub fn answers(&self) -> BTreeMap<String, String> {
        self.lock().answers.clone()
    }

    pub fn set_email(&self, email: &str) {
        self.lock().email = email.to_string();
    }

    /// Email entered on the mail screen, empty until then
    pub fn email(&self) -> String {
        self.lock().email.clone()
    }

    pub fn set_selected_plan(&self, plan: PlanWeeks) {
        self.lock().selected_plan = plan;
    }

    pub fn selected_plan(&self) -> PlanWeeks {
        self.lock().selected_plan
    }

    /// Back to empty answers, empty email and the 12-week plan
    pub fn reset(&self) {
        *self.lock() = AnswersState::default();
    }

    fn lock(&self) -> MutexGuard<'_, AnswersState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
