//! Static quiz question table
//!
//! Questions 2 through 9 take an answer. `next` is kept as a path rather
//! than a [`Screen`] because question 9 points at `/quiz10`, which has no
//! screen behind it.

use super::Screen;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizStep {
    pub screen: Screen,
    pub number: u8,
    /// Answer store key
    pub question_key: &'static str,
    pub view_event: &'static str,
    pub answer_event: &'static str,
    /// Path navigated to after answering
    pub next: &'static str,
    /// Progress bar fraction as (numerator, denominator)
    pub progress: (u32, u32),
    pub options: &'static [&'static str],
}

const TOPICS: &[&str] = &[
    "🐈‍⬛ Sex positions",
    "🖐 Intimate massage",
    "🫦 Oral sex",
    "🔞 All of this",
];

const SCALE: &[&str] = &["1", "2", "3", "4"];

pub static QUIZZES: [QuizStep; 8] = [
    QuizStep {
        screen: Screen::Quiz2,
        number: 2,
        question_key: "question_2",
        view_event: "view_question_2",
        answer_event: "answear_question_2",
        next: "/quiz3",
        progress: (2, 10),
        options: &["☄️ Improve skills", "💪🏻 Boost confidence", "🌋 Expand knowledge"],
    },
    QuizStep {
        screen: Screen::Quiz3,
        number: 3,
        question_key: "question_3",
        view_event: "view_question_3",
        answer_event: "answear_question_3",
        next: "/quiz4",
        progress: (3, 10),
        options: TOPICS,
    },
    QuizStep {
        screen: Screen::Quiz4,
        number: 4,
        question_key: "question_4",
        view_event: "view_question_4",
        answer_event: "answear_question_4",
        next: "/quiz5",
        progress: (4, 10),
        options: &["💃 In a relationship", "👯‍♀️ Have multiple partners", "🥃 No partner"],
    },
    QuizStep {
        screen: Screen::Quiz5,
        number: 5,
        question_key: "question_5",
        view_event: "view_question_5",
        answer_event: "answear_question_5",
        next: "/quiz6",
        progress: (5, 10),
        options: TOPICS,
    },
    QuizStep {
        screen: Screen::Quiz6,
        number: 6,
        question_key: "question_6",
        view_event: "view_question_6",
        answer_event: "answear_question_6",
        next: "/quiz7",
        progress: (6, 7),
        options: SCALE,
    },
    QuizStep {
        screen: Screen::Quiz7,
        number: 7,
        question_key: "question_7",
        view_event: "view_question_7",
        answer_event: "answear_question_7",
        next: "/loader",
        progress: (7, 7),
        options: SCALE,
    },
    QuizStep {
        screen: Screen::Quiz8,
        number: 8,
        question_key: "question_8",
        view_event: "view_question_8",
        answer_event: "answear_question_8",
        next: "/loader",
        progress: (8, 8),
        options: &[
            "Don't know what to do",
            "Experience pain",
            "Feel shy / afraid to make a mistake",
            "None of these",
        ],
    },
    QuizStep {
        screen: Screen::Quiz9,
        number: 9,
        question_key: "question_9",
        view_event: "view_question_9",
        answer_event: "answear_question_9",
        next: "/quiz10",
        progress: (9, 10),
        options: &["Option 1", "Option 2", "Option 3", "Option 4"],
    },
];

impl QuizStep {
    pub fn for_screen(screen: Screen) -> Option<&'static QuizStep> {
        QUIZZES.iter().find(|q| q.screen == screen)
    }

    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.progress.0 as f64 / self.progress.1 as f64)
    }
}

/// Progress bar width in percent for a 0..1 fraction, clamped to [0, 100]
pub fn progress_percent(fraction: f64) -> f64 {
    if fraction.is_nan() {
        return 0.0;
    }
    (fraction * 100.0).clamp(0.0, 100.0)
}
