//! Funnel navigator
//!
//! Drives the screen graph for one visit. Every transition goes through
//! [`FunnelNavigator::enter`], which moves the page context to the new route
//! and tracks the screen's view event. User actions are only accepted on the
//! screen that offers them; anything else is `Error::InvalidInput`.
//!
//! Tracking never blocks navigation, with one exception: paying waits for the
//! purchase dispatches to be acknowledged (or for the purchase timeout) so
//! the events are not lost to the page change.

use super::loader::LoaderTask;
use super::pricing::{is_valid_email, Plan, OFFER_PLAN};
use super::quiz::QuizStep;
use super::Screen;
use crate::answers::{denormalize_answer, normalize_answer, AnswerStore, PlanWeeks};
use crate::page::PageContext;
use crate::tracker::{DispatchOutcome, EventTracker, DEFAULT_CURRENCY};
use funnel_common::config::TimingConfig;
use funnel_common::time::millis_to_duration;
use funnel_common::{Error, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Pixel event fired on the thanks screen
pub const REGISTRATION_PIXEL_EVENT: &str = "CompleteRegistration";

/// Result of submitting the mail form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailSubmission {
    /// Stored and moved on to the plan screen
    Accepted(String),
    /// Rejected; the screen stays and shows the error
    Invalid,
}

/// What happened when the user paid
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentResult {
    pub plan: Plan,
    pub event: DispatchOutcome,
    pub pixel: DispatchOutcome,
}

pub struct FunnelNavigator {
    tracker: EventTracker,
    answers: Arc<AnswerStore>,
    page: Arc<PageContext>,
    timing: TimingConfig,
    current: Screen,
    /// Plan highlighted on the standard pricing screen; 12 weeks on every entry
    highlighted: PlanWeeks,
    mail_rejected: bool,
    loader: Option<LoaderTask>,
}

impl FunnelNavigator {
    /// Navigator positioned on the page's current route
    ///
    /// Nothing is tracked until [`enter`](Self::enter) or
    /// [`resume`](Self::resume) is called.
    pub fn new(
        tracker: EventTracker,
        answers: Arc<AnswerStore>,
        page: Arc<PageContext>,
        timing: TimingConfig,
    ) -> Self {
        let current = Screen::from_path(&page.path()).unwrap_or(Screen::Start);
        Self {
            tracker,
            answers,
            page,
            timing,
            current,
            highlighted: PlanWeeks::default(),
            mail_rejected: false,
            loader: None,
        }
    }

    pub fn current(&self) -> Screen {
        self.current
    }

    pub fn tracker(&self) -> &EventTracker {
        &self.tracker
    }

    /// Enter whatever screen the page is on (the landing step of a visit)
    pub fn resume(&mut self) {
        self.enter(self.current);
    }

    /// Show `screen`: update the route and track its view event
    pub fn enter(&mut self, screen: Screen) {
        if let Some(loader) = self.loader.take() {
            loader.cancel();
        }

        self.current = screen;
        self.page.navigate(screen.path());
        debug!(screen = %screen, "Entered screen");

        self.tracker.track(screen.view_event(), None);

        match screen {
            Screen::Loader => {
                self.loader = Some(LoaderTask::spawn(millis_to_duration(
                    self.timing.loader_duration_ms,
                )));
            }
            Screen::PriceStandard => self.highlighted = PlanWeeks::default(),
            Screen::Mail => self.mail_rejected = false,
            Screen::Thanks => {
                self.tracker.track_pixel(REGISTRATION_PIXEL_EVENT, None);
            }
            _ => {}
        }
    }

    /// Enter the screen at `path`; unknown paths are `Error::NotFound`
    pub fn navigate(&mut self, path: &str) -> Result<Screen> {
        let screen = Screen::from_path(path)
            .ok_or_else(|| Error::NotFound(format!("no screen at {}", path)))?;
        self.enter(screen);
        Ok(screen)
    }

    /// Primary button on screens that have one
    ///
    /// On the loader this waits for the animation to finish.
    pub async fn next(&mut self) -> Result<Screen> {
        let (event, target) = match self.current {
            Screen::Start => (Some("clicked_continue"), Screen::Quiz1),
            Screen::Quiz1 => (Some("clicked_start_quiz"), Screen::Quiz2),
            Screen::Plan => (Some("clicked_next"), Screen::PriceStandard),
            Screen::SkillsFact | Screen::TalkFact => (None, Screen::Quiz2),
            Screen::Loader => return self.finish_loader().await,
            other => return Err(unavailable("next", other)),
        };
        if let Some(event) = event {
            self.tracker.track(event, None);
        }
        self.enter(target);
        Ok(target)
    }

    /// Back button on quiz screens
    pub fn back(&mut self) -> Result<Screen> {
        let target = match self.current {
            Screen::Quiz2 => Screen::Quiz1,
            Screen::Quiz3 => Screen::Quiz2,
            Screen::Quiz4 => Screen::Quiz3,
            Screen::Quiz5 => Screen::Quiz4,
            Screen::Quiz6 => Screen::Quiz5,
            Screen::Quiz7 => Screen::Quiz6,
            Screen::Quiz8 => Screen::Quiz7,
            Screen::Quiz9 => Screen::Quiz8,
            other => return Err(unavailable("back", other)),
        };
        self.enter(target);
        Ok(target)
    }

    /// Answer the current quiz question
    ///
    /// Stores the normalized answer, tracks it, waits the pacing delay and
    /// moves on. Question 9 leads to a path with no screen, which surfaces as
    /// `Error::NotFound` after the answer has been recorded.
    pub async fn answer(&mut self, text: &str) -> Result<Screen> {
        let quiz = self.current_quiz("answer")?;
        let formatted = normalize_answer(text);
        self.answers.set_answer(quiz.question_key, &formatted);

        let mut props = Map::new();
        props.insert("answer".to_string(), Value::String(formatted));
        self.tracker.track(quiz.answer_event, Some(props));

        tokio::time::sleep(millis_to_duration(self.timing.answer_delay_ms)).await;
        self.navigate(quiz.next)
    }

    /// Previously given answer for the current question, as display text
    pub fn saved_selection(&self) -> Option<String> {
        let quiz = QuizStep::for_screen(self.current)?;
        self.answers
            .answer(quiz.question_key)
            .map(|stored| denormalize_answer(&stored))
    }

    /// Loader progress while the loader screen is showing
    pub fn loader(&self) -> Option<&LoaderTask> {
        self.loader.as_ref()
    }

    pub fn focus_mail(&self) -> Result<()> {
        self.expect_screen(Screen::Mail, "focus mail")?;
        self.tracker.track("mail_input_click", None);
        Ok(())
    }

    pub fn submit_email(&mut self, input: &str) -> Result<MailSubmission> {
        self.expect_screen(Screen::Mail, "submit email")?;
        let email = input.trim();
        if !is_valid_email(email) {
            self.mail_rejected = true;
            debug!("Rejected mail submission");
            return Ok(MailSubmission::Invalid);
        }

        self.answers.set_email(email);
        let mut props = Map::new();
        props.insert("email".to_string(), Value::String(email.to_string()));
        self.tracker.track("Lead", Some(props));

        self.enter(Screen::Plan);
        Ok(MailSubmission::Accepted(email.to_string()))
    }

    /// True once an invalid address was submitted on the current mail screen
    pub fn mail_rejected(&self) -> bool {
        self.mail_rejected
    }

    /// Highlight a plan on the standard pricing screen
    pub fn select_plan(&mut self, weeks: PlanWeeks) -> Result<()> {
        self.expect_screen(Screen::PriceStandard, "select plan")?;
        self.highlighted = weeks;
        self.answers.set_selected_plan(weeks);
        self.tracker.track(&format!("clicked_plan_{}", weeks), None);
        Ok(())
    }

    pub fn highlighted_plan(&self) -> PlanWeeks {
        self.highlighted
    }

    /// Close button on the pricing screens
    pub fn cancel(&mut self) -> Result<Screen> {
        let (event, target) = match self.current {
            Screen::PriceStandard => ("clicked_cancel_standart", Screen::PriceOffer),
            Screen::PriceOffer => ("clicked_cancel_offer", Screen::Error),
            other => return Err(unavailable("cancel", other)),
        };
        self.tracker.track(event, None);
        self.enter(target);
        Ok(target)
    }

    /// Pay on either pricing screen, then show the thanks screen
    pub async fn purchase(&mut self) -> Result<PaymentResult> {
        let (plan, event) = match self.current {
            Screen::PriceStandard => {
                let plan = *Plan::standard(self.highlighted);
                let props = object(json!({
                    "weeks": plan.weeks.weeks(),
                    "currency": DEFAULT_CURRENCY,
                }));
                (plan, self.tracker.track("Purchase", Some(props)))
            }
            Screen::PriceOffer => {
                let props = object(json!({ "currency": DEFAULT_CURRENCY }));
                (OFFER_PLAN, self.tracker.track("clicked_pay_offer", Some(props)))
            }
            other => return Err(unavailable("purchase", other)),
        };

        let extra = object(json!({ "weeks": plan.weeks.weeks() }));
        let pixel = self.tracker.track_pixel_purchase(plan.price, None, Some(extra));

        let timeout = millis_to_duration(self.timing.purchase_ack_timeout_ms);
        let (event, pixel) = tokio::join!(event.wait(timeout), pixel.wait(timeout));
        info!(
            weeks = plan.weeks.weeks(),
            price = plan.price,
            %event,
            %pixel,
            "Purchase dispatched"
        );

        self.enter(Screen::Thanks);
        Ok(PaymentResult { plan, event, pixel })
    }

    async fn finish_loader(&mut self) -> Result<Screen> {
        let completed = match self.loader.as_mut() {
            Some(loader) => loader.finished().await,
            None => true,
        };
        if !completed {
            return Err(Error::Internal("loader stopped before completing".to_string()));
        }
        self.enter(Screen::Mail);
        Ok(Screen::Mail)
    }

    fn current_quiz(&self, action: &str) -> Result<&'static QuizStep> {
        QuizStep::for_screen(self.current).ok_or_else(|| unavailable(action, self.current))
    }

    fn expect_screen(&self, screen: Screen, action: &str) -> Result<()> {
        if self.current == screen {
            Ok(())
        } else {
            Err(unavailable(action, self.current))
        }
    }
}

fn unavailable(action: &str, screen: Screen) -> Error {
    Error::InvalidInput(format!("{} is not available on {}", action, screen))
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
