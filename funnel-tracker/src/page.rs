//! Page context: current URL, referrer and logical screen path
//!
//! The funnel uses hash routing, so the logical path lives in the fragment
//! (`https://site/?utm_source=fb#/quiz2` is on `/quiz2`). Without a `#/`
//! fragment the URL path is used.

use reqwest::Url;
use std::sync::RwLock;

/// Referrer reported when the visit had none
pub const DIRECT_REFERRER: &str = "direct";

#[derive(Debug, Clone)]
struct PageState {
    url: Option<Url>,
    raw_url: String,
}

pub struct PageContext {
    state: RwLock<PageState>,
    referrer: Option<String>,
}

/// Point-in-time copy of the page context, captured when an event is tracked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub page_url: String,
    pub referrer: String,
    pub screen: String,
}

impl PageContext {
    /// Context for an entry URL; an empty referrer counts as none
    pub fn new(entry_url: &str, referrer: Option<&str>) -> Self {
        Self {
            state: RwLock::new(PageState {
                url: Url::parse(entry_url).ok(),
                raw_url: entry_url.to_string(),
            }),
            referrer: referrer.filter(|r| !r.is_empty()).map(str::to_string),
        }
    }

    /// Full current URL
    pub fn url(&self) -> String {
        let state = self.read();
        match &state.url {
            Some(url) => url.to_string(),
            None => state.raw_url.clone(),
        }
    }

    /// Referrer, or `"direct"` when there was none
    pub fn referrer(&self) -> String {
        self.referrer
            .clone()
            .unwrap_or_else(|| DIRECT_REFERRER.to_string())
    }

    /// Logical screen path (hash route when present)
    pub fn path(&self) -> String {
        match &self.read().url {
            Some(url) => match url.fragment() {
                Some(fragment) if fragment.starts_with('/') => fragment.to_string(),
                _ => url.path().to_string(),
            },
            None => String::new(),
        }
    }

    /// Move to a new hash route, keeping the query string
    pub fn navigate(&self, path: &str) {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(url) = state.url.as_mut() {
            url.set_fragment(Some(path));
        }
    }

    pub fn view(&self) -> PageView {
        PageView {
            page_url: self.url(),
            referrer: self.referrer(),
            screen: self.path(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PageState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
