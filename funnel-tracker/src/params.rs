//! Marketing parameter parsing
//!
//! Extracts acquisition parameters from an entry URL's query string:
//! - UTM parameters (`utm_source`, `utm_medium`, `utm_campaign`, `utm_content`, `utm_term`)
//! - Click IDs (`gclid`, `fbclid`, `ttclid`)
//! - Any other query key, kept verbatim as a custom parameter
//!
//! Parsing never fails: a URL that cannot be parsed yields no parameters.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Known acquisition parameter keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketingParam {
    UtmSource,
    UtmMedium,
    UtmCampaign,
    UtmContent,
    UtmTerm,
    /// Google click id
    Gclid,
    /// Facebook click id
    Fbclid,
    /// TikTok click id
    Ttclid,
}

impl MarketingParam {
    /// Every known parameter, UTM keys first, then click ids
    pub const ALL: [MarketingParam; 8] = [
        MarketingParam::UtmSource,
        MarketingParam::UtmMedium,
        MarketingParam::UtmCampaign,
        MarketingParam::UtmContent,
        MarketingParam::UtmTerm,
        MarketingParam::Gclid,
        MarketingParam::Fbclid,
        MarketingParam::Ttclid,
    ];

    /// Query string / storage key
    pub fn key(self) -> &'static str {
        match self {
            MarketingParam::UtmSource => "utm_source",
            MarketingParam::UtmMedium => "utm_medium",
            MarketingParam::UtmCampaign => "utm_campaign",
            MarketingParam::UtmContent => "utm_content",
            MarketingParam::UtmTerm => "utm_term",
            MarketingParam::Gclid => "gclid",
            MarketingParam::Fbclid => "fbclid",
            MarketingParam::Ttclid => "ttclid",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }

    pub fn is_click_id(self) -> bool {
        matches!(
            self,
            MarketingParam::Gclid | MarketingParam::Fbclid | MarketingParam::Ttclid
        )
    }
}

impl fmt::Display for MarketingParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Values for the known parameter set
///
/// A parameter is either present with a non-empty value or absent; storing an
/// empty string is the same as removing the parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketingParams {
    values: BTreeMap<MarketingParam, String>,
}

impl MarketingParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, param: MarketingParam) -> Option<&str> {
        self.values.get(&param).map(String::as_str)
    }

    /// Set a value; empty values make the parameter absent
    pub fn set(&mut self, param: MarketingParam, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.values.remove(&param);
        } else {
            self.values.insert(param, value);
        }
    }

    pub fn remove(&mut self, param: MarketingParam) {
        self.values.remove(&param);
    }

    pub fn with(mut self, param: MarketingParam, value: impl Into<String>) -> Self {
        self.set(param, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of present parameters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Every known parameter with its value or `None`, in [`MarketingParam::ALL`] order
    pub fn all(&self) -> impl Iterator<Item = (MarketingParam, Option<&str>)> + '_ {
        MarketingParam::ALL.into_iter().map(move |p| (p, self.get(p)))
    }

    /// Present parameters only
    pub fn present(&self) -> impl Iterator<Item = (MarketingParam, &str)> + '_ {
        self.values.iter().map(|(p, v)| (*p, v.as_str()))
    }

    /// Present parameters keyed by their string key
    pub fn to_key_map(&self) -> BTreeMap<String, String> {
        self.present()
            .map(|(p, v)| (p.key().to_string(), v.to_string()))
            .collect()
    }
}

/// Custom (non-standard) query parameters, kept verbatim
pub type CustomParams = BTreeMap<String, String>;

/// Result of parsing an entry URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub marketing: MarketingParams,
    pub custom: CustomParams,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.marketing.is_empty() && self.custom.is_empty()
    }
}

/// Parse marketing and custom parameters from a full URL
///
/// Known keys take their first occurrence (an empty first occurrence leaves
/// the key absent); custom keys take their last occurrence. Only the query
/// component before any `#` fragment is considered, so hash-routed URLs such
/// as `https://site/?utm_source=fb#/quiz2` parse as expected.
pub fn parse_url(url: &str) -> ParsedQuery {
    match Url::parse(url) {
        Ok(parsed) => parse_pairs(parsed.query_pairs()),
        Err(e) => {
            debug!("Entry URL not parseable ({}), no parameters captured", e);
            ParsedQuery::default()
        }
    }
}

/// Parse a bare query string (with or without a leading `?`)
pub fn parse_query(query: &str) -> ParsedQuery {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut base = match Url::parse("http://localhost/") {
        Ok(url) => url,
        Err(_) => return ParsedQuery::default(),
    };
    base.set_query(Some(query));
    parse_pairs(base.query_pairs())
}

fn parse_pairs<'a, I>(pairs: I) -> ParsedQuery
where
    I: Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
{
    let mut parsed = ParsedQuery::default();
    let mut seen = Vec::with_capacity(MarketingParam::ALL.len());

    for (key, value) in pairs {
        match MarketingParam::from_key(&key) {
            Some(param) => {
                if !seen.contains(&param) {
                    seen.push(param);
                    parsed.marketing.set(param, value.into_owned());
                }
            }
            None => {
                parsed.custom.insert(key.into_owned(), value.into_owned());
            }
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip_for_every_param() {
        for param in MarketingParam::ALL {
            assert_eq!(MarketingParam::from_key(param.key()), Some(param));
        }
        assert_eq!(MarketingParam::from_key("utm_id"), None);
    }

    #[test]
    fn test_click_ids() {
        assert!(MarketingParam::Gclid.is_click_id());
        assert!(MarketingParam::Ttclid.is_click_id());
        assert!(!MarketingParam::UtmTerm.is_click_id());
    }

    #[test]
    fn test_parse_known_and_custom() {
        let parsed = parse_url("https://funnel.example/?utm_source=fb&utm_campaign=spring&extra=1");
        assert_eq!(parsed.marketing.get(MarketingParam::UtmSource), Some("fb"));
        assert_eq!(parsed.marketing.get(MarketingParam::UtmCampaign), Some("spring"));
        assert_eq!(parsed.marketing.get(MarketingParam::UtmMedium), None);
        assert_eq!(parsed.custom.get("extra").map(String::as_str), Some("1"));
        assert_eq!(parsed.custom.len(), 1);
    }

    #[test]
    fn test_empty_known_value_is_absent() {
        let parsed = parse_url("https://funnel.example/?utm_source=&gclid=abc");
        assert_eq!(parsed.marketing.get(MarketingParam::UtmSource), None);
        assert_eq!(parsed.marketing.get(MarketingParam::Gclid), Some("abc"));
        assert_eq!(parsed.marketing.len(), 1);
    }

    #[test]
    fn test_empty_custom_value_is_kept() {
        let parsed = parse_query("ref=");
        assert_eq!(parsed.custom.get("ref").map(String::as_str), Some(""));
    }

    #[test]
    fn test_duplicate_keys() {
        let parsed = parse_query("?utm_source=first&utm_source=second&x=1&x=2");
        assert_eq!(parsed.marketing.get(MarketingParam::UtmSource), Some("first"));
        assert_eq!(parsed.custom.get("x").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_hash_routed_url_uses_query_before_fragment() {
        let parsed = parse_url("https://funnel.example/?fbclid=xyz#/quiz2?utm_source=ignored");
        assert_eq!(parsed.marketing.get(MarketingParam::Fbclid), Some("xyz"));
        assert_eq!(parsed.marketing.get(MarketingParam::UtmSource), None);
    }

    #[test]
    fn test_percent_and_plus_decoding() {
        let parsed = parse_query("utm_term=hello+world&utm_content=a%26b");
        assert_eq!(parsed.marketing.get(MarketingParam::UtmTerm), Some("hello world"));
        assert_eq!(parsed.marketing.get(MarketingParam::UtmContent), Some("a&b"));
    }

    #[test]
    fn test_malformed_url_yields_nothing() {
        assert!(parse_url("::not a url::").is_empty());
        assert!(parse_url("").is_empty());
    }

    #[test]
    fn test_all_lists_absent_explicitly() {
        let params = MarketingParams::new().with(MarketingParam::UtmMedium, "email");
        let all: Vec<_> = params.all().collect();
        assert_eq!(all.len(), 8);
        assert_eq!(all[0], (MarketingParam::UtmSource, None));
        assert_eq!(all[1], (MarketingParam::UtmMedium, Some("email")));
    }

    #[test]
    fn test_set_empty_removes() {
        let mut params = MarketingParams::new().with(MarketingParam::Gclid, "g");
        params.set(MarketingParam::Gclid, "");
        assert!(params.is_empty());
    }
}
