//! Attribution capture: storage, reconciliation and the shared snapshot
//!
//! On start-up the parameters parsed from the entry URL are reconciled with
//! the ones captured on earlier runs:
//! - per known key, a URL value wins, otherwise the stored value is reused
//! - the URL-derived known parameters are persisted (never the merged result)
//! - custom parameters accumulate additively across runs
//!
//! A URL without known parameters leaves the stored known parameters alone,
//! so repeated starts without parameters are no-ops on storage.

use crate::params::{CustomParams, MarketingParam, MarketingParams, ParsedQuery};
use funnel_common::{Error, KeyValueStore, Result};
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Durable key holding the known parameters (JSON object, absent keys omitted)
pub const MARKETING_PARAMS_KEY: &str = "funnel_marketing_params";

/// Durable key holding custom parameters (JSON object, additively merged)
pub const CUSTOM_PARAMS_KEY: &str = "funnel_custom_params";

/// Event property under which custom parameters are nested
pub const CUSTOM_PARAMS_PROPERTY: &str = "custom_params";

/// Merge URL parameters over stored ones, key by key
///
/// For each known parameter the URL value is used when present, otherwise
/// the stored value (which may itself be absent).
pub fn reconcile(url: &MarketingParams, stored: &MarketingParams) -> MarketingParams {
    let mut merged = MarketingParams::new();
    for param in MarketingParam::ALL {
        if let Some(value) = url.get(param).or_else(|| stored.get(param)) {
            merged.set(param, value);
        }
    }
    merged
}

/// Attribution as seen by the event tracker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributionSnapshot {
    pub marketing: MarketingParams,
    pub custom: CustomParams,
}

impl AttributionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.marketing.is_empty() && self.custom.is_empty()
    }

    /// Event/user properties: present known parameters at top level, custom
    /// parameters nested under `custom_params` when there are any
    pub fn to_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        for (param, value) in self.marketing.present() {
            props.insert(param.key().to_string(), Value::String(value.to_string()));
        }
        if !self.custom.is_empty() {
            let custom: Map<String, Value> = self
                .custom
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            props.insert(CUSTOM_PARAMS_PROPERTY.to_string(), Value::Object(custom));
        }
        props
    }

    /// Every known key (absent as `null`) plus the custom map
    pub fn to_json(&self) -> Value {
        let known: Map<String, Value> = self
            .marketing
            .all()
            .map(|(param, value)| {
                let value = value.map_or(Value::Null, |v| Value::String(v.to_string()));
                (param.key().to_string(), value)
            })
            .collect();
        serde_json::json!({
            "marketing_params": known,
            "custom_params": self.custom,
        })
    }
}

/// Persistent attribution area on top of a durable key-value store
#[derive(Clone)]
pub struct AttributionStore {
    store: Arc<dyn KeyValueStore>,
}

impl AttributionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored known parameters; unreadable data counts as none stored
    pub fn load_marketing(&self) -> MarketingParams {
        let mut params = MarketingParams::new();
        if let Some(object) = self.load_object(MARKETING_PARAMS_KEY) {
            for param in MarketingParam::ALL {
                if let Some(Value::String(value)) = object.get(param.key()) {
                    params.set(param, value.as_str());
                }
            }
        }
        params
    }

    /// Stored custom parameters; unreadable data counts as none stored
    pub fn load_custom(&self) -> CustomParams {
        self.load_object(CUSTOM_PARAMS_KEY)
            .map(|object| {
                object
                    .into_iter()
                    .map(|(k, v)| match v {
                        Value::String(s) => (k, s),
                        other => (k, other.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current stored state as a snapshot (no URL merge)
    pub fn load(&self) -> AttributionSnapshot {
        AttributionSnapshot {
            marketing: self.load_marketing(),
            custom: self.load_custom(),
        }
    }

    /// Persist URL-derived parameters
    ///
    /// Known parameters replace the stored blob only when the URL supplied at
    /// least one; custom parameters are merged into the stored ones.
    pub fn save(&self, url: &ParsedQuery) -> Result<()> {
        if !url.marketing.is_empty() {
            let blob = serde_json::to_string(&url.marketing.to_key_map())?;
            self.store.set(MARKETING_PARAMS_KEY, &blob)?;
        }
        if !url.custom.is_empty() {
            let mut custom = self.load_custom();
            custom.extend(url.custom.iter().map(|(k, v)| (k.clone(), v.clone())));
            self.store
                .set(CUSTOM_PARAMS_KEY, &serde_json::to_string(&custom)?)?;
        }
        Ok(())
    }

    /// Reconcile URL parameters with stored ones, persist, and return the merged snapshot
    ///
    /// Storage failures are logged; the returned snapshot still reflects the merge.
    pub fn reconcile_and_persist(&self, url: &ParsedQuery) -> AttributionSnapshot {
        let stored = self.load();
        let marketing = reconcile(&url.marketing, &stored.marketing);

        let mut custom = stored.custom;
        custom.extend(url.custom.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Err(e) = self.save(url) {
            warn!("Failed to persist marketing params: {}", e);
        }

        debug!(
            url_params = url.marketing.len(),
            url_custom = url.custom.len(),
            merged_params = marketing.len(),
            custom_params = custom.len(),
            "Attribution reconciled"
        );

        AttributionSnapshot { marketing, custom }
    }

    /// Remove all stored attribution
    pub fn clear(&self) -> Result<()> {
        self.store.remove(MARKETING_PARAMS_KEY)?;
        self.store.remove(CUSTOM_PARAMS_KEY)?;
        Ok(())
    }

    fn load_object(&self, key: &str) -> Option<Map<String, Value>> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read {} from storage: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(object)) => Some(object),
            Ok(_) => {
                warn!("Stored {} is not a JSON object, ignoring it", key);
                None
            }
            Err(e) => {
                warn!("Failed to parse {} from storage: {}", key, e);
                None
            }
        }
    }
}

/// Shared attribution handle
///
/// Holds the snapshot computed once at start-up. Only [`initialize`] and
/// [`reset`] write it; the tracker reads it for every event.
///
/// [`initialize`]: Attribution::initialize
/// [`reset`]: Attribution::reset
pub struct Attribution {
    store: AttributionStore,
    snapshot: RwLock<AttributionSnapshot>,
}

impl Attribution {
    pub fn new(store: AttributionStore) -> Self {
        Self {
            store,
            snapshot: RwLock::new(AttributionSnapshot::default()),
        }
    }

    /// Reconcile the entry URL's parameters and publish the merged snapshot
    pub fn initialize(&self, url: &ParsedQuery) -> Result<AttributionSnapshot> {
        let snapshot = self.store.reconcile_and_persist(url);
        info!(
            "Attribution initialized: {} marketing params, {} custom params",
            snapshot.marketing.len(),
            snapshot.custom.len()
        );
        *self
            .snapshot
            .write()
            .map_err(|_| Error::Internal("attribution lock poisoned".to_string()))? =
            snapshot.clone();
        Ok(snapshot)
    }

    pub fn snapshot(&self) -> AttributionSnapshot {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Clear stored and in-memory attribution
    pub fn reset(&self) -> Result<()> {
        self.store.clear()?;
        *self
            .snapshot
            .write()
            .map_err(|_| Error::Internal("attribution lock poisoned".to_string()))? =
            AttributionSnapshot::default();
        info!("Attribution reset");
        Ok(())
    }

    pub fn store(&self) -> &AttributionStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::parse_url;
    use funnel_common::MemoryStore;

    fn store() -> (Arc<MemoryStore>, AttributionStore) {
        let backing = Arc::new(MemoryStore::new());
        let store = AttributionStore::new(backing.clone());
        (backing, store)
    }

    fn full(value: &str) -> MarketingParams {
        let mut params = MarketingParams::new();
        for param in MarketingParam::ALL {
            params.set(param, format!("{}-{}", value, param.key()));
        }
        params
    }

    #[test]
    fn test_url_value_wins_for_every_key() {
        let merged = reconcile(&full("url"), &full("stored"));
        for param in MarketingParam::ALL {
            assert_eq!(merged.get(param), Some(format!("url-{}", param.key()).as_str()));
        }
    }

    #[test]
    fn test_stored_value_used_when_url_omits_it() {
        let merged = reconcile(&MarketingParams::new(), &full("stored"));
        for param in MarketingParam::ALL {
            assert_eq!(merged.get(param), Some(format!("stored-{}", param.key()).as_str()));
        }
    }

    #[test]
    fn test_precedence_is_per_key() {
        let url = MarketingParams::new().with(MarketingParam::UtmSource, "new");
        let stored = MarketingParams::new()
            .with(MarketingParam::UtmSource, "old")
            .with(MarketingParam::UtmCampaign, "spring");
        let merged = reconcile(&url, &stored);
        assert_eq!(merged.get(MarketingParam::UtmSource), Some("new"));
        assert_eq!(merged.get(MarketingParam::UtmCampaign), Some("spring"));
    }

    #[test]
    fn test_empty_inputs_give_all_absent() {
        let merged = reconcile(&MarketingParams::new(), &MarketingParams::new());
        assert!(merged.all().all(|(_, v)| v.is_none()));
    }

    #[test]
    fn test_empty_url_is_noop_on_storage() {
        let (backing, store) = store();
        store.reconcile_and_persist(&ParsedQuery::default());
        store.reconcile_and_persist(&ParsedQuery::default());
        assert!(backing.is_empty());

        store.reconcile_and_persist(&parse_url("https://f.example/?utm_source=fb&x=1"));
        let before_marketing = backing.get(MARKETING_PARAMS_KEY).unwrap();
        let before_custom = backing.get(CUSTOM_PARAMS_KEY).unwrap();

        store.reconcile_and_persist(&ParsedQuery::default());
        store.reconcile_and_persist(&ParsedQuery::default());
        assert_eq!(backing.get(MARKETING_PARAMS_KEY).unwrap(), before_marketing);
        assert_eq!(backing.get(CUSTOM_PARAMS_KEY).unwrap(), before_custom);
    }

    #[test]
    fn test_full_url_overwrites_known_but_keeps_other_custom() {
        let (_backing, store) = store();
        store.reconcile_and_persist(&parse_url("https://f.example/?utm_source=a&keep=me"));

        let url = ParsedQuery {
            marketing: full("new"),
            custom: CustomParams::from([("other".to_string(), "1".to_string())]),
        };
        store.reconcile_and_persist(&url);

        assert_eq!(store.load_marketing(), full("new"));
        let custom = store.load_custom();
        assert_eq!(custom.get("keep").map(String::as_str), Some("me"));
        assert_eq!(custom.get("other").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_custom_params_accumulate() {
        let (_backing, store) = store();
        store.reconcile_and_persist(&parse_url("https://f.example/?a=1"));
        let snapshot = store.reconcile_and_persist(&parse_url("https://f.example/?b=2"));

        let expected = CustomParams::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert_eq!(store.load_custom(), expected);
        assert_eq!(snapshot.custom, expected);
    }

    #[test]
    fn test_corrupt_storage_reads_as_empty() {
        let (backing, store) = store();
        backing.set(MARKETING_PARAMS_KEY, "{oops").unwrap();
        backing.set(CUSTOM_PARAMS_KEY, "[1,2]").unwrap();

        assert!(store.load_marketing().is_empty());
        assert!(store.load_custom().is_empty());

        // Still reconciles from the URL
        let snapshot = store.reconcile_and_persist(&parse_url("https://f.example/?gclid=g"));
        assert_eq!(snapshot.marketing.get(MarketingParam::Gclid), Some("g"));
    }

    #[test]
    fn test_stored_empty_and_non_string_values_are_absent() {
        let (backing, store) = store();
        backing
            .set(MARKETING_PARAMS_KEY, r#"{"utm_source":"","utm_medium":7,"gclid":"g","junk":"x"}"#)
            .unwrap();
        let params = store.load_marketing();
        assert_eq!(params.get(MarketingParam::UtmSource), None);
        assert_eq!(params.get(MarketingParam::UtmMedium), None);
        assert_eq!(params.get(MarketingParam::Gclid), Some("g"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_properties_nest_custom_params() {
        let snapshot = AttributionSnapshot {
            marketing: MarketingParams::new().with(MarketingParam::UtmSource, "fb"),
            custom: CustomParams::from([("extra".to_string(), "1".to_string())]),
        };
        let props = snapshot.to_properties();
        assert_eq!(props["utm_source"], "fb");
        assert_eq!(props["custom_params"]["extra"], "1");
        assert!(!props.contains_key("utm_medium"));
    }

    #[test]
    fn test_properties_omit_empty_custom() {
        let props = AttributionSnapshot::default().to_properties();
        assert!(props.is_empty());
    }

    #[test]
    fn test_to_json_lists_absent_as_null() {
        let json = AttributionSnapshot::default().to_json();
        assert!(json["marketing_params"]["utm_term"].is_null());
        assert_eq!(json["marketing_params"].as_object().unwrap().len(), 8);
    }

    #[test]
    fn test_attribution_handle_initialize_and_reset() {
        let (backing, store) = store();
        let attribution = Attribution::new(store);
        assert!(attribution.snapshot().is_empty());

        attribution
            .initialize(&parse_url("https://f.example/?utm_medium=email&z=9"))
            .unwrap();
        assert_eq!(
            attribution.snapshot().marketing.get(MarketingParam::UtmMedium),
            Some("email")
        );

        attribution.reset().unwrap();
        assert!(attribution.snapshot().is_empty());
        assert!(backing.is_empty());
    }
}
