use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::Platform;
use super::book::Side;

/// Venue-local addressing for one (event, outcome, venue).
///
/// Opaque to everything but the venue adapter: Limitless addresses markets by
/// slug, Polymarket and Opinion by per-side token id, Opinion additionally
/// needs a numeric market id when placing orders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no: Option<String>,
}

impl RoutingKey {
    pub fn token_for(&self, side: Side) -> Option<&str> {
        match side {
            Side::Yes => self.yes.as_deref(),
            Side::No => self.no.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub title: String,
    /// outcome name -> venue -> routing key
    pub outcomes: HashMap<String, HashMap<Platform, RoutingKey>>,
}

/// Immutable event catalog loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    events: HashMap<String, Event>,
}

impl EventCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading event catalog {}", path.display()))?;
        let events: HashMap<String, Event> =
            serde_json::from_str(&raw).context("parsing event catalog")?;
        Ok(EventCatalog { events })
    }

    pub fn get(&self, event_id: &str) -> Option<&Event> {
        self.events.get(event_id)
    }

    pub fn routing_key(
        &self,
        event_id: &str,
        outcome: &str,
        platform: Platform,
    ) -> Option<&RoutingKey> {
        self.events
            .get(event_id)?
            .outcomes
            .get(outcome)?
            .get(&platform)
    }

    /// Which venues carry each outcome of an event. Powers `/api/event-platforms`.
    pub fn platforms_for(&self, event_id: &str) -> HashMap<String, Vec<Platform>> {
        let Some(event) = self.events.get(event_id) else {
            return HashMap::new();
        };
        event
            .outcomes
            .iter()
            .map(|(outcome, venues)| {
                let mut platforms: Vec<Platform> = venues.keys().copied().collect();
                platforms.sort();
                (outcome.clone(), platforms)
            })
            .collect()
    }

    /// Assemble a catalog in memory; tests and tools use this in place of
    /// a file load.
    pub fn from_events(events: HashMap<String, Event>) -> Self {
        EventCatalog { events }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> EventCatalog {
        let raw = r#"{
            "nba-finals-g1": {
                "title": "NBA Finals Game 1",
                "outcomes": {
                    "home": {
                        "polymarket": {"yes": "111", "no": "222"},
                        "limitless": {"market": "nba-g1-home"}
                    },
                    "away": {
                        "opinion": {"market": "5012", "yes": "901", "no": "902"}
                    }
                }
            }
        }"#;
        let events = serde_json::from_str(raw).unwrap();
        EventCatalog::from_events(events)
    }

    #[test]
    fn routing_keys_resolve_per_venue() {
        let cat = catalog();
        let key = cat
            .routing_key("nba-finals-g1", "home", Platform::Polymarket)
            .unwrap();
        assert_eq!(key.token_for(Side::Yes), Some("111"));
        assert_eq!(key.token_for(Side::No), Some("222"));

        let slug = cat
            .routing_key("nba-finals-g1", "home", Platform::Limitless)
            .unwrap();
        assert_eq!(slug.market.as_deref(), Some("nba-g1-home"));
        assert!(slug.token_for(Side::Yes).is_none());
    }

    #[test]
    fn platforms_for_lists_venues_per_outcome() {
        let cat = catalog();
        let map = cat.platforms_for("nba-finals-g1");
        assert_eq!(
            map["home"],
            vec![Platform::Polymarket, Platform::Limitless]
        );
        assert_eq!(map["away"], vec![Platform::Opinion]);
        assert!(cat.platforms_for("missing").is_empty());
    }
}
