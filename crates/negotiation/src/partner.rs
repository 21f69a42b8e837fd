use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Liveness of one standby partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartnerStatus {
    pub service_id: String,
    pub last_notification: DateTime<Utc>,
    pub alive: bool,
}

/// Peers that announced themselves as standby, keyed by service id.
#[derive(Debug, Clone, Default)]
pub struct StandbyPartners {
    partners: BTreeMap<String, DateTime<Utc>>,
}

impl StandbyPartners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or refresh a partner on an `IAmStandby`.
    pub fn record(&mut self, service_id: &str, now: DateTime<Utc>) -> bool {
        self.partners.insert(service_id.to_string(), now).is_none()
    }

    pub fn remove(&mut self, service_id: &str) -> bool {
        self.partners.remove(service_id).is_some()
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.partners.contains_key(service_id)
    }

    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    pub fn clear(&mut self) {
        self.partners.clear();
    }

    fn is_alive(last: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
        now.signed_duration_since(last) <= timeout
    }

    /// Partners not refreshed within `timeout`.
    pub fn dead(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        self.partners
            .iter()
            .filter(|(_, last)| !Self::is_alive(**last, now, timeout))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Drop dead partners, returning their ids.
    pub fn prune(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let dead = self.dead(now, timeout);
        for id in &dead {
            self.partners.remove(id);
        }
        dead
    }

    pub fn statuses(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<PartnerStatus> {
        self.partners
            .iter()
            .map(|(id, last)| PartnerStatus {
                service_id: id.clone(),
                last_notification: *last,
                alive: Self::is_alive(*last, now, timeout),
            })
            .collect()
    }
}
