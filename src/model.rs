use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Number of venue preference inputs exposed by the booking form.
pub const PREFERENCE_SLOTS: usize = 3;

/// Identifier of a bookable time window, scoped to one rendered table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotKey(String);

impl SlotKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Header text shown to users; hosts append `|`-separated suffixes to
    /// keep otherwise identical column labels distinct.
    pub fn label(&self) -> &str {
        self.0.split('|').next().unwrap_or_default()
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SlotKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SlotKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Pricing {
    Peak,
    NonPeak,
    #[default]
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotRecord {
    /// Cell text as rendered; empty means the slot is open.
    pub status: String,
    pub pricing: Pricing,
}

impl SlotRecord {
    pub fn is_open(&self) -> bool {
        self.status.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationRecord {
    pub name: String,
    pub slots: IndexMap<SlotKey, SlotRecord>,
}

impl LocationRecord {
    pub fn slot_keys(&self) -> impl Iterator<Item = &SlotKey> {
        self.slots.keys()
    }
}

pub type CourtRecord = LocationRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VenueRecord {
    #[serde(flatten)]
    pub location: LocationRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub courts: Vec<CourtRecord>,
}

impl VenueRecord {
    pub fn new(location: LocationRecord) -> Self {
        Self {
            location,
            courts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.location.name
    }

    pub fn slots(&self) -> &IndexMap<SlotKey, SlotRecord> {
        &self.location.slots
    }
}

/// Accumulated outcome of one search run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregatedResult {
    pub venues: Vec<VenueRecord>,
    pub slot_keys: Vec<SlotKey>,
    pub batches: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AggregatedResult {
    pub fn completed(self, at: DateTime<Utc>) -> Self {
        Self {
            completed_at: Some(at),
            ..self
        }
    }
}

/// Venues submitted together in one round of the booking form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenuePreferenceBatch {
    venues: Vec<String>,
}

impl VenuePreferenceBatch {
    pub fn new(venues: Vec<String>) -> Result<Self, SearchError> {
        if venues.is_empty() || venues.len() > PREFERENCE_SLOTS {
            return Err(SearchError::malformed(format!(
                "preference batch must hold 1..={PREFERENCE_SLOTS} venues, got {}",
                venues.len()
            )));
        }
        Ok(Self { venues })
    }

    /// Takes the next batch from the front of `queue`, or `None` once it is empty.
    pub fn take_from(queue: &mut std::collections::VecDeque<String>) -> Option<Self> {
        let len = queue.len().min(PREFERENCE_SLOTS);
        // An empty queue drains into an empty batch, which `new` rejects.
        Self::new(queue.drain(..len).collect()).ok()
    }

    pub fn venues(&self) -> &[String] {
        &self.venues
    }

    /// Venue per preference slot, `None` for slots left unused.
    pub fn assignments(&self) -> impl Iterator<Item = Option<&str>> {
        (0..PREFERENCE_SLOTS).map(|slot| self.venues.get(slot).map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[test]
    fn slot_key_label_drops_suffix() {
        assert_eq!(SlotKey::new("07:00-08:00|2").label(), "07:00-08:00");
        assert_eq!(SlotKey::new("07:00-08:00").label(), "07:00-08:00");
    }

    #[test]
    fn batch_rejects_empty_and_oversized() {
        assert!(VenuePreferenceBatch::new(Vec::new()).is_err());
        let four = ["a", "b", "c", "d"].map(str::to_owned).to_vec();
        assert!(VenuePreferenceBatch::new(four).is_err());
    }

    #[test]
    fn take_from_drains_in_queue_order() {
        let mut queue: VecDeque<String> = ["a", "b", "c", "d"].map(str::to_owned).into();
        let first = VenuePreferenceBatch::take_from(&mut queue).unwrap();
        assert_eq!(first.venues(), ["a", "b", "c"]);
        let second = VenuePreferenceBatch::take_from(&mut queue).unwrap();
        assert_eq!(
            second.assignments().collect::<Vec<_>>(),
            vec![Some("d"), None, None]
        );
        assert!(VenuePreferenceBatch::take_from(&mut queue).is_none());
    }

    #[test]
    fn take_from_builds_validated_batches() {
        let mut queue: VecDeque<String> = (1..=7).map(|i| format!("V{i}")).collect();
        let mut sizes = Vec::new();
        while let Some(batch) = VenuePreferenceBatch::take_from(&mut queue) {
            assert_eq!(
                VenuePreferenceBatch::new(batch.venues().to_vec()).unwrap(),
                batch
            );
            sizes.push(batch.venues().len());
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn venue_serializes_flat_with_courts() {
        let venue = VenueRecord::new(LocationRecord {
            name: "Harbour Road".to_owned(),
            slots: IndexMap::new(),
        });
        let json = serde_json::to_value(&venue).unwrap();
        assert_eq!(json["name"], "Harbour Road");
        assert!(json.get("courts").is_none());
    }
}
