use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::model::PREFERENCE_SLOTS;

/// Search criteria selectors exposed by the booking form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Criterion {
    Date,
    Facility,
    FacilityType,
    Session,
    Area,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Date,
        Criterion::Facility,
        Criterion::FacilityType,
        Criterion::Session,
        Criterion::Area,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Facility => "facility",
            Self::FacilityType => "facilityType",
            Self::Session => "session",
            Self::Area => "area",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Criterion {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().replace(['-', '_'], "").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|criterion| criterion.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown search criterion: {raw}. expected one of: date, facility, facility-type, session, area"
                )
            })
    }
}

/// A `<select>` element of the booking form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorId {
    Criterion(Criterion),
    /// Venue input of preference slot `0..PREFERENCE_SLOTS`.
    Venue(usize),
    /// Location (building) input of preference slot `0..PREFERENCE_SLOTS`.
    Location(usize),
}

impl SelectorId {
    pub fn venue_slots() -> impl Iterator<Item = SelectorId> {
        (0..PREFERENCE_SLOTS).map(SelectorId::Venue)
    }
}

impl fmt::Display for SelectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Criterion(criterion) => write!(f, "{criterion}"),
            Self::Venue(slot) => write!(f, "preference{}.venue", slot + 1),
            Self::Location(slot) => write!(f, "preference{}.location", slot + 1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectOption {
    pub display: String,
    pub value: String,
}

impl SelectOption {
    pub fn new(display: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            value: value.into(),
        }
    }
}

/// Option lists of every criteria selector, keyed by criterion.
pub type SearchCriteria = BTreeMap<Criterion, Vec<SelectOption>>;

/// Selected value per criterion.
pub type CriteriaSelection = BTreeMap<Criterion, String>;

/// The stateful booking form the engine drives.
///
/// Every operation reflects the live state of the host; option lists in
/// particular are repopulated asynchronously after `notify_change`.
#[async_trait]
pub trait BookingForm: Send + Sync {
    /// Whether the host document, results area and criteria inputs exist.
    async fn is_loaded(&self) -> anyhow::Result<bool>;

    async fn options(&self, selector: SelectorId) -> anyhow::Result<Vec<SelectOption>>;

    async fn value(&self, selector: SelectorId) -> anyhow::Result<String>;

    async fn set_value(&self, selector: SelectorId, value: &str) -> anyhow::Result<()>;

    /// Fires the host's change handler for `selector`.
    async fn notify_change(&self, selector: SelectorId) -> anyhow::Result<()>;

    async fn submit(&self) -> anyhow::Result<()>;

    /// Markup of the currently rendered results table, detached from the
    /// live document. `None` when the results area has no table.
    async fn results_table(&self) -> anyhow::Result<Option<String>>;

    fn mutations(&self) -> &MutationSignal;

    fn criteria_changes(&self) -> &ChangeSignal;
}

/// Records whether the results area changed since the last `clear`.
#[derive(Debug)]
pub struct MutationSignal {
    mutated: watch::Sender<bool>,
}

impl Default for MutationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationSignal {
    pub fn new() -> Self {
        let (mutated, _) = watch::channel(false);
        Self { mutated }
    }

    pub fn notify_mutated(&self) {
        self.mutated.send_replace(true);
    }

    pub fn clear(&self) {
        self.mutated.send_replace(false);
    }

    pub fn is_mutated(&self) -> bool {
        *self.mutated.borrow()
    }
}

/// Edge-triggered notification that some option list was repopulated.
#[derive(Debug)]
pub struct ChangeSignal {
    generation: watch::Sender<u64>,
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSignal {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self { generation }
    }

    pub fn notify(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criterion_parses_cli_spellings() {
        assert_eq!("facility-type".parse::<Criterion>().unwrap(), Criterion::FacilityType);
        assert_eq!("facilityType".parse::<Criterion>().unwrap(), Criterion::FacilityType);
        assert_eq!(" AREA ".parse::<Criterion>().unwrap(), Criterion::Area);
        let err = "venue".parse::<Criterion>().unwrap_err().to_string();
        assert!(err.contains("unknown search criterion"));
    }

    #[test]
    fn criterion_serializes_camel_case() {
        let json = serde_json::to_string(&Criterion::FacilityType).unwrap();
        assert_eq!(json, r#""facilityType""#);
    }

    #[test]
    fn selector_display_names_preference_slots() {
        assert_eq!(SelectorId::Venue(0).to_string(), "preference1.venue");
        assert_eq!(SelectorId::Location(2).to_string(), "preference3.location");
    }

    #[test]
    fn mutation_signal_is_level_triggered_until_cleared() {
        let signal = MutationSignal::new();
        assert!(!signal.is_mutated());

        signal.notify_mutated();
        signal.notify_mutated();
        assert!(signal.is_mutated());

        signal.clear();
        assert!(!signal.is_mutated());
    }

    #[tokio::test]
    async fn change_signal_bumps_generation() {
        let signal = ChangeSignal::new();
        let mut rx = signal.subscribe();
        signal.notify();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}
