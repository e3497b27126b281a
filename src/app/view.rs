//! Presentation state and the schedule projection derived from it.
//!
//! [`SearchView`] is never mutated in place: every update returns a new value.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{self, VenueFilter};
use crate::form::{CriteriaSelection, Criterion, SearchCriteria, SelectOption};
use crate::model::{AggregatedResult, LocationRecord, Pricing, SlotKey, VenueRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchView {
    criteria: SearchCriteria,
    selection: CriteriaSelection,
    filters: Vec<VenueFilter>,
    result: Option<AggregatedResult>,
}

impl SearchView {
    /// Replaces the option lists named in `update`; criteria left out keep
    /// their previous options. A criterion with a single option gets it
    /// selected.
    pub fn with_criteria(&self, update: SearchCriteria) -> Self {
        let mut criteria = self.criteria.clone();
        criteria.extend(update);

        let mut selection = self.selection.clone();
        for (&criterion, options) in &criteria {
            if let [only] = options.as_slice() {
                selection.insert(criterion, only.value.clone());
            }
        }

        Self {
            criteria,
            selection,
            ..self.clone()
        }
    }

    pub fn with_selection(&self, criterion: Criterion, value: impl Into<String>) -> Self {
        let mut selection = self.selection.clone();
        selection.insert(criterion, value.into());
        Self {
            selection,
            ..self.clone()
        }
    }

    pub fn with_bookable_only(&self, bookable_only: bool) -> Self {
        let filters = if bookable_only {
            vec![VenueFilter::Bookable]
        } else {
            Vec::new()
        };
        Self {
            filters,
            ..self.clone()
        }
    }

    pub fn with_result(&self, result: AggregatedResult) -> Self {
        Self {
            result: Some(result),
            ..self.clone()
        }
    }

    pub fn selection(&self) -> &CriteriaSelection {
        &self.selection
    }

    pub fn result(&self) -> Option<&AggregatedResult> {
        self.result.as_ref()
    }

    /// Options of `criterion` in display order.
    ///
    /// Area lists keep their leading entry and show the rest reversed.
    pub fn options(&self, criterion: Criterion) -> Vec<SelectOption> {
        let mut options = self.criteria.get(&criterion).cloned().unwrap_or_default();
        if criterion == Criterion::Area && options.len() > 2 {
            options[1..].reverse();
        }
        options
    }

    /// Non-empty criteria in selector order, each with its display-ordered
    /// options and current selection, alongside the schedule projection.
    pub fn report(&self) -> SearchReport {
        let criteria = Criterion::ALL
            .into_iter()
            .map(|criterion| CriterionChoices {
                criterion,
                options: self.options(criterion),
                selected: self.selection.get(&criterion).cloned(),
            })
            .filter(|choices| !choices.options.is_empty())
            .collect();
        SearchReport {
            criteria,
            schedule: self.project(),
        }
    }

    pub fn project(&self) -> ScheduleProjection {
        let Some(result) = &self.result else {
            return ScheduleProjection::default();
        };

        let venues = aggregate::apply_filters(&result.venues, &self.filters);
        let keys = venues
            .iter()
            .map(|venue| venue.slots().keys().collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let mut slot_keys = aggregate::aggregate_keys(keys);
        slot_keys.sort();

        let slots = slot_keys
            .iter()
            .map(|key| SlotColumn {
                key: key.clone(),
                label: key.label().to_owned(),
            })
            .collect();
        let venues = venues
            .iter()
            .map(|venue| VenueRow::project(venue, &slot_keys))
            .collect();

        ScheduleProjection {
            slots,
            venues,
            completed_at: result.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchReport {
    pub criteria: Vec<CriterionChoices>,
    pub schedule: ScheduleProjection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriterionChoices {
    pub criterion: Criterion,
    pub options: Vec<SelectOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleProjection {
    pub slots: Vec<SlotColumn>,
    pub venues: Vec<VenueRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScheduleProjection {
    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotColumn {
    pub key: SlotKey,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VenueRow {
    #[serde(flatten)]
    pub row: LocationRow,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub courts: Vec<LocationRow>,
}

impl VenueRow {
    fn project(venue: &VenueRecord, slot_keys: &[SlotKey]) -> Self {
        Self {
            row: LocationRow::project(&venue.location, slot_keys),
            courts: venue
                .courts
                .iter()
                .map(|court| LocationRow::project(court, slot_keys))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationRow {
    pub name: String,
    pub cells: Vec<SlotCell>,
}

impl LocationRow {
    fn project(location: &LocationRecord, slot_keys: &[SlotKey]) -> Self {
        let cells = slot_keys
            .iter()
            .map(|key| match location.slots.get(key) {
                Some(slot) => SlotCell {
                    pricing: PricingClass::from(slot.pricing),
                    availability: if slot.is_open() {
                        Availability::Available
                    } else {
                        Availability::Unavailable
                    },
                },
                None => SlotCell::MISSING,
            })
            .collect();
        Self {
            name: location.name.clone(),
            cells,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotCell {
    pub pricing: PricingClass,
    pub availability: Availability,
}

impl SlotCell {
    const MISSING: Self = Self {
        pricing: PricingClass::SlotDisabled,
        availability: Availability::Unavailable,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PricingClass {
    SlotPeak,
    SlotNonPeak,
    SlotDisabled,
}

impl From<Pricing> for PricingClass {
    fn from(pricing: Pricing) -> Self {
        match pricing {
            Pricing::Peak => Self::SlotPeak,
            Pricing::NonPeak => Self::SlotNonPeak,
            Pricing::Disabled => Self::SlotDisabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable,
}
