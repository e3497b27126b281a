use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::{AggregatedResult, SlotKey, VenueRecord};

/// Union of key sequences in first-seen order.
///
/// Ordering is left untouched: sorting for display happens in the view.
pub fn aggregate_keys<'a, S, I>(sequences: S) -> Vec<SlotKey>
where
    S: IntoIterator<Item = I>,
    I: IntoIterator<Item = &'a SlotKey>,
{
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for key in sequences.into_iter().flatten() {
        if seen.insert(key) {
            keys.push(key.clone());
        }
    }
    keys
}

/// Folds one parsed batch into `existing`, returning the new state.
///
/// Venues are appended as-is; a venue seen in two batches is kept twice.
pub fn merge_results(existing: &AggregatedResult, new_venues: Vec<VenueRecord>) -> AggregatedResult {
    let batch_keys = new_venues
        .iter()
        .flat_map(|venue| {
            venue
                .location
                .slot_keys()
                .chain(venue.courts.iter().flat_map(|court| court.slot_keys()))
        })
        .collect::<Vec<_>>();
    let slot_keys = aggregate_keys([existing.slot_keys.iter().collect::<Vec<_>>(), batch_keys]);

    let mut venues = existing.venues.clone();
    venues.extend(new_venues);

    AggregatedResult {
        venues,
        slot_keys,
        batches: existing.batches + 1,
        completed_at: None,
    }
}

pub fn filter<P>(venues: &[VenueRecord], predicate: P) -> Vec<VenueRecord>
where
    P: Fn(&VenueRecord) -> bool,
{
    venues
        .iter()
        .filter(|&venue| predicate(venue))
        .cloned()
        .collect()
}

/// A venue is bookable when any of its own slots is open.
pub fn is_bookable(venue: &VenueRecord) -> bool {
    venue.slots().values().any(|slot| slot.is_open())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VenueFilter {
    Bookable,
}

impl VenueFilter {
    pub fn matches(self, venue: &VenueRecord) -> bool {
        match self {
            Self::Bookable => is_bookable(venue),
        }
    }
}

pub fn apply_filters(venues: &[VenueRecord], filters: &[VenueFilter]) -> Vec<VenueRecord> {
    filter(venues, |venue| filters.iter().all(|f| f.matches(venue)))
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::model::{LocationRecord, Pricing, SlotRecord};

    fn venue(name: &str, slots: &[(&str, &str)]) -> VenueRecord {
        VenueRecord::new(LocationRecord {
            name: name.to_owned(),
            slots: slots
                .iter()
                .map(|(key, status)| {
                    (
                        SlotKey::new(*key),
                        SlotRecord {
                            status: (*status).to_owned(),
                            pricing: Pricing::NonPeak,
                        },
                    )
                })
                .collect::<IndexMap<_, _>>(),
        })
    }

    fn keys(raw: &[&str]) -> Vec<SlotKey> {
        raw.iter().copied().map(SlotKey::from).collect()
    }

    #[test]
    fn union_keeps_first_seen_order() {
        let first = keys(&["09:00", "10:00"]);
        let second = keys(&["10:00", "11:00"]);
        assert_eq!(
            aggregate_keys([first.iter(), second.iter()]),
            keys(&["09:00", "10:00", "11:00"])
        );
    }

    #[test]
    fn union_does_not_sort() {
        let first = keys(&["18:00"]);
        let second = keys(&["07:00", "18:00"]);
        assert_eq!(
            aggregate_keys([first.iter(), second.iter()]),
            keys(&["18:00", "07:00"])
        );
    }

    #[test]
    fn merge_appends_venues_and_extends_keys() {
        let empty = AggregatedResult::default();
        let first = merge_results(&empty, vec![venue("A", &[("09:00", ""), ("10:00", "Full")])]);
        let second = merge_results(&first, vec![venue("B", &[("10:00", "Full"), ("11:00", "")])]);

        assert!(empty.venues.is_empty());
        assert_eq!(first.venues.len(), 1);
        assert_eq!(second.batches, 2);
        assert_eq!(
            second.venues.iter().map(VenueRecord::name).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert_eq!(second.slot_keys, keys(&["09:00", "10:00", "11:00"]));
    }

    #[test]
    fn merge_includes_court_only_keys() {
        let mut with_court = venue("A", &[("09:00", "")]);
        with_court.courts.push(venue("A1", &[("09:00", ""), ("21:00", "")]).location);
        let merged = merge_results(&AggregatedResult::default(), vec![with_court]);
        assert_eq!(merged.slot_keys, keys(&["09:00", "21:00"]));
    }

    #[test]
    fn duplicate_venues_are_preserved() {
        let first = merge_results(&AggregatedResult::default(), vec![venue("A", &[("09:00", "")])]);
        let second = merge_results(&first, vec![venue("A", &[("09:00", "")])]);
        assert_eq!(second.venues.len(), 2);
    }

    #[test]
    fn folding_is_associative() {
        let batches = [
            vec![venue("A", &[("09:00", "")]), venue("B", &[("10:00", "")])],
            vec![venue("C", &[("10:00", ""), ("12:00", "")])],
            vec![venue("D", &[("08:00", "")])],
        ];

        let all_at_once = batches
            .iter()
            .cloned()
            .fold(AggregatedResult::default(), |acc, batch| merge_results(&acc, batch));

        let first_two = batches[..2]
            .iter()
            .cloned()
            .fold(AggregatedResult::default(), |acc, batch| merge_results(&acc, batch));
        let then_third = merge_results(&first_two, batches[2].clone());

        assert_eq!(all_at_once.slot_keys, then_third.slot_keys);
        assert_eq!(all_at_once.venues, then_third.venues);
        assert_eq!(
            all_at_once.slot_keys,
            keys(&["09:00", "10:00", "12:00", "08:00"])
        );
    }

    #[test]
    fn bookable_filter_keeps_venues_with_open_slot() {
        let a = venue("A", &[("09:00", ""), ("10:00", "Full")]);
        let b = venue("B", &[("09:00", "Full"), ("10:00", "Closed")]);
        let venues = vec![a.clone(), b];

        assert_eq!(filter(&venues, is_bookable), vec![a.clone()]);
        assert_eq!(apply_filters(&venues, &[VenueFilter::Bookable]), vec![a]);
        assert_eq!(apply_filters(&venues, &[]).len(), 2);
    }
}
