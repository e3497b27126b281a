//! Turns one results table snapshot into venue records.
//!
//! Court ownership is positional: a hidden row belongs to the closest visible
//! row above it. The host renders courts directly below their venue and only
//! hides/shows them, so the parser relies on that row order rather than on any
//! key inside the row.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::SearchError;
use crate::model::{LocationRecord, SlotKey, SlotRecord, VenueRecord};
use crate::table::{ResultTable, TableRow};

/// Column positions inside a results row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    pub name_column: usize,
    pub first_slot_column: usize,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            name_column: 1,
            first_slot_column: 2,
        }
    }
}

pub fn parse(table: &ResultTable) -> Result<Vec<VenueRecord>, SearchError> {
    parse_with_layout(table, TableLayout::default())
}

pub fn parse_with_layout(
    table: &ResultTable,
    layout: TableLayout,
) -> Result<Vec<VenueRecord>, SearchError> {
    let mut rows = table.rows.iter().enumerate();
    let Some((_, header)) = rows.next() else {
        return Ok(Vec::new());
    };
    let keys = slot_keys(header, layout)?;

    let mut venues: Vec<VenueRecord> = Vec::new();
    for (index, row) in rows {
        let location = parse_location(index, row, &keys, layout)?;
        if row.visible {
            venues.push(VenueRecord::new(location));
            continue;
        }
        let Some(venue) = venues.last_mut() else {
            return Err(SearchError::malformed(format!(
                "court row {index} ({}) appears before any venue row",
                location.name
            )));
        };
        venue.courts.push(location);
    }

    tracing::debug!(
        venues = venues.len(),
        slots = keys.len(),
        "parsed results table"
    );
    Ok(venues)
}

/// Slot keys declared by the header row, in column order.
pub fn slot_keys(header: &TableRow, layout: TableLayout) -> Result<Vec<SlotKey>, SearchError> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for cell in header.cells.iter().skip(layout.first_slot_column) {
        let key = SlotKey::new(cell.text.trim());
        if !seen.insert(key.clone()) {
            return Err(SearchError::malformed(format!(
                "duplicate slot column: {key}"
            )));
        }
        keys.push(key);
    }
    Ok(keys)
}

fn parse_location(
    index: usize,
    row: &TableRow,
    keys: &[SlotKey],
    layout: TableLayout,
) -> Result<LocationRecord, SearchError> {
    let name = row
        .cells
        .get(layout.name_column)
        .ok_or_else(|| SearchError::malformed(format!("row {index} has no name cell")))?
        .text
        .trim()
        .to_owned();

    let data_cells = row.cells.get(layout.first_slot_column..).unwrap_or_default();
    if data_cells.len() > keys.len() {
        return Err(SearchError::malformed(format!(
            "row {index} ({name}) has {} slot cells but the header declares {}",
            data_cells.len(),
            keys.len()
        )));
    }

    let slots = keys
        .iter()
        .zip(data_cells)
        .map(|(key, cell)| {
            let record = SlotRecord {
                status: cell.text.trim().to_owned(),
                pricing: cell.pricing,
            };
            (key.clone(), record)
        })
        .collect::<IndexMap<_, _>>();

    Ok(LocationRecord { name, slots })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pricing;
    use crate::table::TableCell;

    fn row(visible: bool, name: &str, slots: &[(&str, Pricing)]) -> TableRow {
        let mut cells = vec![TableCell::new("", Pricing::Disabled), TableCell::new(name, Pricing::Disabled)];
        cells.extend(
            slots
                .iter()
                .map(|(text, pricing)| TableCell::new(*text, *pricing)),
        );
        TableRow { visible, cells }
    }

    fn header(keys: &[&str]) -> TableRow {
        let slots = keys
            .iter()
            .map(|key| (*key, Pricing::Disabled))
            .collect::<Vec<_>>();
        row(true, "", &slots)
    }

    #[test]
    fn one_key_per_column_in_order() {
        let table = ResultTable {
            rows: vec![
                header(&["09:00", "10:00", "11:00"]),
                row(
                    true,
                    "Victoria Park",
                    &[("", Pricing::Peak), ("Full", Pricing::NonPeak), ("", Pricing::Disabled)],
                ),
            ],
        };
        let venues = parse(&table).unwrap();
        assert_eq!(venues.len(), 1);
        let keys = venues[0].slots().keys().map(SlotKey::as_str).collect::<Vec<_>>();
        assert_eq!(keys, vec!["09:00", "10:00", "11:00"]);
        assert_eq!(venues[0].slots()["10:00"].status, "Full");
        assert_eq!(venues[0].slots()["09:00"].pricing, Pricing::Peak);
    }

    #[test]
    fn hidden_rows_attach_to_preceding_venue() {
        let table = ResultTable {
            rows: vec![
                header(&["09:00"]),
                row(true, "Venue A", &[("", Pricing::Peak)]),
                row(false, "Court A1", &[("", Pricing::Peak)]),
                row(false, "Court A2", &[("Booked", Pricing::Peak)]),
                row(true, "Venue B", &[("Full", Pricing::NonPeak)]),
                row(false, "Court B1", &[("Full", Pricing::NonPeak)]),
            ],
        };
        let venues = parse(&table).unwrap();
        assert_eq!(venues.len(), 2);
        assert_eq!(venues[0].courts.len(), 2);
        assert_eq!(venues[0].courts[1].name, "Court A2");
        assert_eq!(venues[1].courts.len(), 1);
        assert_eq!(venues[1].courts[0].slots["09:00"].status, "Full");
    }

    #[test]
    fn court_before_venue_is_structural_error() {
        let table = ResultTable {
            rows: vec![header(&["09:00"]), row(false, "Orphan", &[("", Pricing::Peak)])],
        };
        let err = parse(&table).unwrap_err();
        assert!(matches!(err, SearchError::MalformedTable(_)));
        assert!(err.to_string().contains("Orphan"));
    }

    #[test]
    fn duplicate_header_key_is_rejected() {
        let table = ResultTable {
            rows: vec![header(&["09:00", "09:00"])],
        };
        assert!(matches!(
            parse(&table).unwrap_err(),
            SearchError::MalformedTable(_)
        ));
    }

    #[test]
    fn extra_slot_cells_are_rejected() {
        let table = ResultTable {
            rows: vec![
                header(&["09:00"]),
                row(true, "Venue", &[("", Pricing::Peak), ("", Pricing::Peak)]),
            ],
        };
        assert!(parse(&table).is_err());
    }

    #[test]
    fn status_is_trimmed_and_empty_table_yields_nothing() {
        assert!(parse(&ResultTable::default()).unwrap().is_empty());

        let table = ResultTable {
            rows: vec![header(&[" 09:00 "]), row(true, " Venue ", &[("  ", Pricing::Peak)])],
        };
        let venues = parse(&table).unwrap();
        assert_eq!(venues[0].name(), "Venue");
        assert!(venues[0].slots()["09:00"].is_open());
    }

    #[test]
    fn parses_rendered_markup() {
        let html = r#"<table>
          <tr><td></td><td></td><td><div class="gwt-HTML">07:00-08:00</div></td></tr>
          <tr><td></td><td>Kowloon Park</td><td class="timeslotCellPeak"><div class="gwt-HTML"></div></td></tr>
          <tr style="display:none"><td></td><td>Court 1</td><td class="timeslotCellPeak"><div class="gwt-HTML"></div></td></tr>
        </table>"#;
        let table = ResultTable::from_html(html).unwrap();
        let venues = parse(&table).unwrap();
        assert_eq!(venues.len(), 1);
        assert_eq!(venues[0].courts[0].name, "Court 1");
        assert_eq!(venues[0].slots()["07:00-08:00"].pricing, Pricing::Peak);
    }
}
