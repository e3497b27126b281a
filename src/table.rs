use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::model::Pricing;

const RESULT_CONTAINER_ID: &str = "searchResultTable";
const CELL_TEXT_CLASS: &str = "gwt-HTML";
const PEAK_CLASS: &str = "timeslotCellPeak";
const NON_PEAK_CLASS: &str = "timeslotCellNonPeak";

/// Detached snapshot of a rendered results table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultTable {
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableRow {
    /// Hidden rows carry the courts of the preceding visible row.
    pub visible: bool,
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableCell {
    pub text: String,
    #[serde(default)]
    pub pricing: Pricing,
}

impl TableCell {
    pub fn new(text: impl Into<String>, pricing: Pricing) -> Self {
        Self {
            text: text.into(),
            pricing,
        }
    }
}

impl ResultTable {
    /// Reads the results table out of rendered markup.
    ///
    /// Accepts either a whole page (the table under `#searchResultTable` wins)
    /// or the markup of a single `<table>`. A result container without a
    /// table reads as an empty table.
    pub fn from_html(html: &str) -> Result<Self, SearchError> {
        let document = Html::parse_document(html);
        let elements = || document.root_element().descendants().filter_map(ElementRef::wrap);

        let container = elements().find(|el| el.value().id() == Some(RESULT_CONTAINER_ID));
        let table = match container {
            // The host empties the container when nothing matched.
            Some(container) => match child_elements(container).find(|el| is(el, "table")) {
                Some(table) => table,
                None => return Ok(Self::default()),
            },
            None => elements()
                .find(|el| is(el, "table"))
                .ok_or_else(|| SearchError::MissingElement("results table".to_owned()))?,
        };

        let rows = child_elements(table)
            .filter(|el| is(el, "tbody"))
            .flat_map(child_elements)
            .filter(|el| is(el, "tr"))
            .map(read_row)
            .collect();

        Ok(Self { rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn child_elements(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    element.children().filter_map(ElementRef::wrap)
}

fn is(element: &ElementRef<'_>, name: &str) -> bool {
    element.value().name().eq_ignore_ascii_case(name)
}

fn read_row(row: ElementRef<'_>) -> TableRow {
    let cells = child_elements(row)
        .filter(|el| is(el, "td") || is(el, "th"))
        .map(read_cell)
        .collect();
    TableRow {
        visible: is_displayed(&row),
        cells,
    }
}

fn read_cell(cell: ElementRef<'_>) -> TableCell {
    let text_source = child_elements(cell)
        .find(|el| el.value().classes().any(|class| class == CELL_TEXT_CLASS))
        .unwrap_or(cell);
    let text = text_source.text().collect::<String>();

    let classes = cell.value().classes().collect::<Vec<_>>();
    let pricing = if classes.contains(&PEAK_CLASS) {
        Pricing::Peak
    } else if classes.contains(&NON_PEAK_CLASS) {
        Pricing::NonPeak
    } else {
        Pricing::Disabled
    };

    TableCell { text, pricing }
}

fn is_displayed(row: &ElementRef<'_>) -> bool {
    if row.value().attr("hidden").is_some() {
        return false;
    }
    let Some(style) = row.value().attr("style") else {
        return true;
    };
    let style = style
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    !style.split(';').any(|decl| {
        decl.split_once(':')
            .is_some_and(|(property, value)| property == "display" && value.starts_with("none"))
    })
}
