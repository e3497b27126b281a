//! YAML-described booking form.
//!
//! Behaves like the host form: the document and the venue lists become
//! available only after a number of reads, results are rendered in the host's
//! table markup, and the results area mutates asynchronously after `submit`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::aggregate::aggregate_keys;
use crate::form::{
    BookingForm, ChangeSignal, Criterion, MutationSignal, SearchCriteria, SelectOption, SelectorId,
};
use crate::model::{PREFERENCE_SLOTS, Pricing, SlotKey};

const PLACEHOLDER: &str = "-- Please select --";
const MISSING_SLOT_STATUS: &str = "N/A";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub criteria: SearchCriteria,
    pub venues: Vec<FixtureVenue>,
    /// Slots priced as peak unless a slot states its own pricing.
    pub peak: Vec<String>,
    pub timing: FixtureTiming,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureVenue {
    pub value: String,
    pub display: String,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub slots: IndexMap<String, FixtureSlot>,
    #[serde(default)]
    pub courts: Vec<FixtureCourt>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureCourt {
    pub name: String,
    #[serde(default)]
    pub slots: IndexMap<String, FixtureSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixtureSlot {
    Status(String),
    Detailed { status: String, pricing: Pricing },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureTiming {
    /// `is_loaded` reports false for this many calls.
    pub load_after_polls: u32,
    /// Venue selectors hold only the placeholder for this many reads.
    pub venue_list_after_polls: u32,
    pub mutation_delay_ms: u64,
    pub never_mutate: bool,
    /// Renders a court row ahead of every venue row on this (1-based) batch.
    pub orphan_court_on_batch: Option<usize>,
}

impl Fixture {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read fixture: {}", path.display()))?;
        let fixture: Fixture = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse fixture: {}", path.display()))?;
        fixture.validate()?;
        Ok(fixture)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for venue in &self.venues {
            if venue.value.trim().is_empty() {
                anyhow::bail!("fixture venue value must not be empty: {}", venue.display);
            }
            if !seen.insert(venue.value.as_str()) {
                anyhow::bail!("duplicate fixture venue value: {}", venue.value);
            }
        }
        Ok(())
    }

    /// `count` venues named `Venue 1..=count` with two hourly slots each;
    /// every odd venue has its first slot open.
    pub fn sample(count: usize) -> Self {
        let venues = (1..=count)
            .map(|i| {
                let first = if i % 2 == 1 { "" } else { "Full" };
                let mut slots = IndexMap::new();
                slots.insert(
                    "07:00-08:00".to_owned(),
                    FixtureSlot::Status(first.to_owned()),
                );
                slots.insert(
                    "08:00-09:00".to_owned(),
                    FixtureSlot::Status("Full".to_owned()),
                );
                FixtureVenue {
                    value: format!("V{i}"),
                    display: format!("Venue {i}"),
                    locations: Vec::new(),
                    courts: vec![FixtureCourt {
                        name: format!("Court {i}-1"),
                        slots: slots.clone(),
                    }],
                    slots,
                }
            })
            .collect();

        let criteria = Criterion::ALL
            .into_iter()
            .map(|criterion| {
                let options = vec![
                    SelectOption::new(PLACEHOLDER, ""),
                    SelectOption::new(format!("{criterion} A"), "A"),
                    SelectOption::new(format!("{criterion} B"), "B"),
                ];
                (criterion, options)
            })
            .collect();

        Self {
            criteria,
            venues,
            peak: vec!["08:00-09:00".to_owned()],
            timing: FixtureTiming::default(),
        }
    }

    fn venue(&self, value: &str) -> Option<&FixtureVenue> {
        self.venues.iter().find(|venue| venue.value == value)
    }
}

#[derive(Debug, Default)]
struct FormState {
    load_checks: u32,
    venue_list_reads: u32,
    values: HashMap<SelectorId, String>,
    submitted: Vec<Vec<String>>,
    rendered: Option<String>,
}

struct Inner {
    fixture: Fixture,
    state: Mutex<FormState>,
    mutations: MutationSignal,
    criteria_changes: ChangeSignal,
}

#[derive(Clone)]
pub struct FixtureForm {
    inner: Arc<Inner>,
}

impl FixtureForm {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            inner: Arc::new(Inner {
                fixture,
                state: Mutex::new(FormState::default()),
                mutations: MutationSignal::new(),
                criteria_changes: ChangeSignal::new(),
            }),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(Fixture::load(path)?))
    }

    /// Venue values of every submitted batch, in submission order.
    pub async fn submitted_batches(&self) -> Vec<Vec<String>> {
        self.inner.state.lock().await.submitted.clone()
    }

    fn venue_options(&self) -> Vec<SelectOption> {
        std::iter::once(SelectOption::new(PLACEHOLDER, ""))
            .chain(
                self.inner
                    .fixture
                    .venues
                    .iter()
                    .map(|venue| SelectOption::new(&venue.display, &venue.value)),
            )
            .collect()
    }

    fn location_options(&self, state: &FormState, slot: usize) -> Vec<SelectOption> {
        state
            .values
            .get(&SelectorId::Venue(slot))
            .and_then(|value| self.inner.fixture.venue(value))
            .map(|venue| {
                venue
                    .locations
                    .iter()
                    .map(|location| SelectOption::new(location, location))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn render(&self, batch: &[String], batch_no: usize) -> String {
        let fixture = &self.inner.fixture;
        let venues = batch
            .iter()
            .filter_map(|value| fixture.venue(value))
            .collect::<Vec<_>>();

        let keys = venues
            .iter()
            .flat_map(|venue| {
                std::iter::once(&venue.slots).chain(venue.courts.iter().map(|court| &court.slots))
            })
            .map(|slots| slots.keys().map(|key| SlotKey::new(key.as_str())).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let keys = aggregate_keys(keys.iter());

        let mut html = String::from("<table><tbody>\n<tr><td></td><td></td>");
        for key in &keys {
            html.push_str(&format!(
                r#"<td><div class="gwt-HTML">{}</div></td>"#,
                html_escape(key.as_str())
            ));
        }
        html.push_str("</tr>\n");

        if fixture.timing.orphan_court_on_batch == Some(batch_no) {
            html.push_str(&self.render_row("Stray court", &IndexMap::new(), &keys, false));
        }
        for venue in venues {
            html.push_str(&self.render_row(&venue.display, &venue.slots, &keys, true));
            for court in &venue.courts {
                html.push_str(&self.render_row(&court.name, &court.slots, &keys, false));
            }
        }
        html.push_str("</tbody></table>\n");
        html
    }

    fn render_row(
        &self,
        name: &str,
        slots: &IndexMap<String, FixtureSlot>,
        keys: &[SlotKey],
        visible: bool,
    ) -> String {
        let style = if visible { "" } else { r#" style="display: none;""# };
        let mut row = format!("<tr{style}><td></td><td>{}</td>", html_escape(name));
        for key in keys {
            let (status, pricing) = match slots.get(key.as_str()) {
                Some(FixtureSlot::Status(status)) => {
                    let pricing = if self.inner.fixture.peak.iter().any(|p| p == key.as_str()) {
                        Pricing::Peak
                    } else {
                        Pricing::NonPeak
                    };
                    (status.as_str(), pricing)
                }
                Some(FixtureSlot::Detailed { status, pricing }) => (status.as_str(), *pricing),
                None => (MISSING_SLOT_STATUS, Pricing::Disabled),
            };
            let class = match pricing {
                Pricing::Peak => "timeslotCellPeak",
                Pricing::NonPeak => "timeslotCellNonPeak",
                Pricing::Disabled => "timeslotCell",
            };
            row.push_str(&format!(
                r#"<td class="{class}"><div class="gwt-HTML">{}</div></td>"#,
                html_escape(status)
            ));
        }
        row.push_str("</tr>\n");
        row
    }
}

#[async_trait]
impl BookingForm for FixtureForm {
    async fn is_loaded(&self) -> anyhow::Result<bool> {
        let mut state = self.inner.state.lock().await;
        state.load_checks = state.load_checks.saturating_add(1);
        Ok(state.load_checks > self.inner.fixture.timing.load_after_polls)
    }

    async fn options(&self, selector: SelectorId) -> anyhow::Result<Vec<SelectOption>> {
        let mut state = self.inner.state.lock().await;
        match selector {
            SelectorId::Criterion(criterion) => Ok(self
                .inner
                .fixture
                .criteria
                .get(&criterion)
                .cloned()
                .unwrap_or_default()),
            SelectorId::Venue(slot) => {
                ensure_slot(slot)?;
                if slot == 0 {
                    state.venue_list_reads = state.venue_list_reads.saturating_add(1);
                }
                if state.venue_list_reads > self.inner.fixture.timing.venue_list_after_polls {
                    Ok(self.venue_options())
                } else {
                    Ok(vec![SelectOption::new(PLACEHOLDER, "")])
                }
            }
            SelectorId::Location(slot) => {
                ensure_slot(slot)?;
                Ok(self.location_options(&state, slot))
            }
        }
    }

    async fn value(&self, selector: SelectorId) -> anyhow::Result<String> {
        let state = self.inner.state.lock().await;
        Ok(state.values.get(&selector).cloned().unwrap_or_default())
    }

    async fn set_value(&self, selector: SelectorId, value: &str) -> anyhow::Result<()> {
        let mut state = self.inner.state.lock().await;
        let known = match selector {
            SelectorId::Criterion(criterion) => self
                .inner
                .fixture
                .criteria
                .get(&criterion)
                .is_some_and(|options| options.iter().any(|o| o.value == value)),
            SelectorId::Venue(slot) => {
                ensure_slot(slot)?;
                value.is_empty() || self.inner.fixture.venue(value).is_some()
            }
            SelectorId::Location(slot) => {
                ensure_slot(slot)?;
                self.location_options(&state, slot)
                    .iter()
                    .any(|o| o.value == value)
            }
        };
        if !known {
            anyhow::bail!("{selector} has no option {value:?}");
        }
        state.values.insert(selector, value.to_owned());
        Ok(())
    }

    async fn notify_change(&self, selector: SelectorId) -> anyhow::Result<()> {
        match selector {
            // Dependent criteria lists are repopulated by the host.
            SelectorId::Criterion(_) => self.inner.criteria_changes.notify(),
            SelectorId::Venue(slot) => {
                let mut state = self.inner.state.lock().await;
                state.values.remove(&SelectorId::Location(slot));
            }
            SelectorId::Location(_) => {}
        }
        Ok(())
    }

    async fn submit(&self) -> anyhow::Result<()> {
        let (html, batch_no) = {
            let mut state = self.inner.state.lock().await;
            let batch = (0..PREFERENCE_SLOTS)
                .filter_map(|slot| state.values.get(&SelectorId::Venue(slot)))
                .filter(|value| !value.is_empty())
                .cloned()
                .collect::<Vec<_>>();
            if batch.is_empty() {
                anyhow::bail!("submit without any preferred venue");
            }
            state.submitted.push(batch);
            let batch_no = state.submitted.len();
            let html = self.render(&state.submitted[batch_no - 1], batch_no);
            (html, batch_no)
        };

        let timing = &self.inner.fixture.timing;
        if timing.never_mutate {
            tracing::debug!(batch_no, "fixture: results area will not mutate");
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let delay = Duration::from_millis(timing.mutation_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.state.lock().await.rendered = Some(html);
            inner.mutations.notify_mutated();
        });
        Ok(())
    }

    async fn results_table(&self) -> anyhow::Result<Option<String>> {
        Ok(self.inner.state.lock().await.rendered.clone())
    }

    fn mutations(&self) -> &MutationSignal {
        &self.inner.mutations
    }

    fn criteria_changes(&self) -> &ChangeSignal {
        &self.inner.criteria_changes
    }
}

fn ensure_slot(slot: usize) -> anyhow::Result<()> {
    if slot >= PREFERENCE_SLOTS {
        anyhow::bail!("preference slot out of range: {}", slot + 1);
    }
    Ok(())
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
