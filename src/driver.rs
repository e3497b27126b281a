use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tracing::Instrument as _;

use crate::aggregate;
use crate::error::{ErrorPayload, SearchError};
use crate::form::{BookingForm, SelectorId};
use crate::model::{AggregatedResult, VenuePreferenceBatch};
use crate::parser::{self, TableLayout};
use crate::poll::{PollOutcome, PollPolicy};
use crate::table::ResultTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    AwaitingVenueListReady,
    SubmittingBatch,
    AwaitingResultsMutated,
    Collecting,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverConfig {
    pub venue_list: PollPolicy,
    pub results: PollPolicy,
    pub layout: TableLayout,
}

/// Pages through every venue of the booking form, three at a time.
pub struct BatchedQueryDriver {
    form: Arc<dyn BookingForm>,
    config: DriverConfig,
    in_flight: AtomicBool,
    /// Option seen at capture time, used to detect a list that has not been
    /// repopulated since the previous run.
    marker: Mutex<Option<String>>,
    state: watch::Sender<DriverState>,
}

impl BatchedQueryDriver {
    pub fn new(form: Arc<dyn BookingForm>, config: DriverConfig) -> Self {
        let (state, _) = watch::channel(DriverState::Idle);
        Self {
            form,
            config,
            in_flight: AtomicBool::new(false),
            marker: Mutex::new(None),
            state,
        }
    }

    pub fn state(&self) -> DriverState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// Runs a search and splits failures the way callers consume them:
    /// recoverable failures come back as an error payload, anything else is
    /// returned as `Err` and must not be swallowed.
    pub async fn search(&self) -> Result<Result<AggregatedResult, ErrorPayload>, SearchError> {
        match self.run().await {
            Ok(result) => Ok(Ok(result)),
            Err(err) if err.is_recoverable() => {
                tracing::warn!(%err, "search did not complete");
                Ok(Err(err.to_payload()))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn run(&self) -> Result<AggregatedResult, SearchError> {
        let _guard = RunGuard::acquire(&self.in_flight)?;
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("search", %run_id);

        async {
            let result = self.drive().await;
            match &result {
                Ok(aggregated) => {
                    tracing::info!(
                        venues = aggregated.venues.len(),
                        slots = aggregated.slot_keys.len(),
                        batches = aggregated.batches,
                        "search finished"
                    );
                    self.transition(DriverState::Done);
                }
                Err(err) => {
                    tracing::debug!(%err, "search failed");
                    self.transition(DriverState::Failed);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(&self) -> Result<AggregatedResult, SearchError> {
        // Selector values and the mutation flag may be left over from an
        // interrupted run; start from a clean flag every time.
        self.transition(DriverState::Idle);
        self.form.mutations().clear();

        self.transition(DriverState::AwaitingVenueListReady);
        let venues = self.await_venue_list().await?;
        tracing::info!(venues = venues.len(), "captured venue list");

        let mut queue = VecDeque::from(venues);
        let mut result = AggregatedResult::default();
        while let Some(batch) = VenuePreferenceBatch::take_from(&mut queue) {
            let batch_no = result.batches + 1;

            self.transition(DriverState::SubmittingBatch);
            self.submit_batch(&batch).await?;
            tracing::debug!(batch = batch_no, venues = ?batch.venues(), "submitted batch");

            self.transition(DriverState::AwaitingResultsMutated);
            let html = self.await_results().await?;

            self.transition(DriverState::Collecting);
            let parsed = match html {
                Some(html) => {
                    let table = ResultTable::from_html(&html)?;
                    parser::parse_with_layout(&table, self.config.layout)?
                }
                None => {
                    tracing::warn!(batch = batch_no, "results area rendered no table");
                    Vec::new()
                }
            };
            tracing::debug!(
                batch = batch_no,
                parsed = parsed.len(),
                remaining = queue.len(),
                "collected batch"
            );
            result = aggregate::merge_results(&result, parsed);
        }

        Ok(result.completed(Utc::now()))
    }

    async fn await_venue_list(&self) -> Result<Vec<String>, SearchError> {
        let marker = self.marker.lock().await.clone();
        let this = self;
        let venues = self
            .config
            .venue_list
            .poll(move |_| {
                let marker = marker.clone();
                async move { PollOutcome::from(this.check_venue_list(marker.as_deref()).await) }
            })
            .await
            .into_result()?;

        *self.marker.lock().await = venues.get(1).cloned();
        Ok(venues)
    }

    async fn check_venue_list(&self, marker: Option<&str>) -> Result<Vec<String>, SearchError> {
        let mut first_list = None;
        for selector in SelectorId::venue_slots() {
            let options = self
                .form
                .options(selector)
                .await
                .map_err(SearchError::Form)?;
            if options.len() <= 1 {
                return Err(SearchError::NotReady(format!(
                    "venue list of {selector} is not ready"
                )));
            }
            if first_list.is_none() {
                first_list = Some(options);
            }
        }

        let venues = first_list
            .unwrap_or_default()
            .into_iter()
            .skip(1)
            .map(|option| option.value)
            .collect::<Vec<_>>();
        if marker.is_some() && venues.first().map(String::as_str) == marker {
            return Err(SearchError::NotReady(
                "venue list has not been repopulated".to_owned(),
            ));
        }
        Ok(venues)
    }

    async fn submit_batch(&self, batch: &VenuePreferenceBatch) -> Result<(), SearchError> {
        for (slot, venue) in batch.assignments().enumerate() {
            let selector = SelectorId::Venue(slot);
            self.select(selector, venue.unwrap_or_default()).await?;
            if venue.is_none() {
                continue;
            }

            // Venues with several buildings list them here; the second entry is
            // the one searched by default.
            let location = SelectorId::Location(slot);
            let locations = self
                .form
                .options(location)
                .await
                .map_err(SearchError::Form)?;
            if let Some(second) = locations.get(1) {
                self.select(location, &second.value).await?;
            }
        }

        self.form.mutations().clear();
        self.form.submit().await.map_err(SearchError::Form)
    }

    async fn select(&self, selector: SelectorId, value: &str) -> Result<(), SearchError> {
        self.form
            .set_value(selector, value)
            .await
            .map_err(SearchError::Form)?;
        self.form
            .notify_change(selector)
            .await
            .map_err(SearchError::Form)
    }

    async fn await_results(&self) -> Result<Option<String>, SearchError> {
        let form = &self.form;
        self.config
            .results
            .poll(move |_| async move {
                if !form.mutations().is_mutated() {
                    return PollOutcome::NotReady("search results are not ready".to_owned());
                }
                match form.results_table().await {
                    Ok(html) => PollOutcome::Ready(html),
                    Err(err) => PollOutcome::Fatal(SearchError::Form(err)),
                }
            })
            .await
            .into_result()
    }

    fn transition(&self, next: DriverState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = ?previous, to = ?next, "driver state");
        }
    }
}

struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SearchError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SearchError::Busy)?;
        Ok(Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Polls until the host document exposes the search form.
pub async fn wait_until_loaded(form: &dyn BookingForm, policy: PollPolicy) -> Result<(), SearchError> {
    policy
        .poll(move |_| async move {
            match form.is_loaded().await {
                Ok(true) => PollOutcome::Ready(()),
                Ok(false) => PollOutcome::NotReady("document is not ready".to_owned()),
                Err(err) => PollOutcome::Fatal(SearchError::Form(err)),
            }
        })
        .await
        .into_result()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fixture::{Fixture, FixtureForm};

    fn fast() -> DriverConfig {
        DriverConfig {
            venue_list: PollPolicy::new(Duration::from_millis(1), 50),
            results: PollPolicy::new(Duration::from_millis(1), 200),
            layout: TableLayout::default(),
        }
    }

    fn fixture(venues: usize) -> Fixture {
        Fixture::sample(venues)
    }

    #[tokio::test]
    async fn seven_venues_take_three_submits() {
        let form = Arc::new(FixtureForm::new(fixture(7)));
        let driver = BatchedQueryDriver::new(form.clone(), fast());

        let result = driver.run().await.unwrap();

        let submits = form.submitted_batches().await;
        assert_eq!(
            submits.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );
        let names = result
            .venues
            .iter()
            .map(|venue| venue.name().to_owned())
            .collect::<Vec<_>>();
        let expected = (1..=7).map(|i| format!("Venue {i}")).collect::<Vec<_>>();
        assert_eq!(names, expected);
        assert_eq!(result.batches, 3);
        assert!(result.completed_at.is_some());
        assert_eq!(driver.state(), DriverState::Done);
    }

    #[tokio::test]
    async fn unused_preference_slots_are_cleared() {
        let form = Arc::new(FixtureForm::new(fixture(4)));
        let driver = BatchedQueryDriver::new(form.clone(), fast());
        driver.run().await.unwrap();

        assert_eq!(form.value(SelectorId::Venue(0)).await.unwrap(), "V4");
        assert_eq!(form.value(SelectorId::Venue(1)).await.unwrap(), "");
        assert_eq!(form.value(SelectorId::Venue(2)).await.unwrap(), "");
    }

    #[tokio::test]
    async fn second_location_is_selected_when_available() {
        let mut setup = fixture(1);
        setup.venues[0].locations = vec!["All".to_owned(), "Annex".to_owned()];
        let form = Arc::new(FixtureForm::new(setup));
        let driver = BatchedQueryDriver::new(form.clone(), fast());
        driver.run().await.unwrap();

        assert_eq!(form.value(SelectorId::Location(0)).await.unwrap(), "Annex");
    }

    #[tokio::test]
    async fn waits_for_venue_list_population() {
        let mut setup = fixture(2);
        setup.timing.venue_list_after_polls = 5;
        let form = Arc::new(FixtureForm::new(setup));
        let driver = BatchedQueryDriver::new(form.clone(), fast());

        let result = driver.run().await.unwrap();
        assert_eq!(result.venues.len(), 2);
    }

    #[tokio::test]
    async fn unpopulated_list_is_recoverable() {
        let mut setup = fixture(2);
        setup.timing.venue_list_after_polls = u32::MAX;
        let form = Arc::new(FixtureForm::new(setup));
        let mut config = fast();
        config.venue_list = PollPolicy::new(Duration::ZERO, 3);
        let driver = BatchedQueryDriver::new(form.clone(), config);

        let outcome = driver.search().await.unwrap();
        let payload = outcome.unwrap_err();
        assert_eq!(payload.kind, crate::error::ErrorKind::Resource);
        assert!(form.submitted_batches().await.is_empty());
        assert_eq!(driver.state(), DriverState::Failed);
    }

    #[tokio::test]
    async fn stale_venue_list_is_not_captured() {
        let form = Arc::new(FixtureForm::new(fixture(4)));
        let mut config = fast();
        config.venue_list = PollPolicy::new(Duration::ZERO, 3);
        let driver = BatchedQueryDriver::new(form.clone(), config);
        // Left behind by a previous run whose list still shows.
        *driver.marker.lock().await = Some("V1".to_owned());

        let payload = driver.search().await.unwrap().unwrap_err();
        assert_eq!(payload.kind, crate::error::ErrorKind::Resource);
        assert!(payload.message.contains("has not been repopulated"));
        assert!(form.submitted_batches().await.is_empty());
        assert_eq!(driver.state(), DriverState::Failed);
    }

    #[tokio::test]
    async fn results_that_never_render_are_recoverable() {
        let mut setup = fixture(2);
        setup.timing.never_mutate = true;
        let form = Arc::new(FixtureForm::new(setup));
        let mut config = fast();
        config.results = PollPolicy::new(Duration::ZERO, 4);
        let driver = BatchedQueryDriver::new(form.clone(), config);

        let err = driver.run().await.unwrap_err();
        assert!(matches!(err, SearchError::NotReady(_)));
        assert_eq!(form.submitted_batches().await.len(), 1);
    }

    #[tokio::test]
    async fn malformed_table_aborts_the_run() {
        let mut setup = fixture(5);
        setup.timing.orphan_court_on_batch = Some(1);
        let form = Arc::new(FixtureForm::new(setup));
        let driver = BatchedQueryDriver::new(form.clone(), fast());

        let err = driver.search().await.unwrap_err();
        assert!(matches!(err, SearchError::MalformedTable(_)));
        assert_eq!(form.submitted_batches().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_runs_are_rejected() {
        let mut setup = fixture(3);
        setup.timing.mutation_delay_ms = 50;
        let form = Arc::new(FixtureForm::new(setup));
        let driver = Arc::new(BatchedQueryDriver::new(form, fast()));

        let first = tokio::spawn({
            let driver = Arc::clone(&driver);
            async move { driver.run().await }
        });
        let mut states = driver.watch_state();
        states
            .wait_for(|state| *state == DriverState::AwaitingResultsMutated)
            .await
            .unwrap();

        let second = driver.search().await.unwrap();
        assert_eq!(second.unwrap_err().kind, crate::error::ErrorKind::Busy);
        assert_eq!(first.await.unwrap().unwrap().venues.len(), 3);

        // The guard is released once the first run finishes.
        assert!(driver.run().await.is_ok());
    }

    #[tokio::test]
    async fn rerun_after_completion_succeeds() {
        let form = Arc::new(FixtureForm::new(fixture(3)));
        let driver = BatchedQueryDriver::new(form.clone(), fast());
        let first = driver.run().await.unwrap();
        let second = driver.run().await.unwrap();
        assert_eq!(first.venues, second.venues);
        assert_eq!(form.submitted_batches().await.len(), 2);
    }

    #[tokio::test]
    async fn waits_for_document_load() {
        let mut setup = fixture(1);
        setup.timing.load_after_polls = 3;
        let form = FixtureForm::new(setup);
        wait_until_loaded(&form, PollPolicy::new(Duration::ZERO, 5))
            .await
            .unwrap();

        let mut setup = fixture(1);
        setup.timing.load_after_polls = 10;
        let form = FixtureForm::new(setup);
        let err = wait_until_loaded(&form, PollPolicy::new(Duration::ZERO, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::NotReady(_)));
    }
}
