use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use crate::app::message::{Request, Response};
use crate::driver::{BatchedQueryDriver, DriverConfig, wait_until_loaded};
use crate::error::{ErrorPayload, SearchError};
use crate::form::{BookingForm, CriteriaSelection, Criterion, SearchCriteria, SelectorId};
use crate::model::AggregatedResult;

type SearchOutcome = Result<Result<AggregatedResult, ErrorPayload>, SearchError>;

/// Relays requests from a presentation surface to the booking form and the
/// search driver, and pushes criteria updates when the form repopulates them.
pub struct RequestRouter {
    form: Arc<dyn BookingForm>,
    driver: Arc<BatchedQueryDriver>,
    responses: mpsc::Sender<Response>,
}

impl RequestRouter {
    pub fn new(
        form: Arc<dyn BookingForm>,
        config: DriverConfig,
        responses: mpsc::Sender<Response>,
    ) -> Self {
        let driver = Arc::new(BatchedQueryDriver::new(Arc::clone(&form), config));
        Self {
            form,
            driver,
            responses,
        }
    }

    /// Waits for the form's document to load, then builds the router.
    pub async fn attach(
        form: Arc<dyn BookingForm>,
        config: DriverConfig,
        responses: mpsc::Sender<Response>,
    ) -> Result<Self, SearchError> {
        wait_until_loaded(form.as_ref(), config.venue_list).await?;
        tracing::debug!("booking form loaded");
        Ok(Self::new(form, config, responses))
    }

    pub fn driver(&self) -> &Arc<BatchedQueryDriver> {
        &self.driver
    }

    /// Serves until `requests` closes and every started search has reported.
    ///
    /// A fatal search or form error is sent as [`Response::Failure`] and then
    /// returned.
    pub async fn serve(self, mut requests: mpsc::Receiver<Request>) -> anyhow::Result<()> {
        let mut criteria = self.form.criteria_changes().subscribe();
        let mut searches = JoinSet::new();
        let mut requests_closed = false;
        let mut watching_criteria = true;

        loop {
            tokio::select! {
                request = requests.recv(), if !requests_closed => match request {
                    Some(request) => self.handle(request, &mut searches).await?,
                    None => {
                        tracing::debug!(pending = searches.len(), "request channel closed");
                        requests_closed = true;
                    }
                },
                Some(joined) = searches.join_next(), if !searches.is_empty() => {
                    self.finish_search(joined).await?;
                }
                changed = criteria.changed(), if watching_criteria && !requests_closed => {
                    if changed.is_err() {
                        watching_criteria = false;
                        continue;
                    }
                    tracing::debug!("search criteria changed");
                    let update = self.read_criteria().await;
                    let update = self.or_fail(update).await?;
                    self.respond(Response::SearchCriteriaUpdate(update)).await?;
                }
                else => break,
            }

            if requests_closed && searches.is_empty() {
                break;
            }
        }

        Ok(())
    }

    async fn handle(
        &self,
        request: Request,
        searches: &mut JoinSet<SearchOutcome>,
    ) -> anyhow::Result<()> {
        match request {
            Request::GetSearchCriteria => {
                let criteria = self.read_criteria().await;
                let criteria = self.or_fail(criteria).await?;
                self.respond(Response::SearchCriteriaUpdate(criteria)).await
            }
            Request::SetSearchCriteria(selection) => {
                let applied = self.apply_criteria(&selection).await;
                self.or_fail(applied).await
            }
            Request::RunSearch => {
                let driver = Arc::clone(&self.driver);
                searches.spawn(async move { driver.search().await });
                Ok(())
            }
        }
    }

    async fn finish_search(
        &self,
        joined: Result<SearchOutcome, JoinError>,
    ) -> anyhow::Result<()> {
        let outcome = joined.context("search task panicked")?;
        let outcome = self.or_fail(outcome).await?;
        self.respond(Response::SearchResults(outcome)).await
    }

    /// Option lists of every criteria selector.
    pub async fn read_criteria(&self) -> Result<SearchCriteria, SearchError> {
        let mut criteria = SearchCriteria::new();
        for criterion in Criterion::ALL {
            let options = self
                .form
                .options(SelectorId::Criterion(criterion))
                .await
                .map_err(SearchError::Form)?;
            criteria.insert(criterion, options);
        }
        Ok(criteria)
    }

    /// Sets every selector whose value differs and fires its change handler.
    pub async fn apply_criteria(&self, selection: &CriteriaSelection) -> Result<(), SearchError> {
        for (&criterion, value) in selection {
            let selector = SelectorId::Criterion(criterion);
            let current = self.form.value(selector).await.map_err(SearchError::Form)?;
            if current == *value {
                continue;
            }
            tracing::debug!(%criterion, value, "update search criterion");
            self.form
                .set_value(selector, value)
                .await
                .map_err(SearchError::Form)?;
            self.form
                .notify_change(selector)
                .await
                .map_err(SearchError::Form)?;
        }
        Ok(())
    }

    /// Forwards a fatal error to the presentation surface before returning it.
    async fn or_fail<T>(&self, result: Result<T, SearchError>) -> anyhow::Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::error!(%err, "router stopped");
                // Delivery is best effort; the error is returned either way.
                let _ = self.responses.send(Response::Failure(err.to_payload())).await;
                Err(err.into())
            }
        }
    }

    async fn respond(&self, response: Response) -> anyhow::Result<()> {
        self.responses
            .send(response)
            .await
            .map_err(|_| anyhow::anyhow!("response channel closed"))
    }
}
