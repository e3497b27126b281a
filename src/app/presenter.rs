use anyhow::Context as _;
use tokio::sync::mpsc;

use crate::app::message::{Request, Response};
use crate::app::view::SearchView;
use crate::error::ErrorPayload;
use crate::form::{CriteriaSelection, SearchCriteria};
use crate::model::AggregatedResult;

/// Receiving side of the router channel.
///
/// Error payloads are rethrown to the caller; every other response updates
/// the view through its handler.
#[derive(Debug, Default)]
pub struct Presenter {
    view: SearchView,
}

impl Presenter {
    pub fn new(view: SearchView) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &SearchView {
        &self.view
    }

    pub fn dispatch(&mut self, response: Response) -> Result<(), ErrorPayload> {
        if let Some(err) = response.error() {
            return Err(err.clone());
        }
        match response {
            Response::SearchCriteriaUpdate(criteria) => self.on_search_criteria(criteria),
            Response::SearchResults(Ok(result)) => self.on_search_results(result),
            Response::SearchResults(Err(_)) | Response::Failure(_) => {}
        }
        Ok(())
    }

    fn on_search_criteria(&mut self, criteria: SearchCriteria) {
        tracing::debug!(criteria = criteria.len(), "search criteria updated");
        self.view = self.view.with_criteria(criteria);
    }

    fn on_search_results(&mut self, result: AggregatedResult) {
        tracing::info!(
            venues = result.venues.len(),
            slots = result.slot_keys.len(),
            "search results received"
        );
        self.view = self.view.with_result(result);
    }
}

/// Drives one complete search session over a router channel: fetch the
/// criteria, apply `selection` on top of any auto-selected values, run the
/// search, and return the final view.
pub async fn run_search_session(
    mut presenter: Presenter,
    selection: CriteriaSelection,
    requests: mpsc::Sender<Request>,
    mut responses: mpsc::Receiver<Response>,
) -> anyhow::Result<SearchView> {
    send(&requests, Request::GetSearchCriteria).await;
    loop {
        let response = recv(&mut responses).await?;
        let is_criteria = matches!(response, Response::SearchCriteriaUpdate(_));
        presenter.dispatch(response).context("load search criteria")?;
        if is_criteria {
            break;
        }
    }

    for (criterion, value) in selection {
        presenter.view = presenter.view.with_selection(criterion, value);
    }
    let wanted = presenter.view().selection().clone();
    send(&requests, Request::SetSearchCriteria(wanted)).await;
    send(&requests, Request::RunSearch).await;

    loop {
        let response = recv(&mut responses).await?;
        let is_results = matches!(response, Response::SearchResults(_));
        presenter.dispatch(response).context("search")?;
        if is_results {
            return Ok(presenter.view().clone());
        }
    }
}

/// A router that already stopped has queued its failure on the response
/// channel, so a failed send is left for `recv` to report.
async fn send(requests: &mpsc::Sender<Request>, request: Request) {
    if let Err(err) = requests.send(request).await {
        tracing::debug!(request = ?err.0, "router stopped before request was sent");
    }
}

async fn recv(responses: &mut mpsc::Receiver<Response>) -> anyhow::Result<Response> {
    responses
        .recv()
        .await
        .ok_or_else(|| anyhow::anyhow!("router closed the channel"))
}
