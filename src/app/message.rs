use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ErrorPayload;
use crate::form::{CriteriaSelection, SearchCriteria};
use crate::model::AggregatedResult;

pub const CHANNEL_CAPACITY: usize = 32;

/// Messages sent by the presentation surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    GetSearchCriteria,
    SetSearchCriteria(CriteriaSelection),
    RunSearch,
}

/// Messages sent back by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    SearchCriteriaUpdate(SearchCriteria),
    SearchResults(Result<AggregatedResult, ErrorPayload>),
    /// The router hit an unrecoverable error and stopped.
    Failure(ErrorPayload),
}

impl Response {
    /// The error carried by this message, if any.
    pub fn error(&self) -> Option<&ErrorPayload> {
        match self {
            Self::SearchResults(Err(err)) | Self::Failure(err) => Some(err),
            Self::SearchCriteriaUpdate(_) | Self::SearchResults(Ok(_)) => None,
        }
    }
}

pub fn channel<T>() -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::form::Criterion;

    #[test]
    fn requests_use_screaming_type_tags() {
        let json = serde_json::to_value(Request::RunSearch).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "RUN_SEARCH" }));

        let request: Request = serde_json::from_str(
            r#"{"type":"SET_SEARCH_CRITERIA","data":{"facilityType":"TENNIS"}}"#,
        )
        .unwrap();
        let Request::SetSearchCriteria(selection) = request else {
            panic!("unexpected request: {request:?}");
        };
        assert_eq!(selection[&Criterion::FacilityType], "TENNIS");
    }

    #[test]
    fn unit_request_parses_without_data() {
        let request: Request = serde_json::from_str(r#"{"type":"GET_SEARCH_CRITERIA"}"#).unwrap();
        assert_eq!(request, Request::GetSearchCriteria);
    }

    #[test]
    fn error_responses_expose_payload() {
        let payload = ErrorPayload::new(ErrorKind::Resource, "venue list is not ready");
        let response = Response::SearchResults(Err(payload.clone()));
        assert_eq!(response.error(), Some(&payload));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "SEARCH_RESULTS");
        assert_eq!(json["data"]["Err"]["kind"], "ResourceError");

        let ok = Response::SearchResults(Ok(AggregatedResult::default()));
        assert!(ok.error().is_none());
    }
}
