use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::counter::CounterError;
use crate::Located;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("could not record the button click: {source}"))]
    TrackButtonClick { source: CounterError },

    #[snafu(display("could not record the page view: {source}"))]
    TrackPageView { source: CounterError },

    #[snafu(display("could not list the button clicks: {source}"))]
    ListButtonClicks { source: CounterError },

    #[snafu(display("could not list the page views: {source}"))]
    ListPageViews { source: CounterError },
}

impl ApiError {
    fn counter_error(&self) -> &CounterError {
        match self {
            ApiError::TrackButtonClick { source }
            | ApiError::TrackPageView { source }
            | ApiError::ListButtonClicks { source }
            | ApiError::ListPageViews { source } => source,
        }
    }

    pub fn status(&self) -> StatusCode {
        let error = self.counter_error();

        if error.is_validation() {
            StatusCode::BAD_REQUEST
        } else if error.is_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let location = self.counter_error().location();

        if status.is_server_error() {
            tracing::error!(error = %self, %location, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        let body = Failure {
            success: false,
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
