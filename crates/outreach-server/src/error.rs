use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use outreach_core::OutreachError;

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

fn status_for(e: &OutreachError) -> StatusCode {
    match e {
        OutreachError::NotInitialized => StatusCode::BAD_REQUEST,
        OutreachError::CampaignNotFound(_)
        | OutreachError::LeadNotFound { .. }
        | OutreachError::AttemptNotFound(_) => StatusCode::NOT_FOUND,
        OutreachError::CampaignExists(_)
        | OutreachError::CampaignKilled(_)
        | OutreachError::AlreadyHeld { .. }
        | OutreachError::LeaseLost(_) => StatusCode::CONFLICT,
        OutreachError::InvalidCampaign { .. }
        | OutreachError::InvalidLead(_)
        | OutreachError::InvalidSlug(_)
        | OutreachError::InvalidState(_)
        | OutreachError::InvalidChannel(_)
        | OutreachError::InvalidSignal(_)
        | OutreachError::InvalidSuppression(_) => StatusCode::BAD_REQUEST,
        OutreachError::StepImmutable { .. } | OutreachError::InvalidTransition { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        OutreachError::ChannelNotConfigured(_) | OutreachError::ChannelConfig(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        OutreachError::Store(_)
        | OutreachError::Io(_)
        | OutreachError::Yaml(_)
        | OutreachError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self
            .0
            .downcast_ref::<OutreachError>()
            .map(status_for)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
