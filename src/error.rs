//! Error types for the dashboard service.

use crate::tree::TreeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("No active session")]
    NoSession,

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("Record type {0} does not support status changes")]
    StatusUnsupported(String),

    #[error("Invalid data format received from server: {0}")]
    InvalidPayload(String),

    #[error("ERP API error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Request to ERP API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Fetch superseded by a newer request")]
    Superseded,

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Tree is {depth} levels deep, nested output is limited to {max}; use the rows view")]
    TreeTooDeep { depth: usize, max: usize },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;

impl DashboardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailed(_) | Self::NoSession => StatusCode::UNAUTHORIZED,
            Self::UnknownRecordType(_) => StatusCode::NOT_FOUND,
            Self::StatusUnsupported(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status: 404, .. } => StatusCode::NOT_FOUND,
            Self::Upstream { status: 400, .. } => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } | Self::Transport(_) | Self::InvalidPayload(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Superseded => StatusCode::CONFLICT,
            Self::Tree(_) | Self::TreeTooDeep { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the upstream token should be considered dead.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }
        (status, self.to_string()).into_response()
    }
}
