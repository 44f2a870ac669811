use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::persistence::SequenceId;
use crate::utils::error::Rejection;

/// JSON body returned by the HTTP ingress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IngressResponse {
    Accepted {
        message: String,
        sequence_id: SequenceId,
    },
    Error {
        error: String,
    },
}

impl IngressResponse {
    pub fn accepted(sequence_id: SequenceId) -> Self {
        Self::Accepted {
            message: "Message received".to_string(),
            sequence_id,
        }
    }

    pub fn rejected(rejection: Rejection) -> Self {
        Self::Error {
            error: rejection.to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self::Error {
            error: "Not found".to_string(),
        }
    }
}

/// Client mistakes are 400s, a store that failed to commit is a 500.
pub fn status_for(rejection: Rejection) -> StatusCode {
    match rejection {
        Rejection::MalformedPayload | Rejection::MissingFields => StatusCode::BAD_REQUEST,
        Rejection::PersistenceFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
