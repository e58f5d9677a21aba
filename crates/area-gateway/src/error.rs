// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP error responses. Every failure renders as `{"detail": "..."}`.

use area_core::{AreaError, ErrorClass};
use axum::Json;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// An error leaving a handler.
#[derive(Debug)]
pub enum ApiError {
    Domain(AreaError),
    /// A request the extractors could not parse.
    Rejected { status: StatusCode, detail: String },
}

impl From<AreaError> for ApiError {
    fn from(err: AreaError) -> Self {
        ApiError::Domain(err)
    }
}

macro_rules! rejection {
    ($($rejection:ty),*) => {
        $(impl From<$rejection> for ApiError {
            fn from(rejection: $rejection) -> Self {
                ApiError::Rejected {
                    status: rejection.status(),
                    detail: rejection.body_text(),
                }
            }
        })*
    };
}

rejection!(JsonRejection, FormRejection, PathRejection, QueryRejection);

/// Status code for a domain error.
pub fn status_for(err: &AreaError) -> StatusCode {
    match err {
        AreaError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AreaError::NotFound(_) => StatusCode::NOT_FOUND,
        AreaError::Conflict(_) => StatusCode::CONFLICT,
        AreaError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => match err.classify() {
            ErrorClass::Client | ErrorClass::TerminalProvider => StatusCode::BAD_REQUEST,
            ErrorClass::TransientProvider => StatusCode::BAD_GATEWAY,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Rejected { status, detail } => (status, detail),
            ApiError::Domain(err) => {
                let status = status_for(&err);
                if err.classify() == ErrorClass::Internal {
                    tracing::error!(error = %err, "request failed");
                    (status, "Internal server error".to_string())
                } else {
                    (status, err.to_string())
                }
            }
        };
        let mut response = (status, Json(ErrorBody { detail })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
