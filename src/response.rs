//! The reply-attachment contract: every successful handler produces a
//! [`Reply`] (status, result, message, optional total count) and hands it to
//! axum's response dispatch.

use axum::{
    http::{header::HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// Response header carrying the unpaginated match total on search endpoints.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub result: Option<Value>,
    pub message: Option<String>,
    pub total_count: Option<u64>,
}

impl Reply {
    pub fn ok(result: Value) -> Self {
        Reply {
            status: StatusCode::OK,
            result: Some(result),
            message: None,
            total_count: None,
        }
    }

    pub fn created(result: Value) -> Self {
        Reply {
            status: StatusCode::CREATED,
            result: Some(result),
            message: None,
            total_count: None,
        }
    }

    pub fn no_content() -> Self {
        Reply {
            status: StatusCode::NO_CONTENT,
            result: None,
            message: None,
            total_count: None,
        }
    }

    pub fn message(status: StatusCode, message: impl Into<String>) -> Self {
        Reply {
            status,
            result: None,
            message: Some(message.into()),
            total_count: None,
        }
    }

    pub fn with_total_count(mut self, total: u64) -> Self {
        self.total_count = Some(total);
        self
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        // 204 must not carry a body; the attached result is dropped there.
        let mut response = if self.status == StatusCode::NO_CONTENT {
            self.status.into_response()
        } else if let Some(result) = self.result {
            (self.status, Json(result)).into_response()
        } else if let Some(message) = self.message {
            (self.status, Json(json!({ "message": message }))).into_response()
        } else {
            self.status.into_response()
        };
        if let Some(total) = self.total_count {
            if let Ok(v) = total.to_string().parse() {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(TOTAL_COUNT_HEADER), v);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_count_header_set_on_no_content() {
        let response = Reply::no_content().with_total_count(0).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(TOTAL_COUNT_HEADER).unwrap(),
            &"0".parse::<axum::http::HeaderValue>().unwrap()
        );
    }
}
