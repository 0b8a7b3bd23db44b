use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dog_blobstore::{BlobError, ErrorKind};
use serde_json::json;

/// Maps a [`BlobError`] onto a JSON error response
#[derive(Debug)]
pub struct BlobApiError(pub BlobError);

impl From<BlobError> for BlobApiError {
    fn from(e: BlobError) -> Self {
        Self(e)
    }
}

impl BlobApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::InvalidInput | ErrorKind::InvalidRange => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            ErrorKind::Backend => StatusCode::BAD_GATEWAY,
            ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn name(&self) -> &'static str {
        match self.0.kind() {
            ErrorKind::InvalidInput | ErrorKind::InvalidRange => "BadRequest",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::RangeNotSatisfiable => "RangeNotSatisfiable",
            ErrorKind::Backend => "BadGateway",
            ErrorKind::Io => "GeneralError",
        }
    }
}

impl IntoResponse for BlobApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = json!({
            "name": self.name(),
            "message": self.0.to_string(),
            "code": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (BlobError::invalid_input("x"), StatusCode::BAD_REQUEST),
            (BlobError::invalid_range("abc", "bad"), StatusCode::BAD_REQUEST),
            (BlobError::not_found("b", "k"), StatusCode::NOT_FOUND),
            (
                BlobError::RangeNotSatisfiable {
                    key: "k".into(),
                    start: 5,
                    end: 9,
                },
                StatusCode::RANGE_NOT_SATISFIABLE,
            ),
            (BlobError::backend("get_object", "timeout"), StatusCode::BAD_GATEWAY),
        ];

        for (err, expected) in cases {
            assert_eq!(BlobApiError(err).status(), expected);
        }
    }
}
