/**
 * Helper functions for creating and classifying cache error types
 */
use super::kinds::ResourceKind;
use crate::error::Error;
use kube::error::ErrorResponse;

/// HTTP status the API server uses for an expired resource version
pub const RESOURCE_EXPIRED_CODE: u16 = 410;

/// Wrap a listing failure for `kind` as a warm-up error
#[must_use]
pub fn warm_up_error(kind: ResourceKind, source: Error) -> Error {
    Error::WarmUp {
        kind,
        source: Box::new(source),
    }
}

/// Create the `Expired` error response the API server sends for a stale resource version
#[must_use]
pub fn resource_expired_response(message: &str) -> ErrorResponse {
    ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "Expired".to_string(),
        code: RESOURCE_EXPIRED_CODE,
    }
}

/// True when the response says the resumption token can no longer be used
#[must_use]
pub fn is_resource_expired(response: &ErrorResponse) -> bool {
    response.code == RESOURCE_EXPIRED_CODE || response.reason == "Expired" || response.reason == "Gone"
}

/// Same check against a crate error, e.g. one returned while opening a watch
#[must_use]
pub fn is_expired_error(error: &Error) -> bool {
    match error {
        Error::Kube(kube::Error::Api(response)) => is_resource_expired(response),
        _ => false,
    }
}
