// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

//! Cosmos DB details carried by [`azure_core::Error`].
//!
//! Every failure surfaces as an [`azure_core::Error`]. Failed responses use
//! [`ErrorKind::HttpResponse`] and wrap a [`ServiceError`]; cancelled and timed out operations wrap
//! a [`RequestInterrupted`]. [`CosmosErrorExt`] reads both back.

use std::{fmt, io, time::Duration};

use azure_core::{
    error::ErrorKind,
    http::{headers::Headers, StatusCode},
    Error,
};
use serde::Deserialize;

use crate::{constants, utils::header_as};

/// Details of a response the service answered with a failure status.
///
/// Everything needed to diagnose a failure without access to client internals is captured here:
/// the status and sub-status codes, the service activity id, any retry-after hint and the error body.
#[derive(Clone, Debug)]
pub struct ServiceError {
    status: StatusCode,
    sub_status: Option<u32>,
    activity_id: Option<String>,
    retry_after: Option<Duration>,
    request_charge: Option<f64>,
    error_code: Option<String>,
    error_message: Option<String>,
    headers: Headers,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl ServiceError {
    /// Builds a [`ServiceError`] from the parts of a failed response.
    pub fn new(status: StatusCode, headers: Headers, body: &[u8]) -> Self {
        let (error_code, error_message) = match serde_json::from_slice::<ErrorBody>(body) {
            Ok(body) => (body.code, body.message),
            Err(_) if body.is_empty() => (None, None),
            Err(_) => (None, Some(String::from_utf8_lossy(body).into_owned())),
        };
        let retry_after = header_as::<f64>(&headers, &constants::RETRY_AFTER_MS)
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| Duration::from_micros((ms * 1000.0) as u64));

        Self {
            status,
            sub_status: header_as(&headers, &constants::SUB_STATUS),
            activity_id: headers
                .get_optional_str(&constants::ACTIVITY_ID)
                .map(ToOwned::to_owned),
            retry_after,
            request_charge: header_as(&headers, &constants::REQUEST_CHARGE),
            error_code,
            error_message,
            headers,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn sub_status(&self) -> Option<u32> {
        self.sub_status
    }

    pub fn activity_id(&self) -> Option<&str> {
        self.activity_id.as_deref()
    }

    /// The delay the service asked the client to wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn request_charge(&self) -> Option<f64> {
        self.request_charge
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Wraps this failure in an [`azure_core::Error`] of kind [`ErrorKind::HttpResponse`].
    pub fn into_error(self) -> Error {
        let kind = ErrorKind::HttpResponse {
            status: self.status,
            error_code: self.error_code.clone(),
            raw_response: None,
        };
        Error::new(kind, self)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", u16::from(self.status))?;
        if let Some(sub_status) = self.sub_status {
            write!(f, " (sub-status {})", sub_status)?;
        }
        if let Some(code) = &self.error_code {
            write!(f, ": {}", code)?;
        }
        if let Some(message) = &self.error_message {
            write!(f, ": {}", message)?;
        }
        if let Some(activity_id) = &self.activity_id {
            write!(f, " [activity id {}]", activity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceError {}

/// Why an operation stopped before the service answered.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestInterrupted {
    #[error("the request did not complete within {0:?}")]
    Timeout(Duration),
    #[error("the operation was cancelled")]
    Cancelled,
}

impl RequestInterrupted {
    pub(crate) fn into_error(self) -> Error {
        Error::new(ErrorKind::Other, self)
    }
}

pub(crate) fn cancelled() -> Error {
    RequestInterrupted::Cancelled.into_error()
}

/// Finds the first error of type `T` in the source chain of `error`.
fn find_source<T: std::error::Error + 'static>(error: &Error) -> Option<&T> {
    let mut source = std::error::Error::source(error);
    while let Some(current) = source {
        if let Some(found) = current.downcast_ref::<T>() {
            return Some(found);
        }
        source = current.source();
    }
    None
}

/// Cosmos DB accessors for [`azure_core::Error`].
///
/// ```rust
/// use azure_data_cosmos_core::{CosmosErrorExt, ServiceError};
/// use azure_core::http::{headers::Headers, StatusCode};
///
/// let error = ServiceError::new(StatusCode::Gone, Headers::new(), b"").into_error();
/// assert!(error.is_gone());
/// assert_eq!(error.sub_status(), None);
/// ```
pub trait CosmosErrorExt {
    /// The failed response, if the service answered.
    fn service_error(&self) -> Option<&ServiceError>;

    /// The reason the operation stopped early, if it was cancelled or timed out.
    fn interruption(&self) -> Option<&RequestInterrupted>;

    fn status(&self) -> Option<StatusCode> {
        self.service_error().map(ServiceError::status)
    }

    fn sub_status(&self) -> Option<u32> {
        self.service_error().and_then(ServiceError::sub_status)
    }

    fn retry_after(&self) -> Option<Duration> {
        self.service_error().and_then(ServiceError::retry_after)
    }

    fn activity_id(&self) -> Option<&str> {
        self.service_error().and_then(ServiceError::activity_id)
    }

    /// Returns `true` if the service throttled the request (HTTP 429).
    fn is_throttled(&self) -> bool {
        self.status() == Some(StatusCode::TooManyRequests)
    }

    /// Returns `true` if the service reported the resource as gone (HTTP 410).
    fn is_gone(&self) -> bool {
        self.status() == Some(StatusCode::Gone)
    }

    fn is_cancelled(&self) -> bool {
        self.interruption() == Some(&RequestInterrupted::Cancelled)
    }

    fn is_timeout(&self) -> bool {
        matches!(self.interruption(), Some(RequestInterrupted::Timeout(_)))
    }
}

impl CosmosErrorExt for Error {
    fn service_error(&self) -> Option<&ServiceError> {
        find_source(self)
    }

    fn interruption(&self) -> Option<&RequestInterrupted> {
        find_source(self)
    }
}

/// Returns `true` if a request pinned to a partition key range failed because the range split.
pub(crate) fn is_partition_split(error: &Error) -> bool {
    error.is_gone()
        && matches!(
            error.sub_status(),
            Some(
                constants::SUB_STATUS_PARTITION_KEY_RANGE_GONE
                    | constants::SUB_STATUS_COMPLETING_SPLIT
            )
        )
}

/// How a transport failure relates to the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NetworkFailure {
    /// No connection was made; the request never left the client.
    Connect,
    /// The exchange failed after the request may have reached the service.
    Io,
}

/// Classifies errors returned by the transport. Service and interruption errors are not network
/// failures.
pub(crate) fn network_failure(error: &Error) -> Option<NetworkFailure> {
    if error.service_error().is_some() || error.interruption().is_some() {
        return None;
    }
    match find_source::<io::Error>(error).map(io::Error::kind) {
        Some(
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::NotConnected
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable,
        ) => Some(NetworkFailure::Connect),
        Some(_) => Some(NetworkFailure::Io),
        None if matches!(error.kind(), ErrorKind::Io) => Some(NetworkFailure::Io),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn throttled_headers() -> Headers {
        let mut headers = Headers::new();
        headers.insert(constants::RETRY_AFTER_MS, "12.5");
        headers.insert(constants::SUB_STATUS, "3200");
        headers.insert(constants::ACTIVITY_ID, "a1b2");
        headers.insert(constants::REQUEST_CHARGE, "0.38");
        headers
    }

    #[test]
    fn service_error_captures_diagnostics() {
        let error = ServiceError::new(
            StatusCode::TooManyRequests,
            throttled_headers(),
            br#"{"code":"TooManyRequests","message":"Request rate is large"}"#,
        );

        assert_eq!(error.status(), StatusCode::TooManyRequests);
        assert_eq!(error.sub_status(), Some(3200));
        assert_eq!(error.activity_id(), Some("a1b2"));
        assert_eq!(error.retry_after(), Some(Duration::from_micros(12_500)));
        assert_eq!(error.request_charge(), Some(0.38));
        assert_eq!(error.error_code(), Some("TooManyRequests"));
        assert_eq!(error.error_message(), Some("Request rate is large"));
    }

    #[test]
    fn service_error_keeps_non_json_body_as_message() {
        let error = ServiceError::new(StatusCode::BadRequest, Headers::new(), b"bad things");
        assert_eq!(error.error_code(), None);
        assert_eq!(error.error_message(), Some("bad things"));
    }

    #[test]
    fn wrapped_service_error_is_an_http_response() {
        let error =
            ServiceError::new(StatusCode::TooManyRequests, throttled_headers(), b"").into_error();

        assert!(matches!(
            error.kind(),
            ErrorKind::HttpResponse {
                status: StatusCode::TooManyRequests,
                ..
            }
        ));
        assert!(error.is_throttled());
        assert!(!error.is_cancelled());
        assert_eq!(error.sub_status(), Some(3200));
        assert_eq!(error.activity_id(), Some("a1b2"));
        assert!(error.to_string().contains("429"));
    }

    #[test]
    fn details_survive_shared_wrapping() {
        let inner = ServiceError::new(StatusCode::Gone, Headers::new(), b"").into_error();
        let outer = Error::new(ErrorKind::Other, Arc::new(inner));
        assert!(outer.is_gone());
    }

    #[test]
    fn cancellation_is_distinct_from_timeout() {
        let cancelled = cancelled();
        let timeout = RequestInterrupted::Timeout(Duration::from_secs(1)).into_error();

        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_timeout());
        assert!(timeout.is_timeout());
        assert!(!timeout.is_cancelled());
        assert_eq!(cancelled.status(), None);
        assert_eq!(network_failure(&timeout), None);
    }

    #[test]
    fn gone_with_split_sub_status_is_a_partition_split() {
        let split = |sub_status: &'static str| {
            let mut headers = Headers::new();
            headers.insert(constants::SUB_STATUS, sub_status);
            ServiceError::new(StatusCode::Gone, headers, b"").into_error()
        };
        assert!(is_partition_split(&split("1002")));
        assert!(is_partition_split(&split("1007")));
        assert!(!is_partition_split(&split("1000")));
        assert!(!is_partition_split(
            &ServiceError::new(StatusCode::Gone, Headers::new(), b"").into_error()
        ));
    }

    #[test]
    fn refused_connections_are_connect_failures() {
        let refused = Error::new(
            ErrorKind::Io,
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        let reset = Error::new(ErrorKind::Io, io::Error::from(io::ErrorKind::ConnectionReset));
        let conversion = Error::new(ErrorKind::DataConversion, "bad json");

        assert_eq!(network_failure(&refused), Some(NetworkFailure::Connect));
        assert_eq!(network_failure(&reset), Some(NetworkFailure::Io));
        assert_eq!(network_failure(&conversion), None);
    }
}
