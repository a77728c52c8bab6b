//! Conversions from reqwest errors into transport-boundary failures.

use reqwest::Error as HttpError;
use routelink_common::http::TransportFailure;

use super::InfraError;

/// Maps an external error onto the transport boundary.
///
/// A local trait so the mapping can live here rather than on the foreign
/// `TransportFailure` type.
pub(crate) trait IntoTransportFailure {
    fn into_transport_failure(self) -> TransportFailure;
}

impl IntoTransportFailure for HttpError {
    fn into_transport_failure(self) -> TransportFailure {
        if self.is_timeout() {
            return TransportFailure::TimedOut;
        }

        let kind = if self.is_connect() {
            "connect"
        } else if self.is_body() || self.is_decode() {
            "body"
        } else if self.is_redirect() {
            "redirect"
        } else {
            "request"
        };
        TransportFailure::Connection(format!("http {kind} error: {self}"))
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError::HttpClient(value.to_string())
    }
}
