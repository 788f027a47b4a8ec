use std::io;

use http::StatusCode;
use thiserror::Error;

pub type AnyError = anyhow::Error;
pub type AnyResult<T, E = AnyError> = Result<T, E>;

/// Fault raised by the application dispatcher for a single request.
///
/// Both variants are recovered locally by the connection worker: an error
/// response is written and the connection continues under the normal
/// keep-alive rules. Neither ends the connection by itself.
#[derive(Error, Debug)]
pub enum DispatchFault {
    /// The request was malformed or rejected by policy; the carried status
    /// code is echoed back to the client.
    #[error("client fault: status {0}")]
    Client(StatusCode),
    /// Any unexpected failure during dispatch; answered with a generic 500.
    #[error("internal fault: {0}")]
    Internal(#[source] AnyError),
}

/// Transport-level failures, fatal to a single connection only.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("listener bind failed (os error {code:?}): {source}")]
    Bind {
        code: Option<i32>,
        #[source]
        source: io::Error,
    },
    /// Upgrade validation failed; the connection is in an indeterminate
    /// protocol state and must be closed without an HTTP response.
    #[error("websocket upgrade rejected: no endpoint registered for {path}")]
    UpgradeRejected { path: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn bind(source: io::Error) -> Self {
        Self::Bind {
            code: source.raw_os_error(),
            source,
        }
    }
}
