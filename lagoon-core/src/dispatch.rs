use std::{future::Future, net::SocketAddr};

use http::{Request, Response};

use crate::{context::DatabaseContext, error::DispatchFault};

/// Per-request context handed to the application dispatcher: the
/// connection id, the peer address, and the worker's database context.
pub struct DispatchContext<'a> {
    pub conn_id: u64,
    pub peer: SocketAddr,
    pub db: &'a DatabaseContext,
}

/// Application dispatch collaborator.
///
/// Executes business code for one request and returns the response to be
/// written by the worker. Faults are reported through [`DispatchFault`]
/// rather than unwinding: a client fault carries the status code to echo
/// back, anything else is an internal fault.
pub trait Dispatcher {
    type Body;

    fn execute(
        &self,
        request: Request<Self::Body>,
        cx: DispatchContext<'_>,
    ) -> impl Future<Output = Result<Response<Self::Body>, DispatchFault>>;
}
