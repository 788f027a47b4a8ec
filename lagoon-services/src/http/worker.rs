use std::{convert::Infallible, rc::Rc};

use http::StatusCode;
use lagoon_core::{
    config::KeepAlive,
    connection::{ConnInfo, Liveness},
    context::{DatabaseContext, DatabaseContextPool},
    dispatch::{DispatchContext, Dispatcher},
    gauge::ConnectionGauge,
    handoff::WsSessionHub,
    session::SessionStore,
    DispatchFault,
};
use monoio::io::{AsyncReadRent, AsyncWriteRent, Split, Splitable};
use monoio_http::common::body::HttpBody;
use service_async::{AsyncMakeService, MakeService, Service};
use tracing::{debug, error, info, warn};

use super::{
    generate_response,
    reader::{RequestBatch, RequestReader, BATCH_POLL_INTERVAL, IDLE_POLL_INTERVAL},
    upgrade::{upgrade_target, UpgradeNegotiator, UpgradeTarget},
    writer::ResponseWriter,
};
use crate::serve::{Accepted, ErrorSink};

/// Keep-alive admission bound: once the live worker count reaches this
/// value, connections stop being kept alive after their current batch.
/// Zero disables the bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaxWorkers(pub usize);

/// Control-loop states of a connection worker.
enum WorkerState {
    ReadingBatch,
    Dispatching(RequestBatch),
    UpgradePending(http::Request<HttpBody>),
    Idle,
    Closing { transferred: bool },
}

/// Owns one accepted connection end to end.
///
/// The worker registers itself on the [`ConnectionGauge`], binds a
/// database context, and drives the state machine: read a batch, either
/// dispatch it in arrival order or negotiate a protocol upgrade, decide
/// keep-alive, idle for the next batch, and finally close or transfer
/// the socket. Gauge slot and database context are released exactly once
/// on every exit path.
pub struct ConnectionWorker<D, S, H> {
    dispatcher: Rc<D>,
    negotiator: Rc<UpgradeNegotiator<S, H>>,
    keepalive: KeepAlive,
    max_workers: MaxWorkers,
    gauge: ConnectionGauge,
    db_pool: Rc<DatabaseContextPool>,
    errors: ErrorSink,
}

impl<D, S, H> Clone for ConnectionWorker<D, S, H> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            negotiator: self.negotiator.clone(),
            keepalive: self.keepalive,
            max_workers: self.max_workers,
            gauge: self.gauge.clone(),
            db_pool: self.db_pool.clone(),
            errors: self.errors.clone(),
        }
    }
}

impl<D, S, H> ConnectionWorker<D, S, H> {
    pub fn new(
        dispatcher: Rc<D>,
        negotiator: Rc<UpgradeNegotiator<S, H>>,
        keepalive: KeepAlive,
        max_workers: MaxWorkers,
        gauge: ConnectionGauge,
        db_pool: Rc<DatabaseContextPool>,
        errors: ErrorSink,
    ) -> Self {
        Self {
            dispatcher,
            negotiator,
            keepalive,
            max_workers,
            gauge,
            db_pool,
            errors,
        }
    }
}

impl<D, S, H> Service<Accepted> for ConnectionWorker<D, S, H>
where
    D: Dispatcher<Body = HttpBody>,
    S: SessionStore,
    H: WsSessionHub,
{
    type Response = ();
    type Error = Infallible;

    async fn call(&self, (stream, peer): Accepted) -> Result<Self::Response, Self::Error> {
        let conn = ConnInfo::from_stream(&stream, peer);
        self.drive(stream, conn).await;
        Ok(())
    }
}

impl<D, S, H> ConnectionWorker<D, S, H>
where
    D: Dispatcher<Body = HttpBody>,
    S: SessionStore,
    H: WsSessionHub,
{
    async fn drive<IO>(&self, io: IO, conn: ConnInfo)
    where
        IO: Split + AsyncReadRent + AsyncWriteRent,
    {
        // Starting: tally the worker and bind its database context. Both
        // are released on drop when this frame ends, so every exit path
        // pays them back exactly once.
        let _tally = self.gauge.track();
        let db = self.db_pool.bind();

        let (rd, wr) = io.into_split();
        let mut reader = RequestReader::new(rd);
        let mut writer = ResponseWriter::new(wr, self.keepalive.enabled());

        let mut state = WorkerState::ReadingBatch;
        let transferred = loop {
            state = match state {
                WorkerState::ReadingBatch => {
                    let batch = reader
                        .read_batch(&conn, self.keepalive, BATCH_POLL_INTERVAL)
                        .await;
                    classify_batch(batch)
                }
                WorkerState::Idle => {
                    let batch = reader
                        .read_batch(&conn, self.keepalive, IDLE_POLL_INTERVAL)
                        .await;
                    classify_batch(batch)
                }
                WorkerState::UpgradePending(first) => self.upgrade(first, &conn),
                WorkerState::Dispatching(batch) => {
                    self.dispatch(batch, &mut writer, &conn, &db).await
                }
                WorkerState::Closing { transferred } => break transferred,
            };
        };

        if transferred {
            // Ownership moved to the websocket subsystem. Our descriptor
            // copy is released on drop without a shutdown, leaving the
            // duplicated end as the only live one.
            debug!("connection {} transferred to websocket", conn.id());
        } else {
            info!("connection {} from {} closed", conn.id(), conn.peer());
        }
        // Terminated: db context and gauge guard drop here.
    }

    fn upgrade(&self, first: http::Request<HttpBody>, conn: &ConnInfo) -> WorkerState {
        match upgrade_target(&first) {
            UpgradeTarget::WebSocket => {
                let (head, _body) = first.into_parts();
                match self.negotiator.negotiate(head, conn) {
                    Ok(()) => WorkerState::Closing { transferred: true },
                    Err(err) => {
                        self.errors.report(err);
                        WorkerState::Closing { transferred: false }
                    }
                }
            }
            _ => {
                debug!(
                    "unsupported upgrade target from {}, closing connection {}",
                    conn.peer(),
                    conn.id()
                );
                WorkerState::Closing { transferred: false }
            }
        }
    }

    async fn dispatch<W: AsyncWriteRent>(
        &self,
        batch: RequestBatch,
        writer: &mut ResponseWriter<W>,
        conn: &ConnInfo,
        db: &DatabaseContext,
    ) -> WorkerState {
        for request in batch {
            let cx = DispatchContext {
                conn_id: conn.id(),
                peer: conn.peer(),
                db,
            };
            let response = match self.dispatcher.execute(request, cx).await {
                Ok(response) => response,
                Err(DispatchFault::Client(code)) => {
                    warn!("client fault on connection {}: status {code}", conn.id());
                    generate_response(code, false)
                }
                Err(DispatchFault::Internal(err)) => {
                    error!("dispatch fault on connection {}: {err:?}", conn.id());
                    generate_response(StatusCode::INTERNAL_SERVER_ERROR, false)
                }
            };
            if let Err(err) = writer.write(response).await {
                warn!("write response on connection {} failed: {err}", conn.id());
                conn.set_state(Liveness::Error);
                return WorkerState::Closing { transferred: false };
            }
            conn.touch();
        }

        // Keep-alive decision: disabled means one batch per connection;
        // at capacity, shed keep-alive load before shedding new
        // connections.
        if !self.keepalive.enabled() {
            return WorkerState::Closing { transferred: false };
        }
        let live = self.gauge.current();
        if self.max_workers.0 > 0 && live >= self.max_workers.0 {
            debug!(
                "shedding keep-alive on connection {}: {live} live workers",
                conn.id()
            );
            return WorkerState::Closing { transferred: false };
        }
        WorkerState::Idle
    }
}

fn classify_batch(mut batch: RequestBatch) -> WorkerState {
    if batch.is_empty() {
        return WorkerState::Closing { transferred: false };
    }
    match upgrade_target(&batch[0]) {
        UpgradeTarget::None => WorkerState::Dispatching(batch),
        // Only the first request is carried forward; pipelined requests
        // behind an upgrade request are dropped.
        _ => WorkerState::UpgradePending(batch.swap_remove(0)),
    }
}

// ConnectionWorker is a Service and a MakeService.
impl<D, S, H> MakeService for ConnectionWorker<D, S, H> {
    type Service = Self;
    type Error = Infallible;

    fn make_via_ref(&self, _old: Option<&Self::Service>) -> Result<Self::Service, Self::Error> {
        Ok(self.clone())
    }
}

impl<D, S, H> AsyncMakeService for ConnectionWorker<D, S, H> {
    type Service = Self;
    type Error = Infallible;

    async fn make_via_ref(
        &self,
        _old: Option<&Self::Service>,
    ) -> Result<Self::Service, Self::Error> {
        Ok(self.clone())
    }
}
