use std::{
    rc::Rc,
    sync::{mpsc, Arc},
    thread::JoinHandle,
    time::Duration,
};

use futures_channel::oneshot::{Receiver as OReceiver, Sender as OSender};
use lagoon_core::{
    config::Config,
    context::DatabaseContextPool,
    dispatch::Dispatcher,
    gauge::ConnectionGauge,
    handoff::WsSessionHub,
    listener::ListenerBuilder,
    session::SessionStore,
    AnyError, TransportError,
};
use lagoon_services::{
    http::{ConnectionWorker, MaxWorkers, UpgradeNegotiator, WsEndpoints},
    serve, ErrorSink,
};
use monoio::utils::bind_to_cpu_set;
use monoio_http::common::body::HttpBody;
use tracing::{error, info, warn};

use crate::runtime::RuntimeWrapper;

/// How long a stopping worker waits for its live connections to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Handles to the running worker threads. Dropping the held stop
/// receivers tells the serve loops to wind down.
pub struct WorkerFleet {
    handles: Vec<(JoinHandle<()>, OReceiver<()>)>,
}

impl WorkerFleet {
    /// Block until every worker thread exits.
    pub fn join(self) {
        for (handle, _stop) in self.handles {
            let _ = handle.join();
        }
    }

    /// Stop the serve loops, then wait for the workers to drain and exit.
    #[allow(dead_code)]
    pub fn shutdown(self) {
        let (handles, stops): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        drop(stops);
        for handle in handles {
            let _ = handle.join();
        }
    }
}

/// Start one accept-and-serve thread per configured worker, each with its
/// own runtime and its own listener on the shared address.
///
/// `app` is called once per worker, on the worker's thread, to build the
/// dispatcher, session store and websocket hub (they need not be `Send`).
/// Returns once every worker has bound its listener; the first bind
/// failure aborts the whole fleet.
pub fn spawn_workers<A, D, S, H>(
    config: Arc<Config>,
    gauge: ConnectionGauge,
    app: A,
) -> anyhow::Result<WorkerFleet>
where
    A: Fn(usize) -> (D, S, H) + Clone + Send + 'static,
    D: Dispatcher<Body = HttpBody> + 'static,
    S: SessionStore + 'static,
    H: WsSessionHub + 'static,
{
    let cores = if config.runtime.cpu_affinity {
        std::thread::available_parallelism().ok()
    } else {
        None
    };

    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AnyError>>();
    let mut handles = Vec::with_capacity(config.runtime.worker_threads);
    for worker_id in 0..config.runtime.worker_threads {
        let config = config.clone();
        let gauge = gauge.clone();
        let app = app.clone();
        let ready_tx = ready_tx.clone();
        let (stop_tx, stop_rx) = futures_channel::oneshot::channel::<()>();
        let handle = std::thread::Builder::new()
            .name(format!("lagoon-worker-{worker_id}"))
            .spawn(move || {
                if let Some(cores) = cores {
                    let core = worker_id % cores.get();
                    if let Err(e) = bind_to_cpu_set([core]) {
                        warn!("bind thread {worker_id} to core {core} failed: {e}");
                    }
                }
                let mut runtime = RuntimeWrapper::from(&config.runtime);
                runtime.block_on(worker_loop(config, gauge, app, worker_id, ready_tx, stop_tx));
            })
            .map_err(|e| anyhow::anyhow!("start worker thread {worker_id}: {e}"))?;
        handles.push((handle, stop_rx));
    }
    drop(ready_tx);

    // Every worker reports its listener setup before we declare success.
    for _ in 0..handles.len() {
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => anyhow::bail!("worker exited before reporting listener setup"),
        }
    }
    Ok(WorkerFleet { handles })
}

async fn worker_loop<A, D, S, H>(
    config: Arc<Config>,
    gauge: ConnectionGauge,
    app: A,
    worker_id: usize,
    ready_tx: mpsc::Sender<Result<(), AnyError>>,
    stop: OSender<()>,
) where
    A: Fn(usize) -> (D, S, H),
    D: Dispatcher<Body = HttpBody> + 'static,
    S: SessionStore + 'static,
    H: WsSessionHub + 'static,
{
    let endpoints = match WsEndpoints::new(&config.server.ws_endpoints) {
        Ok(endpoints) => endpoints,
        Err(e) => {
            let _ = ready_tx.send(Err(anyhow::anyhow!("invalid websocket endpoint: {e}")));
            return;
        }
    };
    let listener = match ListenerBuilder::bind_tcp(config.server.listen).build() {
        Ok(listener) => listener,
        Err(e) => {
            let _ = ready_tx.send(Err(TransportError::bind(e).into()));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));
    drop(ready_tx);

    let (errors, mut error_rx) = ErrorSink::channel();
    monoio::spawn(async move {
        while let Some(err) = error_rx.recv().await {
            warn!("transport fault: {err}");
        }
    });

    let (dispatcher, store, hub) = app(worker_id);
    let negotiator = Rc::new(UpgradeNegotiator::new(
        endpoints,
        store,
        hub,
        config.server.session_cookie.clone(),
    ));
    let worker = ConnectionWorker::new(
        Rc::new(dispatcher),
        negotiator,
        config.server.keepalive(),
        MaxWorkers(config.server.max_workers),
        gauge.clone(),
        Rc::new(DatabaseContextPool::new()),
        errors,
    );

    info!("worker {worker_id} serving {}", config.server.listen);
    serve(listener, Rc::new(worker), stop).await;

    if !gauge.wait_for_drain(DRAIN_TIMEOUT).await {
        error!(
            "worker {worker_id} stopping with {} connections still live",
            gauge.current()
        );
    }
}
