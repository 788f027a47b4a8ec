use cookie::Cookie;
use http::{header, request::Parts, Request};
use lagoon_core::{
    connection::ConnInfo,
    handoff::{WsHandoff, WsSessionHub},
    session::{Session, SessionStore},
    TransportError,
};
use matchit::Router;
use tracing::{debug, info};

/// Upgrade intent of the first request in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeTarget {
    /// No `Connection: upgrade` token; serve the batch as plain HTTP.
    None,
    WebSocket,
    /// An upgrade was requested but the target is not websocket; the
    /// connection stops being served over HTTP and is closed without
    /// error.
    Unsupported,
}

/// Inspect the `Connection` header for an "upgrade" token and classify
/// the `Upgrade` header. Both checks are case-insensitive.
pub fn upgrade_target<B>(request: &Request<B>) -> UpgradeTarget {
    let wants_upgrade = request
        .headers()
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false);
    if !wants_upgrade {
        return UpgradeTarget::None;
    }
    match request.headers().get(header::UPGRADE) {
        Some(target) if target.as_bytes().eq_ignore_ascii_case(b"websocket") => {
            UpgradeTarget::WebSocket
        }
        _ => UpgradeTarget::Unsupported,
    }
}

/// Endpoints registered for websocket sessions.
pub struct WsEndpoints(Router<()>);

impl WsEndpoints {
    pub fn new<I, P>(paths: I) -> Result<Self, matchit::InsertError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut router = Router::new();
        for path in paths {
            router.insert(path.as_ref(), ())?;
        }
        Ok(Self(router))
    }

    pub fn matches_registered_endpoint(&self, path: &str) -> bool {
        self.0.at(path).is_ok()
    }
}

/// Performs the websocket side of a protocol upgrade: endpoint
/// validation, socket duplication, session recovery, and handoff to the
/// websocket subsystem.
pub struct UpgradeNegotiator<S, H> {
    endpoints: WsEndpoints,
    store: S,
    hub: H,
    session_cookie: String,
}

impl<S, H> UpgradeNegotiator<S, H>
where
    S: SessionStore,
    H: WsSessionHub,
{
    pub fn new(endpoints: WsEndpoints, store: S, hub: H, session_cookie: String) -> Self {
        Self {
            endpoints,
            store,
            hub,
            session_cookie,
        }
    }

    /// Validate and perform the handoff.
    ///
    /// On success the connection counts as transferred: the caller must
    /// not write to or shut down the socket afterwards. On failure the
    /// caller closes the connection without an HTTP response.
    pub fn negotiate(&self, head: Parts, conn: &ConnInfo) -> Result<(), TransportError> {
        let path = head.uri.path();
        if !self.endpoints.matches_registered_endpoint(path) {
            return Err(TransportError::UpgradeRejected {
                path: path.to_string(),
            });
        }

        let io = conn.duplicate()?;
        let session = self.resolve_session(&head);
        info!(
            "switching connection {} ({}) to websocket on {path}",
            conn.id(),
            conn.peer()
        );
        self.hub.schedule(WsHandoff {
            io,
            peer: conn.peer(),
            head,
            session,
        });
        Ok(())
    }

    fn resolve_session(&self, head: &Parts) -> Session {
        let Some(raw) = head
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
        else {
            return Session::anonymous();
        };
        for cookie in Cookie::split_parse(raw.to_string()).flatten() {
            if cookie.name() == self.session_cookie {
                debug!("resolving websocket session {}", cookie.value());
                return self.store.find_session(cookie.value());
            }
        }
        Session::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        collections::HashMap,
        net::{TcpListener, TcpStream},
        os::fd::AsRawFd,
        rc::Rc,
    };

    use super::*;

    fn req(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/live");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn plain_requests_are_not_upgrades() {
        assert_eq!(upgrade_target(&req(&[])), UpgradeTarget::None);
        assert_eq!(
            upgrade_target(&req(&[("connection", "keep-alive")])),
            UpgradeTarget::None
        );
    }

    #[test]
    fn websocket_upgrade_is_detected_case_insensitively() {
        assert_eq!(
            upgrade_target(&req(&[("connection", "Upgrade"), ("upgrade", "WebSocket")])),
            UpgradeTarget::WebSocket
        );
        assert_eq!(
            upgrade_target(&req(&[
                ("connection", "keep-alive, Upgrade"),
                ("upgrade", "websocket")
            ])),
            UpgradeTarget::WebSocket
        );
    }

    #[test]
    fn other_upgrade_targets_are_unsupported() {
        assert_eq!(
            upgrade_target(&req(&[("connection", "upgrade"), ("upgrade", "h2c")])),
            UpgradeTarget::Unsupported
        );
        // Connection: upgrade without an Upgrade header at all.
        assert_eq!(
            upgrade_target(&req(&[("connection", "upgrade")])),
            UpgradeTarget::Unsupported
        );
    }

    #[test]
    fn endpoint_table_matches_registered_paths_only() {
        let endpoints = WsEndpoints::new(["/live", "/chat"]).unwrap();
        assert!(endpoints.matches_registered_endpoint("/live"));
        assert!(endpoints.matches_registered_endpoint("/chat"));
        assert!(!endpoints.matches_registered_endpoint("/nope"));
    }

    #[derive(Clone, Default)]
    struct RecordingStore(Rc<RefCell<Vec<String>>>);

    impl SessionStore for RecordingStore {
        fn find_session(&self, session_id: &str) -> Session {
            self.0.borrow_mut().push(session_id.to_string());
            Session::resumed(session_id, HashMap::new())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingHub(Rc<RefCell<Vec<WsHandoff>>>);

    impl WsSessionHub for RecordingHub {
        fn schedule(&self, handoff: WsHandoff) {
            self.0.borrow_mut().push(handoff);
        }
    }

    fn loopback_conn() -> (ConnInfo, TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, peer) = listener.accept().unwrap();
        (ConnInfo::new(server.as_raw_fd(), peer), server, client)
    }

    fn negotiator(
        store: RecordingStore,
        hub: RecordingHub,
    ) -> UpgradeNegotiator<RecordingStore, RecordingHub> {
        UpgradeNegotiator::new(
            WsEndpoints::new(["/live"]).unwrap(),
            store,
            hub,
            "sid".to_string(),
        )
    }

    #[test]
    fn unknown_endpoint_is_rejected_without_handoff() {
        let hub = RecordingHub::default();
        let neg = negotiator(RecordingStore::default(), hub.clone());
        let (conn, _server, _client) = loopback_conn();

        let (head, ()) = Request::builder()
            .uri("/nope")
            .body(())
            .unwrap()
            .into_parts();
        let err = neg.negotiate(head, &conn).unwrap_err();
        assert!(matches!(err, TransportError::UpgradeRejected { .. }));
        assert!(hub.0.borrow().is_empty());
    }

    #[test]
    fn handoff_resolves_the_session_cookie() {
        let store = RecordingStore::default();
        let hub = RecordingHub::default();
        let neg = negotiator(store.clone(), hub.clone());
        let (conn, _server, _client) = loopback_conn();

        let (head, ()) = Request::builder()
            .uri("/live")
            .header("cookie", "theme=dark; sid=abc123")
            .body(())
            .unwrap()
            .into_parts();
        neg.negotiate(head, &conn).unwrap();

        assert_eq!(store.0.borrow().as_slice(), &["abc123".to_string()]);
        let handoffs = hub.0.borrow();
        assert_eq!(handoffs.len(), 1);
        assert_eq!(handoffs[0].session.id(), Some("abc123"));
        assert_eq!(handoffs[0].head.uri.path(), "/live");
    }

    #[test]
    fn missing_cookie_yields_anonymous_session() {
        let store = RecordingStore::default();
        let hub = RecordingHub::default();
        let neg = negotiator(store.clone(), hub.clone());
        let (conn, _server, _client) = loopback_conn();

        let (head, ()) = Request::builder()
            .uri("/live")
            .body(())
            .unwrap()
            .into_parts();
        neg.negotiate(head, &conn).unwrap();

        assert!(store.0.borrow().is_empty());
        assert!(hub.0.borrow()[0].session.is_anonymous());
    }
}
