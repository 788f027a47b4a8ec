use std::{cell::RefCell, collections::HashMap};

use bytes::Bytes;
use http::{header, Request, Response, StatusCode};
use lagoon_core::{
    dispatch::{DispatchContext, Dispatcher},
    handoff::{WsHandoff, WsSessionHub},
    session::{Session, SessionStore},
    DispatchFault,
};
use monoio_http::common::body::{FixedBody, HttpBody};
use tracing::info;

/// Built-in dispatcher: echoes the request line back, with two routes
/// that exercise the fault paths.
#[derive(Default)]
pub struct EchoApp;

impl Dispatcher for EchoApp {
    type Body = HttpBody;

    async fn execute(
        &self,
        request: Request<HttpBody>,
        cx: DispatchContext<'_>,
    ) -> Result<Response<HttpBody>, DispatchFault> {
        match request.uri().path() {
            "/teapot" => Err(DispatchFault::Client(StatusCode::IM_A_TEAPOT)),
            "/fail" => Err(DispatchFault::Internal(anyhow::anyhow!(
                "deliberate failure route"
            ))),
            path => {
                let body = Bytes::from(format!(
                    "{} {} via connection {}\n",
                    request.method(),
                    path,
                    cx.conn_id
                ));
                Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "text/plain")
                    .header(header::CONTENT_LENGTH, body.len())
                    .body(HttpBody::fixed_body(Some(body)))
                    .map_err(|e| DispatchFault::Internal(e.into()))
            }
        }
    }
}

/// In-memory session store. Unknown ids resolve to an anonymous session.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RefCell<HashMap<String, HashMap<String, String>>>,
}

impl MemorySessionStore {
    #[allow(dead_code)]
    pub fn insert(&self, session_id: impl Into<String>, data: HashMap<String, String>) {
        self.sessions.borrow_mut().insert(session_id.into(), data);
    }
}

impl SessionStore for MemorySessionStore {
    fn find_session(&self, session_id: &str) -> Session {
        match self.sessions.borrow().get(session_id) {
            Some(data) => Session::resumed(session_id, data.clone()),
            None => Session::anonymous(),
        }
    }
}

/// Stand-in websocket hub. No websocket subsystem is wired into the
/// binary, so the handoff is logged and dropped, which closes the
/// duplicated descriptor.
pub struct LoggingHub;

impl WsSessionHub for LoggingHub {
    fn schedule(&self, handoff: WsHandoff) {
        info!(
            "websocket session from {} on {} (session {:?}) accepted",
            handoff.peer,
            handoff.head.uri.path(),
            handoff.session.id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_session_id_resolves_anonymous() {
        let store = MemorySessionStore::default();
        assert!(store.find_session("nope").is_anonymous());

        let mut data = HashMap::new();
        data.insert("user".to_string(), "alice".to_string());
        store.insert("s1", data);
        let session = store.find_session("s1");
        assert_eq!(session.id(), Some("s1"));
        assert_eq!(session.get("user"), Some("alice"));
    }

    #[test]
    fn echo_app_routes() {
        monoio::RuntimeBuilder::<monoio::LegacyDriver>::new()
            .build()
            .unwrap()
            .block_on(async {
                let pool = lagoon_core::context::DatabaseContextPool::new();
                let db = pool.bind();
                fn cx(db: &lagoon_core::context::DatabaseContext) -> DispatchContext<'_> {
                    DispatchContext {
                        conn_id: 7,
                        peer: "127.0.0.1:9000".parse().unwrap(),
                        db,
                    }
                }

                let req = |path: &str| {
                    Request::builder()
                        .uri(path)
                        .body(HttpBody::fixed_body(None))
                        .unwrap()
                };

                let ok = EchoApp.execute(req("/hello"), cx(&db)).await.unwrap();
                assert_eq!(ok.status(), StatusCode::OK);

                let teapot = EchoApp.execute(req("/teapot"), cx(&db)).await;
                assert!(matches!(
                    teapot,
                    Err(DispatchFault::Client(StatusCode::IM_A_TEAPOT))
                ));

                let fail = EchoApp.execute(req("/fail"), cx(&db)).await;
                assert!(matches!(fail, Err(DispatchFault::Internal(_))));
            });
    }
}
