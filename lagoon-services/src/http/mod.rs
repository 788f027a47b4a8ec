use http::{HeaderValue, Response, StatusCode};
use monoio_http::common::body::FixedBody;

pub use self::{
    reader::{RequestBatch, RequestReader},
    upgrade::{upgrade_target, UpgradeNegotiator, UpgradeTarget, WsEndpoints},
    worker::{ConnectionWorker, MaxWorkers},
    writer::ResponseWriter,
};

mod reader;
mod upgrade;
mod worker;
mod writer;

pub const KEEPALIVE: &str = "Keep-Alive";
#[allow(clippy::declare_interior_mutable_const)]
pub const KEEPALIVE_VALUE: HeaderValue = HeaderValue::from_static(KEEPALIVE);

/// Build a bare response carrying only a status code.
pub fn generate_response<B: FixedBody>(status_code: StatusCode, close: bool) -> Response<B> {
    let mut resp = Response::builder().status(status_code);
    let headers = resp.headers_mut().unwrap();
    if close {
        headers.insert(http::header::CONNECTION, HeaderValue::from_static("close"));
    }
    headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    resp.body(B::fixed_body(None)).unwrap()
}

#[cfg(test)]
mod tests {
    use monoio_http::common::body::HttpBody;

    use super::*;

    #[test]
    fn generated_response_is_bare() {
        let resp: Response<HttpBody> = generate_response(StatusCode::BAD_REQUEST, false);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get(http::header::CONTENT_LENGTH).unwrap(),
            "0"
        );
        assert!(resp.headers().get(http::header::CONNECTION).is_none());
    }
}
