use std::io;

use monoio::io::{sink::SinkExt, AsyncWriteRent};
use monoio_http::{
    common::{body::HttpBody, response::Response},
    h1::codec::encoder::GenericEncoder,
};

use super::KEEPALIVE_VALUE;

/// Serializes responses onto the connection.
///
/// When process-wide keep-alive is on, every response gets a
/// `Connection: Keep-Alive` directive regardless of what the request
/// asked for; the server, not the client, decides keep-alive
/// eligibility per connection.
pub struct ResponseWriter<IO: AsyncWriteRent> {
    encoder: GenericEncoder<IO>,
    keepalive: bool,
}

impl<IO: AsyncWriteRent> ResponseWriter<IO> {
    pub fn new(io: IO, keepalive: bool) -> Self {
        Self {
            encoder: GenericEncoder::new(io),
            keepalive,
        }
    }

    /// Encode and flush one response.
    ///
    /// The encoder does not report how many bytes it put on the wire, so
    /// success is `()` rather than a written length; callers only branch
    /// on write failure, which is fatal to the connection.
    pub async fn write(&mut self, mut response: Response<HttpBody>) -> io::Result<()> {
        if self.keepalive {
            response
                .headers_mut()
                .insert(http::header::CONNECTION, KEEPALIVE_VALUE);
        }
        self.encoder
            .send_and_flush(response)
            .await
            .map_err(io::Error::other)
    }
}
