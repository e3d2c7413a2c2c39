use crate::{ComError, framing, http1};
use http::{Request, Response};
use infer_codec::Codec;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// One TCP connection to the inference server.
///
/// A connection is reusable only between complete exchanges: sending marks it
/// busy and only a fully received reply marks it clean again. Dropping a busy
/// connection closes the socket, which is how a timed-out or cancelled call
/// makes sure a half-read reply is never handed to the next caller.
pub struct Connection {
    id: u64,
    peer: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    busy: bool,
    keep_alive: bool,
    exchanges: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("busy", &self.busy)
            .field("keep_alive", &self.keep_alive)
            .field("exchanges", &self.exchanges)
            .finish()
    }
}

impl Connection {
    /// Open a TCP connection to `addr` (`host:port`).
    pub async fn connect(addr: &str, id: u64) -> Result<Self, ComError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, addr.to_string(), id))
    }

    pub fn from_stream(stream: TcpStream, peer: String, id: u64) -> Self {
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        Self {
            id,
            peer,
            reader: BufReader::new(read_half),
            writer: write_half,
            busy: false,
            keep_alive: true,
            exchanges: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Number of completed request/reply exchanges.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Safe to hand to another caller: no exchange in progress and the peer
    /// did not ask to close.
    pub fn is_reusable(&self) -> bool {
        !self.busy && self.keep_alive
    }

    /// Send a length-prefixed binary message.
    pub async fn send_message<T: Codec>(&mut self, value: &T) -> Result<(), ComError> {
        self.send_frame(&value.to_bytes()).await
    }

    /// Send an already encoded payload as one frame.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<(), ComError> {
        self.busy = true;
        framing::write_frame(&mut self.writer, payload).await
    }

    /// Receive a length-prefixed binary message, completing the exchange.
    pub async fn recv_message<T: Codec>(&mut self) -> Result<T, ComError> {
        let payload = framing::read_frame(&mut self.reader).await?;
        self.complete();
        T::from_bytes(&payload).map_err(ComError::from)
    }

    /// Send an HTTP/1.1 request.
    pub async fn send_request(&mut self, request: &Request<Vec<u8>>) -> Result<(), ComError> {
        self.busy = true;
        http1::write_request(&mut self.writer, request).await
    }

    /// Receive an HTTP/1.1 response, completing the exchange.
    pub async fn recv_response(&mut self) -> Result<Response<Vec<u8>>, ComError> {
        let response = http1::read_response(&mut self.reader).await?;
        if http1::wants_close(response.headers()) {
            self.keep_alive = false;
        }
        self.complete();
        Ok(response)
    }

    /// Close the connection when it is released instead of reusing it.
    pub fn close_after_use(&mut self) {
        self.keep_alive = false;
    }

    fn complete(&mut self) {
        self.busy = false;
        self.exchanges += 1;
    }
}
