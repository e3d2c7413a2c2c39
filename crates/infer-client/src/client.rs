use crate::protocol::binary::{RequestFrame, ResponseFrame};
use crate::protocol::json;
use crate::{ClientConfig, ClientError, InferRequest, InferResult, PendingCall, Protocol};
use http::header::{CONTENT_TYPE, HOST};
use http::Method;
use infer_com::{ComError, Pool, PooledConnection};
use log::Level;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

// Chosen once from `Protocol` when the client is built.
#[derive(Debug, Clone, Copy)]
enum Transport {
    Http,
    Stream,
}

/// Inference client bound to one server.
///
/// Cloning is cheap and clones share the connection pool, so at most
/// `max_concurrency` calls are on the wire across all of them.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    endpoint: String,
    transport: Transport,
    pool: Pool,
    next_id: AtomicU64,
}

impl Client {
    /// Validate `config` and set up an empty pool. No connection is opened
    /// until the first call.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        let transport = match config.protocol() {
            Protocol::Http => Transport::Http,
            Protocol::Stream => Transport::Stream,
        };
        let pool = Pool::new(
            endpoint.clone(),
            config.max_concurrency(),
            config.connect_timeout(),
        );
        log::debug!(
            "client for {} over {}, max_concurrency {}",
            endpoint,
            config.protocol(),
            config.max_concurrency()
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                endpoint,
                transport,
                pool,
                next_id: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// `host:port` the client connects to.
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn pool(&self) -> &Pool {
        &self.inner.pool
    }

    /// Calls currently holding a connection.
    pub fn in_flight(&self) -> usize {
        self.inner.pool.in_flight()
    }

    /// Run `request` and wait for its result.
    pub async fn infer(&self, request: &InferRequest) -> Result<InferResult, ClientError> {
        request.validate()?;
        let id = self.inner.next_id();
        self.inner.run(id, request).await
    }

    /// Start `request` in the background and return its handle at once.
    ///
    /// The call queues for a connection like `infer` does; any error is
    /// reported by `PendingCall::wait`. Must be called within a tokio runtime.
    pub fn async_infer(&self, request: InferRequest) -> PendingCall {
        let id = self.inner.next_id();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = request.validate() {
                return Err(err);
            }
            inner.run(id, &request).await
        });
        PendingCall::new(id, handle)
    }

    /// Refuse new calls, wait for running ones to release their connections,
    /// then close every idle connection.
    pub async fn close(&self) {
        self.inner.pool.close().await;
        log::debug!("client for {} closed", self.inner.endpoint);
    }
}

impl ClientInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn log_level(&self) -> Level {
        if self.config.verbose() {
            Level::Info
        } else {
            Level::Debug
        }
    }

    async fn run(&self, id: u64, request: &InferRequest) -> Result<InferResult, ClientError> {
        let level = self.log_level();
        log::log!(
            level,
            "request {} to {}: {} inputs, {} outputs requested",
            id,
            request.model_name(),
            request.inputs().len(),
            request.outputs().len()
        );

        let started = Instant::now();
        let call = self.call(id, request);
        let outcome = match request.timeout().or(self.config.timeout()) {
            // Expiry drops the connection mid-exchange, which closes it.
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ClientError::Timeout),
            },
            None => call.await,
        };

        match &outcome {
            Ok(result) => log::log!(level, "request {} done in {:?}: {}", id, started.elapsed(), result),
            Err(err) => log::log!(level, "request {} failed after {:?}: {}", id, started.elapsed(), err),
        }
        outcome
    }

    // One exchange, retried once on a new connection when a reused one
    // turns out to be dead.
    async fn call(&self, id: u64, request: &InferRequest) -> Result<InferResult, ClientError> {
        let mut conn = self.pool.acquire(None).await?;
        match self.exchange(&mut conn, id, request).await {
            Err(ClientError::Transport(err)) if conn.is_reused() && err.is_connection_failure() => {
                log::debug!(
                    "connection {} is stale ({}), retrying request {}",
                    conn.id(),
                    err,
                    id
                );
                conn.discard();
                let mut conn = self.pool.acquire_fresh(None).await?;
                self.exchange(&mut conn, id, request).await
            }
            outcome => outcome,
        }
    }

    async fn exchange(
        &self,
        conn: &mut PooledConnection,
        id: u64,
        request: &InferRequest,
    ) -> Result<InferResult, ClientError> {
        match self.transport {
            Transport::Http => self.exchange_http(conn, request).await,
            Transport::Stream => self.exchange_stream(conn, id, request).await,
        }
    }

    async fn exchange_http(
        &self,
        conn: &mut PooledConnection,
        request: &InferRequest,
    ) -> Result<InferResult, ClientError> {
        let body = json::encode_request(request, self.config.binary_data())?;
        let content_type = match body.json_len {
            Some(_) => "application/octet-stream",
            None => "application/json",
        };
        let mut builder = http::Request::builder()
            .method(Method::POST)
            .uri(json::infer_path(request.model_name(), request.model_version()))
            .header(HOST, self.endpoint.as_str())
            .header(CONTENT_TYPE, content_type);
        if let Some(len) = body.json_len {
            builder = builder.header(json::HEADER_CONTENT_LENGTH, len);
        }
        let http_request = builder
            .body(body.bytes)
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        conn.send_request(&http_request).await?;
        let response = conn.recv_response().await?;

        let status = response.status();
        if !status.is_success() {
            let message = json::decode_error(response.body());
            return Err(ClientError::Server(if message.is_empty() {
                status.to_string()
            } else {
                message
            }));
        }
        let json_len = json::json_len(response.headers())?;
        Ok(json::decode_response(response.body(), json_len)?)
    }

    async fn exchange_stream(
        &self,
        conn: &mut PooledConnection,
        id: u64,
        request: &InferRequest,
    ) -> Result<InferResult, ClientError> {
        let mut payload = Vec::new();
        RequestFrame::encode_parts(id, request, &mut payload);
        conn.send_frame(&payload).await?;

        let reply: ResponseFrame = conn.recv_message().await?;
        if reply.id != id {
            // The stream is out of step; never reuse it.
            conn.close_after_use();
            return Err(ComError::Protocol(format!(
                "reply for request {} received while waiting for {}",
                reply.id, id
            ))
            .into());
        }
        reply.outcome.map_err(ClientError::Server)
    }
}
