//! Loopback inference server for the client tests.
//!
//! Models:
//! - `identity_model`: every input comes back with `IN` renamed to `OUT`.
//! - `slow_model`: `identity_model` after `SLOW_DELAY`.
//! - `empty_model`: succeeds with no outputs.
//! - `drop_model`: closes the connection without replying.
//! - `garbled_model`: replies with bytes that do not parse.
//! - anything else fails with an "unknown model" error.

#![allow(dead_code)]

use http::{Response, StatusCode};
use infer_client::protocol::binary::{RequestFrame, ResponseFrame};
use infer_client::protocol::json;
use infer_client::{InferRequest, InferResult, Protocol};
use infer_com::{framing, http1};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const SLOW_DELAY: Duration = Duration::from_millis(200);

#[derive(Default)]
pub struct Stats {
    connections: AtomicUsize,
    requests: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl Stats {
    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Highest number of requests being handled at the same time.
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }
}

pub struct MockServer {
    pub addr: String,
    pub stats: Arc<Stats>,
}

enum Reply {
    Result(InferResult),
    Error(String),
    Hangup,
    Garbled,
}

/// Start a server speaking `protocol`. With `close_after_reply` the server
/// closes each connection right after answering, without telling the client.
pub async fn start(protocol: Protocol, close_after_reply: bool) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap().to_string();
    let stats = Arc::new(Stats::default());
    let server_stats = stats.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            server_stats.connections.fetch_add(1, Ordering::SeqCst);
            let stats = server_stats.clone();
            tokio::spawn(async move {
                match protocol {
                    Protocol::Http => serve_http(stream, stats, close_after_reply).await,
                    Protocol::Stream => serve_stream(stream, stats, close_after_reply).await,
                }
            });
        }
    });

    MockServer { addr, stats }
}

async fn serve_http(stream: TcpStream, stats: Arc<Stats>, close_after_reply: bool) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while let Ok(Some(request)) = http1::read_request(&mut reader).await {
        let Some((model, version)) = json::parse_infer_path(request.uri().path()) else {
            let response = error_response(StatusCode::NOT_FOUND, "not found");
            if http1::write_response(&mut write_half, &response).await.is_err() {
                break;
            }
            continue;
        };
        let json_len = json::json_len(request.headers()).unwrap_or(None);
        let decoded = match json::decode_request(model, version, request.body(), json_len) {
            Ok(decoded) => decoded,
            Err(err) => {
                let response = error_response(StatusCode::BAD_REQUEST, &err.to_string());
                if http1::write_response(&mut write_half, &response).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let response = match handle(&stats, &decoded).await {
            Reply::Result(result) => {
                let body = json::encode_response(&result, |name| {
                    decoded
                        .outputs()
                        .iter()
                        .any(|o| o.name() == name && o.binary_data())
                })
                .expect("response encoding failed");
                let mut builder = Response::builder().status(StatusCode::OK);
                if let Some(len) = body.json_len {
                    builder = builder.header(json::HEADER_CONTENT_LENGTH, len);
                }
                builder.body(body.bytes).unwrap()
            }
            Reply::Error(message) => error_response(StatusCode::BAD_REQUEST, &message),
            Reply::Hangup => {
                finish(&stats);
                break;
            }
            Reply::Garbled => {
                let written = write_half
                    .write_all(b"HTTP/1.1 200 OK\r\nx-bad: \xff\xfe\r\ncontent-length: 2\r\n\r\n{}")
                    .await;
                finish(&stats);
                if written.is_err() {
                    break;
                }
                continue;
            }
        };
        let written = http1::write_response(&mut write_half, &response).await;
        finish(&stats);
        if written.is_err() || close_after_reply {
            break;
        }
    }
}

async fn serve_stream(mut stream: TcpStream, stats: Arc<Stats>, close_after_reply: bool) {
    while let Ok(frame) = framing::read_message::<RequestFrame, _>(&mut stream).await {
        let outcome = match handle(&stats, &frame.request).await {
            Reply::Result(result) => Ok(result),
            Reply::Error(message) => Err(message),
            Reply::Hangup => {
                finish(&stats);
                break;
            }
            Reply::Garbled => {
                let written = framing::write_frame(&mut stream, &[0xff]).await;
                finish(&stats);
                if written.is_err() {
                    break;
                }
                continue;
            }
        };
        let reply = ResponseFrame {
            id: frame.id,
            outcome,
        };
        let written = framing::write_message(&mut stream, &reply).await;
        finish(&stats);
        if written.is_err() || close_after_reply {
            break;
        }
    }
}

async fn handle(stats: &Stats, request: &InferRequest) -> Reply {
    stats.requests.fetch_add(1, Ordering::SeqCst);
    let active = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
    stats.peak_active.fetch_max(active, Ordering::SeqCst);

    match request.model_name() {
        "identity_model" => Reply::Result(identity(request)),
        "slow_model" => {
            tokio::time::sleep(SLOW_DELAY).await;
            Reply::Result(identity(request))
        }
        "empty_model" => Reply::Result(InferResult::new(
            request.model_name(),
            request.model_version().map(str::to_string),
            request.id().map(str::to_string),
            Vec::new(),
        )),
        "drop_model" => Reply::Hangup,
        "garbled_model" => Reply::Garbled,
        other => Reply::Error(format!("Request for unknown model: '{other}' is not found")),
    }
}

fn finish(stats: &Stats) {
    stats.active.fetch_sub(1, Ordering::SeqCst);
}

fn identity(request: &InferRequest) -> InferResult {
    let outputs = request
        .inputs()
        .iter()
        .map(|input| {
            let name = input.name().replacen("IN", "OUT", 1);
            input.clone().renamed(name)
        })
        .filter(|output| {
            request.outputs().is_empty()
                || request.outputs().iter().any(|o| o.name() == output.name())
        })
        .collect();
    InferResult::new(
        request.model_name(),
        request.model_version().map(str::to_string),
        request.id().map(str::to_string),
        outputs,
    )
}

fn error_response(status: StatusCode, message: &str) -> Response<Vec<u8>> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(json::encode_error(message))
        .unwrap()
}
