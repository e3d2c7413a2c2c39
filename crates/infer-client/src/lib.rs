//! Concurrent inference client.
//!
//! A `Client` owns a bounded connection pool to one inference server and
//! speaks one of two transports, chosen at construction: KServe v2 JSON over
//! HTTP/1.1, or length-prefixed binary frames over TCP. Requests run either
//! to completion with `Client::infer` or in the background with
//! `Client::async_infer`, which hands back a `PendingCall`.
//!
//! ```no_run
//! use infer_base::Tensor;
//! use infer_client::{Client, ClientConfig, InferRequest, Protocol};
//!
//! # async fn run() -> Result<(), infer_client::ClientError> {
//! let client = Client::new(ClientConfig::new("localhost:8000", Protocol::Http))?;
//! let input = Tensor::from_slice("IN", vec![16], &[1u32; 16])?;
//! let request = InferRequest::new("identity_model")
//!     .with_input(input)
//!     .with_output("OUT");
//! let result = client.infer(&request).await?;
//! let values: Vec<u32> = result.as_vec("OUT")?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod pending;
pub mod protocol;
mod request;
mod result;
pub mod validate;

pub use client::Client;
pub use config::{ClientConfig, Protocol};
pub use error::ClientError;
pub use pending::PendingCall;
pub use request::{InferRequest, RequestedOutput};
pub use result::InferResult;
pub use validate::{Mismatch, Tolerance, Validation};
