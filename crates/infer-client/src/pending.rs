use crate::{ClientError, InferResult};
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;

enum State {
    Running(JoinHandle<Result<InferResult, ClientError>>),
    Cancelled,
    Consumed,
}

/// Handle to a call started with `Client::async_infer`.
///
/// The result can be taken once. Dropping the handle lets the call finish in
/// the background and discards its result.
pub struct PendingCall {
    id: u64,
    state: State,
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Running(handle) if handle.is_finished() => "finished",
            State::Running(_) => "running",
            State::Cancelled => "cancelled",
            State::Consumed => "consumed",
        };
        f.debug_struct("PendingCall")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

impl PendingCall {
    pub(crate) fn new(id: u64, handle: JoinHandle<Result<InferResult, ClientError>>) -> Self {
        Self {
            id,
            state: State::Running(handle),
        }
    }

    /// Client-local call id, also used in log lines.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the call has completed, failed, or been cancelled.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            State::Running(handle) => handle.is_finished(),
            State::Cancelled | State::Consumed => true,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.state, State::Cancelled)
    }

    /// Wait for the call and take its result.
    ///
    /// Fails with `AlreadyConsumed` once the result has been taken and with
    /// `Cancelled` after `cancel` or an expired `wait_timeout`.
    pub async fn wait(&mut self) -> Result<InferResult, ClientError> {
        let handle = match &mut self.state {
            State::Running(handle) => handle,
            State::Cancelled => return Err(ClientError::Cancelled),
            State::Consumed => return Err(ClientError::AlreadyConsumed),
        };

        let joined = handle.await;
        self.state = State::Consumed;
        match joined {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => {
                self.state = State::Cancelled;
                Err(ClientError::Cancelled)
            }
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        }
    }

    /// `wait` bounded by `limit`. On expiry the call is cancelled and
    /// `Timeout` is returned.
    pub async fn wait_timeout(&mut self, limit: Duration) -> Result<InferResult, ClientError> {
        let waited = tokio::time::timeout(limit, self.wait()).await;
        match waited {
            Ok(outcome) => outcome,
            Err(_) => {
                self.abort();
                Err(ClientError::Timeout)
            }
        }
    }

    /// Stop the call if it is still running. Its connection is closed rather
    /// than returned to the pool. No-op once the call has finished.
    pub fn cancel(&mut self) {
        if let State::Running(handle) = &self.state {
            if handle.is_finished() {
                return;
            }
        }
        self.abort();
    }

    fn abort(&mut self) {
        if let State::Running(handle) = &self.state {
            handle.abort();
            log::debug!("call {} cancelled", self.id);
            self.state = State::Cancelled;
        }
    }
}
