use infer_base::TensorError;
use infer_codec::CodecError;
use infer_com::ComError;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    /// Malformed or size-mismatched payload.
    Codec(CodecError),
    UnsupportedDtype(String),
    /// Connection-level failure.
    Transport(ComError),
    /// The server rejected or failed the request.
    Server(String),
    Timeout,
    Cancelled,
    /// `PendingCall::wait` called after the result was already taken.
    AlreadyConsumed,
    MissingOutput(String),
    InvalidRequest(String),
    Config(String),
}

impl ClientError {
    /// Failure of the connection rather than of the request itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Codec(err) => write!(f, "codec error: {err}"),
            ClientError::UnsupportedDtype(name) => write!(f, "unsupported dtype: {name}"),
            ClientError::Transport(err) => write!(f, "transport error: {err}"),
            ClientError::Server(msg) => write!(f, "server error: {msg}"),
            ClientError::Timeout => write!(f, "request timed out"),
            ClientError::Cancelled => write!(f, "request was cancelled"),
            ClientError::AlreadyConsumed => write!(f, "result was already consumed"),
            ClientError::MissingOutput(name) => write!(f, "missing output: {name}"),
            ClientError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            ClientError::Config(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Codec(err) => Some(err),
            ClientError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedDtype(name) => ClientError::UnsupportedDtype(name),
            err => ClientError::Codec(err),
        }
    }
}

impl From<TensorError> for ClientError {
    fn from(err: TensorError) -> Self {
        CodecError::from(err).into()
    }
}

impl From<ComError> for ClientError {
    fn from(err: ComError) -> Self {
        match err {
            ComError::Timeout => ClientError::Timeout,
            // A frame arrived intact but its contents did not decode.
            ComError::Decode(err) => CodecError::from(err).into(),
            err => ClientError::Transport(err),
        }
    }
}
