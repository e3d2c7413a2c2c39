use crate::ClientError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Transport spoken to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// KServe v2 JSON over HTTP/1.1.
    Http,
    /// Length-prefixed binary frames over TCP.
    Stream,
}

impl Protocol {
    /// Endpoint used when none is given.
    pub fn default_url(self) -> &'static str {
        match self {
            Protocol::Http => "localhost:8000",
            Protocol::Stream => "localhost:8001",
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Protocol::Http => 8000,
            Protocol::Stream => 8001,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Stream => f.write_str("grpc"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ClientError;

    /// Exactly `http` or `grpc`; `grpc` names the binary streaming transport.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Protocol::Http),
            "grpc" => Ok(Protocol::Stream),
            _ => Err(ClientError::Config(format!(
                "unexpected protocol \"{s}\", expects \"http\" or \"grpc\""
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    url: String,
    protocol: Protocol,
    max_concurrency: usize,
    verbose: bool,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    binary_data: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Protocol::Http.default_url(), Protocol::Http)
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            url: url.into(),
            protocol,
            max_concurrency: 1,
            verbose: false,
            timeout: None,
            connect_timeout: Some(Duration::from_secs(10)),
            binary_data: false,
        }
    }

    /// Set the server endpoint (`host:port`, optionally prefixed with `http://`).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set how many requests may be in flight at once.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Log every request and response at info level instead of debug.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Default deadline for a whole call, queueing included. Requests may
    /// override it.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Send HTTP tensors as binary data instead of JSON arrays.
    pub fn with_binary_data(mut self, binary_data: bool) -> Self {
        self.binary_data = binary_data;
        self
    }

    // Getters
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn binary_data(&self) -> bool {
        self.binary_data
    }

    /// The `host:port` to connect to. A missing port takes the protocol's
    /// default.
    pub fn endpoint(&self) -> Result<String, ClientError> {
        let trimmed = self.url.trim();
        let without_scheme = trimmed.strip_prefix("http://").unwrap_or(trimmed);
        let host_port = without_scheme.trim_end_matches('/');

        if host_port.is_empty() || host_port.contains('/') {
            return Err(ClientError::Config(format!("invalid url \"{}\"", self.url)));
        }

        match host_port.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() || port.parse::<u16>().is_err() {
                    return Err(ClientError::Config(format!("invalid url \"{}\"", self.url)));
                }
                Ok(host_port.to_string())
            }
            None => Ok(format!("{host_port}:{}", self.protocol.default_port())),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.max_concurrency == 0 {
            return Err(ClientError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        self.endpoint().map(|_| ())
    }
}
