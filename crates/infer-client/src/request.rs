use crate::ClientError;
use infer_base::Tensor;
use infer_codec::Codec;
use std::collections::HashSet;
use std::time::Duration;

/// An output the caller wants back.
#[derive(Debug, Clone, PartialEq, Eq, Codec)]
pub struct RequestedOutput {
    name: String,
    binary_data: bool,
}

impl RequestedOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binary_data: false,
        }
    }

    /// Ask the HTTP server to return this output as raw bytes.
    pub fn with_binary_data(mut self, binary_data: bool) -> Self {
        self.binary_data = binary_data;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binary_data(&self) -> bool {
        self.binary_data
    }
}

/// One inference call: a model, its named inputs and the outputs to return.
///
/// With no requested outputs the server returns every output of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct InferRequest {
    model_name: String,
    model_version: Option<String>,
    id: Option<String>,
    inputs: Vec<Tensor>,
    outputs: Vec<RequestedOutput>,
    timeout: Option<Duration>,
}

impl InferRequest {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_version: None,
            id: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    /// Caller-chosen id echoed back in the result.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_input(mut self, tensor: Tensor) -> Self {
        self.inputs.push(tensor);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(RequestedOutput::new(name));
        self
    }

    pub fn with_requested_output(mut self, output: RequestedOutput) -> Self {
        self.outputs.push(output);
        self
    }

    /// Deadline for this call, overriding the client default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn model_version(&self) -> Option<&str> {
        self.model_version.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn inputs(&self) -> &[Tensor] {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&Tensor> {
        self.inputs.iter().find(|t| t.name() == name)
    }

    pub fn outputs(&self) -> &[RequestedOutput] {
        &self.outputs
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.model_name.is_empty() {
            return Err(ClientError::InvalidRequest("model name is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if input.name().is_empty() {
                return Err(ClientError::InvalidRequest("input with empty name".to_string()));
            }
            if !seen.insert(input.name()) {
                return Err(ClientError::InvalidRequest(format!(
                    "duplicate input \"{}\"",
                    input.name()
                )));
            }
        }

        let mut seen = HashSet::new();
        for output in &self.outputs {
            if !seen.insert(output.name()) {
                return Err(ClientError::InvalidRequest(format!(
                    "output \"{}\" requested twice",
                    output.name()
                )));
            }
        }
        Ok(())
    }
}
