use crate::ClientError;
use infer_base::{Element, Tensor};
use infer_codec::Codec;
use std::fmt;

// Elements shown per output by `Display`.
const DISPLAY_ELEMENTS: usize = 8;

/// Outputs returned by the server for one call.
#[derive(Debug, Clone, PartialEq, Codec)]
pub struct InferResult {
    model_name: String,
    model_version: Option<String>,
    id: Option<String>,
    outputs: Vec<Tensor>,
}

impl InferResult {
    pub fn new(
        model_name: impl Into<String>,
        model_version: Option<String>,
        id: Option<String>,
        outputs: Vec<Tensor>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            model_version,
            id,
            outputs,
        }
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

    pub fn outputs(&self) -> &[Tensor] {
        &self.outputs
    }

    pub fn into_outputs(self) -> Vec<Tensor> {
        self.outputs
    }

    /// The output called `name`, or `MissingOutput` if the server did not
    /// return it.
    pub fn output(&self, name: &str) -> Result<&Tensor, ClientError> {
        self.outputs
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ClientError::MissingOutput(name.to_string()))
    }

    /// Elements of output `name` as `T`.
    pub fn as_vec<T: Element>(&self, name: &str) -> Result<Vec<T>, ClientError> {
        Ok(self.output(name)?.to_vec::<T>()?)
    }
}

impl fmt::Display for InferResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.model_name)?;
        if let Some(version) = &self.model_version {
            write!(f, " v{version}")?;
        }
        if let Some(id) = &self.id {
            write!(f, " (id {id})")?;
        }
        for output in &self.outputs {
            let elements = output.format_elements();
            let shown = elements.len().min(DISPLAY_ELEMENTS);
            write!(
                f,
                "; {} {} {:?} [{}",
                output.name(),
                output.dtype(),
                output.shape(),
                elements[..shown].join(", ")
            )?;
            if elements.len() > shown {
                write!(f, ", ...")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}
