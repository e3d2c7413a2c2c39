//! KServe v2 JSON bodies with the binary tensor data extension.
//!
//! A tensor travels either as a flat JSON `data` array or, when
//! `parameters.binary_data_size` is set, as raw little-endian bytes appended
//! after the JSON document. In the second case the
//! `Inference-Header-Content-Length` header gives the length of the JSON part
//! and binary tensors follow in the order they appear in the document.

use crate::{InferRequest, InferResult, RequestedOutput};
use http::HeaderMap;
use infer_base::tensor::f16_to_f32;
use infer_base::{DType, Element, Tensor};
use infer_codec::{CodecError, shape_from_wire};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HEADER_CONTENT_LENGTH: &str = "inference-header-content-length";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_data_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_data: Option<bool>,
}

impl TensorParameters {
    fn is_empty(&self) -> bool {
        self.binary_data_size.is_none() && self.binary_data.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonTensor {
    pub name: String,
    pub shape: Vec<i64>,
    pub datatype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "TensorParameters::is_empty")]
    pub parameters: TensorParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "TensorParameters::is_empty")]
    pub parameters: TensorParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub inputs: Vec<JsonTensor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub outputs: Vec<JsonTensor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// An encoded HTTP body.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBody {
    pub bytes: Vec<u8>,
    /// Length of the JSON part, present when binary data follows it.
    pub json_len: Option<usize>,
}

/// Request path for `model`, e.g. `/v2/models/identity_model/infer`.
pub fn infer_path(model: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("/v2/models/{model}/versions/{version}/infer"),
        None => format!("/v2/models/{model}/infer"),
    }
}

/// Inverse of `infer_path`: model name and optional version.
pub fn parse_infer_path(path: &str) -> Option<(&str, Option<&str>)> {
    let rest = path.strip_prefix("/v2/models/")?.strip_suffix("/infer")?;
    match rest.split_once("/versions/") {
        Some((model, version)) if !model.is_empty() && !version.is_empty() => {
            Some((model, Some(version)))
        }
        Some(_) => None,
        None if rest.is_empty() || rest.contains('/') => None,
        None => Some((rest, None)),
    }
}

/// Value of the `Inference-Header-Content-Length` header, if any.
pub fn json_len(headers: &HeaderMap) -> Result<Option<usize>, CodecError> {
    let Some(value) = headers.get(HEADER_CONTENT_LENGTH) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(Some)
        .ok_or_else(|| CodecError::Malformed(format!("invalid {HEADER_CONTENT_LENGTH} header")))
}

/// Encode `request`. Inputs go as binary data when `binary_data` is set, and
/// always for FP16 or non-finite float values, which JSON cannot carry.
pub fn encode_request(request: &InferRequest, binary_data: bool) -> Result<EncodedBody, CodecError> {
    let mut blob = Vec::new();
    let inputs = request
        .inputs()
        .iter()
        .map(|tensor| to_json_tensor(tensor, binary_data, &mut blob))
        .collect();
    let outputs = request
        .outputs()
        .iter()
        .map(|output| OutputSpec {
            name: output.name().to_string(),
            parameters: TensorParameters {
                binary_data_size: None,
                binary_data: (binary_data || output.binary_data()).then_some(true),
            },
        })
        .collect();

    let body = RequestBody {
        id: request.id().map(str::to_string),
        inputs,
        outputs,
    };
    finish(&body, blob)
}

/// Decode a request addressed to `model`. Used on the server side.
pub fn decode_request(
    model: &str,
    version: Option<&str>,
    bytes: &[u8],
    json_len: Option<usize>,
) -> Result<InferRequest, CodecError> {
    let (json, mut binary) = split_body(bytes, json_len)?;
    let body: RequestBody = serde_json::from_slice(json).map_err(malformed)?;

    let mut request = InferRequest::new(model);
    if let Some(version) = version {
        request = request.with_version(version);
    }
    if let Some(id) = body.id {
        request = request.with_id(id);
    }
    for input in &body.inputs {
        request = request.with_input(from_json_tensor(input, &mut binary)?);
    }
    for output in body.outputs {
        let binary_data = output.parameters.binary_data.unwrap_or(false);
        request = request.with_requested_output(
            RequestedOutput::new(output.name).with_binary_data(binary_data),
        );
    }
    Ok(request)
}

/// Encode `result`. `binary` selects the outputs sent as binary data.
pub fn encode_response(
    result: &InferResult,
    binary: impl Fn(&str) -> bool,
) -> Result<EncodedBody, CodecError> {
    let mut blob = Vec::new();
    let outputs = result
        .outputs()
        .iter()
        .map(|tensor| to_json_tensor(tensor, binary(tensor.name()), &mut blob))
        .collect();

    let body = ResponseBody {
        model_name: result.model_name().to_string(),
        model_version: result.model_version().map(str::to_string),
        id: result.id().map(str::to_string),
        outputs,
    };
    finish(&body, blob)
}

pub fn decode_response(bytes: &[u8], json_len: Option<usize>) -> Result<InferResult, CodecError> {
    let (json, mut binary) = split_body(bytes, json_len)?;
    let body: ResponseBody = serde_json::from_slice(json).map_err(malformed)?;

    let outputs = body
        .outputs
        .iter()
        .map(|output| from_json_tensor(output, &mut binary))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(InferResult::new(body.model_name, body.model_version, body.id, outputs))
}

pub fn encode_error(message: &str) -> Vec<u8> {
    serde_json::to_vec(&ErrorBody {
        error: message.to_string(),
    })
    .unwrap_or_else(|_| message.as_bytes().to_vec())
}

/// Server error message from an error response body. Bodies that are not an
/// `{"error": ...}` document are returned as text.
pub fn decode_error(bytes: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(bytes) {
        Ok(body) => body.error,
        Err(_) => String::from_utf8_lossy(bytes).trim().to_string(),
    }
}

fn malformed(err: serde_json::Error) -> CodecError {
    CodecError::Malformed(err.to_string())
}

fn finish<T: Serialize>(body: &T, blob: Vec<u8>) -> Result<EncodedBody, CodecError> {
    let mut bytes = serde_json::to_vec(body).map_err(malformed)?;
    if blob.is_empty() {
        return Ok(EncodedBody {
            bytes,
            json_len: None,
        });
    }
    let json_len = bytes.len();
    bytes.extend_from_slice(&blob);
    Ok(EncodedBody {
        bytes,
        json_len: Some(json_len),
    })
}

fn split_body(bytes: &[u8], json_len: Option<usize>) -> Result<(&[u8], &[u8]), CodecError> {
    match json_len {
        None => Ok((bytes, &[])),
        Some(len) if len <= bytes.len() => Ok(bytes.split_at(len)),
        Some(len) => Err(CodecError::SizeMismatch {
            declared: len,
            actual: bytes.len(),
        }),
    }
}

fn needs_binary(tensor: &Tensor) -> bool {
    match tensor.dtype() {
        DType::F16 => true,
        DType::F32 | DType::F64 => tensor.to_f64_vec().iter().any(|v| !v.is_finite()),
        _ => false,
    }
}

fn to_json_tensor(tensor: &Tensor, binary: bool, blob: &mut Vec<u8>) -> JsonTensor {
    let shape = tensor.shape().iter().map(|&d| d as i64).collect();
    let mut json = JsonTensor {
        name: tensor.name().to_string(),
        shape,
        datatype: tensor.dtype().wire_name().to_string(),
        data: None,
        parameters: TensorParameters::default(),
    };
    if binary || needs_binary(tensor) {
        blob.extend_from_slice(&infer_codec::encode(tensor));
        json.parameters.binary_data_size = Some(tensor.byte_len() as u64);
    } else {
        json.data = Some(Value::Array(json_values(tensor)));
    }
    json
}

fn json_values(tensor: &Tensor) -> Vec<Value> {
    tensor
        .data()
        .chunks_exact(tensor.dtype().byte_size())
        .map(|chunk| match tensor.dtype() {
            DType::Bool => Value::from(bool::read_le(chunk)),
            DType::U8 => Value::from(u8::read_le(chunk)),
            DType::U16 => Value::from(u16::read_le(chunk)),
            DType::U32 => Value::from(u32::read_le(chunk)),
            DType::U64 => Value::from(u64::read_le(chunk)),
            DType::I8 => Value::from(i8::read_le(chunk)),
            DType::I16 => Value::from(i16::read_le(chunk)),
            DType::I32 => Value::from(i32::read_le(chunk)),
            DType::I64 => Value::from(i64::read_le(chunk)),
            DType::F16 => Value::from(f16_to_f32(u16::read_le(chunk))),
            DType::F32 => Value::from(f32::read_le(chunk)),
            DType::F64 => Value::from(f64::read_le(chunk)),
        })
        .collect()
}

fn from_json_tensor(json: &JsonTensor, binary: &mut &[u8]) -> Result<Tensor, CodecError> {
    let dtype = DType::from_wire(&json.datatype)?;
    let shape = shape_from_wire(&json.shape)?;

    if let Some(size) = json.parameters.binary_data_size {
        let size = usize::try_from(size)
            .map_err(|_| CodecError::Malformed(format!("binary_data_size {size} too large")))?;
        if size > binary.len() {
            return Err(CodecError::SizeMismatch {
                declared: size,
                actual: binary.len(),
            });
        }
        let (bytes, rest) = binary.split_at(size);
        *binary = rest;
        return infer_codec::decode(&json.name, bytes, &shape, dtype);
    }

    let data = json.data.as_ref().ok_or_else(|| {
        CodecError::Malformed(format!("tensor \"{}\" has no data", json.name))
    })?;
    let mut values = Vec::new();
    flatten(data, &mut values);

    let mut bytes = Vec::with_capacity(values.len() * dtype.byte_size());
    for value in values {
        push_value(dtype, value, &mut bytes)?;
    }
    infer_codec::decode(&json.name, &bytes, &shape, dtype)
}

// Row-major flattening of nested `data` arrays.
fn flatten<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        other => out.push(other),
    }
}

fn push_value(dtype: DType, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let invalid = || CodecError::Malformed(format!("{value} is not a valid {dtype} value"));
    match dtype {
        DType::Bool => value.as_bool().ok_or_else(invalid)?.write_le(out),
        DType::U8 => unsigned::<u8>(value).ok_or_else(invalid)?.write_le(out),
        DType::U16 => unsigned::<u16>(value).ok_or_else(invalid)?.write_le(out),
        DType::U32 => unsigned::<u32>(value).ok_or_else(invalid)?.write_le(out),
        DType::U64 => unsigned::<u64>(value).ok_or_else(invalid)?.write_le(out),
        DType::I8 => signed::<i8>(value).ok_or_else(invalid)?.write_le(out),
        DType::I16 => signed::<i16>(value).ok_or_else(invalid)?.write_le(out),
        DType::I32 => signed::<i32>(value).ok_or_else(invalid)?.write_le(out),
        DType::I64 => signed::<i64>(value).ok_or_else(invalid)?.write_le(out),
        DType::F32 => (value.as_f64().ok_or_else(invalid)? as f32).write_le(out),
        DType::F64 => value.as_f64().ok_or_else(invalid)?.write_le(out),
        DType::F16 => {
            return Err(CodecError::Malformed(
                "FP16 tensors must use binary data".to_string(),
            ));
        }
    }
    Ok(())
}

fn unsigned<T: TryFrom<u64>>(value: &Value) -> Option<T> {
    value.as_u64().and_then(|v| T::try_from(v).ok())
}

fn signed<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    value.as_i64().and_then(|v| T::try_from(v).ok())
}
