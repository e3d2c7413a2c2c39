use crate::{InferRequest, InferResult, RequestedOutput};
use infer_base::Tensor;
use infer_codec::{Codec, DecodeError};

/// Request message of the streaming transport.
///
/// `id` correlates the reply with the request on one connection.
#[derive(Debug, Clone, PartialEq, Codec)]
pub struct RequestFrame {
    pub id: u64,
    pub request: InferRequest,
}

impl RequestFrame {
    /// Encode straight from a borrowed request, without building a frame.
    pub fn encode_parts(id: u64, request: &InferRequest, buf: &mut Vec<u8>) {
        id.encode(buf);
        request.encode(buf);
    }
}

/// Reply message of the streaming transport: the result, or the server's
/// error message.
#[derive(Debug, Clone, PartialEq, Codec)]
pub struct ResponseFrame {
    pub id: u64,
    pub outcome: Result<InferResult, String>,
}

// The timeout stays with the caller and is not sent.
impl Codec for InferRequest {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.model_name().to_string().encode(buf);
        self.model_version().map(str::to_string).encode(buf);
        self.id().map(str::to_string).encode(buf);
        (self.inputs().len() as u32).encode(buf);
        for input in self.inputs() {
            input.encode(buf);
        }
        self.outputs().to_vec().encode(buf);
    }

    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, DecodeError> {
        let mut request = InferRequest::new(String::decode(buf, pos)?);
        if let Some(version) = Option::<String>::decode(buf, pos)? {
            request = request.with_version(version);
        }
        if let Some(request_id) = Option::<String>::decode(buf, pos)? {
            request = request.with_id(request_id);
        }
        for input in Vec::<Tensor>::decode(buf, pos)? {
            request = request.with_input(input);
        }
        for output in Vec::<RequestedOutput>::decode(buf, pos)? {
            request = request.with_requested_output(output);
        }
        Ok(request)
    }
}
