//! Minimal HTTP/1.1 message framing over a byte stream.
//!
//! Only what a keep-alive request/response exchange needs: a start line,
//! headers and a `Content-Length` body. Chunked transfer encoding is refused.

use crate::ComError;
use http::header::{CONNECTION, CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue, TRANSFER_ENCODING};
use http::{Method, Request, Response, StatusCode, Uri};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_HEAD_SIZE: usize = 64 * 1024;
pub const MAX_BODY_SIZE: u64 = 64 * 1024 * 1024;

/// Write `request` with a `Content-Length` header matching its body.
pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &Request<Vec<u8>>,
) -> Result<(), ComError> {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut head = format!("{} {} HTTP/1.1\r\n", request.method(), target);
    push_headers(&mut head, request.headers(), request.body().len())?;
    write_message(writer, head, request.body()).await
}

/// Write `response` with a `Content-Length` header matching its body.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response<Vec<u8>>,
) -> Result<(), ComError> {
    let status = response.status();
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    push_headers(&mut head, response.headers(), response.body().len())?;
    write_message(writer, head, response.body()).await
}

/// Read one response.
pub async fn read_response<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Response<Vec<u8>>, ComError> {
    let lines = read_head(reader).await?.ok_or(ComError::ConnectionClosed)?;
    let (status_line, header_lines) = lines
        .split_first()
        .ok_or_else(|| ComError::Protocol("empty response head".to_string()))?;

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(ComError::Protocol(format!("unexpected status line: {status_line}")));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| ComError::Protocol(format!("invalid status line: {status_line}")))?;

    let headers = parse_headers(header_lines)?;
    let body = read_body(reader, &headers).await?;

    let mut response = Response::builder().status(status).body(body)?;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Read one request. `Ok(None)` means the peer closed the connection cleanly
/// between requests.
pub async fn read_request<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Request<Vec<u8>>>, ComError> {
    let Some(lines) = read_head(reader).await? else {
        return Ok(None);
    };
    let (request_line, header_lines) = lines
        .split_first()
        .ok_or_else(|| ComError::Protocol("empty request head".to_string()))?;

    let mut parts = request_line.split(' ');
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(ComError::Protocol(format!("invalid request line: {request_line}")));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(ComError::Protocol(format!("unsupported version: {version}")));
    }
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|e| ComError::Protocol(e.to_string()))?;
    let uri: Uri = target
        .parse()
        .map_err(|e: http::uri::InvalidUri| ComError::Protocol(e.to_string()))?;

    let headers = parse_headers(header_lines)?;
    let body = read_body(reader, &headers).await?;

    let mut request = Request::builder().method(method).uri(uri).body(body)?;
    *request.headers_mut() = headers;
    Ok(Some(request))
}

/// Whether the peer asked for the connection to be closed after this message.
pub fn wants_close(headers: &HeaderMap) -> bool {
    headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("close"))
}

fn push_headers(head: &mut String, headers: &HeaderMap, body_len: usize) -> Result<(), ComError> {
    for (name, value) in headers {
        if name == CONTENT_LENGTH {
            continue;
        }
        let value = value
            .to_str()
            .map_err(|_| ComError::Protocol(format!("non-ASCII value for header {name}")))?;
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str(&format!("content-length: {body_len}\r\n\r\n"));
    Ok(())
}

async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    head: String,
    body: &[u8],
) -> Result<(), ComError> {
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

// Start line plus header lines, without line terminators.
async fn read_head<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<String>>, ComError> {
    let mut lines = Vec::new();
    let mut total = 0usize;
    loop {
        let mut raw = Vec::new();
        let n = reader.read_until(b'\n', &mut raw).await?;
        if n == 0 {
            if lines.is_empty() && total == 0 {
                return Ok(None);
            }
            return Err(ComError::ConnectionClosed);
        }
        total += n;
        if total > MAX_HEAD_SIZE {
            return Err(ComError::MessageTooLarge(total as u64));
        }
        // A malformed head is the peer's fault, not the connection's.
        let line = String::from_utf8(raw)
            .map_err(|_| ComError::Protocol("message head is not valid UTF-8".to_string()))?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if lines.is_empty() {
                // Tolerate stray CRLF between messages.
                continue;
            }
            return Ok(Some(lines));
        }
        lines.push(line.to_string());
    }
}

fn parse_headers(lines: &[String]) -> Result<HeaderMap, ComError> {
    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ComError::Protocol(format!("invalid header line: {line}")))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| ComError::Protocol(e.to_string()))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| ComError::Protocol(e.to_string()))?;
        headers.append(name, value);
    }
    Ok(headers)
}

async fn read_body<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    headers: &HeaderMap,
) -> Result<Vec<u8>, ComError> {
    if headers.contains_key(TRANSFER_ENCODING) {
        return Err(ComError::Protocol(
            "transfer-encoding is not supported".to_string(),
        ));
    }
    let len = match headers.get(CONTENT_LENGTH) {
        None => return Ok(Vec::new()),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| ComError::Protocol("invalid content-length".to_string()))?,
    };
    if len > MAX_BODY_SIZE {
        return Err(ComError::MessageTooLarge(len));
    }

    let mut body = vec![0u8; len as usize];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(body),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ComError::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers_trims_and_appends() {
        let lines = vec![
            "Content-Type:  application/json ".to_string(),
            "X-Trace: a".to_string(),
            "x-trace: b".to_string(),
        ];
        let headers = parse_headers(&lines).unwrap();
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(headers.get_all("x-trace").iter().count(), 2);
    }

    #[test]
    fn test_parse_headers_rejects_missing_colon() {
        let lines = vec!["not a header".to_string()];
        assert!(matches!(parse_headers(&lines), Err(ComError::Protocol(_))));
    }

    #[test]
    fn test_wants_close_case_insensitive() {
        let mut headers = HeaderMap::new();
        assert!(!wants_close(&headers));
        headers.insert(CONNECTION, HeaderValue::from_static("Close"));
        assert!(wants_close(&headers));
    }
}
