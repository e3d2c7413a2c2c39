use crate::ComError;
use infer_codec::Codec;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024; // 64 MB

/// Write one frame: a 4-byte little-endian length prefix, then the payload.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ComError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| ComError::MessageTooLarge(payload.len() as u64))?;

    if len > MAX_MESSAGE_SIZE {
        return Err(ComError::MessageTooLarge(u64::from(len)));
    }

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    Ok(())
}

/// Read one frame written by `write_frame`.
///
/// Returns `ComError::ConnectionClosed` if EOF is encountered and
/// `ComError::MessageTooLarge` if the prefix exceeds `MAX_MESSAGE_SIZE`.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, ComError> {
    let mut len_buf = [0u8; 4];
    read_exact_or_closed(reader, &mut len_buf).await?;

    let len = u32::from_le_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(ComError::MessageTooLarge(u64::from(len)));
    }

    let mut payload = vec![0u8; len as usize];
    read_exact_or_closed(reader, &mut payload).await?;
    Ok(payload)
}

/// Encode `value` with `Codec::to_bytes()` and write it as one frame.
pub async fn write_message<T: Codec, W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    value: &T,
) -> Result<(), ComError> {
    write_frame(writer, &value.to_bytes()).await
}

/// Read one frame and decode it with `Codec::from_bytes()`.
pub async fn read_message<T: Codec, R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<T, ComError> {
    let payload = read_frame(reader).await?;
    T::from_bytes(&payload).map_err(ComError::from)
}

async fn read_exact_or_closed<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), ComError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ComError::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}
