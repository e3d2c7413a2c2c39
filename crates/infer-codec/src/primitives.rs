use crate::{Codec, DecodeError};

// Read exactly n bytes from buf at pos
fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], DecodeError> {
    let end = pos.checked_add(n).ok_or(DecodeError::UnexpectedEof)?;
    if end > buf.len() {
        return Err(DecodeError::UnexpectedEof);
    }
    let slice = &buf[*pos..end];
    *pos = end;
    Ok(slice)
}

/// Append a u32 length prefix followed by the raw bytes.
pub fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    (bytes.len() as u32).encode(buf);
    buf.extend_from_slice(bytes);
}

/// Read a u32 length prefix and borrow that many bytes.
pub fn decode_bytes<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], DecodeError> {
    let len = u32::decode(buf, pos)? as usize;
    read_bytes(buf, pos, len)
}

// --- bool ---

impl Codec for bool {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(u8::from(*self));
    }

    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, DecodeError> {
        match read_bytes(buf, pos, 1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(DecodeError::InvalidBool(v)),
        }
    }
}

// --- Integer and float types ---

macro_rules! impl_codec_for_numeric {
    ($($ty:ty),*) => {
        $(
            impl Codec for $ty {
                fn encode(&self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(&self.to_le_bytes());
                }

                fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, DecodeError> {
                    const SIZE: usize = std::mem::size_of::<$ty>();
                    let mut raw = [0u8; SIZE];
                    raw.copy_from_slice(read_bytes(buf, pos, SIZE)?);
                    Ok(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_codec_for_numeric!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

// --- String ---

impl Codec for String {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_bytes(buf, self.as_bytes());
    }

    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, DecodeError> {
        let bytes = decode_bytes(buf, pos)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

// --- Option<T> ---

impl<T: Codec> Codec for Option<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            None => buf.push(0),
            Some(value) => {
                buf.push(1);
                value.encode(buf);
            }
        }
    }

    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, DecodeError> {
        match read_bytes(buf, pos, 1)?[0] {
            0 => Ok(None),
            1 => Ok(Some(T::decode(buf, pos)?)),
            v => Err(DecodeError::InvalidVariant(u32::from(v))),
        }
    }
}

// --- Result<T, E> ---

impl<T: Codec, E: Codec> Codec for Result<T, E> {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Ok(value) => {
                buf.push(0);
                value.encode(buf);
            }
            Err(err) => {
                buf.push(1);
                err.encode(buf);
            }
        }
    }

    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, DecodeError> {
        match read_bytes(buf, pos, 1)?[0] {
            0 => Ok(Ok(T::decode(buf, pos)?)),
            1 => Ok(Err(E::decode(buf, pos)?)),
            v => Err(DecodeError::InvalidVariant(u32::from(v))),
        }
    }
}

// --- Vec<T> ---

impl<T: Codec> Codec for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        (self.len() as u32).encode(buf);
        for item in self {
            item.encode(buf);
        }
    }

    fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, DecodeError> {
        let len = u32::decode(buf, pos)? as usize;
        // Never trust the prefix for the allocation size.
        let capacity = len.min(buf.len() - *pos);
        let mut vec = Vec::with_capacity(capacity);
        for _ in 0..len {
            vec.push(T::decode(buf, pos)?);
        }
        Ok(vec)
    }
}
