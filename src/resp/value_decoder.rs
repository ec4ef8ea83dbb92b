use crate::{Error, RedisError, Result, resp::Value};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

pub(crate) struct ValueDecoder;

impl Decoder for ValueDecoder {
    type Item = Value;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        if src.is_empty() {
            return Ok(None);
        }

        match parse_value(src.as_ref())? {
            Some((value, len)) => {
                src.advance(len);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

/// Parse a single frame from the head of `buf`.
///
/// Returns the parsed value and its encoded length,
/// or `None` if the buffer does not yet hold a complete frame.
fn parse_value(buf: &[u8]) -> Result<Option<(Value, usize)>> {
    let Some((line, line_len)) = parse_line(buf) else {
        return Ok(None);
    };

    if line.is_empty() {
        return Err(Error::Client("Unexpected empty frame".to_owned()));
    }

    let payload = &line[1..];

    match line[0] {
        b'+' => Ok(Some((
            Value::SimpleString(std::str::from_utf8(payload)?.to_owned()),
            line_len,
        ))),
        b'-' => Ok(Some((
            Value::Error(RedisError::from(std::str::from_utf8(payload)?)),
            line_len,
        ))),
        b':' => {
            let i = atoi::atoi::<i64>(payload)
                .ok_or_else(|| Error::Client("Cannot parse integer frame".to_owned()))?;
            Ok(Some((Value::Integer(i), line_len)))
        }
        b'$' => {
            let len = atoi::atoi::<i64>(payload)
                .ok_or_else(|| Error::Client("Cannot parse bulk string length".to_owned()))?;

            if len < 0 {
                return Ok(Some((Value::BulkString(None), line_len)));
            }

            let len = len as usize;
            if buf.len() < line_len + len + 2 {
                return Ok(None);
            }

            let bytes = Bytes::copy_from_slice(&buf[line_len..line_len + len]);
            Ok(Some((Value::BulkString(Some(bytes)), line_len + len + 2)))
        }
        b'*' => {
            let len = atoi::atoi::<i64>(payload)
                .ok_or_else(|| Error::Client("Cannot parse array length".to_owned()))?;

            if len < 0 {
                return Ok(Some((Value::Array(None), line_len)));
            }

            let mut values = Vec::with_capacity(len as usize);
            let mut offset = line_len;

            for _ in 0..len {
                match parse_value(&buf[offset..])? {
                    Some((value, len)) => {
                        values.push(value);
                        offset += len;
                    }
                    None => return Ok(None),
                }
            }

            Ok(Some((Value::Array(Some(values)), offset)))
        }
        marker => Err(Error::Client(format!(
            "Unexpected frame marker {}",
            marker as char
        ))),
    }
}

/// Extract the first CRLF-terminated line, returning it without its
/// terminator, together with the terminated length.
fn parse_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    let index = memchr::memmem::find(buf, b"\r\n")?;
    Some((&buf[..index], index + 2))
}
