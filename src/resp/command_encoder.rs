use crate::{Result, resp::Command};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

pub(crate) struct CommandEncoder;

impl Encoder<&Command> for CommandEncoder {
    type Error = crate::Error;

    #[inline]
    fn encode(&mut self, command: &Command, buf: &mut BytesMut) -> Result<()> {
        write_header(b'*', command.args.len() as i64 + 1, buf);
        write_bulk(command.name.as_bytes(), buf);
        for arg in &command.args {
            write_bulk(arg, buf);
        }
        Ok(())
    }
}

#[inline]
fn write_header(marker: u8, len: i64, buf: &mut BytesMut) {
    let mut itoa_buf = itoa::Buffer::new();
    buf.put_u8(marker);
    buf.put(itoa_buf.format(len).as_bytes());
    buf.put(&b"\r\n"[..]);
}

#[inline]
fn write_bulk(payload: &[u8], buf: &mut BytesMut) {
    write_header(b'$', payload.len() as i64, buf);
    buf.put(payload);
    buf.put(&b"\r\n"[..]);
}
