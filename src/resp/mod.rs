/*!
Minimal implementation of the [RESP](https://redis.io/docs/reference/protocol-spec/) protocol,
covering the command subset spoken to Sentinel instances.
*/
mod command;
mod command_encoder;
mod value;
mod value_decoder;

pub use command::*;
pub(crate) use command_encoder::*;
pub use value::*;
pub(crate) use value_decoder::*;
