mod async_executor_strategy;
mod sentinel_connection;
mod sentinel_registry;
mod standalone_connection;

pub(crate) use async_executor_strategy::*;
pub use sentinel_connection::*;
pub(crate) use sentinel_registry::*;
pub use standalone_connection::*;
