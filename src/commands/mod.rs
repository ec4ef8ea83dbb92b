mod sentinel_commands;

pub use sentinel_commands::*;
