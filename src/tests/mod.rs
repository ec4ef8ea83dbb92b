mod bootstrap;
mod config;
mod util;

pub(crate) use util::*;
