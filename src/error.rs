use std::{
    fmt::{Display, Formatter},
    num::ParseIntError,
    str::Utf8Error,
};

/// All error kinds
#[derive(Debug)]
pub enum Error {
    /// Raised if an error occurs within the driver
    Client(String),
    /// Raised if an error occurs in the [`Config`](crate::client::Config) parsing
    Config(String),
    /// Raised if an error occurs when contacting or monitoring Sentinel instances
    Sentinel(String),
    /// Error returned by the Redis server
    Redis(RedisError),
    /// IO error when connecting to a Redis or Sentinel server
    IO(std::io::Error),
    /// The operation did not complete in time
    Timeout(String),
}

impl Error {
    /// `true` if the server rejected the last command because
    /// authentication is required or the provided credentials are invalid.
    pub fn is_auth_required(&self) -> bool {
        matches!(
            self,
            Error::Redis(RedisError {
                kind: RedisErrorKind::NoAuth | RedisErrorKind::WrongPass | RedisErrorKind::NoPerm,
                ..
            })
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Error::Client(e) => f.write_fmt(format_args!("Client error: {e}")),
            Error::Config(e) => f.write_fmt(format_args!("Config error: {e}")),
            Error::Sentinel(e) => f.write_fmt(format_args!("Sentinel error: {e}")),
            Error::Redis(e) => f.write_fmt(format_args!("Redis error: {e}")),
            Error::IO(e) => f.write_fmt(format_args!("IO error: {e}")),
            Error::Timeout(e) => f.write_fmt(format_args!("Timeout: {e}")),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IO(e)
    }
}

impl From<Utf8Error> for Error {
    fn from(e: Utf8Error) -> Self {
        Error::Client(e.to_string())
    }
}

impl From<ParseIntError> for Error {
    fn from(e: ParseIntError) -> Self {
        Error::Client(e.to_string())
    }
}

/// Redis server error kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisErrorKind {
    Err,
    Loading,
    MasterDown,
    MisConf,
    NoAuth,
    NoPerm,
    WrongPass,
    Other(String),
}

impl From<&str> for RedisErrorKind {
    fn from(str: &str) -> Self {
        match str {
            "ERR" => Self::Err,
            "LOADING" => Self::Loading,
            "MASTERDOWN" => Self::MasterDown,
            "MISCONF" => Self::MisConf,
            "NOAUTH" => Self::NoAuth,
            "NOPERM" => Self::NoPerm,
            "WRONGPASS" => Self::WrongPass,
            _ => Self::Other(str.to_owned()),
        }
    }
}

impl Display for RedisErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RedisErrorKind::Err => f.write_str("ERR"),
            RedisErrorKind::Loading => f.write_str("LOADING"),
            RedisErrorKind::MasterDown => f.write_str("MASTERDOWN"),
            RedisErrorKind::MisConf => f.write_str("MISCONF"),
            RedisErrorKind::NoAuth => f.write_str("NOAUTH"),
            RedisErrorKind::NoPerm => f.write_str("NOPERM"),
            RedisErrorKind::WrongPass => f.write_str("WRONGPASS"),
            RedisErrorKind::Other(e) => f.write_str(e),
        }
    }
}

/// Error issued by the Redis server
#[derive(Debug, Clone, PartialEq)]
pub struct RedisError {
    pub kind: RedisErrorKind,
    pub description: String,
}

impl From<&str> for RedisError {
    fn from(error: &str) -> Self {
        match error.split_once(' ') {
            Some((kind, description)) => Self {
                kind: kind.into(),
                description: description.to_owned(),
            },
            None => Self {
                kind: error.into(),
                description: String::new(),
            },
        }
    }
}

impl Display for RedisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{} {}", self.kind, self.description))
    }
}
