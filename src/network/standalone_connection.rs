use crate::{
    Error, Future, Result,
    client::{Config, Credentials},
    commands::SentinelCommands,
    network::{TcpStreamReader, TcpStreamWriter, tcp_connect, timeout},
    resp::{Command, CommandEncoder, Value, ValueDecoder, cmd},
};
use futures_util::{SinkExt, StreamExt};
use log::{Level, debug, log_enabled};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

struct Streams {
    framed_read: FramedRead<TcpStreamReader, ValueDecoder>,
    framed_write: FramedWrite<TcpStreamWriter, CommandEncoder>,
}

/// A single non-blocking TCP connection to a Redis or Sentinel instance.
///
/// Commands may be dispatched concurrently; each one holds the streams for
/// its full write/read exchange, so replies stay paired with commands.
pub struct StandaloneConnection {
    command_timeout: Duration,
    tag: String,
    streams: Mutex<Streams>,
}

impl StandaloneConnection {
    pub async fn connect(
        host: &str,
        port: u16,
        credentials: Option<&Credentials>,
        config: &Config,
    ) -> Result<Self> {
        let (reader, writer) = tcp_connect(host, port, config).await?;

        let connection = Self {
            command_timeout: config.command_timeout,
            tag: if config.connection_name.is_empty() {
                format!("{host}:{port}")
            } else {
                format!("{}:{}:{}", config.connection_name, host, port)
            },
            streams: Mutex::new(Streams {
                framed_read: FramedRead::new(reader, ValueDecoder),
                framed_write: FramedWrite::new(writer, CommandEncoder),
            }),
        };

        if let Some(credentials) = credentials {
            connection.auth(credentials).await?;
        }

        Ok(connection)
    }

    async fn send_command(&self, command: &Command) -> Result<Value> {
        let mut streams = self.streams.lock().await;

        if log_enabled!(Level::Debug) {
            debug!("[{}] Sending command: {command}", self.tag);
        }

        streams.framed_write.send(command).await?;

        let Some(result) = streams.framed_read.next().await else {
            debug!("[{}] Socket is closed", self.tag);
            return Err(Error::Client(format!("[{}] Disconnected by peer", self.tag)));
        };

        if log_enabled!(Level::Debug) {
            match &result {
                Ok(value) => debug!("[{}] Received result {value:?}", self.tag),
                Err(err) => debug!("[{}] Received result {err:?}", self.tag),
            }
        }

        match result? {
            Value::Error(e) => Err(Error::Redis(e)),
            value => Ok(value),
        }
    }

    async fn auth(&self, credentials: &Credentials) -> Result<()> {
        let mut command = cmd("AUTH");
        if let Some(username) = &credentials.username {
            command = command.arg(username.as_str());
        }
        command = command.arg(credentials.password.as_str());

        self.send_command(&command).await?;
        Ok(())
    }
}

impl SentinelCommands for StandaloneConnection {
    fn send(&self, command: Command) -> Future<'_, Value> {
        Box::pin(async move {
            if self.command_timeout.is_zero() {
                self.send_command(&command).await
            } else {
                timeout(self.command_timeout, self.send_command(&command)).await?
            }
        })
    }

    fn close(&self) -> Future<'_, ()> {
        Box::pin(async move {
            debug!("[{}] Closing connection", self.tag);
            let _ = self.streams.lock().await.framed_write.close().await;
            Ok(())
        })
    }
}
