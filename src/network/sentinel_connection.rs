use crate::{
    Future,
    address::RedisUri,
    client::Config,
    commands::SentinelCommands,
    network::StandaloneConnection,
};

/// Factory opening connections to individual Sentinel instances.
///
/// The production implementation is [`TcpSentinelConnector`]; tests and
/// embedders with a custom transport can provide their own.
pub trait SentinelConnector: Send + Sync {
    /// Open a connection to the Sentinel at `uri`, authenticating with the
    /// configured Sentinel credentials when `use_password` is set.
    fn connect<'a>(
        &'a self,
        uri: &'a RedisUri,
        use_password: bool,
    ) -> Future<'a, Box<dyn SentinelCommands>>;
}

/// Opens plain TCP connections to Sentinel instances.
pub struct TcpSentinelConnector {
    config: Config,
}

impl TcpSentinelConnector {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl SentinelConnector for TcpSentinelConnector {
    fn connect<'a>(
        &'a self,
        uri: &'a RedisUri,
        use_password: bool,
    ) -> Future<'a, Box<dyn SentinelCommands>> {
        Box::pin(async move {
            let credentials = if use_password {
                self.config.sentinel_credentials()
            } else {
                None
            };

            let connection = StandaloneConnection::connect(
                uri.host(),
                uri.port(),
                credentials.as_ref(),
                &self.config,
            )
            .await?;

            Ok(Box::new(connection) as Box<dyn SentinelCommands>)
        })
    }
}
