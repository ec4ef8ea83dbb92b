use crate::{Error, Result, client::Config};
use log::{debug, info};
use std::{future::Future, net::SocketAddr, time::Duration};

#[cfg(feature = "tokio-runtime")]
pub(crate) type TcpStreamReader = tokio::io::ReadHalf<tokio::net::TcpStream>;
#[cfg(feature = "tokio-runtime")]
pub(crate) type TcpStreamWriter = tokio::io::WriteHalf<tokio::net::TcpStream>;

#[cfg(feature = "async-std-runtime")]
pub(crate) type TcpStreamReader =
    tokio_util::compat::Compat<futures_util::io::ReadHalf<async_std::net::TcpStream>>;
#[cfg(feature = "async-std-runtime")]
pub(crate) type TcpStreamWriter =
    tokio_util::compat::Compat<futures_util::io::WriteHalf<async_std::net::TcpStream>>;

pub(crate) async fn tcp_connect(
    host: &str,
    port: u16,
    config: &Config,
) -> Result<(TcpStreamReader, TcpStreamWriter)> {
    debug!(
        "Connecting to {host}:{port} with timeout {:?}...",
        config.connect_timeout
    );

    let reader: TcpStreamReader;
    let writer: TcpStreamWriter;

    #[cfg(feature = "tokio-runtime")]
    {
        let stream = timeout(
            config.connect_timeout,
            tokio::net::TcpStream::connect((host, port)),
        )
        .await??;

        if let Some(keep_alive) = config.keep_alive {
            socket2::SockRef::from(&stream)
                .set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(keep_alive))?;
        }

        if config.no_delay {
            stream.set_nodelay(true)?;
        }

        (reader, writer) = tokio::io::split(stream);
    }
    #[cfg(feature = "async-std-runtime")]
    {
        use futures_util::AsyncReadExt;
        use tokio_util::compat::{FuturesAsyncReadCompatExt, FuturesAsyncWriteCompatExt};

        let stream = timeout(
            config.connect_timeout,
            async_std::net::TcpStream::connect((host, port)),
        )
        .await??;

        if config.no_delay {
            stream.set_nodelay(true)?;
        }

        let (r, w) = stream.split();
        reader = r.compat();
        writer = w.compat_write();
    }

    info!("Connected to {host}:{port}");

    Ok((reader, writer))
}

/// Resolve a hostname through the runtime's DNS machinery.
pub(crate) async fn lookup_host(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    #[cfg(feature = "tokio-runtime")]
    {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
    #[cfg(feature = "async-std-runtime")]
    {
        use async_std::net::ToSocketAddrs;
        Ok((host, port).to_socket_addrs().await?.collect())
    }
}

/// Spawn a detached task.
///
/// The monitor loops end themselves through the cancellation token and the
/// shutdown gate; nothing ever joins them.
pub(crate) fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    #[cfg(feature = "tokio-runtime")]
    drop(tokio::spawn(future));
    #[cfg(feature = "async-std-runtime")]
    drop(async_std::task::spawn(future));
}

pub(crate) async fn sleep(duration: Duration) {
    #[cfg(feature = "tokio-runtime")]
    tokio::time::sleep(duration).await;
    #[cfg(feature = "async-std-runtime")]
    async_std::task::sleep(duration).await;
}

/// Bound `future` to `limit`, surfacing expiry as [`Error::Timeout`].
pub(crate) async fn timeout<F: Future>(limit: Duration, future: F) -> Result<F::Output> {
    #[cfg(feature = "tokio-runtime")]
    {
        match tokio::time::timeout(limit, future).await {
            Ok(output) => Ok(output),
            Err(_) => Err(Error::Timeout(format!("no completion after {limit:?}"))),
        }
    }
    #[cfg(feature = "async-std-runtime")]
    {
        // async-std panics on durations close to Duration::MAX
        // see: https://github.com/async-rs/async-std/issues/1037
        if limit == Duration::MAX {
            return Ok(future.await);
        }

        match async_std::future::timeout(limit, future).await {
            Ok(output) => Ok(output),
            Err(_) => Err(Error::Timeout(format!("no completion after {limit:?}"))),
        }
    }
}
