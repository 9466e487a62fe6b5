use std::net::SocketAddr;

use tokio::{
    net::{TcpListener, TcpSocket, TcpStream},
    time::sleep,
};
use tracing::{debug, debug_span, info, Instrument};

use crate::config::Config;

pub mod error;
pub mod link;
pub mod wire;

use error::Error;
use link::Link;

/// Port used when none is given.
pub const DEFAULT_PORT: u16 = 8080;

/// Creates a socket for `addr` with the session's buffer sizes applied.
fn session_socket(addr: SocketAddr, config: &Config) -> Result<TcpSocket, Error> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_send_buffer_size(config.socket_buffer)?;
    socket.set_recv_buffer_size(config.socket_buffer)?;
    Ok(socket)
}

/// The peer's listening side. It hands out exactly one connection.
pub struct Acceptor {
    listener: TcpListener,
    config: Config,
}

impl Acceptor {
    /// Binds `addr` with a backlog of one. Buffer sizes set here carry over
    /// to the accepted connection.
    pub fn bind(addr: SocketAddr, config: &Config) -> Result<Self, Error> {
        let socket = session_socket(addr, config)?;
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1)?;
        info!(addr = %listener.local_addr()?, "listening for coordinator");
        Ok(Self {
            listener,
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for the coordinator. The listener is dropped afterwards, so no
    /// second session can be opened.
    pub async fn accept(self) -> Result<Link<TcpStream>, Error> {
        let (stream, remote) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        info!(%remote, "coordinator connected");
        Ok(Link::new(stream, &self.config))
    }
}

/// Connects to the peer at `addr`, retrying every `dial_interval` up to
/// `dial_attempts` times.
pub async fn dial(addr: SocketAddr, config: &Config) -> Result<Link<TcpStream>, Error> {
    let span = debug_span!("dial", remote = %addr);
    async move {
        info!("connecting to peer");
        for attempt in 1..=config.dial_attempts {
            debug!(attempt, "dialing");
            let socket = session_socket(addr, config)?;
            match socket.connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    info!(attempt, "connected to peer");
                    return Ok(Link::new(stream, config));
                }
                Err(e) => {
                    debug!(attempt, error = %e, "connect failed");
                    if attempt < config.dial_attempts {
                        sleep(config.dial_interval).await;
                    }
                }
            }
        }
        Err(Error::DialFailed {
            addr,
            attempts: config.dial_attempts,
        })
    }
    .instrument(span)
    .await
}
