use std::net::SocketAddr;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tracing::{debug, debug_span, info, Instrument};

use super::Local;
use crate::{
    config::Config,
    engine::Op,
    net::{error::Error, link::Link, wire::Command, Acceptor},
};

/// The side that holds the second half of the dataset and answers
/// commands.
pub struct Peer<S> {
    link: Link<S>,
    local: Local,
}

impl Peer<TcpStream> {
    /// Accepts the coordinator on `addr`, generates the peer's partition and
    /// announces readiness. An invalid dataset length is rejected before
    /// the port is bound.
    pub async fn listen(addr: SocketAddr, config: &Config) -> Result<Self, Error> {
        config.validate()?;
        let acceptor = Acceptor::bind(addr, config)?;
        let link = acceptor.accept().await?;
        let local = Local::generate(config, config.peer_offset()).await?;
        Self::start(link, local).await
    }
}

impl<S> Peer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Sends [`Command::Ready`] over an established link.
    pub async fn start(mut link: Link<S>, local: Local) -> Result<Self, Error> {
        info!(len = local.len(), "partition ready");
        link.send_command(Command::Ready).await?;
        Ok(Self { link, local })
    }

    /// Answers commands one at a time until the coordinator hangs up.
    ///
    /// Waiting for the next command has no deadline. A hang-up exactly
    /// between two commands ends the session with `Ok(())`; everything else
    /// is returned as an error.
    pub async fn serve(mut self) -> Result<(), Error> {
        let span = debug_span!("peer");
        async move {
            loop {
                let cmd = match self.link.recv_command_idle().await {
                    Ok(cmd) => cmd,
                    Err(e) if e.is_orderly_close() => {
                        info!("coordinator hung up");
                        if let Err(e) = self.link.close().await {
                            debug!(error = %e, "error while closing link");
                        }
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };
                self.handle(cmd).await?;
            }
        }
        .instrument(span)
        .await
    }

    async fn handle(&mut self, cmd: Command) -> Result<(), Error> {
        let Some((op, mode)) = cmd.op_mode() else {
            debug!("ready acknowledged");
            return Ok(());
        };
        info!(?cmd, "processing");
        match op {
            Op::Sum => {
                let sum = self.local.run(move |e, d| e.sum(d, mode)).await?;
                self.link.send_scalar(sum).await
            }
            Op::Max => {
                let max = self.local.run(move |e, d| e.max(d, mode)).await?;
                self.link.send_scalar(max).await
            }
            Op::Sort => {
                let sorted = self.local.run(move |e, d| e.sort(d, mode)).await?;
                debug!(len = sorted.len(), "sending sorted partition");
                self.link.send_array(&sorted).await
            }
        }
    }
}
