use std::{net::SocketAddr, time::Instant};

use chrono::Utc;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    task::spawn_blocking,
};
use tracing::{debug, debug_span, info, warn, Instrument};

use super::Local;
use crate::{
    config::Config,
    engine::{
        merge::{is_sorted_by_key, merge},
        reduce::max_by_key,
        Mode, Op,
    },
    net::{self, error::Error, link::Link, wire::Command},
    report::{Report, Round},
};

/// The side that holds the first half of the dataset, drives the peer and
/// combines both halves.
pub struct Coordinator<S> {
    link: Link<S>,
    local: Local,
}

impl Coordinator<TcpStream> {
    /// Dials the peer, generates the coordinator's partition and waits for
    /// the peer to report ready. An invalid dataset length is rejected
    /// before dialing.
    pub async fn connect(addr: SocketAddr, config: &Config) -> Result<Self, Error> {
        config.validate()?;
        let link = net::dial(addr, config).await?;
        let local = Local::generate(config, config.coordinator_offset()).await?;
        Self::start(link, local).await
    }
}

impl<S> Coordinator<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Waits for [`Command::Ready`] on an established link.
    pub async fn start(mut link: Link<S>, local: Local) -> Result<Self, Error> {
        debug!("waiting for peer");
        match link.recv_command().await? {
            Command::Ready => info!("peer ready"),
            other => return Err(Error::UnexpectedCommand(other)),
        }
        Ok(Self { link, local })
    }

    /// Sum of keys over both partitions.
    pub async fn sum(&mut self, mode: Mode) -> Result<f32, Error> {
        self.link.send_command(Command::for_op(Op::Sum, mode)).await?;
        let local = self.local.spawn(move |e, d| e.sum(d, mode));
        let remote = self.link.recv_scalar().await?;
        Ok(local.await? + remote)
    }

    /// Stored value with the greatest key over both partitions.
    pub async fn max(&mut self, mode: Mode) -> Result<f32, Error> {
        self.link.send_command(Command::for_op(Op::Max, mode)).await?;
        let local = self.local.spawn(move |e, d| e.max(d, mode));
        let remote = self.link.recv_scalar().await?;
        Ok(max_by_key(local.await?, remote))
    }

    /// Both partitions merged into one sequence sorted by key.
    pub async fn sort(&mut self, mode: Mode) -> Result<Vec<f32>, Error> {
        self.link.send_command(Command::for_op(Op::Sort, mode)).await?;
        let local = self.local.spawn(move |e, d| e.sort(d, mode));
        let remote = self.link.recv_array(self.local.len()).await?;
        let local = local.await?;
        Ok(spawn_blocking(move || merge(&local, &remote)).await?)
    }

    /// Runs sum, max and sort in `mode`, timing each from request to
    /// combined result.
    pub async fn run_round(&mut self, mode: Mode) -> Result<Round, Error> {
        let span = debug_span!("round", ?mode);
        async move {
            let start = Instant::now();
            let sum = self.sum(mode).await?;
            let sum_time = start.elapsed();
            info!(?sum_time, sum, "sum done");

            let start = Instant::now();
            let max = self.max(mode).await?;
            let max_time = start.elapsed();
            info!(?max_time, max, "max done");

            let start = Instant::now();
            let merged = self.sort(mode).await?;
            let sort_time = start.elapsed();
            let sorted = is_sorted_by_key(&merged);
            if !sorted {
                warn!("merged array is out of order");
            }
            info!(?sort_time, len = merged.len(), "sort done");

            Ok(Round {
                mode,
                sum,
                max,
                sorted_len: merged.len(),
                sorted,
                sum_time,
                max_time,
                sort_time,
            })
        }
        .instrument(span)
        .await
    }

    /// Round 1 with the basic engines, round 2 with the fast ones.
    pub async fn run_rounds(&mut self) -> Result<Report, Error> {
        let started_at = Utc::now();
        let basic = self.run_round(Mode::Basic).await?;
        let fast = self.run_round(Mode::Fast).await?;
        Ok(Report {
            started_at,
            basic,
            fast,
        })
    }

    /// Ends the session; the peer sees an orderly hang-up.
    pub async fn close(mut self) -> Result<(), Error> {
        self.link.close().await
    }
}
