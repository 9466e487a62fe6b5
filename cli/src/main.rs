use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use clap::Parser;
use tandem::{config, net::DEFAULT_PORT, Config, Coordinator, Error, Peer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Splits a float dataset across two processes and compares naive and
/// parallel sum, max and sort.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Run as the peer that holds the second half and answers commands.
    #[arg(long)]
    worker: bool,
    /// Address of the peer (coordinator) or interface to listen on (peer).
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    ip: IpAddr,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Total dataset length across both processes.
    #[arg(long, default_value_t = config::DEFAULT_TOTAL_LEN)]
    len: usize,
    /// Worker threads for the fast engines. Defaults to all cores.
    #[arg(long)]
    threads: Option<usize>,
    /// Ranges at least this long are sorted in parallel.
    #[arg(long, default_value_t = config::DEFAULT_PARALLEL_THRESHOLD)]
    threshold: usize,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::builder()
            .total_len(self.len)
            .parallel_threshold(self.threshold)
            .build();
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.config();
    let addr = SocketAddr::new(args.ip, args.port);

    let result = if args.worker {
        run_peer(addr, &config).await
    } else {
        run_coordinator(addr, &config).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "session failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_peer(addr: SocketAddr, config: &Config) -> Result<(), Error> {
    info!(%addr, len = config.partition_len(), "running as peer");
    Peer::listen(addr, config).await?.serve().await
}

async fn run_coordinator(addr: SocketAddr, config: &Config) -> Result<(), Error> {
    info!(%addr, len = config.partition_len(), "running as coordinator");
    let mut coordinator = Coordinator::connect(addr, config).await?;
    let report = coordinator.run_rounds().await?;
    println!("{report}");
    coordinator.close().await
}
