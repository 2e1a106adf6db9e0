use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use upgrade_sniffer::adapters::{serve, HexDumpObserver, ReverseProxy, SessionTracker, Sniffer};
use upgrade_sniffer::domain::{SnifferConfig, TapError};
use upgrade_sniffer::ports::TrackingPort;

#[derive(Parser, Debug)]
#[clap(version = env!("SNIFFER_VERSION"), about = "Reverse proxy dumping upgraded connections as hex")]
pub struct Opts {
    /// listen on this network address
    #[clap(long, short = 'b')]
    bind: Option<String>,

    /// Upstream server every request is forwarded to
    #[clap(long, short = 'u')]
    upstream: Option<String>,

    /// Configuration file (defaults to the per-user upgrade-sniffer config)
    #[clap(long, short = 'c')]
    config: Option<PathBuf>,

    /// Size in bytes of each tap pipe
    #[clap(long)]
    pipe_capacity: Option<usize>,
}

impl Opts {
    fn apply(self, mut config: SnifferConfig) -> SnifferConfig {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(upstream) = self.upstream {
            config.upstream = upstream;
        }
        if let Some(pipe_capacity) = self.pipe_capacity {
            config.pipe_capacity = pipe_capacity;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();
    let config = SnifferConfig::load(opts.config.as_deref())?;
    let config = opts.apply(config);
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)))
        .init();

    if let Err(e) = rlimit::increase_nofile_limit(u64::MAX) {
        warn!("Failed to raise open file limit: {}", e);
    }

    let tracker = Arc::new(SessionTracker::new());
    tracker.start_cleanup();
    let tracker_port: Arc<dyn TrackingPort> = tracker.clone();

    let observer = Arc::new(HexDumpObserver::new(tracker_port).with_chunk_size(config.dump_chunk_size));
    let proxy = ReverseProxy::new(&config.upstream_url()?)?;
    let sniffer = Sniffer::new(proxy, observer).with_pipe_capacity(config.pipe_capacity);

    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| TapError::Bind(format!("{}: {}", config.bind, e)))?;
    info!("listening on {} (upstream {})", listener.local_addr()?, config.upstream);

    tokio::select! {
        _ = serve(listener, sniffer) => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Shutting down");
        }
    }

    Ok(())
}
