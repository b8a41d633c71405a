mod api;
mod constants;

use api::AppState;
use clap::Parser;
use constants::{DEFAULT_LISTEN, DEFAULT_MINE_TIMEOUT_SECS};
use ledger_core::SharedChain;
use std::{net::SocketAddr, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "LEDGER_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Seconds a mining attempt may run before it is abandoned
    #[arg(long, env = "LEDGER_MINE_TIMEOUT_SECS", default_value_t = DEFAULT_MINE_TIMEOUT_SECS)]
    mine_timeout_secs: u64,

    /// Optional label for this node in logs
    #[arg(long, env = "LEDGER_NODE_ID")]
    node_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let chain = SharedChain::new();
    let genesis = chain.latest_block();
    info!(
        node_id = args.node_id.as_deref().unwrap_or("-"),
        genesis = %genesis.hash(),
        "chain initialised"
    );

    let state = AppState::new(chain, Duration::from_secs(args.mine_timeout_secs));
    let app = api::router(state.clone()).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
    // in-flight mines would otherwise hold the graceful shutdown open
    state.cancel_mining();
}
