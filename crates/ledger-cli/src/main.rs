use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the minimal ledger node")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct Node {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, env = "LEDGER_NODE", default_value = "http://127.0.0.1:8080")]
    node: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queue a transaction for the next block
    Submit {
        #[command(flatten)]
        node: Node,
        /// Sender
        #[arg(long)]
        sender: String,
        /// Recipient
        #[arg(long)]
        recipient: String,
        /// Quantity
        #[arg(long)]
        quantity: u64,
    },
    /// Mine the pending transactions into a new block
    Mine {
        #[command(flatten)]
        node: Node,
        /// Address credited with the mining reward
        #[arg(long)]
        miner: String,
    },
    /// Abort any mining attempt running on the node
    CancelMine {
        #[command(flatten)]
        node: Node,
    },
    /// Check the integrity of the node's chain
    Validate {
        #[command(flatten)]
        node: Node,
    },
    /// Print every block
    Chain {
        #[command(flatten)]
        node: Node,
    },
    /// Store a peer address on the node
    Register {
        #[command(flatten)]
        node: Node,
        /// Peer address
        #[arg(long)]
        address: String,
    },
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    recipient: String,
    quantity: u64,
}

async fn print_response(res: reqwest::Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    debug!(cmd = ?cli.cmd, "dispatching");
    let res = match cli.cmd {
        Command::Submit {
            node,
            sender,
            recipient,
            quantity,
        } => {
            let tx = Tx {
                sender,
                recipient,
                quantity,
            };
            client
                .post(format!("{}/transactions", node.node))
                .json(&tx)
                .send()
                .await?
        }
        Command::Mine { node, miner } => {
            client
                .post(format!("{}/mine", node.node))
                .json(&serde_json::json!({ "miner": miner }))
                .send()
                .await?
        }
        Command::CancelMine { node } => {
            client
                .post(format!("{}/mine/cancel", node.node))
                .send()
                .await?
        }
        Command::Validate { node } => {
            client
                .get(format!("{}/chain/valid", node.node))
                .send()
                .await?
        }
        Command::Chain { node } => client.get(format!("{}/chain", node.node)).send().await?,
        Command::Register { node, address } => {
            client
                .post(format!("{}/nodes", node.node))
                .json(&serde_json::json!({ "address": address }))
                .send()
                .await?
        }
    };
    print_response(res).await
}
