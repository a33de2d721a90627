//! hawklock node and operator client.
//!
//! # Usage
//!
//! ```bash
//! # Run a node
//! hawklock server --node-id 1 --config cluster.toml
//!
//! # Operator commands against the coordinator
//! hawklock client --server-node-id 1 collect
//! hawklock client --server-node-id 1 print
//! hawklock client --server-node-id 1 abort --txn-home 2 --txn-seq 17
//! ```
//!
//! # Configuration
//!
//! Example TOML (all fields optional; defaults in parentheses):
//!
//! ```toml
//! [system]
//! num_nodes = 4                  # (4)
//! resources_per_node = 1000      # (1000)
//! coordinator = 1                # (1)
//! mode = "hawk"                  # none | centralized | hawk | path-pushing
//! detection_interval = 50        # ms
//! pag_sample_interval = 5000     # ms
//! zone_detection_interval = 5000 # ms
//! check_interval = 5000          # ms
//! scc_cut_threshold = 2
//! r_threshold = 1.0
//!
//! [network]
//! host = "127.0.0.1"
//! base_port = 8000
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hawklock_node::NodeStateMachine;
use hawklock_production::client::{run_client, ClientCommand};
use hawklock_production::{init_logging, ProductionConfig, ProductionRunner, Transport};
use hawklock_types::{NodeId, TransactionId};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Distributed lock manager with pluggable deadlock detection.
#[derive(Parser, Debug)]
#[command(name = "hawklock")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the cluster configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node.
    Server {
        /// This node's id (1-based).
        #[arg(long)]
        node_id: u32,
    },
    /// Issue an operator command to a node (normally the coordinator).
    Client {
        /// The node to connect to.
        #[arg(long)]
        server_node_id: u32,

        #[command(subcommand)]
        command: OperatorCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
enum OperatorCommand {
    /// Fetch the coordinator's aggregated wait-for graph.
    Collect,
    /// Print the deadlock cycles found so far.
    Print,
    /// Abort a transaction.
    Abort {
        /// Home node of the transaction.
        #[arg(long)]
        txn_home: u32,
        /// Per-node sequence number of the transaction.
        #[arg(long)]
        txn_seq: u32,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ProductionConfig> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ProductionConfig::from_toml(&contents)
                .with_context(|| format!("parsing config {}", path.display()))
        }
        None => Ok(ProductionConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Server { node_id } => {
            anyhow::ensure!(
                node_id >= 1 && node_id <= config.system.num_nodes,
                "node id {node_id} outside configured cluster of {} nodes",
                config.system.num_nodes
            );
            let node = NodeId(node_id);
            let (event_tx, event_rx) = mpsc::channel(4096);
            let transport = Transport::start(
                node,
                config.system.num_nodes,
                config.network.clone(),
                event_tx.clone(),
            )
            .await?;
            let machine = NodeStateMachine::new(node, config.system.clone());
            ProductionRunner::new(machine, transport, event_tx, event_rx)
                .run()
                .await
        }
        Command::Client {
            server_node_id,
            command,
        } => {
            let command = match command {
                OperatorCommand::Collect => ClientCommand::Collect,
                OperatorCommand::Print => ClientCommand::Print,
                OperatorCommand::Abort { txn_home, txn_seq } => {
                    ClientCommand::Abort(TransactionId::new(NodeId(txn_home), txn_seq))
                }
            };
            run_client(NodeId(server_node_id), &config.network, command).await
        }
    }
}
