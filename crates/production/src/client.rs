//! Operator client for the coordinator's command surface.
//!
//! Connects to a node's transport port, identifies itself with sender id 0,
//! issues one command, and prints the reply.

use crate::codec;
use crate::config::NetworkConfig;
use anyhow::{bail, Context};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hawklock_messages::{Envelope, Message};
use hawklock_types::{NodeId, TransactionId};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// How long to wait for the coordinator's reply.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// A single operator command.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Fetch the coordinator's aggregated wait-for graph.
    Collect,
    /// Print the cycles detected so far.
    Print,
    /// Abort a transaction by id.
    Abort(TransactionId),
}

impl ClientCommand {
    fn request(&self) -> Message {
        match self {
            ClientCommand::Collect => Message::ClientCollectWfgRequest,
            ClientCommand::Print => Message::ClientPrintDeadlockRequest,
            ClientCommand::Abort(txn) => Message::ClientResolveDeadlockRequest { txn: *txn },
        }
    }
}

/// Connect to `server`, send the command, and print the reply.
pub async fn run_client(
    server: NodeId,
    network: &NetworkConfig,
    command: ClientCommand,
) -> anyhow::Result<()> {
    let addr = network.addr_of(server);
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connecting to node {server} at {addr}"))?;
    let (read_half, write_half) = stream.into_split();
    let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());
    let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());

    let envelope = Envelope {
        sender: NodeId::BROADCAST,
        receiver: server,
        message: command.request(),
    };
    writer
        .send(Bytes::from(codec::encode(&envelope)?))
        .await
        .context("sending command")?;

    let frame = tokio::time::timeout(REPLY_TIMEOUT, reader.next())
        .await
        .context("timed out waiting for reply")?
        .context("connection closed before reply")?
        .context("reading reply")?;
    let reply = codec::decode(&frame)?;

    match reply.message {
        Message::ClientCollectWfgResponse { wfg } => {
            if wfg.is_empty() {
                println!("aggregated WFG: empty");
            } else {
                println!("aggregated WFG:");
                for (waiter, holders) in wfg.iter() {
                    let list: Vec<String> = holders.iter().map(|h| h.to_string()).collect();
                    println!("  {waiter} -> {}", list.join(", "));
                }
            }
        }
        Message::DeadlockReportToClient {
            cycles,
            deadlock_count,
        } => {
            println!("deadlocks detected: {deadlock_count}");
            for (i, cycle) in cycles.iter().enumerate() {
                let list: Vec<String> = cycle.iter().map(|t| t.to_string()).collect();
                println!("  cycle {}: {}", i + 1, list.join(" -> "));
            }
        }
        other => bail!("unexpected reply: {}", other.type_name()),
    }
    Ok(())
}
