//! TCP mesh transport.
//!
//! Every node listens on `base_port + id` and holds one outbound connection
//! per peer, fed by a per-peer queue with a single writer task, so delivery
//! between any pair of nodes is ordered. Inbound frames are decoded and
//! pushed into the runner's event channel.
//!
//! Operator clients connect like peers but identify themselves with sender
//! id 0; the write half of the most recent client connection is kept so
//! coordinator replies addressed to node 0 reach it.

use crate::codec;
use crate::config::NetworkConfig;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hawklock_core::Event;
use hawklock_messages::{Envelope, Message};
use hawklock_types::NodeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, info, trace, warn};

/// Delay between reconnection attempts to an unreachable peer.
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Outbound queue depth per peer.
const PEER_QUEUE_DEPTH: usize = 1024;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no route to node {0}")]
    NoRoute(NodeId),

    #[error("outbound queue to node {0} is full")]
    Backpressure(NodeId),
}

/// Handle to the running transport.
pub struct Transport {
    node: NodeId,
    peers: HashMap<NodeId, mpsc::Sender<Envelope>>,
    client_sink: Arc<Mutex<Option<mpsc::Sender<Envelope>>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Transport {
    /// Bind the listener and spawn connection tasks for every peer.
    /// Received messages are delivered as events into `event_tx`.
    pub async fn start(
        node: NodeId,
        num_nodes: u32,
        config: NetworkConfig,
        event_tx: mpsc::Sender<Event>,
    ) -> Result<Self, TransportError> {
        let addr = config.addr_of(node);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(%node, %addr, "transport listening");

        let client_sink: Arc<Mutex<Option<mpsc::Sender<Envelope>>>> =
            Arc::new(Mutex::new(None));
        let mut tasks = Vec::new();

        // Accept loop: peers and clients push frames at us.
        {
            let event_tx = event_tx.clone();
            let client_sink = client_sink.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, remote)) => {
                            trace!(%node, %remote, "inbound connection");
                            tokio::spawn(handle_inbound(
                                node,
                                stream,
                                event_tx.clone(),
                                client_sink.clone(),
                            ));
                        }
                        Err(e) => {
                            warn!(%node, error = %e, "accept failed");
                        }
                    }
                }
            }));
        }

        // One outbound queue + writer task per peer.
        let mut peers = HashMap::new();
        for id in 1..=num_nodes {
            let peer = NodeId(id);
            if peer == node {
                continue;
            }
            let (tx, rx) = mpsc::channel(PEER_QUEUE_DEPTH);
            let peer_addr = config.addr_of(peer);
            tasks.push(tokio::spawn(outbound_writer(node, peer, peer_addr, rx)));
            peers.insert(peer, tx);
        }

        Ok(Transport {
            node,
            peers,
            client_sink,
            tasks,
        })
    }

    /// Queue a message for a peer, or for the attached operator client when
    /// `to` is the broadcast/client id. Backpressure and missing routes are
    /// reported; the caller treats both as transient protocol loss.
    pub fn send(&self, to: NodeId, message: Message) -> Result<(), TransportError> {
        let envelope = Envelope {
            sender: self.node,
            receiver: to,
            message,
        };
        if to.is_broadcast() {
            let sink = self.client_sink.lock().expect("client sink poisoned");
            match sink.as_ref() {
                Some(tx) => tx
                    .try_send(envelope)
                    .map_err(|_| TransportError::Backpressure(to)),
                None => {
                    debug!(node = %self.node, "no client attached, dropping reply");
                    Ok(())
                }
            }
        } else {
            let tx = self.peers.get(&to).ok_or(TransportError::NoRoute(to))?;
            tx.try_send(envelope)
                .map_err(|_| TransportError::Backpressure(to))
        }
    }

    /// Fan a message out to every peer.
    pub fn broadcast(&self, message: Message) {
        for &peer in self.peers.keys() {
            if let Err(e) = self.send(peer, message.clone()) {
                warn!(node = %self.node, %peer, error = %e, "broadcast send failed");
            }
        }
    }

    /// Stop all transport tasks.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!(node = %self.node, "transport stopped");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read frames from one inbound connection, forwarding decoded messages as
/// events. A connection identifying itself with sender id 0 is an operator
/// client; its write half becomes the client reply sink.
async fn handle_inbound(
    node: NodeId,
    stream: TcpStream,
    event_tx: mpsc::Sender<Event>,
    client_sink: Arc<Mutex<Option<mpsc::Sender<Envelope>>>>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());

    // Lazily-started writer for client replies on this connection.
    let mut reply_tx: Option<mpsc::Sender<Envelope>> = None;
    let mut writer = Some(write_half);

    while let Some(frame) = reader.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                debug!(%node, error = %e, "inbound read error");
                break;
            }
        };
        let envelope = match codec::decode(&frame) {
            Ok(env) => env,
            Err(e) => {
                warn!(%node, error = %e, "dropping undecodable frame");
                continue;
            }
        };

        if envelope.sender.is_broadcast() && reply_tx.is_none() {
            if let Some(write_half) = writer.take() {
                let (tx, mut rx) = mpsc::channel::<Envelope>(PEER_QUEUE_DEPTH);
                tokio::spawn(async move {
                    let mut framed =
                        FramedWrite::new(write_half, LengthDelimitedCodec::new());
                    while let Some(env) = rx.recv().await {
                        match codec::encode(&env) {
                            Ok(bytes) => {
                                if framed.send(Bytes::from(bytes)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "client reply encode failed"),
                        }
                    }
                });
                *client_sink.lock().expect("client sink poisoned") = Some(tx.clone());
                reply_tx = Some(tx);
                debug!(%node, "operator client attached");
            }
        }

        let event = Event::MessageReceived {
            from: envelope.sender,
            message: envelope.message,
        };
        if event_tx.send(event).await.is_err() {
            // Runner has shut down.
            break;
        }
    }
}

/// Own the outbound connection to one peer: connect (with retry), then
/// drain the queue in order. A failed write drops the frame and reconnects;
/// the protocol tolerates transient loss.
async fn outbound_writer(
    node: NodeId,
    peer: NodeId,
    addr: String,
    mut rx: mpsc::Receiver<Envelope>,
) {
    let mut framed: Option<FramedWrite<_, LengthDelimitedCodec>> = None;

    while let Some(envelope) = rx.recv().await {
        if framed.is_none() {
            framed = connect(node, peer, &addr).await;
        }
        let Some(writer) = framed.as_mut() else {
            continue; // Still unreachable; drop and let the next period retry.
        };

        let bytes = match codec::encode(&envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!(%node, %peer, error = %e, "encode failed, dropping frame");
                continue;
            }
        };
        if let Err(e) = writer.send(Bytes::from(bytes)).await {
            debug!(%node, %peer, error = %e, "write failed, reconnecting");
            framed = None;
        }
    }
}

async fn connect(
    node: NodeId,
    peer: NodeId,
    addr: &str,
) -> Option<FramedWrite<tokio::net::tcp::OwnedWriteHalf, LengthDelimitedCodec>> {
    match TcpStream::connect(addr).await {
        Ok(stream) => {
            debug!(%node, %peer, %addr, "connected to peer");
            let (_read_half, write_half) = stream.into_split();
            Some(FramedWrite::new(write_half, LengthDelimitedCodec::new()))
        }
        Err(e) => {
            trace!(%node, %peer, %addr, error = %e, "connect failed");
            tokio::time::sleep(RECONNECT_DELAY).await;
            None
        }
    }
}
