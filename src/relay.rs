//! TCP relay hosting the shared tree for remote store clients.
//!
//! `gridhunt serve` runs one of these. It holds a [`MemoryStore`] and
//! services the line protocol from any number of connections; it contains
//! no game logic whatsoever. Operations apply in arrival order, which is
//! the last-write-wins policy clients are written against.

use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::store::{ClientRequest, MemoryStore, ServerMessage, Store, StoreError};

/// A bound relay, ready to serve connections.
#[derive(Debug)]
pub struct Relay {
    listener: TcpListener,
    store: MemoryStore,
}

impl Relay {
    /// Binds the relay to `addr` (e.g. `127.0.0.1:7070`, or port `0` for an
    /// ephemeral port).
    #[instrument]
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding relay to {addr}"))?;
        Ok(Self {
            listener,
            store: MemoryStore::new(),
        })
    }

    /// The address the relay is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("relay local address")
    }

    /// Accepts and serves connections until the process exits.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "relay listening");
        loop {
            let (stream, peer) = self.listener.accept().await.context("accepting client")?;
            info!(%peer, "client connected");
            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, store).await {
                    debug!(%peer, error = %e, "connection error");
                }
                info!(%peer, "client disconnected");
            });
        }
    }
}

async fn serve_connection(stream: TcpStream, store: MemoryStore) -> Result<()> {
    let (read, mut write) = stream.into_split();

    // One writer task serializes all outgoing messages, so acks and
    // snapshot pushes from different tasks never interleave mid-line.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let Ok(mut line) = serde_json::to_string(&message) else {
                continue;
            };
            line.push('\n');
            if write.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut forwarders: HashMap<u64, JoinHandle<()>> = HashMap::new();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await.context("reading request")? {
        let request: ClientRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed client request");
                continue;
            }
        };
        handle_request(request, &store, &out_tx, &mut forwarders).await;
    }

    for (_, task) in forwarders {
        task.abort();
    }
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

async fn handle_request(
    request: ClientRequest,
    store: &MemoryStore,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
    forwarders: &mut HashMap<u64, JoinHandle<()>>,
) {
    match request {
        ClientRequest::Read { id, path } => {
            let message = match store.read_once(&path).await {
                Ok(value) => ServerMessage::Value { id, value },
                Err(e) => error_message(id, e),
            };
            let _ = out_tx.send(message);
        }
        ClientRequest::Write { id, path, value } => {
            let _ = out_tx.send(acked(id, store.write(&path, value).await));
        }
        ClientRequest::Update { id, path, fields } => {
            let _ = out_tx.send(acked(id, store.update(&path, fields).await));
        }
        ClientRequest::Remove { id, path } => {
            let _ = out_tx.send(acked(id, store.remove(&path).await));
        }
        ClientRequest::Subscribe { id, sub, path } => match store.subscribe(&path).await {
            Ok(mut subscription) => {
                let _ = out_tx.send(ServerMessage::Ack { id });
                let tx = out_tx.clone();
                let task = tokio::spawn(async move {
                    while let Some(value) = subscription.next().await {
                        if tx.send(ServerMessage::Snapshot { sub, value }).is_err() {
                            break;
                        }
                    }
                });
                if let Some(stale) = forwarders.insert(sub, task) {
                    stale.abort();
                }
            }
            Err(e) => {
                let _ = out_tx.send(error_message(id, e));
            }
        },
        ClientRequest::Unsubscribe { id, sub } => {
            if let Some(task) = forwarders.remove(&sub) {
                task.abort();
            }
            let _ = out_tx.send(ServerMessage::Ack { id });
        }
    }
}

fn acked(id: u64, result: Result<(), StoreError>) -> ServerMessage {
    match result {
        Ok(()) => ServerMessage::Ack { id },
        Err(e) => error_message(id, e),
    }
}

fn error_message(id: u64, error: StoreError) -> ServerMessage {
    ServerMessage::Error {
        id,
        message: error.to_string(),
    }
}
