//! Store backend speaking the relay protocol over TCP.
//!
//! [`RemoteStore`] is a thin handle; a background transport loop owns the
//! socket, correlates request/reply pairs, and routes snapshot pushes to the
//! subscription that asked for them. All handle methods go through one
//! command channel, so request order on the wire matches call order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use super::{ClientRequest, ServerMessage, Store, StoreError, Subscription};

type Reply = oneshot::Sender<Result<Option<Value>, StoreError>>;

enum Command {
    Call {
        request: ClientRequest,
        reply: Reply,
    },
    Subscribe {
        request: ClientRequest,
        snapshots: mpsc::UnboundedSender<Option<Value>>,
        reply: Reply,
    },
}

/// Store client connected to a `gridhunt serve` relay.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct RemoteStore {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
}

impl RemoteStore {
    /// Connects to a relay and spawns the background transport loop.
    #[instrument]
    pub async fn connect(addr: &str) -> Result<Self, StoreError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| StoreError::new(format!("connect to {addr}: {e}")))?;
        info!(addr, "connected to relay");
        let (read, write) = stream.into_split();
        let (commands, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(transport_loop(read, write, command_rx));
        Ok(Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    fn fresh_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call(&self, request: ClientRequest) -> Result<Option<Value>, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Call { request, reply })
            .map_err(|_| StoreError::new("relay connection closed"))?;
        rx.await
            .map_err(|_| StoreError::new("relay connection closed"))?
    }
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for RemoteStore {
    async fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.call(ClientRequest::Read {
            id: self.fresh_id(),
            path: path.to_string(),
        })
        .await
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.call(ClientRequest::Write {
            id: self.fresh_id(),
            path: path.to_string(),
            value,
        })
        .await
        .map(|_| ())
    }

    async fn update(
        &self,
        path: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.call(ClientRequest::Update {
            id: self.fresh_id(),
            path: path.to_string(),
            fields,
        })
        .await
        .map(|_| ())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.call(ClientRequest::Remove {
            id: self.fresh_id(),
            path: path.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let request = ClientRequest::Subscribe {
            id: self.fresh_id(),
            sub: self.fresh_id(),
            path: path.to_string(),
        };
        let (snapshots, snapshot_rx) = mpsc::unbounded_channel();
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Subscribe {
                request,
                snapshots,
                reply,
            })
            .map_err(|_| StoreError::new("relay connection closed"))?;
        let _ack = rx
            .await
            .map_err(|_| StoreError::new("relay connection closed"))??;
        Ok(Subscription::new(snapshot_rx))
    }
}

async fn transport_loop(
    read: OwnedReadHalf,
    mut write: OwnedWriteHalf,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut lines = BufReader::new(read).lines();
    let mut pending: HashMap<u64, Reply> = HashMap::new();
    let mut subscriptions: HashMap<u64, mpsc::UnboundedSender<Option<Value>>> = HashMap::new();
    // Ids for loop-originated unsubscribes count down from the top so they
    // never collide with handle-originated ids counting up from 1.
    let mut local_id = u64::MAX;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("all store handles dropped, closing transport");
                    break;
                };
                match command {
                    Command::Call { request, reply } => {
                        let id = request.id();
                        match send_line(&mut write, &request).await {
                            Ok(()) => {
                                pending.insert(id, reply);
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e));
                                break;
                            }
                        }
                    }
                    Command::Subscribe { request, snapshots, reply } => {
                        let id = request.id();
                        let ClientRequest::Subscribe { sub, .. } = &request else {
                            continue;
                        };
                        let sub = *sub;
                        match send_line(&mut write, &request).await {
                            Ok(()) => {
                                subscriptions.insert(sub, snapshots);
                                pending.insert(id, reply);
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e));
                                break;
                            }
                        }
                    }
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match serde_json::from_str::<ServerMessage>(&line) {
                        Ok(message) => {
                            dispatch(
                                message,
                                &mut pending,
                                &mut subscriptions,
                                &mut write,
                                &mut local_id,
                            )
                            .await;
                        }
                        Err(e) => warn!(error = %e, "malformed relay message"),
                    },
                    Ok(None) => {
                        info!("relay closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "relay read failed");
                        break;
                    }
                }
            }
        }
    }

    // Outstanding calls fail, snapshot streams end.
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(StoreError::new("relay connection closed")));
    }
    subscriptions.clear();
}

async fn dispatch(
    message: ServerMessage,
    pending: &mut HashMap<u64, Reply>,
    subscriptions: &mut HashMap<u64, mpsc::UnboundedSender<Option<Value>>>,
    write: &mut OwnedWriteHalf,
    local_id: &mut u64,
) {
    match message {
        ServerMessage::Ack { id } => {
            if let Some(reply) = pending.remove(&id) {
                let _ = reply.send(Ok(None));
            }
        }
        ServerMessage::Value { id, value } => {
            if let Some(reply) = pending.remove(&id) {
                let _ = reply.send(Ok(value));
            }
        }
        ServerMessage::Error { id, message } => {
            if let Some(reply) = pending.remove(&id) {
                let _ = reply.send(Err(StoreError::new(message)));
            }
        }
        ServerMessage::Snapshot { sub, value } => {
            let dropped = match subscriptions.get(&sub) {
                Some(tx) => tx.send(value).is_err(),
                None => false,
            };
            if dropped {
                subscriptions.remove(&sub);
                *local_id -= 1;
                let request = ClientRequest::Unsubscribe {
                    id: *local_id,
                    sub,
                };
                if let Err(e) = send_line(write, &request).await {
                    debug!(error = %e, "unsubscribe after drop failed");
                }
            }
        }
    }
}

async fn send_line(write: &mut OwnedWriteHalf, request: &ClientRequest) -> Result<(), StoreError> {
    let mut line = serde_json::to_string(request)
        .map_err(|e| StoreError::new(format!("encode request: {e}")))?;
    line.push('\n');
    write
        .write_all(line.as_bytes())
        .await
        .map_err(|e| StoreError::new(format!("relay connection lost: {e}")))
}
