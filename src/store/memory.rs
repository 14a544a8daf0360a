//! In-process store backend.
//!
//! A shared JSON tree behind a single lock. Writes apply in lock-acquisition
//! order, which is the last-write-wins policy the adapter contract promises,
//! and every subscriber whose subtree overlaps a change receives the new
//! snapshot before the lock is released, so per-observer delivery order
//! matches apply order. Used directly by tests and as the tree behind the
//! relay server.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use super::{Store, StoreError, Subscription};
use async_trait::async_trait;

struct Subscriber {
    path: String,
    tx: mpsc::UnboundedSender<Option<Value>>,
}

struct State {
    tree: Value,
    subscribers: Vec<Subscriber>,
}

/// Shared in-memory store. Cloning yields another handle to the same tree.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                tree: Value::Object(serde_json::Map::new()),
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::new("store lock poisoned"))
    }

    /// Notifies every subscriber whose path overlaps `changed`, pruning
    /// subscribers whose receiving side has been dropped.
    fn notify(state: &mut State, changed: &str) {
        let tree = state.tree.clone();
        state.subscribers.retain(|sub| {
            if !paths_overlap(&sub.path, changed) {
                return true;
            }
            let snapshot = lookup(&tree, &sub.path).cloned();
            sub.tx.send(snapshot).is_ok()
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for MemoryStore {
    #[instrument(skip(self))]
    async fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let state = self.lock()?;
        Ok(lookup(&state.tree, path).cloned())
    }

    #[instrument(skip(self, value))]
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        *ensure_node(&mut state.tree, path) = value;
        MemoryStore::notify(&mut state, path);
        Ok(())
    }

    #[instrument(skip(self, fields))]
    async fn update(
        &self,
        path: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let node = ensure_node(&mut state.tree, path);
        if !node.is_object() {
            *node = Value::Object(serde_json::Map::new());
        }
        if let Some(object) = node.as_object_mut() {
            for (key, value) in fields {
                object.insert(key, value);
            }
        }
        MemoryStore::notify(&mut state, path);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if remove_node(&mut state.tree, path) {
            MemoryStore::notify(&mut state, path);
        } else {
            debug!(path, "remove on absent path");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let mut state = self.lock()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let initial = lookup(&state.tree, path).cloned();
        // Initial delivery cannot fail: the receiver is still in scope here.
        let _ = tx.send(initial);
        state.subscribers.push(Subscriber {
            path: path.to_string(),
            tx,
        });
        Ok(Subscription::new(rx))
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// True when one path is a (non-strict) prefix of the other, i.e. a change
/// at one is visible from a subscription at the other.
fn paths_overlap(a: &str, b: &str) -> bool {
    segments(a).zip(segments(b)).all(|(x, y)| x == y)
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for seg in segments(path) {
        node = node.as_object()?.get(seg)?;
    }
    if node.is_null() { None } else { Some(node) }
}

/// Walks to `path`, creating intermediate objects, and returns the node.
fn ensure_node<'a>(root: &'a mut Value, path: &str) -> &'a mut Value {
    let mut node = root;
    for seg in segments(path) {
        if !node.is_object() {
            *node = Value::Object(serde_json::Map::new());
        }
        node = node
            .as_object_mut()
            .expect("object ensured above")
            .entry(seg.to_string())
            .or_insert(Value::Null);
    }
    node
}

/// Removes the node at `path`. Returns false when the path was absent.
fn remove_node(root: &mut Value, path: &str) -> bool {
    let segs: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = segs.split_last() else {
        // Removing the root clears the whole tree.
        *root = Value::Object(serde_json::Map::new());
        return true;
    };
    let mut node = root;
    for seg in parents {
        match node.as_object_mut().and_then(|o| o.get_mut(*seg)) {
            Some(next) => node = next,
            None => return false,
        }
    }
    node.as_object_mut()
        .and_then(|o| o.remove(*last))
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlap_is_prefix_both_ways() {
        assert!(paths_overlap("sessions/a", "sessions/a/players/p"));
        assert!(paths_overlap("sessions/a/players/p", "sessions/a"));
        assert!(!paths_overlap("sessions/a", "sessions/b"));
    }

    #[test]
    fn ensure_node_creates_intermediates() {
        let mut root = json!({});
        *ensure_node(&mut root, "a/b/c") = json!(1);
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn remove_node_reports_absence() {
        let mut root = json!({"a": {"b": 1}});
        assert!(remove_node(&mut root, "a/b"));
        assert!(!remove_node(&mut root, "a/b"));
        assert_eq!(root, json!({"a": {}}));
    }
}
