use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot};

use crate::command::Operation;

/// One queued request: an operation plus the single-use slot its reply line
/// is delivered on.
struct Request {
    op: Operation,
    reply: oneshot::Sender<String>,
}

/// Handle used by connection handlers to reach the store task.
///
/// Cloning the handle shares the same underlying store; the map itself never
/// leaves the task that owns it.
#[derive(Clone)]
pub struct StoreHandle {
    sender: mpsc::UnboundedSender<Request>,
}

impl StoreHandle {
    /// Spawns the store task over an empty map and returns the handle all
    /// connection handlers share.
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(Store::new(receiver)));
        Self { sender }
    }

    /// Submits one operation and waits for its reply line.
    ///
    /// Submission never blocks on a busy store; the queue is unbounded and
    /// the store answers strictly in arrival order.
    pub async fn apply(&self, op: Operation) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Request {
                op,
                reply: reply_tx,
            })
            .map_err(|_| anyhow!("store task is not running"))?;
        reply_rx.await.context("store dropped the reply")
    }
}

/// The sole owner of the key-value map. Lives on its own task; everything
/// else holds only a [`StoreHandle`].
struct Store {
    entries: HashMap<String, String>,
    receiver: mpsc::UnboundedReceiver<Request>,
}

async fn run(mut store: Store) {
    while let Some(Request { op, reply }) = store.receiver.recv().await {
        // A handler that dropped mid-request leaves a dead reply slot; the
        // send fails and the next queued request is unaffected.
        let _ = reply.send(store.handle(op));
    }
}

impl Store {
    fn new(receiver: mpsc::UnboundedReceiver<Request>) -> Self {
        Self {
            entries: HashMap::new(),
            receiver,
        }
    }

    fn handle(&mut self, op: Operation) -> String {
        match op {
            // Absent keys and empty values are indistinguishable on the wire.
            Operation::Get { key } => self.entries.get(&key).cloned().unwrap_or_default(),
            Operation::Set { key, value } => {
                self.entries.insert(key, value);
                "OK".to_string()
            }
            Operation::Del { key } => {
                if self.entries.remove(&key).is_some() {
                    "1".to_string()
                } else {
                    "0".to_string()
                }
            }
            Operation::Incr { key, delta } => self.adjust(key, delta, 1),
            Operation::Decr { key, delta } => self.adjust(key, delta, -1),
        }
    }

    /// Applies INCR/DECR: the current value defaults to `"0"` when the key is
    /// absent, the delta to 1 when no token was supplied. The map is left
    /// untouched when either fails to parse as an integer.
    fn adjust(&mut self, key: String, delta: Option<String>, sign: i64) -> String {
        let current = self.entries.get(&key).map(String::as_str).unwrap_or("0");
        let Ok(current) = current.parse::<i64>() else {
            return format!("Error: key '{key}' value is not an integer or out of range");
        };

        let step = match &delta {
            None => 1,
            Some(token) => match token.parse::<i64>() {
                Ok(step) => step,
                Err(_) => {
                    return format!(
                        "Error: provided value '{token}' is not an integer or out of range"
                    )
                }
            },
        };

        let next = current.wrapping_add(step.wrapping_mul(sign)).to_string();
        self.entries.insert(key, next.clone());
        next
    }
}
