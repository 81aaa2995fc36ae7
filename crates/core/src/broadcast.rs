//! Fan-out of log lines and job notifications to connected viewers.
//!
//! Each viewer owns a bounded queue. Publishing never waits on a viewer:
//! a full queue drops the event for that viewer only, a closed queue
//! removes the viewer.
//!
//! Per channel the broadcaster remembers the byte offset the tailer has
//! published up to. Subscribing snapshots that offset and registers the
//! viewer under the same lock, so every line is either part of the
//! returned backlog or delivered live afterwards.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{CoreError, CoreResult};
use crate::jobs::JobStatus;
use crate::tail::{read_backlog, LogSource, TailUpdate};

/// Queue depth per viewer before events start being dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(u64);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewer-{}", self.0)
    }
}

/// One line of log output, already cleaned of terminal escapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub channel: String,
    pub text: String,
}

/// Events pushed to viewers, serialized as `{"type": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ViewerEvent {
    LogLine {
        channel: String,
        text: String,
    },
    Backlog {
        channel: String,
        text: String,
    },
    JobCompleted {
        #[serde(rename = "jobName")]
        job_name: String,
        status: JobStatus,
        message: String,
    },
}

impl From<LogLine> for ViewerEvent {
    fn from(line: LogLine) -> Self {
        Self::LogLine {
            channel: line.channel,
            text: line.text,
        }
    }
}

/// A connected viewer: its id and the receiving end of its queue.
#[derive(Debug)]
pub struct Viewer {
    pub id: ViewerId,
    pub events: mpsc::Receiver<ViewerEvent>,
}

struct ChannelState {
    path: PathBuf,
    offset: u64,
    subscribers: BTreeSet<ViewerId>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    viewers: HashMap<ViewerId, mpsc::Sender<ViewerEvent>>,
    channels: HashMap<String, ChannelState>,
}

impl Registry {
    /// Send `event` to each of `targets`, dropping viewers whose queue closed.
    fn deliver(&mut self, targets: &[ViewerId], event: &ViewerEvent) {
        let mut closed = Vec::new();
        for id in targets {
            let Some(tx) = self.viewers.get(id) else {
                continue;
            };
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(viewer = %id, "viewer queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            tracing::debug!(viewer = %id, "viewer went away, removing");
            self.remove(id);
        }
    }

    fn remove(&mut self, id: ViewerId) -> bool {
        for channel in self.channels.values_mut() {
            channel.subscribers.remove(&id);
        }
        self.viewers.remove(&id).is_some()
    }
}

pub struct Broadcaster {
    registry: Mutex<Registry>,
    queue_capacity: usize,
}

impl Broadcaster {
    pub fn new(sources: impl IntoIterator<Item = LogSource>) -> Self {
        let broadcaster = Self {
            registry: Mutex::new(Registry::default()),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        };
        for source in sources {
            broadcaster.register_channel(&source);
        }
        broadcaster
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Mutations never leave the registry half-updated.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a channel backed by `source`. Re-registering a channel keeps its
    /// subscribers and resets the published offset.
    pub fn register_channel(&self, source: &LogSource) {
        let mut registry = self.lock();
        let state = registry
            .channels
            .entry(source.channel().to_string())
            .or_insert_with(|| ChannelState {
                path: PathBuf::new(),
                offset: 0,
                subscribers: BTreeSet::new(),
            });
        state.path = source.path().to_path_buf();
        state.offset = 0;
    }

    /// Channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Offset the tailer of `channel` has published up to.
    pub fn published_offset(&self, channel: &str) -> Option<u64> {
        self.lock().channels.get(channel).map(|c| c.offset)
    }

    pub fn viewer_count(&self) -> usize {
        self.lock().viewers.len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock()
            .channels
            .get(channel)
            .map_or(0, |c| c.subscribers.len())
    }

    /// Register a new viewer with an empty subscription set.
    pub fn connect(&self) -> Viewer {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = ViewerId(registry.next_id);
        registry.viewers.insert(id, tx);
        tracing::debug!(viewer = %id, "viewer connected");
        Viewer { id, events: rx }
    }

    /// Subscribe `viewer` to `channel` and return the channel's history.
    ///
    /// The history covers exactly the bytes published before registration;
    /// anything later arrives on the viewer's queue. Returns `Ok(None)` when
    /// the viewer was already subscribed, since it has had its history.
    pub async fn subscribe(&self, viewer: ViewerId, channel: &str) -> CoreResult<Option<String>> {
        let (path, offset) = {
            let mut registry = self.lock();
            if !registry.viewers.contains_key(&viewer) {
                return Err(CoreError::not_found("Viewer", viewer.to_string()));
            }
            let Some(state) = registry.channels.get_mut(channel) else {
                return Err(CoreError::not_found("Channel", channel));
            };
            if !state.subscribers.insert(viewer) {
                return Ok(None);
            }
            (state.path.clone(), state.offset)
        };

        tracing::debug!(viewer = %viewer, channel, offset, "viewer subscribed");
        let backlog = read_backlog(&path, offset)
            .await
            .map_err(|e| CoreError::io(&path, e))?;
        Ok(Some(backlog))
    }

    /// Remove every registration of `viewer`. Unknown viewers are ignored.
    pub fn unsubscribe(&self, viewer: ViewerId) {
        if self.lock().remove(viewer) {
            tracing::debug!(viewer = %viewer, "viewer disconnected");
        }
    }

    /// Deliver one line to the subscribers of its channel.
    pub fn publish(&self, line: LogLine) {
        let mut registry = self.lock();
        let Some(state) = registry.channels.get(&line.channel) else {
            tracing::warn!(channel = %line.channel, "publish to unknown channel");
            return;
        };
        let targets: Vec<ViewerId> = state.subscribers.iter().copied().collect();
        registry.deliver(&targets, &ViewerEvent::from(line));
    }

    /// Record a tailer's progress and deliver its lines, in file order.
    pub fn publish_tail(&self, update: TailUpdate) {
        let mut registry = self.lock();
        let Some(state) = registry.channels.get_mut(&update.channel) else {
            tracing::warn!(channel = %update.channel, "tail update for unknown channel");
            return;
        };
        state.offset = update.offset;
        if update.lines.is_empty() {
            return;
        }
        let targets: Vec<ViewerId> = state.subscribers.iter().copied().collect();
        for text in update.lines {
            let event = ViewerEvent::LogLine {
                channel: update.channel.clone(),
                text,
            };
            registry.deliver(&targets, &event);
        }
    }

    /// Deliver `event` to every connected viewer regardless of channel.
    pub fn broadcast(&self, event: ViewerEvent) {
        let mut registry = self.lock();
        let targets: Vec<ViewerId> = registry.viewers.keys().copied().collect();
        registry.deliver(&targets, &event);
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}
