use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::stream::Stream;

/// Live streams of one connection, keyed by id.
///
/// The map has its own lock, separate from each stream's state lock; the
/// two are never held together. Once [`Registry::kill_all`] has run the
/// registry is closed and accepts no new streams.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<Streams>,
}

#[derive(Debug, Default)]
struct Streams {
    map: HashMap<u32, Stream>,
    closed: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u32) -> Option<Stream> {
        self.streams().map.get(&id).cloned()
    }

    /// Register `stream` under `id`, returning any stream it replaced.
    ///
    /// A closed registry kills `stream` instead of storing it.
    pub fn set(&self, id: u32, stream: Stream) -> Option<Stream> {
        let rejected = {
            let mut streams = self.streams();
            if !streams.closed {
                return streams.map.insert(id, stream);
            }
            stream
        };
        debug!(stream_id = id, "registry closed, rejecting stream");
        rejected.kill();
        None
    }

    pub fn delete(&self, id: u32) -> Option<Stream> {
        self.streams().map.remove(&id)
    }

    /// Remove `stream` only if it is still the one registered under its id.
    pub(crate) fn remove_stream(&self, stream: &Stream) -> bool {
        let mut streams = self.streams();
        match streams.map.get(&stream.id()) {
            Some(current) if current.same_as(stream) => {
                streams.map.remove(&stream.id());
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.streams().map.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.streams().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams().map.is_empty()
    }

    /// True once [`Registry::kill_all`] has run.
    pub fn is_closed(&self) -> bool {
        self.streams().closed
    }

    /// Ids of the registered streams, ascending.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.streams().map.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Kill every registered stream, empty the registry and close it.
    pub fn kill_all(&self) {
        let taken = {
            let mut streams = self.streams();
            streams.closed = true;
            std::mem::take(&mut streams.map)
        };
        if taken.is_empty() {
            return;
        }
        let count = taken.len();
        for stream in taken.into_values() {
            stream.kill();
        }
        debug!(count, "killed all streams");
    }

    fn streams(&self) -> MutexGuard<'_, Streams> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
