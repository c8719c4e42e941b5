//! Frame routing shared by the client and server read loops.

use bytes::Bytes;
use tracing::trace;

use crate::registry::Registry;

/// Hand a DATA payload to its stream without waiting.
///
/// Payloads for unknown streams are discarded.
pub(crate) fn route_data(registry: &Registry, stream_id: u32, payload: Bytes) {
    match registry.get(stream_id) {
        Some(stream) => {
            stream.push(payload);
        }
        None => trace!(stream_id, "data for unknown stream discarded"),
    }
}

/// Peer closed a stream: drop it from the registry and end it locally.
pub(crate) fn route_close(registry: &Registry, stream_id: u32) {
    match registry.delete(stream_id) {
        Some(stream) => stream.kill(),
        None => trace!(stream_id, "close for unknown stream ignored"),
    }
}
