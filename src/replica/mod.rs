//! Replicated Value
//!
//! A named observable value shared between the authoritative process and any
//! number of presentation surfaces. Each value uses a synchronous snapshot
//! channel so late subscribers never miss the latest state, and an
//! asynchronous update channel for pushes. Updates received from a remote
//! peer are terminal: they are never sent back to where they came from.

mod bus;
pub mod endpoint;
mod node;
mod value;

pub use endpoint::{Endpoint, Envelope, InboxEndpoint, Peer, SnapshotSource, SurfaceId};
pub use node::ReplicaNode;
pub use value::{is_change, Replicable, ReplicatedValue, WatchHandle};
