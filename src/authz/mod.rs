pub mod engine;
pub mod errors;
pub mod loader;
pub mod path;
pub mod policy;
pub mod store;
pub mod types;

use types::{GroupRegistry, PolicyDocument, PolicyNode};

/// Fully compiled authorization policy.
/// Immutable after construction. A reload builds a new snapshot and swaps it in.
#[derive(Debug)]
pub struct PolicySnapshot {
    /// Root of the path trie; the root node itself holds rules on `/`.
    pub root: PolicyNode,
    /// group name -> member usernames
    pub groups: GroupRegistry,
    /// The document this snapshot was compiled from.
    pub document: PolicyDocument,
}
