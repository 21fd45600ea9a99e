//! pathz - path-based authorization for network-device management
//!
//! Compiles path rules (`/a/b[k=v]/c`) for users and groups into a keyed trie
//! and answers read/write authorization queries against it.

pub mod authz;
pub mod settings;

pub use authz::errors::AuthzError;
pub use authz::path::{Path, PathSegment};
pub use authz::store::{PolicyMetadata, PolicyStore, Rotation, UploadRequest};
pub use authz::types::{Action, Decision, Mode, PolicyDocument};
