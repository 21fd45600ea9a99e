use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use crate::authz::engine;
use crate::authz::errors::AuthzError;
use crate::authz::loader::{compile_policy, load_policy_file};
use crate::authz::path::Path;
use crate::authz::types::{Decision, Mode, PolicyDocument};
use crate::authz::PolicySnapshot;
use crate::settings::Settings;

/// Version information of the installed policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    pub version: String,
    pub created_on: String,
}

impl Default for PolicyMetadata {
    fn default() -> Self {
        Self {
            version: "unknown".to_string(),
            created_on: "0".to_string(),
        }
    }
}

impl PolicyMetadata {
    pub fn load(path: &FsPath) -> Result<Self, AuthzError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &FsPath) -> Result<(), AuthzError> {
        tracing::debug!(file = %path.display(), version = %self.version, "Saving policy metadata");
        let bytes = serde_json::to_vec_pretty(self)?;
        if let Err(err) = std::fs::write(path, bytes) {
            // Do not leave a truncated file behind.
            let _ = std::fs::remove_file(path);
            return Err(err.into());
        }
        Ok(())
    }
}

/// The policy in force together with its version information. Both are
/// always replaced under the same write lock.
#[derive(Debug, Clone, Default)]
struct Active {
    snapshot: Option<Arc<PolicySnapshot>>,
    metadata: PolicyMetadata,
}

/// Holds the active policy snapshot.
///
/// Queries clone the snapshot `Arc` under a short read lock and evaluate
/// without holding any lock. Reloads compile off to the side, are serialized
/// by `reload`, and publish with a single pointer swap.
#[derive(Debug, Default)]
pub struct PolicyStore {
    active: RwLock<Active>,
    metadata_file: Option<PathBuf>,
    /// `true` while a rotation is open.
    reload: Mutex<bool>,
}

impl PolicyStore {
    /// An empty store: every request resolves to `Action::Unspecified`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist metadata to `path` whenever a rotation is committed.
    pub fn with_metadata_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_file = Some(path.into());
        self
    }

    /// Build a store from settings. Load failures are logged and leave the
    /// store empty rather than failing start-up.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut store = Self::new();

        if let Some(path) = &settings.policy.metadata_file {
            match PolicyMetadata::load(path) {
                Ok(metadata) => store.active.get_mut().metadata = metadata,
                Err(e) => tracing::warn!(
                    file = %path.display(),
                    error = %e,
                    "Failed to load policy metadata, using defaults"
                ),
            }
            store.metadata_file = Some(path.clone());
        }

        if settings.policy.enabled {
            if let Err(e) = store.update_policy_from_file(&settings.policy.policy_file) {
                tracing::warn!(
                    file = %settings.policy.policy_file.display(),
                    error = %e,
                    "Failed to load authorization policy, denying all requests"
                );
            }
        }

        store
    }

    /// The active snapshot, if a policy was ever installed.
    pub fn snapshot(&self) -> Option<Arc<PolicySnapshot>> {
        self.active.read().snapshot.clone()
    }

    /// The active snapshot and the metadata it was installed with, read
    /// together.
    pub fn snapshot_with_metadata(&self) -> (Option<Arc<PolicySnapshot>>, PolicyMetadata) {
        let active = self.active.read();
        (active.snapshot.clone(), active.metadata.clone())
    }

    pub fn authorize(&self, user: &str, path: &Path, mode: Mode) -> Result<Decision, AuthzError> {
        if mode == Mode::Unspecified {
            return Err(AuthzError::UnspecifiedMode);
        }
        match self.snapshot() {
            Some(snapshot) => engine::authorize(&snapshot, user, path, mode),
            None => {
                let decision = Decision::default();
                engine::log_decision(&decision, user, path, mode);
                Ok(decision)
            }
        }
    }

    pub fn authorize_with_prefix(
        &self,
        user: &str,
        prefix: &Path,
        path: &Path,
        mode: Mode,
    ) -> Result<Decision, AuthzError> {
        self.authorize(user, &prefix.join(path), mode)
    }

    /// Compile and install a new policy. On error the active policy is left
    /// untouched.
    ///
    /// Fails with [`AuthzError::RotationInProgress`] while a [`Rotation`] is
    /// open; concurrent plain updates wait for each other.
    pub fn update_policy(&self, document: PolicyDocument) -> Result<(), AuthzError> {
        let snapshot = compile_policy(document)?;
        let rotating = self.reload.lock();
        if *rotating {
            return Err(AuthzError::RotationInProgress);
        }
        self.active.write().snapshot = Some(Arc::new(snapshot));
        Ok(())
    }

    pub fn update_policy_from_file(&self, path: &FsPath) -> Result<(), AuthzError> {
        let document = load_policy_file(path)?;
        self.update_policy(document)?;
        tracing::info!(file = %path.display(), "Installed authorization policy");
        Ok(())
    }

    /// The document behind the active snapshot, or `None` if no policy was
    /// ever installed.
    pub fn current_policy(&self) -> Option<PolicyDocument> {
        self.snapshot().map(|s| s.document.clone())
    }

    pub fn metadata(&self) -> PolicyMetadata {
        self.active.read().metadata.clone()
    }

    /// Start a rotation session. Only one may be open at a time; a second
    /// attempt fails immediately instead of waiting.
    pub fn begin_rotation(&self) -> Result<Rotation<'_>, AuthzError> {
        let mut rotating = self.reload.lock();
        if *rotating {
            return Err(AuthzError::RotationInProgress);
        }
        *rotating = true;
        tracing::info!("Starting authorization policy rotation");
        Ok(Rotation {
            store: self,
            checkpoint: self.active.read().clone(),
            updated: false,
            done: false,
        })
    }
}

/// A new policy offered during a rotation.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub version: String,
    /// Creation timestamp supplied by the uploader.
    pub created_on: u64,
    pub policy: PolicyDocument,
    /// Reinstall even if `version` equals the active version.
    pub force_overwrite: bool,
}

/// An open rotation. Uploaded policies take effect immediately; dropping the
/// session without [`Rotation::finalize`] restores the checkpoint.
#[derive(Debug)]
pub struct Rotation<'a> {
    store: &'a PolicyStore,
    checkpoint: Active,
    updated: bool,
    done: bool,
}

impl Rotation<'_> {
    /// Install `request.policy`. Any failure reverts to the checkpoint.
    pub fn upload(&mut self, request: UploadRequest) -> Result<(), AuthzError> {
        let result = self.try_upload(request);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Policy upload failed, reverting to last good state");
            self.revert();
        }
        result
    }

    fn try_upload(&mut self, request: UploadRequest) -> Result<(), AuthzError> {
        if request.version.is_empty() {
            return Err(AuthzError::EmptyVersion);
        }
        if self.store.metadata().version == request.version && !request.force_overwrite {
            return Err(AuthzError::VersionExists(request.version));
        }

        let snapshot = compile_policy(request.policy)?;
        tracing::info!(version = %request.version, "Uploaded authorization policy");
        *self.store.active.write() = Active {
            snapshot: Some(Arc::new(snapshot)),
            metadata: PolicyMetadata {
                version: request.version,
                created_on: request.created_on.to_string(),
            },
        };
        self.updated = true;
        Ok(())
    }

    /// Make the uploaded policy permanent and persist its metadata.
    pub fn finalize(mut self) -> Result<PolicyMetadata, AuthzError> {
        self.done = true;
        if !self.updated {
            tracing::warn!("Rotation finalized without a successful upload");
            self.revert();
            return Err(AuthzError::NothingToFinalize);
        }

        let metadata = self.store.metadata();
        if let Some(path) = &self.store.metadata_file {
            metadata.save(path)?;
        }
        tracing::info!(version = %metadata.version, "Committed authorization policy rotation");
        Ok(metadata)
    }

    fn revert(&mut self) {
        *self.store.active.write() = self.checkpoint.clone();
        self.updated = false;
    }
}

impl Drop for Rotation<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!("Rotation ended without finalize, reverting to last good state");
            self.revert();
        }
        *self.store.reload.lock() = false;
    }
}
