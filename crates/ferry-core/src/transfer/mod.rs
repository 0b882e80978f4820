//! Transfer units plus the collaborators an adapter leans on: local object
//! paths for uploads and server-side verification afterwards.

pub mod store;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub use store::LocalObjectStore;
pub use types::{
    Action, AuthCallback, Direction, ProgressCallback, Transfer, TransferObject,
    TransferOutcome, TransferResult,
};

/// Maps an object id to the file holding its bytes locally.
pub trait ObjectPathResolver: Send + Sync {
    fn object_path(&self, oid: &str) -> PathBuf;
}

/// Confirms with the server that an uploaded object arrived intact.
#[async_trait]
pub trait ObjectVerifier: Send + Sync {
    async fn verify(&self, object: &TransferObject) -> Result<()>;
}

/// Verifier for setups without a verification endpoint: accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipVerify;

#[async_trait]
impl ObjectVerifier for SkipVerify {
    async fn verify(&self, object: &TransferObject) -> Result<()> {
        tracing::debug!(oid = %object.oid, "no verifier configured, accepting upload");
        Ok(())
    }
}

/// Collaborators shared by every adapter created from a registry.
#[derive(Clone)]
pub struct AdapterServices {
    pub resolver: Arc<dyn ObjectPathResolver>,
    pub verifier: Arc<dyn ObjectVerifier>,
}

impl AdapterServices {
    pub fn new(resolver: Arc<dyn ObjectPathResolver>, verifier: Arc<dyn ObjectVerifier>) -> Self {
        Self { resolver, verifier }
    }
}

impl std::fmt::Debug for AdapterServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterServices").finish_non_exhaustive()
    }
}
