//! Custom transfer adapters: delegate object uploads and downloads to
//! external agent programs that speak a line-delimited JSON protocol.
//!
//! The host builds an [`AdapterRegistry`] once at startup with
//! [`configure_custom_adapters`], creates a [`CustomAdapter`] per batch and
//! hands it to a scheduler such as [`pool::run_batch`].

pub mod adapter;
pub mod config;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transfer;

pub use adapter::{CustomAdapter, TransferAdapter};
pub use config::{ConfigMap, ConfigSource};
pub use error::{AdapterError, ConfigError};
pub use pool::{BatchReport, PoolCallbacks, run_batch};
pub use registry::{
    AdapterDefinition, AdapterDirections, AdapterRegistry, ConfigureReport, DEFAULT_NAMESPACE,
    configure_custom_adapters,
};
pub use session::WorkerSession;
pub use transfer::{
    Action, AdapterServices, Direction, LocalObjectStore, ObjectPathResolver, ObjectVerifier,
    SkipVerify, Transfer, TransferObject, TransferOutcome, TransferResult,
};
