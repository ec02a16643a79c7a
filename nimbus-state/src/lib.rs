//! Nimbus State Management
//!
//! Persists what Nimbus created so later runs can diff against it.
//!
//! - **StateFile**: all managed resources with their remote identifiers
//! - **StateBackend**: storage trait with locking
//! - **LockInfo**: who holds the lock and until when
//!
//! # Example
//!
//! ```ignore
//! use nimbus_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local("nimbus.state.json")).await?;
//!
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//!
//! // ... apply effects, upserting resources ...
//!
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

// Re-export main types for convenience
pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
