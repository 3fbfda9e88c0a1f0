//! Persistence of the manager state.
//!
//! The scheduler writes its whole state, items, queue, active set and
//! configuration, as one JSON document under a single key of a
//! [`KeyValueStore`]. Writes are debounced with a [`Debouncer`]; on startup the
//! document is loaded once and passed through [`PersistedState::recover`].
//!
//! - [`store`] - the [`KeyValueStore`] contract, [`MemoryStore`] and [`FileStore`]
//! - [`snapshot`] - [`PersistedState`], the recovery pass and [`Persistence`]
//! - [`debounce`] - the [`Debouncer`] timer
//!
//! # Examples
//!
//! ```rust
//! use haul::persistence::{FileStore, KeyValueStore};
//!
//! # async fn example() -> Result<(), haul::Error> {
//! let store = FileStore::new("/var/lib/haul");
//! let raw = store.get("haul.downloads").await?;
//! # Ok(())
//! # }
//! ```

pub mod debounce;
pub mod snapshot;
pub mod store;

pub use debounce::Debouncer;
pub use snapshot::{PersistedState, Persistence, RecoveryReport, STATE_VERSION};
pub use store::{FileStore, KeyValueStore, MemoryStore};
