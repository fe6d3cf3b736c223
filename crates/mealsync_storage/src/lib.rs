//! # MealSync Storage
//!
//! Key-value persistence backends for the MealSync offline client.
//!
//! This crate is the durable boundary underneath the meal cache, the
//! mutation queue and the credential store. Backends are **opaque value
//! stores**: they map string keys to byte values and never interpret what
//! they hold. Serialization and the policy for unreadable values belong to
//! the callers.
//!
//! ## Design Principles
//!
//! - Every operation returns a [`StorageResult`]; backends never swallow errors
//! - Writes of a single key are all-or-nothing
//! - Must be `Send + Sync` for shared access from async tasks
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For testing and ephemeral sessions
//! - [`FileStore`] - One file per key inside a directory
//!
//! ## Example
//!
//! ```rust
//! use mealsync_storage::{KeyValueStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.put("greeting", b"hello world").unwrap();
//! assert_eq!(store.get("greeting").unwrap().as_deref(), Some(&b"hello world"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::KeyValueStore;
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
