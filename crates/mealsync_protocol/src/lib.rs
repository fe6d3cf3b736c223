//! # MealSync Protocol
//!
//! Record and wire types for the MealSync offline client.
//!
//! This crate provides:
//! - [`Meal`] with its [`RecordIdentity`] (confirmed server id or pending local id)
//! - [`MealDraft`] / [`MealPatch`] inputs and the server's [`RemoteMeal`] shape
//! - The `{success, message?, data?}` [`ApiEnvelope`] and [`MealPage`] pagination envelope
//! - [`QueuedMutation`] and its descriptor, kind, status and HTTP method
//! - Client-side identifier generation
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;
mod identity;
mod meal;
mod mutation;

pub use envelope::{ApiEnvelope, MealPage, Pagination, RefreshRequest, TokenPair};
pub use error::{ProtocolError, ProtocolResult};
pub use identity::{generate_local_id, generate_mutation_id, RecordIdentity, LOCAL_ID_PREFIX};
pub use meal::{Meal, MealDraft, MealPatch, MediaRef, RemoteMeal};
pub use mutation::{HttpMethod, MutationDescriptor, MutationKind, MutationStatus, QueuedMutation};
