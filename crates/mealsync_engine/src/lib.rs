//! # MealSync Engine
//!
//! Offline-first client core for MealSync.
//!
//! This crate provides:
//! - A durable meal cache with freshness metadata
//! - A durable, ordered mutation queue with a retry ceiling
//! - A connectivity monitor with subscriptions and an optional heartbeat
//! - A request gateway that routes every operation online or offline
//! - A sync reconciler that drains the queue when the backend is reachable
//! - An HTTP transport abstraction with a scripted mock for tests
//!
//! ## Architecture
//!
//! Callers only talk to the [`RequestGateway`]. Online, it calls the server
//! and refreshes the cache. Offline, or when a call fails in transit, it
//! updates the cache optimistically and queues the call. The
//! [`SyncReconciler`] later replays the queue oldest-first, replacing
//! placeholder records with the server's authoritative ones.
//!
//! ## Key Invariants
//!
//! - Unsynced records are never discarded by a server refresh
//! - At most one sync pass runs at a time
//! - A mutation is dropped after the configured number of failed attempts
//! - Persistence failures degrade to empty reads and are never surfaced

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod connectivity;
mod credentials;
mod error;
mod gateway;
mod http;
mod queue;
mod reconciler;
mod transport;

pub use cache::{MealCache, MEALS_CACHE_KEY, MEALS_CACHE_TIMESTAMP_KEY};
pub use config::{SyncConfig, DEFAULT_CACHE_TTL, DEFAULT_MAX_RETRIES};
pub use connectivity::{ConnectivityMonitor, NetworkState, ReachabilityProbe, Subscription};
pub use credentials::{
    CredentialProvider, MemoryCredentials, StoredCredentials, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
pub use error::{SyncError, SyncResult};
pub use gateway::{
    RequestGateway, MEALS_ENDPOINT, OFFLINE_CREATE_MESSAGE, OFFLINE_DELETE_MESSAGE,
    OFFLINE_LIST_MESSAGE, OFFLINE_UPDATE_MESSAGE, REFRESH_ENDPOINT,
};
pub use http::{HttpClient, HttpRequest, HttpResponse, HttpTransport};
pub use queue::{MutationQueue, QUEUE_KEY};
pub use reconciler::{SyncOutcome, SyncReconciler, SyncState, SyncStats};
pub use transport::{
    ApiRequest, ApiResponse, FilePart, MockTransport, MultipartForm, RemoteTransport, RequestBody,
    TransportError,
};
