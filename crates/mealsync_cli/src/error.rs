//! CLI errors.

use mealsync_engine::SyncError;
use mealsync_storage::StorageError;
use thiserror::Error;

/// Errors reported to the user by the CLI.
#[derive(Error, Debug)]
pub enum CliError {
    /// A command needs the API URL.
    #[error("--server is required for this command")]
    MissingServer,

    /// A date argument did not parse.
    #[error("invalid date '{value}': {reason}")]
    InvalidDate {
        /// The rejected argument.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// `update` was called without any field.
    #[error("nothing to update; pass at least one of --title, --category, --calories, --date")]
    EmptyUpdate,

    /// The local store failed.
    #[error("store error: {0}")]
    Storage(#[from] StorageError),

    /// The gateway reported a hard failure.
    #[error("{0}")]
    Sync(#[from] SyncError),
}
