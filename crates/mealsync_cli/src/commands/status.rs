//! Status command implementation.

use crate::session::{Session, SessionOptions};
use mealsync_engine::{CredentialProvider, StoredCredentials};
use serde::Serialize;

/// Snapshot of the local client state.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Store directory.
    pub store: String,
    /// API base URL, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Whether the server answered the probe.
    pub online: bool,
    /// Whether a token pair is stored.
    pub signed_in: bool,
    /// Number of cached meals.
    pub cached_meals: usize,
    /// Cached meals not yet confirmed by the server.
    pub unsynced_meals: usize,
    /// Whether the cache was refreshed within its TTL.
    pub cache_fresh: bool,
    /// Last full cache refresh (RFC 3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<String>,
    /// Number of queued mutations.
    pub queued_mutations: usize,
}

/// Runs the status command.
pub async fn run(options: &SessionOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(options).await?;
    let cache = session.gateway.cache();
    let credentials = StoredCredentials::new(session.store.clone());

    let report = StatusReport {
        store: options.store.display().to_string(),
        server: options.server.clone(),
        online: session.is_online(),
        signed_in: credentials.access_token().is_some(),
        cached_meals: cache.get_all().len(),
        unsynced_meals: cache.get_local_only().len(),
        cache_fresh: cache.is_fresh(),
        last_refreshed: cache.last_refreshed().map(|at| at.to_rfc3339()),
        queued_mutations: session.gateway.queue().size(),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print_text_output(&report),
    }

    Ok(())
}

fn print_text_output(report: &StatusReport) {
    println!("MealSync Store Status");
    println!("=====================");
    println!("Store:            {}", report.store);
    println!(
        "Server:           {}",
        report.server.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "Network:          {}",
        if report.online { "online" } else { "offline" }
    );
    println!(
        "Signed in:        {}",
        if report.signed_in { "yes" } else { "no" }
    );
    println!();
    println!("Cached meals:     {}", report.cached_meals);
    println!("  unsynced:       {}", report.unsynced_meals);
    println!(
        "Cache refreshed:  {} ({})",
        report.last_refreshed.as_deref().unwrap_or("never"),
        if report.cache_fresh { "fresh" } else { "stale" }
    );
    println!("Queued mutations: {}", report.queued_mutations);
}
