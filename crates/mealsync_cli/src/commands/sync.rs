//! Sync command implementation.

use crate::session::{Session, SessionOptions};

/// Runs one sync pass against the server.
pub async fn run(options: &SessionOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open_online(options).await?;
    let reconciler = session.reconciler();

    if !session.is_online() {
        println!("Server unreachable; nothing synced");
    }

    let pending_before = reconciler.pending_count();
    let envelope = reconciler.sync_queue().await;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        _ => {
            let outcome = envelope.data.unwrap_or_default();
            println!("Sync pass complete");
            println!("  queued before: {pending_before}");
            println!("  synced:        {}", outcome.synced);
            println!("  dropped:       {}", outcome.failed);
            println!("  still queued:  {}", reconciler.pending_count());
            if let Some(error) = reconciler.stats().last_error {
                println!("  last error:    {error}");
            }
        }
    }

    Ok(())
}
