//! Queue command implementation.

use crate::session::SessionOptions;
use mealsync_engine::{MutationQueue, DEFAULT_MAX_RETRIES};
use mealsync_protocol::QueuedMutation;

/// Lists (or clears) the queued mutations. Works without a server.
pub fn run(
    options: &SessionOptions,
    format: &str,
    clear: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let queue = MutationQueue::new(options.open_store()?, DEFAULT_MAX_RETRIES);

    if clear {
        let dropped = queue.size();
        queue.clear();
        println!("Dropped {dropped} queued mutation(s)");
        return Ok(());
    }

    let mutations = queue.get_all();
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&mutations)?);
        }
        _ => print_text_output(&mutations, queue.max_retries()),
    }

    Ok(())
}

fn print_text_output(mutations: &[QueuedMutation], max_retries: u32) {
    if mutations.is_empty() {
        println!("Queue is empty");
        return;
    }

    println!(
        "{:<28} {:<7} {:<7} {:<32} {:>7}  {:<8} Queued at",
        "ID", "Kind", "Method", "Endpoint", "Retries", "Status"
    );
    for m in mutations {
        println!(
            "{:<28} {:<7} {:<7} {:<32} {:>4}/{:<2}  {:<8} {}",
            m.id,
            format!("{:?}", m.kind),
            m.method,
            m.endpoint,
            m.retry_count,
            max_retries,
            format!("{:?}", m.status),
            m.enqueued_at.to_rfc3339()
        );
    }
    println!();
    println!("{} mutation(s) pending", mutations.len());
}
