//! Meals command implementation.

use crate::session::{Session, SessionOptions};
use mealsync_protocol::{Meal, MealPage};

/// Lists one page of meals, from the server when reachable.
pub async fn run(
    options: &SessionOptions,
    page: u32,
    limit: u32,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(options).await?;
    let envelope = session.gateway.list_meals(page, limit).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        _ => {
            if let Some(message) = &envelope.message {
                println!("{message}");
            }
            if let Some(page) = &envelope.data {
                print_text_output(page);
            }
        }
    }

    Ok(())
}

fn print_text_output(page: &MealPage<Meal>) {
    println!(
        "{:<30} {:<24} {:<10} {:>8}  {:<20} State",
        "ID", "Title", "Category", "kcal", "Date"
    );
    for meal in &page.meals {
        println!(
            "{:<30} {:<24} {:<10} {:>8.0}  {:<20} {}",
            meal.identity.as_str(),
            meal.title,
            meal.category,
            meal.calories,
            meal.date.format("%Y-%m-%d %H:%M"),
            if meal.is_local() { "unsynced" } else { "synced" }
        );
    }
    let p = &page.pagination;
    println!();
    println!(
        "Page {}/{} ({} meals{})",
        p.current_page,
        p.total_pages.max(1),
        p.total_meals,
        if p.has_more { ", more available" } else { "" }
    );
}
