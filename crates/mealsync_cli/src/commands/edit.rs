//! Add, update and delete commands.

use crate::error::CliError;
use crate::session::{Session, SessionOptions};
use chrono::{DateTime, Utc};
use mealsync_protocol::{MealDraft, MealPatch};
use std::path::PathBuf;

/// Builds a draft from command-line arguments.
pub fn draft(
    title: String,
    category: String,
    calories: f64,
    date: Option<&str>,
    image: Option<PathBuf>,
) -> Result<MealDraft, CliError> {
    let date = match date {
        Some(raw) => parse_date(raw)?,
        None => Utc::now(),
    };
    let draft = MealDraft::new(title, category, date, calories);
    Ok(match image {
        Some(path) => draft.with_image(path.to_string_lossy()),
        None => draft,
    })
}

/// Builds a patch from command-line arguments.
pub fn patch(
    title: Option<String>,
    category: Option<String>,
    calories: Option<f64>,
    date: Option<&str>,
) -> Result<MealPatch, CliError> {
    let patch = MealPatch {
        title,
        category,
        calories,
        date: date.map(parse_date).transpose()?,
    };
    if patch.is_empty() {
        return Err(CliError::EmptyUpdate);
    }
    Ok(patch)
}

/// Runs the add command.
pub async fn add(options: &SessionOptions, draft: MealDraft) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(options).await?;
    let envelope = session
        .gateway
        .create_meal(draft)
        .await
        .map_err(CliError::from)?;

    if let Some(meal) = &envelope.data {
        println!("Created {} ({})", meal.title, meal.identity);
    }
    if let Some(message) = &envelope.message {
        println!("{message}");
    }
    Ok(())
}

/// Runs the update command.
pub async fn update(
    options: &SessionOptions,
    id: &str,
    patch: MealPatch,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(options).await?;
    let envelope = session
        .gateway
        .update_meal(id, patch)
        .await
        .map_err(CliError::from)?;

    match &envelope.data {
        Some(meal) => println!("Updated {} ({})", meal.title, meal.identity),
        None => println!("Update of {id} recorded"),
    }
    if let Some(message) = &envelope.message {
        println!("{message}");
    }
    Ok(())
}

/// Runs the delete command.
pub async fn delete(options: &SessionOptions, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(options).await?;
    let envelope = session
        .gateway
        .delete_meal(id)
        .await
        .map_err(CliError::from)?;

    println!(
        "{}",
        envelope.message.as_deref().unwrap_or("Meal deleted")
    );
    Ok(())
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| CliError::InvalidDate {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
