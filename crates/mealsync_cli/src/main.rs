//! MealSync CLI
//!
//! Command-line client for a file-backed MealSync store.
//!
//! # Commands
//!
//! - `status` - Show store, queue and connectivity information
//! - `queue` - List queued mutations
//! - `meals` - List meals (online, or from the cache)
//! - `add` / `update` / `delete` - Change meals through the gateway
//! - `sync` - Run one sync pass
//! - `login` / `logout` - Store or forget the token pair

mod client;
mod commands;
mod error;
mod session;

use clap::{Parser, Subcommand};
use session::SessionOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// MealSync offline store client.
#[derive(Parser)]
#[command(name = "mealsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory of the local store
    #[arg(global = true, short, long, default_value = ".mealsync")]
    store: PathBuf,

    /// Base URL of the API
    #[arg(global = true, long)]
    server: Option<String>,

    /// Treat the device as offline without probing the server
    #[arg(global = true, long)]
    offline: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store, queue and connectivity information
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List queued mutations
    Queue {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Drop every queued mutation
        #[arg(long)]
        clear: bool,
    },

    /// List meals
    Meals {
        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Page size
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Log a meal
    Add {
        /// Meal title
        #[arg(short, long)]
        title: String,

        /// Meal category (breakfast, lunch, dinner, snack)
        #[arg(short, long, default_value = "snack")]
        category: String,

        /// Energy in kilocalories
        #[arg(short = 'k', long, default_value = "0")]
        calories: f64,

        /// When the meal was eaten (RFC 3339, defaults to now)
        #[arg(short, long)]
        date: Option<String>,

        /// Photo to upload
        #[arg(short, long)]
        image: Option<PathBuf>,
    },

    /// Change a meal
    Update {
        /// Server id or local id
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New category
        #[arg(short, long)]
        category: Option<String>,

        /// New calorie count
        #[arg(short = 'k', long)]
        calories: Option<f64>,

        /// New date (RFC 3339)
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Delete a meal
    Delete {
        /// Server id or local id
        id: String,
    },

    /// Run one sync pass
    Sync {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Store a token pair
    Login {
        /// Access token
        #[arg(long)]
        access_token: String,

        /// Refresh token
        #[arg(long)]
        refresh_token: String,
    },

    /// Forget the stored token pair
    Logout,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = SessionOptions {
        store: cli.store,
        server: cli.server,
        offline: cli.offline,
    };

    match cli.command {
        Commands::Status { format } => commands::status::run(&options, &format).await?,
        Commands::Queue { format, clear } => commands::queue::run(&options, &format, clear)?,
        Commands::Meals {
            page,
            limit,
            format,
        } => commands::meals::run(&options, page, limit, &format).await?,
        Commands::Add {
            title,
            category,
            calories,
            date,
            image,
        } => {
            let draft = commands::edit::draft(title, category, calories, date.as_deref(), image)?;
            commands::edit::add(&options, draft).await?;
        }
        Commands::Update {
            id,
            title,
            category,
            calories,
            date,
        } => {
            let patch = commands::edit::patch(title, category, calories, date.as_deref())?;
            commands::edit::update(&options, &id, patch).await?;
        }
        Commands::Delete { id } => commands::edit::delete(&options, &id).await?,
        Commands::Sync { format } => commands::sync::run(&options, &format).await?,
        Commands::Login {
            access_token,
            refresh_token,
        } => commands::auth::login(&options, &access_token, &refresh_token)?,
        Commands::Logout => commands::auth::logout(&options)?,
        Commands::Version => {
            println!("MealSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
