//! Bookmark Live CLI
//!
//! Command-line client for a running bookmark server:
//! - Sign in and inspect the session
//! - List, add and delete bookmarks
//! - Watch the list update live

use bookmark_live::client::{shared, Backend, HttpBackend};
use bookmark_live::config::generate_default_config;
use bookmark_live::store::{Bookmark, Column, Filter, NewBookmark, Order, SelectQuery};
use bookmark_live::views::{
    DashboardController, DashboardState, LandingState, RecordingNavigator, SessionGuard,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bookmark-live")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Personal bookmarks that stay in sync everywhere")]
#[command(long_about = "Client for a Bookmark Live server.\nThe server is read from BOOKMARK_BACKEND_URL and BOOKMARK_BACKEND_KEY,\nthe session from --token or BOOKMARK_ACCESS_TOKEN.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Session access token (overrides BOOKMARK_ACCESS_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the provider sign-in URL
    Login {
        /// OAuth provider
        #[arg(short, long, default_value = "google")]
        provider: String,
    },

    /// Revoke the current session
    Logout,

    /// Show the current session
    Session,

    /// List bookmarks, newest first
    List {
        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Add a bookmark
    Add {
        /// Title
        title: String,
        /// URL
        url: String,
    },

    /// Delete a bookmark by id
    Delete {
        /// Bookmark id
        id: String,
    },

    /// Print the list and every change until interrupted
    Watch,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookmark_live=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let backend = shared()?;
    if let Some(token) = cli.token.clone() {
        backend.set_access_token(Some(token));
    }

    match cli.command {
        Commands::Login { provider } => {
            let navigator = RecordingNavigator::new();
            let mut guard = SessionGuard::new(backend, &navigator, backend.base_url());
            if guard.check().await? == LandingState::Redirected {
                println!("Already signed in.");
                return Ok(());
            }
            let url = guard.sign_in(&provider).await?;
            println!("Open this URL in a browser to sign in:");
            println!();
            println!("  {}", url);
            println!();
            println!("Then pass the access_token from the final address with --token");
            println!("or export it as BOOKMARK_ACCESS_TOKEN.");
        }

        Commands::Logout => {
            backend.sign_out().await?;
            println!("Signed out.");
        }

        Commands::Session => match backend.get_session().await? {
            Some(session) => {
                if cli.format == "json" {
                    println!("{}", serde_json::to_string_pretty(&session)?);
                } else {
                    println!("User:    {}", session.user.id);
                    if let Some(email) = &session.user.email {
                        println!("Email:   {}", email);
                    }
                    println!("Expires: {}", session.expires_at.format("%Y-%m-%d %H:%M:%SZ"));
                }
            }
            None => {
                eprintln!("Not signed in.");
                std::process::exit(1);
            }
        },

        Commands::List { limit } => {
            let user = require_user(backend).await?;
            let mut query = SelectQuery::owned_by(&user).order(Order::desc(Column::CreatedAt));
            query.limit = limit;
            let rows = backend.select_bookmarks(query).await?;
            print_bookmarks(&rows, &cli.format)?;
        }

        Commands::Add { title, url } => {
            let user = require_user(backend).await?;
            let row = backend
                .insert_bookmark(NewBookmark::new(title.trim(), url.trim(), user))
                .await?;
            println!("Added {} ({})", row.title, row.id);
        }

        Commands::Delete { id } => {
            require_user(backend).await?;
            let removed = backend
                .delete_bookmarks(vec![Filter::eq(Column::Id, id.as_str())])
                .await?;
            if removed.is_empty() {
                eprintln!("No bookmark with id {}", id);
                std::process::exit(1);
            }
            println!("Deleted {}", id);
        }

        Commands::Watch => watch(backend, &cli.format).await?,

        Commands::Config { .. } => {}
    }

    Ok(())
}

/// Id of the signed-in user, exiting when there is none
async fn require_user(backend: &HttpBackend) -> Result<String, Box<dyn std::error::Error>> {
    match backend.get_user().await? {
        Some(user) => Ok(user.id),
        None => {
            eprintln!("Not signed in. Run `login` first.");
            std::process::exit(1);
        }
    }
}

async fn watch(backend: &'static HttpBackend, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut dashboard = DashboardController::new(backend, RecordingNavigator::new());
    if dashboard.mount().await? == DashboardState::Redirected {
        eprintln!("Not signed in. Run `login` first.");
        std::process::exit(1);
    }

    print_bookmarks(dashboard.bookmarks(), format)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = dashboard.pump() => match changed {
                Some(true) => {
                    println!();
                    print_bookmarks(dashboard.bookmarks(), format)?;
                }
                Some(false) => {
                    if let Some(notice) = dashboard.take_notice() {
                        eprintln!("{}", notice);
                    }
                }
                None => {
                    eprintln!("Live feed closed.");
                    break;
                }
            }
        }
    }

    dashboard.unmount();
    Ok(())
}

fn print_bookmarks(rows: &[Bookmark], format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No bookmarks yet.");
        return Ok(());
    }

    let title_width = rows
        .iter()
        .map(|r| r.title.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(5, 40);

    println!("{:<36}  {:<width$}  URL", "ID", "TITLE", width = title_width);
    for row in rows {
        let title: String = row.title.chars().take(title_width).collect();
        println!("{:<36}  {:<width$}  {}", row.id, title, row.url, width = title_width);
    }
    Ok(())
}
