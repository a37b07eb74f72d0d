use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use configuration::{SettingsOverrides, init_tracing, load_db_settings};
use database::{ActiveRecord, DataSource};
use models::User;
use uuid::Uuid;

/// The main entry point for the hybrid-record command line.
#[tokio::main]
async fn main() {
    let _guard = init_tracing("info");
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Active-record CRUD over PostgreSQL or an embedded document store.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: SettingsOverrides,

    /// Use a throwaway document store instead of the configured backend.
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data source and report the outcome.
    Init,
    /// Apply pending schema migrations.
    Migrate,
    /// Manage users.
    #[command(subcommand)]
    User(UserCommand),
    /// Run a raw SELECT against the users table (document backend: full scan).
    Query {
        /// The statement to execute verbatim.
        sql: String,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Show a single user.
    Get { id: Uuid },
    /// List every user.
    List,
    /// Change a user's name or email.
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Delete a user.
    Delete { id: Uuid },
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db = open_data_source(&cli).await?;

    match cli.command {
        Commands::Init => {
            println!("Data Source has been initialized! (backend: {})", db.backend());
        }
        Commands::Migrate => {
            db.synchronize().await.context("Failed to run database migrations")?;
            println!("Schema is up to date.");
        }
        Commands::User(command) => handle_user(command, &db).await?,
        Commands::Query { sql } => {
            let rows = User::query(&db, &sql).await?;
            for row in rows {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
    }

    db.close().await?;
    Ok(())
}

async fn open_data_source(cli: &Cli) -> anyhow::Result<DataSource> {
    if cli.ephemeral {
        tracing::info!("Using a temporary document store.");
        return Ok(DataSource::open_temporary()?);
    }

    let mut settings = load_db_settings().context("Failed to load database settings")?;
    settings.apply(&cli.overrides);
    tracing::debug!(?settings, "Loaded database settings.");

    let db = DataSource::initialize(&settings)
        .await
        .context("Error during Data Source initialization")?;
    Ok(db)
}

/// Handles the user subcommands.
async fn handle_user(command: UserCommand, db: &DataSource) -> anyhow::Result<()> {
    match command {
        UserCommand::Create { name, email } => {
            let mut user = User::new(name, email);
            user.save(db).await?;
            print_users(&[user]);
        }
        UserCommand::Get { id } => match User::get(db, id).await? {
            Some(user) => print_users(&[user]),
            None => bail!("No user with id {}", id),
        },
        UserCommand::List => {
            let users = User::get_all(db).await?;
            if users.is_empty() {
                println!("No users.");
            } else {
                print_users(&users);
            }
        }
        UserCommand::Update { id, name, email } => {
            let Some(mut user) = User::get(db, id).await? else {
                bail!("No user with id {}", id);
            };
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(email) = email {
                user.email = email;
            }
            user.save(db).await?;
            print_users(&[user]);
        }
        UserCommand::Delete { id } => {
            if User::delete_by_id(db, id).await? {
                println!("Deleted user {}.", id);
            } else {
                println!("No user with id {}.", id);
            }
        }
    }
    Ok(())
}

fn print_users(users: &[User]) {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Email", "Created", "Updated"]);
    for user in users {
        table.add_row(vec![
            user.meta.id.map(|id| id.to_string()).unwrap_or_default(),
            user.name.clone(),
            user.email.clone(),
            format_timestamp(user.meta.created_at),
            format_timestamp(user.meta.updated_at),
        ]);
    }
    println!("{table}");
}

fn format_timestamp(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
