//! spc-server - SPC Studio persistence and connection-test service
//!
//! Without a subcommand the HTTP API is served. `grant` changes a user's role,
//! `set-active` toggles a data source and `audit` prints recent audit entries.

use clap::{Parser, Subcommand};
use spc_model::Role;
use spc_server::{AppState, Config, Database};
use tracing::info;

#[derive(Parser)]
#[command(name = "spc-server", version, about = "SPC Studio API server")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Set the role of a registered user
    Grant {
        email: String,
        /// READ_ONLY, READ_CREATE, READ_CREATE_UPDATE or FULL_ACCESS
        role: Role,
    },
    /// Allow or refuse new charts on a data source
    SetActive {
        id: i64,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },
    /// Print the most recent audit log entries
    Audit {
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::from_env()?;
    let _guard = spc_server::logging::init(&config);

    let db = Database::new(&config.database_url).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db, config).await?,
        Command::Grant { email, role } => {
            db.set_user_role(&email.trim().to_lowercase(), role).await?;
            info!(email = email.as_str(), role = %role, "Role updated");
            println!("{} is now {}", email, role.label());
        }
        Command::SetActive { id, active } => {
            db.set_data_source_active(id, active).await?;
            info!(source_id = id, active, "Data source activation changed");
            println!("Data source #{} is now {}", id, if active { "active" } else { "inactive" });
        }
        Command::Audit { limit } => {
            for entry in db.list_audit(limit).await? {
                let user = entry
                    .user_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  user={}  {} {}#{}  {}",
                    entry.timestamp,
                    user,
                    entry.action,
                    entry.target_model,
                    entry.target_id,
                    entry.details
                );
            }
        }
    }

    Ok(())
}

async fn serve(db: Database, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        database = config.database_url.as_str(),
        bind_address = config.bind_address.as_str(),
        connect_timeout_secs = config.connect_timeout.as_secs(),
        default_role = %config.default_role,
        "Starting SPC server"
    );

    let bind_address = config.bind_address.clone();
    let app = spc_server::app(AppState::new(db, config));

    info!("Listening on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
