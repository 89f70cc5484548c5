use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use spc_client::{
    ChartConfigBuilder, ClientError, DataSourceRegistry, DataSourceView, Deletion, HttpBackend,
    Session,
};
use spc_model::{AggregationType, DataSource, DataSourceDraft, Engine, ENGINES};

use crate::{output, token};

#[derive(Debug)]
pub enum Error {
    Client(ClientError),
    Io(std::io::Error),
    NotSignedIn,
    InvalidArgument(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Client(ClientError::Validation(errors)) => {
                write!(f, "request rejected\n{}", output::validation_errors(errors))
            }
            Error::Client(err) => write!(f, "{}", err),
            Error::Io(err) => write!(f, "{}", err),
            Error::NotSignedIn => write!(f, "not signed in, run `spc login` first"),
            Error::InvalidArgument(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<ClientError> for Error {
    fn from(err: ClientError) -> Self {
        Error::Client(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// SPC Studio command line
///
/// Registers data sources and chart configurations on an SPC server.
#[derive(Debug, Parser)]
#[command(name = "spc", version = "0.1.0")]
#[command(about = "Manage SPC data sources and chart configurations")]
pub struct Cli {
    /// API root of the SPC server
    #[arg(long, global = true, env = "SPC_SERVER", default_value = "http://localhost:8000/api")]
    server: String,

    /// Where the login token is kept between invocations
    #[arg(long, global = true, env = "SPC_TOKEN_FILE", default_value = ".spc_token")]
    token_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub async fn handle() -> Result<(), Error> {
        let cli = Self::parse();
        let backend = HttpBackend::new(&cli.server)?;

        match cli.command {
            Commands::Register(args) => {
                let registered = Session::register(&backend, &args.email, &args.password).await?;
                println!("Registered {} (id {})", registered.email, registered.id);
            }

            Commands::Login(args) => {
                let session = Session::login(&backend, &args.email, &args.password).await?;
                if let Some(token) = session.token() {
                    token::save(&cli.token_file, token)?;
                }
                if let Some(user) = session.user() {
                    println!("Signed in as {} ({})", user.email, user.role.label());
                }
            }

            Commands::Logout => {
                if let Some(saved) = token::load(&cli.token_file)? {
                    Session::with_token(saved).logout(&backend).await?;
                }
                token::clear(&cli.token_file)?;
                println!("Signed out");
            }

            Commands::Whoami => {
                let session = signed_in(&backend, &cli.token_file).await?;
                if let Some(user) = session.user() {
                    let confirmed = if user.is_confirmed { "" } else { ", unconfirmed" };
                    println!("{} ({}{})", user.email, user.role.label(), confirmed);
                }
            }

            Commands::Engines => {
                for spec in ENGINES {
                    println!("{:<9} {:<22} default port {}", spec.engine, spec.label, spec.default_port);
                }
            }

            Commands::Source(source) => {
                let session = signed_in(&backend, &cli.token_file).await?;
                source.command.execute(&backend, &session).await?;
            }

            Commands::Chart(chart) => {
                let session = signed_in(&backend, &cli.token_file).await?;
                chart.command.execute(&backend, &session).await?;
            }
        };

        Ok(())
    }
}

/// The saved session, with its user loaded.
async fn signed_in(backend: &HttpBackend, token_file: &Path) -> Result<Session, Error> {
    let saved = token::load(token_file)?.ok_or(Error::NotSignedIn)?;
    let mut session = Session::with_token(saved);
    match session.refresh(backend).await {
        Ok(_) => Ok(session),
        Err(ClientError::Unauthorized(_)) => Err(Error::NotSignedIn),
        Err(e) => Err(e.into()),
    }
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create an account
    Register(CredentialArgs),

    /// Sign in and remember the token
    Login(CredentialArgs),

    /// Revoke the remembered token
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List supported database engines
    Engines,

    /// Manage data sources
    Source(SourceArgs),

    /// Manage chart configurations
    Chart(ChartArgs),
}

#[derive(Debug, Args)]
struct CredentialArgs {
    #[arg(short, long)]
    email: String,

    #[arg(short, long, env = "SPC_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Debug, Args)]
struct SourceArgs {
    #[command(subcommand)]
    command: SourceCommands,
}

#[derive(Debug, Subcommand)]
enum SourceCommands {
    /// List data sources
    List,

    /// Register a data source
    Create(CreateSourceArgs),

    /// Delete a data source and every chart that uses it
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Try to connect with the stored credentials
    Test { id: i64 },
}

#[derive(Debug, Args)]
struct CreateSourceArgs {
    #[arg(short, long)]
    name: String,

    /// MSSQL or POSTGRES
    #[arg(short, long, default_value_t = Engine::Mssql)]
    engine: Engine,

    #[arg(long)]
    host: String,

    /// Defaults to the engine's standard port
    #[arg(long)]
    port: Option<i64>,

    #[arg(short, long)]
    database: String,

    #[arg(short, long)]
    username: String,

    #[arg(short, long, env = "SPC_SOURCE_PASSWORD", hide_env_values = true)]
    password: String,
}

impl SourceCommands {
    async fn execute(self, backend: &HttpBackend, session: &Session) -> Result<(), Error> {
        let registry = DataSourceRegistry::new(backend);

        match self {
            SourceCommands::List => {
                print!("{}", output::sources_table(&registry.list(session).await?));
            }

            SourceCommands::Create(args) => {
                let draft = DataSourceDraft {
                    port: args.port,
                    ..DataSourceDraft::new(
                        args.name,
                        args.engine,
                        args.host,
                        args.database,
                        args.username,
                        args.password,
                    )
                };
                let source = registry.create(session, &draft).await?;
                println!(
                    "Created data source #{} {} ({} on {}:{})",
                    source.id,
                    source.name,
                    source.engine.label(),
                    source.host,
                    source.port
                );
            }

            SourceCommands::Delete { id, yes } => {
                let mut view = DataSourceView::load(registry, session).await?;
                let ask = |source: &DataSource| {
                    yes || confirm(&format!(
                        "Delete data source '{}' and all of its charts?",
                        source.name
                    ))
                };
                match view.delete(session, id, ask).await? {
                    Deletion::Deleted => println!("Deleted data source #{}", id),
                    Deletion::Cancelled => println!("Cancelled"),
                }
            }

            SourceCommands::Test { id } => {
                let source = registry.get(session, id).await?;
                let result = registry.test_connection(session, id).await?;
                println!("{}", output::connection_result(&source.name, &result));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Args)]
struct ChartArgs {
    #[command(subcommand)]
    command: ChartCommands,
}

#[derive(Debug, Subcommand)]
enum ChartCommands {
    /// List your chart configurations
    List,

    /// Show one chart configuration
    Show { id: i64 },

    /// Create a chart configuration
    Create(CreateChartArgs),
}

#[derive(Debug, Args)]
struct CreateChartArgs {
    #[arg(short, long, default_value = "")]
    title: String,

    /// Data source id; defaults to the first registered source
    #[arg(short, long)]
    source: Option<i64>,

    #[arg(long)]
    table: String,

    #[arg(long)]
    value_column: String,

    #[arg(long)]
    datetime_column: String,

    #[arg(long, default_value = spc_model::DEFAULT_PRODUCT_COLUMN)]
    product_column: String,

    /// Only rows whose product column equals this
    #[arg(long, default_value = "")]
    product: String,

    #[arg(long, default_value = spc_model::DEFAULT_OPERATION_COLUMN)]
    operation_column: String,

    /// Only rows whose operation column equals this
    #[arg(long, default_value = "")]
    operation: String,

    /// Upper spec limit
    #[arg(long, default_value = "")]
    usl: String,

    /// Lower spec limit
    #[arg(long, default_value = "")]
    lsl: String,

    #[arg(long, default_value = "")]
    target: String,

    /// TIME_HOUR, TIME_DAY or COUNT
    #[arg(long, default_value_t = AggregationType::TimeHour)]
    aggregation_type: AggregationType,

    #[arg(long, default_value_t = spc_model::DEFAULT_AGGREGATION_SIZE, allow_negative_numbers = true)]
    aggregation_size: i64,

    /// Western Electric rule settings as a JSON object
    #[arg(long)]
    weco_rules: Option<String>,
}

impl CreateChartArgs {
    fn into_builder(self) -> Result<ChartConfigBuilder, Error> {
        let weco_rules = match self.weco_rules {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::InvalidArgument(format!("--weco-rules: {}", e)))?,
            None => serde_json::Value::Object(Default::default()),
        };
        Ok(ChartConfigBuilder {
            title: self.title,
            data_source: self.source,
            table_name: self.table,
            value_column: self.value_column,
            datetime_column: self.datetime_column,
            product_column: self.product_column,
            product_identifier: self.product,
            operation_column: self.operation_column,
            operation_identifier: self.operation,
            upper_spec_limit: self.usl,
            lower_spec_limit: self.lsl,
            target: self.target,
            aggregation_type: self.aggregation_type,
            aggregation_size: self.aggregation_size,
            weco_rules,
        })
    }
}

impl ChartCommands {
    async fn execute(self, backend: &HttpBackend, session: &Session) -> Result<(), Error> {
        match self {
            ChartCommands::List => {
                let charts = spc_client::list_charts(backend, session).await?;
                print!("{}", output::charts_table(&charts));
            }

            ChartCommands::Show { id } => {
                let chart = spc_client::get_chart(backend, session, id).await?;
                println!("{}", output::chart_details(&chart));
            }

            ChartCommands::Create(args) => {
                let mut builder = args.into_builder()?;
                if builder.data_source.is_none() {
                    builder
                        .load_sources(&DataSourceRegistry::new(backend), session)
                        .await?;
                }
                let chart = builder.submit(backend, session).await?;
                println!(
                    "Created chart #{} {} on {}",
                    chart.id,
                    chart.display_name(),
                    chart.data_source_name
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_source_create() {
        let cli = Cli::try_parse_from([
            "spc", "source", "create", "--name", "Line1", "--engine", "postgres", "--host",
            "10.0.0.5", "--database", "PROD", "--username", "svc", "--password", "x",
        ])
        .unwrap();
        match cli.command {
            Commands::Source(SourceArgs {
                command: SourceCommands::Create(args),
            }) => {
                assert_eq!(args.engine, Engine::Postgres);
                assert_eq!(args.port, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn chart_defaults_match_builder() {
        let cli = Cli::try_parse_from([
            "spc",
            "chart",
            "create",
            "--table",
            "production_data",
            "--value-column",
            "measurement_val",
            "--datetime-column",
            "created_at",
        ])
        .unwrap();
        let Commands::Chart(ChartArgs {
            command: ChartCommands::Create(args),
        }) = cli.command
        else {
            panic!("expected chart create");
        };
        let builder = args.into_builder().unwrap();
        assert_eq!(
            builder,
            ChartConfigBuilder {
                table_name: "production_data".into(),
                value_column: "measurement_val".into(),
                datetime_column: "created_at".into(),
                ..ChartConfigBuilder::new()
            }
        );
    }

    #[test]
    fn bad_weco_json_is_rejected() {
        let cli = Cli::try_parse_from([
            "spc",
            "chart",
            "create",
            "--table",
            "t",
            "--value-column",
            "v",
            "--datetime-column",
            "d",
            "--weco-rules",
            "{oops",
        ])
        .unwrap();
        let Commands::Chart(ChartArgs {
            command: ChartCommands::Create(args),
        }) = cli.command
        else {
            panic!("expected chart create");
        };
        assert!(matches!(args.into_builder(), Err(Error::InvalidArgument(_))));
    }
}
