pub mod commands;
pub mod output;
pub mod ux;

use firebolt_driver::SessionSettings;
use firebolt_driver::session::DEFAULT_ENVIRONMENT;
pub use clap::{Parser, Subcommand};


#[derive(Parser)]
#[command(name = "fbsql", version, about = "Run SQL against a Firebolt engine from the command line.")]
pub struct Cli {
    #[arg(
        long = "client-id",
        help = "Service account client id, or the e-mail of a user login.",
        env = "FIREBOLT_CLIENT_ID",
    )]
    pub client_id: String,

    #[arg(
        long = "client-secret",
        help = "Service account client secret, or the password of a user login.",
        env = "FIREBOLT_CLIENT_SECRET",
        hide_env_values = true
    )]
    pub client_secret: String,

    #[arg(
        long,
        help = "Account name. Required for service accounts.",
        env = "FIREBOLT_ACCOUNT",
    )]
    pub account: Option<String>,

    #[arg(
        long,
        help = "Engine to run queries on. Defaults to the system engine.",
        env = "FIREBOLT_ENGINE",
    )]
    pub engine: Option<String>,

    #[arg(
        long,
        help = "Database to run queries against.",
        env = "FIREBOLT_DATABASE",
    )]
    pub database: Option<String>,

    #[arg(
        long = "env",
        help = "Firebolt environment, used to build the API and identity hosts.",
        default_value = DEFAULT_ENVIRONMENT,
        env = "FIREBOLT_ENV",
    )]
    pub environment: String,

    #[arg(
        long,
        help = "Override the API endpoint, e.g. http://localhost:8123",
        env = "FIREBOLT_ENDPOINT",
    )]
    pub endpoint: Option<String>,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Set level of verbosity. [default: INFO]\n\t-v: DEBUG\n\t-vv: TRACE\n--quiet takes precedence over --verbose."
    )]
    pub verbose: u8,

    #[arg(
        short,
        long,
        action = clap::ArgAction::SetTrue,
        help = "Disable all information logs (only ERROR level logs are shown).\n--quiet takes precedence over --verbose."
    )]
    pub quiet: bool,

    #[arg(
        long,
        action = clap::ArgAction::SetTrue,
        help = "Enable JSON output format. Human readable output is disabled when this flag is set."
    )]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn settings(&self) -> SessionSettings {
        let mut settings = SessionSettings::new(&self.client_id, &self.client_secret)
            .with_environment(&self.environment);
        settings.account = self.account.clone();
        settings.engine = self.engine.clone();
        settings.database = self.database.clone();
        settings.endpoint = self.endpoint.clone();
        settings
    }
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run a statement and print its rows.")]
    Query {
        sql: String,

        #[arg(
            long,
            help = "Ask the server for a line-framed result and print rows as they arrive.",
        )]
        stream: bool,
    },

    #[command(about = "Print the server version.")]
    Version {},

    #[command(about = "Submit a statement for asynchronous execution and print its token.")]
    Submit {
        sql: String,
    },

    #[command(about = "Show the status of an asynchronous query.")]
    Status {
        token: String,
    },

    #[command(about = "Cancel an asynchronous query.")]
    Cancel {
        token: String,
    },
}

impl std::fmt::Display for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Commands::Query { .. } => "query",
            Commands::Version { .. } => "version",
            Commands::Submit { .. } => "submit",
            Commands::Status { .. } => "status",
            Commands::Cancel { .. } => "cancel",
        };
        write!(f, "{name}")
    }
}
