mod cli;

use clap::Parser;
use cli::{commands, output, ux};
use firebolt_driver::ConnectionSession;


async fn run_command(args: cli::Cli) -> anyhow::Result<serde_json::Value> {
    let mut session = ConnectionSession::new(args.settings())?;
    session.open().await?;

    let result = match &args.command {
        cli::Commands::Query { sql, stream } => commands::query(&mut session, sql, *stream).await,
        cli::Commands::Version { } => commands::version(&mut session).await,
        cli::Commands::Submit { sql } => commands::submit(&mut session, sql).await,
        cli::Commands::Status { token } => commands::status(&mut session, token).await,
        cli::Commands::Cancel { token } => commands::cancel(&mut session, token).await,
    };

    session.close();
    result
}


/// Entry point for the fbsql CLI tool.
///
/// Opens a session with the credentials given as flags or `FIREBOLT_*`
/// environment variables and runs one subcommand:
/// - `query`: Run a statement and print its rows.
/// - `version`: Print the server version.
/// - `submit`: Start an asynchronous query and print its token.
/// - `status`: Show the status of an asynchronous query.
/// - `cancel`: Cancel an asynchronous query.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: cli::Cli = cli::Cli::parse();

    ux::setup_logging(args.verbose, args.quiet, args.json);

    let json = args.json;
    let command_name = args.command.to_string();
    let result = output::CommandOutput::from_result(command_name, run_command(args).await);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        ux::render_human_output(&result);
    }

    if let output::CommandStatus::Error = result.status {
        std::process::exit(1);
    }
    Ok(())
}
