mod client;
mod commands;
mod output;
mod types;

pub use client::{ClientError, GatewayCode, HttpClient};
pub use types::*;

use tracing::debug;

pub async fn run(cli: RsgCli) -> anyhow::Result<()> {
    debug!("use option {cli:?}");
    let conn = &cli.conn;
    let client = HttpClient::new(&conn.url, conn.timeout())?;
    let format = cli.output;
    match &cli.command {
        RsgCommands::Health => commands::handle_health_command(&client, format).await,
        RsgCommands::Scenarios { id } => {
            commands::handle_scenarios_command(&client, id.as_deref(), format).await
        }
        RsgCommands::Run { id, follow } => {
            commands::handle_run_command(&client, id, *follow, conn.poll_interval(), format)
                .await
        }
        RsgCommands::Status => commands::handle_status_command(&client, format).await,
        RsgCommands::Cancel => commands::handle_cancel_command(&client, format).await,
        RsgCommands::Validate(args) => {
            commands::handle_validate_command(&client, args, format).await
        }
        RsgCommands::History { kind } => {
            commands::handle_history_command(&client, *kind, format).await
        }
    }
}
