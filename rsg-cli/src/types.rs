use std::path::PathBuf;
use std::time::Duration;

#[derive(clap::Parser, Clone, Debug)]
#[clap(author, version, about = "Drive failure scenarios and inspect cluster health", long_about = None)]
pub struct RsgCli {
    #[command(subcommand)]
    pub command: RsgCommands,
    #[clap(flatten)]
    pub conn: ConnectionArgs,
    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,
}

#[derive(clap::Subcommand, Clone, Debug)]
pub enum RsgCommands {
    /// Show the latest cluster health snapshot
    #[clap(aliases = &["h"])]
    Health,
    /// List scenarios, or show one
    #[clap(aliases = &["ls", "sc"])]
    Scenarios {
        /// Scenario ID
        id: Option<String>,
    },
    /// Start a scenario
    #[clap(aliases = &["r"])]
    Run {
        /// Scenario ID
        id: String,
        /// Print the run log until the run finishes
        #[arg(short, long)]
        follow: bool,
    },
    /// Show the active run, or the last finished one
    #[clap(aliases = &["st"])]
    Status,
    /// Cancel the active run
    Cancel,
    /// Ask whether a write is safe under the current cluster health
    #[clap(aliases = &["v"])]
    Validate(ValidateArgs),
    /// Show recent history
    History {
        #[arg(value_enum)]
        kind: HistoryKind,
    },
}

#[derive(clap::Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Target collection
    #[arg(short, long)]
    pub collection: String,
    /// Durability level: majority, all, default or a node count
    #[arg(short = 'w', long, default_value = "majority")]
    pub durability: String,
    /// Document as inline JSON. Example: `-d '{"qty": 2}'`
    #[arg(short, long, required_unless_present = "file", conflicts_with = "file")]
    pub document: Option<String>,
    /// Read the document from a file
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryKind {
    Scenarios,
    Validations,
    Checks,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Scenarios => "scenarios",
            HistoryKind::Validations => "validations",
            HistoryKind::Checks => "checks",
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Gateway base URL
    #[arg(
        short,
        long,
        global = true,
        env = "RSG_GATEWAY_URL",
        default_value = "http://localhost:8080"
    )]
    pub url: String,
    /// Request timeout in seconds
    #[arg(long, global = true, default_value = "10")]
    pub timeout: u64,
    /// Poll interval in milliseconds when following a run
    #[arg(long, global = true, default_value = "1000")]
    pub poll_ms: u64,
}

impl ConnectionArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(100))
    }
}

/// Available output formats
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_run_with_follow() {
        let cli = RsgCli::try_parse_from(["rsg", "run", "primary-fail", "-f"]).unwrap();
        match cli.command {
            RsgCommands::Run { id, follow } => {
                assert_eq!(id, "primary-fail");
                assert!(follow);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.output, OutputFormat::Text);
    }

    #[test]
    fn validate_needs_exactly_one_document_source() {
        assert!(RsgCli::try_parse_from(["rsg", "validate", "-c", "orders"]).is_err());
        assert!(
            RsgCli::try_parse_from([
                "rsg", "validate", "-c", "orders", "-d", "{}", "-f", "doc.json"
            ])
            .is_err()
        );
        let cli = RsgCli::try_parse_from([
            "rsg", "validate", "-c", "orders", "-d", "{}", "-w", "2",
        ])
        .unwrap();
        let RsgCommands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.durability, "2");
        assert_eq!(args.document.as_deref(), Some("{}"));
    }

    #[test]
    fn history_kind_is_checked() {
        let cli = RsgCli::try_parse_from(["rsg", "history", "checks", "-o", "json"]).unwrap();
        assert!(matches!(
            cli.command,
            RsgCommands::History { kind: HistoryKind::Checks }
        ));
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(RsgCli::try_parse_from(["rsg", "history", "weather"]).is_err());
    }

    #[test]
    fn url_flag_overrides_default() {
        let cli =
            RsgCli::try_parse_from(["rsg", "status", "--url", "http://gw:9000/"]).unwrap();
        assert_eq!(cli.conn.url, "http://gw:9000/");
        assert_eq!(cli.conn.timeout(), Duration::from_secs(10));
    }
}
