use crate::demo::{run_demo, run_load_report, DemoArgs, LoadReportArgs};
use crate::server;
use assignment_engine::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Faculty Assignment Engine",
    about = "Route graded submissions to faculty reviewers and inspect the assignment ledger",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print reports straight from an assignment database
    Report {
        #[command(subcommand)]
        command: ReportCommand,
    },
    /// Seed an in-memory ledger and walk through auto, bulk, and redistribute flows
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum ReportCommand {
    /// Per-reviewer workload snapshot
    Loads(LoadReportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the SQLite database path (`:memory:` for a throwaway ledger)
    #[arg(long)]
    pub(crate) database: Option<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Report {
            command: ReportCommand::Loads(args),
        } => run_load_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
