use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

#[derive(Debug, Parser)]
#[command(name = "bodyshop")]
#[command(about = "Session keeping and invoice checks for the body-shop back office")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign in with email and password and save the session
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign out and remove the saved session
    Logout,
    /// Probe connectivity and verify the saved session
    Status,
    /// Keep the saved session fresh until interrupted
    Watch,
    /// Recalculate an invoice, optionally editing and saving it
    Recalc(RecalcArgs),
    /// Compare an invoice with the expertise report it was built from
    Diff {
        invoice_id: String,
    },
    /// Print config path and create default file if missing
    ConfigPath,
}

#[derive(Debug, Args)]
pub struct RecalcArgs {
    pub invoice_id: String,

    /// New tax rate as a fraction, e.g. 0.2
    #[arg(long)]
    pub tax_rate: Option<Decimal>,

    /// Replace lines and tax rate with the figures of the source report
    #[arg(long)]
    pub apply_report: bool,

    /// Accept computed totals that differ from the saved ones
    #[arg(long)]
    pub acknowledge: bool,

    /// Write the invoice back (requires a saved session)
    #[arg(long)]
    pub save: bool,
}
