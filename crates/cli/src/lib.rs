pub mod commands;
pub mod dataset;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "pricekit",
    about = "Pricekit quote engine CLI",
    long_about = "Calculate signed price quotes, verify quote signatures, inspect effective configuration, and run the deterministic demo scenario.",
    after_help = "Examples:\n  pricekit calculate --tenant demo-metals --customer cust-acme --sku STEEL-COIL-S235 --quantity 50\n  pricekit verify --input quote.json\n  pricekit config\n  pricekit demo"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the full pricing pipeline for one request and print the signed quote")]
    Calculate {
        #[arg(long, help = "Tenant the request prices against")]
        tenant: String,
        #[arg(long, help = "Customer identifier used to resolve condition keys")]
        customer: String,
        #[arg(long, help = "SKU to price")]
        sku: String,
        #[arg(long, help = "Quantity in the price list's unit of measure")]
        quantity: u32,
        #[arg(long, help = "Sales channel (direct|distributor|online|spot)")]
        channel: Option<String>,
        #[arg(
            long,
            help = "TOML dataset of price lists, condition sets, formulas, market data, taxes and customers; the built-in demo dataset is used when omitted"
        )]
        dataset: Option<PathBuf>,
        #[arg(
            long = "context",
            value_name = "NAME=VALUE",
            help = "Caller-supplied formula input, repeatable"
        )]
        context: Vec<String>,
    },
    #[command(about = "Recompute and check the signature of a previously issued quote")]
    Verify {
        #[arg(long, help = "Path to the quote JSON emitted by `calculate`")]
        input: PathBuf,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Run the reference pricing scenario against the built-in demo dataset")]
    Demo,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Calculate { tenant, customer, sku, quantity, channel, dataset, context } => {
            commands::calculate::run(commands::calculate::CalculateArgs {
                tenant,
                customer,
                sku,
                quantity,
                channel,
                dataset,
                context,
            })
        }
        Command::Verify { input } => commands::verify::run(&input),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Demo => commands::demo::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
