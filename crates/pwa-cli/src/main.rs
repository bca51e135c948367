use std::error::Error;
use std::io::IsTerminal;

use clap::{Parser, Subcommand};
use commands::{
    best::{self, BestArgs},
    eval::{self, EvalArgs},
    norm_int::{self, NormIntCommand},
    test_derivs::{self, TestDerivsArgs},
    worker::{self, WorkerArgs},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "pwa", about = "Partial-wave fit evaluation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate the objective of a fit recipe at one parameter point.
    Eval(EvalArgs),
    /// Compare analytic and numeric objective derivatives.
    TestDerivs(TestDerivsArgs),
    /// Serve a master as one worker process.
    Worker(WorkerArgs),
    /// Generate and edit normalization-integral documents.
    #[command(subcommand)]
    NormInt(NormIntCommand),
    /// Print the best stored iteration of a bin range.
    Best(BestArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    Registry::default().with(filter).with(fmt_layer).init();
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Eval(args) => eval::run(&args),
        Command::TestDerivs(args) => test_derivs::run(&args),
        Command::Worker(args) => worker::run(&args),
        Command::NormInt(command) => norm_int::run(&command),
        Command::Best(args) => best::run(&args),
    }
}
