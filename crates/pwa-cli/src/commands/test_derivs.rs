use std::error::Error;

use clap::Args;
use pwa_like::test_derivs;
use tracing::warn;

use super::session::{start_params, Master, MasterArgs, Session};

#[derive(Args, Debug)]
pub struct TestDerivsArgs {
    #[command(flatten)]
    pub master: MasterArgs,
    /// Relative discrepancy above which a parameter is flagged.
    #[arg(long, default_value_t = 1e-4)]
    pub tolerance: f64,
}

pub fn run(args: &TestDerivsArgs) -> Result<(), Box<dyn Error>> {
    let Session { ctx, datasets } = Session::open(&args.master.recipe)?;
    let params = start_params(&ctx, args.master.from_best, args.master.iteration)?;
    let mut master = Master::start(&args.master, &ctx, datasets)?;
    let checks = test_derivs(&mut master.evaluator, &ctx.params, &params)?;
    println!("{:<40} {:>16} {:>16} {:>10}", "parameter", "numeric", "analytic", "discrep");
    let mut flagged = 0;
    for check in &checks {
        let discrepancy = check.discrepancy();
        let mark = if discrepancy > args.tolerance {
            flagged += 1;
            " *"
        } else {
            ""
        };
        println!(
            "{:<40} {:>16.8e} {:>16.8e} {:>10.2e}{mark}",
            check.name, check.numeric, check.analytic, discrepancy
        );
    }
    if flagged > 0 {
        warn!(flagged, tolerance = args.tolerance, "derivative mismatches");
    }
    master.finish()
}
