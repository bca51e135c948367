use std::error::Error;

use clap::Args;
use pwa_core::FcnFlag;
use pwa_like::FcnEvaluator;

use super::session::{start_params, Master, MasterArgs, Session};

#[derive(Args, Debug)]
pub struct EvalArgs {
    #[command(flatten)]
    pub master: MasterArgs,
    /// Also print the gradient.
    #[arg(long)]
    pub gradient: bool,
}

pub fn run(args: &EvalArgs) -> Result<(), Box<dyn Error>> {
    let Session { ctx, datasets } = Session::open(&args.master.recipe)?;
    let params = start_params(&ctx, args.master.from_best, args.master.iteration)?;
    let mut master = Master::start(&args.master, &ctx, datasets)?;
    let flag = if args.gradient {
        FcnFlag::Gradient
    } else {
        FcnFlag::Value
    };
    let mut derivs = vec![0.0; params.len()];
    let value = master.evaluator.evaluate(flag, &params, Some(&mut derivs))?;
    println!("fcn = {value}");
    if args.gradient {
        for (id, spec) in ctx.params.iter() {
            println!("{:<40} {:>16.8e}", spec.name, derivs[id.index()]);
        }
    }
    master.finish()
}
