use std::error::Error;

use clap::Args;
use pwa_core::{ErrorInfo, PwaError};
use pwa_dist::{run_worker, Partition, StreamEndpoint};
use pwa_like::LikelihoodEvaluator;
use tracing::info;

use super::session::{RecipeArgs, Session};

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,
    /// Master address.
    #[arg(long)]
    pub connect: String,
    /// Rank of this worker (the master is rank 0).
    #[arg(long)]
    pub rank: usize,
    /// Total number of processes, master included.
    #[arg(long)]
    pub processes: usize,
}

pub fn run(args: &WorkerArgs) -> Result<(), Box<dyn Error>> {
    let session = Session::open(&args.recipe)?;
    let max_id = session.ctx.params.max_id();
    let owned = Partition::divide(session.datasets.len(), args.processes)?.owned(args.rank);
    let datasets: Vec<_> = session
        .datasets
        .into_iter()
        .skip(owned.start)
        .take(owned.len())
        .collect();
    let mut endpoint = StreamEndpoint::connect(args.connect.as_str())?;
    let calls = run_worker(args.rank, &mut endpoint, |master_max_id| {
        if master_max_id != max_id {
            return Err(PwaError::Protocol(
                ErrorInfo::new("param-mismatch", "master and worker built different parameters")
                    .with_context("master", master_max_id.to_string())
                    .with_context("worker", max_id.to_string()),
            ));
        }
        Ok(LikelihoodEvaluator::new(datasets))
    })?;
    info!(rank = args.rank, calls, "worker done");
    Ok(())
}
