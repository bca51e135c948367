use std::error::Error;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command};

use clap::Args;
use pwa_amp::NativeRegistry;
use pwa_core::{BinRanges, FitContext, PwaError, RngHandle};
use pwa_dist::{DistributedEvaluator, Endpoint, Partition, StreamEndpoint};
use pwa_fit::{FitSpec, IterationStore};
use pwa_like::{Dataset, LikelihoodEvaluator};
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct RecipeArgs {
    /// YAML fit recipe.
    #[arg(long)]
    pub recipe: PathBuf,
    /// Bin ranges such as `1800-1810,1900-1950`; every bin when omitted.
    #[arg(short = 'b', long = "bins", default_value = "all-bins")]
    pub bins: String,
}

#[derive(Args, Debug, Clone)]
pub struct MasterArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,
    /// Worker processes besides the master.
    #[arg(long, default_value_t = 0)]
    pub workers: usize,
    /// Evaluate at the best stored iteration instead of the start values.
    #[arg(long)]
    pub from_best: bool,
    /// Iteration whose random start values are used.
    #[arg(long, default_value_t = 0)]
    pub iteration: u64,
}

/// Recipe, context and unloaded datasets of one invocation.
pub struct Session {
    pub ctx: FitContext,
    pub datasets: Vec<Dataset>,
}

impl Session {
    pub fn open(args: &RecipeArgs) -> Result<Self, PwaError> {
        let spec = FitSpec::load(&args.recipe)?;
        let ranges: BinRanges = args.bins.parse()?;
        let mut ctx = FitContext::new(ranges, spec.run.out_dir.clone());
        spec.apply_run_options(&mut ctx);
        let datasets = spec.build_datasets(&mut ctx, &NativeRegistry::default())?;
        Ok(Self { ctx, datasets })
    }
}

/// Parameter vector from the best stored iteration or from the start values
/// of `iteration`.
pub fn start_params(
    ctx: &FitContext,
    from_best: bool,
    iteration: u64,
) -> Result<Vec<f64>, Box<dyn Error>> {
    if !from_best {
        return Ok(ctx
            .params
            .start_vector(&mut RngHandle::substream(ctx.seed, iteration)));
    }
    let store = IterationStore::new(ctx.iteration_store_path());
    let record = store
        .best(&ctx.bin_ranges.descriptor())?
        .ok_or_else(|| format!("no stored iteration in {}", store.path().display()))?;
    let mut params = vec![0.0; ctx.params.vector_len()];
    for (id, spec) in ctx.params.iter() {
        params[id.index()] = record
            .param(&spec.name)
            .ok_or_else(|| format!("stored iteration lacks parameter {}", spec.name))?;
    }
    Ok(params)
}

/// Master evaluator plus the worker processes it spawned.
pub struct Master {
    pub evaluator: DistributedEvaluator,
    children: Vec<Child>,
}

impl Master {
    /// Partitions `datasets`, spawns `args.workers` worker processes that
    /// connect back over TCP and runs the setup handshake.
    pub fn start(
        args: &MasterArgs,
        ctx: &FitContext,
        mut datasets: Vec<Dataset>,
    ) -> Result<Self, Box<dyn Error>> {
        let processes = args.workers + 1;
        let partition = Partition::divide(datasets.len(), processes)?;
        info!(datasets = datasets.len(), processes, ranges = ?partition.ranges(), "partition");
        datasets.truncate(partition.owned(0).end);

        let mut children = Vec::new();
        let mut endpoints: Vec<Box<dyn Endpoint>> = Vec::new();
        if args.workers > 0 {
            let listener = TcpListener::bind("127.0.0.1:0")?;
            let addr = listener.local_addr()?;
            let exe = std::env::current_exe()?;
            for rank in 1..processes {
                let child = Command::new(&exe)
                    .arg("worker")
                    .arg("--recipe")
                    .arg(&args.recipe.recipe)
                    .arg("--bins")
                    .arg(ctx.bin_ranges.descriptor())
                    .arg("--connect")
                    .arg(addr.to_string())
                    .arg("--rank")
                    .arg(rank.to_string())
                    .arg("--processes")
                    .arg(processes.to_string())
                    .spawn()?;
                children.push(child);
            }
            for _ in 1..processes {
                let (stream, peer) = listener.accept()?;
                stream.set_nodelay(true)?;
                info!(%peer, "worker connected");
                endpoints.push(Box::new(StreamEndpoint::new(stream)));
            }
        }

        let local = LikelihoodEvaluator::new(datasets);
        let mut evaluator = DistributedEvaluator::new(local, endpoints);
        for report in evaluator.setup(ctx.params.max_id())? {
            info!(%report, "setup");
        }
        Ok(Self {
            evaluator,
            children,
        })
    }

    /// Terminates the workers and waits for their exit.
    pub fn finish(mut self) -> Result<(), Box<dyn Error>> {
        self.evaluator.terminate()?;
        for child in &mut self.children {
            let status = child.wait()?;
            if !status.success() {
                return Err(format!("worker exited with {status}").into());
            }
        }
        Ok(())
    }
}
