use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use pwa_norm::{
    add_errors, generate, parse_errors, parse_scale_factors, rescale, GenerateOptions,
    NormIntFile, ScaleChange,
};
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum NormIntCommand {
    /// Build a document from the amplitude files of one directory.
    Generate(GenerateArgs),
    /// Replace, add or remove scale factors of a document.
    Rescale(RescaleArgs),
    /// Set the relative errors of existing scale factors.
    AddErrors(AddErrorsArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory holding the amplitude files.
    #[arg(long)]
    pub dir: PathBuf,
    /// Comma-separated coherence tags.
    #[arg(long, value_delimiter = ',')]
    pub coherence: Vec<String>,
    /// Number of generated events the files represent.
    #[arg(long)]
    pub total_events: f64,
    /// Cuts file inside `dir`.
    #[arg(long)]
    pub cuts: Option<String>,
    /// Extra scale factors `name,value,rel_err:name,value,rel_err`.
    #[arg(long, default_value = "")]
    pub scale: String,
    /// Only files whose name contains this text.
    #[arg(long)]
    pub amp_match: Option<String>,
    /// Output path; defaults to the generated name inside `dir`.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RescaleArgs {
    /// Document to edit.
    #[arg(long)]
    pub file: PathBuf,
    /// Factors replacing existing ones, `name,value,rel_err:...`.
    #[arg(long, default_value = "")]
    pub replace: String,
    /// Factors appended to the chain, `name,value,rel_err:...`.
    #[arg(long, default_value = "")]
    pub add: String,
    /// Names of factors to remove.
    #[arg(long, value_delimiter = ',')]
    pub remove: Vec<String>,
    /// Output path; the input is overwritten when omitted.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AddErrorsArgs {
    /// Document to edit.
    #[arg(long)]
    pub file: PathBuf,
    /// Relative errors `name=rel_err,name=rel_err`.
    #[arg(long)]
    pub errors: String,
    /// Output path; the input is overwritten when omitted.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(command: &NormIntCommand) -> Result<(), Box<dyn Error>> {
    match command {
        NormIntCommand::Generate(args) => run_generate(args),
        NormIntCommand::Rescale(args) => run_rescale(args),
        NormIntCommand::AddErrors(args) => run_add_errors(args),
    }
}

fn run_generate(args: &GenerateArgs) -> Result<(), Box<dyn Error>> {
    let opts = GenerateOptions {
        coherence_tags: args.coherence.clone(),
        total_events: args.total_events,
        cuts_file: args.cuts.clone(),
        scale_factors: parse_scale_factors(&args.scale)?,
        amp_match: args.amp_match.clone(),
    };
    let file = generate(&args.dir, &opts)?;
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| args.dir.join(opts.file_name()));
    file.store(&out)?;
    println!("{}", out.display());
    Ok(())
}

fn run_rescale(args: &RescaleArgs) -> Result<(), Box<dyn Error>> {
    let mut file = NormIntFile::load(&args.file)?;
    let mut changes: Vec<ScaleChange> = parse_scale_factors(&args.replace)?
        .into_iter()
        .map(ScaleChange::Replace)
        .collect();
    changes.extend(parse_scale_factors(&args.add)?.into_iter().map(ScaleChange::Add));
    changes.extend(args.remove.iter().cloned().map(ScaleChange::Remove));
    let ratio = rescale(&mut file, &changes)?;
    let out = args.out.as_ref().unwrap_or(&args.file);
    file.store(out)?;
    info!(path = %out.display(), ratio, "document rescaled");
    println!("scale ratio = {ratio}");
    Ok(())
}

fn run_add_errors(args: &AddErrorsArgs) -> Result<(), Box<dyn Error>> {
    let mut file = NormIntFile::load(&args.file)?;
    add_errors(&mut file, &parse_errors(&args.errors)?)?;
    let out = args.out.as_ref().unwrap_or(&args.file);
    file.store(out)?;
    println!(
        "total = {} ± {}",
        file.chain.total_value(),
        file.chain.total().error
    );
    Ok(())
}
