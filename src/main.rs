//! Entry point for the bias correction program.
//! Parses the command line, computes the forecast bias against observations,
//! removes it and writes the corrected forecast to a Zarr store.

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use unseen::align::ComputeOptions;
use unseen::bias::{apply_bias, compute_bias};
use unseen::cli::Args;
use unseen::fileio::{get_new_log, open_file, to_zarr, HISTORY_ATTR};
use unseen::logging;
use unseen::parallel::ParallelConfig;
use unseen::Dataset;

async fn run(args: Args) -> anyhow::Result<()> {
    let variables = vec![args.var.clone()];
    let time_period = args.time_period()?;
    let options = ComputeOptions::default();

    let ds_obs = open_file(&args.obs_file, &variables)
        .await
        .with_context(|| format!("failed to open observations {}", args.obs_file.display()))?;
    let da_obs = ds_obs.get(&args.var)?;

    let ds_fcst = open_file(&args.fcst_file, &variables)
        .await
        .with_context(|| format!("failed to open forecast {}", args.fcst_file.display()))?;
    let da_fcst = ds_fcst.get(&args.var)?;

    let bias = compute_bias(da_fcst, da_obs, &args.method, time_period.as_ref(), options)
        .context("failed to calculate bias")?;
    let da_fcst_bc =
        apply_bias(da_fcst, &bias, &args.method, options).context("failed to remove bias")?;

    let history = |path: &std::path::Path, ds: &Dataset| {
        let history = ds.attr_str(HISTORY_ATTR).unwrap_or_default();
        if history.is_empty() {
            warn!(file = %path.display(), "input file has no history attribute");
        }
        (path.display().to_string(), history.to_string())
    };
    let infile_logs = [
        history(args.fcst_file.as_path(), &ds_fcst),
        history(args.obs_file.as_path(), &ds_obs),
    ];

    let mut ds_fcst_bc = Dataset::from(da_fcst_bc);
    ds_fcst_bc
        .attrs
        .insert(HISTORY_ATTR.to_string(), get_new_log(&infile_logs).into());

    to_zarr(&ds_fcst_bc, &args.outfile, &args.chunk_spec())
        .await
        .with_context(|| format!("failed to write {}", args.outfile.display()))?;
    info!(outfile = %args.outfile.display(), "bias corrected forecast written");
    Ok(())
}

fn main() {
    let args = Args::parse();
    logging::init(args.verbose);

    let result = ParallelConfig::new(args.threads)
        .setup_global_pool()
        .map_err(anyhow::Error::from)
        .and_then(|()| {
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")
        })
        .and_then(|runtime| runtime.block_on(run(args)));

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
