//! Defines command-line interface options using `clap` for the bias correction program.

use crate::data_source::ChunkSpec;
use crate::errors::Result;
use crate::statistics::TimePeriod;
use chrono::NaiveDate;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Calculate the bias of a forecast against observations and remove it
#[derive(Parser, Debug)]
#[command(
    name = "bias_correction",
    version,
    about = "Calculate and remove forecast bias relative to observations"
)]
pub struct Args {
    /// Forecast file (NetCDF or Zarr store)
    pub fcst_file: PathBuf,

    /// Observations file (NetCDF or Zarr store)
    pub obs_file: PathBuf,

    /// Variable name
    pub var: String,

    /// Bias correction method
    #[arg(value_parser = ["multiplicative", "additive"])]
    pub method: String,

    /// Output Zarr store
    pub outfile: PathBuf,

    /// Start and end date for baseline (YYYY-MM-DD format)
    #[arg(
        long = "base_period",
        num_args = 2,
        value_names = ["START", "END"],
        value_parser = parse_date
    )]
    pub base_period: Option<Vec<NaiveDate>>,

    /// Chunks for writing data to file (e.g. init_date=-1 lead_time=-1)
    #[arg(long = "output_chunks", num_args = 0.., value_parser = parse_chunk)]
    pub output_chunks: Vec<(String, i64)>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
}

impl Args {
    /// Baseline period, if one was given
    pub fn time_period(&self) -> Result<Option<TimePeriod>> {
        match self.base_period.as_deref() {
            Some([start, end]) => Ok(Some(TimePeriod::new(*start, *end)?)),
            _ => Ok(None),
        }
    }

    /// Output chunk lengths keyed by dimension
    pub fn chunk_spec(&self) -> ChunkSpec {
        self.output_chunks.iter().cloned().collect()
    }
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{s}': expected YYYY-MM-DD ({e})"))
}

fn parse_chunk(s: &str) -> std::result::Result<(String, i64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid format '{s}': expected '<dimension>=<chunk length>'"))?;
    if key.is_empty() {
        return Err(format!("Invalid format '{s}': missing dimension name"));
    }
    let value = value
        .parse::<i64>()
        .map_err(|_| format!("Invalid chunk length for dimension '{key}': {value}"))?;
    Ok((key.to_string(), value))
}
