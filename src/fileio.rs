//! Opening input files, writing output stores and building history logs

use crate::array::Dataset;
use crate::data_source::{ChunkSpec, DataReader, DataWriter};
use crate::errors::{Result, UnseenError};
use crate::netcdf_io::{is_netcdf_path, NetcdfReader, NetcdfWriter};
use crate::zarr_io::{ZarrReader, ZarrSource, ZarrWriter};
use chrono::Local;
use std::path::Path;
use tracing::{info, warn};

/// Global attribute holding the provenance log
pub const HISTORY_ATTR: &str = "history";

/// Open the requested variables of a NetCDF file or Zarr store.
///
/// Zarr stores are recognised by their `.zgroup`/`.zarray` documents or a
/// `.zarr` extension; any other regular file is opened as NetCDF.
///
/// # Errors
///
/// Returns [`UnseenError::FileNotFound`] if `path` does not exist,
/// [`UnseenError::InvalidArgument`] for a directory that is not a Zarr
/// store and [`UnseenError::VariableNotFound`] if a requested variable is
/// absent.
pub async fn open_file(path: impl AsRef<Path>, variables: &[String]) -> Result<Dataset> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(UnseenError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let ds = if ZarrSource::is_zarr_store(path) {
        let reader = ZarrReader::new(ZarrSource::new(path)).await?;
        reader.read_dataset(variables).await?
    } else if path.is_file() {
        if !is_netcdf_path(path) {
            warn!(path = %path.display(), "no NetCDF extension, opening as NetCDF");
        }
        let reader = NetcdfReader::new(path)?;
        reader.read_dataset(variables).await?
    } else {
        return Err(UnseenError::InvalidArgument(format!(
            "{} is neither a Zarr store nor a NetCDF file",
            path.display()
        )));
    };

    info!(
        path = %path.display(),
        variables = ?variables,
        "opened dataset"
    );
    Ok(ds)
}

/// Write a dataset to a Zarr store, replacing anything already at `path`
pub async fn to_zarr(dataset: &Dataset, path: impl AsRef<Path>, chunks: &ChunkSpec) -> Result<()> {
    let writer = ZarrWriter::new(ZarrSource::new(path.as_ref())).await?;
    writer.write_dataset(dataset, chunks).await
}

/// Write a dataset to a NetCDF file, replacing anything already at `path`
pub async fn to_netcdf(dataset: &Dataset, path: impl AsRef<Path>) -> Result<()> {
    NetcdfWriter::new(path.as_ref())
        .write_dataset(dataset, &ChunkSpec::new())
        .await
}

/// Assemble a history log from a new entry and the histories of the input files.
///
/// With a single input its history follows the entry directly; with several
/// each history is introduced by `History of <file>:`.
pub fn new_log(entry: &str, infile_logs: &[(String, String)]) -> String {
    let mut log = format!("{entry}\n");
    if infile_logs.len() == 1 {
        log.push_str(&infile_logs[0].1);
        log.push('\n');
    } else {
        for (file, history) in infile_logs {
            log.push_str(&format!("History of {file}:\n{history}\n\n"));
        }
    }
    log
}

/// History log for an output file: the current time and command line,
/// followed by the histories of the input files
pub fn get_new_log(infile_logs: &[(String, String)]) -> String {
    let time_stamp = Local::now().format("%a %b %d %H:%M:%S %Y");
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    new_log(&format!("{time_stamp}: {command_line}"), infile_logs)
}
