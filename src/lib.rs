//! unseen: forecast post-processing for climate model output
//!
//! Utilities for selecting geographic sub-regions from gridded data,
//! restructuring time series into an initial date by lead time layout for
//! forecast verification, and calculating and removing forecast bias
//! relative to observations.
//!
//! ## Key Features
//!
//! - **Labelled Arrays**: [`DataArray`] with named dimensions, coordinates and attributes
//! - **Region Selection**: Strict lat/lon box masks, including boxes across the 0/360 seam
//! - **Init-Date Stacking**: Convert an observed series to the layout of a forecast, and back
//! - **Bias Correction**: Additive and multiplicative bias per initial month
//! - **NetCDF & Zarr Support**: Read both formats, write Zarr v2 stores
//! - **Parallel Processing**: Climatology reductions and chunk writes run on Rayon
//!
//! ## Module Organization
//!
//! - [`array`]: Labelled arrays, coordinates and datasets
//! - [`region`]: Bounding boxes and region selection
//! - [`calendar`]: Frequencies, leap day removal and CF time units
//! - [`stacking`]: `stack_by_init_date` and `reindex_forecast`
//! - [`align`]: Element-wise arithmetic aligned by dimension name
//! - [`statistics`]: Time period selection, climatologies and parallel means
//! - [`bias`]: Bias calculation and removal
//! - [`fileio`], [`netcdf_io`], [`zarr_io`], [`data_source`]: File I/O
//! - [`parallel`]: Parallel processing configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use unseen::prelude::*;
//!
//! # async fn example() -> unseen::Result<()> {
//! let vars = vec!["pr".to_string()];
//! let fcst = open_file("fcst.zarr", &vars).await?;
//! let obs = open_file("obs.nc", &vars).await?;
//!
//! let options = ComputeOptions::default();
//! let bias = compute_bias(fcst.get("pr")?, obs.get("pr")?, "additive", None, options)?;
//! let corrected = apply_bias(fcst.get("pr")?, &bias, "additive", options)?;
//! to_zarr(&Dataset::from(corrected), "fcst_bc.zarr", &ChunkSpec::new()).await?;
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod align;
pub mod array;
pub mod bias;
pub mod calendar;
pub mod cli;
pub mod data_source;
pub mod errors;
pub mod fileio;
pub mod logging;
pub mod netcdf_io;
pub mod parallel;
pub mod region;
pub mod stacking;
pub mod statistics;
pub mod zarr_io;

// Direct re-exports for the public API
pub use array::{Attributes, CoordValues, Coordinate, DataArray, Dataset, Label};
pub use errors::{Result, UnseenError};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::align::{binary_op, divide, subtract, ComputeOptions};
    pub use crate::array::{CoordValues, Coordinate, DataArray, Dataset, Label};
    pub use crate::bias::{apply_bias, compute_bias, BiasMethod};
    pub use crate::calendar::{strip_leap_days, Freq};
    pub use crate::data_source::{ChunkSpec, DataReader, DataWriter};
    pub use crate::errors::{Result, UnseenError};
    pub use crate::fileio::{get_new_log, open_file, to_netcdf, to_zarr};
    pub use crate::parallel::ParallelConfig;
    pub use crate::region::{select_region, BoundingBox};
    pub use crate::stacking::{reindex_forecast, stack_by_init_date};
    pub use crate::statistics::{get_clim, TimePeriod};
}
