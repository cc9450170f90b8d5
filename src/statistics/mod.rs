//! Statistical reductions and climatologies
//!
//! # Organization
//!
//! This module is organized into submodules:
//! - [`parallel`]: Parallel NaN-skipping mean over several axes
//! - [`climatology`]: Baseline period selection and per-initial-month climatologies

pub mod climatology;
pub mod parallel;

// Re-export the main types and functions for convenience
pub use climatology::{get_clim, select_time_period, TimePeriod, MONTH_DIM};
pub use parallel::parallel_mean_axes;
