//! Centralized error handling for unseen
//!
//! Every fallible operation in the library returns [`Result`], so callers
//! (and the command line driver) see one structured error type.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Main error type for unseen operations
#[derive(Debug, Error)]
pub enum UnseenError {
    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDFError(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// Malformed JSON in Zarr metadata
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Zarr store layout or metadata problems
    #[error("Zarr error: {0}")]
    ZarrError(String),

    /// Input path does not exist
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Variable not found in a file or dataset
    #[error("Variable '{var}' not found in file")]
    VariableNotFound { var: String },

    /// Dimension not found in variable
    #[error("Dimension '{dim}' not found in variable '{var}'")]
    DimensionNotFound { var: String, dim: String },

    /// Coordinate not found in variable
    #[error("Coordinate '{coord}' not found in variable '{var}'")]
    CoordinateNotFound { var: String, coord: String },

    /// Neither of the expected structural dimensions is present
    #[error("Neither a {first} nor {second} dimension can be found")]
    MissingDimension { first: String, second: String },

    /// Region bounds outside the valid lat/lon ranges
    #[error("Invalid bounding box: {message}")]
    InvalidBoundingBox { message: String },

    /// Bias method other than additive or multiplicative
    #[error("Unrecognised bias removal method {method}")]
    UnrecognisedMethod { method: String },

    /// Flooring frequency alias that cannot be interpreted
    #[error("Invalid frequency '{freq}'")]
    InvalidFrequency { freq: String },

    /// CF time units that cannot be decoded
    #[error("Invalid time units '{units}'")]
    InvalidTimeUnits { units: String },

    /// Requested initial date does not occur in the series
    #[error("Initial date {date} not found in time axis")]
    InitDateNotFound { date: NaiveDateTime },

    /// Lead time window runs past the end of the series
    #[error("Window of {n_lead_steps} steps from {date} runs past the end of the time axis ({available} steps available)")]
    WindowOutOfRange {
        date: NaiveDateTime,
        n_lead_steps: usize,
        available: usize,
    },

    /// Forecast initial month with no matching bias month
    #[error("No bias available for initial month {month}")]
    MissingBiasMonth { month: u32 },

    /// Required attribute absent
    #[error("Attribute '{attr}' not found on '{var}'")]
    MissingAttribute { var: String, attr: String },

    /// Operands whose shapes cannot be broadcast together
    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Argument outside its valid domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for unseen operations
pub type Result<T> = std::result::Result<T, UnseenError>;
