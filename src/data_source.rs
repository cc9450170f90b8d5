//! Data source abstraction for unified NetCDF and Zarr interfaces
//!
//! Readers hand back fully labelled [`DataArray`]s so callers never need to
//! know which on-disk format a dataset came from.

use crate::array::{Attributes, DataArray, Dataset};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Chunk length per dimension name; `-1` (or an absent key) means the whole dimension
pub type ChunkSpec = BTreeMap<String, i64>;

/// Metadata for array-like data
#[derive(Debug, Clone)]
pub struct DataArrayMetadata {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
    pub dimensions: Vec<String>,
    pub attributes: Attributes,
}

/// Basic data source interface for reading labelled arrays
#[async_trait]
pub trait DataReader: Send + Sync {
    /// List all available arrays in the data source
    async fn list_arrays(&self) -> Result<Vec<String>>;

    /// Get metadata for a specific array
    async fn get_metadata(&self, array_name: &str) -> Result<DataArrayMetadata>;

    /// Read an array with its dimension and auxiliary coordinates
    async fn read_variable(&self, array_name: &str) -> Result<DataArray>;

    /// Global (file or group level) attributes
    async fn global_attributes(&self) -> Result<Attributes>;

    /// Read several variables into a dataset carrying the global attributes
    async fn read_dataset(&self, variables: &[String]) -> Result<Dataset> {
        let mut ds = Dataset::new();
        ds.attrs = self.global_attributes().await?;
        for name in variables {
            ds.insert(self.read_variable(name).await?);
        }
        Ok(ds)
    }
}

/// Data writing interface
#[async_trait]
pub trait DataWriter: Send + Sync {
    /// Write every variable of a dataset, with coordinates, replacing any existing store
    async fn write_dataset(&self, dataset: &Dataset, chunks: &ChunkSpec) -> Result<()>;
}
