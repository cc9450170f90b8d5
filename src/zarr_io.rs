//! Zarr I/O operations
//!
//! Reads and writes Zarr v2 directory stores of little-endian, C-ordered
//! chunks. Stores are written uncompressed; compressed or filtered arrays
//! are decoded through `zarrs` on read. Dimension names use the
//! `_ARRAY_DIMENSIONS` attribute convention and timestamps are stored as
//! floating point CF times.

use crate::array::{Attributes, CoordValues, Coordinate, DataArray, Dataset};
use crate::calendar::{decode_cf_times, TimeUnits};
use crate::data_source::{ChunkSpec, DataArrayMetadata, DataReader, DataWriter};
use crate::errors::{Result, UnseenError};
use async_trait::async_trait;
use ndarray::{ArrayD, ArrayViewD, Dimension, IxDyn, Slice};
use rayon::prelude::*;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use zarrs::array::{Array, ElementOwned};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

const DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";
const COORDINATES_ATTR: &str = "coordinates";

/// Zarr data source
#[derive(Debug, Clone)]
pub struct ZarrSource {
    /// Local filesystem path
    pub path: PathBuf,
}

impl ZarrSource {
    /// Create a new ZarrSource from a path string
    pub fn from_path_str(s: &str) -> Result<Self> {
        // Only the local filesystem is supported
        if s.starts_with("s3://") || s.starts_with("gs://") || s.starts_with("https://") {
            return Err(UnseenError::ZarrError(
                "Cloud storage is not supported. Please use local filesystem paths.".to_string(),
            ));
        }
        Ok(ZarrSource {
            path: PathBuf::from(s),
        })
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// True for a directory that looks like a Zarr group or array
    pub fn is_zarr_store(path: &Path) -> bool {
        path.is_dir()
            && (path.join(".zgroup").exists()
                || path.join(".zarray").exists()
                || path.extension().is_some_and(|e| e == "zarr"))
    }
}

/// Element types that can be stored in a chunk
trait ZarrElement: ElementOwned + Copy + Send + Sync + 'static {
    const DTYPE: &'static str;
    const SIZE: usize;
    fn from_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut Vec<u8>);
    fn fill() -> Self;
    fn fill_json() -> JsonValue;
}

impl ZarrElement for f32 {
    const DTYPE: &'static str = "<f4";
    const SIZE: usize = 4;

    fn from_le(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        f32::from_le_bytes(buf)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn fill() -> Self {
        f32::NAN
    }

    fn fill_json() -> JsonValue {
        json!("NaN")
    }
}

impl ZarrElement for f64 {
    const DTYPE: &'static str = "<f8";
    const SIZE: usize = 8;

    fn from_le(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        f64::from_le_bytes(buf)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn fill() -> Self {
        f64::NAN
    }

    fn fill_json() -> JsonValue {
        json!("NaN")
    }
}

impl ZarrElement for i64 {
    const DTYPE: &'static str = "<i8";
    const SIZE: usize = 8;

    fn from_le(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        i64::from_le_bytes(buf)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn fill() -> Self {
        0
    }

    fn fill_json() -> JsonValue {
        json!(0)
    }
}

/// Parsed `.zarray` document
#[derive(Debug, Clone)]
pub struct ArrayMetadata {
    pub name: String,
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    pub dtype: String,
    pub fill_value: JsonValue,
    pub dimensions: Vec<String>,
    pub attributes: Attributes,
    /// Compressor id, when chunks are not stored raw
    pub compressor: Option<String>,
    /// Whether chunks pass through a filter pipeline
    pub filtered: bool,
}

impl From<ArrayMetadata> for DataArrayMetadata {
    fn from(meta: ArrayMetadata) -> Self {
        DataArrayMetadata {
            name: meta.name,
            shape: meta.shape,
            dtype: meta.dtype,
            dimensions: meta.dimensions,
            attributes: meta.attributes,
        }
    }
}

/// Array values in the type they were stored with
enum RawValues {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I64(ArrayD<i64>),
}

fn chunk_key(index: &[usize]) -> String {
    if index.is_empty() {
        return "0".to_string();
    }
    index
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Every position of the chunk grid for `shape` split into `chunks`
fn chunk_grid(shape: &[usize], chunks: &[usize]) -> Vec<Vec<usize>> {
    let grid: Vec<usize> = shape
        .iter()
        .zip(chunks)
        .map(|(&len, &chunk)| len.div_ceil(chunk.max(1)))
        .collect();
    ndarray::indices(IxDyn(&grid))
        .into_iter()
        .map(|idx| idx.slice().to_vec())
        .collect()
}

fn codec_error(meta: &ArrayMetadata, err: impl Display) -> UnseenError {
    UnseenError::ZarrError(format!("Array '{}': {err}", meta.name))
}

fn parse_usizes(value: &JsonValue, key: &str) -> Result<Vec<usize>> {
    value[key]
        .as_array()
        .ok_or_else(|| UnseenError::ZarrError(format!("Missing {key} in metadata")))?
        .iter()
        .map(|v| {
            v.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| UnseenError::ZarrError(format!("Invalid {key} entry: {v}")))
        })
        .collect()
}

/// Zarr reader for accessing Zarr arrays
pub struct ZarrReader {
    source: ZarrSource,
}

impl ZarrReader {
    /// Create a new ZarrReader from a source
    pub async fn new(source: ZarrSource) -> Result<Self> {
        if !source.path.exists() {
            return Err(UnseenError::FileNotFound {
                path: source.path.clone(),
            });
        }
        if !source.path.is_dir() {
            return Err(UnseenError::ZarrError(format!(
                "Zarr store path is not a directory: {}",
                source.path.display()
            )));
        }
        Ok(ZarrReader { source })
    }

    fn array_path(&self, array_name: &str) -> PathBuf {
        self.source.path.join(array_name)
    }

    fn has_array(&self, array_name: &str) -> bool {
        self.array_path(array_name).join(".zarray").exists()
    }

    async fn read_json(path: &Path) -> Result<Option<JsonValue>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Get array metadata
    pub async fn get_array_metadata(&self, array_name: &str) -> Result<ArrayMetadata> {
        let array_path = self.array_path(array_name);
        let zarray = Self::read_json(&array_path.join(".zarray"))
            .await?
            .ok_or_else(|| UnseenError::VariableNotFound {
                var: array_name.to_string(),
            })?;

        let compressor = match &zarray["compressor"] {
            JsonValue::Null => None,
            codec => Some(codec["id"].as_str().unwrap_or("unknown").to_string()),
        };
        let filtered = zarray["filters"]
            .as_array()
            .is_some_and(|filters| !filters.is_empty());
        if zarray["order"].as_str().unwrap_or("C") != "C" {
            return Err(UnseenError::ZarrError(format!(
                "Array '{array_name}' uses Fortran order; only C order is supported"
            )));
        }

        let shape = parse_usizes(&zarray, "shape")?;
        let chunks = parse_usizes(&zarray, "chunks")?;
        if shape.len() != chunks.len() {
            return Err(UnseenError::ZarrError(format!(
                "Array '{array_name}' has {} dimensions but {} chunk lengths",
                shape.len(),
                chunks.len()
            )));
        }
        let dtype = zarray["dtype"]
            .as_str()
            .ok_or_else(|| UnseenError::ZarrError("Missing dtype in metadata".to_string()))?
            .to_string();

        let mut attributes: Attributes = match Self::read_json(&array_path.join(".zattrs")).await? {
            Some(JsonValue::Object(map)) => map.into_iter().collect(),
            _ => Attributes::new(),
        };
        let dimensions = match attributes.remove(DIMENSIONS_ATTR) {
            Some(JsonValue::Array(names)) => names
                .iter()
                .map(|n| n.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    UnseenError::ZarrError(format!(
                        "Array '{array_name}' has non-string dimension names"
                    ))
                })?,
            _ => {
                return Err(UnseenError::ZarrError(format!(
                    "Array '{array_name}' has no {DIMENSIONS_ATTR} attribute"
                )))
            }
        };
        if dimensions.len() != shape.len() {
            return Err(UnseenError::ZarrError(format!(
                "Array '{array_name}' names {} dimensions for a rank {} array",
                dimensions.len(),
                shape.len()
            )));
        }

        Ok(ArrayMetadata {
            name: array_name.to_string(),
            shape,
            chunks,
            dtype,
            fill_value: zarray["fill_value"].clone(),
            dimensions,
            attributes,
            compressor,
            filtered,
        })
    }

    /// Decode every chunk through the array's codec pipeline
    fn read_encoded<T: ZarrElement>(&self, meta: &ArrayMetadata) -> Result<ArrayD<T>> {
        debug!(
            "Decoding '{}' with compressor {}",
            meta.name,
            meta.compressor.as_deref().unwrap_or("none")
        );
        let store = FilesystemStore::new(&self.source.path).map_err(|e| codec_error(meta, e))?;
        let array = Array::open(Arc::new(store), &format!("/{}", meta.name))
            .map_err(|e| codec_error(meta, e))?;
        let subset = ArraySubset::new_with_shape(array.shape().to_vec());
        let values: Vec<T> = array
            .retrieve_array_subset_elements(&subset)
            .map_err(|e| codec_error(meta, e))?;
        Ok(ArrayD::from_shape_vec(IxDyn(&meta.shape), values)?)
    }

    fn read_values<T: ZarrElement>(&self, meta: &ArrayMetadata) -> Result<ArrayD<T>> {
        if meta.compressor.is_some() || meta.filtered {
            self.read_encoded(meta)
        } else {
            self.read_chunks(meta)
        }
    }

    fn read_chunks<T: ZarrElement>(&self, meta: &ArrayMetadata) -> Result<ArrayD<T>> {
        let array_path = self.array_path(&meta.name);
        let mut out = ArrayD::from_elem(IxDyn(&meta.shape), T::fill());
        let chunk_len: usize = meta.chunks.iter().product();

        for index in chunk_grid(&meta.shape, &meta.chunks) {
            let path = array_path.join(chunk_key(&index));
            if !path.exists() {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            if bytes.len() != chunk_len * T::SIZE {
                return Err(UnseenError::ZarrError(format!(
                    "Chunk {} of '{}' has {} bytes, expected {}",
                    chunk_key(&index),
                    meta.name,
                    bytes.len(),
                    chunk_len * T::SIZE
                )));
            }
            let values: Vec<T> = bytes.chunks_exact(T::SIZE).map(T::from_le).collect();
            let chunk = ArrayD::from_shape_vec(IxDyn(&meta.chunks), values)?;

            let origin: Vec<usize> = index
                .iter()
                .zip(&meta.chunks)
                .map(|(&i, &c)| i * c)
                .collect();
            let mut target = out.slice_each_axis_mut(|ad| {
                let start = origin[ad.axis.index()];
                let end = (start + meta.chunks[ad.axis.index()]).min(ad.len);
                Slice::from(start..end)
            });
            let target_shape = target.shape().to_vec();
            target.assign(&chunk.slice_each_axis(|ad| {
                Slice::from(0..target_shape[ad.axis.index()])
            }));
        }
        Ok(out)
    }

    async fn read_raw(&self, array_name: &str) -> Result<(ArrayMetadata, RawValues)> {
        let meta = self.get_array_metadata(array_name).await?;
        let values = match meta.dtype.as_str() {
            "<f4" => RawValues::F32(self.read_values::<f32>(&meta)?),
            "<f8" => RawValues::F64(self.read_values::<f64>(&meta)?),
            "<i8" => RawValues::I64(self.read_values::<i64>(&meta)?),
            other => {
                return Err(UnseenError::ZarrError(format!(
                    "Unsupported dtype '{other}' for array '{array_name}'"
                )))
            }
        };
        Ok((meta, values))
    }

    async fn read_coordinate(&self, name: &str) -> Result<Coordinate> {
        let (meta, raw) = self.read_raw(name).await?;
        let mut attrs = meta.attributes;
        let values = match raw {
            RawValues::I64(values) => {
                let as_float = values.mapv(|v| v as f64);
                if let Some(times) = decode_cf_times(&as_float, &mut attrs)? {
                    CoordValues::Time(times)
                } else {
                    CoordValues::Int(values)
                }
            }
            RawValues::F32(values) => float_coord(values.mapv(f64::from), &mut attrs)?,
            RawValues::F64(values) => float_coord(values, &mut attrs)?,
        };
        Ok(Coordinate {
            dims: meta.dimensions,
            values,
            attrs,
        })
    }

    /// Read an array with its coordinates as a [`DataArray`]
    pub async fn read_data_array(&self, array_name: &str) -> Result<DataArray> {
        let (meta, raw) = self.read_raw(array_name).await?;
        let fill = meta.fill_value.as_f64();
        let data = match raw {
            RawValues::F32(values) => values,
            RawValues::F64(values) => values.mapv(|v| v as f32),
            RawValues::I64(values) => values.mapv(|v| v as f32),
        };
        let data = match fill.filter(|f| !f.is_nan()) {
            Some(fill) => data.mapv(|v| if f64::from(v) == fill { f32::NAN } else { v }),
            None => data,
        };

        let mut attrs = meta.attributes;
        let aux: Vec<String> = match attrs.remove(COORDINATES_ATTR) {
            Some(JsonValue::String(names)) => {
                names.split_whitespace().map(str::to_string).collect()
            }
            _ => Vec::new(),
        };

        let mut da = DataArray::new(array_name, data, meta.dimensions.clone())?;
        da.attrs = attrs;
        for dim in &meta.dimensions {
            if dim != array_name && self.has_array(dim) {
                let coord = self.read_coordinate(dim).await?;
                da.set_coord(dim, coord)?;
            }
        }
        for name in &aux {
            let coord = self.read_coordinate(name).await?;
            da.set_coord(name, coord)?;
        }

        debug!(
            variable = array_name,
            shape = ?da.data.shape(),
            coords = ?da.coords.keys().collect::<Vec<_>>(),
            "read zarr array"
        );
        Ok(da)
    }
}

fn float_coord(values: ArrayD<f64>, attrs: &mut Attributes) -> Result<CoordValues> {
    Ok(match decode_cf_times(&values, attrs)? {
        Some(times) => CoordValues::Time(times),
        None => CoordValues::Float(values),
    })
}

#[async_trait]
impl DataReader for ZarrReader {
    async fn list_arrays(&self) -> Result<Vec<String>> {
        let mut arrays = Vec::new();
        for entry in std::fs::read_dir(&self.source.path)? {
            let path = entry?.path();
            if path.join(".zarray").exists() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    arrays.push(name.to_string());
                }
            }
        }
        arrays.sort();
        Ok(arrays)
    }

    async fn get_metadata(&self, array_name: &str) -> Result<DataArrayMetadata> {
        Ok(self.get_array_metadata(array_name).await?.into())
    }

    async fn read_variable(&self, array_name: &str) -> Result<DataArray> {
        self.read_data_array(array_name).await
    }

    async fn global_attributes(&self) -> Result<Attributes> {
        Ok(
            match Self::read_json(&self.source.path.join(".zattrs")).await? {
                Some(JsonValue::Object(map)) => map.into_iter().collect(),
                _ => Attributes::new(),
            },
        )
    }
}

/// Zarr writer for creating new Zarr stores
pub struct ZarrWriter {
    source: ZarrSource,
}

impl ZarrWriter {
    /// Create a new ZarrWriter from a source
    pub async fn new(source: ZarrSource) -> Result<Self> {
        Ok(ZarrWriter { source })
    }

    async fn write_json(path: &Path, value: &JsonValue) -> Result<()> {
        tokio::fs::write(path, serde_json::to_string_pretty(value)?).await?;
        Ok(())
    }

    /// Write one array, splitting it into chunks written in parallel
    async fn write_array<T: ZarrElement>(
        &self,
        array_name: &str,
        data: ArrayViewD<'_, T>,
        dims: &[String],
        chunks: &ChunkSpec,
        mut attrs: Attributes,
    ) -> Result<()> {
        let shape = data.shape().to_vec();
        let chunk_shape: Vec<usize> = dims
            .iter()
            .zip(&shape)
            .map(|(dim, &len)| match chunks.get(dim) {
                Some(&c) if c > 0 => (c as usize).min(len).max(1),
                _ => len.max(1),
            })
            .collect();

        let array_path = self.source.path.join(array_name);
        tokio::fs::create_dir_all(&array_path).await?;

        let zarray = json!({
            "chunks": chunk_shape,
            "compressor": null,
            "dtype": T::DTYPE,
            "fill_value": T::fill_json(),
            "filters": null,
            "order": "C",
            "shape": shape,
            "zarr_format": 2
        });
        Self::write_json(&array_path.join(".zarray"), &zarray).await?;

        attrs.insert(DIMENSIONS_ATTR.to_string(), json!(dims));
        let zattrs: serde_json::Map<String, JsonValue> = attrs.into_iter().collect();
        Self::write_json(&array_path.join(".zattrs"), &JsonValue::Object(zattrs)).await?;

        let grid = chunk_grid(&shape, &chunk_shape);
        debug!(
            array = array_name,
            shape = ?shape,
            chunks = ?chunk_shape,
            "writing {} chunks across {} threads",
            grid.len(),
            rayon::current_num_threads()
        );

        grid.par_iter().try_for_each(|index| {
            let origin: Vec<usize> = index
                .iter()
                .zip(&chunk_shape)
                .map(|(&i, &c)| i * c)
                .collect();
            let region = data.slice_each_axis(|ad| {
                let start = origin[ad.axis.index()];
                let end = (start + chunk_shape[ad.axis.index()]).min(ad.len);
                Slice::from(start..end)
            });

            // Edge chunks are padded to the full chunk shape
            let mut full = ArrayD::from_elem(IxDyn(&chunk_shape), T::fill());
            full.slice_each_axis_mut(|ad| Slice::from(0..region.len_of(ad.axis)))
                .assign(&region);

            let mut bytes = Vec::with_capacity(full.len() * T::SIZE);
            for &value in full.iter() {
                value.write_le(&mut bytes);
            }
            std::fs::write(array_path.join(chunk_key(index)), bytes)?;
            Ok::<(), UnseenError>(())
        })
    }

    async fn write_coordinate(
        &self,
        name: &str,
        coord: &Coordinate,
        chunks: &ChunkSpec,
    ) -> Result<()> {
        let mut attrs = coord.attrs.clone();
        match &coord.values {
            CoordValues::Float(values) => {
                self.write_array(name, values.view(), &coord.dims, chunks, attrs)
                    .await
            }
            CoordValues::Int(values) => {
                self.write_array(name, values.view(), &coord.dims, chunks, attrs)
                    .await
            }
            CoordValues::Time(values) => {
                let units = TimeUnits::days_since_epoch();
                attrs.insert("units".to_string(), json!(units.to_string()));
                attrs.insert("calendar".to_string(), json!("proleptic_gregorian"));
                let encoded = values.mapv(|t| units.encode(t));
                self.write_array(name, encoded.view(), &coord.dims, chunks, attrs)
                    .await
            }
        }
    }
}

#[async_trait]
impl DataWriter for ZarrWriter {
    async fn write_dataset(&self, dataset: &Dataset, chunks: &ChunkSpec) -> Result<()> {
        let root = &self.source.path;
        if root.exists() {
            if root.is_dir() {
                tokio::fs::remove_dir_all(root).await?;
            } else {
                tokio::fs::remove_file(root).await?;
            }
        }
        tokio::fs::create_dir_all(root).await?;

        Self::write_json(&root.join(".zgroup"), &json!({ "zarr_format": 2 })).await?;
        let global: serde_json::Map<String, JsonValue> = dataset
            .attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self::write_json(&root.join(".zattrs"), &JsonValue::Object(global)).await?;

        let mut coords: BTreeMap<&str, &Coordinate> = BTreeMap::new();
        for da in dataset.data_vars.values() {
            let mut attrs = da.attrs.clone();
            let aux: Vec<&str> = da
                .coords
                .iter()
                .filter(|(name, coord)| !coord.is_index_of(name))
                .map(|(name, _)| name.as_str())
                .collect();
            if !aux.is_empty() {
                attrs.insert(COORDINATES_ATTR.to_string(), json!(aux.join(" ")));
            }
            self.write_array(&da.name, da.data.view(), &da.dims, chunks, attrs)
                .await?;
            for (name, coord) in &da.coords {
                coords.entry(name.as_str()).or_insert(coord);
            }
        }
        for (name, coord) in coords {
            if !dataset.data_vars.contains_key(name) {
                self.write_coordinate(name, coord, chunks).await?;
            }
        }

        info!(
            path = %root.display(),
            variables = ?dataset.data_vars.keys().collect::<Vec<_>>(),
            "wrote zarr store"
        );
        Ok(())
    }
}

/// Convenience function to read one variable from a Zarr store
pub async fn read_zarr_array(path: &str, array_name: &str) -> Result<DataArray> {
    let source = ZarrSource::from_path_str(path)?;
    let reader = ZarrReader::new(source).await?;
    reader.read_data_array(array_name).await
}

/// List all arrays in a Zarr store
pub async fn list_zarr_arrays(path: &str) -> Result<Vec<String>> {
    let source = ZarrSource::from_path_str(path)?;
    let reader = ZarrReader::new(source).await?;
    reader.list_arrays().await
}
