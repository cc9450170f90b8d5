//! NetCDF I/O operations
//!
//! Reads variables together with their dimension coordinates and CF
//! `coordinates` auxiliaries, decoding CF times, and writes datasets back
//! with their metadata preserved.

use crate::array::{Attributes, CoordValues, Coordinate, DataArray, Dataset};
use crate::calendar::{decode_cf_times, TimeUnits};
use crate::data_source::{ChunkSpec, DataArrayMetadata, DataReader, DataWriter};
use crate::errors::{Result, UnseenError};
use async_trait::async_trait;
use ndarray::{ArrayD, IxDyn};
use netcdf::types::NcVariableType;
use netcdf::{AttributeValue, File, Variable};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

fn number(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

/// Convert a NetCDF attribute value to JSON; NaN becomes `null`
#[allow(unreachable_patterns)]
fn attribute_to_json(value: AttributeValue) -> Option<JsonValue> {
    let floats = |v: Vec<f64>| JsonValue::Array(v.into_iter().map(number).collect());
    Some(match value {
        AttributeValue::Str(v) => json!(v),
        AttributeValue::Strs(v) => json!(v),
        AttributeValue::Float(v) => number(f64::from(v)),
        AttributeValue::Floats(v) => floats(v.into_iter().map(f64::from).collect()),
        AttributeValue::Double(v) => number(v),
        AttributeValue::Doubles(v) => floats(v),
        AttributeValue::Uchar(v) => json!(v),
        AttributeValue::Uchars(v) => json!(v),
        AttributeValue::Schar(v) => json!(v),
        AttributeValue::Schars(v) => json!(v),
        AttributeValue::Ushort(v) => json!(v),
        AttributeValue::Ushorts(v) => json!(v),
        AttributeValue::Short(v) => json!(v),
        AttributeValue::Shorts(v) => json!(v),
        AttributeValue::Uint(v) => json!(v),
        AttributeValue::Uints(v) => json!(v),
        AttributeValue::Int(v) => json!(v),
        AttributeValue::Ints(v) => json!(v),
        AttributeValue::Ulonglong(v) => json!(v),
        AttributeValue::Ulonglongs(v) => json!(v),
        AttributeValue::Longlong(v) => json!(v),
        AttributeValue::Longlongs(v) => json!(v),
        _ => return None,
    })
}

/// Convert a JSON attribute to the closest NetCDF attribute type
fn json_to_attribute(value: &JsonValue) -> Option<AttributeValue> {
    match value {
        JsonValue::String(s) => Some(AttributeValue::Str(s.clone())),
        JsonValue::Bool(b) => Some(AttributeValue::Int(i32::from(*b))),
        JsonValue::Number(n) => n
            .as_i64()
            .map(AttributeValue::Longlong)
            .or_else(|| n.as_f64().map(AttributeValue::Double)),
        JsonValue::Array(items) => {
            if let Some(strings) = items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
            {
                Some(AttributeValue::Strs(strings))
            } else if let Some(ints) = items
                .iter()
                .map(JsonValue::as_i64)
                .collect::<Option<Vec<_>>>()
            {
                Some(AttributeValue::Longlongs(ints))
            } else {
                items
                    .iter()
                    .map(|v| if v.is_null() { Some(f64::NAN) } else { v.as_f64() })
                    .collect::<Option<Vec<_>>>()
                    .map(AttributeValue::Doubles)
            }
        }
        JsonValue::Null | JsonValue::Object(_) => None,
    }
}

fn read_attributes<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> Result<Attributes> {
    let mut out = Attributes::new();
    for attr in attrs {
        let name = attr.name().to_string();
        match attribute_to_json(attr.value()?) {
            Some(value) => {
                out.insert(name, value);
            }
            None => warn!("Skipped unsupported attribute type for '{name}'"),
        }
    }
    Ok(out)
}

fn dimension_names(var: &Variable) -> Vec<String> {
    var.dimensions().iter().map(|d| d.name().to_string()).collect()
}

fn shape_of(var: &Variable) -> Vec<usize> {
    var.dimensions().iter().map(|d| d.len()).collect()
}

fn is_integer(var: &Variable) -> bool {
    matches!(var.vartype(), NcVariableType::Int(_))
}

/// NetCDF file reader
#[derive(Debug, Clone)]
pub struct NetcdfReader {
    path: PathBuf,
}

impl NetcdfReader {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(UnseenError::FileNotFound { path });
        }
        Ok(Self { path })
    }

    fn open(&self) -> Result<File> {
        Ok(netcdf::open(&self.path)?)
    }

    fn read_coordinate(file: &File, name: &str) -> Result<Coordinate> {
        let var = file
            .variable(name)
            .ok_or_else(|| UnseenError::VariableNotFound {
                var: name.to_string(),
            })?;
        let dims = dimension_names(&var);
        let shape = shape_of(&var);
        let mut attrs = read_attributes(var.attributes())?;

        let values = if is_integer(&var) {
            let ints = ArrayD::from_shape_vec(IxDyn(&shape), var.get_values::<i64, _>(..)?)?;
            match decode_cf_times(&ints.mapv(|v| v as f64), &mut attrs)? {
                Some(times) => CoordValues::Time(times),
                None => CoordValues::Int(ints),
            }
        } else {
            let floats = ArrayD::from_shape_vec(IxDyn(&shape), var.get_values::<f64, _>(..)?)?;
            match decode_cf_times(&floats, &mut attrs)? {
                Some(times) => CoordValues::Time(times),
                None => CoordValues::Float(floats),
            }
        };
        Ok(Coordinate {
            dims,
            values,
            attrs,
        })
    }

    fn read_variable_sync(&self, name: &str) -> Result<DataArray> {
        let file = self.open()?;
        let var = file
            .variable(name)
            .ok_or_else(|| UnseenError::VariableNotFound {
                var: name.to_string(),
            })?;
        let dims = dimension_names(&var);
        let shape = shape_of(&var);
        let mut attrs = read_attributes(var.attributes())?;

        let mut data = ArrayD::from_shape_vec(IxDyn(&shape), var.get_values::<f32, _>(..)?)?;

        // CF packing and missing values
        let missing: Vec<f64> = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|key| attrs.remove(*key))
            .filter_map(|v| v.as_f64())
            .collect();
        if !missing.is_empty() {
            data.mapv_inplace(|v| {
                if missing.contains(&f64::from(v)) {
                    f32::NAN
                } else {
                    v
                }
            });
        }
        let scale = attrs.remove("scale_factor").and_then(|v| v.as_f64());
        let offset = attrs.remove("add_offset").and_then(|v| v.as_f64());
        if scale.is_some() || offset.is_some() {
            let (scale, offset) = (scale.unwrap_or(1.0), offset.unwrap_or(0.0));
            data.mapv_inplace(|v| (f64::from(v) * scale + offset) as f32);
        }

        let aux: Vec<String> = match attrs.remove("coordinates") {
            Some(JsonValue::String(names)) => {
                names.split_whitespace().map(str::to_string).collect()
            }
            _ => Vec::new(),
        };

        let mut da = DataArray::new(name, data, dims.clone())?;
        da.attrs = attrs;
        for dim in &dims {
            if dim != name && file.variable(dim).is_some() {
                da.set_coord(dim, Self::read_coordinate(&file, dim)?)?;
            }
        }
        for coord in &aux {
            if file.variable(coord).is_some() {
                da.set_coord(coord, Self::read_coordinate(&file, coord)?)?;
            } else {
                warn!(variable = name, coord = %coord, "auxiliary coordinate not found in file");
            }
        }

        debug!(
            variable = name,
            shape = ?da.data.shape(),
            coords = ?da.coords.keys().collect::<Vec<_>>(),
            "read netcdf variable"
        );
        Ok(da)
    }
}

#[async_trait]
impl DataReader for NetcdfReader {
    async fn list_arrays(&self) -> Result<Vec<String>> {
        let file = self.open()?;
        let mut names: Vec<String> = file.variables().map(|v| v.name().to_string()).collect();
        names.sort();
        Ok(names)
    }

    async fn get_metadata(&self, array_name: &str) -> Result<DataArrayMetadata> {
        let file = self.open()?;
        let var = file
            .variable(array_name)
            .ok_or_else(|| UnseenError::VariableNotFound {
                var: array_name.to_string(),
            })?;
        Ok(DataArrayMetadata {
            name: array_name.to_string(),
            shape: shape_of(&var),
            dtype: format!("{:?}", var.vartype()).to_lowercase(),
            dimensions: dimension_names(&var),
            attributes: read_attributes(var.attributes())?,
        })
    }

    async fn read_variable(&self, array_name: &str) -> Result<DataArray> {
        self.read_variable_sync(array_name)
    }

    async fn global_attributes(&self) -> Result<Attributes> {
        let file = self.open()?;
        read_attributes(file.attributes())
    }
}

/// NetCDF file writer
#[derive(Debug, Clone)]
pub struct NetcdfWriter {
    path: PathBuf,
}

impl NetcdfWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn put_attributes(var: &mut netcdf::VariableMut, attrs: &Attributes) -> Result<()> {
        for (key, value) in attrs {
            match json_to_attribute(value) {
                Some(attr) => {
                    var.put_attribute(key, attr)?;
                }
                None => warn!("Skipped unsupported attribute type for '{key}'"),
            }
        }
        Ok(())
    }

    fn write_sync(&self, dataset: &Dataset) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        let mut file = netcdf::create(&self.path)?;

        let mut dims: BTreeMap<&str, usize> = BTreeMap::new();
        let mut coords: BTreeMap<&str, &Coordinate> = BTreeMap::new();
        for da in dataset.data_vars.values() {
            for (dim, &len) in da.dims.iter().zip(da.data.shape()) {
                if let Some(&existing) = dims.get(dim.as_str()) {
                    if existing != len {
                        return Err(UnseenError::ShapeMismatch {
                            message: format!(
                                "dimension '{dim}' has lengths {existing} and {len} in one dataset"
                            ),
                        });
                    }
                }
                dims.insert(dim, len);
            }
            for (name, coord) in &da.coords {
                coords.entry(name.as_str()).or_insert(coord);
            }
        }
        for (&dim, &len) in &dims {
            file.add_dimension(dim, len)?;
        }

        for (&name, coord) in &coords {
            if dataset.data_vars.contains_key(name) {
                continue;
            }
            let dim_refs: Vec<&str> = coord.dims.iter().map(String::as_str).collect();
            let mut attrs = coord.attrs.clone();
            match &coord.values {
                CoordValues::Float(values) => {
                    let mut var = file.add_variable::<f64>(name, &dim_refs)?;
                    Self::put_attributes(&mut var, &attrs)?;
                    var.put_values(&values.iter().copied().collect::<Vec<_>>(), ..)?;
                }
                CoordValues::Int(values) => {
                    let mut var = file.add_variable::<i64>(name, &dim_refs)?;
                    Self::put_attributes(&mut var, &attrs)?;
                    var.put_values(&values.iter().copied().collect::<Vec<_>>(), ..)?;
                }
                CoordValues::Time(values) => {
                    let units = TimeUnits::days_since_epoch();
                    attrs.insert("units".to_string(), json!(units.to_string()));
                    attrs.insert("calendar".to_string(), json!("proleptic_gregorian"));
                    let mut var = file.add_variable::<f64>(name, &dim_refs)?;
                    Self::put_attributes(&mut var, &attrs)?;
                    let encoded: Vec<f64> = values.iter().map(|&t| units.encode(t)).collect();
                    var.put_values(&encoded, ..)?;
                }
            }
        }

        for da in dataset.data_vars.values() {
            let dim_refs: Vec<&str> = da.dims.iter().map(String::as_str).collect();
            let mut var = file.add_variable::<f32>(&da.name, &dim_refs)?;
            var.put_attribute("_FillValue", f32::NAN)?;
            let mut attrs = da.attrs.clone();
            let aux: Vec<&str> = da
                .coords
                .iter()
                .filter(|(name, coord)| !coord.is_index_of(name))
                .map(|(name, _)| name.as_str())
                .collect();
            if !aux.is_empty() {
                attrs.insert("coordinates".to_string(), json!(aux.join(" ")));
            }
            Self::put_attributes(&mut var, &attrs)?;
            var.put_values(&da.data.iter().copied().collect::<Vec<_>>(), ..)?;
        }

        for (key, value) in &dataset.attrs {
            match json_to_attribute(value) {
                Some(attr) => {
                    file.add_attribute(key, attr)?;
                }
                None => warn!("Skipped unsupported global attribute type for '{key}'"),
            }
        }

        info!(
            path = %self.path.display(),
            variables = ?dataset.data_vars.keys().collect::<Vec<_>>(),
            "wrote netcdf file"
        );
        Ok(())
    }
}

#[async_trait]
impl DataWriter for NetcdfWriter {
    /// NetCDF output is written contiguously; `chunks` is ignored
    async fn write_dataset(&self, dataset: &Dataset, _chunks: &ChunkSpec) -> Result<()> {
        self.write_sync(dataset)
    }
}

/// True when `path` names a NetCDF file by extension
pub fn is_netcdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_lowercase().as_str(), "nc" | "nc4" | "netcdf"))
}
