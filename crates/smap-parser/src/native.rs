//! netCDF-4 backed containers.
//!
//! SMAP HDF5 products are valid netCDF-4 files, so they are opened through
//! the native netcdf library (which wraps HDF5). Groups are read one level
//! deep, which covers every SMAP L3 layout.

use std::path::Path;
use std::sync::Once;

use serde_json::{json, Value};

use crate::container::{ArrayContainer, ContainerOpener, ContainerSchema, VariableSchema, ROOT_GROUP};
use crate::error::{ReadError, ReadResult};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints diagnostics even for errors the caller handles,
/// e.g. probing a group that does not exist. Safe to call repeatedly; only
/// the first call has an effect.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 with null handlers is the documented way to
        // disable automatic error printing.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Opens SMAP files with the netcdf library.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfOpener;

impl ContainerOpener for NetcdfOpener {
    type Container = NetcdfContainer;

    fn open(&self, path: &Path) -> ReadResult<NetcdfContainer> {
        NetcdfContainer::open(path)
    }
}

/// An open netCDF-4 file. The file handle is closed on drop.
pub struct NetcdfContainer {
    file: netcdf::File,
    schema: ContainerSchema,
}

impl NetcdfContainer {
    pub fn open(path: &Path) -> ReadResult<Self> {
        silence_hdf5_errors();

        let file = netcdf::open(path).map_err(|e| {
            ReadError::container(format!("failed to open {}: {}", path.display(), e))
        })?;
        let schema = read_schema(&file)?;

        Ok(Self { file, schema })
    }
}

impl ArrayContainer for NetcdfContainer {
    fn schema(&self) -> &ContainerSchema {
        &self.schema
    }

    fn read_variable(&self, group: &str, variable: &str) -> ReadResult<Vec<f64>> {
        let unknown = || ReadError::UnknownVariable {
            variable: variable.to_string(),
            group: group.to_string(),
        };

        if group == ROOT_GROUP {
            let var = self.file.variable(variable).ok_or_else(unknown)?;
            return read_as_f64(&var);
        }

        let grp = self
            .file
            .group(group)
            .map_err(|e| ReadError::container(format!("failed to open group {}: {}", group, e)))?
            .ok_or_else(unknown)?;
        let var = grp.variable(variable).ok_or_else(unknown)?;
        read_as_f64(&var)
    }
}

fn read_schema(file: &netcdf::File) -> ReadResult<ContainerSchema> {
    let mut schema = ContainerSchema::new();

    for var in file.variables() {
        schema.insert(ROOT_GROUP, &var.name(), describe(&var));
    }

    let groups = file
        .groups()
        .map_err(|e| ReadError::container(format!("failed to list groups: {}", e)))?;
    for group in groups {
        let name = group.name();
        schema.add_group(&name);
        for var in group.variables() {
            schema.insert(&name, &var.name(), describe(&var));
        }
    }

    Ok(schema)
}

fn describe(var: &netcdf::Variable) -> VariableSchema {
    let shape = var.dimensions().iter().map(|d| d.len()).collect();
    let attributes = var
        .attributes()
        .filter_map(|attr| {
            let value = attr.value().ok()?;
            Some((attr.name().to_string(), attribute_to_json(value)?))
        })
        .collect();

    VariableSchema { shape, attributes }
}

/// Convert a netCDF attribute to JSON, keeping vectors as arrays.
fn attribute_to_json(value: netcdf::AttributeValue) -> Option<Value> {
    use netcdf::AttributeValue as A;

    let json = match value {
        A::Str(s) => Value::from(s),
        A::Strs(s) => Value::from(s),
        A::Uchars(v) => json!(v),
        A::Schars(v) => json!(v),
        A::Ushorts(v) => json!(v),
        A::Shorts(v) => json!(v),
        A::Uints(v) => json!(v),
        A::Ints(v) => json!(v),
        A::Ulonglongs(v) => json!(v),
        A::Longlongs(v) => json!(v),
        A::Floats(v) => json!(v.into_iter().map(f64::from).collect::<Vec<_>>()),
        A::Doubles(v) => json!(v),
        scalar => json!(f64::try_from(scalar).ok()?),
    };
    Some(json)
}

/// Read a variable as `f64`, whatever its stored numeric type.
fn read_as_f64(var: &netcdf::Variable) -> ReadResult<Vec<f64>> {
    macro_rules! try_read {
        ($t:ty) => {
            let attempt: Result<Vec<$t>, _> = var.get_values(..);
            if let Ok(values) = attempt {
                return Ok(values.into_iter().map(|v| v as f64).collect());
            }
        };
    }

    try_read!(f64);
    try_read!(f32);
    try_read!(i32);
    try_read!(i16);
    try_read!(u16);
    try_read!(u8);
    try_read!(i8);
    try_read!(u32);
    try_read!(i64);

    Err(ReadError::container(format!(
        "variable {} has an unsupported data type",
        var.name()
    )))
}
