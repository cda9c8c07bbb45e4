//! Array container abstraction.
//!
//! A container is a hierarchical file of named n-dimensional arrays with
//! attributes. The reader only needs the schema and flat `f64` reads, so the
//! netCDF backend and the in-memory one share this narrow interface.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde_json::Value;

use crate::error::{ReadError, ReadResult};

/// Name of the root group in a [`ContainerSchema`].
pub const ROOT_GROUP: &str = "";

/// Shape and attributes of one variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableSchema {
    pub shape: Vec<usize>,
    pub attributes: BTreeMap<String, Value>,
}

/// Groups and variables of a container, without any data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSchema {
    groups: BTreeMap<String, BTreeMap<String, VariableSchema>>,
}

impl ContainerSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group: &str, variable: &str, schema: VariableSchema) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(variable.to_string(), schema);
    }

    /// Declare a group even if it holds no variables.
    pub fn add_group(&mut self, group: &str) {
        self.groups.entry(group.to_string()).or_default();
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Group names in sorted order; the root group is `""`.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn variables(&self, group: &str) -> impl Iterator<Item = &str> {
        self.groups
            .get(group)
            .into_iter()
            .flat_map(|vars| vars.keys().map(String::as_str))
    }

    pub fn variable(&self, group: &str, variable: &str) -> Option<&VariableSchema> {
        self.groups.get(group)?.get(variable)
    }
}

/// Read access to an opened container.
pub trait ArrayContainer {
    fn schema(&self) -> &ContainerSchema;

    /// Read a whole variable as a flat row-major `f64` array.
    fn read_variable(&self, group: &str, variable: &str) -> ReadResult<Vec<f64>>;
}

/// Opens containers from paths.
pub trait ContainerOpener: Send + Sync {
    type Container: ArrayContainer;

    fn open(&self, path: &Path) -> ReadResult<Self::Container>;
}

/// Container held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    schema: ContainerSchema,
    data: HashMap<(String, String), Vec<f64>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable. `values` is row-major and must match `shape`.
    pub fn with_variable(
        mut self,
        group: &str,
        variable: &str,
        shape: Vec<usize>,
        values: Vec<f64>,
        attributes: BTreeMap<String, Value>,
    ) -> Self {
        self.schema
            .insert(group, variable, VariableSchema { shape, attributes });
        self.data
            .insert((group.to_string(), variable.to_string()), values);
        self
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.schema.add_group(group);
        self
    }
}

impl ArrayContainer for MemoryContainer {
    fn schema(&self) -> &ContainerSchema {
        &self.schema
    }

    fn read_variable(&self, group: &str, variable: &str) -> ReadResult<Vec<f64>> {
        self.data
            .get(&(group.to_string(), variable.to_string()))
            .cloned()
            .ok_or_else(|| ReadError::UnknownVariable {
                variable: variable.to_string(),
                group: group.to_string(),
            })
    }
}
