//! SMAP-layout fixture files.
//!
//! Files mimic the SPL3SMP layout: one group per overpass holding `[y, x]`
//! float32 variables with `_FillValue = -9999`, PM variables suffixed `_pm`.
//! They are written through netCDF-4, which stores them as HDF5.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Fill value of SMAP float variables.
pub const FILL_VALUE: f32 = -9999.0;

pub const AM_GROUP: &str = "Soil_Moisture_Retrieval_Data_AM";
pub const PM_GROUP: &str = "Soil_Moisture_Retrieval_Data_PM";
pub const SINGLE_GROUP: &str = "Soil_Moisture_Retrieval_Data";

/// Builder of one SMAP-like file.
#[derive(Debug, Clone)]
pub struct SmapFileBuilder {
    rows: usize,
    cols: usize,
    groups: Vec<(String, Vec<(String, Vec<f32>)>)>,
}

impl SmapFileBuilder {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            groups: Vec::new(),
        }
    }

    /// Add a group with row-major `rows x cols` variables.
    pub fn group(mut self, group: &str, variables: &[(&str, Vec<f32>)]) -> Self {
        let variables = variables
            .iter()
            .map(|(name, values)| {
                assert_eq!(values.len(), self.rows * self.cols, "bad size for {}", name);
                (name.to_string(), values.clone())
            })
            .collect();
        self.groups.push((group.to_string(), variables));
        self
    }

    pub fn write(&self, path: &Path) -> Result<(), netcdf::Error> {
        let mut file = netcdf::create(path)?;
        file.add_attribute("ShortName", "SPL3SMP")?;

        for (group_name, variables) in &self.groups {
            let mut group = file.add_group(group_name)?;
            group.add_dimension("y", self.rows)?;
            group.add_dimension("x", self.cols)?;

            for (name, values) in variables {
                let mut var = group.add_variable::<f32>(name, &["y", "x"])?;
                var.set_fill_value(FILL_VALUE)?;
                if name.starts_with("soil_moisture") {
                    var.put_attribute("units", "cm**3/cm**3")?;
                    var.put_attribute("valid_min", 0.02f32)?;
                    var.put_attribute("valid_max", 0.5f32)?;
                }
                var.put_attribute("long_name", name.as_str())?;
                var.put_values(values, ..)?;
            }
        }

        Ok(())
    }
}

/// Directory tree of daily SMAP files.
#[derive(Debug, Clone)]
pub struct SmapArchiveFixture {
    root: PathBuf,
    crid: u32,
}

impl SmapArchiveFixture {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            crid: 13080,
        }
    }

    pub fn with_crid(mut self, crid: u32) -> Self {
        self.crid = crid;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a day's file, creating its `%Y.%m.%d` folder.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        let dir = self.root.join(date.format("%Y.%m.%d").to_string());
        fs::create_dir_all(&dir).expect("create fixture folder");
        dir.join(format!(
            "SMAP_L3_SM_P_{}_R{}_001.h5",
            date.format("%Y%m%d"),
            self.crid
        ))
    }

    pub fn write_day(&self, date: NaiveDate, file: &SmapFileBuilder) -> PathBuf {
        let path = self.path_for(date);
        file.write(&path).expect("write fixture file");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = SmapArchiveFixture::new(tmp.path()).with_crid(14010);
        let path = fixture.path_for(NaiveDate::from_ymd_opt(2015, 4, 1).unwrap());
        assert!(path.ends_with("2015.04.01/SMAP_L3_SM_P_20150401_R14010_001.h5"));
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn test_write_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f.h5");
        SmapFileBuilder::new(2, 2)
            .group(AM_GROUP, &[("soil_moisture", vec![0.1, 0.2, 0.3, FILL_VALUE])])
            .write(&path)
            .unwrap();
        assert!(path.exists());
    }
}
