//! Locating dated product files.
//!
//! SMAP L3 files are named
//! `SMAP_L3_SM_P_<YYYYMMDD>_R<crid>_<version>.h5` and are usually stored in
//! one directory per day (`<root>/2015.04.01/...`).

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ReadError, ReadResult};

/// File name prefix of the standard 36 km product.
pub const SPL3SMP_PREFIX: &str = "SMAP_L3_SM_P_";
/// File name prefix of the enhanced 9 km product.
pub const SPL3SMP_E_PREFIX: &str = "SMAP_L3_SM_P_E_";

/// Finds the file of a given day below a root directory.
#[derive(Debug, Clone)]
pub struct FileLocator {
    root: PathBuf,
    subpath_template: Option<String>,
    prefix: String,
    extension: String,
    crid: Option<u32>,
}

impl FileLocator {
    /// Locator for the standard product in daily `%Y.%m.%d` folders.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            subpath_template: Some("%Y.%m.%d".to_string()),
            prefix: SPL3SMP_PREFIX.to_string(),
            extension: "h5".to_string(),
            crid: None,
        }
    }

    /// strftime template of the daily sub-directory; `None` for a flat layout.
    pub fn with_subpath(mut self, template: Option<&str>) -> Self {
        self.subpath_template = template.map(str::to_string);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Only accept files of one Composite Release ID.
    pub fn with_crid(mut self, crid: Option<u32>) -> Self {
        self.crid = crid;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn crid(&self) -> Option<u32> {
        self.crid
    }

    fn day_dir(&self, date: NaiveDate) -> PathBuf {
        match &self.subpath_template {
            Some(template) => self.root.join(date.format(template).to_string()),
            None => self.root.clone(),
        }
    }

    fn matches(&self, file_name: &str, date: NaiveDate) -> bool {
        self.date_of(file_name) == Some(date)
    }

    /// All files matching a date, sorted by path.
    pub fn candidates(&self, date: NaiveDate) -> Vec<PathBuf> {
        let dir = self.day_dir(date);
        let mut found: Vec<PathBuf> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| self.matches(name, date))
            })
            .map(|entry| entry.into_path())
            .collect();
        found.sort();
        found
    }

    /// The single file of a date.
    pub fn locate(&self, date: NaiveDate) -> ReadResult<PathBuf> {
        let mut candidates = self.candidates(date);
        debug!(date = %date, count = candidates.len(), "Located candidate files");

        match candidates.len() {
            0 => Err(ReadError::MissingImage {
                date,
                dir: self.day_dir(date),
            }),
            1 => Ok(candidates.remove(0)),
            _ => Err(ReadError::AmbiguousImage { date, candidates }),
        }
    }

    /// Date encoded in a file name, if it is a product file of this locator.
    ///
    /// Names look like `<prefix><YYYYMMDD>_R<crid>_<version>.<ext>`; the CRID
    /// must match as a whole number.
    fn date_of(&self, file_name: &str) -> Option<NaiveDate> {
        if !file_name.ends_with(&format!(".{}", self.extension)) {
            return None;
        }
        let rest = file_name.strip_prefix(&self.prefix)?;
        let date = NaiveDate::parse_from_str(rest.get(..8)?, "%Y%m%d").ok()?;
        let tail = rest.get(8..)?.strip_prefix('_')?;

        if let Some(crid) = self.crid {
            let digits = tail.strip_prefix('R')?;
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            if digits[..end].parse::<u32>().ok()? != crid {
                return None;
            }
        }
        Some(date)
    }

    /// All dates with at least one product file below the root, ascending.
    pub fn available_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.file_name().to_str().and_then(|n| self.date_of(n)))
            .collect();
        dates.sort();
        dates.dedup();
        dates
    }

    /// Latest date with a product file.
    pub fn last_available(&self) -> Option<NaiveDate> {
        self.available_dates().pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn touch(root: &Path, sub: &str, name: &str) {
        let dir = root.join(sub);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_locate_single_file() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "2015.04.01", "SMAP_L3_SM_P_20150401_R13080_001.h5");
        touch(tmp.path(), "2015.04.01", "SMAP_L3_SM_P_20150401_R13080_001.h5.iso.xml");

        let locator = FileLocator::new(tmp.path());
        let path = locator.locate(date(2015, 4, 1)).unwrap();
        assert!(path.ends_with("2015.04.01/SMAP_L3_SM_P_20150401_R13080_001.h5"));
    }

    #[test]
    fn test_missing_and_ambiguous() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "2015.04.01", "SMAP_L3_SM_P_20150401_R13080_001.h5");
        touch(tmp.path(), "2015.04.01", "SMAP_L3_SM_P_20150401_R14010_001.h5");

        let locator = FileLocator::new(tmp.path());
        let err = locator.locate(date(2015, 4, 2)).unwrap_err();
        assert!(err.is_missing());

        match locator.locate(date(2015, 4, 1)) {
            Err(ReadError::AmbiguousImage { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguous image, got {:?}", other),
        }
    }

    #[test]
    fn test_crid_filter() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "2015.04.01", "SMAP_L3_SM_P_20150401_R13080_001.h5");
        touch(tmp.path(), "2015.04.01", "SMAP_L3_SM_P_20150401_R14010_001.h5");

        let locator = FileLocator::new(tmp.path()).with_crid(Some(14010));
        let path = locator.locate(date(2015, 4, 1)).unwrap();
        assert!(path.to_string_lossy().contains("R14010"));
    }

    #[test]
    fn test_crid_matches_whole_number() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "2015.04.01", "SMAP_L3_SM_P_20150401_R13080_001.h5");

        let shorter = FileLocator::new(tmp.path()).with_crid(Some(1308));
        assert!(shorter.locate(date(2015, 4, 1)).unwrap_err().is_missing());
        assert!(shorter.available_dates().is_empty());

        let exact = FileLocator::new(tmp.path()).with_crid(Some(13080));
        assert!(exact.locate(date(2015, 4, 1)).is_ok());
    }

    #[test]
    fn test_enhanced_prefix_not_confused() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "2015.04.01", "SMAP_L3_SM_P_E_20150401_R13080_001.h5");

        let standard = FileLocator::new(tmp.path());
        assert!(standard.locate(date(2015, 4, 1)).is_err());

        let enhanced = FileLocator::new(tmp.path()).with_prefix(SPL3SMP_E_PREFIX);
        assert!(enhanced.locate(date(2015, 4, 1)).is_ok());
    }

    #[test]
    fn test_available_dates() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "2015.04.03", "SMAP_L3_SM_P_20150403_R13080_001.h5");
        touch(tmp.path(), "2015.04.01", "SMAP_L3_SM_P_20150401_R13080_001.h5");
        touch(tmp.path(), "2015.04.01", "README.txt");

        let locator = FileLocator::new(tmp.path());
        assert_eq!(locator.available_dates(), vec![date(2015, 4, 1), date(2015, 4, 3)]);
        assert_eq!(locator.last_available(), Some(date(2015, 4, 3)));
    }

    #[test]
    fn test_flat_layout() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "", "SMAP_L3_SM_P_20150401_R13080_001.h5");
        let locator = FileLocator::new(tmp.path()).with_subpath(None);
        assert!(locator.locate(date(2015, 4, 1)).is_ok());
    }
}
