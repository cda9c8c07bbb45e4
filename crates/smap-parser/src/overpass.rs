//! Overpass selection and variable naming.
//!
//! Dual-overpass products store the descending (AM, 6 a.m. local) and the
//! ascending (PM, 6 p.m. local) retrievals in separate groups. Variables of
//! the PM group carry a `_pm` suffix in the file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::container::ContainerSchema;
use crate::error::{ReadError, ReadResult};

/// Group of single-overpass products.
pub const SINGLE_GROUP: &str = "Soil_Moisture_Retrieval_Data";
/// Group of the descending (AM) overpass.
pub const AM_GROUP: &str = "Soil_Moisture_Retrieval_Data_AM";
/// Group of the ascending (PM) overpass.
pub const PM_GROUP: &str = "Soil_Moisture_Retrieval_Data_PM";

/// Which overpass of a product to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overpass {
    /// No selection: the product must carry a single overpass.
    None,
    #[default]
    Am,
    Pm,
    /// Both overpasses on a shared time axis, suffixed `_am`/`_pm`.
    Both,
}

impl Overpass {
    /// Parse an overpass by its group name; orbit directions are not accepted.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "" => Some(Self::None),
            "am" => Some(Self::Am),
            "pm" => Some(Self::Pm),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Am => "am",
            Self::Pm => "pm",
            Self::Both => "both",
        }
    }
}

impl std::fmt::Display for Overpass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One group to read variables from, with its naming rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub group: String,
    /// Suffix of variable names inside the file.
    source_suffix: &'static str,
    /// Suffix appended to output names.
    output_suffix: &'static str,
}

fn with_suffix(name: &str, suffix: &str) -> String {
    if suffix.is_empty() || name.ends_with(suffix) {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}

impl Layer {
    fn new(group: &str, source_suffix: &'static str, output_suffix: &'static str) -> Self {
        Self {
            group: group.to_string(),
            source_suffix,
            output_suffix,
        }
    }

    /// Name of a requested variable inside the container.
    pub fn source_name(&self, variable: &str) -> String {
        with_suffix(variable, self.source_suffix)
    }

    /// Name of a requested variable in the produced image.
    pub fn output_name(&self, variable: &str) -> String {
        with_suffix(variable, self.output_suffix)
    }
}

fn am_layer(rename: bool) -> Layer {
    Layer::new(AM_GROUP, "", if rename { "_am" } else { "" })
}

fn pm_layer(rename: bool) -> Layer {
    Layer::new(PM_GROUP, "_pm", if rename { "_pm" } else { "" })
}

/// Resolve the layers to read for an overpass selection.
///
/// AM output names are only suffixed when both overpasses are read; PM
/// names keep `_pm` when `rename` is set.
pub fn resolve_layers(
    schema: &ContainerSchema,
    overpass: Overpass,
    rename: bool,
    path: &Path,
) -> ReadResult<Vec<Layer>> {
    let require = |group: &str| {
        if schema.has_group(group) {
            Ok(())
        } else {
            Err(ReadError::MissingOverpass {
                group: group.to_string(),
                path: path.to_path_buf(),
            })
        }
    };

    match overpass {
        Overpass::Am => {
            require(AM_GROUP)?;
            Ok(vec![Layer::new(AM_GROUP, "", "")])
        }
        Overpass::Pm => {
            require(PM_GROUP)?;
            Ok(vec![pm_layer(rename)])
        }
        Overpass::Both => {
            require(AM_GROUP)?;
            require(PM_GROUP)?;
            Ok(vec![am_layer(true), pm_layer(true)])
        }
        Overpass::None => {
            let found: Vec<String> = [AM_GROUP, PM_GROUP]
                .into_iter()
                .filter(|g| schema.has_group(g))
                .map(str::to_string)
                .collect();

            match found.len() {
                0 => {
                    require(SINGLE_GROUP)?;
                    if rename {
                        warn!(path = %path.display(), "Renaming needs an overpass, keeping variable names");
                    }
                    Ok(vec![Layer::new(SINGLE_GROUP, "", "")])
                }
                1 if found[0] == AM_GROUP => Ok(vec![Layer::new(AM_GROUP, "", "")]),
                1 => Ok(vec![pm_layer(rename)]),
                _ => Err(ReadError::AmbiguousOverpass {
                    path: path.to_path_buf(),
                    found,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(groups: &[&str]) -> ContainerSchema {
        let mut schema = ContainerSchema::new();
        for g in groups {
            schema.add_group(g);
        }
        schema
    }

    fn resolve(groups: &[&str], overpass: Overpass, rename: bool) -> ReadResult<Vec<Layer>> {
        resolve_layers(&schema(groups), overpass, rename, Path::new("x.h5"))
    }

    #[test]
    fn test_am_keeps_names() {
        let layers = resolve(&[AM_GROUP, PM_GROUP], Overpass::Am, true).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].source_name("soil_moisture"), "soil_moisture");
        assert_eq!(layers[0].output_name("soil_moisture"), "soil_moisture");
    }

    #[test]
    fn test_pm_rename() {
        let layers = resolve(&[AM_GROUP, PM_GROUP], Overpass::Pm, true).unwrap();
        assert_eq!(layers[0].group, PM_GROUP);
        assert_eq!(layers[0].source_name("soil_moisture"), "soil_moisture_pm");
        assert_eq!(layers[0].output_name("soil_moisture"), "soil_moisture_pm");

        let layers = resolve(&[AM_GROUP, PM_GROUP], Overpass::Pm, false).unwrap();
        assert_eq!(layers[0].output_name("soil_moisture"), "soil_moisture");
    }

    #[test]
    fn test_pm_suffix_not_doubled() {
        let layers = resolve(&[PM_GROUP], Overpass::Pm, true).unwrap();
        assert_eq!(layers[0].source_name("soil_moisture_pm"), "soil_moisture_pm");
        assert_eq!(layers[0].output_name("soil_moisture_pm"), "soil_moisture_pm");
    }

    #[test]
    fn test_both_suffixes_always() {
        let layers = resolve(&[AM_GROUP, PM_GROUP], Overpass::Both, false).unwrap();
        let names: Vec<String> = layers.iter().map(|l| l.output_name("tb")).collect();
        assert_eq!(names, vec!["tb_am", "tb_pm"]);
    }

    #[test]
    fn test_none_requires_single_overpass() {
        assert!(matches!(
            resolve(&[AM_GROUP, PM_GROUP], Overpass::None, false),
            Err(ReadError::AmbiguousOverpass { .. })
        ));

        let layers = resolve(&[SINGLE_GROUP], Overpass::None, true).unwrap();
        assert_eq!(layers[0].group, SINGLE_GROUP);
        assert_eq!(layers[0].output_name("sm"), "sm");

        let layers = resolve(&[PM_GROUP], Overpass::None, false).unwrap();
        assert_eq!(layers[0].source_name("sm"), "sm_pm");
    }

    #[test]
    fn test_missing_group() {
        assert!(matches!(
            resolve(&[AM_GROUP], Overpass::Pm, false),
            Err(ReadError::MissingOverpass { .. })
        ));
        assert!(matches!(resolve(&[], Overpass::None, false), Err(ReadError::MissingOverpass { .. })));
    }

    #[test]
    fn test_from_str() {
        assert_eq!(Overpass::from_str("AM"), Some(Overpass::Am));
        assert_eq!(Overpass::from_str("Pm"), Some(Overpass::Pm));
        assert_eq!(Overpass::from_str("both"), Some(Overpass::Both));
        assert_eq!(Overpass::from_str("noon"), None);
    }

    #[test]
    fn test_orbit_direction_names_rejected() {
        assert_eq!(Overpass::from_str("ascending"), None);
        assert_eq!(Overpass::from_str("descending"), None);
    }
}
