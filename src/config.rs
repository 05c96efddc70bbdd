use crate::error::Result;
use crate::growth::GrowthPolicy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    #[schemars(
        description = "Unparseable measures become 0.0 and unparseable periods become unit 1; each substitution is recorded as a warning on the table."
    )]
    #[default]
    Lossy,

    #[schemars(description = "The first unparseable cell fails the dataset load.")]
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SheetFormat {
    /// Workbooks read directly (xlsx, xls, ods).
    #[default]
    Workbook,
    /// Sheets exported as `<dir>/<workbook stem>/<sheet>.csv`.
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DashboardConfig {
    #[serde(default)]
    #[schemars(description = "SQLite database used as the primary source. Without it every dataset is served from sheets.")]
    pub database_path: Option<PathBuf>,

    #[serde(default = "default_workbook_dir")]
    #[schemars(description = "Directory holding the fallback workbooks.")]
    pub workbook_dir: PathBuf,

    #[serde(default)]
    pub sheet_format: SheetFormat,

    #[serde(default)]
    pub parse_mode: ParseMode,

    #[serde(default)]
    #[schemars(description = "Per-dataset growth policy replacing the built-in one, keyed by dataset id.")]
    pub growth_overrides: BTreeMap<String, GrowthPolicy>,
}

fn default_workbook_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            workbook_dir: default_workbook_dir(),
            sheet_format: SheetFormat::default(),
            parse_mode: ParseMode::default(),
            growth_overrides: BTreeMap::new(),
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn growth_policy(&self, dataset: &str, default: GrowthPolicy) -> GrowthPolicy {
        self.growth_overrides.get(dataset).copied().unwrap_or(default)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DashboardConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::json_schema())
    }
}
