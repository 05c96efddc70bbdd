//! Declarative per-dataset descriptors.
//!
//! Each dataset of the dashboard is described once: where its rows come
//! from, which columns it must carry, how each measure is parsed and merged.
//! The loader, aggregator and growth engine are driven entirely by these
//! descriptors.

use crate::growth::GrowthPolicy;
use crate::numeric::NumberFormat;
use crate::period::PeriodKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    #[schemars(description = "Summed when rows for the same period are merged (e.g. total assets).")]
    Additive,

    #[schemars(
        description = "Averaged when rows for the same period are merged (e.g. loan-to-deposit ratio). Never summed."
    )]
    Ratio,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct KeywordMatch {
    #[schemars(description = "Substring the raw column name must contain.")]
    pub contains: String,

    #[serde(default)]
    #[schemars(description = "Substring the raw column name must not contain.")]
    pub excludes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ColumnSpec {
    #[schemars(description = "Canonical column name used throughout the pipeline.")]
    pub name: String,

    #[serde(default)]
    #[schemars(
        description = "Other raw names accepted for this column, including legacy names with trailing spaces."
    )]
    pub aliases: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Fallback lookup by keyword when no exact name or alias matches.")]
    pub keyword: Option<KeywordMatch>,
}

impl ColumnSpec {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            keyword: None,
        }
    }

    pub fn with_aliases(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            keyword: None,
        }
    }

    pub fn by_keyword(name: &str, contains: &str, excludes: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            keyword: Some(KeywordMatch {
                contains: contains.to_string(),
                excludes: excludes.map(str::to_string),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DimensionRole {
    Region,
    Category,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct DimensionSpec {
    pub column: ColumnSpec,
    pub role: DimensionRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Normalization {
    #[schemars(description = "Values below `min` or above `max` are implausible and become 0.")]
    ZeroOutside { min: f64, max: f64 },

    #[schemars(description = "Values above 1 are percentages and are divided by 100 to become fractions.")]
    PercentToFraction,
}

impl Normalization {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Self::ZeroOutside { min, max } => {
                if value < *min || value > *max {
                    0.0
                } else {
                    value
                }
            }
            Self::PercentToFraction => {
                if value > 1.0 {
                    value / 100.0
                } else {
                    value
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MeasureSpec {
    pub column: ColumnSpec,
    pub kind: MeasureKind,

    #[serde(default)]
    pub format: NumberFormat,

    #[serde(default)]
    pub normalization: Option<Normalization>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum TableNormalization {
    #[schemars(
        description = "When the column maximum exceeds `threshold`, every value is divided by `divisor` (e.g. Rupiah to billions)."
    )]
    ScaleWhenMaxExceeds {
        measure: String,
        threshold: f64,
        divisor: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Derivation {
    /// Sum of other measures of the same aggregated row.
    Sum { of: Vec<String> },
    Alias { of: String },
    /// `numerator / denominator * 100`, 0 when the denominator is 0.
    RatioPct { numerator: String, denominator: String },
    /// `numerator / denominator`, 0 when the denominator is 0.
    Quotient { numerator: String, denominator: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct DerivedMeasure {
    pub name: String,
    pub kind: MeasureKind,
    pub derivation: Derivation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "axis", rename_all = "snake_case")]
pub enum TimeAxis {
    Timed {
        year: ColumnSpec,
        #[serde(default)]
        period: Option<ColumnSpec>,
        kind: PeriodKind,
    },
    Untimed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum RowFilter {
    #[schemars(description = "Keep rows whose column contains `needle`, compared case-insensitively.")]
    Contains { column: String, needle: String },
}

impl RowFilter {
    pub fn column(&self) -> &str {
        match self {
            Self::Contains { column, .. } => column,
        }
    }

    pub fn keeps(&self, value: Option<&str>) -> bool {
        match self {
            Self::Contains { needle, .. } => value
                .map(|v| v.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct UnitSplit {
    #[schemars(description = "Melted column holding text like 'Padi (Ton)'.")]
    pub source: String,
    pub name: String,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Reshape {
    #[schemars(
        description = "Wide sheet with a multi-level header. The id column is the one whose last header level equals `id_label`; every other column becomes one row per data row, its header levels spread into `level_columns`."
    )]
    MeltMultiHeader {
        id_label: String,
        id_column: String,
        level_columns: Vec<String>,
        value_column: String,
        #[serde(default)]
        split_unit: Option<UnitSplit>,
    },

    #[schemars(
        description = "Wide sheet with one id column (the first) and one value column per variable (e.g. location)."
    )]
    MeltColumns {
        id_column: String,
        variable_column: String,
        value_column: String,
        #[serde(default)]
        exclude_columns: Vec<String>,
        #[serde(default)]
        drop_ids: Vec<String>,
        #[serde(default)]
        drop_date_like_ids: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MetadataCell {
    pub key: String,
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SheetLayout {
    #[schemars(description = "Workbook file name, relative to the configured workbook directory.")]
    pub workbook: String,
    pub sheet: String,

    #[serde(default)]
    #[schemars(description = "Rows above the header that are not data (metadata block).")]
    pub skip_rows: usize,

    #[serde(default = "default_header_rows")]
    pub header_rows: usize,

    #[serde(default)]
    pub metadata: Vec<MetadataCell>,

    #[serde(default)]
    pub reshape: Option<Reshape>,
}

fn default_header_rows() -> usize {
    1
}

impl SheetLayout {
    pub fn simple(workbook: &str, sheet: &str) -> Self {
        Self {
            workbook: workbook.to_string(),
            sheet: sheet.to_string(),
            skip_rows: 0,
            header_rows: 1,
            metadata: Vec::new(),
            reshape: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct DatasetSchema {
    #[schemars(description = "Stable identifier, also the cache key.")]
    pub id: String,
    pub title: String,

    #[serde(default)]
    #[schemars(description = "Read-only SQL for the primary source. None means the dataset is spreadsheet-only.")]
    pub query: Option<String>,

    pub sheet: SheetLayout,
    pub time: TimeAxis,

    #[serde(default)]
    pub dimensions: Vec<DimensionSpec>,
    pub measures: Vec<MeasureSpec>,

    #[serde(default)]
    pub derived: Vec<DerivedMeasure>,

    #[serde(default)]
    pub row_filters: Vec<RowFilter>,

    #[serde(default)]
    pub table_normalizations: Vec<TableNormalization>,

    #[serde(default)]
    #[schemars(description = "Drop rows whose region dimensions are blank.")]
    pub drop_blank_dimensions: bool,

    #[serde(default)]
    pub growth: GrowthPolicy,
}

impl DatasetSchema {
    pub fn period_kind(&self) -> Option<PeriodKind> {
        match &self.time {
            TimeAxis::Timed { kind, .. } => Some(*kind),
            TimeAxis::Untimed => None,
        }
    }

    pub fn measure_kind(&self, name: &str) -> Option<MeasureKind> {
        self.measures
            .iter()
            .find(|m| m.column.name == name)
            .map(|m| m.kind)
            .or_else(|| self.derived.iter().find(|d| d.name == name).map(|d| d.kind))
    }

    /// Every column the normalized table must expose, in declaration order.
    pub fn expected_columns(&self) -> Vec<&ColumnSpec> {
        let mut cols: Vec<&ColumnSpec> = Vec::new();
        cols.extend(self.dimensions.iter().map(|d| &d.column));
        if let TimeAxis::Timed { year, period, .. } = &self.time {
            cols.push(year);
            if let Some(period) = period {
                cols.push(period);
            }
        }
        cols.extend(self.measures.iter().map(|m| &m.column));
        cols
    }

    pub fn dimensions_with_role(&self, role: DimensionRole) -> Vec<&str> {
        self.dimensions
            .iter()
            .filter(|d| d.role == role)
            .map(|d| d.column.name.as_str())
            .collect()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DatasetSchema)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
