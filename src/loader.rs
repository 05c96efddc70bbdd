//! Source loading with fallback, and normalization into a
//! [`CanonicalTable`].
//!
//! The primary source is tried first. When it fails, or none of its rows
//! survive normalization, the secondary source is tried. Both sources go
//! through the same normalization, so callers cannot tell which one served
//! the rows except through
//! [`CanonicalTable::served_by`].

use crate::config::{DashboardConfig, ParseMode, SheetFormat};
use crate::error::{DashboardError, Result};
use crate::numeric::CellValue;
use crate::schema::{ColumnSpec, DatasetSchema, DimensionRole, TableNormalization, TimeAxis};
use crate::source::{CsvSource, InMemorySource, RawTable, SqliteSource, TabularSource, WorkbookSource};
use crate::table::{CanonicalRecord, CanonicalTable, ParseWarning};
use crate::period::PeriodKey;
use crate::utils::{extract_year, is_valid_year};
use log::{debug, info, warn};
use std::collections::BTreeMap;

pub struct SourceLoader {
    primary: Box<dyn TabularSource>,
    secondary: Box<dyn TabularSource>,
    parse_mode: ParseMode,
}

impl SourceLoader {
    pub fn new(primary: Box<dyn TabularSource>, secondary: Box<dyn TabularSource>) -> Self {
        Self {
            primary,
            secondary,
            parse_mode: ParseMode::default(),
        }
    }

    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }

    /// SQLite when a database is configured, otherwise every dataset is
    /// served by the sheets.
    pub fn from_config(config: &DashboardConfig) -> Self {
        let primary: Box<dyn TabularSource> = match &config.database_path {
            Some(path) => Box::new(SqliteSource::new(path)),
            None => Box::new(InMemorySource::new("database")),
        };
        let secondary: Box<dyn TabularSource> = match config.sheet_format {
            SheetFormat::Workbook => Box::new(WorkbookSource::new(&config.workbook_dir)),
            SheetFormat::Csv => Box::new(CsvSource::new(&config.workbook_dir)),
        };
        Self::new(primary, secondary).with_parse_mode(config.parse_mode)
    }

    pub fn load(&self, schema: &DatasetSchema) -> Result<CanonicalTable> {
        let primary = match self.load_from(self.primary.as_ref(), schema)? {
            Ok(table) => return Ok(table),
            Err(reason) => reason,
        };
        warn!(
            "Primary source '{}' unusable for '{}' ({}), trying '{}'",
            self.primary.name(),
            schema.id,
            primary,
            self.secondary.name()
        );

        let secondary = match self.load_from(self.secondary.as_ref(), schema)? {
            Ok(table) => return Ok(table),
            Err(reason) => reason,
        };
        warn!(
            "Secondary source '{}' unusable for '{}' ({})",
            self.secondary.name(),
            schema.id,
            secondary
        );

        Err(DashboardError::DataUnavailable {
            dataset: schema.id.clone(),
            primary,
            secondary,
        })
    }

    /// The inner `Err` is a source that delivered nothing usable and lets
    /// the caller move on; the outer one is fatal.
    fn load_from(
        &self,
        source: &dyn TabularSource,
        schema: &DatasetSchema,
    ) -> Result<std::result::Result<CanonicalTable, String>> {
        let raw = match fetch_non_empty(source, schema) {
            Ok(raw) => raw,
            Err(reason) => return Ok(Err(reason)),
        };
        let fetched = raw.rows.len();
        let table = self.normalize(schema, raw, source.name())?;
        if table.is_empty() {
            return Ok(Err(format!("none of {} rows survived normalization", fetched)));
        }
        Ok(Ok(table))
    }

    /// Renames, validates and parses a raw table. Missing columns are fatal
    /// whichever source delivered the rows.
    pub fn normalize(&self, schema: &DatasetSchema, raw: RawTable, served_by: &str) -> Result<CanonicalTable> {
        let columns = ColumnIndex::resolve(schema, &raw.columns)?;
        let mut warnings = Vec::new();
        let mut records = Vec::with_capacity(raw.rows.len());
        let mut skipped = 0usize;

        'rows: for (row_idx, row) in raw.rows.iter().enumerate() {
            let cell = |name: &str| columns.cell(row, name);

            for filter in &schema.row_filters {
                if !filter.keeps(cell(filter.column()).as_label().as_deref()) {
                    continue 'rows;
                }
            }

            let (period, period_label) = match &schema.time {
                TimeAxis::Untimed => (None, None),
                TimeAxis::Timed { year, period, kind } => {
                    let Some(year_value) = parse_year(cell(&year.name)) else {
                        skipped += 1;
                        continue;
                    };
                    let (unit, label) = match period {
                        None => (1, None),
                        Some(spec) => {
                            let raw_period = cell(&spec.name);
                            let unit = match kind.try_resolve(raw_period) {
                                Some(unit) => unit,
                                None => {
                                    self.substitute(schema, row_idx, &spec.name, raw_period, "1", &mut warnings)?;
                                    1
                                }
                            };
                            (unit, raw_period.as_label())
                        }
                    };
                    let Some(key) = PeriodKey::new(*kind, year_value, unit) else {
                        skipped += 1;
                        continue;
                    };
                    (Some(key), label)
                }
            };

            let dimensions: BTreeMap<String, Option<String>> = schema
                .dimensions
                .iter()
                .map(|d| (d.column.name.clone(), cell(&d.column.name).as_label()))
                .collect();

            if schema.drop_blank_dimensions
                && schema
                    .dimensions_with_role(DimensionRole::Region)
                    .iter()
                    .any(|name| dimensions.get(*name).map_or(true, Option::is_none))
            {
                skipped += 1;
                continue;
            }

            let mut measures = BTreeMap::new();
            for spec in &schema.measures {
                let raw_value = cell(&spec.column.name);
                let parsed = match spec.format.try_parse(raw_value) {
                    Some(v) => v,
                    // Blank cells are absent data, not malformed data.
                    None if raw_value.is_empty() => 0.0,
                    None => {
                        self.substitute(schema, row_idx, &spec.column.name, raw_value, "0.0", &mut warnings)?;
                        0.0
                    }
                };
                let value = match &spec.normalization {
                    Some(rule) => rule.apply(parsed),
                    None => parsed,
                };
                measures.insert(spec.column.name.clone(), value);
            }

            records.push(CanonicalRecord {
                dimensions,
                period,
                period_label,
                measures,
            });
        }

        for rule in &schema.table_normalizations {
            apply_table_normalization(rule, &mut records);
        }

        if skipped > 0 {
            debug!("Dropped {} rows of '{}' without a usable year or region", skipped, schema.id);
        }
        if !warnings.is_empty() {
            warn!("{} cells of '{}' could not be parsed and were substituted", warnings.len(), schema.id);
        }
        info!("Loaded {} rows for '{}' from {}", records.len(), schema.id, served_by);

        let mut measure_kinds: BTreeMap<_, _> = schema
            .measures
            .iter()
            .map(|m| (m.column.name.clone(), m.kind))
            .collect();
        measure_kinds.extend(schema.derived.iter().map(|d| (d.name.clone(), d.kind)));

        Ok(CanonicalTable {
            dataset: schema.id.clone(),
            kind: schema.period_kind(),
            measure_kinds,
            derived: schema.derived.clone(),
            records,
            served_by: served_by.to_string(),
            warnings,
            metadata: raw.metadata,
        })
    }

    fn substitute(
        &self,
        schema: &DatasetSchema,
        row: usize,
        column: &str,
        value: &CellValue,
        substituted: &str,
        warnings: &mut Vec<ParseWarning>,
    ) -> Result<()> {
        match self.parse_mode {
            ParseMode::Strict => Err(DashboardError::StrictParse {
                dataset: schema.id.clone(),
                row,
                column: column.to_string(),
                value: value.to_string(),
            }),
            ParseMode::Lossy => {
                warnings.push(ParseWarning {
                    row,
                    column: column.to_string(),
                    value: value.to_string(),
                    substituted: substituted.to_string(),
                });
                Ok(())
            }
        }
    }
}

fn fetch_non_empty(source: &dyn TabularSource, schema: &DatasetSchema) -> std::result::Result<RawTable, String> {
    match source.fetch(schema) {
        Ok(raw) if raw.is_empty() => Err("no rows".to_string()),
        Ok(raw) => {
            debug!("Source '{}' returned {} rows for '{}'", source.name(), raw.rows.len(), schema.id);
            Ok(raw)
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Trims, removes quotes and line breaks, and collapses inner whitespace.
pub fn normalize_column_name(raw: &str) -> String {
    raw.replace(['\r', '\n'], " ")
        .replace('"', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical column name → position in the raw table.
struct ColumnIndex {
    positions: BTreeMap<String, usize>,
}

impl ColumnIndex {
    fn resolve(schema: &DatasetSchema, raw_columns: &[String]) -> Result<Self> {
        let names: Vec<String> = raw_columns.iter().map(|c| normalize_column_name(c)).collect();
        let mut positions = BTreeMap::new();
        let mut missing = Vec::new();

        let filter_columns: Vec<ColumnSpec> = schema
            .row_filters
            .iter()
            .map(|f| ColumnSpec::named(f.column()))
            .collect();

        for spec in schema.expected_columns().into_iter().chain(filter_columns.iter()) {
            if positions.contains_key(&spec.name) {
                continue;
            }
            match find_column(&names, spec) {
                Some(idx) => {
                    positions.insert(spec.name.clone(), idx);
                }
                None => missing.push(spec.name.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(DashboardError::MissingColumns {
                dataset: schema.id.clone(),
                missing,
            });
        }
        Ok(Self { positions })
    }

    fn cell<'r>(&self, row: &'r [CellValue], name: &str) -> &'r CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        self.positions
            .get(name)
            .and_then(|idx| row.get(*idx))
            .unwrap_or(EMPTY)
    }
}

/// Exact name or alias first, then the same case-insensitively, then the
/// keyword matcher.
fn find_column(names: &[String], spec: &ColumnSpec) -> Option<usize> {
    let candidates: Vec<String> = std::iter::once(&spec.name)
        .chain(spec.aliases.iter())
        .map(|c| normalize_column_name(c))
        .collect();

    names
        .iter()
        .position(|n| candidates.contains(n))
        .or_else(|| {
            names
                .iter()
                .position(|n| candidates.iter().any(|c| c.eq_ignore_ascii_case(n)))
        })
        .or_else(|| {
            let keyword = spec.keyword.as_ref()?;
            let contains = keyword.contains.to_lowercase();
            let excludes = keyword.excludes.as_ref().map(|e| e.to_lowercase());
            names.iter().position(|n| {
                let lower = n.to_lowercase();
                lower.contains(&contains) && excludes.as_ref().map_or(true, |e| !lower.contains(e))
            })
        })
}

/// Years come as integers, floats (`2024.0`) or text containing a 4-digit
/// year.
fn parse_year(cell: &CellValue) -> Option<i32> {
    let year = match cell {
        CellValue::Int(v) => *v,
        CellValue::Float(v) if v.is_finite() => v.trunc() as i64,
        CellValue::Float(_) | CellValue::Empty => return None,
        CellValue::Text(s) => extract_year(s)? as i64,
    };
    is_valid_year(year).then_some(year as i32)
}

fn apply_table_normalization(rule: &TableNormalization, records: &mut [CanonicalRecord]) {
    match rule {
        TableNormalization::ScaleWhenMaxExceeds {
            measure,
            threshold,
            divisor,
        } => {
            let max = records
                .iter()
                .filter_map(|r| r.measures.get(measure))
                .fold(f64::NEG_INFINITY, |a, b| a.max(*b));
            if max > *threshold && *divisor != 0.0 {
                debug!("Scaling '{}' by 1/{} (max {})", measure, divisor, max);
                for record in records.iter_mut() {
                    if let Some(v) = record.measures.get_mut(measure) {
                        *v /= divisor;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::NumberFormat;
    use crate::period::PeriodKind;
    use crate::schema::{DimensionSpec, MeasureKind, MeasureSpec, RowFilter, SheetLayout};

    fn text(s: &str) -> CellValue {
        CellValue::text(s)
    }

    fn schema() -> DatasetSchema {
        DatasetSchema {
            id: "sample".to_string(),
            title: "Sample".to_string(),
            query: Some("SELECT * FROM sample".to_string()),
            sheet: SheetLayout::simple("Sample.xlsx", "S"),
            time: TimeAxis::Timed {
                year: ColumnSpec::named("Tahun"),
                period: Some(ColumnSpec::named("Bulan")),
                kind: PeriodKind::Month,
            },
            dimensions: vec![DimensionSpec {
                column: ColumnSpec::named("Provinsi"),
                role: DimensionRole::Region,
            }],
            measures: vec![
                MeasureSpec {
                    column: ColumnSpec::with_aliases("Total DPK", &["Total DPK "]),
                    kind: MeasureKind::Additive,
                    format: NumberFormat::Localized,
                    normalization: None,
                },
                MeasureSpec {
                    column: ColumnSpec::named("LDR"),
                    kind: MeasureKind::Ratio,
                    format: NumberFormat::Percent,
                    normalization: None,
                },
            ],
            derived: Vec::new(),
            row_filters: Vec::new(),
            table_normalizations: Vec::new(),
            drop_blank_dimensions: false,
            growth: Default::default(),
        }
    }

    fn raw() -> RawTable {
        RawTable::new(
            vec![
                "Provinsi".to_string(),
                "Tahun".to_string(),
                "Bulan".to_string(),
                "Total DPK ".to_string(),
                "LDR".to_string(),
            ],
            vec![
                vec![text("Aceh"), CellValue::Int(2024), text("Mar"), text("1.234,5"), text("85,2%")],
                vec![text("Aceh"), text("2024"), text("xyz"), text("??"), CellValue::Float(0.9)],
            ],
        )
    }

    fn loader(primary: InMemorySource, secondary: InMemorySource) -> SourceLoader {
        SourceLoader::new(Box::new(primary), Box::new(secondary))
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name(" Total\r\nDPK  "), "Total DPK");
        assert_eq!(normalize_column_name("\"Kredit \""), "Kredit");
    }

    #[test]
    fn test_primary_serves_when_non_empty() {
        let l = loader(
            InMemorySource::new("database").with_table("sample", raw()),
            InMemorySource::new("workbook"),
        );
        let t = l.load(&schema()).unwrap();
        assert_eq!(t.served_by, "database");
        assert_eq!(t.len(), 2);
        let first = &t.records[0];
        assert_eq!(first.unit(), Some(3));
        assert!((first.measure("Total DPK") - 1234.5).abs() < 1e-9);
        assert!((first.measure("LDR") - 85.2).abs() < 1e-9);
        assert_eq!(first.period_label.as_deref(), Some("Mar"));
    }

    #[test]
    fn test_lossy_substitution_is_recorded() {
        let l = loader(
            InMemorySource::new("database").with_table("sample", raw()),
            InMemorySource::new("workbook"),
        );
        let t = l.load(&schema()).unwrap();
        let second = &t.records[1];
        assert_eq!(second.unit(), Some(1));
        assert_eq!(second.measure("Total DPK"), 0.0);
        assert_eq!(t.warnings.len(), 2);
        assert_eq!(t.warnings[0].column, "Bulan");
        assert_eq!(t.warnings[1].substituted, "0.0");
    }

    #[test]
    fn test_strict_mode_fails_on_first_bad_cell() {
        let l = loader(
            InMemorySource::new("database").with_table("sample", raw()),
            InMemorySource::new("workbook"),
        )
        .with_parse_mode(ParseMode::Strict);
        match l.load(&schema()) {
            Err(DashboardError::StrictParse { row, column, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "Bulan");
            }
            other => panic!("expected a strict parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_primary_falls_back() {
        let l = loader(
            InMemorySource::new("database").with_table("sample", RawTable::new(raw().columns, Vec::new())),
            InMemorySource::new("workbook").with_table("sample", raw()),
        );
        assert_eq!(l.load(&schema()).unwrap().served_by, "workbook");
    }

    #[test]
    fn test_rows_without_a_valid_year_count_as_empty() {
        let mut unusable = raw();
        for row in &mut unusable.rows {
            row[1] = text("n/a");
        }
        let l = loader(
            InMemorySource::new("database").with_table("sample", unusable.clone()),
            InMemorySource::new("workbook").with_table("sample", raw()),
        );
        let t = l.load(&schema()).unwrap();
        assert_eq!(t.served_by, "workbook");
        assert_eq!(t.len(), 2);

        let l = loader(
            InMemorySource::new("database").with_table("sample", unusable.clone()),
            InMemorySource::new("workbook").with_table("sample", unusable),
        );
        match l.load(&schema()) {
            Err(DashboardError::DataUnavailable { primary, secondary, .. }) => {
                assert!(primary.contains("survived normalization"));
                assert!(secondary.contains("survived normalization"));
            }
            other => panic!("expected unavailable data, got {:?}", other),
        }
    }

    #[test]
    fn test_both_sources_failing_is_data_unavailable() {
        let l = loader(InMemorySource::new("database"), InMemorySource::new("workbook"));
        let err = l.load(&schema()).unwrap_err();
        assert!(err.is_dataset_failure());
        match err {
            DashboardError::DataUnavailable { primary, secondary, .. } => {
                assert!(primary.contains("no table"));
                assert!(secondary.contains("no table"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_columns_are_fatal() {
        let mut table = raw();
        table.columns[4] = "Loan to Deposit".to_string();
        let l = loader(
            InMemorySource::new("database").with_table("sample", table),
            InMemorySource::new("workbook").with_table("sample", raw()),
        );
        match l.load(&schema()) {
            Err(DashboardError::MissingColumns { missing, .. }) => assert_eq!(missing, vec!["LDR"]),
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_keyword_columns() {
        let names = vec![
            "Nominal NPL Net".to_string(),
            "Nominal NPL".to_string(),
            "Nominal Kredit UMKM".to_string(),
        ];
        let npl = ColumnSpec::by_keyword("Nominal NPL", "nominal npl", Some("net"));
        assert_eq!(find_column(&names, &npl), Some(1));
        let kredit = ColumnSpec::by_keyword("Nominal Kredit", "nominal kredit", None);
        assert_eq!(find_column(&names, &kredit), Some(2));
        assert_eq!(find_column(&names, &ColumnSpec::named("nominal npl net")), Some(0));
    }

    #[test]
    fn test_row_filters_blank_regions_and_scaling() {
        let mut s = schema();
        s.dimensions.push(DimensionSpec {
            column: ColumnSpec::named("Jenis Bank"),
            role: DimensionRole::Category,
        });
        s.row_filters = vec![RowFilter::Contains {
            column: "Jenis Bank".to_string(),
            needle: "bank umum".to_string(),
        }];
        s.drop_blank_dimensions = true;
        s.table_normalizations = vec![TableNormalization::ScaleWhenMaxExceeds {
            measure: "Total DPK".to_string(),
            threshold: 1e9,
            divisor: 1e9,
        }];

        let table = RawTable::new(
            vec![
                "Provinsi".to_string(),
                "Tahun".to_string(),
                "Bulan".to_string(),
                "Total DPK".to_string(),
                "LDR".to_string(),
                "Jenis Bank".to_string(),
            ],
            vec![
                vec![text("Aceh"), CellValue::Int(2024), CellValue::Int(1), CellValue::Float(5e9), text("1"), text("BANK UMUM")],
                vec![text("Aceh"), CellValue::Int(2024), CellValue::Int(1), CellValue::Float(5e9), text("1"), text("BPR")],
                vec![text("nan"), CellValue::Int(2024), CellValue::Int(1), CellValue::Float(5e9), text("1"), text("Bank Umum")],
                vec![text("Aceh"), text("Tahun"), CellValue::Int(1), CellValue::Float(5e9), text("1"), text("Bank Umum")],
            ],
        );
        let l = loader(
            InMemorySource::new("database").with_table("sample", table),
            InMemorySource::new("workbook"),
        );
        let t = l.load(&s).unwrap();
        assert_eq!(t.len(), 1);
        assert!((t.records[0].measure("Total DPK") - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year(&CellValue::Int(2024)), Some(2024));
        assert_eq!(parse_year(&CellValue::Float(2023.0)), Some(2023));
        assert_eq!(parse_year(&text("Tahun 2022")), Some(2022));
        assert_eq!(parse_year(&CellValue::Int(24)), None);
        assert_eq!(parse_year(&CellValue::Empty), None);
    }
}
