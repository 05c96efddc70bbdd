//! Tabular sources: a read-only SQLite query (primary) and spreadsheet
//! sheets (secondary), both delivering a [`RawTable`] with the same
//! column contract.

use crate::error::{DashboardError, Result};
use crate::numeric::CellValue;
use crate::schema::{DatasetSchema, Reshape, SheetLayout, UnitSplit};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Rows as delivered by a source, before any normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Cells read from above the header (e.g. reporting year).
    pub metadata: BTreeMap<String, CellValue>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            columns,
            rows,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Interprets a raw sheet grid: metadata cells, rows skipped above the
    /// header, one or more header rows, then data. Wide layouts are melted
    /// into long form when the layout asks for it.
    pub fn from_grid(grid: Vec<Vec<CellValue>>, layout: &SheetLayout) -> Result<Self> {
        let mut metadata = BTreeMap::new();
        for cell in &layout.metadata {
            if let Some(value) = grid.get(cell.row).and_then(|r| r.get(cell.col)) {
                if !value.is_empty() {
                    metadata.insert(cell.key.clone(), value.clone());
                }
            }
        }

        let header_rows = layout.header_rows.max(1);
        let mut rows = grid.into_iter().skip(layout.skip_rows);
        let header_grid: Vec<Vec<CellValue>> = rows.by_ref().take(header_rows).collect();
        if header_grid.len() < header_rows {
            return Err(DashboardError::Source {
                source_name: layout.sheet.clone(),
                reason: "sheet has no header row".to_string(),
            });
        }
        let data: Vec<Vec<CellValue>> = rows
            .filter(|r| r.iter().any(|c| !c.is_empty()))
            .collect();

        let width = header_grid
            .iter()
            .chain(data.iter())
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        let headers = header_levels(&header_grid, width);

        let mut table = match &layout.reshape {
            None => plain_table(&headers, data, width),
            Some(Reshape::MeltMultiHeader {
                id_label,
                id_column,
                level_columns,
                value_column,
                split_unit,
            }) => melt_multi_header(
                &headers,
                &data,
                id_label,
                id_column,
                level_columns,
                value_column,
                split_unit.as_ref(),
            ),
            Some(Reshape::MeltColumns {
                id_column,
                variable_column,
                value_column,
                exclude_columns,
                drop_ids,
                drop_date_like_ids,
            }) => melt_columns(
                &headers,
                &data,
                id_column,
                variable_column,
                value_column,
                exclude_columns,
                drop_ids,
                *drop_date_like_ids,
            ),
        };
        table.metadata = metadata;
        Ok(table)
    }
}

/// Header labels per column, one entry per header row. Upper levels of a
/// multi-row header are forward-filled from the left, matching how merged
/// cells span several columns.
fn header_levels(header_grid: &[Vec<CellValue>], width: usize) -> Vec<Vec<String>> {
    let depth = header_grid.len();
    let mut headers: Vec<Vec<String>> = vec![vec![String::new(); depth]; width];
    for (level, row) in header_grid.iter().enumerate() {
        let mut carry = String::new();
        for (col, column) in headers.iter_mut().enumerate() {
            let label = row.get(col).and_then(CellValue::as_label).unwrap_or_default();
            let upper = level + 1 < depth;
            if upper && label.is_empty() {
                column[level] = carry.clone();
            } else {
                column[level] = label.clone();
                carry = label;
            }
        }
    }
    headers
}

fn joined_name(levels: &[String], col: usize) -> String {
    let parts: Vec<&str> = levels
        .iter()
        .map(|l| l.as_str())
        .filter(|l| !l.is_empty())
        .collect();
    if parts.is_empty() {
        format!("Unnamed: {}", col)
    } else {
        parts.join(" | ")
    }
}

fn plain_table(headers: &[Vec<String>], data: Vec<Vec<CellValue>>, width: usize) -> RawTable {
    let columns = headers
        .iter()
        .enumerate()
        .map(|(col, levels)| joined_name(levels, col))
        .collect();
    let rows = data
        .into_iter()
        .map(|mut row| {
            row.resize(width, CellValue::Empty);
            row
        })
        .collect();
    RawTable::new(columns, rows)
}

/// Splits `"Padi (Ton)"` into `("Padi", Some("Ton"))`.
pub fn split_unit_label(raw: &str) -> (String, Option<String>) {
    let s = raw.trim();
    if let (Some(open), true) = (s.find('('), s.ends_with(')')) {
        let name = s[..open].trim();
        let unit = s[open + 1..s.len() - 1].trim();
        if !name.is_empty() && !unit.is_empty() {
            return (name.to_string(), Some(unit.to_string()));
        }
    }
    (s.to_string(), None)
}

fn melt_multi_header(
    headers: &[Vec<String>],
    data: &[Vec<CellValue>],
    id_label: &str,
    id_column: &str,
    level_columns: &[String],
    value_column: &str,
    split_unit: Option<&UnitSplit>,
) -> RawTable {
    let id_idx = headers
        .iter()
        .position(|levels| {
            levels
                .last()
                .map(|l| l.trim().eq_ignore_ascii_case(id_label))
                .unwrap_or(false)
        })
        .unwrap_or(0);
    let split_idx = split_unit.and_then(|s| level_columns.iter().position(|c| *c == s.source));

    let mut columns = vec![id_column.to_string()];
    columns.extend(level_columns.iter().cloned());
    if let Some(split) = split_unit {
        columns.push(split.name.clone());
        columns.push(split.unit.clone());
    }
    columns.push(value_column.to_string());

    let mut rows = Vec::new();
    for row in data {
        let id = row.get(id_idx).cloned().unwrap_or(CellValue::Empty);
        for (col, levels) in headers.iter().enumerate() {
            if col == id_idx || levels.iter().all(|l| l.is_empty()) {
                continue;
            }
            let mut out = vec![id.clone()];
            for i in 0..level_columns.len() {
                out.push(match levels.get(i) {
                    Some(l) if !l.is_empty() => CellValue::text(l.clone()),
                    _ => CellValue::Empty,
                });
            }
            if split_unit.is_some() {
                let source = split_idx.and_then(|i| levels.get(i)).cloned().unwrap_or_default();
                let (name, unit) = split_unit_label(&source);
                out.push(CellValue::text(name));
                out.push(unit.map(CellValue::text).unwrap_or(CellValue::Empty));
            }
            out.push(row.get(col).cloned().unwrap_or(CellValue::Empty));
            rows.push(out);
        }
    }
    RawTable::new(columns, rows)
}

fn looks_like_date(text: &str) -> bool {
    const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    let s = text.trim();
    DATE_FORMATS
        .iter()
        .any(|f| NaiveDate::parse_from_str(s, f).is_ok())
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
}

#[allow(clippy::too_many_arguments)]
fn melt_columns(
    headers: &[Vec<String>],
    data: &[Vec<CellValue>],
    id_column: &str,
    variable_column: &str,
    value_column: &str,
    exclude_columns: &[String],
    drop_ids: &[String],
    drop_date_like_ids: bool,
) -> RawTable {
    let columns = vec![
        id_column.to_string(),
        variable_column.to_string(),
        value_column.to_string(),
    ];

    // Columns without a single value are layout padding.
    let populated: Vec<usize> = (0..headers.len())
        .filter(|&c| data.iter().any(|r| r.get(c).map(|v| !v.is_empty()).unwrap_or(false)))
        .collect();
    let Some((&id_idx, variables)) = populated.split_first() else {
        return RawTable::new(columns, Vec::new());
    };

    let variables: Vec<(usize, String)> = variables
        .iter()
        .filter_map(|&c| {
            let name = headers[c].last().map(|l| l.trim().to_string()).unwrap_or_default();
            let excluded = exclude_columns.iter().any(|e| e.trim().eq_ignore_ascii_case(&name));
            (!name.is_empty() && !excluded).then_some((c, name))
        })
        .collect();

    let mut rows = Vec::new();
    for row in data {
        let Some(id) = row.get(id_idx).and_then(CellValue::as_label) else {
            continue;
        };
        let lower = id.to_lowercase();
        if drop_ids.iter().any(|d| d.to_lowercase() == lower) {
            continue;
        }
        if drop_date_like_ids && looks_like_date(&id) {
            continue;
        }
        for (col, name) in &variables {
            rows.push(vec![
                CellValue::text(id.clone()),
                CellValue::text(name.clone()),
                row.get(*col).cloned().unwrap_or(CellValue::Empty),
            ]);
        }
    }
    RawTable::new(columns, rows)
}

pub trait TabularSource: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self, schema: &DatasetSchema) -> Result<RawTable>;
}

/// Runs the dataset's query against a SQLite file opened read-only. The
/// connection lives for one fetch.
pub struct SqliteSource {
    path: PathBuf,
}

impl SqliteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn cell_from_sql(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => CellValue::Empty,
        ValueRef::Integer(v) => CellValue::Int(v),
        ValueRef::Real(v) => CellValue::Float(v),
        ValueRef::Text(bytes) => CellValue::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

impl TabularSource for SqliteSource {
    fn name(&self) -> &str {
        "database"
    }

    fn fetch(&self, schema: &DatasetSchema) -> Result<RawTable> {
        let query = schema.query.as_deref().ok_or_else(|| DashboardError::Source {
            source_name: self.name().to_string(),
            reason: format!("no query configured for '{}'", schema.id),
        })?;

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut stmt = conn.prepare(query)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(cell_from_sql))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!("Query for '{}' returned {} rows", schema.id, rows.len());
        Ok(RawTable::new(columns, rows))
    }
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Int(v) => CellValue::Int(*v),
        Data::Float(v) => CellValue::Float(*v),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(v) => CellValue::Text(v.to_string()),
        Data::DateTime(v) => CellValue::Float(v.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}

/// Reads a named sheet from a workbook in `dir` (xlsx, xls or ods).
pub struct WorkbookSource {
    dir: PathBuf,
}

impl WorkbookSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TabularSource for WorkbookSource {
    fn name(&self) -> &str {
        "workbook"
    }

    fn fetch(&self, schema: &DatasetSchema) -> Result<RawTable> {
        let layout = &schema.sheet;
        let path = self.dir.join(&layout.workbook);
        let mut workbook = open_workbook_auto(&path)?;
        let range = workbook.worksheet_range(&layout.sheet)?;

        // The range starts at the first used cell; pad so that row/column
        // positions match the sheet.
        let (row0, col0) = range.start().unwrap_or((0, 0));
        let mut grid: Vec<Vec<CellValue>> = vec![Vec::new(); row0 as usize];
        for row in range.rows() {
            let mut cells = vec![CellValue::Empty; col0 as usize];
            cells.extend(row.iter().map(cell_from_data));
            grid.push(cells);
        }

        debug!("Read {} grid rows from {}", grid.len(), path.display());
        RawTable::from_grid(grid, layout)
    }
}

/// Reads sheets exported to CSV as `<dir>/<workbook stem>/<sheet>.csv`.
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn sheet_path(&self, layout: &SheetLayout) -> PathBuf {
        let stem = Path::new(&layout.workbook)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| layout.workbook.clone());
        self.dir.join(stem).join(format!("{}.csv", layout.sheet))
    }
}

impl TabularSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, schema: &DatasetSchema) -> Result<RawTable> {
        let path = self.sheet_path(&schema.sheet);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)?;

        let mut grid = Vec::new();
        for record in reader.records() {
            let record = record?;
            grid.push(
                record
                    .iter()
                    .map(|field| {
                        if field.is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::text(field)
                        }
                    })
                    .collect(),
            );
        }

        debug!("Read {} grid rows from {}", grid.len(), path.display());
        RawTable::from_grid(grid, &schema.sheet)
    }
}

/// Fixed tables keyed by dataset id.
pub struct InMemorySource {
    name: String,
    tables: BTreeMap<String, RawTable>,
}

impl InMemorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, dataset: &str, table: RawTable) -> Self {
        self.tables.insert(dataset.to_string(), table);
        self
    }
}

impl TabularSource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, schema: &DatasetSchema) -> Result<RawTable> {
        self.tables
            .get(&schema.id)
            .cloned()
            .ok_or_else(|| DashboardError::Source {
                source_name: self.name.clone(),
                reason: format!("no table for '{}'", schema.id),
            })
    }
}
