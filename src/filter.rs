//! Filter selections and stage-wise fallback.
//!
//! Filters are advisory: a stage that would leave no rows is discarded and
//! the previous stage's rows are kept. The region/category stage and the
//! year/period stage fall back independently.

use crate::aggregate::Interval;
use crate::error::{DashboardError, Result};
use crate::table::{CanonicalRecord, CanonicalTable};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single selection. `Unset` means the caller did not mention the filter
/// and the dataset default applies; `All` means the caller explicitly asked
/// for no filtering.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Selected<T> {
    #[default]
    Unset,
    All,
    Value(T),
}

impl<T> Selected<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodToken {
    Unit(u32),
    /// A source label such as `Triwulan I`, resolved against the table.
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterSelections {
    pub dimensions: BTreeMap<String, Selected<String>>,
    pub year: Selected<i32>,
    pub period: Selected<PeriodToken>,
    pub interval: Interval,
}

const YEAR_KEYS: [&str; 2] = ["year", "tahun"];
const PERIOD_KEYS: [&str; 4] = ["period", "bulan", "periode", "quarter"];
const INTERVAL_KEYS: [&str; 1] = ["interval"];

impl FilterSelections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, name: &str, value: &str) -> Self {
        self.dimensions
            .insert(name.to_string(), Selected::Value(value.to_string()));
        self
    }

    pub fn with_all(mut self, name: &str) -> Self {
        self.dimensions.insert(name.to_string(), Selected::All);
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Selected::Value(year);
        self
    }

    pub fn with_all_years(mut self) -> Self {
        self.year = Selected::All;
        self
    }

    pub fn with_period(mut self, unit: u32) -> Self {
        self.period = Selected::Value(PeriodToken::Unit(unit));
        self
    }

    pub fn with_period_label(mut self, label: &str) -> Self {
        self.period = Selected::Value(PeriodToken::Label(label.to_string()));
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    /// Builds selections from request-style key/value pairs. An empty value
    /// selects "all"; `year`/`tahun`, `period`/`bulan`/`periode` and
    /// `interval` are recognized, every other key names a dimension.
    pub fn from_params<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut selections = Self::default();
        for (key, raw) in params {
            let value = raw.trim();
            let lower = key.trim().to_lowercase();
            if YEAR_KEYS.contains(&lower.as_str()) {
                selections.year = if value.is_empty() {
                    Selected::All
                } else {
                    Selected::Value(value.parse::<i32>().map_err(|_| {
                        DashboardError::InvalidSelection(format!("year '{}' is not a number", value))
                    })?)
                };
            } else if PERIOD_KEYS.contains(&lower.as_str()) {
                selections.period = if value.is_empty() {
                    Selected::All
                } else {
                    match value.parse::<u32>() {
                        Ok(unit) => Selected::Value(PeriodToken::Unit(unit)),
                        Err(_) => Selected::Value(PeriodToken::Label(value.to_string())),
                    }
                };
            } else if INTERVAL_KEYS.contains(&lower.as_str()) {
                selections.interval = Interval::parse(value);
            } else if value.is_empty() {
                selections.dimensions.insert(key.trim().to_string(), Selected::All);
            } else {
                selections
                    .dimensions
                    .insert(key.trim().to_string(), Selected::Value(value.to_string()));
            }
        }
        Ok(selections)
    }

    /// Dimension names match case-insensitively, so `provinsi` selects
    /// the `Provinsi` column.
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimension_selection(name)
            .and_then(|s| s.value())
            .map(String::as_str)
    }

    pub fn dimension_selection(&self, name: &str) -> Option<&Selected<String>> {
        self.dimensions
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, sel)| sel)
    }

    pub fn year(&self) -> Option<i32> {
        self.year.value().copied()
    }

    /// The selected period as a unit; labels resolve through the table.
    pub fn period_unit(&self, table: &CanonicalTable) -> Option<u32> {
        match self.period.value()? {
            PeriodToken::Unit(unit) => Some(*unit),
            PeriodToken::Label(label) => table.unit_for_label(label),
        }
    }
}

/// Which selections a derived view honors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scope {
    ignored: BTreeSet<String>,
    ignore_dimensions: bool,
    ignore_time: bool,
}

impl Scope {
    /// Every selection applies (KPI scope).
    pub fn full() -> Self {
        Self::default()
    }

    /// No selection applies.
    pub fn unfiltered() -> Self {
        Self {
            ignored: BTreeSet::new(),
            ignore_dimensions: true,
            ignore_time: true,
        }
    }

    /// Region/category selections apply, year/period do not (trend charts).
    pub fn dimensions_only() -> Self {
        Self {
            ignore_time: true,
            ..Self::default()
        }
    }

    /// Drops one dimension from the scope, e.g. a "top N by category" chart
    /// ignoring the category filter.
    pub fn ignoring(mut self, dimension: &str) -> Self {
        self.ignored.insert(dimension.to_string());
        self
    }

    pub fn applies_to(&self, dimension: &str) -> bool {
        !self.ignore_dimensions
            && !self
                .ignored
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(dimension))
    }

    pub fn applies_time(&self) -> bool {
        !self.ignore_time
    }
}

/// Rows selected for one view, plus the filters that had to be discarded.
#[derive(Debug, Clone)]
pub struct Filtered<'a> {
    pub records: Vec<&'a CanonicalRecord>,
    pub discarded: Vec<String>,
}

impl<'a> Filtered<'a> {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Region/category stage: all active dimension filters together.
pub fn filter_dimensions<'a>(
    records: &[&'a CanonicalRecord],
    selections: &FilterSelections,
    scope: &Scope,
) -> Filtered<'a> {
    let active: Vec<(&str, &str)> = selections
        .dimensions
        .iter()
        .filter(|(name, _)| scope.applies_to(name))
        // Selections for dimensions this dataset does not have are ignored.
        .filter(|(name, _)| {
            records.first().map_or(false, |r| {
                r.dimensions.keys().any(|k| k.eq_ignore_ascii_case(name))
            })
        })
        .filter_map(|(name, sel)| sel.value().map(|v| (name.as_str(), v.as_str())))
        .collect();

    if active.is_empty() {
        return Filtered {
            records: records.to_vec(),
            discarded: Vec::new(),
        };
    }

    let kept: Vec<&'a CanonicalRecord> = records
        .iter()
        .copied()
        .filter(|r| {
            active.iter().all(|(name, value)| {
                dimension_of(r, name).is_some_and(|v| v.trim().eq_ignore_ascii_case(value.trim()))
            })
        })
        .collect();

    if kept.is_empty() {
        warn!("Filters {:?} match no rows, using all rows", active);
        return Filtered {
            records: records.to_vec(),
            discarded: active.iter().map(|(name, _)| name.to_string()).collect(),
        };
    }
    Filtered {
        records: kept,
        discarded: Vec::new(),
    }
}

fn dimension_of<'r>(record: &'r CanonicalRecord, name: &str) -> Option<&'r str> {
    record
        .dimensions
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.as_deref())
}

/// Year/period stage. `unit` is the already-resolved period selection.
pub fn filter_period<'a>(
    records: &[&'a CanonicalRecord],
    year: Option<i32>,
    unit: Option<u32>,
) -> Filtered<'a> {
    if year.is_none() && unit.is_none() {
        return Filtered {
            records: records.to_vec(),
            discarded: Vec::new(),
        };
    }

    let kept: Vec<&'a CanonicalRecord> = records
        .iter()
        .copied()
        .filter(|r| year.map_or(true, |y| r.year() == Some(y)))
        .filter(|r| unit.map_or(true, |u| r.unit() == Some(u)))
        .collect();

    if kept.is_empty() {
        warn!("No rows for year {:?} period {:?}, ignoring the period filter", year, unit);
        return Filtered {
            records: records.to_vec(),
            discarded: vec!["period".to_string()],
        };
    }
    Filtered {
        records: kept,
        discarded: Vec::new(),
    }
}

/// Applies both stages under a scope. The period stage runs on the output
/// of the dimension stage.
pub fn select<'a>(
    table: &'a CanonicalTable,
    selections: &FilterSelections,
    scope: &Scope,
) -> Filtered<'a> {
    let all: Vec<&'a CanonicalRecord> = table.records.iter().collect();
    let mut by_dimension = filter_dimensions(&all, selections, scope);
    if !scope.applies_time() {
        return by_dimension;
    }
    let by_period = filter_period(
        &by_dimension.records,
        selections.year(),
        selections.period_unit(table),
    );
    by_dimension.discarded.extend(by_period.discarded);
    Filtered {
        records: by_period.records,
        discarded: by_dimension.discarded,
    }
}

/// Rows of the selected year and period. When the selection matches
/// nothing, the rows of the latest period present are used instead.
pub fn anchor_period<'a>(
    records: &[&'a CanonicalRecord],
    year: Option<i32>,
    unit: Option<u32>,
) -> Vec<&'a CanonicalRecord> {
    let kept: Vec<&'a CanonicalRecord> = records
        .iter()
        .copied()
        .filter(|r| year.map_or(true, |y| r.year() == Some(y)))
        .filter(|r| unit.map_or(true, |u| r.unit() == Some(u)))
        .collect();
    if !kept.is_empty() {
        return kept;
    }
    let latest = records.iter().filter_map(|r| r.period).max();
    records
        .iter()
        .copied()
        .filter(|r| r.period.is_some() && r.period == latest)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::{PeriodKey, PeriodKind};

    fn record(province: &str, jenis: &str, year: i32, month: u32) -> CanonicalRecord {
        CanonicalRecord {
            dimensions: BTreeMap::from([
                ("Provinsi".to_string(), Some(province.to_string())),
                ("Jenis".to_string(), Some(jenis.to_string())),
            ]),
            period: PeriodKey::new(PeriodKind::Month, year, month),
            period_label: None,
            measures: BTreeMap::new(),
        }
    }

    fn table() -> CanonicalTable {
        CanonicalTable {
            dataset: "t".to_string(),
            kind: Some(PeriodKind::Month),
            measure_kinds: BTreeMap::new(),
            derived: Vec::new(),
            records: vec![
                record("Aceh", "Jiwa", 2024, 1),
                record("Aceh", "Umum", 2024, 2),
                record("Jambi", "Jiwa", 2023, 2),
            ],
            served_by: "memory".to_string(),
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_unmatched_region_falls_back_to_all_rows() {
        let t = table();
        let sel = FilterSelections::new().with_dimension("Provinsi", "Papua");
        let out = select(&t, &sel, &Scope::full());
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.discarded, vec!["Provinsi"]);
    }

    #[test]
    fn test_stages_fall_back_independently() {
        let t = table();
        // Region matches, period does not: only the period stage is undone.
        let sel = FilterSelections::new()
            .with_dimension("Provinsi", "Aceh")
            .with_year(2023);
        let out = select(&t, &sel, &Scope::full());
        assert_eq!(out.records.len(), 2);
        assert!(out.records.iter().all(|r| r.dimension("Provinsi") == Some("Aceh")));
        assert_eq!(out.discarded, vec!["period"]);
    }

    #[test]
    fn test_selection_for_unknown_dimension_is_ignored() {
        let t = table();
        let sel = FilterSelections::new()
            .with_dimension("Negara", "Indonesia")
            .with_dimension("provinsi", "jambi");
        let out = select(&t, &sel, &Scope::full());
        assert_eq!(out.records.len(), 1);
        assert!(out.discarded.is_empty());
    }

    #[test]
    fn test_anchor_period_falls_back_to_latest() {
        let t = table();
        let all: Vec<&CanonicalRecord> = t.records.iter().collect();
        assert_eq!(anchor_period(&all, Some(2023), None).len(), 1);
        let latest = anchor_period(&all, Some(2019), Some(5));
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].unit(), Some(2));
        assert_eq!(latest[0].year(), Some(2024));
    }

    #[test]
    fn test_scope_ignoring_dimension() {
        let t = table();
        let sel = FilterSelections::new()
            .with_dimension("Provinsi", "Aceh")
            .with_dimension("Jenis", "Jiwa");
        assert_eq!(select(&t, &sel, &Scope::full()).records.len(), 1);
        assert_eq!(select(&t, &sel, &Scope::full().ignoring("Jenis")).records.len(), 2);
        assert_eq!(select(&t, &sel, &Scope::unfiltered()).records.len(), 3);
    }

    #[test]
    fn test_from_params() {
        let sel = FilterSelections::from_params([
            ("provinsi", "Aceh"),
            ("tahun", "2024"),
            ("periode", "Triwulan II"),
            ("jenis", ""),
            ("interval", "triwulan"),
        ])
        .unwrap();
        assert_eq!(sel.dimension("provinsi"), Some("Aceh"));
        assert_eq!(sel.dimensions.get("jenis"), Some(&Selected::All));
        assert_eq!(sel.year(), Some(2024));
        assert_eq!(
            sel.period,
            Selected::Value(PeriodToken::Label("Triwulan II".to_string()))
        );
        assert_eq!(sel.interval, Interval::Quarterly);

        let err = FilterSelections::from_params([("year", "dua ribu")]).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidSelection(_)));
    }
}
