use crate::numeric::CellValue;
use crate::period::{PeriodKey, PeriodKind};
use crate::schema::{DerivedMeasure, MeasureKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One cleaned observation, independent of the source that supplied it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Region and category fields; `None` when the source cell was blank.
    pub dimensions: BTreeMap<String, Option<String>>,
    /// `None` only for untimed datasets.
    pub period: Option<PeriodKey>,
    /// The period exactly as written by the source (e.g. `Triwulan I`).
    pub period_label: Option<String>,
    pub measures: BTreeMap<String, f64>,
}

impl CanonicalRecord {
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions.get(name).and_then(|v| v.as_deref())
    }

    pub fn measure(&self, name: &str) -> f64 {
        self.measures.get(name).copied().unwrap_or(0.0)
    }

    pub fn year(&self) -> Option<i32> {
        self.period.map(|p| p.year)
    }

    pub fn unit(&self) -> Option<u32> {
        self.period.map(|p| p.unit)
    }
}

/// A lossy-mode substitution: the cell could not be parsed and was replaced
/// by the documented default (0.0 for measures, unit 1 for periods).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub substituted: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTable {
    pub dataset: String,
    pub kind: Option<PeriodKind>,
    pub measure_kinds: BTreeMap<String, MeasureKind>,
    pub derived: Vec<DerivedMeasure>,
    pub records: Vec<CanonicalRecord>,
    /// Name of the source that served the rows.
    pub served_by: String,
    pub warnings: Vec<ParseWarning>,
    pub metadata: BTreeMap<String, CellValue>,
}

impl CanonicalTable {
    /// A table without rows, standing in for a dataset that could not be
    /// loaded.
    pub fn empty(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            kind: None,
            measure_kinds: BTreeMap::new(),
            derived: Vec::new(),
            records: Vec::new(),
            served_by: String::new(),
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Sorted distinct non-blank values of a dimension, for dropdowns.
    pub fn distinct(&self, dimension: &str) -> Vec<String> {
        distinct_values(self.records.iter(), dimension)
    }

    pub fn years(&self) -> Vec<i32> {
        let set: BTreeSet<i32> = self.records.iter().filter_map(|r| r.year()).collect();
        set.into_iter().collect()
    }

    pub fn units(&self) -> Vec<u32> {
        let set: BTreeSet<u32> = self.records.iter().filter_map(|r| r.unit()).collect();
        set.into_iter().collect()
    }

    /// Source period labels ordered by their resolved unit.
    pub fn period_labels(&self) -> Vec<String> {
        let seen: BTreeSet<(u32, &String)> = self
            .records
            .iter()
            .filter_map(|r| Some((r.unit()?, r.period_label.as_ref()?)))
            .collect();
        let mut labels: Vec<String> = Vec::new();
        for (_, label) in seen {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }

    pub fn unit_for_label(&self, label: &str) -> Option<u32> {
        self.records
            .iter()
            .find(|r| r.period_label.as_deref() == Some(label))
            .and_then(|r| r.unit())
    }

    pub fn metadata_value(&self, key: &str) -> Option<&CellValue> {
        self.metadata.get(key)
    }
}

pub fn distinct_values<'a>(
    records: impl IntoIterator<Item = &'a CanonicalRecord>,
    dimension: &str,
) -> Vec<String> {
    let set: BTreeSet<String> = records
        .into_iter()
        .filter_map(|r| r.dimension(dimension).map(str::to_string))
        .collect();
    set.into_iter().collect()
}
