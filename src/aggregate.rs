//! Period aggregation.
//!
//! Rows sharing a (year, period) are collapsed: additive measures are summed,
//! ratio measures are averaged. The mean is taken over the merged rows, not
//! recomputed from summed numerators and denominators.

use crate::period::{quarter_label, PeriodKey, PeriodKind};
use crate::schema::{Derivation, DerivedMeasure, MeasureKind};
use crate::table::{CanonicalRecord, CanonicalTable};
use crate::utils::{chart_label, period_anchor, short_year};
use chrono::{Datelike, NaiveDate};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Grouping granularity of a chart series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Interval {
    #[default]
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl Interval {
    /// Accepts the dashboard's Indonesian names and the English ones.
    /// Anything else is monthly.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "triwulan" | "triwulanan" | "quarterly" => Self::Quarterly,
            "semesteran" | "semester" | "semi_annual" | "semi-annual" => Self::SemiAnnual,
            "tahunan" | "annual" | "yearly" => Self::Annual,
            _ => Self::Monthly,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "bulanan",
            Self::Quarterly => "triwulan",
            Self::SemiAnnual => "semesteran",
            Self::Annual => "tahunan",
        }
    }
}

/// One labeled point of a chart: the label and every measure at that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub anchor: Option<NaiveDate>,
    pub values: BTreeMap<String, f64>,
}

impl ChartPoint {
    pub fn value(&self, measure: &str) -> f64 {
        self.values.get(measure).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRow {
    pub key: PeriodKey,
    pub values: BTreeMap<String, f64>,
}

impl PeriodRow {
    pub fn value(&self, measure: &str) -> f64 {
        self.values.get(measure).copied().unwrap_or(0.0)
    }

    pub fn year(&self) -> i32 {
        self.key.year
    }

    pub fn unit(&self) -> u32 {
        self.key.unit
    }
}

/// One row per distinct (year, period), ordered by period anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSeries {
    pub kind: PeriodKind,
    pub kinds: BTreeMap<String, MeasureKind>,
    rows: Vec<PeriodRow>,
}

impl PeriodSeries {
    pub fn new(
        kind: PeriodKind,
        kinds: BTreeMap<String, MeasureKind>,
        mut rows: Vec<PeriodRow>,
    ) -> Self {
        rows.sort_by_key(|r| r.key.anchor);
        Self { kind, kinds, rows }
    }

    /// Single-measure series from `(year, unit, value)` observations.
    /// Observations that do not form a valid period are skipped.
    pub fn from_observations(
        kind: PeriodKind,
        measure: &str,
        measure_kind: MeasureKind,
        observations: &[(i32, u32, f64)],
    ) -> Self {
        let rows = observations
            .iter()
            .filter_map(|(year, unit, value)| {
                Some(PeriodRow {
                    key: PeriodKey::new(kind, *year, *unit)?,
                    values: BTreeMap::from([(measure.to_string(), *value)]),
                })
            })
            .collect();
        Self::new(
            kind,
            BTreeMap::from([(measure.to_string(), measure_kind)]),
            rows,
        )
    }

    pub fn rows(&self) -> &[PeriodRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn latest(&self) -> Option<&PeriodRow> {
        self.rows.last()
    }

    pub fn rows_in_year(&self, year: i32) -> impl Iterator<Item = &PeriodRow> {
        self.rows.iter().filter(move |r| r.year() == year)
    }

    pub fn find(&self, year: i32, unit: u32) -> Option<&PeriodRow> {
        self.rows.iter().find(|r| r.year() == year && r.unit() == unit)
    }

    /// Rows up to and including the selected position. An empty result falls
    /// back to the whole series.
    pub fn truncate_at(&self, year: Option<i32>, unit: Option<u32>) -> Self {
        let Some(year) = year else {
            return self.clone();
        };
        let kept: Vec<PeriodRow> = self
            .rows
            .iter()
            .filter(|r| match unit {
                Some(unit) => r.year() < year || (r.year() == year && r.unit() <= unit),
                None => r.year() <= year,
            })
            .cloned()
            .collect();
        if kept.is_empty() {
            return self.clone();
        }
        Self {
            kind: self.kind,
            kinds: self.kinds.clone(),
            rows: kept,
        }
    }

    /// Points labeled in the series' own granularity: `Mar '24`,
    /// `Triw I '24` or `2024`.
    pub fn labeled_points(&self) -> Vec<ChartPoint> {
        self.rows
            .iter()
            .map(|r| ChartPoint {
                label: natural_label(self.kind, &r.key),
                anchor: Some(r.key.anchor),
                values: r.values.clone(),
            })
            .collect()
    }

    /// Regroups the series for charting. Buckets are derived from each
    /// row's anchor month, so a quarterly series regroups to semesters and
    /// years as well.
    pub fn regroup(&self, interval: Interval) -> Vec<ChartPoint> {
        if interval == Interval::Monthly {
            return self.labeled_points();
        }

        let mut buckets: BTreeMap<(i32, u32), Accumulator> = BTreeMap::new();
        for row in &self.rows {
            let month = row.key.anchor.month();
            let bucket = match interval {
                Interval::Quarterly => (month - 1) / 3 + 1,
                Interval::SemiAnnual => {
                    if month <= 6 {
                        1
                    } else {
                        2
                    }
                }
                Interval::Annual | Interval::Monthly => 1,
            };
            buckets
                .entry((row.year(), bucket))
                .or_default()
                .add(&row.values);
        }

        buckets
            .into_iter()
            .filter_map(|((year, bucket), acc)| {
                let (label, anchor) = match interval {
                    Interval::Quarterly => {
                        let anchor = period_anchor(year, bucket * 3)?;
                        (chart_label(anchor), anchor)
                    }
                    Interval::SemiAnnual => {
                        let anchor = period_anchor(year, bucket * 6)?;
                        (chart_label(anchor), anchor)
                    }
                    Interval::Annual | Interval::Monthly => {
                        (year.to_string(), period_anchor(year, 1)?)
                    }
                };
                Some(ChartPoint {
                    label,
                    anchor: Some(anchor),
                    values: acc.finish(&self.kinds),
                })
            })
            .collect()
    }

    pub fn by_year(&self) -> Vec<ChartPoint> {
        self.regroup(Interval::Annual)
    }

    /// Points for one period unit across years, e.g. every December.
    pub fn points_for_unit(&self, unit: u32) -> Vec<&PeriodRow> {
        self.rows.iter().filter(|r| r.unit() == unit).collect()
    }
}

fn natural_label(kind: PeriodKind, key: &PeriodKey) -> String {
    match kind {
        PeriodKind::Month => chart_label(key.anchor),
        PeriodKind::Quarter => format!("{} '{}", quarter_label(key.unit), short_year(key.year)),
        PeriodKind::Year => key.year.to_string(),
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    sums: BTreeMap<String, f64>,
    counts: BTreeMap<String, usize>,
}

impl Accumulator {
    fn add(&mut self, values: &BTreeMap<String, f64>) {
        for (name, value) in values {
            *self.sums.entry(name.clone()).or_insert(0.0) += value;
            *self.counts.entry(name.clone()).or_insert(0) += 1;
        }
    }

    fn finish(self, kinds: &BTreeMap<String, MeasureKind>) -> BTreeMap<String, f64> {
        let counts = self.counts;
        self.sums
            .into_iter()
            .map(|(name, sum)| {
                let merged = match kinds.get(&name) {
                    Some(MeasureKind::Ratio) => {
                        let n = counts.get(&name).copied().unwrap_or(1).max(1);
                        sum / n as f64
                    }
                    _ => sum,
                };
                (name, merged)
            })
            .collect()
    }
}

fn apply_derived(values: &mut BTreeMap<String, f64>, derived: &[DerivedMeasure]) {
    for measure in derived {
        let get = |name: &str| values.get(name).copied().unwrap_or(0.0);
        let value = match &measure.derivation {
            Derivation::Sum { of } => of.iter().map(|name| get(name)).sum(),
            Derivation::Alias { of } => get(of),
            Derivation::RatioPct {
                numerator,
                denominator,
            } => quotient(get(numerator), get(denominator)) * 100.0,
            Derivation::Quotient {
                numerator,
                denominator,
            } => quotient(get(numerator), get(denominator)),
        };
        values.insert(measure.name.clone(), value);
    }
}

fn quotient(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Aggregates canonical records under a table's measure tags.
pub struct Aggregator<'a> {
    kind: PeriodKind,
    kinds: &'a BTreeMap<String, MeasureKind>,
    derived: &'a [DerivedMeasure],
}

impl<'a> Aggregator<'a> {
    pub fn for_table(table: &'a CanonicalTable) -> Self {
        Self {
            kind: table.kind.unwrap_or(PeriodKind::Year),
            kinds: &table.measure_kinds,
            derived: &table.derived,
        }
    }

    /// Groups by (year, period). Records without a period are ignored.
    pub fn aggregate<'r>(
        &self,
        records: impl IntoIterator<Item = &'r CanonicalRecord>,
    ) -> PeriodSeries {
        let mut groups: BTreeMap<PeriodKey, Accumulator> = BTreeMap::new();
        let mut merged = 0usize;
        for record in records {
            if let Some(key) = record.period {
                groups.entry(key).or_default().add(&record.measures);
                merged += 1;
            }
        }

        let rows: Vec<PeriodRow> = groups
            .into_iter()
            .map(|(key, acc)| {
                let mut values = acc.finish(self.kinds);
                apply_derived(&mut values, self.derived);
                PeriodRow { key, values }
            })
            .collect();

        debug!("Aggregated {} rows into {} periods", merged, rows.len());
        PeriodSeries::new(self.kind, self.kinds.clone(), rows)
    }

    /// Aggregates all records into a single set of values.
    pub fn totals<'r>(
        &self,
        records: impl IntoIterator<Item = &'r CanonicalRecord>,
    ) -> BTreeMap<String, f64> {
        let mut acc = Accumulator::default();
        for record in records {
            acc.add(&record.measures);
        }
        let mut values = acc.finish(self.kinds);
        apply_derived(&mut values, self.derived);
        values
    }

    /// Totals per value of one dimension, ordered by label. Blank values
    /// are skipped.
    pub fn group_totals<'r>(
        &self,
        records: impl IntoIterator<Item = &'r CanonicalRecord>,
        dimension: &str,
    ) -> Vec<ChartPoint> {
        let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
        for record in records {
            if let Some(value) = record.dimension(dimension) {
                groups.entry(value.to_string()).or_default().add(&record.measures);
            }
        }
        groups
            .into_iter()
            .map(|(label, acc)| {
                let mut values = acc.finish(self.kinds);
                apply_derived(&mut values, self.derived);
                ChartPoint {
                    label,
                    anchor: None,
                    values,
                }
            })
            .collect()
    }

    /// Group totals sorted by `measure` descending, optionally cut to the
    /// first `top_n`. Ties keep label order.
    pub fn ranked_totals<'r>(
        &self,
        records: impl IntoIterator<Item = &'r CanonicalRecord>,
        dimension: &str,
        measure: &str,
        top_n: Option<usize>,
    ) -> Vec<ChartPoint> {
        let mut points = self.group_totals(records, dimension);
        points.sort_by(|a, b| b.value(measure).total_cmp(&a.value(measure)));
        if let Some(n) = top_n {
            points.truncate(n);
        }
        points
    }
}

pub fn aggregate(table: &CanonicalTable) -> PeriodSeries {
    Aggregator::for_table(table).aggregate(&table.records)
}
