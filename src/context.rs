//! The mapping handed to the presentation layer: named scalars, growth
//! figures with their class tags, option lists and chart series.

use crate::aggregate::ChartPoint;
use crate::growth::{Growth, GrowthClass};
use crate::numeric::CellValue;
use serde::Serialize;
use std::collections::BTreeMap;

/// Serialized only, untagged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextValue {
    /// `None` serializes as `null`: "no data", distinct from 0.
    Number(Option<f64>),
    Integer(i64),
    Text(String),
    Class(GrowthClass),
    Labels(Vec<String>),
    Values(Vec<f64>),
    Integers(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DashboardContext {
    pub dataset: String,
    pub values: BTreeMap<String, ContextValue>,
}

impl DashboardContext {
    pub fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            values: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            ContextValue::Number(v) => *v,
            ContextValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            ContextValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn labels(&self, key: &str) -> Option<&[String]> {
        match self.values.get(key)? {
            ContextValue::Labels(v) => Some(v),
            _ => None,
        }
    }

    pub fn series(&self, key: &str) -> Option<&[f64]> {
        match self.values.get(key)? {
            ContextValue::Values(v) => Some(v),
            _ => None,
        }
    }

    pub fn class(&self, key: &str) -> Option<GrowthClass> {
        match self.values.get(key)? {
            ContextValue::Class(v) => Some(*v),
            _ => None,
        }
    }

    pub fn insert_number(&mut self, key: &str, value: f64) {
        self.values
            .insert(key.to_string(), ContextValue::Number(Some(value)));
    }

    pub fn insert_optional(&mut self, key: &str, value: Option<f64>) {
        self.values.insert(key.to_string(), ContextValue::Number(value));
    }

    pub fn insert_integer(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), ContextValue::Integer(value));
    }

    pub fn insert_text(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_string(), ContextValue::Text(value.into()));
    }

    pub fn insert_options(&mut self, key: &str, options: Vec<String>) {
        self.values.insert(key.to_string(), ContextValue::Labels(options));
    }

    pub fn insert_years(&mut self, key: &str, years: Vec<i32>) {
        self.insert_integers(key, years.into_iter().map(i64::from).collect());
    }

    pub fn insert_integers(&mut self, key: &str, values: Vec<i64>) {
        self.values.insert(key.to_string(), ContextValue::Integers(values));
    }

    pub fn integers(&self, key: &str) -> Option<&[i64]> {
        match self.values.get(key)? {
            ContextValue::Integers(v) => Some(v),
            _ => None,
        }
    }

    pub fn insert_values(&mut self, key: &str, values: Vec<f64>) {
        self.values.insert(key.to_string(), ContextValue::Values(values));
    }

    /// Metadata cells become numbers when numeric and text otherwise.
    pub fn insert_cell(&mut self, key: &str, cell: Option<&CellValue>) {
        let value = match cell {
            Some(CellValue::Int(v)) => ContextValue::Integer(*v),
            Some(CellValue::Float(v)) if v.fract() == 0.0 && v.is_finite() => {
                ContextValue::Integer(*v as i64)
            }
            Some(CellValue::Float(v)) => ContextValue::Number(Some(*v)),
            Some(cell) => match cell.as_label() {
                Some(text) => ContextValue::Text(text),
                None => ContextValue::Number(None),
            },
            None => ContextValue::Number(None),
        };
        self.values.insert(key.to_string(), value);
    }

    /// `<prefix>_val`, `<prefix>_yoy`, `<prefix>_ytd` and their class tags.
    pub fn insert_kpi(&mut self, prefix: &str, growth: &Growth) {
        self.insert_number(&format!("{}_val", prefix), growth.current);
        self.insert_optional(&format!("{}_yoy", prefix), growth.yoy);
        self.insert_optional(&format!("{}_ytd", prefix), growth.ytd);
        self.values.insert(
            format!("{}_yoy_class", prefix),
            ContextValue::Class(growth.yoy_class()),
        );
        self.values.insert(
            format!("{}_ytd_class", prefix),
            ContextValue::Class(growth.ytd_class()),
        );
    }

    /// Inserts the labels of `points` under `labels_key` and one value list
    /// per `(key, measure)` pair. Every list has the length of `points`.
    pub fn insert_chart(
        &mut self,
        labels_key: &str,
        points: &[ChartPoint],
        series: &[(&str, &str)],
    ) {
        self.insert_chart_scaled(labels_key, points, series, 1.0);
    }

    pub fn insert_chart_scaled(
        &mut self,
        labels_key: &str,
        points: &[ChartPoint],
        series: &[(&str, &str)],
        factor: f64,
    ) {
        self.insert_options(labels_key, points.iter().map(|p| p.label.clone()).collect());
        for (key, measure) in series {
            self.insert_values(
                key,
                points.iter().map(|p| p.value(measure) * factor).collect(),
            );
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.values)
    }
}
