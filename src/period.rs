//! Resolution of heterogeneous month / quarter tokens to canonical ordinals.
//!
//! The resolvers are total: unrecognized tokens map to the first period of
//! the year. The `try_` variants expose the failure for strict loading.

use crate::numeric::CellValue;
use crate::utils::period_anchor;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const MONTH_NAMES: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

const MONTH_PREFIXES: [(&str, u32); 13] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("mei", 5),
    ("jun", 6),
    ("jul", 7),
    ("agu", 8),
    ("ags", 8),
    ("sep", 9),
    ("okt", 10),
    ("nov", 11),
    ("des", 12),
];

const QUARTER_PREFIXES: [&str; 4] = ["triwulan", "quarter", "tw", "q"];

const ROMAN_QUARTERS: [(&str, u32); 4] = [("i", 1), ("ii", 2), ("iii", 3), ("iv", 4)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    /// Ordinal 1-12.
    Month,
    /// Ordinal 1-4.
    Quarter,
    /// One observation per year; the ordinal is always 1.
    Year,
}

impl PeriodKind {
    pub fn max_unit(self) -> u32 {
        match self {
            Self::Month => 12,
            Self::Quarter => 4,
            Self::Year => 1,
        }
    }

    /// Calendar month representing a period unit, used for the anchor date.
    pub fn anchor_month(self, unit: u32) -> u32 {
        match self {
            Self::Month => unit,
            Self::Quarter => unit * 3,
            Self::Year => 1,
        }
    }

    pub fn resolve(self, cell: &CellValue) -> u32 {
        self.try_resolve(cell).unwrap_or(1)
    }

    pub fn try_resolve(self, cell: &CellValue) -> Option<u32> {
        match self {
            Self::Month => try_resolve_month(cell),
            Self::Quarter => try_resolve_quarter(cell),
            Self::Year => Some(1),
        }
    }
}

/// A resolved (year, period) position with its chronological anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: i32,
    pub unit: u32,
    pub anchor: NaiveDate,
}

impl PeriodKey {
    pub fn new(kind: PeriodKind, year: i32, unit: u32) -> Option<Self> {
        let anchor = period_anchor(year, kind.anchor_month(unit))?;
        Some(Self { year, unit, anchor })
    }
}

pub fn resolve_month(cell: &CellValue) -> u32 {
    try_resolve_month(cell).unwrap_or(1)
}

pub fn try_resolve_month(cell: &CellValue) -> Option<u32> {
    match cell {
        CellValue::Int(v) => in_range(*v as f64, 12),
        CellValue::Float(v) => in_range(*v, 12),
        CellValue::Empty => None,
        CellValue::Text(s) => {
            let token = s.trim().to_lowercase();
            if let Ok(v) = token.parse::<f64>() {
                return in_range(v, 12);
            }
            if let Some(idx) = MONTH_NAMES.iter().position(|m| m.to_lowercase() == token) {
                return Some(idx as u32 + 1);
            }
            let prefix: String = token.chars().take(3).collect();
            MONTH_PREFIXES
                .iter()
                .find(|(p, _)| *p == prefix)
                .map(|(_, m)| *m)
        }
    }
}

pub fn resolve_quarter(cell: &CellValue) -> u32 {
    try_resolve_quarter(cell).unwrap_or(1)
}

pub fn try_resolve_quarter(cell: &CellValue) -> Option<u32> {
    match cell {
        CellValue::Int(v) => in_range(*v as f64, 4),
        CellValue::Float(v) => in_range(*v, 4),
        CellValue::Empty => None,
        CellValue::Text(s) => {
            let token = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            let numeral = QUARTER_PREFIXES
                .iter()
                .find_map(|p| token.strip_prefix(p))
                .unwrap_or(&token)
                .trim();

            if let Ok(v) = numeral.parse::<u32>() {
                return (1..=4).contains(&v).then_some(v);
            }
            ROMAN_QUARTERS
                .iter()
                .find(|(r, _)| *r == numeral)
                .map(|(_, q)| *q)
        }
    }
}

fn in_range(value: f64, max: u32) -> Option<u32> {
    if !value.is_finite() {
        return None;
    }
    let truncated = value.trunc();
    (truncated >= 1.0 && truncated <= max as f64).then_some(truncated as u32)
}

/// Indonesian month name for 1-12, or the number itself otherwise.
pub fn month_name(month: u32) -> String {
    match month {
        1..=12 => MONTH_NAMES[month as usize - 1].to_string(),
        _ => month.to_string(),
    }
}

pub fn quarter_label(quarter: u32) -> String {
    match ROMAN_QUARTERS.get(quarter.wrapping_sub(1) as usize) {
        Some((roman, _)) => format!("Triw {}", roman.to_uppercase()),
        None => format!("Triw {}", quarter),
    }
}
