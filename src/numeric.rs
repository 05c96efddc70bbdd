//! Locale-aware numeric parsing for Indonesian-formatted statistics.
//!
//! Source tables write `1.234.567,89` for 1234567.89 and `3,16%` for a
//! percentage. Every parser here is total: malformed input becomes `0.0`.
//! Callers that need to tell "absent" from "zero" use the `try_` variants.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A raw cell as delivered by a tabular source, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Int(i64),
    Float(f64),
    Text(String),
    Empty,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Float(v) => v.is_nan(),
            Self::Int(_) => false,
        }
    }

    /// Trimmed textual form, `None` for empty cells and the textual NaN
    /// markers spreadsheets tend to leave behind.
    pub fn as_label(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let s = self.to_string();
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "" | "nan" | "none" => None,
            _ => Some(trimmed.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
                    write!(f, "{}", *v as i64)
                } else {
                    write!(f, "{}", v)
                }
            }
            Self::Text(s) => write!(f, "{}", s),
            Self::Empty => Ok(()),
        }
    }
}

/// How the text form of a measure column is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    /// `1.234,5` style: dots are thousands separators, comma is decimal.
    #[default]
    Localized,
    /// Ratio columns: `%` and spaces stripped, comma becomes dot. Dots are
    /// kept because these columns also carry plain decimals like `0.0316`.
    Percent,
    /// Integer counts written with thousands dots, e.g. `12.345` accounts.
    Count,
}

impl NumberFormat {
    pub fn parse(self, cell: &CellValue) -> f64 {
        self.try_parse(cell).unwrap_or(0.0)
    }

    pub fn try_parse(self, cell: &CellValue) -> Option<f64> {
        let value = match cell {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) if v.is_finite() => Some(*v),
            CellValue::Float(_) | CellValue::Empty => None,
            CellValue::Text(s) => match self {
                Self::Localized => try_parse_locale_number(s),
                Self::Percent => try_parse_percent(s),
                Self::Count => try_parse_locale_number(s),
            },
        }?;

        match self {
            Self::Count => Some(value.round()),
            _ => Some(value),
        }
    }
}

/// Parses an Indonesian-formatted number. Never fails: anything that does
/// not parse yields `0.0`.
///
/// The percent sign is stripped but the value is not divided by 100.
pub fn parse_locale_number(raw: &str) -> f64 {
    try_parse_locale_number(raw).unwrap_or(0.0)
}

pub fn try_parse_locale_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '%' && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    parse_finite(&cleaned)
}

/// Parses a ratio column cell such as `3,16%`, `3,16` or `0.0316`.
pub fn parse_percent(raw: &str) -> f64 {
    try_parse_percent(raw).unwrap_or(0.0)
}

pub fn try_parse_percent(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '%')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    parse_finite(&cleaned)
}

fn parse_finite(cleaned: &str) -> Option<f64> {
    if cleaned.is_empty() {
        return None;
    }
    // `f64::from_str` accepts "nan" and "inf", which are never real data here.
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
