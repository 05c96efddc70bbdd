//! Year-over-Year and Year-to-Date growth.
//!
//! Absent growth (`None`) means "no comparable baseline" and is never
//! coerced to 0%.

use crate::aggregate::{PeriodRow, PeriodSeries};
use crate::period::PeriodKey;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GrowthPolicy {
    #[serde(default)]
    #[schemars(description = "Growth magnitudes above this percentage are treated as corrupt data and become absent.")]
    pub max_abs_pct: Option<f64>,

    #[serde(default)]
    #[schemars(description = "Require a strictly positive baseline instead of a non-zero one.")]
    pub positive_baseline_only: bool,

    #[serde(default)]
    #[schemars(description = "Negative current values are reported as 0 before growth is computed.")]
    pub clamp_negative_current: bool,
}

impl GrowthPolicy {
    /// The guarded policy of the banking datasets.
    pub fn banking() -> Self {
        Self {
            max_abs_pct: Some(10_000.0),
            positive_baseline_only: true,
            clamp_negative_current: true,
        }
    }

    fn change_pct(&self, current: f64, baseline: f64) -> Option<f64> {
        let usable = if self.positive_baseline_only {
            baseline > 0.0
        } else {
            baseline != 0.0
        };
        if !usable {
            return None;
        }
        let pct = (current - baseline) / baseline * 100.0;
        match self.max_abs_pct {
            Some(limit) if pct.abs() > limit => {
                debug!("Growth {:.2}% exceeds plausibility limit {}%", pct, limit);
                None
            }
            _ => Some(pct),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum GrowthClass {
    #[serde(rename = "success")]
    Positive,
    #[serde(rename = "danger")]
    Negative,
    #[serde(rename = "secondary")]
    Neutral,
}

impl GrowthClass {
    pub fn of(value: Option<f64>) -> Self {
        match value {
            None => Self::Neutral,
            Some(v) if v.abs() < 1e-9 => Self::Neutral,
            Some(v) if v >= 0.0 => Self::Positive,
            Some(_) => Self::Negative,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "success",
            Self::Negative => "danger",
            Self::Neutral => "secondary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Growth {
    pub current: f64,
    pub yoy: Option<f64>,
    pub ytd: Option<f64>,
    /// The observation the figures were computed for.
    pub period: Option<PeriodKey>,
}

impl Growth {
    pub fn empty() -> Self {
        Self {
            current: 0.0,
            yoy: None,
            ytd: None,
            period: None,
        }
    }

    pub fn yoy_class(&self) -> GrowthClass {
        GrowthClass::of(self.yoy)
    }

    pub fn ytd_class(&self) -> GrowthClass {
        GrowthClass::of(self.ytd)
    }
}

/// Picks the "current" row for a selection:
///
/// 1. exact (year, period) match;
/// 2. otherwise the latest row of that year at or before the period;
/// 3. with only a year, the latest row of that year;
/// 4. when nothing above matches, or no year is given, the latest row overall.
pub fn resolve_current(
    series: &PeriodSeries,
    target_year: Option<i32>,
    target_period: Option<u32>,
) -> Option<&PeriodRow> {
    if let Some(year) = target_year {
        let found = match target_period {
            Some(unit) => series
                .find(year, unit)
                .or_else(|| series.rows_in_year(year).filter(|r| r.unit() <= unit).last()),
            None => series.rows_in_year(year).last(),
        };
        if found.is_some() {
            return found;
        }
        debug!(
            "No observation for {}/{:?}, using the latest period",
            year, target_period
        );
    }
    series.latest()
}

/// Growth under the default policy: any non-zero baseline, no plausibility
/// limit.
pub fn compute_growth(
    series: &PeriodSeries,
    measure: &str,
    target_year: Option<i32>,
    target_period: Option<u32>,
) -> Growth {
    compute_growth_with(series, measure, target_year, target_period, &GrowthPolicy::default())
}

pub fn compute_growth_with(
    series: &PeriodSeries,
    measure: &str,
    target_year: Option<i32>,
    target_period: Option<u32>,
    policy: &GrowthPolicy,
) -> Growth {
    let Some(current_row) = resolve_current(series, target_year, target_period) else {
        return Growth::empty();
    };

    let mut current = current_row.value(measure);
    if policy.clamp_negative_current && current < 0.0 {
        current = 0.0;
    }

    let yoy = series
        .find(current_row.year() - 1, current_row.unit())
        .and_then(|prior| policy.change_pct(current, prior.value(measure)));

    let ytd = series
        .rows_in_year(current_row.year())
        .next()
        .and_then(|baseline| policy.change_pct(current, baseline.value(measure)));

    Growth {
        current,
        yoy,
        ytd,
        period: Some(current_row.key),
    }
}
