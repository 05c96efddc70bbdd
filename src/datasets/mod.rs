//! Built-in dataset descriptors and the context builder of each dashboard
//! page.

pub mod banking;
pub mod commodity;
pub mod credit_location;
pub mod insurance;
pub mod pension;

use crate::aggregate::{Aggregator, PeriodSeries};
use crate::error::{DashboardError, Result};
use crate::filter::{select, FilterSelections, Scope};
use crate::growth::{compute_growth_with, Growth, GrowthPolicy};
use crate::numeric::NumberFormat;
use crate::schema::{ColumnSpec, DatasetSchema, DimensionRole, DimensionSpec, MeasureKind, MeasureSpec};
use crate::table::CanonicalTable;

pub const BANKING: &str = "banking";
pub const BANKING_UMKM: &str = "banking_umkm";
pub const BANKING_SCHEME: &str = "banking_scheme";
pub const INSURANCE: &str = "insurance";
pub const PENSION: &str = "pension";
pub const COMMODITY: &str = "commodity";
pub const COMMODITY_REGENCY: &str = "commodity_regency";
pub const FARMERS: &str = "farmers";
pub const CREDIT_LOCATION: &str = "credit_location";

pub fn default_schemas() -> Vec<DatasetSchema> {
    vec![
        banking::schema(),
        banking::umkm_schema(),
        banking::scheme_schema(),
        insurance::schema(),
        pension::schema(),
        commodity::schema(),
        commodity::regency_schema(),
        commodity::farmers_schema(),
        credit_location::schema(),
    ]
}

pub fn schema_for(id: &str) -> Result<DatasetSchema> {
    default_schemas()
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| DashboardError::UnknownDataset(id.to_string()))
}

/// A dashboard page: the unit a context is built for. The banking and
/// commodity pages combine three tables, every other page reads one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Banking,
    Insurance,
    Pension,
    Commodity,
    CreditLocation,
}

impl Page {
    pub fn parse(id: &str) -> Result<Self> {
        match id.trim().to_lowercase().as_str() {
            BANKING | "perbankan" => Ok(Self::Banking),
            INSURANCE | "asuransi" => Ok(Self::Insurance),
            PENSION | "dana_pensiun" => Ok(Self::Pension),
            COMMODITY | "komoditas" => Ok(Self::Commodity),
            CREDIT_LOCATION | "kredit_lokasi" => Ok(Self::CreditLocation),
            _ => Err(DashboardError::UnknownDataset(id.to_string())),
        }
    }

    /// The page's own dataset id.
    pub fn id(self) -> &'static str {
        match self {
            Self::Banking => BANKING,
            Self::Insurance => INSURANCE,
            Self::Pension => PENSION,
            Self::Commodity => COMMODITY,
            Self::CreditLocation => CREDIT_LOCATION,
        }
    }
}

pub(crate) fn dimension(name: &str, role: DimensionRole) -> DimensionSpec {
    DimensionSpec {
        column: ColumnSpec::named(name),
        role,
    }
}

pub(crate) fn additive(column: ColumnSpec, format: NumberFormat) -> MeasureSpec {
    MeasureSpec {
        column,
        kind: MeasureKind::Additive,
        format,
        normalization: None,
    }
}

/// Growth figures of one dataset for a selection: the dimension-filtered
/// series, evaluated at the selected year and period.
pub(crate) struct Kpis {
    series: PeriodSeries,
    year: Option<i32>,
    unit: Option<u32>,
    policy: GrowthPolicy,
}

impl Kpis {
    pub(crate) fn new(
        table: &CanonicalTable,
        selections: &FilterSelections,
        scope: &Scope,
        policy: GrowthPolicy,
    ) -> Self {
        let filtered = select(table, selections, scope);
        Self {
            series: Aggregator::for_table(table).aggregate(filtered.records.iter().copied()),
            year: selections.year(),
            unit: selections.period_unit(table),
            policy,
        }
    }

    pub(crate) fn growth(&self, measure: &str) -> Growth {
        compute_growth_with(&self.series, measure, self.year, self.unit, &self.policy)
    }

    pub(crate) fn series(&self) -> &PeriodSeries {
        &self.series
    }

    /// The series cut at the selected position, for "last N periods" charts.
    pub(crate) fn series_until_selection(&self) -> PeriodSeries {
        self.series.truncate_at(self.year, self.unit)
    }
}
