//! # Financial Sector Dashboard
//!
//! Loads periodic financial-sector statistics (banking, insurance, pension
//! funds, commodities, credit by location), normalizes them into canonical
//! tables and computes the figures a dashboard page shows: KPI values with
//! Year-over-Year and Year-to-Date growth, chart series and filter options.
//!
//! ## Core Concepts
//!
//! - **Dataset Schema**: a declarative descriptor of one dataset (columns,
//!   aliases, number formats, period granularity, measure tags)
//! - **Source Fallback**: every dataset is read from the SQLite database
//!   first and from its spreadsheet when the database is missing, failing or
//!   empty
//! - **Canonical Table**: cleaned records, identical whichever source served
//!   them
//! - **Measure Tags**: additive measures are summed when merged, ratio
//!   measures are averaged
//! - **Advisory Filters**: a filter that would leave no rows is discarded
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_sector_dashboard::*;
//!
//! let config = DashboardConfig::from_path("dashboard.json")?;
//! let dashboard = Dashboard::new(config);
//!
//! let selections = FilterSelections::new()
//!     .with_dimension("Provinsi", "Sumatera Selatan")
//!     .with_year(2024)
//!     .with_period(12);
//! let ctx = dashboard.build_context("perbankan", &selections)?;
//! println!("{}", ctx.to_json()?);
//! ```

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod context;
pub mod datasets;
pub mod error;
pub mod filter;
pub mod growth;
pub mod loader;
pub mod numeric;
pub mod period;
pub mod schema;
pub mod source;
pub mod table;
pub mod utils;

pub use aggregate::{Aggregator, ChartPoint, Interval, PeriodRow, PeriodSeries};
pub use cache::TableCache;
pub use config::{DashboardConfig, ParseMode, SheetFormat};
pub use context::{ContextValue, DashboardContext};
pub use datasets::{default_schemas, schema_for, Page};
pub use error::{DashboardError, Result};
pub use filter::{select, FilterSelections, Filtered, PeriodToken, Scope, Selected};
pub use growth::{compute_growth, compute_growth_with, resolve_current, Growth, GrowthClass, GrowthPolicy};
pub use loader::SourceLoader;
pub use numeric::{parse_locale_number, parse_percent, CellValue, NumberFormat};
pub use period::{PeriodKey, PeriodKind};
pub use schema::*;
pub use source::{CsvSource, InMemorySource, RawTable, SqliteSource, TabularSource, WorkbookSource};
pub use table::{CanonicalRecord, CanonicalTable, ParseWarning};

use datasets::banking::BankingPolicies;
use datasets::{
    banking, commodity, credit_location, insurance, pension, BANKING_SCHEME, BANKING_UMKM, COMMODITY_REGENCY,
    FARMERS,
};
use log::{debug, info, warn};
use std::sync::Arc;

/// Entry point of the library: owns the configuration, the source loader
/// and the table cache, and builds page contexts on request.
pub struct Dashboard {
    config: DashboardConfig,
    loader: SourceLoader,
    cache: TableCache,
    schemas: Vec<DatasetSchema>,
}

impl Dashboard {
    pub fn new(config: DashboardConfig) -> Self {
        let loader = SourceLoader::from_config(&config);
        Self::with_loader(config, loader)
    }

    /// Uses an explicitly built loader, e.g. one over in-memory sources.
    pub fn with_loader(config: DashboardConfig, loader: SourceLoader) -> Self {
        Self {
            config,
            loader,
            cache: TableCache::new(),
            schemas: default_schemas(),
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    pub fn schema(&self, dataset: &str) -> Result<&DatasetSchema> {
        self.schemas
            .iter()
            .find(|s| s.id == dataset)
            .ok_or_else(|| DashboardError::UnknownDataset(dataset.to_string()))
    }

    /// The canonical table of a dataset, loaded once and then served from
    /// the cache.
    pub fn table(&self, dataset: &str) -> Result<Arc<CanonicalTable>> {
        let schema = self.schema(dataset)?;
        self.cache.get_or_load(dataset, || self.loader.load(schema))
    }

    /// Drops a cached table so the next request reloads it.
    pub fn refresh(&self, dataset: &str) -> bool {
        let dropped = self.cache.invalidate(dataset);
        if dropped {
            info!("Dropped cached table for '{}'", dataset);
        }
        dropped
    }

    fn policy(&self, dataset: &str) -> Result<GrowthPolicy> {
        let schema = self.schema(dataset)?;
        Ok(self.config.growth_policy(dataset, schema.growth))
    }

    /// Secondary panels degrade to empty when their dataset fails.
    fn optional_table(&self, dataset: &str) -> Option<Arc<CanonicalTable>> {
        match self.table(dataset) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!("Panel dataset '{}' unavailable, showing it empty: {}", dataset, e);
                None
            }
        }
    }

    /// Builds the context of a dashboard page. `page` accepts dataset ids
    /// (`banking`) and the Indonesian page names (`perbankan`).
    pub fn build_context(&self, page: &str, selections: &FilterSelections) -> Result<DashboardContext> {
        let page = Page::parse(page)?;
        let id = page.id();
        info!("Building context for '{}'", id);
        debug!("Selections: {:?}", selections);

        let ctx = match page {
            Page::Banking => {
                let summary = self.table(id)?;
                let umkm = self.optional_table(BANKING_UMKM);
                let scheme = self.optional_table(BANKING_SCHEME);
                let policies = BankingPolicies {
                    summary: self.policy(id)?,
                    umkm: self.policy(BANKING_UMKM)?,
                };
                banking::build_context(&summary, umkm.as_deref(), scheme.as_deref(), selections, policies)
            }
            Page::Insurance => {
                let table = self.table(id)?;
                insurance::build_context(&table, selections, self.policy(id)?)
            }
            Page::Pension => {
                let table = self.table(id)?;
                pension::build_context(&table, selections, self.policy(id)?)
            }
            Page::Commodity => {
                let table = self.table(id)?;
                let regency = self.optional_table(COMMODITY_REGENCY);
                let farmers = self.optional_table(FARMERS);
                commodity::build_context(&table, regency.as_deref(), farmers.as_deref(), selections)
            }
            Page::CreditLocation => {
                let table = self.table(id)?;
                credit_location::build_context(&table, selections)
            }
        };

        debug!("Context for '{}' has {} keys", id, ctx.len());
        Ok(ctx)
    }
}

pub fn build_dashboard_context(
    config: DashboardConfig,
    page: &str,
    selections: &FilterSelections,
) -> Result<DashboardContext> {
    Dashboard::new(config).build_context(page, selections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::PENSION;

    fn pension_raw() -> RawTable {
        let columns = ["Negara", "Provinsi", "Tahun", "Bulan", "Aset", "Aset Neto", "Investasi", "Jumlah Dana Pensiun"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let row = |year: i64, month: i64, aset: f64| {
            vec![
                CellValue::text("Indonesia"),
                CellValue::text("Sumatera Selatan"),
                CellValue::Int(year),
                CellValue::Int(month),
                CellValue::Float(aset),
                CellValue::Float(aset / 2.0),
                CellValue::Float(aset / 4.0),
                CellValue::Int(3),
            ]
        };
        RawTable::new(columns, vec![row(2023, 12, 100.0), row(2024, 12, 150.0)])
    }

    fn dashboard() -> Dashboard {
        let loader = SourceLoader::new(
            Box::new(InMemorySource::new("database").with_table(PENSION, pension_raw())),
            Box::new(InMemorySource::new("workbook")),
        );
        Dashboard::with_loader(DashboardConfig::default(), loader)
    }

    #[test]
    fn test_build_context_caches_tables() {
        let dashboard = dashboard();
        let ctx = dashboard
            .build_context("dana_pensiun", &FilterSelections::new())
            .unwrap();
        assert_eq!(ctx.number("dp_aset_val"), Some(150.0));
        assert!((ctx.number("dp_aset_yoy").unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(dashboard.cache().len(), 1);

        dashboard.build_context("pension", &FilterSelections::new()).unwrap();
        assert_eq!(dashboard.cache().len(), 1);
        assert!(dashboard.refresh(PENSION));
        assert!(dashboard.cache().is_empty());
    }

    #[test]
    fn test_unknown_page_and_unavailable_dataset() {
        let dashboard = dashboard();
        let err = dashboard.build_context("saham", &FilterSelections::new()).unwrap_err();
        assert!(matches!(err, DashboardError::UnknownDataset(_)));

        let err = dashboard.build_context("asuransi", &FilterSelections::new()).unwrap_err();
        assert!(matches!(err, DashboardError::DataUnavailable { .. }));
        assert!(err.is_dataset_failure());
        assert!(dashboard.cache().is_empty());
    }

    #[test]
    fn test_growth_override_from_config() {
        let mut config = DashboardConfig::default();
        config.growth_overrides.insert(PENSION.to_string(), GrowthPolicy::banking());
        let loader = SourceLoader::new(
            Box::new(InMemorySource::new("database")),
            Box::new(InMemorySource::new("workbook")),
        );
        let dashboard = Dashboard::with_loader(config, loader);
        assert_eq!(dashboard.policy(PENSION).unwrap(), GrowthPolicy::banking());
        assert_eq!(dashboard.policy(BANKING_UMKM).unwrap(), GrowthPolicy::banking());
        assert!(dashboard.schema("nope").is_err());
    }
}
