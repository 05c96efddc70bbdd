//! Pension funds (Dana Pensiun), monthly.

use super::{additive, dimension, Kpis, PENSION};
use crate::context::DashboardContext;
use crate::filter::{FilterSelections, Scope};
use crate::growth::GrowthPolicy;
use crate::numeric::NumberFormat;
use crate::period::PeriodKind;
use crate::schema::{ColumnSpec, DatasetSchema, DimensionRole, SheetLayout, TimeAxis};
use crate::table::CanonicalTable;
use crate::utils::{december_label, share_pct, tail};

pub const ASET: &str = "Aset";
pub const ASET_NETO: &str = "Aset Neto";
pub const INVESTASI: &str = "Investasi";
pub const JUMLAH: &str = "Jumlah Dana Pensiun";

pub fn schema() -> DatasetSchema {
    DatasetSchema {
        id: PENSION.to_string(),
        title: "Dana Pensiun".to_string(),
        query: Some(
            r#"SELECT "Negara", "Provinsi", "Tahun", "Bulan", "Aset (Rp Miliar)", "Aset Neto (Rp Miliar)", "Investasi (Rp Miliar)", "Jumlah Dana Pensiun" FROM dana_pensiun ORDER BY "Tahun", "Bulan", "Provinsi""#
                .to_string(),
        ),
        sheet: SheetLayout::simple("KINERJA NONBANK.xlsx", "DANA PENSIUN"),
        time: TimeAxis::Timed {
            year: ColumnSpec::named("Tahun"),
            period: Some(ColumnSpec::named("Bulan")),
            kind: PeriodKind::Month,
        },
        dimensions: vec![
            dimension("Negara", DimensionRole::Region),
            dimension("Provinsi", DimensionRole::Region),
        ],
        measures: vec![
            additive(ColumnSpec::with_aliases(ASET, &["Aset (Rp Miliar)"]), NumberFormat::Localized),
            additive(
                ColumnSpec::with_aliases(ASET_NETO, &["Aset Neto (Rp Miliar)"]),
                NumberFormat::Localized,
            ),
            additive(
                ColumnSpec::with_aliases(INVESTASI, &["Investasi (Rp Miliar)"]),
                NumberFormat::Localized,
            ),
            additive(ColumnSpec::named(JUMLAH), NumberFormat::Count),
        ],
        derived: Vec::new(),
        row_filters: Vec::new(),
        table_normalizations: Vec::new(),
        drop_blank_dimensions: false,
        growth: GrowthPolicy::default(),
    }
}

pub fn build_context(
    table: &CanonicalTable,
    selections: &FilterSelections,
    policy: GrowthPolicy,
) -> DashboardContext {
    let mut ctx = DashboardContext::new(PENSION);
    ctx.insert_options("negara_list", table.distinct("Negara"));
    ctx.insert_options("provinsi_list", table.distinct("Provinsi"));
    ctx.insert_years("tahun_list", table.years());
    ctx.insert_integers("bulan_list", table.units().into_iter().map(i64::from).collect());
    ctx.insert_text("interval_selected", selections.interval.as_str());

    let kpis = Kpis::new(table, selections, &Scope::dimensions_only(), policy);
    ctx.insert_kpi("dp_aset", &kpis.growth(ASET));
    ctx.insert_kpi("dp_asetnet", &kpis.growth(ASET_NETO));
    ctx.insert_kpi("dp_invest", &kpis.growth(INVESTASI));
    ctx.insert_kpi("dp_jumlah", &kpis.growth(JUMLAH));

    let series = kpis.series();
    ctx.insert_chart(
        "dp_year_labels",
        &series.by_year(),
        &[
            ("dp_year_aset", ASET),
            ("dp_year_asetnet", ASET_NETO),
            ("dp_year_invest", INVESTASI),
            ("dp_year_jumlah", JUMLAH),
        ],
    );

    ctx.insert_chart(
        "dp_mini_labels",
        &tail(&series.labeled_points(), 3),
        &[
            ("dp_mini_aset", ASET),
            ("dp_mini_invest", INVESTASI),
            ("dp_mini_jumlah", JUMLAH),
        ],
    );

    // Investment and net assets as a share of assets, every December.
    let decembers = series.points_for_unit(12);
    ctx.insert_options(
        "dp_ratio_labels",
        decembers.iter().map(|r| december_label(r.year())).collect(),
    );
    ctx.insert_values(
        "dp_ratio_invest",
        decembers
            .iter()
            .map(|r| share_pct(r.value(INVESTASI), r.value(ASET)))
            .collect(),
    );
    ctx.insert_values(
        "dp_ratio_asetnet",
        decembers
            .iter()
            .map(|r| share_pct(r.value(ASET_NETO), r.value(ASET)))
            .collect(),
    );

    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SourceLoader;
    use crate::numeric::CellValue;
    use crate::source::{InMemorySource, RawTable};

    fn table() -> CanonicalTable {
        let columns = [
            "Negara",
            "Provinsi",
            "Tahun",
            "Bulan",
            "Aset (Rp Miliar)",
            "Aset Neto (Rp Miliar)",
            "Investasi (Rp Miliar)",
            "Jumlah Dana Pensiun",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        let row = |prov: &str, year: i64, month: &str, aset: &str, neto: &str, inv: &str, n: i64| {
            vec![
                CellValue::text("Indonesia"),
                CellValue::text(prov),
                CellValue::Int(year),
                CellValue::text(month),
                CellValue::text(aset),
                CellValue::text(neto),
                CellValue::text(inv),
                CellValue::Int(n),
            ]
        };
        let raw = RawTable::new(
            columns,
            vec![
                row("Sumatera Selatan", 2023, "Desember", "1.000", "900", "800", 4),
                row("Jambi", 2023, "Desember", "1.000", "800", "700", 2),
                row("Sumatera Selatan", 2024, "Jan", "1.100", "950", "850", 4),
                row("Sumatera Selatan", 2024, "Nov", "1.150", "1.000", "900", 4),
                row("Sumatera Selatan", 2024, "Des", "1.200", "1.050", "960", 5),
            ],
        );
        let loader = SourceLoader::new(
            Box::new(InMemorySource::new("database").with_table(PENSION, raw)),
            Box::new(InMemorySource::new("workbook")),
        );
        loader.load(&schema()).unwrap()
    }

    #[test]
    fn test_kpis_for_region() {
        let t = table();
        let sel = FilterSelections::new().with_dimension("provinsi", "Sumatera Selatan");
        let ctx = build_context(&t, &sel, GrowthPolicy::default());
        assert_eq!(ctx.number("dp_aset_val"), Some(1200.0));
        assert!((ctx.number("dp_aset_yoy").unwrap() - 20.0).abs() < 1e-9);
        assert!((ctx.number("dp_aset_ytd").unwrap() - 100.0 / 11.0).abs() < 1e-9);
        assert_eq!(ctx.number("dp_jumlah_val"), Some(5.0));
        assert_eq!(ctx.labels("dp_mini_labels").unwrap(), ["Jan '24", "Nov '24", "Dec '24"]);
        assert_eq!(ctx.labels("dp_ratio_labels").unwrap(), ["Des'23", "Des'24"]);
        assert!((ctx.series("dp_ratio_invest").unwrap()[1] - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_unfiltered_sums_regions() {
        let t = table();
        let ctx = build_context(&t, &FilterSelections::new().with_year(2023), GrowthPolicy::default());
        assert_eq!(ctx.number("dp_aset_val"), Some(2000.0));
        assert_eq!(ctx.get("dp_aset_yoy"), Some(&crate::context::ContextValue::Number(None)));
        assert_eq!(ctx.labels("dp_year_labels").unwrap(), ["2023", "2024"]);
        assert_eq!(ctx.series("dp_year_aset").unwrap(), &[2000.0, 3450.0][..]);
        assert_eq!(ctx.labels("provinsi_list").unwrap(), ["Jambi", "Sumatera Selatan"]);
    }
}
