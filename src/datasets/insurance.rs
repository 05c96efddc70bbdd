//! Insurance (Asuransi), quarterly.

use super::{additive, dimension, Kpis, INSURANCE};
use crate::aggregate::Aggregator;
use crate::context::DashboardContext;
use crate::filter::{select, FilterSelections, Scope};
use crate::growth::GrowthPolicy;
use crate::numeric::NumberFormat;
use crate::period::PeriodKind;
use crate::schema::{
    ColumnSpec, DatasetSchema, Derivation, DerivedMeasure, DimensionRole, MeasureKind, SheetLayout, TimeAxis,
};
use crate::table::CanonicalTable;

pub const PREMI: &str = "Premi";
pub const KLAIM: &str = "Klaim";
pub const PESERTA_PREMI: &str = "Peserta Premi";
pub const PESERTA_KLAIM: &str = "Peserta Klaim";
pub const POLIS_PREMI: &str = "Polis Premi";
pub const POLIS_KLAIM: &str = "Polis Klaim";
pub const LOSS_RATIO: &str = "Loss Ratio";
pub const LOSS_RATIO_PESERTA: &str = "Loss Ratio Peserta";

pub fn schema() -> DatasetSchema {
    DatasetSchema {
        id: INSURANCE.to_string(),
        title: "Asuransi".to_string(),
        query: Some(
            r#"SELECT "Provinsi", "Kabupaten", "Periode", "Tahun", "Jenis", "Premi (Rp Juta)", "Klaim (Rp Juta)", "Jumlah Peserta Premi", "Jumlah Peserta Klaim ", "Jumlah Polis Premi", "Jumlah Polis Klaim " FROM asuransi ORDER BY "Tahun", "Periode", "Provinsi""#
                .to_string(),
        ),
        sheet: SheetLayout::simple("KINERJA NONBANK.xlsx", "ASURANSI"),
        time: TimeAxis::Timed {
            year: ColumnSpec::named("Tahun"),
            period: Some(ColumnSpec::named("Periode")),
            kind: PeriodKind::Quarter,
        },
        dimensions: vec![
            dimension("Provinsi", DimensionRole::Region),
            dimension("Kabupaten", DimensionRole::Region),
            dimension("Jenis", DimensionRole::Category),
        ],
        measures: vec![
            additive(ColumnSpec::with_aliases(PREMI, &["Premi (Rp Juta)"]), NumberFormat::Localized),
            additive(ColumnSpec::with_aliases(KLAIM, &["Klaim (Rp Juta)"]), NumberFormat::Localized),
            additive(
                ColumnSpec::with_aliases(PESERTA_PREMI, &["Jumlah Peserta Premi"]),
                NumberFormat::Count,
            ),
            additive(
                ColumnSpec::with_aliases(PESERTA_KLAIM, &["Jumlah Peserta Klaim", "Jumlah Peserta Klaim "]),
                NumberFormat::Count,
            ),
            additive(
                ColumnSpec::with_aliases(POLIS_PREMI, &["Jumlah Polis Premi"]),
                NumberFormat::Count,
            ),
            additive(
                ColumnSpec::with_aliases(POLIS_KLAIM, &["Jumlah Polis Klaim", "Jumlah Polis Klaim "]),
                NumberFormat::Count,
            ),
        ],
        derived: vec![
            DerivedMeasure {
                name: LOSS_RATIO.to_string(),
                kind: MeasureKind::Ratio,
                derivation: Derivation::RatioPct {
                    numerator: KLAIM.to_string(),
                    denominator: PREMI.to_string(),
                },
            },
            DerivedMeasure {
                name: LOSS_RATIO_PESERTA.to_string(),
                kind: MeasureKind::Ratio,
                derivation: Derivation::RatioPct {
                    numerator: PESERTA_KLAIM.to_string(),
                    denominator: PESERTA_PREMI.to_string(),
                },
            },
        ],
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
    let mut ctx = DashboardContext::new(INSURANCE);
    ctx.insert_options("provinsi_list", table.distinct("Provinsi"));
    ctx.insert_options("kabupaten_list", table.distinct("Kabupaten"));
    ctx.insert_options("jenis_list", table.distinct("Jenis"));
    ctx.insert_years("tahun_list", table.years());
    ctx.insert_options("periode_list", table.period_labels());

    let aggregator = Aggregator::for_table(table);

    // Totals over the selected year and quarter.
    let selected = select(table, selections, &Scope::full());
    let totals = aggregator.totals(selected.records.iter().copied());
    let total = |name: &str| totals.get(name).copied().unwrap_or(0.0);
    ctx.insert_number("as_premi_total", total(PREMI));
    ctx.insert_number("as_klaim_total", total(KLAIM));
    ctx.insert_number("as_loss_ratio_klaim", total(LOSS_RATIO));
    ctx.insert_number("as_peserta_premi", total(PESERTA_PREMI));
    ctx.insert_number("as_peserta_klaim", total(PESERTA_KLAIM));
    ctx.insert_number("as_polis_premi", total(POLIS_PREMI));
    ctx.insert_number("as_polis_klaim", total(POLIS_KLAIM));
    ctx.insert_number("as_loss_ratio_peserta", total(LOSS_RATIO_PESERTA));

    let kpis = Kpis::new(table, selections, &Scope::dimensions_only(), policy);
    ctx.insert_kpi("as_premi", &kpis.growth(PREMI));
    ctx.insert_kpi("as_klaim", &kpis.growth(KLAIM));

    ctx.insert_chart(
        "as_trend_labels",
        &kpis.series().labeled_points(),
        &[
            ("as_trend_premi", PREMI),
            ("as_trend_klaim", KLAIM),
            ("as_trend_lossratio", LOSS_RATIO),
        ],
    );

    let mut shares = aggregator.group_totals(selected.records.iter().copied(), "Jenis");
    shares.sort_by(|a, b| b.value(PREMI).total_cmp(&a.value(PREMI)));
    ctx.insert_chart("as_share_labels", &shares, &[("as_share_values", PREMI)]);

    ctx
}
