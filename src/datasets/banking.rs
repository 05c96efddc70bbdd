//! Banking (Perbankan), monthly.
//!
//! The banking page combines three tables: the provincial summary, credit
//! by business type (UMKM vs non-UMKM) and credit by scheme (conventional
//! vs sharia). The two secondary tables only honor the province filter.

use super::{dimension, Kpis, BANKING, BANKING_SCHEME, BANKING_UMKM};
use crate::aggregate::Aggregator;
use crate::context::DashboardContext;
use crate::filter::{anchor_period, select, FilterSelections, Scope};
use crate::growth::{Growth, GrowthPolicy};
use crate::numeric::NumberFormat;
use crate::period::PeriodKind;
use crate::schema::{
    ColumnSpec, DatasetSchema, Derivation, DerivedMeasure, DimensionRole, DimensionSpec, MeasureKind, MeasureSpec,
    Normalization, RowFilter, SheetLayout, TableNormalization, TimeAxis,
};
use crate::table::{CanonicalRecord, CanonicalTable};
use crate::utils::{december_label, round_to, share_pct, tail, title_case};
use std::collections::BTreeMap;

pub const TOTAL_ASET: &str = "Total Aset";
pub const GIRO: &str = "Giro";
pub const TABUNGAN: &str = "Tabungan";
pub const DEPOSITO: &str = "Deposito";
pub const TOTAL_DPK: &str = "Total DPK";
pub const MODAL_KERJA: &str = "Modal Kerja";
pub const INVESTASI: &str = "Investasi";
pub const KONSUMSI: &str = "Konsumsi";
pub const TOTAL_KREDIT: &str = "Total Kredit";
pub const NPL_GROSS_NOMINAL: &str = "Nominal NPL Gross";
pub const NPL_GROSS: &str = "Rasio NPL Gross";
pub const NPL_NET_NOMINAL: &str = "Nominal NPL Net";
pub const NPL_NET: &str = "Rasio NPL Net";
pub const LDR: &str = "Loan to Deposit Rastio (LDR)";
pub const KREDIT_PRODUKTIF: &str = "Kredit Produktif";
pub const KREDIT_KONSUMTIF: &str = "Kredit Konsumtif";

pub const UMKM_JENIS: &str = "Jenis";
pub const UMKM_KREDIT: &str = "Nominal Kredit";
pub const UMKM_NPL: &str = "Nominal NPL";
pub const UMKM_NPL_NET: &str = "Nominal NPL Net";
pub const UMKM_REKENING: &str = "Jumlah Rekening UMKM";
pub const UMKM_NPL_RATIO: &str = "NPL Ratio";
pub const UMKM_KREDIT_PER_REKENING: &str = "Kredit per Rekening";

pub const SKEMA: &str = "Skema";
pub const SCHEME_KREDIT: &str = "Kredit";

const PROVINSI: &str = "Provinsi";
const WORKBOOK: &str = "KINERJA PERBANKAN.xlsx";

/// Province spellings used by the December NPL/LDR trend.
const HOME_PROVINCE: [&str; 3] = ["SUMATERA SELATAN", "SUMATERASELATAN", "SUMSEL"];

/// NPL values above this (in percent) are corrupt and shown as 0.
const NPL_DISPLAY_LIMIT: f64 = 1000.0;

fn nominal(name: &str, aliases: &[&str]) -> MeasureSpec {
    MeasureSpec {
        column: ColumnSpec::with_aliases(name, aliases),
        kind: MeasureKind::Additive,
        format: NumberFormat::Localized,
        normalization: Some(Normalization::ZeroOutside { min: 0.001, max: 1e15 }),
    }
}

fn ratio(name: &str, aliases: &[&str]) -> MeasureSpec {
    MeasureSpec {
        column: ColumnSpec::with_aliases(name, aliases),
        kind: MeasureKind::Ratio,
        format: NumberFormat::Percent,
        normalization: Some(Normalization::PercentToFraction),
    }
}

fn monthly() -> TimeAxis {
    TimeAxis::Timed {
        year: ColumnSpec::named("Tahun"),
        period: Some(ColumnSpec::named("Bulan")),
        kind: PeriodKind::Month,
    }
}

pub fn schema() -> DatasetSchema {
    DatasetSchema {
        id: BANKING.to_string(),
        title: "Kinerja Perbankan".to_string(),
        query: Some(
            r#"SELECT "Negara", "Provinsi", "Tahun", "Bulan", "Total Aset", "Giro", "Tabungan", "Deposito", "Total DPK ", "Modal Kerja", "Investasi", "Konsumsi", "Total Kredit", "Nominal NPL Gross", "Rasio NPL Gross", "Nominal NPL Net", "Rasio NPL Net", "Loan to Deposit Rastio (LDR)" FROM kinerja_perbankan_summary ORDER BY "Tahun", "Bulan", "Provinsi""#
                .to_string(),
        ),
        sheet: SheetLayout::simple(WORKBOOK, "SUMMARY"),
        time: monthly(),
        dimensions: vec![
            dimension("Negara", DimensionRole::Region),
            dimension(PROVINSI, DimensionRole::Region),
        ],
        measures: vec![
            nominal(TOTAL_ASET, &[]),
            nominal(GIRO, &[]),
            nominal(TABUNGAN, &[]),
            nominal(DEPOSITO, &[]),
            nominal(TOTAL_DPK, &["Total DPK "]),
            nominal(MODAL_KERJA, &[]),
            nominal(INVESTASI, &[]),
            nominal(KONSUMSI, &[]),
            nominal(TOTAL_KREDIT, &[]),
            nominal(NPL_GROSS_NOMINAL, &[]),
            ratio(NPL_GROSS, &[]),
            nominal(NPL_NET_NOMINAL, &[]),
            ratio(NPL_NET, &[]),
            ratio(LDR, &["Loan to Deposit Ratio (LDR)", "LDR"]),
        ],
        derived: vec![
            DerivedMeasure {
                name: KREDIT_PRODUKTIF.to_string(),
                kind: MeasureKind::Additive,
                derivation: Derivation::Sum {
                    of: vec![MODAL_KERJA.to_string(), INVESTASI.to_string()],
                },
            },
            DerivedMeasure {
                name: KREDIT_KONSUMTIF.to_string(),
                kind: MeasureKind::Additive,
                derivation: Derivation::Alias {
                    of: KONSUMSI.to_string(),
                },
            },
        ],
        row_filters: Vec::new(),
        table_normalizations: Vec::new(),
        drop_blank_dimensions: false,
        growth: GrowthPolicy::banking(),
    }
}

/// Credit by business type. Column headers carry line breaks and units, so
/// measures are found by keyword.
pub fn umkm_schema() -> DatasetSchema {
    DatasetSchema {
        id: BANKING_UMKM.to_string(),
        title: "Kredit UMKM".to_string(),
        query: Some(r#"SELECT * FROM perbankan ORDER BY "Tahun", "Bulan", "Provinsi""#.to_string()),
        sheet: SheetLayout::simple(WORKBOOK, "PERBANKAN - Per Jenis Usaha"),
        time: monthly(),
        dimensions: vec![
            dimension(PROVINSI, DimensionRole::Region),
            DimensionSpec {
                column: ColumnSpec::by_keyword(UMKM_JENIS, "jenis kredit", None),
                role: DimensionRole::Category,
            },
        ],
        measures: vec![
            MeasureSpec {
                column: ColumnSpec::by_keyword(UMKM_KREDIT, "nominal kredit", None),
                kind: MeasureKind::Additive,
                format: NumberFormat::Localized,
                normalization: None,
            },
            MeasureSpec {
                column: ColumnSpec::by_keyword(UMKM_NPL, "nominal npl", Some("net")),
                kind: MeasureKind::Additive,
                format: NumberFormat::Localized,
                normalization: None,
            },
            MeasureSpec {
                column: ColumnSpec::by_keyword(UMKM_NPL_NET, "nominal npl net", None),
                kind: MeasureKind::Additive,
                format: NumberFormat::Localized,
                normalization: None,
            },
            MeasureSpec {
                column: ColumnSpec::by_keyword(UMKM_REKENING, "rekening", None),
                kind: MeasureKind::Additive,
                format: NumberFormat::Count,
                normalization: None,
            },
        ],
        derived: vec![
            DerivedMeasure {
                name: UMKM_NPL_RATIO.to_string(),
                kind: MeasureKind::Ratio,
                derivation: Derivation::RatioPct {
                    numerator: UMKM_NPL.to_string(),
                    denominator: UMKM_KREDIT.to_string(),
                },
            },
            DerivedMeasure {
                name: UMKM_KREDIT_PER_REKENING.to_string(),
                kind: MeasureKind::Ratio,
                derivation: Derivation::Quotient {
                    numerator: UMKM_KREDIT.to_string(),
                    denominator: UMKM_REKENING.to_string(),
                },
            },
        ],
        row_filters: Vec::new(),
        table_normalizations: Vec::new(),
        drop_blank_dimensions: false,
        growth: GrowthPolicy::banking(),
    }
}

/// Credit by scheme, province-level rows of commercial banks only.
pub fn scheme_schema() -> DatasetSchema {
    DatasetSchema {
        id: BANKING_SCHEME.to_string(),
        title: "Kredit Konvensional dan Syariah".to_string(),
        query: Some(
            r#"SELECT "Provinsi", "Kab/Kota", "Tahun", "Bulan", "Jenis Bank", "Skema", "Aset", "Kredit ", "DPK", "NPL" FROM daerah_perbankan ORDER BY "Tahun", "Bulan", "Provinsi""#
                .to_string(),
        ),
        sheet: SheetLayout::simple(WORKBOOK, "PERBANKAN - Per Daerah"),
        time: monthly(),
        dimensions: vec![
            dimension(PROVINSI, DimensionRole::Region),
            dimension("Kab/Kota", DimensionRole::Region),
            dimension("Jenis Bank", DimensionRole::Category),
            dimension(SKEMA, DimensionRole::Category),
        ],
        measures: vec![
            super::additive(ColumnSpec::named("Aset"), NumberFormat::Localized),
            super::additive(ColumnSpec::with_aliases(SCHEME_KREDIT, &["Kredit "]), NumberFormat::Localized),
            super::additive(ColumnSpec::named("DPK"), NumberFormat::Localized),
            super::additive(ColumnSpec::named("NPL"), NumberFormat::Localized),
        ],
        derived: Vec::new(),
        row_filters: vec![
            RowFilter::Contains {
                column: "Kab/Kota".to_string(),
                needle: "all".to_string(),
            },
            RowFilter::Contains {
                column: "Jenis Bank".to_string(),
                needle: "bank umum".to_string(),
            },
        ],
        // Some extracts report credit in Rupiah instead of billions.
        table_normalizations: vec![TableNormalization::ScaleWhenMaxExceeds {
            measure: SCHEME_KREDIT.to_string(),
            threshold: 1e9,
            divisor: 1e9,
        }],
        drop_blank_dimensions: false,
        growth: GrowthPolicy::banking(),
    }
}

/// Growth policies of the tables behind the page. The scheme panel shows
/// shares only and has no growth figures.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BankingPolicies {
    pub summary: GrowthPolicy,
    pub umkm: GrowthPolicy,
}

impl BankingPolicies {
    pub fn uniform(policy: GrowthPolicy) -> Self {
        Self {
            summary: policy,
            umkm: policy,
        }
    }
}

/// Builds the banking page. `umkm` and `scheme` are `None` when those
/// tables could not be loaded; their panels are then reported empty.
pub fn build_context(
    summary: &CanonicalTable,
    umkm: Option<&CanonicalTable>,
    scheme: Option<&CanonicalTable>,
    selections: &FilterSelections,
    policies: BankingPolicies,
) -> DashboardContext {
    let mut ctx = DashboardContext::new(BANKING);
    ctx.insert_options("negara_list", summary.distinct("Negara"));
    ctx.insert_options("provinsi_list", summary.distinct(PROVINSI));
    ctx.insert_years("tahun_list", summary.years());
    ctx.insert_integers("bulan_list", summary.units().into_iter().map(i64::from).collect());
    ctx.insert_text("interval_selected", selections.interval.as_str());

    insert_summary(&mut ctx, summary, selections, policies.summary);

    let province_only = province_selection(selections);
    let missing_umkm;
    let umkm = match umkm {
        Some(table) => table,
        None => {
            missing_umkm = CanonicalTable::empty(BANKING_UMKM);
            &missing_umkm
        }
    };
    insert_umkm(&mut ctx, umkm, &province_only, policies.umkm);

    let missing_scheme;
    let scheme = match scheme {
        Some(table) => table,
        None => {
            missing_scheme = CanonicalTable::empty(BANKING_SCHEME);
            &missing_scheme
        }
    };
    insert_scheme(&mut ctx, scheme, &province_only);

    ctx
}

fn insert_summary(ctx: &mut DashboardContext, table: &CanonicalTable, selections: &FilterSelections, policy: GrowthPolicy) {
    let kpis = Kpis::new(table, selections, &Scope::dimensions_only(), policy);

    let aset = kpis.growth(TOTAL_ASET);
    let dpk = kpis.growth(TOTAL_DPK);
    let kredit = kpis.growth(TOTAL_KREDIT);
    ctx.insert_kpi("aset", &aset);
    ctx.insert_kpi("dpk", &dpk);
    ctx.insert_kpi("kredit", &kredit);

    // Ratios are stored as fractions; shown as percentages, growth from the
    // stored values.
    let mut npl = as_percent(kpis.growth(NPL_GROSS));
    if npl.current > NPL_DISPLAY_LIMIT {
        npl = Growth {
            current: 0.0,
            yoy: None,
            ytd: None,
            period: npl.period,
        };
    }
    ctx.insert_kpi("npl", &npl);
    ctx.insert_kpi("ldr", &as_percent(kpis.growth(LDR)));

    let giro = kpis.growth(GIRO);
    let tab = kpis.growth(TABUNGAN);
    let dep = kpis.growth(DEPOSITO);
    ctx.insert_kpi("giro", &giro);
    ctx.insert_kpi("tab", &tab);
    ctx.insert_kpi("dep", &dep);
    ctx.insert_number("share_giro", round_to(share_pct(giro.current, dpk.current), 2));
    ctx.insert_number("share_tab", round_to(share_pct(tab.current, dpk.current), 2));
    ctx.insert_number("share_dep", round_to(share_pct(dep.current, dpk.current), 2));

    let konsumtif = kpis.growth(KREDIT_KONSUMTIF);
    let produktif = kpis.growth(KREDIT_PRODUKTIF);
    ctx.insert_kpi("konsumtif", &konsumtif);
    ctx.insert_kpi("produktif", &produktif);
    ctx.insert_number("share_kons", round_to(share_pct(konsumtif.current, kredit.current), 2));
    ctx.insert_number("share_prod", round_to(share_pct(produktif.current, kredit.current), 2));

    let mk = kpis.growth(MODAL_KERJA).current;
    let inv = kpis.growth(INVESTASI).current;
    ctx.insert_number("mk_val", mk);
    ctx.insert_number("inv_val", inv);
    ctx.insert_number("share_mk", round_to(share_pct(mk, produktif.current), 2));
    ctx.insert_number("share_inv", round_to(share_pct(inv, produktif.current), 2));

    ctx.insert_chart(
        "year_labels",
        &kpis.series().by_year(),
        &[
            ("year_giro_series", GIRO),
            ("year_tab_series", TABUNGAN),
            ("year_dep_series", DEPOSITO),
        ],
    );

    let mini = kpis.series_until_selection().regroup(selections.interval);
    ctx.insert_chart(
        "mini_labels",
        &tail(&mini, 3),
        &[
            ("mini_aset", TOTAL_ASET),
            ("mini_dpk", TOTAL_DPK),
            ("mini_kredit", TOTAL_KREDIT),
        ],
    );

    insert_npl_trend(ctx, table);
}

fn as_percent(growth: Growth) -> Growth {
    Growth {
        current: growth.current * 100.0,
        ..growth
    }
}

/// December NPL and LDR of the home province, one point per year. Ignores
/// every selection.
fn insert_npl_trend(ctx: &mut DashboardContext, table: &CanonicalTable) {
    let home: Vec<&CanonicalRecord> = table
        .records
        .iter()
        .filter(|r| r.unit() == Some(12))
        .filter(|r| {
            r.dimension(PROVINSI).is_some_and(|p| {
                let p = p.trim().to_uppercase();
                HOME_PROVINCE.iter().any(|name| p.contains(name))
            })
        })
        .collect();
    let series = Aggregator::for_table(table).aggregate(home);
    let decembers = series.points_for_unit(12);
    ctx.insert_options(
        "npl_labels",
        decembers.iter().map(|r| december_label(r.year())).collect(),
    );
    ctx.insert_values(
        "npl_series",
        decembers.iter().map(|r| round_to(r.value(NPL_GROSS) * 100.0, 2)).collect(),
    );
    ctx.insert_values(
        "ldr_series",
        decembers.iter().map(|r| round_to(r.value(LDR) * 100.0, 2)).collect(),
    );
}

/// Keeps only the province selection, with the time selections.
fn province_selection(selections: &FilterSelections) -> FilterSelections {
    let mut province = FilterSelections {
        dimensions: BTreeMap::new(),
        ..selections.clone()
    };
    if let Some(selected) = selections.dimension_selection(PROVINSI) {
        province.dimensions.insert(PROVINSI.to_string(), selected.clone());
    }
    province
}

/// Rows for a pie chart: province-filtered, at the selected period or the
/// latest one.
fn pie_records<'a>(table: &'a CanonicalTable, selections: &FilterSelections) -> Vec<&'a CanonicalRecord> {
    let by_province = select(table, selections, &Scope::dimensions_only());
    anchor_period(&by_province.records, selections.year(), selections.period_unit(table))
}

fn umkm_category(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if upper.contains("NON") && upper.contains("UMKM") {
        "Non-UMKM".to_string()
    } else if upper.contains("UMKM") {
        "UMKM".to_string()
    } else {
        title_case(raw)
    }
}

fn insert_umkm(ctx: &mut DashboardContext, table: &CanonicalTable, selections: &FilterSelections, policy: GrowthPolicy) {
    let kpis = Kpis::new(table, selections, &Scope::dimensions_only(), policy);
    ctx.insert_kpi("umkm_kredit", &kpis.growth(UMKM_KREDIT));
    ctx.insert_kpi("umkm_npl", &kpis.growth(UMKM_NPL));
    ctx.insert_kpi("umkm_npl_net", &kpis.growth(UMKM_NPL_NET));
    ctx.insert_kpi("umkm_rek", &kpis.growth(UMKM_REKENING));
    ctx.insert_kpi("umkm_npl_ratio", &kpis.growth(UMKM_NPL_RATIO));
    ctx.insert_kpi("umkm_kpr", &kpis.growth(UMKM_KREDIT_PER_REKENING));

    ctx.insert_chart(
        "umkm_year_labels",
        &kpis.series().by_year(),
        &[
            ("umkm_year_kredit", UMKM_KREDIT),
            ("umkm_year_npl_ratio", UMKM_NPL_RATIO),
            ("umkm_year_kpr", UMKM_KREDIT_PER_REKENING),
        ],
    );

    let mut shares: BTreeMap<String, f64> = BTreeMap::new();
    for record in pie_records(table, selections) {
        if let Some(jenis) = record.dimension(UMKM_JENIS) {
            *shares.entry(umkm_category(jenis)).or_insert(0.0) += record.measure(UMKM_KREDIT);
        }
    }
    let non_umkm = shares.remove("Non-UMKM");
    let umkm = shares.remove("UMKM");
    let ordered: Vec<(String, f64)> = non_umkm
        .map(|v| ("Non-UMKM".to_string(), v))
        .into_iter()
        .chain(umkm.map(|v| ("UMKM".to_string(), v)))
        .chain(shares)
        .collect();

    ctx.insert_options("umkm_share_labels", ordered.iter().map(|(label, _)| label.clone()).collect());
    ctx.insert_values("umkm_share_values", ordered.iter().map(|(_, v)| *v).collect());
    ctx.insert_number("umkm_pie_umkm_tril", umkm.unwrap_or(0.0) / 1000.0);
    ctx.insert_number("umkm_pie_non_tril", non_umkm.unwrap_or(0.0) / 1000.0);
}

fn insert_scheme(ctx: &mut DashboardContext, table: &CanonicalTable, selections: &FilterSelections) {
    let mut konvensional = 0.0;
    let mut syariah = 0.0;
    for record in pie_records(table, selections) {
        let Some(skema) = record.dimension(SKEMA) else {
            continue;
        };
        let upper = skema.to_uppercase();
        if upper.contains("KONV") {
            konvensional += record.measure(SCHEME_KREDIT);
        } else if upper.contains("SYAR") {
            syariah += record.measure(SCHEME_KREDIT);
        }
    }

    if konvensional + syariah > 0.0 {
        ctx.insert_options(
            "ks_share_labels",
            vec!["Konvensional".to_string(), "Syariah".to_string()],
        );
        ctx.insert_values("ks_share_values", vec![konvensional, syariah]);
        ctx.insert_number("ks_konv_tril", konvensional / 1000.0);
        ctx.insert_number("ks_syar_tril", syariah / 1000.0);
    } else {
        ctx.insert_options("ks_share_labels", Vec::new());
        ctx.insert_values("ks_share_values", Vec::new());
        ctx.insert_number("ks_konv_tril", 0.0);
        ctx.insert_number("ks_syar_tril", 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextValue;
    use crate::loader::SourceLoader;
    use crate::numeric::CellValue;
    use crate::source::{InMemorySource, RawTable};

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    fn summary_raw() -> RawTable {
        let cols = columns(&[
            "Negara",
            "Provinsi",
            "Tahun",
            "Bulan",
            "Total Aset",
            "Giro",
            "Tabungan",
            "Deposito",
            "Total DPK ",
            "Modal Kerja",
            "Investasi",
            "Konsumsi",
            "Total Kredit",
            "Nominal NPL Gross",
            "Rasio NPL Gross",
            "Nominal NPL Net",
            "Rasio NPL Net",
            "Loan to Deposit Rastio (LDR)",
        ]);
        #[allow(clippy::too_many_arguments)]
        fn row(
            prov: &str,
            year: i64,
            month: i64,
            aset: f64,
            dpk: [f64; 3],
            kredit: [f64; 3],
            npl: &str,
            ldr: &str,
        ) -> Vec<CellValue> {
            vec![
                CellValue::text("Indonesia"),
                CellValue::text(prov),
                CellValue::Int(year),
                CellValue::Int(month),
                CellValue::Float(aset),
                CellValue::Float(dpk[0]),
                CellValue::Float(dpk[1]),
                CellValue::Float(dpk[2]),
                CellValue::Float(dpk.iter().sum()),
                CellValue::Float(kredit[0]),
                CellValue::Float(kredit[1]),
                CellValue::Float(kredit[2]),
                CellValue::Float(kredit.iter().sum()),
                CellValue::Float(10.0),
                CellValue::text(npl),
                CellValue::Float(5.0),
                CellValue::text("1,00%"),
                CellValue::text(ldr),
            ]
        }
        RawTable::new(
            cols,
            vec![
                row("Sumatera Selatan", 2023, 12, 1000.0, [100.0, 200.0, 300.0], [150.0, 100.0, 250.0], "2,00%", "80%"),
                row("Sumatera Selatan", 2024, 1, 1050.0, [110.0, 210.0, 300.0], [160.0, 110.0, 250.0], "0.021", "0.84"),
                row("Sumatera Selatan", 2024, 12, 1200.0, [120.0, 240.0, 240.0], [200.0, 100.0, 300.0], "2,50", "100%"),
                row("Jambi", 2024, 12, 500.0, [50.0, 50.0, 100.0], [50.0, 50.0, 100.0], "4,00%", "90%"),
            ],
        )
    }

    fn umkm_raw() -> RawTable {
        let cols = columns(&[
            "Provinsi",
            "Tahun",
            "Bulan",
            "Jenis Kredit/Pembiayaan",
            "Nominal Kredit \n(Rp Miliar)",
            "Nominal NPL \n(Rp Miliar)",
            "Nominal NPL Net (Rp Miliar)",
            "Jumlah Rekening UMKM",
        ]);
        let row = |prov: &str, year: i64, month: i64, jenis: &str, kredit: &str, npl: &str, rek: i64| {
            vec![
                CellValue::text(prov),
                CellValue::Int(year),
                CellValue::Int(month),
                CellValue::text(jenis),
                CellValue::text(kredit),
                CellValue::text(npl),
                CellValue::text("1"),
                CellValue::Int(rek),
            ]
        };
        RawTable::new(
            cols,
            vec![
                row("SUMATERA SELATAN", 2024, 11, "UMKM", "1.000", "40", 100),
                row("SUMATERA SELATAN", 2024, 12, "umkm", "2.000", "60", 200),
                row("SUMATERA SELATAN", 2024, 12, "Non UMKM", "6.000", "40", 300),
                row("JAMBI", 2024, 12, "UMKM", "500", "5", 50),
            ],
        )
    }

    fn scheme_raw() -> RawTable {
        let cols = columns(&[
            "Provinsi", "Kab/Kota", "Tahun", "Bulan", "Jenis Bank", "Skema", "Aset", "Kredit ", "DPK", "NPL",
        ]);
        let row = |kab: &str, jenis: &str, skema: &str, kredit: f64| {
            vec![
                CellValue::text("Sumatera Selatan"),
                CellValue::text(kab),
                CellValue::Int(2024),
                CellValue::Int(12),
                CellValue::text(jenis),
                CellValue::text(skema),
                CellValue::Float(1.0),
                CellValue::Float(kredit),
                CellValue::Float(1.0),
                CellValue::Float(0.0),
            ]
        };
        RawTable::new(
            cols,
            vec![
                row("All", "Bank Umum", "Konvensional", 9000.0),
                row("All", "Bank Umum", "Syariah", 1000.0),
                row("Palembang", "Bank Umum", "Konvensional", 500.0),
                row("All", "BPR", "Konvensional", 700.0),
            ],
        )
    }

    fn load(schema: DatasetSchema, raw: RawTable) -> CanonicalTable {
        let loader = SourceLoader::new(
            Box::new(InMemorySource::new("database").with_table(&schema.id, raw)),
            Box::new(InMemorySource::new("workbook")),
        );
        loader.load(&schema).unwrap()
    }

    fn sumsel_december() -> FilterSelections {
        FilterSelections::new()
            .with_dimension("provinsi", "Sumatera Selatan")
            .with_year(2024)
            .with_period(12)
    }

    #[test]
    fn test_summary_kpis_and_shares() {
        let summary = load(schema(), summary_raw());
        let ctx = build_context(&summary, None, None, &sumsel_december(), BankingPolicies::uniform(GrowthPolicy::banking()));

        assert_eq!(ctx.number("aset_val"), Some(1200.0));
        assert!((ctx.number("aset_yoy").unwrap() - 20.0).abs() < 1e-9);
        assert!((ctx.number("aset_ytd").unwrap() - 150.0 / 1050.0 * 100.0).abs() < 1e-9);
        assert_eq!(ctx.number("dpk_val"), Some(600.0));
        assert_eq!(ctx.number("share_giro"), Some(20.0));
        assert_eq!(ctx.number("share_tab"), Some(40.0));
        assert_eq!(ctx.number("share_dep"), Some(40.0));

        assert_eq!(ctx.number("produktif_val"), Some(300.0));
        assert_eq!(ctx.number("konsumtif_val"), Some(300.0));
        assert_eq!(ctx.number("share_prod"), Some(50.0));
        assert_eq!(ctx.number("mk_val"), Some(200.0));
        assert_eq!(ctx.number("share_mk"), Some(66.67));
        assert_eq!(ctx.number("share_inv"), Some(33.33));

        assert!((ctx.number("npl_val").unwrap() - 2.5).abs() < 1e-9);
        assert!((ctx.number("npl_yoy").unwrap() - 25.0).abs() < 1e-6);
        assert!((ctx.number("ldr_val").unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_charts() {
        let summary = load(schema(), summary_raw());
        let ctx = build_context(&summary, None, None, &sumsel_december(), BankingPolicies::uniform(GrowthPolicy::banking()));

        assert_eq!(ctx.labels("year_labels").unwrap(), ["2023", "2024"]);
        assert_eq!(ctx.series("year_giro_series").unwrap(), &[100.0, 230.0][..]);
        assert_eq!(ctx.labels("mini_labels").unwrap(), ["Dec '23", "Jan '24", "Dec '24"]);
        assert_eq!(ctx.series("mini_aset").unwrap(), &[1000.0, 1050.0, 1200.0][..]);

        // The December trend ignores the selection entirely.
        let other = build_context(
            &summary,
            None,
            None,
            &FilterSelections::new().with_dimension("Provinsi", "Jambi"),
            BankingPolicies::uniform(GrowthPolicy::banking()),
        );
        for ctx in [&ctx, &other] {
            assert_eq!(ctx.labels("npl_labels").unwrap(), ["Des'23", "Des'24"]);
            assert_eq!(ctx.series("npl_series").unwrap(), &[2.0, 2.5][..]);
            assert_eq!(ctx.series("ldr_series").unwrap(), &[80.0, 100.0][..]);
        }
    }

    #[test]
    fn test_mini_chart_regroups_by_interval() {
        let summary = load(schema(), summary_raw());
        let sel = sumsel_december().with_interval(crate::aggregate::Interval::Annual);
        let ctx = build_context(&summary, None, None, &sel, BankingPolicies::uniform(GrowthPolicy::banking()));
        assert_eq!(ctx.labels("mini_labels").unwrap(), ["2023", "2024"]);
        assert_eq!(ctx.text("interval_selected"), Some("tahunan"));
    }

    #[test]
    fn test_umkm_panel() {
        let summary = load(schema(), summary_raw());
        let umkm = load(umkm_schema(), umkm_raw());
        let ctx = build_context(&summary, Some(&umkm), None, &sumsel_december(), BankingPolicies::uniform(GrowthPolicy::banking()));

        assert_eq!(ctx.number("umkm_kredit_val"), Some(8000.0));
        assert!((ctx.number("umkm_kredit_ytd").unwrap() - 700.0).abs() < 1e-9);
        assert_eq!(ctx.number("umkm_rek_val"), Some(500.0));
        assert!((ctx.number("umkm_npl_ratio_val").unwrap() - 1.25).abs() < 1e-9);
        assert!((ctx.number("umkm_kpr_val").unwrap() - 16.0).abs() < 1e-9);

        assert_eq!(ctx.labels("umkm_share_labels").unwrap(), ["Non-UMKM", "UMKM"]);
        assert_eq!(ctx.series("umkm_share_values").unwrap(), &[6000.0, 2000.0][..]);
        assert_eq!(ctx.number("umkm_pie_umkm_tril"), Some(2.0));
        assert_eq!(ctx.number("umkm_pie_non_tril"), Some(6.0));

        // Ratios average across months: (4 + 1.25) / 2.
        assert_eq!(ctx.labels("umkm_year_labels").unwrap(), ["2024"]);
        assert!((ctx.series("umkm_year_npl_ratio").unwrap()[0] - 2.625).abs() < 1e-9);
        assert_eq!(ctx.series("umkm_year_kredit").unwrap(), &[9000.0][..]);
    }

    #[test]
    fn test_umkm_pie_uses_latest_period_when_selection_is_missing() {
        let summary = load(schema(), summary_raw());
        let umkm = load(umkm_schema(), umkm_raw());
        let sel = FilterSelections::new().with_dimension("Provinsi", "Sumatera Selatan").with_year(2019);
        let ctx = build_context(&summary, Some(&umkm), None, &sel, BankingPolicies::uniform(GrowthPolicy::banking()));
        assert_eq!(ctx.series("umkm_share_values").unwrap(), &[6000.0, 2000.0][..]);
    }

    #[test]
    fn test_scheme_panel() {
        let summary = load(schema(), summary_raw());
        let scheme = load(scheme_schema(), scheme_raw());
        assert_eq!(scheme.len(), 2);

        let ctx = build_context(&summary, None, Some(&scheme), &sumsel_december(), BankingPolicies::uniform(GrowthPolicy::banking()));
        assert_eq!(ctx.labels("ks_share_labels").unwrap(), ["Konvensional", "Syariah"]);
        assert_eq!(ctx.series("ks_share_values").unwrap(), &[9000.0, 1000.0][..]);
        assert_eq!(ctx.number("ks_konv_tril"), Some(9.0));
        assert_eq!(ctx.number("ks_syar_tril"), Some(1.0));
    }

    #[test]
    fn test_missing_panels_are_empty() {
        let summary = load(schema(), summary_raw());
        let ctx = build_context(&summary, None, None, &FilterSelections::new(), BankingPolicies::uniform(GrowthPolicy::banking()));
        assert_eq!(ctx.number("umkm_kredit_val"), Some(0.0));
        assert_eq!(ctx.get("umkm_kredit_yoy"), Some(&ContextValue::Number(None)));
        assert!(ctx.labels("umkm_share_labels").unwrap().is_empty());
        assert!(ctx.labels("ks_share_labels").unwrap().is_empty());
        assert_eq!(ctx.number("ks_konv_tril"), Some(0.0));
    }

    #[test]
    fn test_umkm_category_names() {
        assert_eq!(umkm_category("Kredit NON-UMKM"), "Non-UMKM");
        assert_eq!(umkm_category(" umkm "), "UMKM");
        assert_eq!(umkm_category("KORPORASI besar"), "Korporasi Besar");
    }

    #[test]
    fn test_umkm_panel_uses_its_own_policy() {
        let summary = load(schema(), summary_raw());
        let mut raw = umkm_raw();
        raw.rows = vec![raw.rows[1].clone(), raw.rows[1].clone()];
        raw.rows[0][1] = CellValue::Int(2023);
        raw.rows[0][4] = CellValue::text("1");
        raw.rows[1][4] = CellValue::text("500");
        let umkm = load(umkm_schema(), raw);

        let guarded = build_context(
            &summary,
            Some(&umkm),
            None,
            &sumsel_december(),
            BankingPolicies::uniform(GrowthPolicy::banking()),
        );
        assert_eq!(guarded.get("umkm_kredit_yoy"), Some(&ContextValue::Number(None)));

        let open = build_context(
            &summary,
            Some(&umkm),
            None,
            &sumsel_december(),
            BankingPolicies {
                summary: GrowthPolicy::banking(),
                umkm: GrowthPolicy::default(),
            },
        );
        assert_eq!(open.number("umkm_kredit_val"), Some(500.0));
        assert!((open.number("umkm_kredit_yoy").unwrap() - 49_900.0).abs() < 1e-9);
        // The summary keeps the guarded policy.
        assert_eq!(open.get("aset_yoy"), guarded.get("aset_yoy"));
    }
}
