//! Commodity production (Komoditas), annual. Spreadsheet-only: the sheet is
//! a wide table with a three-level header (classification, year,
//! commodity with unit) that is melted into one row per province, year and
//! commodity.
//!
//! Two untimed side tables feed extra panels of the same page: production
//! and land area per regency, and the number of farmers per regency.

use super::{additive, dimension, COMMODITY, COMMODITY_REGENCY, FARMERS};
use crate::aggregate::{Aggregator, ChartPoint};
use crate::context::DashboardContext;
use crate::filter::{select, FilterSelections, Scope, Selected};
use crate::growth::GrowthPolicy;
use crate::numeric::NumberFormat;
use crate::period::PeriodKind;
use crate::schema::{
    ColumnSpec, DatasetSchema, Derivation, DerivedMeasure, DimensionRole, DimensionSpec, MeasureKind, Reshape,
    SheetLayout, TimeAxis, UnitSplit,
};
use crate::table::{distinct_values, CanonicalTable};
use crate::utils::round_to;
use std::collections::BTreeMap;

pub const PROVINSI: &str = "Provinsi";
pub const KLASIFIKASI: &str = "Klasifikasi";
pub const KOMODITAS: &str = "Komoditas";
pub const SATUAN: &str = "Satuan";
pub const NILAI: &str = "Nilai";

pub const KAB_KOTA: &str = "Kabupaten/Kota";
pub const PRODUKSI: &str = "Produksi";
pub const LUAS_LAHAN: &str = "Luas Lahan";
pub const PRODUKTIVITAS: &str = "Produktivitas";
pub const JUMLAH_PETANI: &str = "Jumlah Petani";

const DEFAULT_KLASIFIKASI: &str = "Tanaman Pangan";
const TOP_N: usize = 10;
const REGENCY_TOP_N: usize = 5;

/// The farmer panel has its own filters, independent of the commodity
/// selections.
const PETANI_PROVINSI_PARAM: &str = "petani_provinsi";
const PETANI_KABKOTA_PARAM: &str = "petani_kabkota";

pub fn schema() -> DatasetSchema {
    DatasetSchema {
        id: COMMODITY.to_string(),
        title: "Komoditas".to_string(),
        query: None,
        sheet: SheetLayout {
            workbook: "Komoditas.xlsx".to_string(),
            sheet: "raw-all-komoditas".to_string(),
            skip_rows: 0,
            header_rows: 3,
            metadata: Vec::new(),
            reshape: Some(Reshape::MeltMultiHeader {
                id_label: "komoditas".to_string(),
                id_column: PROVINSI.to_string(),
                level_columns: vec![
                    KLASIFIKASI.to_string(),
                    "Tahun".to_string(),
                    "Komoditas Raw".to_string(),
                ],
                value_column: NILAI.to_string(),
                split_unit: Some(UnitSplit {
                    source: "Komoditas Raw".to_string(),
                    name: KOMODITAS.to_string(),
                    unit: SATUAN.to_string(),
                }),
            }),
        },
        time: TimeAxis::Timed {
            year: ColumnSpec::named("Tahun"),
            period: None,
            kind: PeriodKind::Year,
        },
        dimensions: vec![
            dimension(PROVINSI, DimensionRole::Region),
            dimension(KLASIFIKASI, DimensionRole::Category),
            dimension(KOMODITAS, DimensionRole::Category),
            dimension(SATUAN, DimensionRole::Category),
        ],
        measures: vec![additive(ColumnSpec::named(NILAI), NumberFormat::Localized)],
        derived: Vec::new(),
        row_filters: Vec::new(),
        table_normalizations: Vec::new(),
        drop_blank_dimensions: true,
        growth: GrowthPolicy::default(),
    }
}

/// Production and land area per regency. Spreadsheet-only.
pub fn regency_schema() -> DatasetSchema {
    DatasetSchema {
        id: COMMODITY_REGENCY.to_string(),
        title: "Komoditas per Kabupaten/Kota".to_string(),
        query: None,
        sheet: SheetLayout::simple("Data Komoditi (1).xlsx", "Sheet1"),
        time: TimeAxis::Untimed,
        dimensions: vec![
            DimensionSpec {
                column: ColumnSpec::with_aliases(KOMODITAS, &["Komoditi"]),
                role: DimensionRole::Category,
            },
            dimension(PROVINSI, DimensionRole::Region),
            DimensionSpec {
                column: ColumnSpec::with_aliases(KAB_KOTA, &["KabKota"]),
                role: DimensionRole::Region,
            },
        ],
        measures: vec![
            additive(ColumnSpec::with_aliases(PRODUKSI, &["Produksi (Ton)"]), NumberFormat::Localized),
            additive(ColumnSpec::with_aliases(LUAS_LAHAN, &["Luas Lahan (Ha)", "LuasLahan"]), NumberFormat::Localized),
        ],
        derived: vec![DerivedMeasure {
            name: PRODUKTIVITAS.to_string(),
            kind: MeasureKind::Ratio,
            derivation: Derivation::Quotient {
                numerator: PRODUKSI.to_string(),
                denominator: LUAS_LAHAN.to_string(),
            },
        }],
        row_filters: Vec::new(),
        table_normalizations: Vec::new(),
        drop_blank_dimensions: false,
        growth: GrowthPolicy::default(),
    }
}

/// Farmers per regency, served by the database.
pub fn farmers_schema() -> DatasetSchema {
    DatasetSchema {
        id: FARMERS.to_string(),
        title: "Jumlah Petani".to_string(),
        query: Some(
            r#"SELECT "Komoditi", "Provinsi", "Kabupaten/Kota", "Jumlah Petani" FROM jumlah_petani_kelapa_sumatera_selatan ORDER BY "Jumlah Petani" DESC"#
                .to_string(),
        ),
        sheet: SheetLayout::simple("Jumlah Petani.xlsx", "jumlah_petani_kelapa_sumatera_selatan"),
        time: TimeAxis::Untimed,
        dimensions: vec![
            DimensionSpec {
                column: ColumnSpec::with_aliases(KOMODITAS, &["Komoditi"]),
                role: DimensionRole::Category,
            },
            dimension(PROVINSI, DimensionRole::Region),
            DimensionSpec {
                column: ColumnSpec::with_aliases(KAB_KOTA, &["KabKota"]),
                role: DimensionRole::Region,
            },
        ],
        measures: vec![additive(
            ColumnSpec::with_aliases(JUMLAH_PETANI, &["JumlahPetani"]),
            NumberFormat::Count,
        )],
        derived: Vec::new(),
        row_filters: Vec::new(),
        table_normalizations: Vec::new(),
        drop_blank_dimensions: false,
        growth: GrowthPolicy::default(),
    }
}

/// Year and classification after defaults: an unset year means the latest
/// year and an unset classification means "Tanaman Pangan" (or the first
/// one). An explicit "all" disables the filter.
fn resolved_defaults(table: &CanonicalTable, selections: &FilterSelections) -> (Option<i32>, Option<String>) {
    let year = match &selections.year {
        Selected::Unset => table.years().last().copied(),
        Selected::All => None,
        Selected::Value(year) => Some(*year),
    };

    let klasifikasi_list = table.distinct(KLASIFIKASI);
    let klasifikasi = match selections.dimension_selection(KLASIFIKASI) {
        None | Some(Selected::Unset) => klasifikasi_list
            .iter()
            .find(|k| k.as_str() == DEFAULT_KLASIFIKASI)
            .or_else(|| klasifikasi_list.first())
            .cloned(),
        Some(Selected::All) => None,
        Some(Selected::Value(k)) => Some(k.clone()),
    };
    (year, klasifikasi)
}

fn select_or_all<T>(value: Option<T>) -> Selected<T> {
    match value {
        Some(v) => Selected::Value(v),
        None => Selected::All,
    }
}

fn insert_ranking(ctx: &mut DashboardContext, labels_key: &str, values_key: &str, points: &[ChartPoint]) {
    ctx.insert_options(labels_key, points.iter().map(|p| p.label.clone()).collect());
    ctx.insert_values(
        values_key,
        points.iter().map(|p| round_to(p.value(NILAI), 2)).collect(),
    );
}

/// Builds the commodity page. `regency` and `farmers` are `None` when those
/// tables could not be loaded; their panels are then reported empty.
pub fn build_context(
    table: &CanonicalTable,
    regency: Option<&CanonicalTable>,
    farmers: Option<&CanonicalTable>,
    selections: &FilterSelections,
) -> DashboardContext {
    let mut ctx = DashboardContext::new(COMMODITY);
    ctx.insert_options("provinsi_list", table.distinct(PROVINSI));
    ctx.insert_options("klasifikasi_list", table.distinct(KLASIFIKASI));
    ctx.insert_years("tahun_list", table.years());

    let (year, klasifikasi) = resolved_defaults(table, selections);

    // Commodity choices depend on the resolved year and classification.
    let komoditas_list = distinct_values(
        table.records.iter().filter(|r| {
            year.map_or(true, |y| r.year() == Some(y))
                && klasifikasi
                    .as_deref()
                    .map_or(true, |k| r.dimension(KLASIFIKASI) == Some(k))
        }),
        KOMODITAS,
    );
    let komoditas = selections
        .dimension(KOMODITAS)
        .filter(|k| komoditas_list.iter().any(|c| c.as_str() == *k))
        .map(str::to_string);

    ctx.insert_optional("tahun_selected", year.map(f64::from));
    ctx.insert_text("klasifikasi_selected", klasifikasi.clone().unwrap_or_default());
    ctx.insert_text("komoditas_selected", komoditas.clone().unwrap_or_default());
    ctx.insert_options("komoditas_list", komoditas_list);

    let provinsi = selections.dimension(PROVINSI);
    insert_regency(&mut ctx, regency, komoditas.as_deref(), provinsi);
    insert_farmers(&mut ctx, farmers, selections);

    let mut dimensions = BTreeMap::new();
    dimensions.insert(KLASIFIKASI.to_string(), select_or_all(klasifikasi));
    dimensions.insert(KOMODITAS.to_string(), select_or_all(komoditas));
    if let Some(province) = selections.dimension_selection(PROVINSI) {
        dimensions.insert(PROVINSI.to_string(), province.clone());
    }
    let effective = FilterSelections {
        dimensions,
        year: select_or_all(year),
        period: Selected::All,
        interval: selections.interval,
    };

    let aggregator = Aggregator::for_table(table);

    let selected = select(table, &effective, &Scope::full());
    let unit_label = selected
        .records
        .iter()
        .find_map(|r| r.dimension(SATUAN))
        .unwrap_or_default();
    ctx.insert_text("unit_label", unit_label);

    let total: f64 = selected.records.iter().map(|r| r.measure(NILAI)).sum();
    let by_komoditas = aggregator.ranked_totals(selected.records.iter().copied(), KOMODITAS, NILAI, None);
    ctx.insert_number("total_val", total);
    ctx.insert_integer("komoditas_count", by_komoditas.len() as i64);
    let (top_name, top_val) = top_of(&by_komoditas, NILAI);
    ctx.insert_text("top_kom_name", top_name);
    ctx.insert_number("top_kom_val", top_val);
    ctx.insert_number(
        "top_kom_share",
        if total > 0.0 { top_val / total * 100.0 } else { 0.0 },
    );

    let for_commodity_chart = select(table, &effective, &Scope::full().ignoring(KOMODITAS));
    let top_komoditas = aggregator.ranked_totals(
        for_commodity_chart.records.iter().copied(),
        KOMODITAS,
        NILAI,
        Some(TOP_N),
    );
    insert_ranking(&mut ctx, "kom_kom_labels", "kom_kom_values", &top_komoditas);

    let for_province_chart = select(table, &effective, &Scope::full().ignoring(PROVINSI));
    let by_province = aggregator.ranked_totals(
        for_province_chart.records.iter().copied(),
        PROVINSI,
        NILAI,
        Some(TOP_N),
    );
    insert_ranking(&mut ctx, "kom_prov_labels", "kom_prov_values", &by_province);
    let (top_prov, top_prov_val) = top_of(&by_province, NILAI);
    ctx.insert_text("top_prov_name", top_prov);
    ctx.insert_number("top_prov_val", top_prov_val);

    ctx
}

fn same_label(value: Option<&str>, wanted: &str) -> bool {
    value.is_some_and(|v| v.trim().to_lowercase() == wanted.trim().to_lowercase())
}

fn insert_top(
    ctx: &mut DashboardContext,
    key: &str,
    points: &[ChartPoint],
    measure: &str,
    decimals: i32,
) {
    let points = &points[..points.len().min(REGENCY_TOP_N)];
    ctx.insert_options(
        &format!("kab_{}_top_labels", key),
        points.iter().map(|p| p.label.clone()).collect(),
    );
    ctx.insert_values(
        &format!("kab_{}_top_values", key),
        points.iter().map(|p| round_to(p.value(measure), decimals)).collect(),
    );
}

/// Regency detail for the selected commodity and province. Unlike the
/// main panel these filters are strict: no match means an empty panel.
fn insert_regency(
    ctx: &mut DashboardContext,
    regency: Option<&CanonicalTable>,
    komoditas: Option<&str>,
    provinsi: Option<&str>,
) {
    let empty = CanonicalTable::empty(COMMODITY_REGENCY);
    let table = regency.unwrap_or(&empty);
    let records: Vec<_> = table
        .records
        .iter()
        .filter(|r| komoditas.map_or(true, |k| same_label(r.dimension(KOMODITAS), k)))
        .filter(|r| provinsi.map_or(true, |p| same_label(r.dimension(PROVINSI), p)))
        .collect();

    let aggregator = Aggregator::for_table(table);
    let totals = aggregator.totals(records.iter().copied());
    ctx.insert_number("kab_total_produksi", totals.get(PRODUKSI).copied().unwrap_or(0.0));
    ctx.insert_number("kab_total_luas", totals.get(LUAS_LAHAN).copied().unwrap_or(0.0));
    ctx.insert_number("kab_rata_prod_per_ha", totals.get(PRODUKTIVITAS).copied().unwrap_or(0.0));

    let ranked = |measure: &str| aggregator.ranked_totals(records.iter().copied(), KAB_KOTA, measure, None);
    let by_produksi = ranked(PRODUKSI);
    let by_luas = ranked(LUAS_LAHAN);
    let by_produktivitas = ranked(PRODUKTIVITAS);

    let (kab, val) = top_of(&by_produksi, PRODUKSI);
    ctx.insert_text("kab_top_prod_kab", kab);
    ctx.insert_number("kab_top_prod_val", val);
    let (kab, val) = top_of(&by_produktivitas, PRODUKTIVITAS);
    ctx.insert_text("kab_top_prodperha_kab", kab);
    ctx.insert_number("kab_top_prodperha_val", val);

    insert_top(ctx, "prod", &by_produksi, PRODUKSI, 2);
    insert_top(ctx, "luas", &by_luas, LUAS_LAHAN, 2);
    insert_top(ctx, "prodperha", &by_produktivitas, PRODUKTIVITAS, 3);
}

fn insert_farmers(ctx: &mut DashboardContext, farmers: Option<&CanonicalTable>, selections: &FilterSelections) {
    let empty = CanonicalTable::empty(FARMERS);
    let table = farmers.unwrap_or(&empty);
    ctx.insert_options("petani_provinsi_list", table.distinct(PROVINSI));
    ctx.insert_options("petani_kabkota_list", table.distinct(KAB_KOTA));

    let provinsi = selections.dimension(PETANI_PROVINSI_PARAM).unwrap_or_default();
    let kabkota = selections.dimension(PETANI_KABKOTA_PARAM).unwrap_or_default();
    ctx.insert_text("petani_provinsi_selected", provinsi);
    ctx.insert_text("petani_kabkota_selected", kabkota);

    let records = table
        .records
        .iter()
        .filter(|r| provinsi.is_empty() || same_label(r.dimension(PROVINSI), provinsi))
        .filter(|r| kabkota.is_empty() || same_label(r.dimension(KAB_KOTA), kabkota));
    let top = Aggregator::for_table(table).ranked_totals(records, KAB_KOTA, JUMLAH_PETANI, Some(TOP_N));
    ctx.insert_options("petani_labels", top.iter().map(|p| p.label.clone()).collect());
    ctx.insert_integers(
        "petani_values",
        top.iter().map(|p| p.value(JUMLAH_PETANI).round() as i64).collect(),
    );
}

fn top_of(points: &[ChartPoint], measure: &str) -> (String, f64) {
    points
        .first()
        .map(|p| (p.label.clone(), p.value(measure)))
        .unwrap_or_default()
}
