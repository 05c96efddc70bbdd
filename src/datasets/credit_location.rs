//! Plantation credit by location (Kredit Lokasi), untimed. The workbook
//! reports one sector per row and one location per column, with the
//! reporting year and month count in a block above the header.

use super::{additive, dimension, CREDIT_LOCATION};
use crate::aggregate::{Aggregator, ChartPoint};
use crate::context::DashboardContext;
use crate::filter::{select, FilterSelections, Scope, Selected};
use crate::growth::GrowthPolicy;
use crate::numeric::{CellValue, NumberFormat};
use crate::schema::{
    ColumnSpec, DatasetSchema, DimensionRole, MetadataCell, Reshape, RowFilter, SheetLayout, TimeAxis,
};
use crate::table::CanonicalTable;
use crate::utils::{extract_year, round_to};
use std::collections::BTreeMap;

pub const SEKTOR: &str = "Sektor";
pub const LOKASI: &str = "Lokasi";
pub const KREDIT: &str = "Kredit";

pub const META_JUMLAH_BULAN: &str = "jumlah_bulan";
pub const META_TAHUN: &str = "tahun";

/// Request keys carry a prefix so they do not collide with the commodity
/// filters shown on the same page.
const SEKTOR_PARAM: &str = "krl_sektor";
const LOKASI_PARAM: &str = "krl_lokasi";

const TOP_N: usize = 10;

pub fn schema() -> DatasetSchema {
    DatasetSchema {
        id: CREDIT_LOCATION.to_string(),
        title: "Kredit Perkebunan per Lokasi".to_string(),
        query: Some(
            r#"SELECT "Sektor", "Lokasi", "Kredit" FROM kredit_lok_bank WHERE LOWER("Sektor") LIKE '%perkebunan%' ORDER BY "Sektor", "Lokasi""#
                .to_string(),
        ),
        sheet: SheetLayout {
            workbook: "Kredit Lok Bank - Sub Sektor.xlsx".to_string(),
            sheet: "Page1_1".to_string(),
            skip_rows: 3,
            header_rows: 1,
            metadata: vec![
                MetadataCell {
                    key: META_JUMLAH_BULAN.to_string(),
                    row: 0,
                    col: 1,
                },
                MetadataCell {
                    key: META_TAHUN.to_string(),
                    row: 1,
                    col: 1,
                },
            ],
            reshape: Some(Reshape::MeltColumns {
                id_column: SEKTOR.to_string(),
                variable_column: LOKASI.to_string(),
                value_column: KREDIT.to_string(),
                exclude_columns: vec!["All".to_string()],
                drop_ids: vec!["unknown".to_string(), "all".to_string()],
                drop_date_like_ids: true,
            }),
        },
        time: TimeAxis::Untimed,
        dimensions: vec![
            dimension(SEKTOR, DimensionRole::Category),
            dimension(LOKASI, DimensionRole::Region),
        ],
        measures: vec![additive(ColumnSpec::named(KREDIT), NumberFormat::Localized)],
        derived: Vec::new(),
        row_filters: vec![RowFilter::Contains {
            column: SEKTOR.to_string(),
            needle: "perkebunan".to_string(),
        }],
        table_normalizations: Vec::new(),
        drop_blank_dimensions: false,
        growth: GrowthPolicy::default(),
    }
}

/// A prefixed request key wins over the plain dimension name.
fn selection(selections: &FilterSelections, param: &str, dimension: &str) -> Selected<String> {
    selections
        .dimension_selection(param)
        .or_else(|| selections.dimension_selection(dimension))
        .cloned()
        .unwrap_or_default()
}

/// The workbook writes the year either as a number or inside a sentence.
fn metadata_year(cell: Option<&CellValue>) -> Option<i64> {
    match cell? {
        CellValue::Int(v) => Some(*v),
        CellValue::Float(v) if v.is_finite() => Some(v.trunc() as i64),
        CellValue::Text(s) => extract_year(s).map(i64::from),
        _ => None,
    }
}

fn insert_ranking(ctx: &mut DashboardContext, prefix: &str, points: &[ChartPoint]) {
    ctx.insert_options(
        &format!("krl_{}_labels", prefix),
        points.iter().map(|p| p.label.clone()).collect(),
    );
    ctx.insert_values(
        &format!("krl_{}_values", prefix),
        points.iter().map(|p| round_to(p.value(KREDIT), 2)).collect(),
    );
    let (top, top_val) = points
        .first()
        .map(|p| (p.label.clone(), p.value(KREDIT)))
        .unwrap_or_default();
    ctx.insert_text(&format!("krl_top_{}", prefix), top);
    ctx.insert_number(&format!("krl_top_{}_val", prefix), top_val);
}

pub fn build_context(table: &CanonicalTable, selections: &FilterSelections) -> DashboardContext {
    let mut ctx = DashboardContext::new(CREDIT_LOCATION);
    ctx.insert_options("krl_sektor_list", table.distinct(SEKTOR));
    ctx.insert_options("krl_lokasi_list", table.distinct(LOKASI));

    let sektor = selection(selections, SEKTOR_PARAM, SEKTOR);
    let lokasi = selection(selections, LOKASI_PARAM, LOKASI);
    ctx.insert_text("krl_sektor_selected", sektor.value().cloned().unwrap_or_default());
    ctx.insert_text("krl_lokasi_selected", lokasi.value().cloned().unwrap_or_default());

    // Only present when the workbook served the rows.
    match metadata_year(table.metadata_value(META_TAHUN)) {
        Some(year) => ctx.insert_integer("krl_tahun", year),
        None => ctx.insert_optional("krl_tahun", None),
    }
    ctx.insert_cell("krl_jumlah_bulan", table.metadata_value(META_JUMLAH_BULAN));

    let effective = FilterSelections {
        dimensions: BTreeMap::from([(SEKTOR.to_string(), sektor), (LOKASI.to_string(), lokasi)]),
        year: Selected::All,
        period: Selected::All,
        interval: selections.interval,
    };
    let aggregator = Aggregator::for_table(table);

    let selected = select(table, &effective, &Scope::full());
    ctx.insert_number(
        "krl_total_kredit",
        selected.records.iter().map(|r| r.measure(KREDIT)).sum(),
    );

    let for_lokasi = select(table, &effective, &Scope::full().ignoring(LOKASI));
    let by_lokasi = aggregator.ranked_totals(for_lokasi.records.iter().copied(), LOKASI, KREDIT, Some(TOP_N));
    insert_ranking(&mut ctx, "lokasi", &by_lokasi);

    let for_sektor = select(table, &effective, &Scope::full().ignoring(SEKTOR));
    let by_sektor = aggregator.ranked_totals(for_sektor.records.iter().copied(), SEKTOR, KREDIT, Some(TOP_N));
    insert_ranking(&mut ctx, "sektor", &by_sektor);

    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextValue;
    use crate::loader::SourceLoader;
    use crate::source::{InMemorySource, RawTable};

    fn text(s: &str) -> CellValue {
        CellValue::text(s)
    }

    fn grid() -> Vec<Vec<CellValue>> {
        vec![
            vec![text("Jumlah Bulan"), CellValue::Int(9)],
            vec![text("Tahun"), text("Posisi Tahun 2024")],
            vec![],
            vec![text("Sektor"), text("All"), text("Palembang"), text("Banyuasin"), CellValue::Empty],
            vec![
                text("Perkebunan Kelapa Sawit"),
                text("1.500"),
                text("1.000"),
                text("500"),
                CellValue::Empty,
            ],
            vec![text("Perkebunan Karet"), text("700"), text("300"), text("400"), CellValue::Empty],
            vec![text("Pertanian Padi"), text("100"), text("50"), text("50"), CellValue::Empty],
            vec![text("All"), text("2.300"), text("1.350"), text("950"), CellValue::Empty],
            vec![text("2024-09-30"), text("1"), text("1"), text("1"), CellValue::Empty],
        ]
    }

    fn table() -> CanonicalTable {
        let schema = schema();
        let raw = RawTable::from_grid(grid(), &schema.sheet).unwrap();
        let loader = SourceLoader::new(
            Box::new(InMemorySource::new("database")),
            Box::new(InMemorySource::new("workbook").with_table(CREDIT_LOCATION, raw)),
        );
        loader.load(&schema).unwrap()
    }

    #[test]
    fn test_melted_rows_and_metadata() {
        let t = table();
        assert_eq!(t.len(), 4);
        assert!(t.records.iter().all(|r| r.period.is_none()));

        let ctx = build_context(&t, &FilterSelections::new());
        assert_eq!(ctx.labels("krl_lokasi_list").unwrap(), ["Banyuasin", "Palembang"]);
        assert_eq!(
            ctx.labels("krl_sektor_list").unwrap(),
            ["Perkebunan Karet", "Perkebunan Kelapa Sawit"]
        );
        assert_eq!(ctx.get("krl_tahun"), Some(&ContextValue::Integer(2024)));
        assert_eq!(ctx.get("krl_jumlah_bulan"), Some(&ContextValue::Integer(9)));
        assert_eq!(ctx.number("krl_total_kredit"), Some(2200.0));
        assert_eq!(ctx.text("krl_top_lokasi"), Some("Palembang"));
        assert_eq!(ctx.number("krl_top_lokasi_val"), Some(1300.0));
        assert_eq!(ctx.text("krl_top_sektor"), Some("Perkebunan Kelapa Sawit"));
        assert_eq!(ctx.series("krl_sektor_values").unwrap(), &[1500.0, 700.0][..]);
    }

    #[test]
    fn test_prefixed_location_filter() {
        let sel = FilterSelections::new().with_dimension("krl_lokasi", "Banyuasin").with_year(2024);
        let ctx = build_context(&table(), &sel);
        assert_eq!(ctx.text("krl_lokasi_selected"), Some("Banyuasin"));
        assert_eq!(ctx.number("krl_total_kredit"), Some(900.0));
        // The location chart ignores the location filter, the sector chart does not.
        assert_eq!(ctx.labels("krl_lokasi_labels").unwrap(), ["Palembang", "Banyuasin"]);
        assert_eq!(ctx.series("krl_lokasi_values").unwrap(), &[1300.0, 900.0][..]);
        assert_eq!(ctx.series("krl_sektor_values").unwrap(), &[500.0, 400.0][..]);
    }

    #[test]
    fn test_metadata_absent_without_workbook() {
        let mut t = table();
        t.metadata.clear();
        let ctx = build_context(&t, &FilterSelections::new());
        assert_eq!(ctx.get("krl_tahun"), Some(&ContextValue::Number(None)));
        assert_eq!(ctx.get("krl_jumlah_bulan"), Some(&ContextValue::Number(None)));
    }
}
