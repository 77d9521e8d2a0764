mod common;

use common::*;
use econ_reports::reports::{self, outputs};
use econ_reports::{DateKey, MemorySink, PipelineError, Report, Table, Value};
use std::sync::Arc;

fn column(table: &Table, name: &str) -> Vec<Option<Value>> {
    table
        .column_values(name)
        .unwrap()
        .into_iter()
        .map(|value| value.cloned())
        .collect()
}

fn month(year: i32, month: u32) -> Option<Value> {
    Some(Value::Date(DateKey::new(year, month).unwrap()))
}

fn float(value: f64) -> Option<Value> {
    Some(Value::float(value))
}

fn year(year: i64) -> Option<Value> {
    Some(Value::Integer(year))
}

fn run(report: Report) -> (Arc<MemorySink>, econ_reports::RunDiagnostics) {
    let sink = Arc::new(MemorySink::new());
    let context = context(memory_source(), sink.clone());
    let mut runs = reports::run(&context, &[report]).unwrap();
    (sink, runs.remove(0))
}

#[test]
fn test_cpi_yearly_average_per_province() {
    let (sink, diagnostics) = run(Report::Cpi);
    let table = sink.get(outputs::CPI).unwrap();

    assert_eq!(table.column_names(), vec!["YEAR", "Canada", "Ontario", "Quebec"]);
    assert_eq!(column(&table, "YEAR"), vec![year(2010), year(2011), year(2020)]);
    assert_eq!(column(&table, "Canada"), vec![float(115.33), None, None]);
    assert_eq!(column(&table, "Ontario"), vec![float(115.5), float(118.0), None]);
    // the 2011 Quebec value is suppressed (`..`), so the year has no average
    assert_eq!(column(&table, "Quebec"), vec![float(114.2), None, float(139.0)]);

    assert_eq!(diagnostics.outputs, vec![outputs::CPI.to_string()]);
    assert_eq!(diagnostics.coerced_to_missing, 1);
    assert_eq!(diagnostics.stage("cpi_not_null").unwrap().dropped, 1);
    assert_eq!(diagnostics.stage("cpi_all_items").unwrap().dropped, 1);
    assert_eq!(diagnostics.stage("cpi_decade").unwrap().dropped, 2);
    assert_eq!(diagnostics.stage("cpi_provinces").unwrap().dropped, 1);
    assert_eq!(diagnostics.total_dropped(), 5);
}

#[test]
fn test_retail_and_yahoo_outputs() {
    let (sink, diagnostics) = run(Report::RetailYahoo);

    let provinces = sink.get(outputs::RETAIL_PROVINCES).unwrap();
    assert_eq!(provinces.column_names(), vec!["REF_DATE", "Ontario", "Quebec"]);
    assert_eq!(column(&provinces, "REF_DATE"), vec![month(2010, 1), month(2010, 2)]);
    assert_eq!(column(&provinces, "Ontario"), vec![float(30.0), float(33.0)]);
    assert_eq!(column(&provinces, "Quebec"), vec![float(20.0), None]);

    let industries = sink.get(outputs::RETAIL_INDUSTRIES).unwrap();
    assert_eq!(industries.column_names(), vec!["REF_DATE", FOOD_STORES, RETAIL_TRADE]);
    assert_eq!(
        column(&industries, RETAIL_TRADE),
        vec![float(100.0), float(110.0), float(120.0)]
    );
    assert_eq!(column(&industries, FOOD_STORES), vec![float(40.0), float(45.0), None]);

    let stocks = sink.get(outputs::YAHOO).unwrap();
    assert_eq!(
        stocks.column_names(),
        vec!["REF_DATE", "Avg Stock Traded", "Avg Highest Stock", "Avg Lowest Stock"]
    );
    assert_eq!(
        column(&stocks, "REF_DATE"),
        vec![month(2010, 1), month(2010, 2), month(2010, 4)]
    );
    assert_eq!(
        column(&stocks, "Avg Stock Traded"),
        vec![float(2000.0), float(2000.0), float(500.0)]
    );
    assert_eq!(column(&stocks, "Avg Lowest Stock"), vec![float(9.5), float(11.0), float(1.0)]);

    let merged = sink.get(outputs::RETAIL_YAHOO).unwrap();
    assert_eq!(
        merged.column_names(),
        vec![
            "REF_DATE",
            "TotalRetailTradePrice",
            "Avg Stock Traded",
            "Avg Highest Stock",
            "Avg Lowest Stock"
        ]
    );
    assert_eq!(column(&merged, "REF_DATE"), vec![month(2010, 1), month(2010, 2)]);
    assert_eq!(column(&merged, "TotalRetailTradePrice"), vec![float(140.0), float(155.0)]);
    assert_eq!(column(&merged, "Avg Highest Stock"), vec![float(13.0), float(13.0)]);

    // March has no quotes, April has no retail figures
    assert_eq!(diagnostics.stage("retail_yahoo").unwrap().dropped, 2);
    assert!(diagnostics.join_warnings.is_empty());
    assert_eq!(diagnostics.outputs.len(), 4);
}

#[test]
fn test_tsx_and_business_outputs() {
    let (sink, diagnostics) = run(Report::TsxBusiness);

    let tsx = sink.get(outputs::TSX).unwrap();
    assert_eq!(
        tsx.column_names(),
        vec!["REF_DATE", "Toronto Stock Exchange Statistics", "Total Stock Value"]
    );
    assert_eq!(
        column(&tsx, "REF_DATE"),
        vec![month(2005, 6), month(2010, 1), month(2010, 1), month(2010, 2), month(2011, 1)]
    );
    assert_eq!(
        column(&tsx, "Total Stock Value"),
        vec![float(9000.0), float(11500.0), float(650.0), float(11200.0), float(13000.0)]
    );

    // the TSX 60 subset is taken before the low-total cut
    let tsx60 = sink.get(outputs::TSX60).unwrap();
    assert_eq!(tsx60.column_names(), vec!["REF_DATE", "Total TSX 60 Value"]);
    assert_eq!(column(&tsx60, "Total TSX 60 Value"), vec![float(650.0), float(60.0)]);

    let yearly = sink.get(outputs::TSX_YEARLY).unwrap();
    assert_eq!(yearly.column_names(), vec!["REF_DATE", "Avg Yearly TSX Stock"]);
    assert_eq!(column(&yearly, "REF_DATE"), vec![year(2005), year(2010), year(2011)]);
    let average_2010 = yearly.value(1, "Avg Yearly TSX Stock").and_then(Value::as_f64).unwrap();
    assert!((average_2010 - 23350.0 / 3.0).abs() < 1e-9);

    let business = sink.get(outputs::BUSINESS_INDICATORS).unwrap();
    assert_eq!(
        business.column_names(),
        vec!["YEAR", "Leading indicators", "Business Profit Factor"]
    );
    assert_eq!(column(&business, "YEAR"), vec![month(2009, 12), month(2010, 1), month(2010, 1)]);
    assert_eq!(
        column(&business, "Leading indicators"),
        vec![
            Some(Value::from("Money supply")),
            Some(Value::from("Housing index")),
            Some(Value::from("Money supply")),
        ]
    );
    assert_eq!(
        column(&business, "Business Profit Factor"),
        vec![float(10.0), float(150.0), float(200.0)]
    );

    assert_eq!(diagnostics.stage("tsx_not_null").unwrap().dropped, 1);
    assert_eq!(diagnostics.stage("tsx_index").unwrap().dropped, 1);
    assert_eq!(diagnostics.stage("tsx_positive").unwrap().dropped, 1);
    assert_eq!(diagnostics.stage("business_smoothed").unwrap().dropped, 1);
}

#[test]
fn test_household_yearly_expenditure() {
    let (sink, diagnostics) = run(Report::HouseholdConsumption);
    let table = sink.get(outputs::HOUSEHOLD).unwrap();

    assert_eq!(table.column_names(), vec!["YEAR", "household_expenditure*(10^6)"]);
    assert_eq!(column(&table, "YEAR"), vec![year(2010), year(2011)]);
    assert_eq!(
        column(&table, "household_expenditure*(10^6)"),
        vec![float(1175.0), float(1300.0)]
    );
    assert_eq!(diagnostics.stage("household_decade").unwrap().dropped, 1);
    assert_eq!(diagnostics.coerced_to_missing, 0);
}

#[test]
fn test_all_reports_share_one_context() {
    let sink = Arc::new(MemorySink::new());
    let context = context(memory_source(), sink.clone());
    let runs = reports::run(&context, &Report::ALL).unwrap();

    assert_eq!(runs.len(), 4);
    assert!(runs.iter().all(|run| run.run_id == context.run_id()));
    assert_eq!(sink.destinations().len(), 10);
}

#[test]
fn test_missing_input_names_the_ingest_stage() {
    let mut source = memory_source();
    source.clear();
    let context = context(source, Arc::new(MemorySink::new()));

    let err = reports::run(&context, &[Report::HouseholdConsumption]).unwrap_err();
    match &err {
        PipelineError::Stage { stage, .. } => assert_eq!(stage, "household"),
        other => panic!("expected stage error, got {:?}", other),
    }
    assert!(matches!(err.root_cause(), PipelineError::Io(_)));
}
