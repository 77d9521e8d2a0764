//! Fixture builders shared by the integration tests.

#![allow(dead_code)]

use econ_reports::{DateWindow, InMemorySource, PipelineContext, ReportWriter, Schema, SchemaRegistry};
use std::sync::Arc;

pub const SA: &str = "Seasonally adjusted";
pub const RETAIL_TRADE: &str = "Retail trade [44-453]";
pub const FOOD_STORES: &str = "Food and beverage stores [445]";
pub const CANNABIS_STORES: &str = "Cannabis stores [453993]";
pub const TSX_CLOSE: &str = "Standard and Poor's/Toronto Stock Exchange Composite Index, close";
pub const HOUSEHOLD_SA: &str = "Seasonally adjusted at quarterly rates";
pub const FINAL_CONSUMPTION: &str = "Household final consumption expenditure";

/// One StatCan record in the column order of the built-in schemas.
pub fn statcan(date: &str, geo: &str, dimensions: &[&str], uom: &str, value: &str) -> Vec<String> {
    let mut fields = vec![date, geo, "2016A000011124"];
    fields.extend_from_slice(dimensions);
    fields.extend_from_slice(&[uom, "17", "units", "0", "v41690973", "2.1", value, "", "", "", "1"]);
    fields.into_iter().map(String::from).collect()
}

pub fn yahoo(date: &str, high: &str, low: &str, volume: &str) -> Vec<String> {
    [date, low, high, low, high, high, volume]
        .into_iter()
        .map(String::from)
        .collect()
}

/// CSV text for `records`, optionally led by the schema's header.
pub fn csv_text(schema: Option<&Schema>, records: &[Vec<String>]) -> String {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    if let Some(schema) = schema {
        writer.write_record(schema.names()).unwrap();
    }
    for record in records {
        writer.write_record(record).unwrap();
    }
    String::from_utf8(writer.into_inner().unwrap()).unwrap()
}

pub fn schema(source: &str) -> Schema {
    SchemaRegistry::builtin().lookup(source).unwrap().clone()
}

pub fn cpi_records() -> Vec<Vec<String>> {
    let all = ["All-items"];
    vec![
        statcan("2010-01", "Ontario", &all, "2002=100", "115.0"),
        statcan("2010-06", "Ontario", &all, "2002=100", "116.0"),
        statcan("2010-01", "Quebec", &all, "2002=100", "114.2"),
        statcan("2010-01", "Ontario", &["Food"], "2002=100", "130.0"),
        statcan("2011-03", "Ontario", &all, "2002=100", "118.0"),
        statcan("2011-05", "Quebec", &all, "2002=100", ".."),
        statcan("2009-12", "Ontario", &all, "2002=100", "113.0"),
        statcan("2020-10", "Quebec", &all, "2002=100", "139.0"),
        statcan("2020-11", "Quebec", &all, "2002=100", "140.0"),
        statcan(
            "2010-01",
            "Ottawa-Gatineau, Ontario part, Ontario/Quebec",
            &all,
            "2002=100",
            "116.0",
        ),
        statcan("2010-02", "Canada", &all, "2002=100", "115.333"),
        statcan("", "", &all, "2002=100", ""),
    ]
}

pub fn retail_records() -> Vec<Vec<String>> {
    vec![
        statcan("2010-01", "Canada", &[RETAIL_TRADE, SA], "Dollars", "100.0"),
        statcan("2010-01", "Canada", &[FOOD_STORES, SA], "Dollars", "40.0"),
        statcan("2010-01", "Canada", &[CANNABIS_STORES, SA], "Dollars", ""),
        statcan("2010-02", "Canada", &[RETAIL_TRADE, SA], "Dollars", "110.0"),
        statcan("2010-02", "Canada", &[FOOD_STORES, SA], "Dollars", "45.0"),
        statcan("2010-03", "Canada", &[RETAIL_TRADE, SA], "Dollars", "120.0"),
        statcan("2010-01", "Canada", &[RETAIL_TRADE, "Unadjusted"], "Dollars", "999.0"),
        statcan("2010-01", "Ontario", &[RETAIL_TRADE, SA], "Dollars", "30.0"),
        statcan("2010-01", "Quebec", &[RETAIL_TRADE, SA], "Dollars", "20.0"),
        statcan("2010-02", "Ontario", &[RETAIL_TRADE, SA], "Dollars", "33.0"),
        statcan("2009-12", "Ontario", &[RETAIL_TRADE, SA], "Dollars", "1.0"),
    ]
}

pub fn yahoo_records() -> Vec<Vec<String>> {
    vec![
        yahoo("2010-01-04", "12.0", "9.0", "1000"),
        yahoo("2010-01-05", "14.0", "10.0", "3000"),
        yahoo("2010-02-01", "13.0", "11.0", "2000"),
        yahoo("2009-12-31", "8.0", "7.0", "100"),
        yahoo("2010-04-01", "1.0", "1.0", "500"),
    ]
}

pub fn tsx_records() -> Vec<Vec<String>> {
    vec![
        statcan("2010-01", "Canada", &[TSX_CLOSE], "Index", "11000"),
        statcan("2010-01", "Canada", &[TSX_CLOSE], "Index", "500"),
        statcan("2010-01", "Canada", &[econ_reports::reports::TSX60_INDEX], "Index", "650"),
        statcan("2010-02", "Canada", &[TSX_CLOSE], "Index", "11200"),
        statcan("2010-02", "Canada", &[econ_reports::reports::TSX60_INDEX], "Index", "60"),
        statcan("2010-02", "Canada", &[TSX_CLOSE], "Number", "5000"),
        statcan("2010-03", "Canada", &[TSX_CLOSE], "Index", "-5"),
        statcan("2010-03", "Canada", &[TSX_CLOSE], "Index", ""),
        statcan("2005-06", "Canada", &[TSX_CLOSE], "Index", "9000"),
        statcan("2011-01", "Canada", &[TSX_CLOSE], "Index", "13000"),
    ]
}

pub fn business_records() -> Vec<Vec<String>> {
    vec![
        statcan("2010-01", "Canada", &["Housing index", "Smoothed"], "Index", "100"),
        statcan("2010-01", "Canada", &["Money supply", "Smoothed"], "Index", "200"),
        statcan("2010-01", "Canada", &["Housing index", "Smoothed"], "Index", "50"),
        statcan("2010-01", "Canada", &["Housing index", "Unsmoothed"], "Index", "999"),
        statcan("2009-12", "Canada", &["Money supply", "Smoothed"], "Index", "10"),
        statcan("2010-02", "Canada", &["Money supply", "Smoothed"], "Index", "-3"),
    ]
}

pub fn household_records() -> Vec<Vec<String>> {
    let current = ["Current prices", HOUSEHOLD_SA, FINAL_CONSUMPTION];
    vec![
        statcan("2010-01", "Canada", &current, "Dollars", "1000"),
        statcan("2010-04", "Canada", &current, "Dollars", "1100"),
        statcan("2010-07", "Canada", &current, "Dollars", "1200"),
        // decimal text is truncated, not dropped
        statcan("2010-10", "Canada", &current, "Dollars", "1400.7"),
        statcan("2011-01", "Canada", &current, "Dollars", "1300"),
        statcan(
            "2010-01",
            "Canada",
            &["Chained (2012) dollars", HOUSEHOLD_SA, FINAL_CONSUMPTION],
            "Dollars",
            "900",
        ),
        statcan("2010-01", "Canada", &["Current prices", "Unadjusted", FINAL_CONSUMPTION], "Dollars", "800"),
        statcan(
            "2010-01",
            "Canada",
            &["Current prices", HOUSEHOLD_SA, "Food and non-alcoholic beverages"],
            "Dollars",
            "50",
        ),
        statcan("2021-01", "Canada", &current, "Dollars", "5000"),
    ]
}

/// Every fixture keyed by (source name, location, records).
pub fn fixtures() -> Vec<(&'static str, &'static str, Vec<Vec<String>>)> {
    use econ_reports::reports::locations;
    use econ_reports::schema::sources;

    vec![
        (sources::CPI, locations::CPI, cpi_records()),
        (sources::RETAIL_TRADE, locations::RETAIL_TRADE, retail_records()),
        (sources::YAHOO_FINANCE, locations::YAHOO_FINANCE, yahoo_records()),
        (sources::TSX, locations::TSX, tsx_records()),
        (
            sources::BUSINESS_INDICATORS,
            locations::BUSINESS_INDICATORS,
            business_records(),
        ),
        (
            sources::HOUSEHOLD_CONSUMPTION,
            locations::HOUSEHOLD_CONSUMPTION,
            household_records(),
        ),
    ]
}

/// In-memory source holding every fixture with its header.
pub fn memory_source() -> InMemorySource {
    let mut source = InMemorySource::new();
    for (name, location, records) in fixtures() {
        source.add_csv(location, csv_text(Some(&schema(name)), &records));
    }
    source
}

pub fn context<S>(source: S, sink: Arc<dyn ReportWriter>) -> PipelineContext
where
    S: econ_reports::TableSource + 'static,
{
    PipelineContext::new(
        Arc::new(SchemaRegistry::builtin()),
        DateWindow::default(),
        Arc::new(source),
        sink,
    )
}
