//! The economic reports, expressed as plans over the built-in sources.
//!
//! Every report restricts StatCan series the same way (drop empty records,
//! normalize `REF_DATE` to a month, keep the analysis window) and then
//! reshapes them into the published outputs.

use crate::aggregate::{AggregateFn, Aggregation, GroupReduce, PivotSpec};
use crate::clean::{NullPolicy, Predicate};
use crate::context::PipelineContext;
use crate::date_key::DateFormat;
use crate::diagnostics::RunDiagnostics;
use crate::error::{PipelineError, Result};
use crate::join::DuplicateColumns;
use crate::plan::{ReportPlan, StageOp};
use crate::schema::sources;
use crate::sink::WriteOptions;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Source locations, relative to the input root.
pub mod locations {
    pub const CPI: &str = "Canada_CPI.csv";
    /// Directory of retail trade extracts (StatCan table 20-10-0008)
    pub const RETAIL_TRADE: &str = "20100008";
    pub const YAHOO_FINANCE: &str = "YahooFinance.csv";
    pub const TSX: &str = "10100125/TSX-statistics.csv";
    pub const BUSINESS_INDICATORS: &str = "33100111/Business-indicators.csv";
    pub const HOUSEHOLD_CONSUMPTION: &str = "household_consumption.csv";
}

/// Output destination names.
pub mod outputs {
    pub const CPI: &str = "Canada_CPI_output";
    pub const RETAIL_PROVINCES: &str = "Retail1_output";
    pub const RETAIL_INDUSTRIES: &str = "Retail2_output";
    pub const YAHOO: &str = "Yahoo_output";
    pub const RETAIL_YAHOO: &str = "Retail+YahooStock";
    pub const TSX: &str = "TSX_output";
    pub const TSX60: &str = "TSX60_output";
    pub const TSX_YEARLY: &str = "TSX-yearly";
    pub const BUSINESS_INDICATORS: &str = "BIndicator_output";
    pub const HOUSEHOLD: &str = "house_expenditure_output";
}

/// Retail industries without trade in the seasonally adjusted Canada series.
pub const NON_TRADING_INDUSTRIES: [&str; 3] = [
    "Cannabis stores [453993]",
    "Department stores [4521]",
    "Other general merchandise stores [4529]",
];

pub const TSX60_INDEX: &str = "Standard and Poor's/Toronto Stock Exchange 60 Index";

/// The available reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Report {
    Cpi,
    RetailYahoo,
    TsxBusiness,
    HouseholdConsumption,
}

impl Report {
    pub const ALL: [Report; 4] = [
        Report::Cpi,
        Report::RetailYahoo,
        Report::TsxBusiness,
        Report::HouseholdConsumption,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Report::Cpi => "cpi",
            Report::RetailYahoo => "retail_yahoo",
            Report::TsxBusiness => "tsx_business",
            Report::HouseholdConsumption => "household_consumption",
        }
    }

    pub fn plan(&self) -> Result<ReportPlan> {
        match self {
            Report::Cpi => cpi(),
            Report::RetailYahoo => retail_yahoo(),
            Report::TsxBusiness => tsx_business(),
            Report::HouseholdConsumption => household_consumption(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Report {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Report::ALL
            .into_iter()
            .find(|report| report.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::Config(format!("unknown report '{}'", s.trim())))
    }
}

fn month_dates() -> StageOp {
    StageOp::normalize_date("REF_DATE", DateFormat::YearMonth)
}

/// Yearly average CPI per province.
pub fn cpi() -> Result<ReportPlan> {
    let mut plan = ReportPlan::new(Report::Cpi.name());
    let raw = plan.ingest("cpi", sources::CPI, locations::CPI)?;
    let yearly = plan.chain(
        raw,
        vec![
            (
                "cpi_not_null",
                StageOp::filter_missing(&["REF_DATE", "GEO", "VALUE"], NullPolicy::AnyRequiredPresent),
            ),
            (
                "cpi_all_items",
                StageOp::filter_equals("Products and product groups", "All-items"),
            ),
            ("cpi_dated", month_dates()),
            ("cpi_decade", StageOp::window("REF_DATE")),
            ("cpi_provinces", StageOp::filter("GEO", Predicate::Excludes(",".into()))),
            ("cpi_year", StageOp::extract_year("REF_DATE", "YEAR")),
            (
                "cpi_by_province",
                StageOp::Pivot(
                    PivotSpec::new(&["YEAR"], "GEO", "VALUE", AggregateFn::RoundedAverage(2))
                        .order_by("YEAR"),
                ),
            ),
        ],
    )?;
    plan.write(yearly, "cpi_output", outputs::CPI, WriteOptions::default())?;
    Ok(plan)
}

/// Monthly retail trade per province and per industry, Yahoo stock
/// averages, and total retail trade joined with the stock averages.
pub fn retail_yahoo() -> Result<ReportPlan> {
    let mut plan = ReportPlan::new(Report::RetailYahoo.name());

    let retail = plan.ingest("retail", sources::RETAIL_TRADE, locations::RETAIL_TRADE)?;
    let retail = plan.chain(
        retail,
        vec![
            (
                "retail_not_null",
                StageOp::filter_missing(&["REF_DATE", "GEO", "VALUE"], NullPolicy::AnyRequiredPresent),
            ),
            ("retail_dated", month_dates()),
            (
                "retail_seasonal",
                StageOp::filter_equals("Adjustments", "Seasonally adjusted"),
            ),
            ("retail_duration", StageOp::window("REF_DATE")),
        ],
    )?;

    let provinces = plan.chain(
        retail,
        vec![
            ("retail_provinces", StageOp::filter("GEO", Predicate::Excludes(",".into()))),
            ("retail_not_canada", StageOp::filter("GEO", Predicate::NotEquals("Canada".into()))),
            (
                "retail_by_province",
                StageOp::Pivot(
                    PivotSpec::new(&["REF_DATE"], "GEO", "VALUE", AggregateFn::Average)
                        .order_by("REF_DATE"),
                ),
            ),
        ],
    )?;
    plan.write(provinces, "retail1_output", outputs::RETAIL_PROVINCES, WriteOptions::default())?;

    let industries = plan.chain(
        retail,
        vec![
            ("retail_canada", StageOp::filter_equals("GEO", "Canada")),
            (
                "retail_by_industry",
                StageOp::Pivot(
                    PivotSpec::new(
                        &["REF_DATE"],
                        "North American Industry Classification System (NAICS)",
                        "VALUE",
                        AggregateFn::Average,
                    )
                    .order_by("REF_DATE"),
                ),
            ),
            ("retail_trading", StageOp::drop(&NON_TRADING_INDUSTRIES)),
        ],
    )?;
    plan.write(industries, "retail2_output", outputs::RETAIL_INDUSTRIES, WriteOptions::default())?;

    let yahoo = plan.ingest("yahoo", sources::YAHOO_FINANCE, locations::YAHOO_FINANCE)?;
    let yahoo = plan.chain(
        yahoo,
        vec![
            (
                "yahoo_not_null",
                StageOp::filter_missing(&["REF_DATE"], NullPolicy::AnyRequiredPresent),
            ),
            // daily quotes truncate to their month
            ("yahoo_dated", month_dates()),
            ("yahoo_duration", StageOp::window("REF_DATE")),
            (
                "yahoo_monthly",
                StageOp::GroupReduce(
                    GroupReduce::new(&["REF_DATE"])
                        .aggregate(Aggregation::new("Volume", AggregateFn::Average))
                        .aggregate(Aggregation::new("High", AggregateFn::Average).alias("Avg Highest Stock"))
                        .aggregate(Aggregation::new("Low", AggregateFn::Average).alias("Avg Lowest Stock"))
                        .order_by("REF_DATE"),
                ),
            ),
            ("yahoo_traded", StageOp::rename("avg(Volume)", "Avg Stock Traded")),
        ],
    )?;
    plan.write(yahoo, "yahoo_output", outputs::YAHOO, WriteOptions::default())?;

    let total = plan.then(
        industries,
        "retail_total",
        StageOp::row_sum(&["REF_DATE"], "TotalRetailTradePrice"),
    )?;
    let merged = plan.join(total, yahoo, "retail_yahoo", "REF_DATE", DuplicateColumns::Reject)?;
    let merged = plan.chain(
        merged,
        vec![
            (
                "retail_yahoo_columns",
                StageOp::select(&[
                    "REF_DATE",
                    "TotalRetailTradePrice",
                    "Avg Stock Traded",
                    "Avg Highest Stock",
                    "Avg Lowest Stock",
                ]),
            ),
            ("retail_yahoo_sorted", StageOp::sort("REF_DATE")),
        ],
    )?;
    plan.write(merged, "retail_yahoo_output", outputs::RETAIL_YAHOO, WriteOptions::default())?;

    Ok(plan)
}

/// TSX index totals, the TSX 60 subset, yearly TSX averages, and leading
/// business indicators.
pub fn tsx_business() -> Result<ReportPlan> {
    let mut plan = ReportPlan::new(Report::TsxBusiness.name());

    let tsx = plan.ingest("tsx", sources::TSX, locations::TSX)?;
    let totals = plan.chain(
        tsx,
        vec![
            (
                "tsx_not_null",
                StageOp::filter_missing(&["REF_DATE", "VALUE"], NullPolicy::AllRequiredPresent),
            ),
            ("tsx_dated", month_dates()),
            ("tsx_index", StageOp::filter_equals("UOM", "Index")),
            ("tsx_positive", StageOp::filter("VALUE", Predicate::GreaterThan(0.0))),
            (
                "tsx_totals",
                StageOp::GroupReduce(
                    GroupReduce::new(&["REF_DATE", "Toronto Stock Exchange Statistics"])
                        .aggregate(Aggregation::new("VALUE", AggregateFn::Sum)),
                ),
            ),
            ("tsx_total_value", StageOp::rename("sum(VALUE)", "Total Stock Value")),
        ],
    )?;

    // totals of 100 or less are left out of the published series
    let significant = plan.chain(
        totals,
        vec![
            (
                "tsx_significant",
                StageOp::filter("Total Stock Value", Predicate::GreaterThan(100.0)),
            ),
            ("tsx_sorted", StageOp::sort("REF_DATE")),
        ],
    )?;
    plan.write(significant, "tsx_output", outputs::TSX, WriteOptions::default())?;

    let tsx60 = plan.chain(
        totals,
        vec![
            ("tsx60_only", StageOp::filter_equals("Toronto Stock Exchange Statistics", TSX60_INDEX)),
            ("tsx60_value", StageOp::rename("Total Stock Value", "Total TSX 60 Value")),
            ("tsx60_sorted", StageOp::sort("REF_DATE")),
            ("tsx60_columns", StageOp::select(&["REF_DATE", "Total TSX 60 Value"])),
        ],
    )?;
    plan.write(tsx60, "tsx60_output", outputs::TSX60, WriteOptions::default())?;

    let yearly = plan.chain(
        significant,
        vec![
            ("tsx_year", StageOp::extract_year("REF_DATE", "REF_DATE")),
            (
                "tsx_yearly_average",
                StageOp::GroupReduce(
                    GroupReduce::new(&["REF_DATE"])
                        .aggregate(
                            Aggregation::new("Total Stock Value", AggregateFn::Average)
                                .alias("Avg Yearly TSX Stock"),
                        )
                        .order_by("REF_DATE"),
                ),
            ),
        ],
    )?;
    plan.write(yearly, "tsx_yearly_output", outputs::TSX_YEARLY, WriteOptions::default())?;

    let business = plan.ingest(
        "business",
        sources::BUSINESS_INDICATORS,
        locations::BUSINESS_INDICATORS,
    )?;
    let business = plan.chain(
        business,
        vec![
            (
                "business_not_null",
                StageOp::filter_missing(&["REF_DATE", "VALUE"], NullPolicy::AllRequiredPresent),
            ),
            ("business_dated", month_dates()),
            ("business_positive", StageOp::filter("VALUE", Predicate::GreaterThan(0.0))),
            ("business_smoothed", StageOp::filter_equals("Composite index", "Smoothed")),
            (
                "business_totals",
                StageOp::GroupReduce(
                    GroupReduce::new(&["REF_DATE", "Leading indicators"])
                        .aggregate(Aggregation::new("VALUE", AggregateFn::Sum).alias("Business Profit Factor")),
                ),
            ),
            ("business_year", StageOp::rename("REF_DATE", "YEAR")),
            ("business_sorted", StageOp::sort("YEAR")),
        ],
    )?;
    plan.write(
        business,
        "business_output",
        outputs::BUSINESS_INDICATORS,
        WriteOptions::default(),
    )?;

    Ok(plan)
}

/// Yearly average household final consumption expenditure.
pub fn household_consumption() -> Result<ReportPlan> {
    let mut plan = ReportPlan::new(Report::HouseholdConsumption.name());
    let raw = plan.ingest(
        "household",
        sources::HOUSEHOLD_CONSUMPTION,
        locations::HOUSEHOLD_CONSUMPTION,
    )?;
    let yearly = plan.chain(
        raw,
        vec![
            (
                "household_not_null",
                StageOp::filter_missing(
                    &["REF_DATE", "GEO", "Estimates", "VALUE"],
                    NullPolicy::AnyRequiredPresent,
                ),
            ),
            ("household_dated", month_dates()),
            ("household_decade", StageOp::window("REF_DATE")),
            (
                "household_seasonal",
                StageOp::filter_equals("Seasonal adjustment", "Seasonally adjusted at quarterly rates"),
            ),
            (
                "household_final_consumption",
                StageOp::filter_equals("Estimates", "Household final consumption expenditure"),
            ),
            ("household_current_prices", StageOp::filter_equals("Prices", "Current prices")),
            ("household_columns", StageOp::select(&["REF_DATE", "VALUE"])),
            ("household_expenditure", StageOp::rename("VALUE", "household_expenditure")),
            ("household_year", StageOp::extract_year("REF_DATE", "YEAR")),
            (
                "household_yearly_average",
                StageOp::GroupReduce(
                    GroupReduce::new(&["YEAR"])
                        .aggregate(
                            Aggregation::new("household_expenditure", AggregateFn::Average)
                                .alias("household_expenditure*(10^6)"),
                        )
                        .order_by("YEAR"),
                ),
            ),
        ],
    )?;
    plan.write(yearly, "household_output", outputs::HOUSEHOLD, WriteOptions::default())?;
    Ok(plan)
}

/// Runs the given reports one after another against one context.
///
/// # Errors
/// Stops at the first report that fails.
pub fn run(context: &PipelineContext, reports: &[Report]) -> Result<Vec<RunDiagnostics>> {
    reports
        .iter()
        .map(|report| {
            let plan = report.plan()?;
            plan.execute(context).map(|output| output.diagnostics)
        })
        .collect()
}
