pub mod error;
pub mod date_key;
pub mod value;
pub mod schema;
pub mod table;
pub mod source;
pub mod ingest;
pub mod clean;
pub mod window;
pub mod aggregate;
pub mod join;
pub mod derive;
pub mod sink;
pub mod fetch;
pub mod diagnostics;
pub mod context;
pub mod plan;
pub mod reports;
pub mod config;


pub use error::{PipelineError, Result};
pub use date_key::{DateFormat, DateKey, DateKeyError};
pub use value::{Value, ValueType};
pub use schema::{Column, Schema, SchemaRegistry};
pub use table::{Row, Table};
pub use source::{CsvSource, InMemorySource, RawRecord, SourceBatch, TableSource};
pub use ingest::{ingest, ingest_counted, Ingested};
pub use clean::{NullPolicy, Predicate, UnparsableDate};
pub use window::DateWindow;
pub use aggregate::{pivot, group_reduce, AggregateFn, Aggregation, GroupReduce, PivotSpec, Pivoted};
pub use join::{inner_join, DuplicateColumns, JoinKeyDuplicationWarning, Joined};
pub use derive::row_sum;
pub use sink::{CsvSink, FileLayout, MemorySink, ReportWriter, SqliteSink, WriteMode, WriteOptions};
pub use fetch::{FetchConfig, Fetcher};
pub use diagnostics::{RunDiagnostics, StageReport};
pub use context::PipelineContext;
pub use plan::{PlanOutput, Port, ReportPlan, Stage, StageId, StageOp};
pub use reports::Report;
pub use config::{PipelineConfig, SinkKind};
