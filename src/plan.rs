//! Report plans.
//!
//! A [`ReportPlan`] wires named stages from the fixed operation vocabulary
//! into a DAG. Edges carry the input [`Port`] so a join knows which parent is
//! its left side. Execution walks the DAG in a deterministic topological
//! order (Kahn's algorithm, ties broken by insertion order); every stage
//! output is kept as an `Arc<Table>` so one table can feed several consumers.

use crate::aggregate::{pivot_counted, GroupReduce, PivotSpec, PARTITION_ROWS};
use crate::clean::{self, NullPolicy, Predicate};
use crate::context::PipelineContext;
use crate::date_key::DateFormat;
use crate::derive::row_sum;
use crate::diagnostics::{RunDiagnostics, StageReport};
use crate::error::{PipelineError, Result};
use crate::ingest::ingest_counted;
use crate::join::{inner_join, DuplicateColumns};
use crate::sink::WriteOptions;
use crate::table::Table;
use crate::window::{self, DateWindow};
use daggy::{petgraph::Direction, Dag, NodeIndex, Walker};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Stage identifier within one plan
pub type StageId = NodeIndex;

/// Which input of the child stage an edge feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Port {
    Input,
    Left,
    Right,
}

/// The operation a stage performs.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOp {
    Ingest {
        source: String,
        location: String,
    },
    FilterMissing {
        required: Vec<String>,
        policy: NullPolicy,
    },
    NormalizeDate {
        column: String,
        format: DateFormat,
    },
    /// Restricts to `window`, or to the run's window when `None`
    Window {
        column: String,
        window: Option<DateWindow>,
    },
    Filter {
        column: String,
        predicate: Predicate,
    },
    ExtractYear {
        column: String,
        output: String,
    },
    GroupReduce(GroupReduce),
    Pivot(PivotSpec),
    Join {
        key: String,
        policy: DuplicateColumns,
    },
    RowSum {
        exclude: Vec<String>,
        output: String,
    },
    Select(Vec<String>),
    Rename {
        from: String,
        to: String,
    },
    Drop(Vec<String>),
    Sort(String),
    Write {
        destination: String,
        options: WriteOptions,
    },
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

impl StageOp {
    pub fn filter_missing(required: &[&str], policy: NullPolicy) -> Self {
        StageOp::FilterMissing {
            required: owned(required),
            policy,
        }
    }

    pub fn normalize_date(column: &str, format: DateFormat) -> Self {
        StageOp::NormalizeDate {
            column: column.to_string(),
            format,
        }
    }

    /// Window on the run's configured range.
    pub fn window(column: &str) -> Self {
        StageOp::Window {
            column: column.to_string(),
            window: None,
        }
    }

    pub fn filter(column: &str, predicate: Predicate) -> Self {
        StageOp::Filter {
            column: column.to_string(),
            predicate,
        }
    }

    pub fn filter_equals(column: &str, value: &str) -> Self {
        Self::filter(column, Predicate::Equals(value.to_string()))
    }

    pub fn extract_year(column: &str, output: &str) -> Self {
        StageOp::ExtractYear {
            column: column.to_string(),
            output: output.to_string(),
        }
    }

    pub fn row_sum(exclude: &[&str], output: &str) -> Self {
        StageOp::RowSum {
            exclude: owned(exclude),
            output: output.to_string(),
        }
    }

    pub fn select(columns: &[&str]) -> Self {
        StageOp::Select(owned(columns))
    }

    pub fn rename(from: &str, to: &str) -> Self {
        StageOp::Rename {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn drop(columns: &[&str]) -> Self {
        StageOp::Drop(owned(columns))
    }

    pub fn sort(column: &str) -> Self {
        StageOp::Sort(column.to_string())
    }

    /// Short operation name used in logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            StageOp::Ingest { .. } => "ingest",
            StageOp::FilterMissing { .. } => "filter_missing",
            StageOp::NormalizeDate { .. } => "normalize_date",
            StageOp::Window { .. } => "window",
            StageOp::Filter { .. } => "filter",
            StageOp::ExtractYear { .. } => "extract_year",
            StageOp::GroupReduce(_) => "group_reduce",
            StageOp::Pivot(_) => "pivot",
            StageOp::Join { .. } => "join",
            StageOp::RowSum { .. } => "row_sum",
            StageOp::Select(_) => "select",
            StageOp::Rename { .. } => "rename",
            StageOp::Drop(_) => "drop",
            StageOp::Sort(_) => "sort",
            StageOp::Write { .. } => "write",
        }
    }

    fn ports(&self) -> &'static [Port] {
        match self {
            StageOp::Ingest { .. } => &[],
            StageOp::Join { .. } => &[Port::Left, Port::Right],
            _ => &[Port::Input],
        }
    }
}

/// A named node of a report plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub op: StageOp,
}

/// Tables and diagnostics produced by one plan execution.
#[derive(Debug, Clone)]
pub struct PlanOutput {
    /// Output of every stage, keyed by stage name
    pub tables: BTreeMap<String, Arc<Table>>,
    pub diagnostics: RunDiagnostics,
}

impl PlanOutput {
    pub fn table(&self, stage: &str) -> Option<&Arc<Table>> {
        self.tables.get(stage)
    }
}

/// DAG of stages making up one report.
#[derive(Debug, Clone)]
pub struct ReportPlan {
    name: String,
    dag: Dag<Stage, Port>,
    names: HashMap<String, StageId>,
}

impl ReportPlan {
    pub fn new(name: impl Into<String>) -> Self {
        ReportPlan {
            name: name.into(),
            dag: Dag::new(),
            names: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.dag.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.node_count() == 0
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.dag.node_weight(id)
    }

    pub fn stage_id(&self, name: &str) -> Option<StageId> {
        self.names.get(name).copied()
    }

    fn add(&mut self, name: &str, op: StageOp, inputs: &[(StageId, Port)]) -> Result<StageId> {
        if self.names.contains_key(name) {
            return Err(PipelineError::Plan(format!("duplicate stage name '{}'", name)));
        }
        let expected = op.ports();
        let mut given: Vec<Port> = inputs.iter().map(|(_, port)| *port).collect();
        given.sort();
        if given != expected {
            return Err(PipelineError::Plan(format!(
                "stage '{}' ({}) expects inputs {:?}, got {:?}",
                name,
                op.kind(),
                expected,
                given
            )));
        }
        for (parent, _) in inputs {
            if self.dag.node_weight(*parent).is_none() {
                return Err(PipelineError::Plan(format!(
                    "stage '{}' refers to an unknown parent",
                    name
                )));
            }
        }

        let id = self.dag.add_node(Stage {
            name: name.to_string(),
            op,
        });
        for (parent, port) in inputs {
            self.dag.add_edge(*parent, id, *port).map_err(|_| {
                PipelineError::Plan(format!("stage '{}' would create a cycle", name))
            })?;
        }
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Adds a stage reading `location` against the schema of `source`.
    pub fn ingest(&mut self, name: &str, source: &str, location: &str) -> Result<StageId> {
        self.add(
            name,
            StageOp::Ingest {
                source: source.to_string(),
                location: location.to_string(),
            },
            &[],
        )
    }

    /// Adds a single-input stage consuming `parent`.
    pub fn then(&mut self, parent: StageId, name: &str, op: StageOp) -> Result<StageId> {
        self.add(name, op, &[(parent, Port::Input)])
    }

    /// Chains single-input stages, returning the last one.
    pub fn chain(&mut self, parent: StageId, stages: Vec<(&str, StageOp)>) -> Result<StageId> {
        stages
            .into_iter()
            .try_fold(parent, |previous, (name, op)| self.then(previous, name, op))
    }

    pub fn join(
        &mut self,
        left: StageId,
        right: StageId,
        name: &str,
        key: &str,
        policy: DuplicateColumns,
    ) -> Result<StageId> {
        self.add(
            name,
            StageOp::Join {
                key: key.to_string(),
                policy,
            },
            &[(left, Port::Left), (right, Port::Right)],
        )
    }

    pub fn write(
        &mut self,
        parent: StageId,
        name: &str,
        destination: &str,
        options: WriteOptions,
    ) -> Result<StageId> {
        self.then(
            parent,
            name,
            StageOp::Write {
                destination: destination.to_string(),
                options,
            },
        )
    }

    /// Topological order; among ready stages the earliest added runs first.
    pub fn execution_order(&self) -> Result<Vec<StageId>> {
        let graph = self.dag.graph();
        let mut in_degree = vec![0usize; self.dag.node_count()];
        for node in graph.node_indices() {
            for child in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[child.index()] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(index, _)| index)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(index) = ready.pop_first() {
            let node = NodeIndex::new(index);
            order.push(node);
            for child in graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = &mut in_degree[child.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(child.index());
                }
            }
        }

        if order.len() != self.dag.node_count() {
            return Err(PipelineError::Plan(
                "topological sort failed - plan may contain cycles".to_string(),
            ));
        }
        Ok(order)
    }

    fn inputs(&self, id: StageId, outputs: &HashMap<StageId, Arc<Table>>) -> Result<Vec<Arc<Table>>> {
        let mut parents: Vec<(Port, StageId)> = self
            .dag
            .parents(id)
            .iter(&self.dag)
            .filter_map(|(edge, parent)| self.dag.edge_weight(edge).map(|port| (*port, parent)))
            .collect();
        parents.sort();

        parents
            .into_iter()
            .map(|(_, parent)| {
                outputs.get(&parent).cloned().ok_or_else(|| {
                    PipelineError::Plan(format!("input of stage {} was not computed", id.index()))
                })
            })
            .collect()
    }

    /// Runs every stage in order.
    ///
    /// # Errors
    /// The first failing stage aborts the run; its error is wrapped in
    /// `PipelineError::Stage` naming the stage.
    pub fn execute(&self, context: &PipelineContext) -> Result<PlanOutput> {
        let order = self.execution_order()?;
        let mut diagnostics = RunDiagnostics::new(context.run_id(), &self.name);
        let mut outputs: HashMap<StageId, Arc<Table>> = HashMap::with_capacity(order.len());

        info!("Running report '{}' ({} stages)", self.name, order.len());

        for id in order {
            let stage = self
                .dag
                .node_weight(id)
                .ok_or_else(|| PipelineError::Plan(format!("missing stage {}", id.index())))?;
            let inputs = self.inputs(id, &outputs)?;
            let output = run_stage(stage, &inputs, context, &mut diagnostics)
                .map_err(|err| err.in_stage(&stage.name))?;
            outputs.insert(id, output);
        }

        info!(
            "Report '{}' finished: {} outputs written, {} rows dropped",
            self.name,
            diagnostics.outputs.len(),
            diagnostics.total_dropped()
        );
        if let Ok(summary) = diagnostics.to_json() {
            debug!("Run diagnostics for '{}': {}", self.name, summary);
        }

        let tables = outputs
            .into_iter()
            .filter_map(|(id, table)| self.dag.node_weight(id).map(|stage| (stage.name.clone(), table)))
            .collect();
        Ok(PlanOutput { tables, diagnostics })
    }
}

fn run_stage(
    stage: &Stage,
    inputs: &[Arc<Table>],
    context: &PipelineContext,
    diagnostics: &mut RunDiagnostics,
) -> Result<Arc<Table>> {
    let rows_in: usize = inputs.iter().map(|table| table.num_rows()).sum();
    let mut dropped = None;

    let input = || {
        inputs
            .first()
            .ok_or_else(|| PipelineError::Plan(format!("stage '{}' has no input", stage.name)))
    };

    let output: Arc<Table> = match &stage.op {
        StageOp::Ingest { source, location } => {
            let schema = context.registry().lookup(source)?;
            let ingested = ingest_counted(context.source(), location, source, schema)?;
            diagnostics.coerced_to_missing += ingested.coerced_to_missing;
            dropped = Some(0);
            Arc::new(ingested.table)
        }
        StageOp::FilterMissing { required, policy } => {
            let required: Vec<&str> = required.iter().map(String::as_str).collect();
            Arc::new(clean::filter_missing(input()?, &required, *policy)?)
        }
        StageOp::NormalizeDate { column, format } => {
            let normalized = clean::normalize_date(input()?, column, format)?;
            dropped = Some(normalized.unparsable);
            diagnostics.record_unparsable(normalized.unparsable, normalized.samples);
            Arc::new(normalized.table)
        }
        StageOp::Window { column, window: range } => {
            let range = range.as_ref().unwrap_or_else(|| context.window());
            Arc::new(window::window(input()?, column, range)?)
        }
        StageOp::Filter { column, predicate } => Arc::new(clean::filter(input()?, column, predicate)?),
        StageOp::ExtractYear { column, output } => {
            dropped = Some(0);
            Arc::new(clean::extract_year(input()?, column, output)?)
        }
        StageOp::GroupReduce(reduce) => {
            dropped = Some(0);
            Arc::new(reduce.apply(input()?)?)
        }
        StageOp::Pivot(spec) => {
            let pivoted = pivot_counted(input()?, spec, PARTITION_ROWS)?;
            dropped = Some(pivoted.missing_category);
            Arc::new(pivoted.table)
        }
        StageOp::Join { key, policy } => {
            let (left, right) = match inputs {
                [left, right] => (left, right),
                _ => {
                    return Err(PipelineError::Plan(format!(
                        "join '{}' needs two inputs, got {}",
                        stage.name,
                        inputs.len()
                    )))
                }
            };
            let joined = inner_join(left, right, key, policy)?;
            if let Some(warning) = joined.warning {
                diagnostics.join_warnings.push(warning);
            }
            dropped = Some(joined.unmatched_left + joined.unmatched_right);
            Arc::new(joined.table)
        }
        StageOp::RowSum { exclude, output } => {
            let exclude: Vec<&str> = exclude.iter().map(String::as_str).collect();
            Arc::new(row_sum(input()?, &exclude, output)?)
        }
        StageOp::Select(columns) => {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            Arc::new(input()?.select(&columns)?)
        }
        StageOp::Rename { from, to } => Arc::new(input()?.rename(from, to)?),
        StageOp::Drop(columns) => {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            Arc::new(input()?.drop_columns(&columns))
        }
        StageOp::Sort(column) => Arc::new(input()?.sort_by(column)?),
        StageOp::Write {
            destination,
            options,
        } => {
            let table = input()?;
            context.sink().write(table, destination, options)?;
            diagnostics.outputs.push(destination.clone());
            Arc::clone(table)
        }
    };

    let rows_out = output.num_rows();
    let dropped = dropped.unwrap_or_else(|| rows_in.saturating_sub(rows_out));
    info!(
        "Stage '{}' ({}): {} -> {} rows, {} dropped",
        stage.name,
        stage.op.kind(),
        rows_in,
        rows_out,
        dropped
    );
    diagnostics.record_stage(StageReport {
        stage: stage.name.clone(),
        op: stage.op.kind().to_string(),
        rows_in,
        rows_out,
        dropped,
    });
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateFn;
    use crate::schema::{Schema, SchemaRegistry};
    use crate::sink::MemorySink;
    use crate::source::InMemorySource;
    use crate::value::{Value, ValueType};

    fn context(source: InMemorySource, sink: Arc<MemorySink>) -> PipelineContext {
        let registry = SchemaRegistry::new().with_schema(
            "long",
            Schema::from_pairs(&[
                ("REF_DATE", ValueType::Text),
                ("GEO", ValueType::Text),
                ("VALUE", ValueType::Float),
            ])
            .unwrap(),
        );
        PipelineContext::new(
            Arc::new(registry),
            DateWindow::parse("2010-01", "2010-12").unwrap(),
            Arc::new(source),
            sink,
        )
    }

    fn source() -> InMemorySource {
        let mut source = InMemorySource::new();
        source.add_csv(
            "long.csv",
            "REF_DATE,GEO,VALUE\n\
             2010-01,ON,100\n\
             2010-01,QC,200\n\
             2010-02,ON,150\n\
             2009-12,ON,1\n\
             bad,ON,5\n",
        );
        source
    }

    fn pivot_plan() -> ReportPlan {
        let mut plan = ReportPlan::new("example");
        let raw = plan.ingest("raw", "long", "long.csv").unwrap();
        let wide = plan
            .chain(
                raw,
                vec![
                    ("dated", StageOp::normalize_date("REF_DATE", DateFormat::YearMonth)),
                    ("windowed", StageOp::window("REF_DATE")),
                    (
                        "pivot",
                        StageOp::Pivot(
                            PivotSpec::new(&["REF_DATE"], "GEO", "VALUE", AggregateFn::Sum)
                                .order_by("REF_DATE"),
                        ),
                    ),
                ],
            )
            .unwrap();
        plan.write(wide, "write", "wide", WriteOptions::default()).unwrap();
        plan
    }

    #[test]
    fn test_execute_pivot_plan() {
        let sink = Arc::new(MemorySink::new());
        let output = pivot_plan().execute(&context(source(), sink.clone())).unwrap();

        let written = sink.get("wide").unwrap();
        assert_eq!(written.column_names(), vec!["REF_DATE", "ON", "QC"]);
        assert_eq!(written.num_rows(), 2);
        assert_eq!(written.value(1, "QC"), None);
        assert_eq!(output.table("pivot").unwrap().as_ref(), &written);

        let diagnostics = output.diagnostics;
        assert_eq!(diagnostics.unparsable_dates, 1);
        assert_eq!(diagnostics.stage("dated").unwrap().dropped, 1);
        assert_eq!(diagnostics.stage("windowed").unwrap().dropped, 1);
        assert_eq!(diagnostics.stage("pivot").unwrap().dropped, 0);
        assert_eq!(diagnostics.outputs, vec!["wide".to_string()]);
        assert_eq!(diagnostics.stages.len(), 5);
    }

    #[test]
    fn test_stage_errors_name_the_stage() {
        let mut plan = ReportPlan::new("broken");
        let raw = plan.ingest("raw", "long", "long.csv").unwrap();
        plan.then(raw, "by_naics", StageOp::filter_equals("NAICS", "Food")).unwrap();

        let err = plan
            .execute(&context(source(), Arc::new(MemorySink::new())))
            .unwrap_err();
        match &err {
            PipelineError::Stage { stage, .. } => assert_eq!(stage, "by_naics"),
            other => panic!("expected stage error, got {:?}", other),
        }
        assert_eq!(
            err.root_cause(),
            &PipelineError::ColumnNotFound("NAICS".to_string())
        );
    }

    #[test]
    fn test_unknown_source_fails_in_ingest() {
        let mut plan = ReportPlan::new("unknown");
        plan.ingest("raw", "gdp", "gdp.csv").unwrap();
        let err = plan
            .execute(&context(source(), Arc::new(MemorySink::new())))
            .unwrap_err();
        assert_eq!(err.root_cause(), &PipelineError::UnknownSource("gdp".to_string()));
    }

    #[test]
    fn test_plan_construction_errors() {
        let mut plan = ReportPlan::new("bad");
        let raw = plan.ingest("raw", "long", "long.csv").unwrap();
        assert!(matches!(plan.ingest("raw", "long", "x"), Err(PipelineError::Plan(_))));
        assert!(matches!(
            plan.then(
                raw,
                "second_ingest",
                StageOp::Ingest {
                    source: "long".into(),
                    location: "x".into()
                }
            ),
            Err(PipelineError::Plan(_))
        ));
        assert!(matches!(
            plan.then(
                raw,
                "half_join",
                StageOp::Join {
                    key: "REF_DATE".into(),
                    policy: DuplicateColumns::Reject
                }
            ),
            Err(PipelineError::Plan(_))
        ));
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_execution_order_is_insertion_stable() {
        let mut plan = ReportPlan::new("order");
        let a = plan.ingest("a", "long", "long.csv").unwrap();
        let b = plan.ingest("b", "long", "long.csv").unwrap();
        let a2 = plan.then(a, "a2", StageOp::sort("GEO")).unwrap();
        let b2 = plan.then(b, "b2", StageOp::sort("GEO")).unwrap();
        let joined = plan
            .join(a2, b2, "joined", "GEO", DuplicateColumns::Suffix("_b".into()))
            .unwrap();

        let order: Vec<&str> = plan
            .execution_order()
            .unwrap()
            .into_iter()
            .map(|id| plan.stage(id).unwrap().name.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "a2", "b2", "joined"]);
        assert_eq!(plan.stage_id("joined"), Some(joined));
    }

    #[test]
    fn test_join_inputs_follow_ports_and_shared_tables() {
        let mut plan = ReportPlan::new("join");
        let raw = plan.ingest("raw", "long", "long.csv").unwrap();
        let dated = plan
            .then(raw, "dated", StageOp::normalize_date("REF_DATE", DateFormat::YearMonth))
            .unwrap();
        let on = plan.then(dated, "on", StageOp::filter_equals("GEO", "ON")).unwrap();
        let qc = plan.then(dated, "qc", StageOp::filter_equals("GEO", "QC")).unwrap();
        let qc = plan.then(qc, "qc_value", StageOp::rename("VALUE", "QC_VALUE")).unwrap();
        let qc = plan.then(qc, "qc_only", StageOp::select(&["REF_DATE", "QC_VALUE"])).unwrap();
        plan.join(on, qc, "joined", "REF_DATE", DuplicateColumns::Reject).unwrap();

        let output = plan
            .execute(&context(source(), Arc::new(MemorySink::new())))
            .unwrap();
        let joined = output.table("joined").unwrap();
        assert_eq!(joined.column_names(), vec!["REF_DATE", "GEO", "VALUE", "QC_VALUE"]);
        assert_eq!(joined.num_rows(), 1);
        assert_eq!(joined.value(0, "QC_VALUE"), Some(&Value::float(200.0)));
        // three ON rows, one QC row; two ON rows found no partner
        assert_eq!(output.diagnostics.stage("joined").unwrap().dropped, 2);
    }
}
