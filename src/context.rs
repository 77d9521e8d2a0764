use crate::schema::SchemaRegistry;
use crate::sink::ReportWriter;
use crate::source::TableSource;
use crate::window::DateWindow;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a report run needs, passed explicitly to plan execution.
///
/// Cloning is cheap; the registry and collaborators are shared.
#[derive(Clone)]
pub struct PipelineContext {
    run_id: Uuid,
    registry: Arc<SchemaRegistry>,
    window: DateWindow,
    source: Arc<dyn TableSource>,
    sink: Arc<dyn ReportWriter>,
}

impl PipelineContext {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        window: DateWindow,
        source: Arc<dyn TableSource>,
        sink: Arc<dyn ReportWriter>,
    ) -> Self {
        PipelineContext {
            run_id: Uuid::new_v4(),
            registry,
            window,
            source,
            sink,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn window(&self) -> &DateWindow {
        &self.window
    }

    pub fn source(&self) -> &dyn TableSource {
        self.source.as_ref()
    }

    pub fn sink(&self) -> &dyn ReportWriter {
        self.sink.as_ref()
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("run_id", &self.run_id)
            .field("registry", &self.registry.names())
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
