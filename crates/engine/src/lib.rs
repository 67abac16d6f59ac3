//! `engine` crate — scenario graph, execution state machine, event history,
//! metrics and monitoring, all written against [`db::Store`].
//!
//! The engine never runs connectors itself. An external executor walks the
//! graph and reports what happens through [`ExecutionCoordinator`]; clients
//! watch through [`MonitoringFacade`].

pub mod config;
pub mod coordinator;
pub mod dag;
pub mod error;
pub mod events;
pub mod graph;
pub mod metrics;
pub mod models;
pub mod monitoring;
pub mod payload;

use std::sync::Arc;

use db::Store;

pub use config::EngineConfig;
pub use coordinator::ExecutionCoordinator;
pub use dag::{GraphDocument, validate_graph};
pub use error::EngineError;
pub use events::EventLog;
pub use graph::{GraphStore, is_client_temporary_id};
pub use metrics::{ExecutionMetrics, MetricsAggregator, derive_metrics};
pub use models::{
    Connection, EventLevel, Execution, ExecutionEvent, ExecutionStatus, NewConnection, NewNode,
    Node, NodeUpdate, Scenario,
};
pub use monitoring::MonitoringFacade;

/// Every engine component wired to one store.
#[derive(Clone)]
pub struct Engine {
    pub graph: GraphStore,
    pub events: EventLog,
    pub coordinator: ExecutionCoordinator,
    pub metrics: MetricsAggregator,
    pub monitoring: MonitoringFacade,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        let graph = GraphStore::new(store.clone());
        let events = EventLog::new(store.clone(), config.clone());
        Self {
            coordinator: ExecutionCoordinator::new(store.clone(), events.clone()),
            metrics: MetricsAggregator::new(store.clone(), events.clone()),
            monitoring: MonitoringFacade::new(store, graph.clone(), events.clone(), config),
            graph,
            events,
        }
    }
}
