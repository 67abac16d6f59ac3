//! Engine configuration.

/// Tuning knobs shared by the engine components.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default row limit for `EventLog::list`.
    pub event_list_limit: usize,
    /// Default row limit for `EventLog::list_for_node`.
    pub node_event_list_limit: usize,
    /// Default row limit for `MonitoringFacade::list_executions`.
    pub execution_list_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_list_limit: 100,
            node_event_list_limit: 50,
            execution_list_limit: 10,
        }
    }
}
