//! `GraphStore` — scenario, node and connection persistence with the graph
//! integrity rules applied before every write.
//!
//! Every mutation re-fetches the entity it touches and fails with
//! [`EngineError::NotFound`] before writing anything if it is gone.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use db::{
    Store,
    models::{ConnectionRow, NodeRow, ScenarioRow},
};

use crate::{
    EngineError,
    dag::{GraphDocument, validate_graph},
    models::{Connection, NewConnection, NewNode, Node, NodeUpdate, Scenario},
};

/// Prefix the scenario editor gives nodes it has not persisted yet.
pub const CLIENT_TEMPORARY_ID_PREFIX: &str = "temp_";

/// True for identifiers minted client-side for not-yet-persisted nodes.
pub fn is_client_temporary_id(id: &str) -> bool {
    id.starts_with(CLIENT_TEMPORARY_ID_PREFIX)
}

#[derive(Clone)]
pub struct GraphStore {
    store: Arc<dyn Store>,
}

impl GraphStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn create_scenario(&self, name: &str, owner: &str) -> Result<Scenario, EngineError> {
        let row = ScenarioRow {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            owner: owner.to_owned(),
            created_at: Utc::now(),
        };
        self.store.insert_scenario(&row).await?;
        info!(scenario_id = %row.id, "scenario created");
        Ok(row.into())
    }

    pub async fn get_scenario(&self, scenario_id: Uuid) -> Result<Scenario, EngineError> {
        self.store
            .get_scenario(scenario_id)
            .await?
            .map(Scenario::from)
            .ok_or_else(|| EngineError::not_found("scenario", scenario_id))
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    #[instrument(skip(self, node), fields(node_type = %node.node_type))]
    pub async fn create_node(&self, scenario_id: Uuid, node: NewNode) -> Result<Node, EngineError> {
        self.get_scenario(scenario_id).await?;

        let now = Utc::now();
        let row = NodeRow {
            id: Uuid::new_v4(),
            scenario_id,
            node_type: node.node_type,
            label: node.label,
            config: node.config,
            position: node.position,
            sort_order: node.order,
            output_schema: None,
            sample_data: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_node(&row).await?;

        info!(node_id = %row.id, "node created");
        Ok(row.into())
    }

    pub async fn get_node(&self, node_id: Uuid) -> Result<Node, EngineError> {
        self.fetch_node_row(node_id).await.map(Node::from)
    }

    pub async fn list_nodes(&self, scenario_id: Uuid) -> Result<Vec<Node>, EngineError> {
        let rows = self.store.list_nodes_by_scenario(scenario_id).await?;
        Ok(rows.into_iter().map(Node::from).collect())
    }

    #[instrument(skip(self, update))]
    pub async fn update_node(
        &self,
        node_id: Uuid,
        update: NodeUpdate,
    ) -> Result<Node, EngineError> {
        let mut row = self.fetch_node_row(node_id).await?;

        if let Some(node_type) = update.node_type {
            row.node_type = node_type;
        }
        if let Some(label) = update.label {
            row.label = label;
        }
        if let Some(config) = update.config {
            row.config = config;
        }
        if let Some(position) = update.position {
            row.position = position;
        }
        if let Some(order) = update.order {
            row.sort_order = order;
        }
        row.updated_at = Utc::now();

        self.store.update_node(&row).await?;
        debug!("node updated");
        Ok(row.into())
    }

    /// Delete a node together with every connection touching it.
    ///
    /// Connections are collected from both the by-source and by-target
    /// indexes and removed before the node. Without transactional storage an
    /// interruption between the phases leaves the node with fewer connections,
    /// never a connection that points at a deleted node.
    #[instrument(skip(self))]
    pub async fn delete_node(&self, node_id: Uuid) -> Result<(), EngineError> {
        self.fetch_node_row(node_id).await?;

        let outgoing = self.store.list_connections_by_source(node_id).await?;
        let incoming = self.store.list_connections_by_target(node_id).await?;

        // A self-loop shows up in both lists.
        let mut seen = HashSet::new();
        let connection_ids: Vec<Uuid> = outgoing
            .iter()
            .chain(incoming.iter())
            .map(|c| c.id)
            .filter(|id| seen.insert(*id))
            .collect();

        self.store
            .delete_node_with_connections(node_id, &connection_ids)
            .await?;

        info!(removed_connections = connection_ids.len(), "node deleted");
        Ok(())
    }

    /// Attach an output schema (and optionally sample data) to a node.
    ///
    /// Temporary client-side ids are accepted and ignored: the node they
    /// stand for does not exist yet and will be created with its schema.
    /// The id is returned unchanged in both cases.
    #[instrument(skip(self, output_schema, sample_data))]
    pub async fn update_schema(
        &self,
        node_ref: &str,
        output_schema: Value,
        sample_data: Option<Value>,
    ) -> Result<String, EngineError> {
        if is_client_temporary_id(node_ref) {
            warn!("schema update for temporary client id ignored");
            return Ok(node_ref.to_owned());
        }

        let node_id =
            Uuid::parse_str(node_ref).map_err(|_| EngineError::not_found("node", node_ref))?;
        let mut row = self.fetch_node_row(node_id).await?;

        row.output_schema = Some(output_schema);
        if sample_data.is_some() {
            row.sample_data = sample_data;
        }
        row.updated_at = Utc::now();
        self.store.update_node(&row).await?;

        debug!("node schema updated");
        Ok(node_ref.to_owned())
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    #[instrument(
        skip(self, connection),
        fields(
            scenario_id = %connection.scenario_id,
            source = %connection.source_node_id,
            target = %connection.target_node_id,
        )
    )]
    pub async fn create_connection(
        &self,
        connection: NewConnection,
    ) -> Result<Connection, EngineError> {
        let scenario_id = connection.scenario_id;
        self.get_scenario(scenario_id).await?;

        for node_id in [connection.source_node_id, connection.target_node_id] {
            let node = self.fetch_node_row(node_id).await?;
            if node.scenario_id != scenario_id {
                return Err(EngineError::not_found(
                    "node",
                    format!("{node_id} in scenario {scenario_id}"),
                ));
            }
        }

        let existing = self
            .store
            .find_connection_by_endpoints(
                scenario_id,
                connection.source_node_id,
                connection.target_node_id,
            )
            .await?;
        if existing.is_some() {
            return Err(EngineError::Conflict {
                source_node_id: connection.source_node_id,
                target_node_id: connection.target_node_id,
            });
        }

        let now = Utc::now();
        let row = ConnectionRow {
            id: Uuid::new_v4(),
            scenario_id,
            source_node_id: connection.source_node_id,
            target_node_id: connection.target_node_id,
            mapping: connection.mapping,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_connection(&row).await?;

        info!(connection_id = %row.id, "connection created");
        Ok(row.into())
    }

    pub async fn get_connection(&self, connection_id: Uuid) -> Result<Connection, EngineError> {
        self.fetch_connection_row(connection_id)
            .await
            .map(Connection::from)
    }

    pub async fn list_connections(
        &self,
        scenario_id: Uuid,
    ) -> Result<Vec<Connection>, EngineError> {
        let rows = self.store.list_connections_by_scenario(scenario_id).await?;
        Ok(rows.into_iter().map(Connection::from).collect())
    }

    /// Replace the field mapping of a connection. Endpoints are fixed.
    #[instrument(skip(self, mapping))]
    pub async fn update_connection(
        &self,
        connection_id: Uuid,
        mapping: Option<Value>,
    ) -> Result<Connection, EngineError> {
        let mut row = self.fetch_connection_row(connection_id).await?;
        row.mapping = mapping;
        row.updated_at = Utc::now();
        self.store.update_connection(&row).await?;
        debug!("connection updated");
        Ok(row.into())
    }

    #[instrument(skip(self))]
    pub async fn delete_connection(&self, connection_id: Uuid) -> Result<(), EngineError> {
        self.fetch_connection_row(connection_id).await?;
        self.store.delete_connection(connection_id).await?;
        info!("connection deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    /// Check the stored graph for cycles and return a topological node order.
    /// Nothing is modified; a cyclic scenario stays editable.
    pub async fn validate_scenario(&self, scenario_id: Uuid) -> Result<Vec<Uuid>, EngineError> {
        self.get_scenario(scenario_id).await?;
        let nodes = self.list_nodes(scenario_id).await?;
        let connections = self.list_connections(scenario_id).await?;
        validate_graph(&GraphDocument::from_parts(&nodes, &connections))
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn fetch_node_row(&self, node_id: Uuid) -> Result<NodeRow, EngineError> {
        self.store
            .get_node(node_id)
            .await?
            .ok_or_else(|| EngineError::not_found("node", node_id))
    }

    async fn fetch_connection_row(
        &self,
        connection_id: Uuid,
    ) -> Result<ConnectionRow, EngineError> {
        self.store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| EngineError::not_found("connection", connection_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::MemoryStore;
    use serde_json::json;

    async fn setup() -> (GraphStore, Scenario) {
        let (graph, scenario, _) = setup_with_store().await;
        (graph, scenario)
    }

    async fn setup_with_store() -> (GraphStore, Scenario, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let graph = GraphStore::new(store.clone());
        let scenario = graph.create_scenario("orders sync", "ops@example.com").await.unwrap();
        (graph, scenario, store)
    }

    fn new_node(label: &str, order: i32) -> NewNode {
        NewNode {
            node_type: "http_request".into(),
            label: label.into(),
            config: json!({ "operation": "get" }),
            position: json!({ "x": order * 100, "y": 0 }),
            order,
        }
    }

    fn link(scenario: &Scenario, a: &Node, b: &Node) -> NewConnection {
        NewConnection {
            scenario_id: scenario.id,
            source_node_id: a.id,
            target_node_id: b.id,
            mapping: None,
        }
    }

    #[tokio::test]
    async fn create_node_requires_existing_scenario() {
        let (graph, _) = setup().await;
        let result = graph.create_node(Uuid::new_v4(), new_node("a", 0)).await;
        assert!(matches!(result, Err(EngineError::NotFound { entity: "scenario", .. })));
    }

    #[tokio::test]
    async fn update_node_applies_only_supplied_fields() {
        let (graph, scenario) = setup().await;
        let node = graph.create_node(scenario.id, new_node("fetch", 0)).await.unwrap();

        let updated = graph
            .update_node(
                node.id,
                NodeUpdate {
                    label: Some("fetch orders".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.label, "fetch orders");
        assert_eq!(updated.node_type, "http_request");
        assert_eq!(updated.config, json!({ "operation": "get" }));
        assert!(updated.updated_at >= node.updated_at);
    }

    #[tokio::test]
    async fn update_node_on_missing_id_is_not_found() {
        let (graph, _) = setup().await;
        let result = graph.update_node(Uuid::new_v4(), NodeUpdate::default()).await;
        assert!(matches!(result, Err(EngineError::NotFound { entity: "node", .. })));
    }

    #[tokio::test]
    async fn deleting_a_node_removes_all_its_connections() {
        let (graph, scenario, store) = setup_with_store().await;
        let a = graph.create_node(scenario.id, new_node("a", 0)).await.unwrap();
        let b = graph.create_node(scenario.id, new_node("b", 1)).await.unwrap();
        let c = graph.create_node(scenario.id, new_node("c", 2)).await.unwrap();

        graph.create_connection(link(&scenario, &a, &b)).await.unwrap();
        graph.create_connection(link(&scenario, &b, &c)).await.unwrap();
        let unrelated = graph.create_connection(link(&scenario, &a, &c)).await.unwrap();

        graph.delete_node(b.id).await.unwrap();

        let remaining = graph.list_connections(scenario.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, unrelated.id);
        assert!(remaining
            .iter()
            .all(|c| c.source_node_id != b.id && c.target_node_id != b.id));
        assert!(store.list_connections_by_source(b.id).await.unwrap().is_empty());
        assert!(store.list_connections_by_target(b.id).await.unwrap().is_empty());
        assert!(matches!(
            graph.get_node(b.id).await,
            Err(EngineError::NotFound { entity: "node", .. })
        ));
    }

    #[tokio::test]
    async fn deleting_a_node_with_a_self_loop() {
        let (graph, scenario) = setup().await;
        let a = graph.create_node(scenario.id, new_node("a", 0)).await.unwrap();
        graph.create_connection(link(&scenario, &a, &a)).await.unwrap();

        graph.delete_node(a.id).await.unwrap();
        assert!(graph.list_connections(scenario.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_missing_node_is_not_found() {
        let (graph, _) = setup().await;
        assert!(matches!(
            graph.delete_node(Uuid::new_v4()).await,
            Err(EngineError::NotFound { entity: "node", .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_connection_is_a_conflict() {
        let (graph, scenario) = setup().await;
        let a = graph.create_node(scenario.id, new_node("a", 0)).await.unwrap();
        let b = graph.create_node(scenario.id, new_node("b", 1)).await.unwrap();

        graph.create_connection(link(&scenario, &a, &b)).await.unwrap();
        let second = graph.create_connection(link(&scenario, &a, &b)).await;
        assert!(matches!(second, Err(EngineError::Conflict { .. })));

        // The reverse direction is a different ordered pair.
        graph.create_connection(link(&scenario, &b, &a)).await.unwrap();
        assert_eq!(graph.list_connections(scenario.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn connection_across_scenarios_is_rejected() {
        let (graph, scenario) = setup().await;
        let other = graph.create_scenario("other", "ops@example.com").await.unwrap();
        let a = graph.create_node(scenario.id, new_node("a", 0)).await.unwrap();
        let foreign = graph.create_node(other.id, new_node("x", 0)).await.unwrap();

        let result = graph.create_connection(link(&scenario, &a, &foreign)).await;
        assert!(matches!(result, Err(EngineError::NotFound { entity: "node", .. })));
        assert!(graph.list_connections(scenario.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn connection_in_missing_scenario_is_not_found() {
        let (graph, scenario) = setup().await;
        let a = graph.create_node(scenario.id, new_node("a", 0)).await.unwrap();
        let b = graph.create_node(scenario.id, new_node("b", 1)).await.unwrap();
        let result = graph
            .create_connection(NewConnection {
                scenario_id: Uuid::new_v4(),
                source_node_id: a.id,
                target_node_id: b.id,
                mapping: None,
            })
            .await;
        assert!(matches!(result, Err(EngineError::NotFound { entity: "scenario", .. })));
    }

    #[tokio::test]
    async fn deleting_a_missing_connection_is_not_found() {
        let (graph, _) = setup().await;
        assert!(matches!(
            graph.delete_connection(Uuid::new_v4()).await,
            Err(EngineError::NotFound { entity: "connection", .. })
        ));
    }

    #[tokio::test]
    async fn connection_to_missing_node_is_not_found() {
        let (graph, scenario) = setup().await;
        let a = graph.create_node(scenario.id, new_node("a", 0)).await.unwrap();
        let result = graph
            .create_connection(NewConnection {
                scenario_id: scenario.id,
                source_node_id: a.id,
                target_node_id: Uuid::new_v4(),
                mapping: None,
            })
            .await;
        assert!(matches!(result, Err(EngineError::NotFound { entity: "node", .. })));
    }

    #[tokio::test]
    async fn update_connection_replaces_mapping() {
        let (graph, scenario) = setup().await;
        let a = graph.create_node(scenario.id, new_node("a", 0)).await.unwrap();
        let b = graph.create_node(scenario.id, new_node("b", 1)).await.unwrap();
        let conn = graph.create_connection(link(&scenario, &a, &b)).await.unwrap();

        let mapping = json!({ "email": "{{a.customer.email}}" });
        let updated = graph.update_connection(conn.id, Some(mapping.clone())).await.unwrap();
        assert_eq!(updated.mapping, Some(mapping));
        assert_eq!(updated.source_node_id, a.id);

        graph.delete_connection(conn.id).await.unwrap();
        assert!(matches!(
            graph.update_connection(conn.id, None).await,
            Err(EngineError::NotFound { entity: "connection", .. })
        ));
    }

    #[tokio::test]
    async fn schema_update_on_temporary_id_is_a_no_op() {
        let (graph, scenario) = setup().await;
        let node = graph.create_node(scenario.id, new_node("a", 0)).await.unwrap();

        let returned = graph
            .update_schema("temp_1718000000", json!({ "type": "object" }), None)
            .await
            .unwrap();
        assert_eq!(returned, "temp_1718000000");

        let untouched = graph.get_node(node.id).await.unwrap();
        assert!(untouched.output_schema.is_none());
    }

    #[tokio::test]
    async fn schema_update_on_durable_id() {
        let (graph, scenario) = setup().await;
        let node = graph.create_node(scenario.id, new_node("a", 0)).await.unwrap();
        let schema = json!({ "type": "object", "properties": { "id": { "type": "string" } } });

        let returned = graph
            .update_schema(&node.id.to_string(), schema.clone(), Some(json!({ "id": "42" })))
            .await
            .unwrap();
        assert_eq!(returned, node.id.to_string());

        let stored = graph.get_node(node.id).await.unwrap();
        assert_eq!(stored.output_schema, Some(schema));
        assert_eq!(stored.sample_data, Some(json!({ "id": "42" })));
    }

    #[tokio::test]
    async fn schema_update_on_unknown_id_is_not_found() {
        let (graph, _) = setup().await;
        for node_ref in [Uuid::new_v4().to_string(), "not-a-node".to_string()] {
            assert!(matches!(
                graph.update_schema(&node_ref, json!({}), None).await,
                Err(EngineError::NotFound { entity: "node", .. })
            ));
        }
    }

    #[test]
    fn temporary_id_predicate() {
        assert!(is_client_temporary_id("temp_abc"));
        assert!(!is_client_temporary_id(&Uuid::new_v4().to_string()));
        assert!(!is_client_temporary_id("template_node"));
    }

    #[tokio::test]
    async fn validate_scenario_reports_cycles_without_rejecting_edits() {
        let (graph, scenario) = setup().await;
        let a = graph.create_node(scenario.id, new_node("a", 0)).await.unwrap();
        let b = graph.create_node(scenario.id, new_node("b", 1)).await.unwrap();

        graph.create_connection(link(&scenario, &a, &b)).await.unwrap();
        assert_eq!(graph.validate_scenario(scenario.id).await.unwrap(), vec![a.id, b.id]);

        graph.create_connection(link(&scenario, &b, &a)).await.unwrap();
        assert!(matches!(
            graph.validate_scenario(scenario.id).await,
            Err(EngineError::CycleDetected)
        ));
    }
}
