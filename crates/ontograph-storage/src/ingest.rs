//! Transform-and-write.
//!
//! ```text
//!   TypeMapping + StagedData
//!        │  active? same shape?
//!        ▼
//!   transform every live transformation ──▶ nodes, edges, branch failures
//!        │
//!        ▼  validate properties (compiled per metatype / relationship, per call)
//!   ┌──────────────── one transaction ────────────────┐
//!   │ upsert nodes                                    │
//!   │ for each edge: resolve endpoints (one node, or  │
//!   │   every node matching connection parameters),   │
//!   │   then per (origin, destination): check         │
//!   │   cardinality, write                            │
//!   └────────────────────── commit ───────────────────┘
//! ```
//!
//! Record-level problems end up in [`IngestReport::failures`]. Storage and
//! ontology backend failures, cancellation and timeouts abort the call and
//! the transaction is dropped, so nothing is committed.

use crate::cardinality::check_cardinality_excluding;
use crate::config::IngestConfig;
use crate::error::{CardinalityError, Endpoint, IngestError, RecordError, StorageError};
use crate::graph::{GraphStore, GraphTransaction, NodeCondition, NodeFilter};
use ontograph_etl::{display_value, EtlError, StagedData, Transformer, TypeMapping};
use ontograph_schema::{
    CompiledSchema, Edge, EdgeConnectionParameter, GraphRecord, Id, MetatypeRelationshipPair, Node,
    OntologyError, OntologyStore, ParameterKind,
};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// One record that was not written.
#[derive(Debug, Clone, Serialize)]
pub struct RecordFailure {
    pub transformation_id: Option<Id>,
    /// Root-array branch that produced the record.
    pub index: Vec<usize>,
    #[serde(serialize_with = "as_display")]
    pub error: RecordError,
}

fn as_display<S: serde::Serializer>(error: &RecordError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// Outcome of one committed ingest call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub failures: Vec<RecordFailure>,
}

struct Pending<T> {
    transformation_id: Option<Id>,
    index: Vec<usize>,
    record: T,
}

/// Schemas and pairs looked up during one call.
#[derive(Default)]
struct CallCache {
    metatype_schemas: HashMap<Id, Result<CompiledSchema, RecordError>>,
    relationship_schemas: HashMap<Id, Result<CompiledSchema, RecordError>>,
    pairs: HashMap<Id, Result<MetatypeRelationshipPair, RecordError>>,
}

/// Runs type mappings against staged data and writes the result.
pub struct Ingestor<G: GraphStore> {
    graph: G,
    ontology: Arc<dyn OntologyStore>,
    config: IngestConfig,
}

impl<G: GraphStore> Ingestor<G> {
    pub fn new(graph: G, ontology: Arc<dyn OntologyStore>) -> Self {
        Self::with_config(graph, ontology, IngestConfig::default())
    }

    pub fn with_config(graph: G, ontology: Arc<dyn OntologyStore>, config: IngestConfig) -> Self {
        Self {
            graph,
            ontology,
            config,
        }
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest `staged` with `mapping`, honouring the configured timeout.
    pub async fn ingest(&self, mapping: &TypeMapping, staged: &StagedData) -> Result<IngestReport, IngestError> {
        match self.config.timeout_ms {
            Some(after_ms) => tokio::time::timeout(Duration::from_millis(after_ms), self.run(mapping, staged))
                .await
                .map_err(|_| IngestError::TimedOut { after_ms })?,
            None => self.run(mapping, staged).await,
        }
    }

    /// As [`ingest`](Self::ingest), abandoning the call if `cancel` completes first.
    pub async fn ingest_until<F>(
        &self,
        mapping: &TypeMapping,
        staged: &StagedData,
        cancel: F,
    ) -> Result<IngestReport, IngestError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::warn!(mapping = ?mapping.id, "ingest cancelled, transaction discarded");
                Err(IngestError::Cancelled)
            }
            result = self.ingest(mapping, staged) => result,
        }
    }

    async fn run(&self, mapping: &TypeMapping, staged: &StagedData) -> Result<IngestReport, IngestError> {
        if self.config.require_active_mapping && !mapping.active {
            return Err(IngestError::InactiveMapping {
                mapping_id: mapping.id.clone(),
            });
        }
        if self.config.require_shape_match {
            let found = mapping.fingerprint(&staged.data);
            if found != mapping.shape_hash {
                return Err(IngestError::ShapeMismatch {
                    expected: mapping.shape_hash.clone(),
                    found,
                });
            }
        }

        let mut report = IngestReport::default();
        let mut nodes: Vec<Pending<Node>> = Vec::new();
        let mut edges: Vec<Pending<Edge>> = Vec::new();

        let transformer = Transformer::new(self.ontology.as_ref());
        for transformation in mapping.live_transformations() {
            let output = match transformer.transform(transformation, staged).await {
                Ok(output) => output,
                Err(EtlError::Ontology(err)) if !err.is_not_found() => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(
                        transformation = ?transformation.id,
                        error = %err,
                        "transformation skipped"
                    );
                    report.failures.push(RecordFailure {
                        transformation_id: transformation.id.clone(),
                        index: Vec::new(),
                        error: err.into(),
                    });
                    continue;
                }
            };

            for failure in output.errors {
                report.failures.push(RecordFailure {
                    transformation_id: transformation.id.clone(),
                    index: failure.index,
                    error: failure.error.into(),
                });
            }
            for produced in output.records {
                let transformation_id = transformation.id.clone();
                match produced.record {
                    GraphRecord::Node(record) => nodes.push(Pending {
                        transformation_id,
                        index: produced.index,
                        record,
                    }),
                    GraphRecord::Edge(record) => edges.push(Pending {
                        transformation_id,
                        index: produced.index,
                        record,
                    }),
                }
            }
        }

        let mut cache = CallCache::default();

        let mut valid_nodes = Vec::with_capacity(nodes.len());
        for mut pending in nodes {
            match self.validate_node(&mut cache, &mut pending.record).await? {
                Ok(()) => valid_nodes.push(pending.record),
                Err(error) => self.fail(&mut report, pending.transformation_id, pending.index, error),
            }
        }

        let mut tx = self.graph.begin().await?;
        report.nodes = tx.create_or_update_nodes(valid_nodes).await?;

        for pending in edges {
            let Pending {
                transformation_id,
                index,
                record,
            } = pending;
            for outcome in self.write_edge(&mut cache, &mut tx, record).await? {
                match outcome {
                    Ok(edge) => report.edges.push(edge),
                    Err(error) => self.fail(&mut report, transformation_id.clone(), index.clone(), error),
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            mapping = ?mapping.id,
            staged = ?staged.id,
            nodes = report.nodes.len(),
            edges = report.edges.len(),
            failures = report.failures.len(),
            "ingest committed"
        );
        Ok(report)
    }

    fn fail(&self, report: &mut IngestReport, transformation_id: Option<Id>, index: Vec<usize>, error: RecordError) {
        tracing::warn!(
            transformation = ?transformation_id,
            index = ?index,
            error = %error,
            "record rejected"
        );
        report.failures.push(RecordFailure {
            transformation_id,
            index,
            error,
        });
    }

    /// Outer error: fatal. Inner error: this record only.
    async fn validate_node(
        &self,
        cache: &mut CallCache,
        node: &mut Node,
    ) -> Result<Result<(), RecordError>, IngestError> {
        if !self.config.validate_properties {
            return Ok(Ok(()));
        }

        if !cache.metatype_schemas.contains_key(&node.metatype_id) {
            let compiled = match self
                .ontology
                .metatype_keys(&node.container_id, &node.metatype_id)
                .await
            {
                Ok(keys) => CompiledSchema::compile(&keys).map_err(RecordError::from),
                Err(err) if err.is_not_found() => Err(err.into()),
                Err(err) => return Err(err.into()),
            };
            cache
                .metatype_schemas
                .insert(node.metatype_id.clone(), compiled);
        }

        let Some(schema) = cache.metatype_schemas.get(&node.metatype_id) else {
            return Ok(Err(OntologyError::not_found("metatype", node.metatype_id.clone()).into()));
        };
        let schema = match schema {
            Ok(schema) => schema,
            Err(err) => return Ok(Err(err.clone())),
        };

        Ok(schema
            .apply(&serde_json::Value::Object(std::mem::take(&mut node.properties)))
            .map(|properties| node.properties = properties)
            .map_err(RecordError::from))
    }

    async fn pair(
        &self,
        cache: &mut CallCache,
        container_id: &str,
        pair_id: &str,
    ) -> Result<Result<MetatypeRelationshipPair, RecordError>, IngestError> {
        if let Some(cached) = cache.pairs.get(pair_id) {
            return Ok(cached.clone());
        }
        let fetched = match self.ontology.relationship_pair(container_id, pair_id).await {
            Ok(pair) => Ok(pair),
            Err(err) if err.is_not_found() => Err(RecordError::from(err)),
            Err(err) => return Err(err.into()),
        };
        cache.pairs.insert(pair_id.to_string(), fetched.clone());
        Ok(fetched)
    }

    async fn validate_edge(
        &self,
        cache: &mut CallCache,
        pair: &MetatypeRelationshipPair,
        edge: &mut Edge,
    ) -> Result<Result<(), RecordError>, IngestError> {
        if !self.config.validate_properties {
            return Ok(Ok(()));
        }

        if !cache.relationship_schemas.contains_key(&pair.relationship_id) {
            let compiled = match self
                .ontology
                .relationship_keys(&edge.container_id, &pair.relationship_id)
                .await
            {
                Ok(keys) => CompiledSchema::compile(&keys).map_err(RecordError::from),
                Err(err) if err.is_not_found() => Err(err.into()),
                Err(err) => return Err(err.into()),
            };
            cache
                .relationship_schemas
                .insert(pair.relationship_id.clone(), compiled);
        }

        let schema = match cache.relationship_schemas.get(&pair.relationship_id) {
            Some(Ok(schema)) => schema,
            Some(Err(err)) => return Ok(Err(err.clone())),
            None => return Ok(Ok(())),
        };

        Ok(schema
            .apply(&serde_json::Value::Object(std::mem::take(&mut edge.properties)))
            .map(|properties| edge.properties = properties)
            .map_err(RecordError::from))
    }

    /// Outer error: fatal. One inner result per (origin, destination) pair
    /// the edge was written for; a single error when it reached no pair.
    async fn write_edge(
        &self,
        cache: &mut CallCache,
        tx: &mut G::Tx,
        mut edge: Edge,
    ) -> Result<Vec<Result<Edge, RecordError>>, IngestError> {
        let pair = match self.pair(cache, &edge.container_id, &edge.relationship_pair_id).await? {
            Ok(pair) => pair,
            Err(err) => return Ok(vec![Err(err)]),
        };
        if let Err(err) = self.validate_edge(cache, &pair, &mut edge).await? {
            return Ok(vec![Err(err)]);
        }

        let (origins, origin_fanned) = match self.endpoint_nodes(&*tx, &edge, &pair, Endpoint::Origin).await? {
            Ok(found) => found,
            Err(err) => return Ok(vec![Err(err)]),
        };
        let (destinations, destination_fanned) =
            match self.endpoint_nodes(&*tx, &edge, &pair, Endpoint::Destination).await? {
                Ok(found) => found,
                Err(err) => return Ok(vec![Err(err)]),
            };
        let fanned = origin_fanned || destination_fanned;

        let mut outcomes = Vec::with_capacity(origins.len() * destinations.len());
        for origin in &origins {
            for destination in &destinations {
                let mut copy = edge.clone();
                if fanned {
                    copy.origin_parameters.clear();
                    copy.destination_parameters.clear();
                    // one identity per connected pair
                    copy.composite_original_id = copy.composite_original_id.map(|composite| {
                        format!(
                            "{composite}+{}+{}",
                            origin.id.as_deref().unwrap_or_default(),
                            destination.id.as_deref().unwrap_or_default()
                        )
                    });
                }
                outcomes.push(self.connect(tx, &pair, copy, origin, destination).await?);
            }
        }
        Ok(outcomes)
    }

    /// Check and write one edge between two resolved nodes.
    async fn connect(
        &self,
        tx: &mut G::Tx,
        pair: &MetatypeRelationshipPair,
        mut edge: Edge,
        origin: &Node,
        destination: &Node,
    ) -> Result<Result<Edge, RecordError>, IngestError> {
        edge.origin_node_id = origin.id.clone();
        edge.destination_node_id = destination.id.clone();
        edge.origin_metatype_id = Some(origin.metatype_id.clone());
        edge.destination_metatype_id = Some(destination.metatype_id.clone());

        let mut replacing = None;
        if let (Some(composite), Some(ds)) = (&edge.composite_original_id, &edge.data_source_id) {
            replacing = tx
                .find_edge_by_composite_id(composite, ds)
                .await?
                .and_then(|existing| existing.id);
        }
        let replacing = replacing.or_else(|| edge.id.clone());

        match check_cardinality_excluding(pair, origin, destination, &*tx, replacing.as_deref()).await {
            Ok(()) => {}
            Err(CardinalityError::Lookup(err)) => return Err(err.into()),
            Err(err) => return Ok(Err(err.into())),
        }

        match tx.create_or_update_edges(vec![edge]).await {
            Ok(mut saved) => Ok(saved.pop().ok_or_else(|| {
                RecordError::Storage(StorageError::Backend("edge write returned nothing".into()))
            })),
            Err(err @ StorageError::UniqueViolation(_)) => Ok(Err(err.into())),
            Err(err) => Err(err.into()),
        }
    }

    /// Nodes an endpoint refers to, and whether they came from connection
    /// parameters. Parameters are used only when the endpoint carries no
    /// node id, composite id or original id.
    async fn endpoint_nodes(
        &self,
        tx: &G::Tx,
        edge: &Edge,
        pair: &MetatypeRelationshipPair,
        endpoint: Endpoint,
    ) -> Result<Result<(Vec<Node>, bool), RecordError>, IngestError> {
        let (parameters, direct) = match endpoint {
            Endpoint::Origin => (
                &edge.origin_parameters,
                edge.origin_node_id.is_some()
                    || edge.origin_node_composite_original_id.is_some()
                    || edge.origin_node_original_id.is_some(),
            ),
            Endpoint::Destination => (
                &edge.destination_parameters,
                edge.destination_node_id.is_some()
                    || edge.destination_node_composite_original_id.is_some()
                    || edge.destination_node_original_id.is_some(),
            ),
        };

        if direct || parameters.is_empty() {
            return Ok(resolve_endpoint(tx, edge, pair, endpoint)
                .await?
                .map(|node| (vec![node], false)));
        }

        let nodes = match self.parameter_filter(&edge.container_id, parameters).await? {
            Some(filter) => tx.find_nodes(&filter).await?,
            None => Vec::new(),
        };
        if nodes.is_empty() {
            return Ok(Err(RecordError::NoMatchingNodes { endpoint }));
        }
        Ok(Ok((nodes, true)))
    }

    /// `None` when some parameter can match nothing: an empty value, a
    /// property parameter without a property name, or an unknown metatype
    /// name.
    async fn parameter_filter(
        &self,
        container_id: &str,
        parameters: &[EdgeConnectionParameter],
    ) -> Result<Option<NodeFilter>, IngestError> {
        let mut filter = NodeFilter::new(container_id);
        for parameter in parameters {
            let Some(value) = parameter.value.as_ref().filter(|v| !v.is_null()) else {
                return Ok(None);
            };
            let condition = match parameter.kind {
                ParameterKind::Id => NodeCondition::Id(display_value(value)),
                ParameterKind::DataSource => NodeCondition::DataSource(display_value(value)),
                ParameterKind::MetatypeId => NodeCondition::Metatype(display_value(value)),
                ParameterKind::OriginalId => NodeCondition::OriginalId(display_value(value)),
                ParameterKind::Property => match &parameter.property {
                    Some(name) => NodeCondition::Property {
                        name: name.clone(),
                        value: value.clone(),
                    },
                    None => return Ok(None),
                },
                ParameterKind::MetatypeName => {
                    match self
                        .ontology
                        .metatype_by_name(container_id, &display_value(value))
                        .await
                    {
                        Ok(metatype) => NodeCondition::Metatype(metatype.id.unwrap_or_default()),
                        Err(err) if err.is_not_found() => return Ok(None),
                        Err(err) => return Err(err.into()),
                    }
                }
            };
            filter = filter.and(condition);
        }
        Ok(Some(filter))
    }
}

/// Find the node an edge endpoint refers to: by node id, then by
/// (composite original id, data source), then by (original id, data source,
/// metatype).
async fn resolve_endpoint<T: GraphTransaction>(
    tx: &T,
    edge: &Edge,
    pair: &MetatypeRelationshipPair,
    endpoint: Endpoint,
) -> Result<Result<Node, RecordError>, IngestError> {
    let (node_id, composite, original, data_source, metatype) = match endpoint {
        Endpoint::Origin => (
            &edge.origin_node_id,
            &edge.origin_node_composite_original_id,
            &edge.origin_node_original_id,
            edge.origin_data_source_id.as_ref().or(edge.data_source_id.as_ref()),
            edge.origin_metatype_id
                .as_deref()
                .unwrap_or(&pair.origin_metatype_id),
        ),
        Endpoint::Destination => (
            &edge.destination_node_id,
            &edge.destination_node_composite_original_id,
            &edge.destination_node_original_id,
            edge.destination_data_source_id
                .as_ref()
                .or(edge.data_source_id.as_ref()),
            edge.destination_metatype_id
                .as_deref()
                .unwrap_or(&pair.destination_metatype_id),
        ),
    };

    if let Some(id) = node_id {
        if let Some(node) = tx.find_node(id).await? {
            return Ok(Ok(node));
        }
    }
    if let (Some(composite), Some(ds)) = (composite, data_source) {
        if let Some(node) = tx.find_node_by_composite_id(composite, ds).await? {
            return Ok(Ok(node));
        }
    }
    if let (Some(original), Some(ds)) = (original, data_source) {
        if let Some(node) = tx.find_node_by_original_id(original, ds, metatype).await? {
            return Ok(Ok(node));
        }
    }

    let reference = node_id
        .as_ref()
        .or(composite.as_ref())
        .or(original.as_ref())
        .cloned()
        .unwrap_or_else(|| "<none>".to_string());
    Ok(Err(RecordError::UnresolvedEndpoint { endpoint, reference }))
}
