//! The transformation engine.
//!
//! ```text
//!   root_array levels ──expand──▶ index vectors ──conditions──▶ accepted branches
//!                                                                    │
//!   key definitions (fetched once per call) ─────────────────▶ generate record
//! ```
//!
//! Expansion is a pure recursion over an immutable index slice. A level that
//! does not resolve to an array fails only the branch that reached it.
//! Record generation is synchronous; the only suspension point is the key
//! lookup that runs before any branch is materialised.

use crate::condition::any_condition_holds;
use crate::convert::convert_value;
use crate::error::EtlError;
use crate::mapping::{ErrorAction, KeyDestination, StagedData, Target, TypeTransformation};
use crate::path::{display_value, resolve};
use ontograph_schema::{
    Edge, EdgeConnectionParameter, GraphRecord, Node, OntologyError, OntologyStore, PropertyKey,
    RecordMetadata,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A record and the branch that produced it.
#[derive(Debug, Clone)]
pub struct BranchRecord {
    pub index: Vec<usize>,
    pub record: GraphRecord,
}

/// A branch that produced no record, and why.
#[derive(Debug, Clone)]
pub struct BranchError {
    pub index: Vec<usize>,
    pub error: EtlError,
}

/// Everything one transformation produced from one payload.
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub records: Vec<BranchRecord>,
    pub errors: Vec<BranchError>,
}

impl TransformOutput {
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.records.iter().filter_map(|r| r.record.as_node())
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.records.iter().filter_map(|r| r.record.as_edge())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.errors.is_empty()
    }
}

type KeyCache = HashMap<String, Option<PropertyKey>>;

/// Applies transformations against an ontology store.
pub struct Transformer<'a> {
    ontology: &'a dyn OntologyStore,
}

impl<'a> Transformer<'a> {
    pub fn new(ontology: &'a dyn OntologyStore) -> Self {
        Self { ontology }
    }

    /// Run `transformation` over `staged`.
    ///
    /// Errors returned here concern the transformation as a whole (malformed
    /// target, ontology backend failure). Branch-level failures are collected
    /// in [`TransformOutput::errors`].
    pub async fn transform(
        &self,
        transformation: &TypeTransformation,
        staged: &StagedData,
    ) -> Result<TransformOutput, EtlError> {
        let target = transformation.target()?;
        for mapping in &transformation.keys {
            mapping.destination()?;
        }

        let levels = transformation.root_array_levels();
        let mut output = TransformOutput::default();
        let mut branches = Vec::new();
        expand(&staged.data, &levels, &[], &mut branches, &mut output.errors);

        for failure in &output.errors {
            tracing::warn!(
                transformation = ?transformation.id,
                index = ?failure.index,
                error = %failure.error,
                "root array branch skipped"
            );
        }

        let accepted: Vec<Vec<usize>> = branches
            .into_iter()
            .filter(|index| {
                let keep = any_condition_holds(&transformation.conditions, &staged.data, index);
                if !keep {
                    tracing::debug!(
                        transformation = ?transformation.id,
                        index = ?index,
                        "conditions not met, branch discarded"
                    );
                }
                keep
            })
            .collect();

        if accepted.is_empty() {
            return Ok(output);
        }

        let keys = self.fetch_keys(transformation, target).await?;

        for index in accepted {
            match generate(transformation, target, staged, &index, &keys) {
                Ok(record) => output.records.push(BranchRecord { index, record }),
                Err(error) => {
                    tracing::warn!(
                        transformation = ?transformation.id,
                        index = ?index,
                        error = %error,
                        "branch failed to produce a record"
                    );
                    output.errors.push(BranchError { index, error });
                }
            }
        }

        Ok(output)
    }

    /// One lookup per distinct key id relevant to `target`. Missing keys are
    /// cached as `None` and surface as `LookupFailure` on the branches that
    /// need them.
    async fn fetch_keys(
        &self,
        transformation: &TypeTransformation,
        target: Target<'_>,
    ) -> Result<KeyCache, EtlError> {
        let container = transformation.container_id.as_str();
        let mut cache = KeyCache::new();

        for mapping in &transformation.keys {
            let id = match (target, mapping.destination()?) {
                (Target::Node { .. }, KeyDestination::Metatype(id)) => id,
                (Target::Edge { .. }, KeyDestination::Relationship(id)) => id,
                _ => continue,
            };
            if cache.contains_key(id) {
                continue;
            }

            let fetched = match target {
                Target::Node { .. } => self.ontology.metatype_key(container, id).await,
                Target::Edge { .. } => self.ontology.relationship_key(container, id).await,
            };
            let entry = match fetched {
                Ok(key) => Some(key),
                Err(OntologyError::NotFound { .. }) => {
                    tracing::debug!(key_id = %id, "key definition not found");
                    None
                }
                Err(err) => return Err(err.into()),
            };
            cache.insert(id.to_string(), entry);
        }

        Ok(cache)
    }
}

/// Collect every complete index vector under `levels`.
fn expand(
    payload: &Value,
    levels: &[String],
    index: &[usize],
    accepted: &mut Vec<Vec<usize>>,
    errors: &mut Vec<BranchError>,
) {
    let Some(path) = levels.get(index.len()) else {
        accepted.push(index.to_vec());
        return;
    };

    match resolve(payload, path, index) {
        Some(Value::Array(items)) => {
            for i in 0..items.len() {
                let mut next = Vec::with_capacity(index.len() + 1);
                next.extend_from_slice(index);
                next.push(i);
                expand(payload, levels, &next, accepted, errors);
            }
        }
        _ => errors.push(BranchError {
            index: index.to_vec(),
            error: EtlError::MalformedRootArray {
                path: path.clone(),
                index: index.to_vec(),
            },
        }),
    }
}

fn generate(
    t: &TypeTransformation,
    target: Target<'_>,
    staged: &StagedData,
    index: &[usize],
    keys: &KeyCache,
) -> Result<GraphRecord, EtlError> {
    let mut properties = Map::new();
    let mut metadata = RecordMetadata::default();

    for mapping in &t.keys {
        let key_id = match (target, mapping.destination()?) {
            (Target::Node { .. }, KeyDestination::Metatype(id)) => id,
            (Target::Edge { .. }, KeyDestination::Relationship(id)) => id,
            _ => continue,
        };
        let key = keys
            .get(key_id)
            .and_then(Option::as_ref)
            .ok_or_else(|| EtlError::LookupFailure {
                key_id: key_id.to_string(),
            })?;

        let extracted = match &mapping.key {
            Some(path) => resolve(&staged.data, path, index).cloned(),
            None => mapping.value.clone(),
        };
        let Some(value) = extracted else {
            if fails(t.config.on_key_extraction_error, key) {
                return Err(EtlError::MissingRequiredKey {
                    property: key.property_name.clone(),
                });
            }
            continue;
        };

        let value = if t.config.convert_values {
            match convert_value(key.data_type, Some(&value)) {
                None => value,
                Some(conversion) => match conversion.converted_value.clone() {
                    Some(converted) => {
                        metadata
                            .conversions
                            .insert(key.property_name.clone(), conversion);
                        converted
                    }
                    None => {
                        let reason = conversion.errors.clone().unwrap_or_default();
                        metadata
                            .failed_conversions
                            .insert(key.property_name.clone(), conversion);
                        if fails(t.config.on_conversion_error, key) {
                            return Err(EtlError::ConversionFailed {
                                property: key.property_name.clone(),
                                reason,
                            });
                        }
                        continue;
                    }
                },
            }
        } else {
            value
        };

        properties.insert(key.property_name.clone(), value);
    }

    let data_source_id = t
        .data_source_id
        .clone()
        .unwrap_or_else(|| staged.data_source_id.clone());
    let composite = |data_source: &str, key: &str, value: &str| {
        format!("{}+{}+{}+{}", t.container_id, data_source, key, value)
    };
    let lookup = |path: &Option<String>| -> Option<(String, String)> {
        let path = path.as_deref()?;
        let value = resolve(&staged.data, path, index).filter(|v| !v.is_null())?;
        Some((path.to_string(), display_value(value)))
    };

    let unique = lookup(&t.unique_identifier_key);
    if t.unique_identifier_key.is_some() && unique.is_none() {
        tracing::warn!(
            transformation = ?t.id,
            index = ?index,
            key = ?t.unique_identifier_key,
            "unique identifier did not resolve, record will not be upserted by identity"
        );
    }
    let (original_data_id, composite_original_id) = match &unique {
        Some((key, value)) => (
            Some(value.clone()),
            Some(composite(data_source_id.as_str(), key.as_str(), value.as_str())),
        ),
        None => (None, None),
    };

    match target {
        Target::Node { metatype_id } => {
            let mut node = Node::new(t.container_id.clone(), metatype_id);
            node.properties = properties;
            node.original_data_id = original_data_id;
            node.composite_original_id = composite_original_id;
            node.data_source_id = Some(data_source_id);
            node.type_mapping_transformation_id = t.id.clone();
            node.import_data_id = staged.import_id.clone();
            node.data_staging_id = staged.id.clone();
            node.created_at = staged.created_at;
            node.metadata = metadata;
            Ok(GraphRecord::Node(node))
        }
        Target::Edge { pair_id } => {
            let mut edge = Edge::new(t.container_id.clone(), pair_id);
            edge.properties = properties;
            edge.original_data_id = original_data_id;
            edge.composite_original_id = composite_original_id;

            if let Some((key, value)) = lookup(&t.origin_id_key) {
                let ds = t.origin_data_source_id.as_deref().unwrap_or(&data_source_id);
                edge.origin_node_composite_original_id = Some(composite(ds, key.as_str(), value.as_str()));
                edge.origin_node_original_id = Some(value);
            }
            if let Some((key, value)) = lookup(&t.destination_id_key) {
                let ds = t
                    .destination_data_source_id
                    .as_deref()
                    .unwrap_or(&data_source_id);
                edge.destination_node_composite_original_id =
                    Some(composite(ds, key.as_str(), value.as_str()));
                edge.destination_node_original_id = Some(value);
            }
            edge.origin_metatype_id = t.origin_metatype_id.clone();
            edge.origin_data_source_id = t.origin_data_source_id.clone();
            edge.destination_metatype_id = t.destination_metatype_id.clone();
            edge.destination_data_source_id = t.destination_data_source_id.clone();
            edge.origin_parameters = fill_parameters(&t.origin_parameters, staged, index);
            edge.destination_parameters = fill_parameters(&t.destination_parameters, staged, index);

            edge.data_source_id = Some(data_source_id);
            edge.type_mapping_transformation_id = t.id.clone();
            edge.import_data_id = staged.import_id.clone();
            edge.data_staging_id = staged.id.clone();
            edge.created_at = staged.created_at;
            edge.metadata = metadata;
            Ok(GraphRecord::Edge(edge))
        }
    }
}

/// Copy `parameters`, taking keyed values from this branch of the payload.
/// A key that does not resolve leaves the value empty.
fn fill_parameters(
    parameters: &[EdgeConnectionParameter],
    staged: &StagedData,
    index: &[usize],
) -> Vec<EdgeConnectionParameter> {
    parameters
        .iter()
        .map(|p| {
            let mut filled = p.clone();
            if let Some(key) = &p.key {
                filled.value = resolve(&staged.data, key, index).cloned();
            }
            filled
        })
        .collect()
}

fn fails(action: ErrorAction, key: &PropertyKey) -> bool {
    match action {
        ErrorAction::Ignore => false,
        ErrorAction::FailOnRequired => key.required,
        ErrorAction::Fail => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn levels(root: &str) -> Vec<String> {
        TypeTransformation::node("c", "m")
            .with_root_array(root)
            .root_array_levels()
    }

    #[test]
    fn expand_without_root_array_yields_one_empty_index() {
        let mut accepted = Vec::new();
        let mut errors = Vec::new();
        expand(&json!({}), &[], &[], &mut accepted, &mut errors);
        assert_eq!(accepted, vec![Vec::<usize>::new()]);
        assert!(errors.is_empty());
    }

    #[test]
    fn expand_walks_nested_arrays_in_order() {
        let payload = json!({"cars": [
            {"maintenance": [{}, {}]},
            {"maintenance": []},
            {"maintenance": [{}]}
        ]});
        let mut accepted = Vec::new();
        let mut errors = Vec::new();
        expand(&payload, &levels("cars[].maintenance[]"), &[], &mut accepted, &mut errors);
        assert_eq!(accepted, vec![vec![0, 0], vec![0, 1], vec![2, 0]]);
        assert!(errors.is_empty());
    }

    #[test]
    fn non_array_fails_only_its_branch() {
        let payload = json!({"cars": [
            {"maintenance": [{}]},
            {"maintenance": "none"},
            {"maintenance": [{}]}
        ]});
        let mut accepted = Vec::new();
        let mut errors = Vec::new();
        expand(&payload, &levels("cars[].maintenance[]"), &[], &mut accepted, &mut errors);
        assert_eq!(accepted, vec![vec![0, 0], vec![2, 0]]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].index, vec![1]);
        assert!(matches!(errors[0].error, EtlError::MalformedRootArray { .. }));
    }

    #[test]
    fn missing_root_array_is_one_failure() {
        let mut accepted = Vec::new();
        let mut errors = Vec::new();
        expand(&json!({"items": {}}), &levels("items[]"), &[], &mut accepted, &mut errors);
        assert!(accepted.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].index.is_empty());
    }
}
