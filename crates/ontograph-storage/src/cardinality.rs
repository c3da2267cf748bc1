//! Relationship-pair cardinality enforcement.
//!
//! Checks run in a fixed order: endpoint metatypes, saved and live
//! endpoints, exact duplicates, then the pair's cardinality rule.
//!
//! | cardinality | rejected when an edge of the pair already...  |
//! |-------------|-----------------------------------------------|
//! | `one:one`   | leaves the origin, or enters the destination  |
//! | `one:many`  | enters the destination                        |
//! | `many:one`  | leaves the origin                             |
//! | `many:many` | (never)                                       |
//!
//! The lookup must be the same transaction the edge is then written in.

use crate::error::{CardinalityError, Endpoint};
use crate::lookup::EdgeLookup;
use ontograph_schema::{Cardinality, Edge, MetatypeRelationshipPair, Node};

/// May an edge of `pair` go from `origin` to `destination`?
pub async fn check_cardinality(
    pair: &MetatypeRelationshipPair,
    origin: &Node,
    destination: &Node,
    lookup: &dyn EdgeLookup,
) -> Result<(), CardinalityError> {
    check_cardinality_excluding(pair, origin, destination, lookup, None).await
}

/// As [`check_cardinality`], ignoring the existing edge `replacing` (the
/// edge an upsert is about to overwrite).
pub async fn check_cardinality_excluding(
    pair: &MetatypeRelationshipPair,
    origin: &Node,
    destination: &Node,
    lookup: &dyn EdgeLookup,
    replacing: Option<&str>,
) -> Result<(), CardinalityError> {
    if origin.metatype_id != pair.origin_metatype_id {
        return Err(CardinalityError::TypeMismatch {
            endpoint: Endpoint::Origin,
            expected: pair.origin_metatype_id.clone(),
            found: origin.metatype_id.clone(),
        });
    }
    if destination.metatype_id != pair.destination_metatype_id {
        return Err(CardinalityError::TypeMismatch {
            endpoint: Endpoint::Destination,
            expected: pair.destination_metatype_id.clone(),
            found: destination.metatype_id.clone(),
        });
    }

    let origin_id = origin
        .id
        .as_deref()
        .ok_or(CardinalityError::UnsavedNode { endpoint: Endpoint::Origin })?;
    let destination_id = destination
        .id
        .as_deref()
        .ok_or(CardinalityError::UnsavedNode { endpoint: Endpoint::Destination })?;
    for (endpoint, node, node_id) in [
        (Endpoint::Origin, origin, origin_id),
        (Endpoint::Destination, destination, destination_id),
    ] {
        if node.archived {
            return Err(CardinalityError::ArchivedNode {
                endpoint,
                node_id: node_id.to_string(),
            });
        }
    }
    let pair_id = pair.id.as_deref().unwrap_or_default();

    let others = |edges: Vec<Edge>| -> Option<Edge> {
        edges
            .into_iter()
            .find(|e| replacing.map_or(true, |r| e.id.as_deref() != Some(r)))
    };

    let existing = lookup
        .edges_by_pair_origin_destination(pair_id, origin_id, destination_id)
        .await?;
    if others(existing).is_some() {
        return Err(CardinalityError::DuplicateRelationship {
            pair_id: pair_id.to_string(),
            origin_id: origin_id.to_string(),
            destination_id: destination_id.to_string(),
        });
    }

    let (check_origin, check_destination) = match pair.relationship_type {
        Cardinality::ManyToMany => (false, false),
        Cardinality::OneToOne => (true, true),
        Cardinality::OneToMany => (false, true),
        Cardinality::ManyToOne => (true, false),
    };

    let violation = |endpoint: Endpoint, node_id: &str, edge: Edge| CardinalityError::CardinalityViolation {
        pair_id: pair_id.to_string(),
        cardinality: pair.relationship_type,
        endpoint,
        node_id: node_id.to_string(),
        existing_edge_id: edge.id.unwrap_or_default(),
    };

    if check_origin {
        let edges = lookup.edges_by_pair_and_origin(pair_id, origin_id).await?;
        if let Some(edge) = others(edges) {
            return Err(violation(Endpoint::Origin, origin_id, edge));
        }
    }
    if check_destination {
        let edges = lookup
            .edges_by_pair_and_destination(pair_id, destination_id)
            .await?;
        if let Some(edge) = others(edges) {
            return Err(violation(Endpoint::Destination, destination_id, edge));
        }
    }

    Ok(())
}
