//! In-memory graph store.
//!
//! Entities are nodes with typed properties; edges are directed but path
//! discovery walks them in both directions. Search scores matched entities
//! by keyword overlap combined with degree centrality, then spreads a
//! decayed score to neighbors within `max_depth` hops.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use strata_core::{CollaboratorHit, GraphStore, Result};

#[derive(Debug, Clone)]
struct EntityNode {
    entity_type: String,
    props: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EdgeKey {
    from: Uuid,
    to: Uuid,
    edge_type: String,
}

#[derive(Default)]
struct GraphInner {
    entities: HashMap<Uuid, EntityNode>,
    edges: HashMap<EdgeKey, JsonValue>,
    /// Undirected adjacency for traversal.
    adjacency: HashMap<Uuid, HashSet<Uuid>>,
}

impl GraphInner {
    fn degree(&self, id: &Uuid) -> usize {
        self.adjacency.get(id).map_or(0, HashSet::len)
    }
}

/// Graph store holding everything in process memory.
#[derive(Default)]
pub struct InMemoryGraphStore {
    inner: RwLock<GraphInner>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities.
    pub async fn entity_count(&self) -> usize {
        self.inner.read().await.entities.len()
    }

    /// Number of edges.
    pub async fn edge_count(&self) -> usize {
        self.inner.read().await.edges.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_entity(&self, id: Uuid, entity_type: &str, props: JsonValue) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.entities.insert(
            id,
            EntityNode {
                entity_type: entity_type.to_string(),
                props,
            },
        );
        inner.adjacency.entry(id).or_default();
        Ok(())
    }

    async fn upsert_edge(
        &self,
        from: Uuid,
        to: Uuid,
        edge_type: &str,
        props: JsonValue,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.edges.insert(
            EdgeKey {
                from,
                to,
                edge_type: edge_type.to_string(),
            },
            props,
        );
        inner.adjacency.entry(from).or_default().insert(to);
        inner.adjacency.entry(to).or_default().insert(from);
        Ok(())
    }

    async fn search(&self, query: &str, max_depth: usize) -> Result<Vec<CollaboratorHit>> {
        let query_terms: HashSet<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let max_degree = inner
            .entities
            .keys()
            .map(|id| inner.degree(id))
            .max()
            .unwrap_or(0)
            .max(1) as f32;

        // Direct matches: term overlap against type and property text,
        // blended with degree centrality.
        let mut scores: HashMap<Uuid, f32> = HashMap::new();
        for (id, node) in &inner.entities {
            let haystack = entity_text(node);
            let matched = query_terms
                .iter()
                .filter(|t| haystack.contains(t.as_str()))
                .count();
            if matched == 0 {
                continue;
            }
            let overlap = matched as f32 / query_terms.len() as f32;
            let centrality = inner.degree(id) as f32 / max_degree;
            scores.insert(*id, 0.7 * overlap + 0.3 * centrality);
        }

        // Spread decayed scores to neighbors of matches.
        if max_depth > 0 {
            let seeds: Vec<(Uuid, f32)> = scores.iter().map(|(id, s)| (*id, *s)).collect();
            for (seed, seed_score) in seeds {
                let mut queue = VecDeque::from([(seed, 0usize)]);
                let mut visited = HashSet::from([seed]);
                while let Some((node, depth)) = queue.pop_front() {
                    if depth >= max_depth {
                        continue;
                    }
                    for &neighbor in inner.adjacency.get(&node).into_iter().flatten() {
                        if !visited.insert(neighbor) {
                            continue;
                        }
                        let spread = seed_score * 0.5_f32.powi(depth as i32 + 1);
                        let slot = scores.entry(neighbor).or_insert(0.0);
                        if spread > *slot {
                            *slot = spread;
                        }
                        queue.push_back((neighbor, depth + 1));
                    }
                }
            }
        }

        let mut hits: Vec<CollaboratorHit> = scores
            .into_iter()
            .map(|(id, score)| CollaboratorHit { id, score })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        debug!(result_count = hits.len(), "Graph search complete");
        Ok(hits)
    }

    async fn path(&self, a: Uuid, b: Uuid, max_depth: usize) -> Result<Option<Vec<(Uuid, Uuid)>>> {
        if a == b {
            return Ok(Some(Vec::new()));
        }

        let inner = self.inner.read().await;
        if !inner.entities.contains_key(&a) || !inner.entities.contains_key(&b) {
            return Ok(None);
        }

        // BFS with parent tracking, bounded by max_depth hops.
        let mut parents: HashMap<Uuid, Uuid> = HashMap::new();
        let mut queue = VecDeque::from([(a, 0usize)]);
        let mut visited = HashSet::from([a]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for &neighbor in inner.adjacency.get(&node).into_iter().flatten() {
                if !visited.insert(neighbor) {
                    continue;
                }
                parents.insert(neighbor, node);
                if neighbor == b {
                    let mut path = Vec::new();
                    let mut current = b;
                    while current != a {
                        let parent = parents[&current];
                        path.push((parent, current));
                        current = parent;
                    }
                    path.reverse();
                    return Ok(Some(path));
                }
                queue.push_back((neighbor, depth + 1));
            }
        }

        Ok(None)
    }

    async fn delete_entity(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.entities.remove(&id);
        inner.edges.retain(|key, _| key.from != id && key.to != id);
        inner.adjacency.remove(&id);
        for neighbors in inner.adjacency.values_mut() {
            neighbors.remove(&id);
        }
        Ok(())
    }
}

fn entity_text(node: &EntityNode) -> String {
    let mut text = node.entity_type.to_lowercase();
    collect_strings(&node.props, &mut text);
    text
}

fn collect_strings(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::String(s) => {
            out.push(' ');
            out.push_str(&s.to_lowercase());
        }
        JsonValue::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        JsonValue::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}
