//! Per-document transform stage.
//!
//! Every document passes through [`Transformer::apply`], which retargets it
//! to the destination index, reassigns its routing key and runs the payload
//! hook. The stage holds no cross-document state and never fails.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::document::Document;

/// Parsed routing specification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RoutingSpec {
    /// No routing key is attached.
    #[default]
    Unset,
    /// Every document gets this key.
    Fixed(String),
    /// One key is picked uniformly at random per document.
    Candidates(Vec<String>),
}

impl RoutingSpec {
    /// Parses a comma-separated candidate list.
    ///
    /// Whitespace around candidates is ignored and empty entries are
    /// dropped. A specification with no usable candidate yields
    /// [`RoutingSpec::Unset`] instead of an error.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Unset;
        };

        let mut candidates: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        match candidates.len() {
            0 => Self::Unset,
            1 => Self::Fixed(candidates.remove(0)),
            _ => Self::Candidates(candidates),
        }
    }

    /// Picks the routing key for one document.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        match self {
            Self::Unset => None,
            Self::Fixed(key) => Some(key.clone()),
            Self::Candidates(keys) => keys.choose(rng).cloned(),
        }
    }
}

/// Payload-rewrite extension point, invoked once per document after the
/// index and routing have been assigned.
pub trait DocumentHook: Send + Sync {
    /// Rewrites the document in place. May change the payload or identifier.
    fn rewrite(&self, doc: &mut Document);
}

/// Hook that leaves documents untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl DocumentHook for NoopHook {
    fn rewrite(&self, _doc: &mut Document) {}
}

/// Renames payload fields.
///
/// A mapping whose destination is `_id` takes the document identifier from
/// that field instead (string and number values only); the field stays in
/// the payload. Renames are resolved against the original payload, so they
/// never chain; a renamed field replaces any field already at its
/// destination.
#[derive(Debug, Clone, Default)]
pub struct FieldMappingHook {
    mappings: Vec<(String, String)>,
}

impl FieldMappingHook {
    /// Creates a hook from `source_field -> dest_field` pairs.
    #[must_use]
    pub fn new(mappings: &HashMap<String, String>) -> Self {
        let mut mappings: Vec<(String, String)> = mappings
            .iter()
            .map(|(from, to)| (from.clone(), to.clone()))
            .collect();
        // HashMap order is unstable; keep renames deterministic
        mappings.sort();
        Self { mappings }
    }

    /// Returns true if no mapping is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl DocumentHook for FieldMappingHook {
    fn rewrite(&self, doc: &mut Document) {
        // Identifier lookups and renames all read the original payload
        let mut moved = Vec::new();
        for (from, to) in &self.mappings {
            if to == "_id" {
                match doc.source.get(from) {
                    Some(Value::String(s)) => doc.id = s.clone(),
                    Some(Value::Number(n)) => doc.id = n.to_string(),
                    _ => {}
                }
                continue;
            }
            if let Some(value) = doc.source.get(from) {
                moved.push((from, to, value.clone()));
            }
        }

        for (from, _, _) in &moved {
            doc.source.remove(from.as_str());
        }
        for (_, to, value) in moved {
            doc.source.insert(to.clone(), value);
        }
    }
}

/// The transform stage for one run.
#[derive(Clone)]
pub struct Transformer {
    target_index: String,
    routing: RoutingSpec,
    hook: Arc<dyn DocumentHook>,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("target_index", &self.target_index)
            .field("routing", &self.routing)
            .finish_non_exhaustive()
    }
}

impl Transformer {
    /// Creates a transformer with the no-op hook.
    pub fn new(target_index: impl Into<String>, routing: RoutingSpec) -> Self {
        Self {
            target_index: target_index.into(),
            routing,
            hook: Arc::new(NoopHook),
        }
    }

    /// Replaces the payload hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn DocumentHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Destination index name.
    #[must_use]
    pub fn target_index(&self) -> &str {
        &self.target_index
    }

    /// Transforms one document using the thread-local RNG.
    #[must_use]
    pub fn apply(&self, doc: Document) -> Document {
        self.apply_with(doc, &mut rand::thread_rng())
    }

    /// Transforms one document, drawing routing choices from `rng`.
    pub fn apply_with<R: Rng + ?Sized>(&self, mut doc: Document, rng: &mut R) -> Document {
        doc.index.clone_from(&self.target_index);
        // Inbound routing never survives, even without a routing spec
        doc.routing = self.routing.pick(rng);
        self.hook.rewrite(&mut doc);
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::HashSet;

    fn source_doc() -> Document {
        let mut source = serde_json::Map::new();
        source.insert("sku".to_string(), json!("B-42"));
        source.insert("legacy_id".to_string(), json!(1042));
        Document::new("orig", "products", source).with_routing("old-shard")
    }

    #[test]
    fn test_parse_routing_variants() {
        assert_eq!(RoutingSpec::parse(None), RoutingSpec::Unset);
        assert_eq!(RoutingSpec::parse(Some("")), RoutingSpec::Unset);
        assert_eq!(RoutingSpec::parse(Some(" , ,")), RoutingSpec::Unset);
        assert_eq!(
            RoutingSpec::parse(Some(" eu ")),
            RoutingSpec::Fixed("eu".to_string())
        );
        assert_eq!(
            RoutingSpec::parse(Some("eu, us ,,apac")),
            RoutingSpec::Candidates(vec!["eu".into(), "us".into(), "apac".into()])
        );
    }

    #[test]
    fn test_apply_retargets_and_drops_inbound_routing() {
        let transformer = Transformer::new("products-v2", RoutingSpec::Unset);

        let doc = transformer.apply(source_doc());

        assert_eq!(doc.index, "products-v2");
        assert_eq!(doc.routing, None);
        assert_eq!(doc.id, "orig");
        assert_eq!(doc.source["sku"], "B-42");
    }

    #[test]
    fn test_apply_fixed_routing() {
        let transformer = Transformer::new("t", RoutingSpec::parse(Some("tenant-1")));

        let doc = transformer.apply(source_doc());

        assert_eq!(doc.routing.as_deref(), Some("tenant-1"));
    }

    #[test]
    fn test_candidate_routing_covers_every_key() {
        let transformer = Transformer::new("t", RoutingSpec::parse(Some("a,b,c")));
        let mut rng = StdRng::seed_from_u64(7);

        let seen: HashSet<String> = (0..150)
            .filter_map(|_| transformer.apply_with(source_doc(), &mut rng).routing)
            .collect();

        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_field_mapping_hook_renames_fields() {
        let mut mappings = HashMap::new();
        mappings.insert("sku".to_string(), "product_code".to_string());
        let hook = FieldMappingHook::new(&mappings);
        let mut doc = source_doc();

        hook.rewrite(&mut doc);

        assert!(doc.source.get("sku").is_none());
        assert_eq!(doc.source["product_code"], "B-42");
    }

    #[test]
    fn test_field_mapping_hook_remaps_identifier() {
        let mut mappings = HashMap::new();
        mappings.insert("legacy_id".to_string(), "_id".to_string());
        let transformer =
            Transformer::new("t", RoutingSpec::Unset).with_hook(Arc::new(FieldMappingHook::new(&mappings)));

        let doc = transformer.apply(source_doc());

        assert_eq!(doc.id, "1042");
        assert_eq!(doc.source["legacy_id"], 1042);
    }

    fn payload(value: Value) -> Document {
        let Value::Object(source) = value else {
            panic!("payload must be an object");
        };
        Document::new("1", "idx", source)
    }

    #[test]
    fn test_field_mapping_hook_renames_do_not_chain() {
        let mut mappings = HashMap::new();
        mappings.insert("a".to_string(), "b".to_string());
        mappings.insert("b".to_string(), "c".to_string());
        let hook = FieldMappingHook::new(&mappings);
        let mut doc = payload(json!({"a": 1, "b": 2}));

        hook.rewrite(&mut doc);

        assert_eq!(Value::Object(doc.source), json!({"b": 1, "c": 2}));
    }

    #[test]
    fn test_field_mapping_hook_swaps_fields() {
        let mut mappings = HashMap::new();
        mappings.insert("a".to_string(), "b".to_string());
        mappings.insert("b".to_string(), "a".to_string());
        let hook = FieldMappingHook::new(&mappings);
        let mut doc = payload(json!({"a": 1, "b": 2, "keep": true}));

        hook.rewrite(&mut doc);

        assert_eq!(Value::Object(doc.source), json!({"a": 2, "b": 1, "keep": true}));
    }

    #[test]
    fn test_field_mapping_hook_rename_onto_existing_field() {
        let mut mappings = HashMap::new();
        mappings.insert("new_name".to_string(), "name".to_string());
        let hook = FieldMappingHook::new(&mappings);
        let mut doc = payload(json!({"name": "stale", "new_name": "fresh"}));

        hook.rewrite(&mut doc);

        assert_eq!(Value::Object(doc.source), json!({"name": "fresh"}));
    }

    #[test]
    fn test_field_mapping_hook_ignores_missing_fields() {
        let mut mappings = HashMap::new();
        mappings.insert("absent".to_string(), "_id".to_string());
        mappings.insert("gone".to_string(), "renamed".to_string());
        let hook = FieldMappingHook::new(&mappings);
        let mut doc = source_doc();

        hook.rewrite(&mut doc);

        assert_eq!(doc, source_doc());
    }
}
