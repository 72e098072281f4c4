//! Hierarchical error context
//!
//! An [`ErrorContext`] is a bag of diagnostic metadata (component, operation,
//! free-form data) attached to a failure. Contexts form trees inside a
//! [`ContextManager`], which owns every node it creates:
//!
//! - `depth = parent.depth + 1`, roots have depth 0
//! - exceeding `max_context_depth` or `max_context_size` clears the node's
//!   `is_valid` flag; it never fails the operation
//! - sensitive keys are redacted before validity is computed
//! - removing a node orphans its children unless the removal cascades

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::config::defaults::{
    DEFAULT_MAX_CONTEXT_DEPTH, DEFAULT_MAX_CONTEXT_SIZE, REDACTED_PLACEHOLDER, SENSITIVE_KEYS,
};
use crate::error::{ResilienceError, ResilienceResult};

/// Limits applied to error contexts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Deepest allowed nesting level (root = 0)
    pub max_context_depth: usize,
    /// Largest allowed serialized `data` payload, in bytes
    pub max_context_size: usize,
    /// Redact sensitive keys during validation
    pub sanitize: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_depth: DEFAULT_MAX_CONTEXT_DEPTH,
            max_context_size: DEFAULT_MAX_CONTEXT_SIZE,
            sanitize: true,
        }
    }
}

impl ContextConfig {
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_context_depth == 0 {
            return Err(ResilienceError::configuration(
                "context.max_context_depth",
                "must be greater than zero",
            ));
        }
        if self.max_context_size == 0 {
            return Err(ResilienceError::configuration(
                "context.max_context_size",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// What a context node describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Error,
    Operation,
    Component,
    Request,
    Bootstrap,
    Custom,
}

/// Relative importance of the work a context describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPriority {
    Low,
    Normal,
    High,
    Critical,
}

/// How [`ErrorContext::merge`] combines data maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Incoming values replace existing ones
    Overwrite,
    /// Existing values win; only missing keys are added
    Preserve,
    /// Objects merge recursively, incoming leaves win
    Deep,
    /// Arrays concatenate; scalar clashes become `[existing, incoming]`
    Append,
}

/// A single context node
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
    pub id: Uuid,
    pub component: Option<String>,
    pub operation: Option<String>,
    pub source: Option<String>,
    pub context_type: ContextType,
    pub priority: ContextPriority,
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    depth: usize,
    parent: Option<Uuid>,
    children: Vec<Uuid>,
    is_valid: bool,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            component: None,
            operation: None,
            source: None,
            context_type: ContextType::Error,
            priority: ContextPriority::Normal,
            data: Map::new(),
            timestamp: Utc::now(),
            depth: 0,
            parent: None,
            children: Vec::new(),
            is_valid: true,
        }
    }

    /// Context for `operation` running inside `component`
    pub fn for_operation(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new()
            .with_component(component)
            .with_operation(operation)
            .with_type(ContextType::Operation)
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_type(mut self, context_type: ContextType) -> Self {
        self.context_type = context_type;
        self
    }

    pub fn with_priority(mut self, priority: ContextPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    pub fn children(&self) -> &[Uuid] {
        &self.children
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Breaker/strategy key for this context: operation, then component
    pub fn operation_key(&self) -> Option<&str> {
        fn non_empty(field: &Option<String>) -> Option<&str> {
            field.as_deref().filter(|k| !k.is_empty())
        }
        non_empty(&self.operation).or_else(|| non_empty(&self.component))
    }

    /// Merge another context's metadata into this one
    pub fn merge(&mut self, other: &ErrorContext, strategy: MergeStrategy) {
        match strategy {
            MergeStrategy::Preserve => {
                fill_if_none(&mut self.component, &other.component);
                fill_if_none(&mut self.operation, &other.operation);
                fill_if_none(&mut self.source, &other.source);
            }
            _ => {
                replace_if_some(&mut self.component, &other.component);
                replace_if_some(&mut self.operation, &other.operation);
                replace_if_some(&mut self.source, &other.source);
            }
        }

        for (key, incoming) in &other.data {
            match strategy {
                MergeStrategy::Overwrite => {
                    self.data.insert(key.clone(), incoming.clone());
                }
                MergeStrategy::Preserve => {
                    self.data
                        .entry(key.clone())
                        .or_insert_with(|| incoming.clone());
                }
                MergeStrategy::Deep => match self.data.get_mut(key) {
                    Some(existing) => deep_merge(existing, incoming),
                    None => {
                        self.data.insert(key.clone(), incoming.clone());
                    }
                },
                MergeStrategy::Append => match self.data.get_mut(key) {
                    Some(existing) => append_value(existing, incoming),
                    None => {
                        self.data.insert(key.clone(), incoming.clone());
                    }
                },
            }
        }
    }

    /// Redact values stored under sensitive keys, recursively
    pub fn sanitize(&mut self) {
        for (key, value) in self.data.iter_mut() {
            if is_sensitive_key(key) {
                *value = Value::String(REDACTED_PLACEHOLDER.to_string());
            } else {
                sanitize_value(value);
            }
        }
    }

    /// Serialized size of the data payload in bytes
    pub fn data_size(&self) -> usize {
        serde_json::to_vec(&self.data).map(|b| b.len()).unwrap_or(usize::MAX)
    }

    /// Sanitize (if configured) and recompute the validity flag
    pub fn validate(&mut self, config: &ContextConfig) -> bool {
        if config.sanitize {
            self.sanitize();
        }
        self.is_valid =
            self.depth <= config.max_context_depth && self.data_size() <= config.max_context_size;
        self.is_valid
    }

    /// Flat JSON rendering used in error records
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "id": self.id.to_string(),
            "component": self.component,
            "operation": self.operation,
            "source": self.source,
            "type": self.context_type,
            "priority": self.priority,
            "data": self.data,
            "timestamp": self.timestamp.to_rfc3339(),
            "depth": self.depth,
            "is_valid": self.is_valid,
        })
    }
}

fn fill_if_none(target: &mut Option<String>, incoming: &Option<String>) {
    if target.is_none() {
        *target = incoming.clone();
    }
}

fn replace_if_some(target: &mut Option<String>, incoming: &Option<String>) {
    if incoming.is_some() {
        *target = incoming.clone();
    }
}

fn deep_merge(existing: &mut Value, incoming: &Value) {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(other)) => {
            for (key, value) in other {
                match current.get_mut(key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        current.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

fn append_value(existing: &mut Value, incoming: &Value) {
    match (existing, incoming) {
        (Value::Array(current), Value::Array(other)) => current.extend(other.iter().cloned()),
        (Value::Array(current), value) => current.push(value.clone()),
        (slot, value) => {
            let previous = slot.take();
            *slot = Value::Array(vec![previous, value.clone()]);
        }
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|needle| lowered.contains(needle))
}

fn sanitize_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *inner = Value::String(REDACTED_PLACEHOLDER.to_string());
                } else {
                    sanitize_value(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_value),
        _ => {}
    }
}

/// Wire form of a context subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedContext {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub context_type: ContextType,
    pub priority: ContextPriority,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub depth: usize,
    pub is_valid: bool,
    #[serde(default)]
    pub children: Vec<SerializedContext>,
}

/// Owner of a forest of context nodes
#[derive(Debug, Default)]
pub struct ContextManager {
    config: ContextConfig,
    nodes: HashMap<Uuid, ErrorContext>,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            nodes: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&ErrorContext> {
        self.nodes.get(&id)
    }

    /// Take ownership of `context` as a new root
    pub fn insert_root(&mut self, mut context: ErrorContext) -> Uuid {
        context.depth = 0;
        context.parent = None;
        context.children.clear();
        context.validate(&self.config);
        let id = context.id;
        self.nodes.insert(id, context);
        id
    }

    /// Take ownership of `context` and attach it under `parent`
    pub fn create_child(&mut self, parent: Uuid, context: ErrorContext) -> ResilienceResult<Uuid> {
        if !self.nodes.contains_key(&parent) {
            return Err(not_found(parent));
        }
        let id = self.insert_root(context);
        self.add_child(parent, id)?;
        Ok(id)
    }

    /// Attach an existing node under `parent`, detaching it from any previous parent
    pub fn add_child(&mut self, parent: Uuid, child: Uuid) -> ResilienceResult<()> {
        if !self.nodes.contains_key(&parent) {
            return Err(not_found(parent));
        }
        if !self.nodes.contains_key(&child) {
            return Err(not_found(child));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(ResilienceError::configuration(
                "context",
                format!("attaching {} under {} would create a cycle", child, parent),
            ));
        }

        self.detach(child)?;

        let parent_depth = match self.nodes.get_mut(&parent) {
            Some(node) => {
                node.children.push(child);
                node.depth
            }
            None => return Err(not_found(parent)),
        };
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        self.set_subtree_depth(child, parent_depth + 1);
        Ok(())
    }

    /// Make `id` a root without deleting anything
    pub fn detach(&mut self, id: Uuid) -> ResilienceResult<()> {
        let parent = self.nodes.get(&id).ok_or_else(|| not_found(id))?.parent;
        if let Some(parent_id) = parent {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.retain(|c| *c != id);
            }
            if let Some(node) = self.nodes.get_mut(&id) {
                node.parent = None;
            }
            self.set_subtree_depth(id, 0);
        }
        Ok(())
    }

    /// Remove `child` from under `parent` and from the manager
    pub fn remove_child(
        &mut self,
        parent: Uuid,
        child: Uuid,
        cascade: bool,
    ) -> ResilienceResult<ErrorContext> {
        let is_child = self
            .nodes
            .get(&parent)
            .ok_or_else(|| not_found(parent))?
            .children
            .contains(&child);
        if !is_child {
            return Err(not_found(child));
        }
        self.remove(child, cascade)
    }

    /// Remove a node. Without `cascade` its children become roots.
    pub fn remove(&mut self, id: Uuid, cascade: bool) -> ResilienceResult<ErrorContext> {
        self.detach(id)?;
        let mut node = self.nodes.remove(&id).ok_or_else(|| not_found(id))?;
        let children = std::mem::take(&mut node.children);

        for child in children {
            if cascade {
                for descendant in self.subtree_ids(child) {
                    self.nodes.remove(&descendant);
                }
            } else {
                if let Some(orphan) = self.nodes.get_mut(&child) {
                    orphan.parent = None;
                }
                self.set_subtree_depth(child, 0);
            }
        }

        Ok(node)
    }

    /// Merge `other` into the node and revalidate it
    pub fn merge_into(
        &mut self,
        id: Uuid,
        other: &ErrorContext,
        strategy: MergeStrategy,
    ) -> ResilienceResult<bool> {
        let config = self.config.clone();
        let node = self.nodes.get_mut(&id).ok_or_else(|| not_found(id))?;
        node.merge(other, strategy);
        Ok(node.validate(&config))
    }

    /// Serialize the subtree rooted at `id` to JSON
    pub fn serialize(&self, id: Uuid) -> ResilienceResult<String> {
        let tree = self.to_serialized(id)?;
        serde_json::to_string(&tree).map_err(|e| ResilienceError::serialization("serialize context", e))
    }

    fn to_serialized(&self, id: Uuid) -> ResilienceResult<SerializedContext> {
        let node = self.nodes.get(&id).ok_or_else(|| not_found(id))?;
        let children = node
            .children
            .iter()
            .map(|child| self.to_serialized(*child))
            .collect::<ResilienceResult<Vec<_>>>()?;

        Ok(SerializedContext {
            id: node.id,
            component: node.component.clone(),
            operation: node.operation.clone(),
            source: node.source.clone(),
            context_type: node.context_type,
            priority: node.priority,
            data: node.data.clone(),
            timestamp: node.timestamp,
            depth: node.depth,
            is_valid: node.is_valid,
            children,
        })
    }

    /// Rebuild a serialized subtree inside this manager, returning its root id
    ///
    /// Depth and validity flags are restored exactly as serialized. Nothing
    /// is inserted unless every id is new and unique within the payload and
    /// each child sits one level below its parent.
    pub fn deserialize(&mut self, json: &str) -> ResilienceResult<Uuid> {
        let tree: SerializedContext = serde_json::from_str(json)
            .map_err(|e| ResilienceError::serialization("deserialize context", e))?;

        let mut seen = HashSet::new();
        self.check_tree(&tree, &mut seen)?;

        let root = tree.id;
        self.restore(tree, None);
        Ok(root)
    }

    fn check_tree(&self, tree: &SerializedContext, seen: &mut HashSet<Uuid>) -> ResilienceResult<()> {
        if self.nodes.contains_key(&tree.id) {
            return Err(malformed(format!("context {} already exists", tree.id)));
        }
        if !seen.insert(tree.id) {
            return Err(malformed(format!("context {} appears more than once", tree.id)));
        }
        for child in &tree.children {
            if tree.depth.checked_add(1) != Some(child.depth) {
                return Err(malformed(format!(
                    "context {} has depth {} under a parent at depth {}",
                    child.id, child.depth, tree.depth
                )));
            }
            self.check_tree(child, seen)?;
        }
        Ok(())
    }

    fn restore(&mut self, tree: SerializedContext, parent: Option<Uuid>) {
        let id = tree.id;
        let children: Vec<Uuid> = tree.children.iter().map(|c| c.id).collect();
        self.nodes.insert(
            id,
            ErrorContext {
                id,
                component: tree.component,
                operation: tree.operation,
                source: tree.source,
                context_type: tree.context_type,
                priority: tree.priority,
                data: tree.data,
                timestamp: tree.timestamp,
                depth: tree.depth,
                parent,
                children,
                is_valid: tree.is_valid,
            },
        );
        for child in tree.children {
            self.restore(child, Some(id));
        }
    }

    fn is_ancestor(&self, candidate: Uuid, of: Uuid) -> bool {
        let mut cursor = self.nodes.get(&of).and_then(|n| n.parent);
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            cursor = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn subtree_ids(&self, root: Uuid) -> Vec<Uuid> {
        let mut ids = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().copied());
                ids.push(id);
            }
        }
        ids
    }

    fn set_subtree_depth(&mut self, root: Uuid, depth: usize) {
        let config = self.config.clone();
        let mut stack = vec![(root, depth)];
        while let Some((id, depth)) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.depth = depth;
                node.validate(&config);
                stack.extend(node.children.iter().map(|c| (*c, depth + 1)));
            }
        }
    }
}

fn malformed(message: String) -> ResilienceError {
    ResilienceError::serialization("deserialize context", message)
}

fn not_found(id: Uuid) -> ResilienceError {
    ResilienceError::ContextNotFound { id: id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_child_depth_follows_parent() {
        let mut manager = ContextManager::default();
        let root = manager.insert_root(ErrorContext::for_operation("map", "bootstrap"));
        let child = manager
            .create_child(root, ErrorContext::for_operation("map", "load_layers"))
            .unwrap();
        let grandchild = manager
            .create_child(child, ErrorContext::for_operation("map", "fetch_geojson"))
            .unwrap();

        assert_eq!(manager.get(root).unwrap().depth(), 0);
        assert_eq!(manager.get(child).unwrap().depth(), 1);
        assert_eq!(manager.get(grandchild).unwrap().depth(), 2);
        assert_eq!(manager.get(grandchild).unwrap().parent(), Some(child));
        assert_eq!(manager.get(root).unwrap().children(), &[child]);
    }

    #[test]
    fn test_depth_limit_flips_validity() {
        let mut manager = ContextManager::new(ContextConfig {
            max_context_depth: 1,
            ..Default::default()
        });
        let root = manager.insert_root(ErrorContext::new());
        let child = manager.create_child(root, ErrorContext::new()).unwrap();
        let grandchild = manager.create_child(child, ErrorContext::new()).unwrap();

        assert!(manager.get(child).unwrap().is_valid());
        assert!(!manager.get(grandchild).unwrap().is_valid());
    }

    #[test]
    fn test_size_limit_flips_validity() {
        let config = ContextConfig {
            max_context_size: 32,
            ..Default::default()
        };
        let mut context = ErrorContext::new().with_data("blob", "x".repeat(64));
        assert!(!context.validate(&config));

        let mut small = ErrorContext::new().with_data("k", 1);
        assert!(small.validate(&config));
    }

    #[test]
    fn test_sanitize_redacts_nested_sensitive_keys() {
        let mut context = ErrorContext::new()
            .with_data("apiToken", "abc123")
            .with_data("user", json!({"name": "ops", "password": "hunter2"}))
            .with_data("layers", json!([{"secretUrl": "x"}, {"id": 3}]));

        context.sanitize();

        assert_eq!(context.data["apiToken"], json!(REDACTED_PLACEHOLDER));
        assert_eq!(context.data["user"]["name"], json!("ops"));
        assert_eq!(context.data["user"]["password"], json!(REDACTED_PLACEHOLDER));
        assert_eq!(context.data["layers"][0]["secretUrl"], json!(REDACTED_PLACEHOLDER));
        assert_eq!(context.data["layers"][1]["id"], json!(3));
    }

    #[test]
    fn test_sanitize_runs_before_size_check() {
        let config = ContextConfig {
            max_context_size: 40,
            ..Default::default()
        };
        // The secret alone would overflow the limit; the placeholder does not
        let mut context = ErrorContext::new().with_data("secret", "s".repeat(200));
        assert!(context.validate(&config));
    }

    #[test]
    fn test_merge_strategies() {
        let base = ErrorContext::new()
            .with_data("a", 1)
            .with_data("nested", json!({"x": 1, "y": 2}))
            .with_data("tags", json!(["one"]));
        let incoming = ErrorContext::new()
            .with_component("sidebar")
            .with_data("a", 2)
            .with_data("b", 3)
            .with_data("nested", json!({"y": 20, "z": 30}))
            .with_data("tags", json!(["two"]));

        let mut overwrite = base.clone();
        overwrite.merge(&incoming, MergeStrategy::Overwrite);
        assert_eq!(overwrite.data["a"], json!(2));
        assert_eq!(overwrite.data["nested"], json!({"y": 20, "z": 30}));
        assert_eq!(overwrite.component.as_deref(), Some("sidebar"));

        let mut preserve = base.clone();
        preserve.merge(&incoming, MergeStrategy::Preserve);
        assert_eq!(preserve.data["a"], json!(1));
        assert_eq!(preserve.data["b"], json!(3));

        let mut deep = base.clone();
        deep.merge(&incoming, MergeStrategy::Deep);
        assert_eq!(deep.data["nested"], json!({"x": 1, "y": 20, "z": 30}));

        let mut append = base.clone();
        append.merge(&incoming, MergeStrategy::Append);
        assert_eq!(append.data["tags"], json!(["one", "two"]));
        assert_eq!(append.data["a"], json!([1, 2]));
    }

    #[test]
    fn test_remove_orphans_children_without_cascade() {
        let mut manager = ContextManager::default();
        let root = manager.insert_root(ErrorContext::new());
        let middle = manager.create_child(root, ErrorContext::new()).unwrap();
        let leaf = manager.create_child(middle, ErrorContext::new()).unwrap();

        let removed = manager.remove_child(root, middle, false).unwrap();
        assert_eq!(removed.id, middle);
        assert!(manager.get(middle).is_none());

        let orphan = manager.get(leaf).unwrap();
        assert_eq!(orphan.parent(), None);
        assert_eq!(orphan.depth(), 0);
        assert!(manager.get(root).unwrap().children().is_empty());
    }

    #[test]
    fn test_remove_cascade_deletes_subtree() {
        let mut manager = ContextManager::default();
        let root = manager.insert_root(ErrorContext::new());
        let middle = manager.create_child(root, ErrorContext::new()).unwrap();
        let leaf = manager.create_child(middle, ErrorContext::new()).unwrap();

        manager.remove(middle, true).unwrap();
        assert!(manager.get(leaf).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_add_child_rejects_cycles() {
        let mut manager = ContextManager::default();
        let root = manager.insert_root(ErrorContext::new());
        let child = manager.create_child(root, ErrorContext::new()).unwrap();

        assert!(manager.add_child(child, root).is_err());
        assert!(manager.add_child(root, root).is_err());
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut source = ContextManager::default();
        let root = source.insert_root(
            ErrorContext::for_operation("map", "bootstrap").with_data("zoom", 7),
        );
        source
            .create_child(root, ErrorContext::new().with_data("layer", "fire-districts"))
            .unwrap();
        source
            .create_child(root, ErrorContext::new().with_data("layer", "police"))
            .unwrap();

        let json = source.serialize(root).unwrap();

        let mut target = ContextManager::default();
        let restored = target.deserialize(&json).unwrap();
        let original = source.get(root).unwrap();
        let copy = target.get(restored).unwrap();

        assert_eq!(copy.data, original.data);
        assert_eq!(copy.depth(), original.depth());
        assert_eq!(copy.is_valid(), original.is_valid());
        assert_eq!(copy.children().len(), 2);
        assert_eq!(target.len(), 3);
        assert_eq!(target.serialize(restored).unwrap(), json);
    }

    #[test]
    fn test_deserialize_rejects_duplicates_and_garbage() {
        let mut manager = ContextManager::default();
        let root = manager.insert_root(ErrorContext::new());
        let json = manager.serialize(root).unwrap();

        assert!(manager.deserialize(&json).is_err());
        assert!(manager.deserialize("not json").is_err());
    }

    fn tree_with_child() -> Value {
        let mut source = ContextManager::default();
        let root = source.insert_root(ErrorContext::for_operation("map", "bootstrap"));
        source
            .create_child(root, ErrorContext::for_operation("map", "load_layers"))
            .unwrap();
        serde_json::from_str(&source.serialize(root).unwrap()).unwrap()
    }

    #[test]
    fn test_deserialize_rejects_repeated_ids_in_payload() {
        let mut tree = tree_with_child();
        tree["children"][0]["id"] = tree["id"].clone();

        let mut manager = ContextManager::default();
        let result = manager.deserialize(&tree.to_string());
        assert!(matches!(result, Err(ResilienceError::Serialization { .. })));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_depth() {
        let mut tree = tree_with_child();
        tree["children"][0]["depth"] = json!(7);

        let mut manager = ContextManager::default();
        assert!(manager.deserialize(&tree.to_string()).is_err());
        assert!(manager.is_empty());

        // The untouched payload still restores into a usable tree
        let root = manager.deserialize(&tree_with_child().to_string()).unwrap();
        let extra = manager.insert_root(ErrorContext::new());
        manager.add_child(root, extra).unwrap();
        assert_eq!(manager.get(extra).unwrap().depth(), 1);
        assert!(manager.add_child(extra, root).is_err());
    }

    #[test]
    fn test_operation_key_prefers_operation() {
        let ctx = ErrorContext::for_operation("sidebar", "fetchIncidents");
        assert_eq!(ctx.operation_key(), Some("fetchIncidents"));
        let ctx = ErrorContext::new().with_component("sidebar");
        assert_eq!(ctx.operation_key(), Some("sidebar"));
        assert_eq!(ErrorContext::new().operation_key(), None);
    }

    #[test]
    fn test_operation_key_skips_empty_operation() {
        let ctx = ErrorContext::for_operation("sidebar", "");
        assert_eq!(ctx.operation_key(), Some("sidebar"));
        let ctx = ErrorContext::for_operation("", "");
        assert_eq!(ctx.operation_key(), None);
    }
}
