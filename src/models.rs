//! Wire-decoded data records: the resolver's authoritative bindings and the typed,
//! server-side-thin decodes of its JSON responses.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a resolved binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Active,
    Deprecated,
    Draft,
}

/// Which concrete adapter a binding is executed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    RelationalWithTemporal,
    Warehouse,
    GenericSql,
    Http,
    Spreadsheet,
    Static,
}

/// Team/owner/secondary-ownership-point record attached to a binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ownership {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    /// "adop" in the source vocabulary: secondary data-ownership-point.
    #[serde(default)]
    pub adop: Option<String>,
}

/// The authoritative binding record returned by the resolver. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedSource {
    pub moniker: String,
    pub path: String,
    pub source_type: SourceType,
    pub connection: HashMap<String, Value>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default = "default_read_only")]
    pub read_only: bool,
    #[serde(default)]
    pub ownership: Ownership,
    pub binding_path: String,
    #[serde(default)]
    pub sub_path: String,
    #[serde(default)]
    pub status: Option<LifecycleStatus>,
    #[serde(default)]
    pub deprecation_message: Option<String>,
    #[serde(default)]
    pub successor: Option<String>,
    #[serde(default)]
    pub sunset_date: Option<String>,
    #[serde(default)]
    pub migration_guide: Option<String>,
    #[serde(default)]
    pub redirected_from: Option<String>,
}

fn default_read_only() -> bool {
    true
}

impl ResolvedSource {
    /// True when this binding is marked deprecated.
    pub fn is_deprecated(&self) -> bool {
        matches!(self.status, Some(LifecycleStatus::Deprecated))
    }
}

/// Thin decode of `GET /fetch/{path}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub moniker: String,
    pub path: String,
    pub source_type: SourceType,
    pub row_count: u64,
    pub columns: Vec<String>,
    pub data: Vec<Value>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub query_executed: Option<String>,
    #[serde(default)]
    pub execution_time_ms: Option<f64>,
}

/// Thin decode of `GET /metadata/{path}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataResult {
    pub moniker: String,
    pub path: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_profile: Option<Value>,
    #[serde(default)]
    pub temporal_coverage: Option<Value>,
    #[serde(default)]
    pub relationships: Option<Value>,
    #[serde(default)]
    pub sample_data: Option<Value>,
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub semantic_tags: Vec<String>,
    #[serde(default)]
    pub data_quality: Option<Value>,
    #[serde(default)]
    pub ownership: Option<Ownership>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub query_patterns: Option<Value>,
    #[serde(default)]
    pub cost_indicators: Option<Value>,
    #[serde(default)]
    pub nl_description: Option<String>,
    #[serde(default)]
    pub use_cases: Vec<String>,
}

/// Client-derived view over [`MetadataResult::schema`]; not a distinct wire endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub moniker: String,
    pub path: String,
    pub columns: Vec<Value>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub granularity: Option<String>,
    #[serde(default)]
    pub semantic_tags: Vec<String>,
    #[serde(default)]
    pub related_monikers: Vec<String>,
}

impl SchemaInfo {
    /// Derive a [`SchemaInfo`] from a fully-populated [`MetadataResult`].
    pub fn from_metadata(metadata: &MetadataResult) -> Self {
        let schema = metadata.schema.as_ref();
        let columns = schema
            .and_then(|s| s.get("columns"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let primary_key = schema
            .and_then(|s| s.get("primary_key"))
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let granularity = schema
            .and_then(|s| s.get("granularity"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let related_monikers = schema
            .and_then(|s| s.get("related_monikers"))
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Self {
            moniker: metadata.moniker.clone(),
            path: metadata.path.clone(),
            columns,
            primary_key,
            description: metadata.description.clone(),
            granularity,
            semantic_tags: metadata.semantic_tags.clone(),
            related_monikers,
        }
    }
}

/// Thin decode of `GET /sample/{path}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResult {
    pub moniker: String,
    pub path: String,
    pub source_type: SourceType,
    pub row_count: u64,
    pub columns: Vec<String>,
    pub data: Vec<Value>,
}

/// A node in the `/tree/{path}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub children: Vec<TreeNode>,
    #[serde(default)]
    pub ownership: Option<Ownership>,
    #[serde(default)]
    pub source_type: Option<SourceType>,
    #[serde(default)]
    pub has_source_binding: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl TreeNode {
    /// Render as a `└──`/`├──` ASCII tree, rooted at `self`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.name);
        out.push('\n');
        self.render_children(&mut out, "");
        out
    }

    fn render_children(&self, out: &mut String, prefix: &str) {
        let count = self.children.len();
        for (i, child) in self.children.iter().enumerate() {
            let last = i + 1 == count;
            let branch = if last { "└── " } else { "├── " };
            out.push_str(prefix);
            out.push_str(branch);
            out.push_str(&child.name);
            out.push('\n');
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            child.render_children(out, &child_prefix);
        }
    }
}

/// Thin decode of `GET /catalog/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub total_results: u64,
    pub results: Vec<Value>,
}

/// Thin decode of `GET /catalog/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_monikers: u64,
    #[serde(default)]
    pub by_status: HashMap<String, u64>,
    #[serde(default)]
    pub by_source_type: HashMap<String, u64>,
    #[serde(default)]
    pub by_classification: HashMap<String, u64>,
    #[serde(default)]
    pub ownership_coverage: Option<f64>,
}

/// The result of an adapter's `fetch`, carrying execution metadata alongside the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResult {
    pub data: Value,
    pub row_count: u64,
    pub columns: Vec<String>,
    pub execution_time_ms: f64,
    pub source_type: SourceType,
    #[serde(default)]
    pub query_executed: Option<String>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// The result of an adapter's `health_check`; MUST never be an `Err` — failures become
/// `healthy: false` with a descriptive message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub details: HashMap<String, Value>,
}

impl HealthStatus {
    pub fn healthy(latency_ms: f64, details: HashMap<String, Value>) -> Self {
        Self { healthy: true, message: None, latency_ms: Some(latency_ms), details }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self { healthy: false, message: Some(message.into()), latency_ms: None, details: HashMap::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_node_renders_last_branch_with_elbow() {
        let tree = TreeNode {
            path: "a".into(),
            name: "a".into(),
            children: vec![
                TreeNode { path: "a/b".into(), name: "b".into(), children: vec![], ownership: None, source_type: None, has_source_binding: false, description: None },
                TreeNode { path: "a/c".into(), name: "c".into(), children: vec![], ownership: None, source_type: None, has_source_binding: false, description: None },
            ],
            ownership: None,
            source_type: None,
            has_source_binding: false,
            description: None,
        };
        let rendered = tree.render();
        assert!(rendered.contains("├── b"));
        assert!(rendered.contains("└── c"));
    }

    #[test]
    fn deprecated_status_detected() {
        let src = ResolvedSource {
            moniker: "moniker://a".into(),
            path: "a".into(),
            source_type: SourceType::Http,
            connection: HashMap::new(),
            query: None,
            params: HashMap::new(),
            schema: None,
            read_only: true,
            ownership: Ownership::default(),
            binding_path: "a".into(),
            sub_path: String::new(),
            status: Some(LifecycleStatus::Deprecated),
            deprecation_message: Some("use new/path".into()),
            successor: Some("new/path".into()),
            sunset_date: None,
            migration_guide: None,
            redirected_from: None,
        };
        assert!(src.is_deprecated());
    }

    #[test]
    fn schema_info_derives_from_metadata_schema_json() {
        let metadata = MetadataResult {
            moniker: "moniker://a".into(),
            path: "a".into(),
            display_name: None,
            description: Some("desc".into()),
            data_profile: None,
            temporal_coverage: None,
            relationships: None,
            sample_data: None,
            schema: Some(serde_json::json!({
                "columns": [{"name": "id"}],
                "primary_key": ["id"],
                "granularity": "row",
                "related_monikers": ["a/b"]
            })),
            semantic_tags: vec!["pii".into()],
            data_quality: None,
            ownership: None,
            documentation: None,
            query_patterns: None,
            cost_indicators: None,
            nl_description: None,
            use_cases: vec![],
        };
        let schema = SchemaInfo::from_metadata(&metadata);
        assert_eq!(schema.primary_key, vec!["id".to_string()]);
        assert_eq!(schema.granularity.as_deref(), Some("row"));
        assert_eq!(schema.related_monikers, vec!["a/b".to_string()]);
    }
}
