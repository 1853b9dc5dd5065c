//! The moniker value type: an immutable, normalized path naming a dataset.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, RwLock};

use serde_json::Value;

use crate::client::{ReadOptions, WayfareClient};
use crate::client_error::ClientError;
use crate::config::Config;
use crate::models::{FetchResult, MetadataResult, ResolvedSource, SampleResult, SchemaInfo, TreeNode};

const SCHEME_PREFIX: &str = "moniker://";

/// An immutable, location-independent path naming a dataset.
///
/// Two monikers are equal iff their normalized paths are equal. Normalization strips the
/// optional `moniker://` scheme prefix and any leading/trailing `/` separators.
///
/// A Moniker optionally carries a reference to the client it resolves through. The reference
/// is a lookup only — the client owns nothing upstream of itself, and a Moniker's lifetime is
/// independent of the client's. If none is bound at construction, data operations fall back to
/// a process-default lazy singleton.
#[derive(Clone)]
pub struct Moniker {
    path: String,
    client: Option<Arc<WayfareClient>>,
}

impl Moniker {
    /// Construct from any string form: scheme-prefix tolerant, separator-trimmed.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self { path: Self::normalize(path.as_ref()), client: None }
    }

    /// Construct bound to a specific client, so data operations never touch the process-default
    /// singleton.
    pub fn with_client(path: impl AsRef<str>, client: Arc<WayfareClient>) -> Self {
        Self { path: Self::normalize(path.as_ref()), client: Some(client) }
    }

    fn normalize(raw: &str) -> String {
        let without_scheme = raw.strip_prefix(SCHEME_PREFIX).unwrap_or(raw);
        without_scheme.trim_matches('/').to_string()
    }

    /// The normalized path, with no leading/trailing separator.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The scheme-prefixed URI form.
    pub fn uri(&self) -> String {
        format!("{SCHEME_PREFIX}{}", self.path)
    }

    /// Navigate to an immediate or nested child path, preserving the bound client if any.
    pub fn child(&self, subpath: impl AsRef<str>) -> Self {
        let sub = subpath.as_ref().trim_matches('/');
        let path = if self.path.is_empty() {
            sub.to_string()
        } else {
            format!("{}/{}", self.path, sub)
        };
        Self { path: Self::normalize(&path), client: self.client.clone() }
    }

    /// The parent moniker, or `None` if this moniker has no ancestors (is at the root).
    pub fn parent(&self) -> Option<Self> {
        self.path
            .rfind('/')
            .map(|idx| Self { path: Self::normalize(&self.path[..idx]), client: self.client.clone() })
    }

    fn client(&self) -> Result<Arc<WayfareClient>, ClientError> {
        match &self.client {
            Some(client) => Ok(client.clone()),
            None => default_client(),
        }
    }

    pub async fn read(&self, options: ReadOptions) -> Result<Value, ClientError> {
        self.client()?.read(&self.path, options).await
    }

    pub async fn fetch(
        &self,
        limit: Option<u64>,
        extra: &HashMap<String, String>,
    ) -> Result<FetchResult, ClientError> {
        self.client()?.fetch(&self.path, limit, extra).await
    }

    pub async fn metadata(&self) -> Result<MetadataResult, ClientError> {
        self.client()?.metadata(&self.path).await
    }

    pub async fn sample(&self, limit: u64) -> Result<SampleResult, ClientError> {
        self.client()?.sample(&self.path, limit).await
    }

    pub async fn describe(&self) -> Result<Value, ClientError> {
        self.client()?.describe(&self.path).await
    }

    pub async fn resolve(&self) -> Result<ResolvedSource, ClientError> {
        self.client()?.resolve(&self.path).await
    }

    pub async fn lineage(&self) -> Result<Value, ClientError> {
        self.client()?.lineage(&self.path).await
    }

    pub async fn children(&self) -> Result<Vec<String>, ClientError> {
        self.client()?.list_children(Some(&self.path)).await
    }

    pub async fn tree(&self, depth: Option<u32>) -> Result<TreeNode, ClientError> {
        self.client()?.tree(Some(&self.path), depth).await
    }

    pub async fn schema(&self) -> Result<SchemaInfo, ClientError> {
        self.client()?.schema(&self.path).await
    }
}

impl fmt::Debug for Moniker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Moniker").field("path", &self.path).finish()
    }
}

impl fmt::Display for Moniker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

impl PartialEq for Moniker {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Moniker {}

impl Hash for Moniker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl From<&str> for Moniker {
    fn from(s: &str) -> Self {
        Moniker::new(s)
    }
}

impl From<String> for Moniker {
    fn from(s: String) -> Self {
        Moniker::new(s)
    }
}

fn default_client_slot() -> &'static RwLock<Option<Arc<WayfareClient>>> {
    static DEFAULT_CLIENT: OnceLock<RwLock<Option<Arc<WayfareClient>>>> = OnceLock::new();
    DEFAULT_CLIENT.get_or_init(|| RwLock::new(None))
}

/// Replace the process-default client used by unbound [`Moniker`]s and the free `read`/`fetch`/
/// `metadata` functions. Pass `None` to clear it and force lazy re-initialization from
/// [`Config::load`] on next use. Intended for tests.
pub fn set_default_client(client: Option<Arc<WayfareClient>>) {
    *default_client_slot().write().unwrap() = client;
}

fn default_client() -> Result<Arc<WayfareClient>, ClientError> {
    if let Some(client) = default_client_slot().read().unwrap().clone() {
        return Ok(client);
    }
    let mut slot = default_client_slot().write().unwrap();
    if let Some(client) = slot.clone() {
        return Ok(client);
    }
    let config = Config::load(None)?;
    let client = Arc::new(WayfareClient::new(config)?);
    *slot = Some(client.clone());
    Ok(client)
}

/// Resolve, dispatch to the adapter's `fetch`, and report telemetry, against the process-default
/// client.
pub async fn read(moniker: &str, options: ReadOptions) -> Result<Value, ClientError> {
    default_client()?.read(moniker, options).await
}

/// `GET /fetch/{path}` against the process-default client.
pub async fn fetch(
    moniker: &str,
    limit: Option<u64>,
    extra: &HashMap<String, String>,
) -> Result<FetchResult, ClientError> {
    default_client()?.fetch(moniker, limit, extra).await
}

/// `GET /metadata/{path}` against the process-default client.
pub async fn metadata(moniker: &str) -> Result<MetadataResult, ClientError> {
    default_client()?.metadata(moniker).await
}

/// `GET /describe/{path}` against the process-default client.
pub async fn describe(moniker: &str) -> Result<Value, ClientError> {
    default_client()?.describe(moniker).await
}

/// `GET /sample/{path}` against the process-default client.
pub async fn sample(moniker: &str, limit: u64) -> Result<SampleResult, ClientError> {
    default_client()?.sample(moniker, limit).await
}

/// `GET /lineage/{path}` against the process-default client.
pub async fn lineage(moniker: &str) -> Result<Value, ClientError> {
    default_client()?.lineage(moniker).await
}

/// `GET /children/{path}` against the process-default client.
pub async fn children(moniker: &str) -> Result<Vec<String>, ClientError> {
    default_client()?.list_children(Some(moniker)).await
}

/// `GET /tree` rooted at `moniker`, against the process-default client.
pub async fn tree(moniker: &str, depth: Option<u32>) -> Result<TreeNode, ClientError> {
    default_client()?.tree(Some(moniker), depth).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_and_separators() {
        let m = Moniker::new("moniker://sales/orders/");
        assert_eq!(m.path(), "sales/orders");
        assert_eq!(m.uri(), "moniker://sales/orders");
    }

    #[test]
    fn round_trip_through_uri_is_stable() {
        let m = Moniker::new("a/b/c");
        let round_tripped = Moniker::new(m.uri());
        assert_eq!(m.path(), round_tripped.path());
    }

    #[test]
    fn child_then_parent_recovers_original_path() {
        let m = Moniker::new("a/b");
        let child = m.child("c");
        assert_eq!(child.path(), "a/b/c");
        assert_eq!(child.parent().unwrap().path(), m.path());
    }

    #[test]
    fn root_has_no_parent() {
        let m = Moniker::new("root");
        assert!(m.parent().is_none());
    }

    #[test]
    fn equality_is_by_normalized_path() {
        assert_eq!(Moniker::new("a/b"), Moniker::new("moniker://a/b/"));
    }
}
