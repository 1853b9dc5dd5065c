//! Relational-with-temporal adapter (Oracle-class): the hardest adapter, and the template the
//! other SQL-shaped adapters follow. Rewrites the resolver-supplied query in three ordered,
//! purely textual passes (no SQL parser — see the Open Questions in the design notes) and
//! caches live connections keyed by `user@dsn`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::client_error::ClientError;
use crate::config::Config;
use crate::models::{HealthStatus, ResolvedSource, SourceType};

use super::{is_reserved_param, Adapter, FetchOptions, FetchOutput};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 1521;

/// Case-insensitive, word-bounded search for `word` in `s`. Returns the byte offset of the
/// match start.
fn find_word_ci(s: &str, word: &str) -> Option<usize> {
    let lower = s.to_ascii_lowercase();
    let needle = word.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut start = 0;
    while let Some(pos) = lower[start..].find(&needle) {
        let idx = start + pos;
        let before_ok = idx == 0 || !is_ident_byte(bytes[idx - 1]);
        let after_idx = idx + needle.len();
        let after_ok = after_idx >= bytes.len() || !is_ident_byte(bytes[after_idx]);
        if before_ok && after_ok {
            return Some(idx);
        }
        start = idx + 1;
    }
    None
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

const TERMINATORS: &[&str] = &["WHERE", "GROUP", "ORDER", "HAVING", "UNION", "FETCH"];

/// The earliest terminating-keyword (or `;`) offset at or after `from`.
fn first_terminator(s: &str, from: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    for kw in TERMINATORS {
        if let Some(idx) = find_word_ci(&s[from..], kw) {
            let abs = from + idx;
            best = Some(best.map_or(abs, |b| b.min(abs)));
        }
    }
    if let Some(pos) = s[from..].find(';') {
        let abs = from + pos;
        best = Some(best.map_or(abs, |b| b.min(abs)));
    }
    best
}

/// Insert `clause` immediately after the first table reference following `FROM`. No-op if
/// there is no `FROM` clause, or if the table reference is already followed by `AS OF`
/// (idempotence: re-running the rewrite on its own output is a no-op for this pass).
fn inject_temporal_clause(query: &str, clause: &str) -> String {
    let Some(from_idx) = find_word_ci(query, "FROM") else {
        return query.to_string();
    };
    let bytes = query.as_bytes();
    let mut i = from_idx + "FROM".len();
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let table_start = i;
    while i < bytes.len() && (is_ident_byte(bytes[i]) || bytes[i] == b'.') {
        i += 1;
    }
    if i == table_start {
        return query.to_string();
    }
    let rest = query[i..].trim_start();
    if rest.len() >= 5 && rest[..5].eq_ignore_ascii_case("as of") {
        return query.to_string();
    }
    format!("{} {}{}", &query[..i], clause, &query[i..])
}

/// Build the `AS OF ...` clause for a single `as_of`/`moniker_version` value: purely numeric
/// values are system-change-numbers, anything else is a timestamp literal.
fn temporal_clause(value: &str) -> String {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        format!("AS OF SCN {value}")
    } else {
        format!("AS OF TIMESTAMP TO_TIMESTAMP('{value}', 'YYYY-MM-DD HH24:MI:SS')")
    }
}

fn quote_sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn scalar_literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(quote_sql_string(s)),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        _ => None,
    }
}

/// Build one `k = v` / `k IN (...)` condition. Returns `None` when the value is null or an
/// empty sequence (an empty `IN ()` is never emitted; the filter is dropped instead).
fn condition_for(key: &str, value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return None;
            }
            let literals: Vec<String> = items.iter().filter_map(scalar_literal).collect();
            if literals.is_empty() {
                None
            } else {
                Some(format!("{key} IN ({})", literals.join(", ")))
            }
        }
        Value::Null => None,
        other => scalar_literal(other).map(|lit| format!("{key} = {lit}")),
    }
}

/// Collect candidate filter conditions from `moniker_params` (nested map) and top-level
/// parameter keys, excluding reserved keys and null values.
fn collect_conditions(params: &HashMap<String, Value>) -> Vec<String> {
    let mut conditions = Vec::new();
    if let Some(nested) = params.get("moniker_params").and_then(Value::as_object) {
        for (k, v) in nested {
            if let Some(cond) = condition_for(k, v) {
                conditions.push(cond);
            }
        }
    }
    for (k, v) in params {
        if is_reserved_param(k) {
            continue;
        }
        if let Some(cond) = condition_for(k, v) {
            conditions.push(cond);
        }
    }
    conditions
}

/// Insert collected filter conditions. If a `WHERE` already exists, splice the new conditions
/// in right after the keyword, ANDed with the original body; otherwise insert a new `WHERE`
/// before the earliest terminating keyword (or at the end).
fn inject_filters(query: &str, conditions: &[String]) -> String {
    if conditions.is_empty() {
        return query.to_string();
    }
    let joined = conditions.join(" AND ");

    if let Some(where_idx) = find_word_ci(query, "WHERE") {
        let insert_at = where_idx + "WHERE".len();
        if query[insert_at..].contains(joined.as_str()) {
            return query.to_string();
        }
        return format!("{} {} AND{}", &query[..insert_at], joined, &query[insert_at..]);
    }

    match first_terminator(query, 0) {
        Some(idx) => format!("{}WHERE {} {}", &query[..idx], joined, &query[idx..]),
        None => format!("{query} WHERE {joined}"),
    }
}

/// Append `FETCH FIRST n ROWS ONLY` unless the query already contains a `FETCH` token.
fn inject_limit(query: &str, limit: u64) -> String {
    if find_word_ci(query, "FETCH").is_some() {
        return query.to_string();
    }
    let trimmed = query.trim_end().trim_end_matches(';');
    format!("{trimmed} FETCH FIRST {limit} ROWS ONLY")
}

/// Run the three ordered rewrite passes: temporal injection, filter injection, limit injection.
/// With no reserved parameters, no `as_of`, and no `limit`, this is the identity on `query`.
pub fn rewrite_query(query: &str, params: &HashMap<String, Value>) -> String {
    let mut rewritten = query.to_string();

    let as_of = params
        .get("as_of")
        .or_else(|| params.get("moniker_version"))
        .and_then(Value::as_str);
    if let Some(value) = as_of {
        rewritten = inject_temporal_clause(&rewritten, &temporal_clause(value));
    }

    let conditions = collect_conditions(params);
    rewritten = inject_filters(&rewritten, &conditions);

    if let Some(limit) = params.get("limit").and_then(Value::as_u64) {
        rewritten = inject_limit(&rewritten, limit);
    }

    rewritten
}

fn compute_dsn(connection: &HashMap<String, Value>) -> String {
    if let Some(dsn) = connection.get("dsn").and_then(Value::as_str) {
        return dsn.to_string();
    }
    let host = connection.get("host").and_then(Value::as_str).unwrap_or(DEFAULT_HOST);
    let port = connection.get("port").and_then(Value::as_u64).unwrap_or(DEFAULT_PORT as u64);
    let service_name = connection.get("service_name").and_then(Value::as_str).unwrap_or("");
    format!("{host}:{port}/{service_name}")
}

/// Maps well-known `ORA-*` error codes embedded in a driver error's message to the semantic
/// error kinds in §4.5.1. Unrecognized codes propagate as a generic connection failure.
fn map_oracle_error(message: &str) -> ClientError {
    if message.contains("ORA-12541") {
        ClientError::connection_refused(format!("No listener at requested address: {message}"))
    } else if message.contains("ORA-01017") {
        ClientError::auth_failure(message.to_string())
    } else if message.contains("ORA-12170") {
        ClientError::Timeout {
            elapsed: std::time::Duration::ZERO,
            limit: std::time::Duration::ZERO,
        }
    } else if message.contains("ORA-00942") {
        ClientError::configuration(format!("query target missing: {message}"))
    } else {
        ClientError::connection_refused(message.to_string())
    }
}

pub struct RelationalAdapter {
    #[allow(dead_code)]
    config: Arc<Config>,
    #[cfg(feature = "oracle-driver")]
    connections: dashmap::DashMap<String, driver::CachedConnection>,
    #[cfg(feature = "oracle-driver")]
    bulkhead: crate::BulkheadPolicy,
}

impl RelationalAdapter {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            #[cfg(feature = "oracle-driver")]
            connections: dashmap::DashMap::new(),
            #[cfg(feature = "oracle-driver")]
            bulkhead: crate::BulkheadPolicy::new(16),
        }
    }

    /// Close every cached connection and clear the cache. Idempotent; per-connection close
    /// errors are swallowed.
    pub async fn close_connections(&self) {
        #[cfg(feature = "oracle-driver")]
        driver::close_all(&self.connections);
    }

    fn credentials(
        config: &Config,
        params: &HashMap<String, Value>,
    ) -> Result<(String, String), ClientError> {
        let user = params
            .get("oracle_user")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| config.credential("oracle", "user"))
            .ok_or_else(|| ClientError::auth_failure("no oracle user credential configured"))?;
        let password = params
            .get("oracle_password")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| config.credential("oracle", "password"))
            .ok_or_else(|| ClientError::auth_failure("no oracle password credential configured"))?;
        Ok((user, password))
    }
}

#[cfg(feature = "oracle-driver")]
mod driver {
    use super::*;
    use oracle::Connection;
    use std::sync::Mutex;

    pub type SharedConnection = Arc<Mutex<Connection>>;

    pub struct CachedConnection {
        pub conn: SharedConnection,
    }

    /// Probe a cached connection with a lightweight round trip; on failure the caller evicts
    /// the stale entry and opens a fresh one.
    fn probe(conn: &SharedConnection) -> bool {
        match conn.lock() {
            Ok(guard) => guard.query("SELECT 1 FROM DUAL", &[]).is_ok(),
            Err(_) => false,
        }
    }

    #[derive(Debug)]
    struct ConnectError(String);
    impl std::fmt::Display for ConnectError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for ConnectError {}

    pub async fn get_connection(
        adapter: &RelationalAdapter,
        dsn: &str,
        user: &str,
        password: &str,
    ) -> Result<SharedConnection, ClientError> {
        let key = format!("{user}@{dsn}");

        if let Some(entry) = adapter.connections.get(&key) {
            if probe(&entry.conn) {
                return Ok(entry.conn.clone());
            }
        }
        adapter.connections.remove(&key);

        let dsn = dsn.to_string();
        let user = user.to_string();
        let password = password.to_string();
        let result = adapter
            .bulkhead
            .execute(|| async move {
                tokio::task::spawn_blocking(move || Connection::connect(&user, &password, &dsn))
                    .await
                    .map_err(|e| ConnectError(e.to_string()))?
                    .map_err(|e| ConnectError(e.to_string()))
            })
            .await
            .map_err(|e| map_oracle_error(&e.to_string()))?;

        let shared: SharedConnection = Arc::new(Mutex::new(result));
        adapter.connections.insert(key, CachedConnection { conn: shared.clone() });
        Ok(shared)
    }

    pub fn close_all(connections: &dashmap::DashMap<String, CachedConnection>) {
        for entry in connections.iter() {
            if let Ok(guard) = entry.conn.lock() {
                let _ = guard.close();
            }
        }
        connections.clear();
    }

    pub fn run_query(
        conn: &SharedConnection,
        query: &str,
    ) -> Result<(Vec<String>, Vec<Map<String, Value>>), ClientError> {
        let guard = conn.lock().map_err(|_| ClientError::connection_refused("connection lock poisoned"))?;
        let rows = guard.query(query, &[]).map_err(|e| map_oracle_error(&e.to_string()))?;
        let columns: Vec<String> = rows.column_info().iter().map(|c| c.name().to_string()).collect();
        let mut out = Vec::new();
        for row_result in rows {
            let row = row_result.map_err(|e| map_oracle_error(&e.to_string()))?;
            let mut map = Map::new();
            for (idx, name) in columns.iter().enumerate() {
                let value: Option<String> = row.get(idx).ok();
                map.insert(name.clone(), value.map(Value::String).unwrap_or(Value::Null));
            }
            out.push(map);
        }
        Ok((columns, out))
    }
}

#[async_trait]
impl Adapter for RelationalAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::RelationalWithTemporal
    }

    #[cfg(not(feature = "oracle-driver"))]
    async fn fetch(
        &self,
        _binding: &ResolvedSource,
        _extra: &HashMap<String, Value>,
        _options: &FetchOptions,
    ) -> Result<FetchOutput, ClientError> {
        Err(ClientError::configuration(
            "relational-with-temporal adapter requires the `oracle-driver` feature",
        ))
    }

    #[cfg(feature = "oracle-driver")]
    async fn fetch(
        &self,
        binding: &ResolvedSource,
        _extra: &HashMap<String, Value>,
        options: &FetchOptions,
    ) -> Result<FetchOutput, ClientError> {
        use std::time::Instant;

        let query = binding
            .query
            .as_deref()
            .ok_or_else(|| ClientError::configuration("relational binding has no query"))?;
        let rewritten = rewrite_query(query, &binding.params);
        let dsn = compute_dsn(&binding.connection);
        let (user, password) = Self::credentials(&self.config, &binding.params)?;

        let started = Instant::now();
        let conn = driver::get_connection(self, &dsn, &user, &password).await?;
        let (columns, rows) = tokio::task::block_in_place(|| driver::run_query(&conn, &rewritten))?;
        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let row_count = rows.len() as u64;
        let data = Value::Array(rows.into_iter().map(Value::Object).collect());

        if options.return_result {
            Ok(FetchOutput::Result(crate::models::AdapterResult {
                data,
                row_count,
                columns,
                execution_time_ms,
                source_type: SourceType::RelationalWithTemporal,
                query_executed: Some(rewritten),
                truncated: false,
                metadata: HashMap::new(),
            }))
        } else {
            Ok(FetchOutput::Data(data))
        }
    }

    #[cfg(not(feature = "oracle-driver"))]
    async fn list_children(&self, _binding: &ResolvedSource) -> Vec<String> {
        Vec::new()
    }

    #[cfg(feature = "oracle-driver")]
    async fn list_children(&self, binding: &ResolvedSource) -> Vec<String> {
        let Ok((user, password)) = Self::credentials(&self.config, &binding.params) else {
            return Vec::new();
        };
        let dsn = compute_dsn(&binding.connection);
        let Ok(conn) = driver::get_connection(self, &dsn, &user, &password).await else {
            return Vec::new();
        };
        let query = format!(
            "SELECT table_name FROM user_tables WHERE table_name LIKE '{}%'",
            binding.sub_path.replace('\'', "''")
        );
        tokio::task::block_in_place(|| driver::run_query(&conn, &query))
            .ok()
            .map(|(_, rows)| {
                rows.into_iter()
                    .filter_map(|row| row.get("TABLE_NAME").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(not(feature = "oracle-driver"))]
    async fn health_check(&self, _binding: &ResolvedSource) -> HealthStatus {
        HealthStatus::unhealthy("relational-with-temporal adapter requires the `oracle-driver` feature")
    }

    #[cfg(feature = "oracle-driver")]
    async fn health_check(&self, binding: &ResolvedSource) -> HealthStatus {
        use std::time::Instant;

        let dsn = compute_dsn(&binding.connection);
        let (user, password) = match Self::credentials(&self.config, &binding.params) {
            Ok(c) => c,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };
        let started = Instant::now();
        let conn = match driver::get_connection(self, &dsn, &user, &password).await {
            Ok(c) => c,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };
        match tokio::task::block_in_place(|| driver::run_query(&conn, "SELECT 1 FROM DUAL")) {
            Ok(_) => {
                let mut details = HashMap::new();
                details.insert("dsn".to_string(), Value::String(dsn));
                HealthStatus::healthy(started.elapsed().as_secs_f64() * 1000.0, details)
            }
            Err(e) => HealthStatus::unhealthy(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn identity_with_no_reserved_params() {
        let query = "SELECT * FROM employees";
        let rewritten = rewrite_query(query, &HashMap::new());
        assert_eq!(rewritten, query);
    }

    #[test]
    fn temporal_and_filter_and_limit_compose_in_order() {
        let query = "SELECT * FROM employees";
        let p = params(&[
            ("as_of", Value::String("2024-01-15 10:30:00".into())),
            ("dept_id", Value::from(10)),
            ("limit", Value::from(100)),
        ]);
        let rewritten = rewrite_query(query, &p);
        assert_eq!(
            rewritten,
            "SELECT * FROM employees AS OF TIMESTAMP TO_TIMESTAMP('2024-01-15 10:30:00', 'YYYY-MM-DD HH24:MI:SS') WHERE dept_id = 10 FETCH FIRST 100 ROWS ONLY"
        );
    }

    #[test]
    fn numeric_as_of_is_treated_as_scn() {
        let query = "SELECT * FROM orders";
        let p = params(&[("as_of", Value::String("123456".into()))]);
        let rewritten = rewrite_query(query, &p);
        assert_eq!(rewritten, "SELECT * FROM orders AS OF SCN 123456");
    }

    #[test]
    fn rewriting_twice_is_idempotent_modulo_whitespace() {
        let query = "SELECT * FROM employees";
        let p = params(&[
            ("as_of", Value::String("2024-01-15 10:30:00".into())),
            ("dept_id", Value::from(10)),
            ("limit", Value::from(100)),
        ]);
        let once = rewrite_query(query, &p);
        let twice = rewrite_query(&once, &p);
        assert_eq!(once.split_whitespace().collect::<Vec<_>>(), twice.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn empty_sequence_filter_is_dropped_not_in_empty_parens() {
        let query = "SELECT * FROM t";
        let p = params(&[("ids", Value::Array(vec![]))]);
        let rewritten = rewrite_query(query, &p);
        assert_eq!(rewritten, query);
    }

    #[test]
    fn sequence_filter_emits_in_clause() {
        let query = "SELECT * FROM t";
        let p = params(&[("region", Value::Array(vec![Value::from("us"), Value::from("eu")]))]);
        let rewritten = rewrite_query(query, &p);
        assert!(
            rewritten == "SELECT * FROM t WHERE region IN ('us', 'eu')"
                || rewritten == "SELECT * FROM t WHERE region IN ('eu', 'us')"
        );
    }

    #[test]
    fn fetch_is_not_injected_when_already_present() {
        let query = "SELECT * FROM t FETCH FIRST 5 ROWS ONLY";
        let p = params(&[("limit", Value::from(50))]);
        let rewritten = rewrite_query(query, &p);
        assert_eq!(rewritten, query);
    }

    #[test]
    fn no_from_clause_leaves_temporal_unchanged() {
        let query = "SELECT 1 FROM DUAL".replace("FROM DUAL", "");
        let p = params(&[("as_of", Value::String("2024-01-01 00:00:00".into()))]);
        let rewritten = rewrite_query(&query, &p);
        assert_eq!(rewritten, query);
    }

    #[test]
    fn dsn_defaults_host_and_port() {
        let mut connection = HashMap::new();
        connection.insert("service_name".to_string(), Value::String("orcl".into()));
        assert_eq!(compute_dsn(&connection), "localhost:1521/orcl");
    }

    #[test]
    fn explicit_dsn_wins() {
        let mut connection = HashMap::new();
        connection.insert("dsn".to_string(), Value::String("custom:1522/svc".into()));
        connection.insert("host".to_string(), Value::String("ignored".into()));
        assert_eq!(compute_dsn(&connection), "custom:1522/svc");
    }

    #[test]
    fn known_ora_codes_map_to_semantic_errors() {
        assert!(matches!(
            map_oracle_error("ORA-12541: TNS:no listener"),
            ClientError::ConnectionRefused { .. }
        ));
        assert!(matches!(
            map_oracle_error("ORA-01017: invalid username/password"),
            ClientError::AuthenticationFailure { .. }
        ));
        assert!(matches!(map_oracle_error("ORA-00942: table or view does not exist"), ClientError::ConfigurationError { .. }));
    }
}
