//! Query definitions with named parameters, and continuation tokens.
//!
//! Queries are written with `@name` placeholders and a list of named
//! parameter values. Before execution the text is rewritten to SQLite's
//! numbered `?N` placeholders. Every placeholder must have a parameter and
//! every parameter must be used; `@` inside quoted literals or identifiers
//! is left alone.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use convo_core::store::document::{DocumentQuery, QueryOrder};
use convo_types::error::StoreError;

/// A bindable parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Text(String),
    Integer(i64),
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

/// Query text plus its named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDefinition {
    pub text: String,
    pub parameters: Vec<(String, QueryValue)>,
}

impl QueryDefinition {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a parameter. `name` must include the leading `@`.
    pub fn with_parameter(mut self, name: &str, value: impl Into<QueryValue>) -> Self {
        self.parameters.push((name.to_string(), value.into()));
        self
    }

    /// Rewrite `@name` placeholders to `?N` and return the values in bind order.
    pub fn compile(&self) -> Result<(String, Vec<QueryValue>), StoreError> {
        for (name, _) in &self.parameters {
            let valid = name.len() > 1
                && name.starts_with('@')
                && name[1..].chars().all(is_ident_char);
            if !valid {
                return Err(StoreError::validation(
                    "query",
                    format!("invalid parameter name '{name}'"),
                ));
            }
        }

        let mut out = String::with_capacity(self.text.len());
        let mut used = vec![false; self.parameters.len()];
        let mut quote: Option<char> = None;
        let mut chars = self.text.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            match (quote, c) {
                (Some(q), c) if c == q => {
                    quote = None;
                    out.push(c);
                }
                (Some(_), c) => out.push(c),
                (None, '\'' | '"') => {
                    quote = Some(c);
                    out.push(c);
                }
                (None, '@') => {
                    let mut end = start + 1;
                    while let Some(&(i, next)) = chars.peek() {
                        if !is_ident_char(next) {
                            break;
                        }
                        end = i + next.len_utf8();
                        chars.next();
                    }
                    let name = &self.text[start..end];
                    let Some(index) = self.parameters.iter().position(|(n, _)| n == name) else {
                        return Err(StoreError::validation(
                            "query",
                            format!("no value supplied for parameter '{name}'"),
                        ));
                    };
                    used[index] = true;
                    out.push_str(&format!("?{}", index + 1));
                }
                (None, c) => out.push(c),
            }
        }

        if let Some(index) = used.iter().position(|u| !u) {
            return Err(StoreError::validation(
                "query",
                format!("parameter '{}' is not used by the query", self.parameters[index].0),
            ));
        }

        let values = self.parameters.iter().map(|(_, v)| v.clone()).collect();
        Ok((out, values))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Render a backend-neutral query against a container table.
///
/// The query selects `limit` rows starting at `offset`; callers ask for one
/// row more than the page size to learn whether another page exists.
pub fn render_document_query(
    table: &str,
    query: &DocumentQuery,
    offset: i64,
    limit: i64,
) -> QueryDefinition {
    let distinct = if query.distinct { "DISTINCT " } else { "" };
    let mut text = format!("SELECT {distinct}seq, body, etag FROM \"{table}\" WHERE 1 = 1");
    let mut params: Vec<(&str, QueryValue)> = Vec::new();

    if let Some(pk) = &query.partition_key {
        text.push_str(" AND partition_key = @partitionKey");
        params.push(("@partitionKey", pk.as_str().into()));
    }
    if let Some(doc_type) = query.doc_type {
        text.push_str(" AND doc_type = @type");
        params.push(("@type", doc_type.as_str().into()));
    }
    match query.order {
        QueryOrder::Insertion => text.push_str(" ORDER BY seq"),
        QueryOrder::Timestamp => {
            text.push_str(" ORDER BY json_extract(body, '$.timestamp'), seq");
        }
    }
    text.push_str(" LIMIT @limit OFFSET @offset");

    params
        .into_iter()
        .fold(QueryDefinition::new(text), |def, (name, value)| {
            def.with_parameter(name, value)
        })
        .with_parameter("@limit", limit)
        .with_parameter("@offset", offset)
}

/// Render the id enumeration of one partition, in insertion order.
pub fn render_id_query(table: &str, partition_key: &str, offset: i64, limit: i64) -> QueryDefinition {
    QueryDefinition::new(format!(
        "SELECT id FROM \"{table}\" WHERE partition_key = @partitionKey \
         ORDER BY seq LIMIT @limit OFFSET @offset"
    ))
    .with_parameter("@partitionKey", partition_key)
    .with_parameter("@limit", limit)
    .with_parameter("@offset", offset)
}

const TOKEN_PREFIX: &str = "offset:";

/// Encode the offset of the next page as an opaque continuation token.
pub fn encode_continuation(offset: i64) -> String {
    URL_SAFE_NO_PAD.encode(format!("{TOKEN_PREFIX}{offset}"))
}

/// Decode a continuation token; `None` means the first page.
pub fn decode_continuation(token: Option<&str>) -> Result<i64, StoreError> {
    let Some(token) = token else {
        return Ok(0);
    };
    let malformed = || StoreError::validation("query", "malformed continuation token");
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| malformed())?;
    let text = String::from_utf8(bytes).map_err(|_| malformed())?;
    text.strip_prefix(TOKEN_PREFIX)
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .ok_or_else(malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_types::chat::PartitionKey;

    #[test]
    fn test_compile_rewrites_named_parameters() {
        let def = QueryDefinition::new("SELECT * FROM t WHERE a = @a AND b = @b AND c = @a")
            .with_parameter("@a", "x")
            .with_parameter("@b", 2_i64);
        let (sql, values) = def.compile().unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = ?1 AND b = ?2 AND c = ?1");
        assert_eq!(values, vec![QueryValue::Text("x".into()), QueryValue::Integer(2)]);
    }

    #[test]
    fn test_compile_ignores_at_in_literals() {
        let def = QueryDefinition::new("SELECT '@not' FROM \"t@x\" WHERE a = @a")
            .with_parameter("@a", "x");
        let (sql, _) = def.compile().unwrap();
        assert_eq!(sql, "SELECT '@not' FROM \"t@x\" WHERE a = ?1");
    }

    #[test]
    fn test_compile_handles_escaped_quote() {
        let def = QueryDefinition::new("SELECT 'it''s @fine' WHERE a = @a").with_parameter("@a", 1_i64);
        let (sql, _) = def.compile().unwrap();
        assert_eq!(sql, "SELECT 'it''s @fine' WHERE a = ?1");
    }

    #[test]
    fn test_compile_rejects_unknown_parameter() {
        let def = QueryDefinition::new("SELECT * FROM t WHERE a = @missing");
        assert!(matches!(def.compile(), Err(StoreError::Validation { .. })));
    }

    #[test]
    fn test_compile_rejects_unused_parameter() {
        let def = QueryDefinition::new("SELECT 1").with_parameter("@extra", 1_i64);
        let err = def.compile().unwrap_err();
        assert!(err.to_string().contains("@extra"));
    }

    #[test]
    fn test_compile_rejects_bad_parameter_name() {
        let def = QueryDefinition::new("SELECT 1 WHERE a = @a").with_parameter("a", 1_i64);
        assert!(def.compile().is_err());
    }

    #[test]
    fn test_render_sessions_query() {
        let def = render_document_query("conversations", &DocumentQuery::sessions(), 0, 101);
        let (sql, values) = def.compile().unwrap();
        assert!(sql.starts_with("SELECT DISTINCT seq, body, etag FROM \"conversations\""));
        assert!(sql.contains("doc_type = ?1"));
        assert!(!sql.contains("partition_key"));
        assert!(sql.contains("ORDER BY seq LIMIT ?2 OFFSET ?3"));
        assert_eq!(values[0], QueryValue::Text("Session".into()));
    }

    #[test]
    fn test_render_messages_query_orders_by_timestamp() {
        let query = DocumentQuery::messages(PartitionKey::from("s1"));
        let (sql, values) = render_document_query("c", &query, 10, 6).compile().unwrap();
        assert!(sql.contains("partition_key = ?1 AND doc_type = ?2"));
        assert!(sql.contains("ORDER BY json_extract(body, '$.timestamp'), seq"));
        assert_eq!(values[2], QueryValue::Integer(6));
        assert_eq!(values[3], QueryValue::Integer(10));
    }

    #[test]
    fn test_continuation_token_roundtrip_and_opacity() {
        let token = encode_continuation(200);
        assert!(!token.contains("200"));
        assert_eq!(decode_continuation(Some(&token)).unwrap(), 200);
        assert_eq!(decode_continuation(None).unwrap(), 0);
    }

    #[test]
    fn test_malformed_continuation_is_validation() {
        for bad in ["%%%", "bm90LWEtdG9rZW4", &URL_SAFE_NO_PAD.encode("offset:-5")] {
            assert!(matches!(
                decode_continuation(Some(bad)),
                Err(StoreError::Validation { .. })
            ));
        }
    }
}
