use super::{Direction, Filter, Query, Row, Store};
use crate::error::{LeoError, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;

/// PostgREST client for a Supabase project.
pub struct SupabaseStore {
    base_url: String,
    api_key: String,
    client: Client,
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn rows_from(table: &str, resp: reqwest::blocking::Response) -> Result<Vec<Row>> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(LeoError::store(table, format!("HTTP {status}: {body}")));
        }
        match resp.json::<Value>()? {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(m) => Some(m),
                    _ => None,
                })
                .collect()),
            Value::Object(m) => Ok(vec![m]),
            _ => Ok(Vec::new()),
        }
    }
}

/// PostgREST query parameters for `query`, e.g.
/// `[("sd_id", "eq.abc"), ("order", "created_at.desc"), ("limit", "1")]`.
pub fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = Vec::new();
    for f in &query.filters {
        match f {
            Filter::Eq(col, v) => params.push((col.clone(), format!("eq.{}", param_value(v)))),
            Filter::Gte(col, v) => params.push((col.clone(), format!("gte.{}", param_value(v)))),
        }
    }
    if let Some((col, dir)) = &query.order {
        let dir = match dir {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        params.push(("order".to_string(), format!("{col}.{dir}")));
    }
    if let Some(n) = query.limit {
        params.push(("limit".to_string(), n.to_string()));
    }
    params
}

fn param_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

impl Store for SupabaseStore {
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(query_params(query));
        let resp = self
            .authed(self.client.get(self.table_url(table)))
            .query(&params)
            .send()?;
        Self::rows_from(table, resp)
    }

    fn insert(&self, table: &str, row: Row) -> Result<Row> {
        let resp = self
            .authed(self.client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(&Value::Object(row.clone()))
            .send()?;
        let mut rows = Self::rows_from(table, resp)?;
        Ok(if rows.is_empty() { row } else { rows.remove(0) })
    }

    fn update(&self, table: &str, query: &Query, fields: Row) -> Result<usize> {
        if query.filters.is_empty() {
            return Err(LeoError::store(table, "refusing unfiltered update"));
        }
        let resp = self
            .authed(self.client.patch(self.table_url(table)))
            .query(&query_params(query))
            .header("Prefer", "return=representation")
            .json(&Value::Object(fields))
            .send()?;
        Ok(Self::rows_from(table, resp)?.len())
    }
}
