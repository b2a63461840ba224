use std::fmt::Display;

/// Builder for PostgREST resource paths (`/rest/v1/<table>?col=op.value&...`).
#[derive(Debug, Clone)]
pub struct PostgrestQuery {
    table: String,
    params: Vec<(String, String)>,
}

impl PostgrestQuery {
    pub fn table(name: &str) -> Self {
        Self {
            table: name.to_string(),
            params: Vec::new(),
        }
    }

    pub fn select(self, columns: &str) -> Self {
        self.param("select", columns)
    }

    /// Adds a `column=op.value` filter, e.g. `filter("start_at", "lte", ts)`.
    pub fn filter(self, column: &str, op: &str, value: impl Display) -> Self {
        let value = format!("{}.{}", op, value);
        self.param(column, &value)
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn order(self, spec: &str) -> Self {
        self.param("order", spec)
    }

    pub fn limit(self, limit: u32) -> Self {
        self.param("limit", &limit.to_string())
    }

    pub fn offset(self, offset: u32) -> Self {
        self.param("offset", &offset.to_string())
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(&self) -> String {
        if self.params.is_empty() {
            return format!("/rest/v1/{}", self.table);
        }

        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("/rest/v1/{}?{}", self.table, query)
    }
}

/// Builds an `(a.ilike."*term*",b.ilike."*term*")` disjunction for an `or` filter.
/// The term is double-quoted so commas and parentheses in user input stay literal.
pub fn ilike_any(columns: &[&str], term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('"', "\\\"");
    let clauses = columns
        .iter()
        .map(|column| format!("{}.ilike.\"*{}*\"", column, escaped))
        .collect::<Vec<_>>()
        .join(",");
    format!("({})", clauses)
}
