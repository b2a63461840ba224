use thiserror::Error;

/// Postgres SQLSTATE codes surfaced by PostgREST in the `code` field.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DatabaseError {
    /// Classify a non-success PostgREST response from its status and body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let code = parsed
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(|c| c.as_str())
            .unwrap_or_default();
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());

        match (status, code) {
            (_, UNIQUE_VIOLATION) => DatabaseError::UniqueViolation(message),
            (_, FOREIGN_KEY_VIOLATION) => DatabaseError::ForeignKeyViolation(message),
            (401 | 403, _) => DatabaseError::Auth(message),
            (404, _) => DatabaseError::NotFound(message),
            _ => DatabaseError::Api { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn classifies_constraint_violations_by_sqlstate() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint \"patients_email_key\""}"#;
        assert_matches!(DatabaseError::from_response(409, body), DatabaseError::UniqueViolation(msg) if msg.contains("patients_email_key"));

        let body = r#"{"code":"23503","message":"insert or update on table \"appointments\" violates foreign key constraint"}"#;
        assert_matches!(DatabaseError::from_response(409, body), DatabaseError::ForeignKeyViolation(_));
    }

    #[test]
    fn falls_back_to_status_classification() {
        assert_matches!(DatabaseError::from_response(401, "JWT expired"), DatabaseError::Auth(msg) if msg == "JWT expired");
        assert_matches!(DatabaseError::from_response(404, "{}"), DatabaseError::NotFound(_));
        assert_matches!(DatabaseError::from_response(500, "boom"), DatabaseError::Api { status: 500, .. });
    }
}
