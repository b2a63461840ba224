use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Staff role as issued by the identity provider. `app_metadata.role` wins over
    /// the top-level claim, which Supabase sets to `authenticated` for every user.
    pub fn staff_role(&self) -> Option<String> {
        self.app_metadata
            .as_ref()
            .and_then(|meta| meta.get("role"))
            .and_then(|role| role.as_str())
            .map(str::to_string)
            .or_else(|| self.role.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn staff_role(&self) -> Option<StaffRole> {
        self.role.as_deref().and_then(|role| role.parse().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Admin,
    Doctor,
    Manager,
    Nurse,
}

impl StaffRole {
    /// Roles allowed to create, edit or delete clinical records.
    pub const WRITERS: &'static [StaffRole] = &[StaffRole::Admin, StaffRole::Doctor, StaffRole::Manager];

    /// Roles allowed to read clinical records.
    pub const READERS: &'static [StaffRole] = &[
        StaffRole::Admin,
        StaffRole::Doctor,
        StaffRole::Manager,
        StaffRole::Nurse,
    ];
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaffRole::Admin => write!(f, "admin"),
            StaffRole::Doctor => write!(f, "doctor"),
            StaffRole::Manager => write!(f, "manager"),
            StaffRole::Nurse => write!(f, "nurse"),
        }
    }
}

impl FromStr for StaffRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(StaffRole::Admin),
            "doctor" => Ok(StaffRole::Doctor),
            "manager" => Ok(StaffRole::Manager),
            "nurse" => Ok(StaffRole::Nurse),
            other => Err(format!("unknown staff role: {}", other)),
        }
    }
}
