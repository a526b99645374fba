use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub full_name: Option<String>,
    pub time_zone: Option<String>,
    pub photo_url: Option<String>,
    pub active: bool,
    pub god: bool,
    #[sqlx(skip)]
    pub contacts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub id: Option<i64>,
    pub names: Option<Vec<String>>,
}

impl UserFilter {
    pub fn by_name(name: &str) -> Self {
        Self {
            names: Some(vec![name.to_string()]),
            ..Self::default()
        }
    }

    pub fn by_names(names: Vec<String>) -> Self {
        Self {
            names: Some(names),
            ..Self::default()
        }
    }

    pub fn matches(&self, id: i64, name: &str) -> bool {
        self.id.map_or(true, |want| want == id)
            && self
                .names
                .as_ref()
                .map_or(true, |names| names.iter().any(|n| n == name))
    }
}

/// Profile fields read from a directory entry on login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryProfile {
    pub full_name: Option<String>,
    /// Contact mode (email, call, sms, im, ...) -> destination.
    pub contacts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub user_name: String,
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
}
