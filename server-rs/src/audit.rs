use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgConnection;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    TeamCreated,
    TeamEdited,
    TeamDeleted,
    RosterCreated,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::TeamCreated => "team_created",
            AuditAction::TeamEdited => "team_edited",
            AuditAction::TeamDeleted => "team_deleted",
            AuditAction::RosterCreated => "roster_created",
        }
    }
}

/// An audit row waiting to be written next to the mutation it documents.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub team_name: String,
    pub action: AuditAction,
    pub owner: String,
    pub context: Value,
}

impl AuditEntry {
    pub fn new(team_name: &str, action: AuditAction, owner: &str, context: Value) -> Self {
        Self {
            team_name: team_name.to_string(),
            action,
            owner: owner.to_string(),
            context,
        }
    }

    /// Adds a key to the context, e.g. an id only known after the insert.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        if !self.context.is_object() {
            self.context = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.context {
            map.insert(key.to_string(), value);
        }
        self
    }
}

/// Appends the entry on the caller's connection. Pass the open transaction so
/// the audit row commits or rolls back with the mutation.
pub async fn record(conn: &mut PgConnection, entry: &AuditEntry, now: i64) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO audit (team_name, owner_name, action_name, context, timestamp) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&entry.team_name)
    .bind(&entry.owner)
    .bind(entry.action.as_str())
    .bind(&entry.context)
    .bind(now)
    .execute(conn)
    .await?;

    tracing::info!(
        team = %entry.team_name,
        owner = %entry.owner,
        action = entry.action.as_str(),
        "audit recorded"
    );
    Ok(())
}
