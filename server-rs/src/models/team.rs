use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::validation::{check_name, check_timezone};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub email: Option<String>,
    pub slack_channel: Option<String>,
    pub slack_channel_notifications: Option<String>,
    pub override_phone_number: Option<String>,
    pub scheduling_timezone: Option<String>,
    pub iris_plan: Option<String>,
    pub iris_enabled: bool,
    pub api_managed_roster: bool,
    #[serde(skip_serializing)]
    pub active: bool,
}

/// Edit of a team. Each field is `None` when the request leaves the column alone;
/// nullable columns use `Some(None)` to clear the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub slack_channel: Option<Option<String>>,
    pub slack_channel_notifications: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub scheduling_timezone: Option<String>,
    pub iris_plan: Option<Option<String>>,
    pub iris_enabled: Option<bool>,
    pub override_phone_number: Option<Option<String>>,
    pub api_managed_roster: Option<bool>,
}

fn text(body: &Value, key: &str) -> AppResult<Option<Option<String>>> {
    match body.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => Ok(Some(Some(s.clone()))),
        Some(_) => Err(AppError::BadRequest(format!("{key} must be a string"))),
    }
}

fn required_text(body: &Value, key: &str) -> AppResult<Option<String>> {
    match text(body, key)? {
        None => Ok(None),
        Some(Some(s)) => Ok(Some(s)),
        Some(None) => Err(AppError::BadRequest(format!("{key} cannot be null"))),
    }
}

fn boolean(body: &Value, key: &str) -> AppResult<Option<bool>> {
    match body.get(key) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(AppError::BadRequest(format!("{key} must be boolean"))),
    }
}

impl TeamPatch {
    /// Builds a patch from a raw request body, keeping only the editable
    /// columns and checking every value that is present.
    pub fn from_json(body: &Value, supported_timezones: &[String]) -> AppResult<Self> {
        if !body.is_object() {
            return Err(AppError::BadRequest("request body must be a JSON object".into()));
        }

        let patch = Self {
            name: required_text(body, "name")?,
            description: text(body, "description")?,
            slack_channel: text(body, "slack_channel")?,
            slack_channel_notifications: text(body, "slack_channel_notifications")?,
            email: text(body, "email")?,
            scheduling_timezone: required_text(body, "scheduling_timezone")?,
            iris_plan: text(body, "iris_plan")?,
            iris_enabled: boolean(body, "iris_enabled")?,
            override_phone_number: text(body, "override_phone_number")?,
            api_managed_roster: boolean(body, "api_managed_roster")?,
        };

        if let Some(name) = &patch.name {
            check_name("team", name)?;
        }
        if let Some(tz) = &patch.scheduling_timezone {
            check_timezone(tz, supported_timezones)?;
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The escalation plan that must be checked before applying, if any.
    pub fn plan_to_verify(&self) -> Option<&str> {
        match &self.iris_plan {
            Some(Some(plan)) if !plan.is_empty() => Some(plan),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTeam {
    pub name: String,
    pub scheduling_timezone: String,
    pub description: Option<String>,
    pub email: Option<String>,
    pub slack_channel: Option<String>,
    pub slack_channel_notifications: Option<String>,
    pub override_phone_number: Option<String>,
    pub iris_plan: Option<String>,
    pub iris_enabled: bool,
    pub api_managed_roster: bool,
}

impl NewTeam {
    pub fn from_json(body: &Value, supported_timezones: &[String]) -> AppResult<Self> {
        let patch = TeamPatch::from_json(body, supported_timezones)?;
        let name = patch
            .name
            .ok_or_else(|| AppError::BadRequest("name attribute missing from request".into()))?;
        let scheduling_timezone = patch.scheduling_timezone.ok_or_else(|| {
            AppError::BadRequest("scheduling_timezone attribute missing from request".into())
        })?;

        Ok(Self {
            name,
            scheduling_timezone,
            description: patch.description.flatten(),
            email: patch.email.flatten(),
            slack_channel: patch.slack_channel.flatten(),
            slack_channel_notifications: patch.slack_channel_notifications.flatten(),
            override_phone_number: patch.override_phone_number.flatten(),
            iris_plan: patch.iris_plan.flatten().filter(|p| !p.is_empty()),
            iris_enabled: patch.iris_enabled.unwrap_or(false),
            api_managed_roster: patch.api_managed_roster.unwrap_or(false),
        })
    }
}

/// Which optional sections `GetTeam` attaches to the base row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamField {
    Users,
    Admins,
    Services,
    Rosters,
}

impl TeamField {
    pub const ALL: [TeamField; 4] = [
        TeamField::Users,
        TeamField::Admins,
        TeamField::Services,
        TeamField::Rosters,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "users" => Some(TeamField::Users),
            "admins" => Some(TeamField::Admins),
            "services" => Some(TeamField::Services),
            "rosters" => Some(TeamField::Rosters),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            TeamField::Users => "users",
            TeamField::Admins => "admins",
            TeamField::Services => "services",
            TeamField::Rosters => "rosters",
        }
    }

    /// Parses a comma separated `fields` parameter. Absent means every field;
    /// unknown names are dropped.
    pub fn parse_list(raw: Option<&str>) -> Vec<Self> {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Self::ALL.to_vec();
        };
        let mut fields = Vec::new();
        for field in raw.split(',').filter_map(Self::parse) {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }
}
