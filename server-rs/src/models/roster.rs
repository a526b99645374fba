use serde::Serialize;

use crate::models::schedule::Schedule;
use crate::policy::GoverningEvent;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Roster {
    pub id: i64,
    pub name: String,
}

/// One user's presence in a roster, with the team events that decide who may see it.
#[derive(Debug, Clone)]
pub struct MembershipRow {
    pub roster: String,
    pub user_id: i64,
    pub user: String,
    pub in_rotation: bool,
    pub events: Vec<GoverningEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterUser {
    pub name: String,
    pub in_rotation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterView {
    pub id: i64,
    pub users: Vec<RosterUser>,
    pub schedules: Vec<Schedule>,
}
