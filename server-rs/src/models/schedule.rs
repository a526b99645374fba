use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Schedule {
    pub id: i64,
    pub role: String,
    pub role_id: i64,
    pub roster: String,
    pub roster_id: i64,
    pub team: String,
    pub team_id: i64,
    pub timezone: Option<String>,
    pub advanced_mode: i32,
    pub auto_populate_threshold: i32,
    #[sqlx(skip)]
    pub events: Vec<ScheduleEvent>,
}

/// Offset into the rotation period and length of one recurring shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ScheduleEvent {
    pub start: i64,
    pub duration: i64,
}
