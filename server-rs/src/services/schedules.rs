use std::collections::HashMap;

use crate::error::AppResult;
use crate::models::Schedule;
use crate::store::OncallStore;

/// All schedules of a team, with their recurring events.
pub async fn get_schedules(store: &dyn OncallStore, team_id: i64) -> AppResult<Vec<Schedule>> {
    store.schedules(team_id).await
}

/// Groups schedules by the name of the roster they rotate through.
pub fn by_roster(schedules: Vec<Schedule>) -> HashMap<String, Vec<Schedule>> {
    let mut grouped: HashMap<String, Vec<Schedule>> = HashMap::new();
    for schedule in schedules {
        grouped
            .entry(schedule.roster.clone())
            .or_default()
            .push(schedule);
    }
    grouped
}
