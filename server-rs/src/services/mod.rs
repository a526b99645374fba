pub mod iris;
pub mod rosters;
pub mod schedules;
pub mod teams;
pub mod users;
