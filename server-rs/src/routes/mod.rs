pub mod auth;
pub mod health;
pub mod rosters;
pub mod teams;
pub mod users;
