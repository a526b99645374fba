pub mod filter;
pub mod roster;
pub mod schedule;
pub mod team;
pub mod user;

pub use filter::*;
pub use roster::*;
pub use schedule::*;
pub use team::*;
pub use user::*;
