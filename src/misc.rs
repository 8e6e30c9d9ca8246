//! Miscilaneous *non core related* utilities

pub mod paths;
pub mod take;

pub use paths::RecordsPath;
pub use take::Take;

/// current unix time, in seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
