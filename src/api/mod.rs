pub mod auth;
pub mod certificates;
pub mod courses;
pub mod dashboards;
pub mod enrollments;
pub mod groups;
pub mod leaderboard;
pub mod notifications;
pub mod subscriptions;

pub use auth::*;
pub use certificates::*;
pub use courses::*;
pub use dashboards::*;
pub use enrollments::*;
pub use groups::*;
pub use leaderboard::*;
pub use notifications::*;
pub use subscriptions::*;

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
