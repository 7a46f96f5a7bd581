pub mod certificates;
pub mod courses;
pub mod dashboards;
pub mod enrollments;
pub mod groups;
pub mod notifications;
pub mod points;
pub mod subscriptions;
pub mod users;

pub use certificates::*;
pub use courses::*;
pub use dashboards::*;
pub use enrollments::*;
pub use groups::*;
pub use notifications::*;
pub use points::*;
pub use subscriptions::*;
pub use users::*;
