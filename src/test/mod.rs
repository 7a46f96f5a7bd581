pub mod utils;

pub use utils::test_db;
pub use utils::test_utils;

mod catalog;
mod certificates;
mod sessions;
mod subscriptions;
