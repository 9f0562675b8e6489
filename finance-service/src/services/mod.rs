pub mod advice;
pub mod database;
pub mod identity;
pub mod metrics;
pub mod plaid;
pub mod spending;
pub mod sync;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use spending::SpendingService;
pub use sync::{SyncError, SyncService};
