pub mod backup;
pub mod catalog;
pub mod config;
pub mod cycle;
pub mod daemon;
pub mod error;
pub mod invoker;
pub mod logging;
pub mod report;
pub mod selector;
pub mod session;
pub mod sync;
pub mod trigger;

// re-export selected public API
pub use config::Config;
pub use cycle::{Cycle, CycleCommand, CycleReport};
pub use session::{ScheduleType, Session};
pub use sync::{SyncCoordinator, SyncResult, SyncState};
