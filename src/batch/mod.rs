//! Batch driver.
//!
//! Walks the sample directory in id order, resumes from a marker, and
//! retries every sample a bounded number of times. Each attempt logs to
//! its own `out_<n>.txt` / `err_<n>.txt` pair in the sample output folder.

mod driver;
mod logs;
mod state;

pub use driver::{discover_samples, plan_samples, BatchDriver, BatchOptions, BatchReport};
pub use logs::AttemptLog;
pub use state::{AttemptTracker, SampleState, CLEANUP_INTERVAL, MAX_ATTEMPTS};
