//! Core use-case services.
//!
//! # Responsibility
//! - Validate and normalize caller input above the repository layer.
//! - Map repository failures into `CoreError` kinds.
//! - Emit one structured log line per mutating operation.
//!
//! # Invariants
//! - Services never hold state across calls; every read goes to the store.
//! - Logged fields are ids, short ids and counts; never names or notes.

pub mod box_service;
pub mod custody_service;
pub mod error;
pub mod integrity_service;
pub mod item_service;
pub mod seed_service;
pub mod tree_materializer;

use crate::service::error::CoreError;
use log::{error, warn};

/// Logs a failed operation at a level matching its severity.
///
/// Rejections (not found, cycle, validation) are caller errors and log at
/// `warn`; store failures and detected corruption log at `error`.
pub(crate) fn log_failure(event: &str, module: &str, err: &CoreError) {
    match err {
        CoreError::Store(_) | CoreError::InvariantViolation(_) => error!(
            "event={event} module={module} status=error error_code={} error={err}",
            err.code()
        ),
        _ => warn!(
            "event={event} module={module} status=rejected error_code={}",
            err.code()
        ),
    }
}

/// Runs `op`, logging its failure under `event` before returning it.
pub(crate) fn logged<T>(
    event: &str,
    module: &str,
    op: impl FnOnce() -> Result<T, CoreError>,
) -> Result<T, CoreError> {
    op().inspect_err(|err| log_failure(event, module, err))
}
