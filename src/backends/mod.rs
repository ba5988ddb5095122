//! The three backend strategies behind [`ContactRepository`](crate::ContactRepository).
//!
//! | backend  | substrate                         | change detection          |
//! |----------|-----------------------------------|---------------------------|
//! | push     | remote document collection        | server-pushed snapshots   |
//! | local    | one shared blob under one key     | synthesized signals       |
//! | polling  | remote endpoint without push      | fixed-interval refetch    |

mod local;
mod polling;
mod push;

pub use local::LocalRepository;
pub use polling::PollingRepository;
pub use push::PushRepository;

use crate::error::{DirectoryError, Result};
use crate::types::{sort_newest_first, Snapshot};
use tracing::{debug, error};

/// Turn a failed read into an empty snapshot, reporting it out of band.
pub(crate) fn recover_read(backend: &'static str, result: Result<Snapshot>) -> Snapshot {
    match result {
        Ok(mut contacts) => {
            sort_newest_first(&mut contacts);
            contacts
        }
        Err(e) => {
            let e = e.into_read();
            error!(backend, error = %e, "failed to fetch contacts");
            Vec::new()
        }
    }
}

/// Map a substrate write error to `WriteFailure`, logging it on the way out.
pub(crate) fn write_failed(backend: &'static str, op: &'static str, e: DirectoryError) -> DirectoryError {
    let e = e.into_write();
    error!(backend, op, error = %e, "contact write failed");
    e
}

/// Unknown ids on update/delete are ignored uniformly across backends.
pub(crate) fn log_missing(backend: &'static str, op: &'static str, id: &crate::types::ContactId) {
    debug!(backend, op, contact_id = %id, "contact not found, ignoring");
}
