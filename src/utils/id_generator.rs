//! Id generation for runs, triggers, checkpoints, and node-invocation tasks.
//!
//! A single helper keeps the id format consistent across every id-kind this
//! crate mints, generalizing the teacher's ad hoc `Uuid::new_v4()`
//! call-sites into one place.

use uuid::Uuid;

/// A fresh random v4 UUID, stringified.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A fresh random v4 UUID.
#[must_use]
pub fn new_uuid() -> Uuid {
    Uuid::new_v4()
}
