//! Origin: split-precision coordinate model and origin rebasing.
//!
//! # Invariants
//! - Absolute positions never change on a rebase; only the origin used to
//!   derive local coordinates does.
//! - `coarse + fraction` always equals the total shift since session start.
//! - The origin is owned by a single [`OriginRebaser`]; everything else reads it.

mod coords;
mod rebaser;

pub use coords::OriginState;
pub use rebaser::{OriginListener, OriginRebaser, RebaseEvent};

pub fn crate_info() -> &'static str {
    "largemap-origin v0.1.0"
}
