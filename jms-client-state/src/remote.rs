//! Remote-call delegate seam.
//!
//! Every state node stands for an object on the server side.  The
//! interception layer that talks to the server owns the real delegate
//! implementation; this crate only needs to know the object's id and how
//! to let go of it when the node closes.

use anyhow::Result;
use std::fmt;

/// Handle on the server-side counterpart of a client object.
///
/// # Contract:
/// - `remote_id()` is stable for the lifetime of the delegate
/// - `release()` is called exactly once, when the owning node closes, after
///   all of the node's children have been released
/// - a failing `release()` is logged and skipped; it never stops the close
///   of sibling nodes
pub trait RemoteDelegate: Send + Sync + fmt::Debug {
    /// Server-side object id this delegate routes calls to.
    fn remote_id(&self) -> u64;

    /// Drop the server-side object.
    fn release(&self) -> Result<()> {
        Ok(())
    }
}
