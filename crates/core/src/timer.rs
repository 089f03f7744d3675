//! Cancellable expiry handle for election timers
//!
//! The core never schedules anything itself. The transport schedules the
//! one-shot vote timer and attaches its handle to the election so that any
//! conclusion path can cancel it.

use std::fmt;

/// Handle to a scheduled one-shot task.
///
/// `cancel` must be idempotent and safe to call after the task has fired.
pub trait ExpiryHandle: Send + Sync + fmt::Debug {
    fn cancel(&self);
}
