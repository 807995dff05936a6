//! Blocking bridges between application threads and the event loop.
//!
//! Fax and SMS operations start with a command, then park the calling
//! thread on a completion gate until the matching hardware event posts
//! the outcome from the event worker.

pub mod fax;
pub mod sms;
