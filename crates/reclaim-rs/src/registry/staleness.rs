//! Ready-made sweep predicates.
//!
//! Each helper returns a closure for [`Registry::collect_where`] or
//! [`Registry::sweep`](super::Registry::sweep). Combine them with ordinary
//! closure logic:
//!
//! ```ignore
//! let idle = idle_for(Duration::from_secs(60));
//! let images = of_type("image");
//! registry.collect_where(|r| images(r) && idle(r));
//! ```
//!
//! [`Registry::collect_where`]: super::Registry::collect_where

use std::time::Duration;

use super::ResourceInfo;
use super::naming::matches_type;

/// Entries never touched since registration.
pub fn untouched() -> impl Fn(&ResourceInfo) -> bool {
    |info| !info.touched()
}

/// Entries idle for at least `threshold`.
pub fn idle_for(threshold: Duration) -> impl Fn(&ResourceInfo) -> bool {
    move |info| info.idle >= threshold
}

/// Entries whose id carries the type tag `tag`.
pub fn of_type(tag: impl Into<String>) -> impl Fn(&ResourceInfo) -> bool {
    let tag = tag.into();
    move |info| matches_type(&info.id, &tag)
}
