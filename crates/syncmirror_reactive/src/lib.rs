//! # syncmirror Reactive
//!
//! Framework-neutral observable primitives for the syncmirror engine.
//!
//! This crate provides:
//! - [`Publisher`]: subscribe → handle, dispose or drop to unsubscribe,
//!   with immediate or debounced delivery and bounded waits
//! - [`Cell`]: a single observable value
//! - [`Collection`]: an identity-deduplicated observable array
//! - [`DispatchRegistry`]: centralized predicate dispatch for derived views
//!
//! ## Key invariants
//!
//! - Stored data changes synchronously; only notifications are debounced
//! - A debounce window delivers exactly the last value of a burst
//! - Dropping a subscription or registration handle always deregisters it

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cell;
mod collection;
mod dispatch;
mod publisher;

pub use cell::Cell;
pub use collection::{Collection, CollectionEvent};
pub use dispatch::{CacheChange, DispatchAction, DispatchRegistry, Registration};
pub use publisher::{NotifyMode, Publisher, Subscription};
