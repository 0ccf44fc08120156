//! # praxis-notify
//!
//! Notification state for the practitioner surface:
//!
//! - [`NotificationApi`]: the REST endpoints the poller depends on, with
//!   the production client [`RestNotificationApi`]
//! - [`NotificationCache`]: watch-backed snapshot storage with
//!   whole-value replacement
//! - [`NotificationPoller`]: two decoupled polling loops (full list on a
//!   long interval, unread count on a short one) plus
//!   acknowledge-then-refetch read-state mutations

#![deny(unsafe_code)]

pub mod api;
pub mod cache;
pub mod errors;
pub mod poller;

pub use api::{NotificationApi, RestNotificationApi};
pub use cache::{NotificationCache, NotificationSnapshot};
pub use errors::NotifyError;
pub use poller::{NotificationPoller, PollIntervals};
