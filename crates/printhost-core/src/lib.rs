//! # printhost Core
//!
//! Core types and utilities for the printhost controller:
//! error taxonomy, the shared monotonic device clock, cooperative
//! cancellation, and the dual-frequency state dispatcher used by the
//! aggregators.

pub mod cancel;
pub mod clock;
pub mod dispatch;
pub mod error;

pub use cancel::CancelToken;
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use dispatch::{StateDispatcher, SubscriptionId};
pub use error::{Error, Result, ScheduleError, TransportError};
