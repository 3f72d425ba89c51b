//! # Tidings Core
//!
//! Shared foundation for the Tidings workspace: configuration, the error
//! type, and the thread/schedule/block data model that the scheduler,
//! gathering executor, and gateway all agree on.

pub mod config;
pub mod error;
pub mod thread;

pub use config::TidingsConfig;
pub use error::{Result, TidingsError};
pub use thread::{BlockMode, ContentBlock, IntervalUnit, ScheduleSpec, Thread, TimeOfDay};
