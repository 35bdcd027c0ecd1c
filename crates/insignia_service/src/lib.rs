//! Services of the Insignia media store.
//!
//! This crate wires the classifier, content store and link table into the
//! exposed operations:
//!
//! - [`MediaService`]: StoreMedia, RetrieveMedia, DeleteMedia and the
//!   deletion protocol shared with the sweeper
//! - [`ExpirySweeper`]: scheduled removal of expired links
//! - [`TemplateService`]: template backgrounds and placeholder metadata
//!
//! Transient failures are retried through a bounded [`RetryPolicy`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod media;
mod render;
mod retry;
mod schedule;
mod sweeper;
mod template;

pub use media::{DeletionContext, DeletionOutcome, MediaService, PreparedMedia, StoredMedia};
pub use render::PlaceholderMockRenderer;
pub use retry::RetryPolicy;
pub use schedule::{SweepSchedule, DEFAULT_SWEEP_CRON};
pub use sweeper::{ExpirySweeper, SweepReport, SweeperState};
pub use template::TemplateService;
