//! Scheduled removal of expired links.

use crate::{DeletionContext, DeletionOutcome, MediaService, SweepSchedule};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use insignia_core::LinkRecord;
use insignia_error::InsigniaResult;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What the sweeper is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum SweeperState {
    /// Waiting for the next run
    #[default]
    Idle,
    /// Looking for expired links
    Scanning,
    /// Removing the n-th expired link of the current run
    #[display("Deleting({_0})")]
    Deleting(usize),
}

/// Totals of one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    /// Expired links found
    pub examined: usize,
    /// Links removed by this run
    pub removed: usize,
    /// Blobs deleted because their last link went
    pub blobs_deleted: usize,
    /// Stored blobs without any link that were released
    pub unreferenced_released: usize,
    /// Entries that failed and were skipped
    pub failed: usize,
}

/// Periodically removes links whose expiry has passed.
///
/// Each expired link goes through the same deletion protocol as an explicit
/// delete. A failing entry is logged and counted, never propagated. A run
/// cut short is picked up by the next one, since expiry is re-evaluated from
/// the current time on every run.
///
/// After the links, each run releases stored blobs that no link references,
/// such as those left behind when a release failed after its link was
/// removed.
#[derive(Debug)]
pub struct ExpirySweeper {
    media: Arc<MediaService>,
    state: watch::Sender<SweeperState>,
}

impl ExpirySweeper {
    /// Create a sweeper in the `Idle` state.
    pub fn new(media: Arc<MediaService>) -> Self {
        let (state, _) = watch::channel(SweeperState::Idle);
        Self { media, state }
    }

    /// Current state.
    pub fn state(&self) -> SweeperState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SweeperState> {
        self.state.subscribe()
    }

    /// Sweep once, treating links with `expires_at < now` as expired.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        self.state.send_replace(SweeperState::Scanning);
        let mut report = SweepReport::default();

        let mut expired = std::pin::pin!(self.media.links().expired(now));
        while let Some(next) = expired.next().await {
            let link = match next {
                Ok(link) => link,
                Err(e) => {
                    tracing::warn!(error = %e, "Expiry scan failed; the next run resumes it");
                    report.failed += 1;
                    break;
                }
            };

            report.examined += 1;
            self.state.send_replace(SweeperState::Deleting(report.examined));

            match self.expire(&link, now).await {
                Ok(DeletionOutcome::Deleted { blob_deleted, .. }) => {
                    report.removed += 1;
                    if blob_deleted {
                        report.blobs_deleted += 1;
                    }
                }
                Ok(DeletionOutcome::AlreadyGone) => {}
                Err(e) => {
                    tracing::warn!(
                        media_class = %link.media_class(),
                        name = %link.name(),
                        error = %e,
                        "Failed to remove expired link"
                    );
                    report.failed += 1;
                }
            }
        }

        self.release_unreferenced(now, &mut report).await;

        self.state.send_replace(SweeperState::Idle);
        if report == SweepReport::default() {
            tracing::debug!("No expired links");
        } else {
            tracing::info!(
                examined = report.examined,
                removed = report.removed,
                blobs_deleted = report.blobs_deleted,
                unreferenced_released = report.unreferenced_released,
                failed = report.failed,
                "Sweep finished"
            );
        }
        report
    }

    async fn release_unreferenced(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let store = self.media.store();
        let mut unreferenced = std::pin::pin!(store.unreferenced(now));
        while let Some(next) = unreferenced.next().await {
            let blob = match next {
                Ok(blob) => blob,
                Err(e) => {
                    tracing::warn!(error = %e, "Unreferenced blob scan failed; the next run resumes it");
                    report.failed += 1;
                    break;
                }
            };

            match store.delete_if_unreferenced(blob.id(), 0).await {
                Ok(true) => report.unreferenced_released += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(blob_id = %blob.id(), error = %e, "Failed to release unreferenced blob");
                    report.failed += 1;
                }
            }
        }
    }

    /// Remove one expired link, unless it was rebound since the scan.
    async fn expire(&self, link: &LinkRecord, now: DateTime<Utc>) -> InsigniaResult<DeletionOutcome> {
        match self.media.links().resolve(link.media_class(), link.name()).await {
            Ok(current) if current.blob_id() == link.blob_id() && current.is_expired(now) => {}
            Ok(_) => {
                tracing::debug!(name = %link.name(), "Link was rebound since the scan");
                return Ok(DeletionOutcome::AlreadyGone);
            }
            Err(e) if e.is_link_not_found() => return Ok(DeletionOutcome::AlreadyGone),
            Err(e) => return Err(e),
        }

        self.media
            .remove_link(link.media_class(), link.name(), DeletionContext::Sweep)
            .await
    }

    /// Run the sweeper on `schedule` in a background task.
    ///
    /// Abort the returned handle to stop it.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the schedule can never fire.
    pub fn spawn(self: Arc<Self>, schedule: SweepSchedule) -> InsigniaResult<JoinHandle<()>> {
        schedule.validate()?;
        tracing::info!(?schedule, "Starting expiry sweeper");

        Ok(tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = schedule.next_after(now) else {
                    tracing::info!("Sweep schedule has no further runs");
                    break;
                };
                tracing::debug!(next_run = %next, "Waiting for next sweep");
                tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;

                self.run_once(Utc::now()).await;
            }
        }))
    }
}
