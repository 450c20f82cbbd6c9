use crate::controller::NiceController;
use crate::cover::{BlindsCover, CoverGroup};
use crate::error::Result;
use crate::status::CoverState;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::MissedTickBehavior;
use tracing::*;

/// Receives fresh state after every poll
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn cover_state(&self, cover: &BlindsCover, state: &CoverState) -> anyhow::Result<()>;
    async fn group_state(&self, group: &CoverGroup, state: &CoverState) -> anyhow::Result<()>;
}

pub struct StatusPoller {
    controller: NiceController,
    covers: Vec<BlindsCover>,
    groups: Vec<CoverGroup>,
    /// Refreshed for group aggregates, never published on their own
    group_only: Vec<BlindsCover>,
    interval: Option<Duration>,
}

impl StatusPoller {
    pub fn new(
        controller: NiceController,
        covers: Vec<BlindsCover>,
        groups: Vec<CoverGroup>,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            controller,
            covers,
            groups,
            group_only: vec![],
            interval,
        }
    }

    pub fn with_group_only_covers(mut self, covers: Vec<BlindsCover>) -> Self {
        self.group_only = covers;
        self
    }

    /// One device list fetch refreshes every cover. Returns how many covers were found.
    pub async fn poll_once(&self) -> Result<usize> {
        let statuses = self.controller.device_statuses().await?;
        let mut refreshed = 0;
        for cover in self.covers.iter().chain(&self.group_only) {
            if let Some(status) = statuses.get(cover.id()) {
                cover.apply_status(status).await;
                refreshed += 1;
            } else {
                warn!("{} ({}) missing from device list", cover.name(), cover.id());
            }
        }
        debug!(
            "Refreshed {}/{} covers",
            refreshed,
            self.covers.len() + self.group_only.len()
        );
        Ok(refreshed)
    }

    pub async fn publish(&self, sink: &dyn StateSink) {
        for cover in &self.covers {
            let state = cover.state().await;
            if let Err(e) = sink.cover_state(cover, &state).await {
                error!("Failed to publish state of {}: {:?}", cover.name(), e);
            }
        }
        for group in &self.groups {
            let state = group.state().await;
            if let Err(e) = sink.group_state(group, &state).await {
                error!("Failed to publish state of group {}: {:?}", group.name(), e);
            }
        }
    }

    /// Polls on every tick and whenever something arrives on `refresh`.
    /// Without an interval only refresh requests trigger a poll.
    /// Failed polls keep the last known state.
    pub async fn run(self, sink: impl StateSink, mut refresh: Receiver<()>) {
        let mut ticker = self.interval.map(|interval| {
            info!("Polling controller every {:?}", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = async {
                    match ticker.as_mut() {
                        Some(ticker) => {
                            ticker.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => (),
                Some(()) = refresh.recv() => debug!("Refresh requested"),
            }
            if let Err(e) = self.poll_once().await {
                error!("Status poll failed: {}", e);
            }
            self.publish(&sink).await;
        }
    }
}
