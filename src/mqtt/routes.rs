use super::router::RouteHandler;
use crate::{bridge::Bridge, protocol::Command};
use anyhow::Context;
use async_trait::async_trait;
use std::{str::from_utf8, sync::Arc};
use tokio::sync::mpsc::Sender;
use tracing::*;

/// `<base>/cover/<slug>/set` yields `<slug>`
fn entity_from_topic(topic: &str) -> anyhow::Result<&str> {
    topic
        .rsplit('/')
        .nth(1)
        .context("Failed to extract entity from topic")
}

fn parse_command(content: &[u8]) -> anyhow::Result<Command> {
    Ok(from_utf8(content)?.parse()?)
}

fn parse_position(content: &[u8]) -> anyhow::Result<u8> {
    let position: u8 = from_utf8(content)?
        .trim()
        .parse()
        .context("Position must be a number between 0 and 100")?;
    Ok(position.min(100))
}

fn request_refresh(refresh: &Sender<()>) {
    // a refresh already queued is good enough
    _ = refresh.try_send(());
}

pub struct CoverCommandHandler {
    bridge: Arc<Bridge>,
    refresh: Sender<()>,
}

impl CoverCommandHandler {
    pub fn new(bridge: Arc<Bridge>, refresh: Sender<()>) -> Box<Self> {
        Box::new(Self { bridge, refresh })
    }
}

#[async_trait]
impl RouteHandler for CoverCommandHandler {
    #[instrument(skip(self, content))]
    async fn call(&mut self, topic: &str, content: &[u8]) -> anyhow::Result<()> {
        let cover_slug = entity_from_topic(topic)?;
        let command = parse_command(content)?;
        info!("mqtt cover command {} for {}", command, cover_slug);

        let cover = self
            .bridge
            .cover(cover_slug)
            .with_context(|| format!("Unknown cover {}", cover_slug))?;

        if let Err(e) = cover.command(command).await {
            error!("Failed to send {} to {}: {}", command, cover.name(), e);
        }
        request_refresh(&self.refresh);
        Ok(())
    }
}

pub struct CoverPositionHandler {
    bridge: Arc<Bridge>,
    refresh: Sender<()>,
}

impl CoverPositionHandler {
    pub fn new(bridge: Arc<Bridge>, refresh: Sender<()>) -> Box<Self> {
        Box::new(Self { bridge, refresh })
    }
}

#[async_trait]
impl RouteHandler for CoverPositionHandler {
    #[instrument(skip(self, content))]
    async fn call(&mut self, topic: &str, content: &[u8]) -> anyhow::Result<()> {
        let cover_slug = entity_from_topic(topic)?;
        let position = parse_position(content)?;
        info!("mqtt cover position {} for {}", position, cover_slug);

        let cover = self
            .bridge
            .cover(cover_slug)
            .with_context(|| format!("Unknown cover {}", cover_slug))?
            .clone();

        // timed moves take seconds, keep the router responsive
        let refresh = self.refresh.clone();
        tokio::spawn(async move {
            if let Err(e) = cover.set_position(position).await {
                error!("Failed to set position of {}: {}", cover.name(), e);
            }
            request_refresh(&refresh);
        });
        request_refresh(&self.refresh);
        Ok(())
    }
}

pub struct GroupCommandHandler {
    bridge: Arc<Bridge>,
    refresh: Sender<()>,
}

impl GroupCommandHandler {
    pub fn new(bridge: Arc<Bridge>, refresh: Sender<()>) -> Box<Self> {
        Box::new(Self { bridge, refresh })
    }
}

#[async_trait]
impl RouteHandler for GroupCommandHandler {
    #[instrument(skip(self, content))]
    async fn call(&mut self, topic: &str, content: &[u8]) -> anyhow::Result<()> {
        let group_slug = entity_from_topic(topic)?;
        let command = parse_command(content)?;
        info!("mqtt group command {} for {}", command, group_slug);

        let group = self
            .bridge
            .group(group_slug)
            .with_context(|| format!("Unknown group {}", group_slug))?
            .clone();

        let refresh = self.refresh.clone();
        tokio::spawn(async move {
            let report = group.command(command).await;
            if !report.is_success() {
                warn!("Group {} failed members: {:?}", group.name(), report.failed);
            }
            request_refresh(&refresh);
        });
        Ok(())
    }
}

pub struct GroupPositionHandler {
    bridge: Arc<Bridge>,
    refresh: Sender<()>,
}

impl GroupPositionHandler {
    pub fn new(bridge: Arc<Bridge>, refresh: Sender<()>) -> Box<Self> {
        Box::new(Self { bridge, refresh })
    }
}

#[async_trait]
impl RouteHandler for GroupPositionHandler {
    #[instrument(skip(self, content))]
    async fn call(&mut self, topic: &str, content: &[u8]) -> anyhow::Result<()> {
        let group_slug = entity_from_topic(topic)?;
        let position = parse_position(content)?;
        info!("mqtt group position {} for {}", position, group_slug);

        let group = self
            .bridge
            .group(group_slug)
            .with_context(|| format!("Unknown group {}", group_slug))?
            .clone();

        let refresh = self.refresh.clone();
        tokio::spawn(async move {
            let report = group.set_position(position).await;
            if !report.is_success() {
                warn!("Group {} failed members: {:?}", group.name(), report.failed);
            }
            request_refresh(&refresh);
        });
        Ok(())
    }
}

pub struct ControllerGroupHandler {
    bridge: Arc<Bridge>,
    refresh: Sender<()>,
}

impl ControllerGroupHandler {
    pub fn new(bridge: Arc<Bridge>, refresh: Sender<()>) -> Box<Self> {
        Box::new(Self { bridge, refresh })
    }
}

#[async_trait]
impl RouteHandler for ControllerGroupHandler {
    #[instrument(skip(self, content))]
    async fn call(&mut self, topic: &str, content: &[u8]) -> anyhow::Result<()> {
        let num = entity_from_topic(topic)?;
        let command = parse_command(content)?;
        info!("mqtt controller group command {} for group {}", command, num);

        let group = self
            .bridge
            .controller_group(num)
            .with_context(|| format!("Unknown controller group {}", num))?;

        if let Err(e) = group.command(command).await {
            error!("Failed to send {} to group {}: {}", command, group.name(), e);
        }
        request_refresh(&self.refresh);
        Ok(())
    }
}

pub struct RefreshHandler {
    refresh: Sender<()>,
}

impl RefreshHandler {
    pub fn new(refresh: Sender<()>) -> Box<Self> {
        Box::new(Self { refresh })
    }
}

#[async_trait]
impl RouteHandler for RefreshHandler {
    #[instrument(skip(self, _content))]
    async fn call(&mut self, _topic: &str, _content: &[u8]) -> anyhow::Result<()> {
        info!("mqtt refresh request");
        request_refresh(&self.refresh);
        Ok(())
    }
}
