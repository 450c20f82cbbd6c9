use crate::configuration::Dispatch;
use crate::controller::NiceController;
use crate::error::{BlindsError, Result};
use crate::protocol::{Command, ControllerGroup, DeviceId, DeviceInfo};
use crate::status::{self, CoverState, DeviceStatus, Motion};
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinSet};
use tracing::*;

/// Topic friendly version of a display name
pub fn slug(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// A single blind with an optimistic copy of its last known state
#[derive(Debug, Clone)]
pub struct BlindsCover {
    info: DeviceInfo,
    controller: NiceController,
    move_time: Duration,
    state: Arc<Mutex<CoverState>>,
}

impl BlindsCover {
    pub fn new(info: DeviceInfo, controller: NiceController, move_time: Duration) -> Self {
        Self {
            info,
            controller,
            move_time,
            state: Arc::new(Mutex::new(CoverState::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn id(&self) -> &DeviceId {
        &self.info.id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub async fn state(&self) -> CoverState {
        *self.state.lock().await
    }

    async fn set_motion(&self, motion: Motion) {
        self.state.lock().await.motion = motion;
    }

    pub async fn apply_status(&self, status: &DeviceStatus) {
        self.state.lock().await.apply(status);
    }

    /// Refresh from the controller, unknown devices keep their cached state
    pub async fn update(&self) -> Result<()> {
        match self.controller.device_status(self.id()).await? {
            Some(status) => self.apply_status(&status).await,
            None => warn!("{} ({}) missing from device list", self.name(), self.id()),
        }
        Ok(())
    }

    async fn moving(&self, command: Command, motion: Motion) -> Result<()> {
        self.set_motion(motion).await;
        if let Err(err) = self.controller.send_command(self.id(), command).await {
            error!("Error sending {} to {}: {}", command, self.name(), err);
            self.set_motion(Motion::Idle).await;
            return Err(err);
        }
        Ok(())
    }

    pub async fn open(&self) -> Result<()> {
        info!("Opening blinds: {}", self.name());
        self.moving(Command::Open, Motion::Opening).await
    }

    pub async fn close(&self) -> Result<()> {
        info!("Closing blinds: {}", self.name());
        self.moving(Command::Close, Motion::Closing).await
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping blinds: {}", self.name());
        let result = self.controller.send_command(self.id(), Command::Stop).await;
        self.set_motion(Motion::Idle).await;
        result
    }

    pub async fn command(&self, command: Command) -> Result<()> {
        match command {
            Command::Open => self.open().await,
            Command::Close => self.close().await,
            Command::Stop => self.stop().await,
        }
    }

    /// Timed move: run towards the target for the share of `move_time` it
    /// needs, then stop. The controller has no absolute position command.
    pub async fn set_position(&self, position: u8) -> Result<()> {
        let target = position.min(100);
        let current = self.state().await.position.unwrap_or(0);
        info!(
            "Setting blinds {} to position: {} (from {})",
            self.name(),
            target,
            current
        );

        if target == current {
            debug!("{} already at {}", self.name(), target);
            return Ok(());
        }

        let result = self.timed_move(current, target).await;
        let mut state = self.state.lock().await;
        state.motion = Motion::Idle;
        if result.is_ok() {
            // assumed until the next poll says otherwise
            state.position = Some(target);
        }
        result
    }

    async fn timed_move(&self, current: u8, target: u8) -> Result<()> {
        let (command, motion) = if target > current {
            (Command::Open, Motion::Opening)
        } else {
            (Command::Close, Motion::Closing)
        };
        self.set_motion(motion).await;
        self.controller.send_command(self.id(), command).await?;

        let distance = target.abs_diff(current) as f64 / 100.0;
        tokio::time::sleep(self.move_time.mul_f64(distance)).await;

        self.controller.send_command(self.id(), Command::Stop).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupReport {
    pub attempted: usize,
    pub failed: Vec<String>,
}

impl GroupReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupAction {
    Command(Command),
    Position(u8),
}

impl GroupAction {
    async fn run(self, cover: &BlindsCover) -> Result<()> {
        match self {
            GroupAction::Command(command) => cover.command(command).await,
            GroupAction::Position(position) => cover.set_position(position).await,
        }
    }
}

/// Client side group, every member gets its own command
#[derive(Debug, Clone)]
pub struct CoverGroup {
    name: String,
    members: Vec<BlindsCover>,
    dispatch: Dispatch,
    command_delay: Duration,
}

impl CoverGroup {
    pub fn new(
        name: &str,
        members: Vec<BlindsCover>,
        dispatch: Dispatch,
        command_delay: Duration,
    ) -> Self {
        Self {
            name: name.to_owned(),
            members,
            dispatch,
            command_delay,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[BlindsCover] {
        &self.members
    }

    pub async fn state(&self) -> CoverState {
        let mut states = Vec::with_capacity(self.members.len());
        for member in &self.members {
            states.push(member.state().await);
        }
        status::aggregate(&states)
    }

    pub async fn command(&self, command: Command) -> GroupReport {
        info!(
            "Sending {} to group: {} ({} members)",
            command,
            self.name,
            self.members.len()
        );
        self.dispatch(GroupAction::Command(command)).await
    }

    pub async fn set_position(&self, position: u8) -> GroupReport {
        info!(
            "Setting group {} to position: {} ({} members)",
            self.name,
            position,
            self.members.len()
        );
        self.dispatch(GroupAction::Position(position)).await
    }

    async fn dispatch(&self, action: GroupAction) -> GroupReport {
        match self.dispatch {
            Dispatch::Sequential => self.dispatch_sequential(action).await,
            Dispatch::Parallel => self.dispatch_parallel(action).await,
        }
    }

    async fn dispatch_sequential(&self, action: GroupAction) -> GroupReport {
        let mut report = GroupReport::default();
        for (index, member) in self.members.iter().enumerate() {
            if index > 0 && !self.command_delay.is_zero() {
                // controller drops commands that arrive back to back
                tokio::time::sleep(self.command_delay).await;
            }
            report.attempted += 1;
            if let Err(err) = action.run(member).await {
                error!("Error on {} in group {}: {}", member.name(), self.name, err);
                report.failed.push(member.name().to_owned());
            }
        }
        report
    }

    async fn dispatch_parallel(&self, action: GroupAction) -> GroupReport {
        let mut tasks = JoinSet::new();
        for (index, member) in self.members.iter().cloned().enumerate() {
            tasks.spawn(async move { (index, action.run(&member).await) });
        }

        let mut report = GroupReport::default();
        let mut finished = vec![false; self.members.len()];
        while let Some(joined) = tasks.join_next().await {
            report.attempted += 1;
            match joined {
                Ok((index, result)) => {
                    finished[index] = true;
                    if let Err(err) = result {
                        let member = &self.members[index];
                        error!("Error on {} in group {}: {}", member.name(), self.name, err);
                        report.failed.push(member.name().to_owned());
                    }
                }
                Err(err) => error!("Group {} task failed: {}", self.name, err),
            }
        }

        // members whose task died never reported back
        for (member, finished) in self.members.iter().zip(finished) {
            if !finished {
                report.failed.push(member.name().to_owned());
            }
        }
        report
    }
}

/// Group kept by the controller, moved by a single hardware synchronised command
#[derive(Debug, Clone)]
pub struct ControllerGroupCover {
    group: ControllerGroup,
    controller: NiceController,
}

impl ControllerGroupCover {
    pub fn new(group: ControllerGroup, controller: NiceController) -> Self {
        Self { group, controller }
    }

    pub fn name(&self) -> &str {
        &self.group.name
    }

    pub fn num(&self) -> &str {
        &self.group.num
    }

    pub async fn command(&self, command: Command) -> Result<()> {
        self.controller
            .send_group_command(&self.group.num, command)
            .await
    }

    pub fn set_position(&self, _position: u8) -> Result<()> {
        Err(BlindsError::PositionUnsupported(self.group.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs() {
        assert_eq!(slug("Living Room"), "living_room");
        assert_eq!(slug(" MBA 3 "), "mba_3");
    }

    #[test]
    fn empty_report_is_success() {
        assert!(GroupReport::default().is_success());
    }
}
