use crate::configuration::AppConfig;
use crate::controller::NiceController;
use crate::cover::{slug, BlindsCover, ControllerGroupCover, CoverGroup};
use crate::directory::Directory;
use crate::protocol::DeviceInfo;
use tracing::*;

/// Everything the bridge exposes, built once from discovery
#[derive(Debug, Clone)]
pub struct Bridge {
    pub covers: Vec<BlindsCover>,
    pub groups: Vec<CoverGroup>,
    pub controller_groups: Vec<ControllerGroupCover>,
    /// Every distinct cover behind `covers` and `groups`, including group
    /// members left out by the `devices` filter. This is what gets polled.
    pub tracked: Vec<BlindsCover>,
}

impl Bridge {
    pub fn build(controller: &NiceController, directory: &Directory, config: &AppConfig) -> Self {
        let move_time = config.covers.move_time();
        let new_cover =
            |info: &DeviceInfo| BlindsCover::new(info.clone(), controller.clone(), move_time);

        let covers: Vec<BlindsCover> = if config.devices.is_empty() {
            directory.devices().iter().map(new_cover).collect()
        } else {
            config
                .devices
                .iter()
                .filter_map(|selected| {
                    let device = directory.device(selected);
                    if device.is_none() {
                        warn!("Selected device {:?} not found on controller", selected);
                    }
                    device
                })
                .map(new_cover)
                .collect()
        };

        // group members share state with the exposed covers
        let mut tracked = covers.clone();
        let mut groups = vec![];
        for group in directory.groups() {
            let mut members = vec![];
            for info in directory.group_members(group) {
                let existing = tracked
                    .iter()
                    .find(|cover| cover.id() == &info.id)
                    .cloned();
                let member = match existing {
                    Some(cover) => cover,
                    None => {
                        debug!("Tracking {} for group {} only", info.name, group.name);
                        let cover = new_cover(&info);
                        tracked.push(cover.clone());
                        cover
                    }
                };
                members.push(member);
            }
            if members.is_empty() {
                warn!("Group {} has no members on controller, skipping", group.name);
                continue;
            }
            groups.push(CoverGroup::new(
                &group.name,
                members,
                group.dispatch,
                config.covers.group_command_delay(),
            ));
        }

        let controller_groups = directory
            .controller_groups()
            .iter()
            .cloned()
            .map(|group| ControllerGroupCover::new(group, controller.clone()))
            .collect();

        Self {
            covers,
            groups,
            controller_groups,
            tracked,
        }
    }

    /// Tracked covers that are not published on their own
    pub fn group_only_covers(&self) -> Vec<BlindsCover> {
        self.tracked
            .iter()
            .filter(|tracked| !self.covers.iter().any(|cover| cover.id() == tracked.id()))
            .cloned()
            .collect()
    }

    pub fn cover(&self, cover_slug: &str) -> Option<&BlindsCover> {
        self.covers
            .iter()
            .find(|cover| slug(cover.name()) == cover_slug)
    }

    pub fn group(&self, group_slug: &str) -> Option<&CoverGroup> {
        self.groups
            .iter()
            .find(|group| slug(group.name()) == group_slug)
    }

    pub fn controller_group(&self, num: &str) -> Option<&ControllerGroupCover> {
        self.controller_groups.iter().find(|group| group.num() == num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{ControllerConfig, GroupConfig};
    use crate::protocol::DeviceId;
    use crate::status::DeviceStatus;

    fn device(ept: &str, name: &str) -> DeviceInfo {
        DeviceInfo {
            id: DeviceId {
                adr: 1,
                ept: ept.to_owned(),
            },
            name: name.to_owned(),
            module: String::from("Roller"),
            mac: String::new(),
        }
    }

    fn office_group(devices: &[&str]) -> GroupConfig {
        GroupConfig {
            name: String::from("Office"),
            devices: devices.iter().map(|name| name.to_string()).collect(),
            dispatch: Default::default(),
        }
    }

    #[tokio::test]
    async fn group_members_outside_the_filter_are_tracked() {
        let controller = NiceController::new(&ControllerConfig::new("http://blinds.local")).unwrap();
        let directory = Directory::new(
            vec![
                device("01", "Office 1"),
                device("02", "Office 2"),
                device("03", "Hall"),
            ],
            vec![],
            vec![
                office_group(&["Office 1", "Office 2"]),
                GroupConfig {
                    name: String::from("Everything"),
                    devices: vec![String::from("Office 2"), String::from("Hall")],
                    dispatch: Default::default(),
                },
            ],
        );
        let config = AppConfig {
            devices: vec![String::from("Office 1")],
            ..Default::default()
        };

        let bridge = Bridge::build(&controller, &directory, &config);
        assert_eq!(bridge.covers.len(), 1);
        assert_eq!(bridge.groups.len(), 2);

        let tracked: Vec<_> = bridge.tracked.iter().map(|cover| cover.name()).collect();
        assert_eq!(tracked, vec!["Office 1", "Office 2", "Hall"]);
        let hidden: Vec<_> = bridge
            .group_only_covers()
            .iter()
            .map(|cover| cover.name().to_owned())
            .collect();
        assert_eq!(hidden, vec!["Office 2", "Hall"]);

        // one instance per device, shared between groups
        bridge.tracked[1]
            .apply_status(&DeviceStatus {
                sta: String::from("00"),
                pos: String::from("80"),
                inp: String::from("0"),
                installed: true,
            })
            .await;
        assert_eq!(bridge.groups[0].members()[1].state().await.position, Some(80));
        assert_eq!(bridge.groups[1].members()[0].state().await.position, Some(80));
    }

    #[test]
    fn groups_without_members_are_skipped() {
        let controller = NiceController::new(&ControllerConfig::new("http://blinds.local")).unwrap();
        let directory = Directory::new(
            vec![device("01", "Office 1")],
            vec![],
            vec![office_group(&["Kitchen"])],
        );
        let bridge = Bridge::build(&controller, &directory, &AppConfig::default());
        assert!(bridge.groups.is_empty());
        assert_eq!(bridge.tracked.len(), 1);
    }
}
