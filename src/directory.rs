use crate::configuration::GroupConfig;
use crate::controller::NiceController;
use crate::error::{BlindsError, Result};
use crate::protocol::{ControllerGroup, DeviceId, DeviceInfo};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::*;

const CONTROLLER_GROUP_PREFIX: &str = "group:";
const ALL_BLINDS_GROUP: &str = "All Blinds";

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn squash(name: &str) -> String {
    normalize(name).replace(' ', "")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Device(DeviceInfo),
    Group {
        config: GroupConfig,
        members: Vec<DeviceInfo>,
    },
    ControllerGroup(ControllerGroup),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupVerification {
    pub group: String,
    pub found: Vec<DeviceInfo>,
    pub missing: Vec<MissingMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingMember {
    pub name: String,
    pub similar: Vec<String>,
}

/// Name and id lookup over one discovery pass
#[derive(Debug, Clone, Default)]
pub struct Directory {
    devices: Vec<DeviceInfo>,
    controller_groups: Vec<ControllerGroup>,
    groups: Vec<GroupConfig>,
}

impl Directory {
    pub fn new(
        devices: Vec<DeviceInfo>,
        controller_groups: Vec<ControllerGroup>,
        groups: Vec<GroupConfig>,
    ) -> Self {
        Self {
            devices,
            controller_groups,
            groups,
        }
    }

    /// Controller groups are optional, older firmware has no group list
    pub async fn discover(controller: &NiceController, groups: Vec<GroupConfig>) -> Result<Self> {
        let devices = controller.discover_devices().await?;
        let controller_groups = match controller.discover_groups().await {
            Ok(controller_groups) => controller_groups,
            Err(err) => {
                warn!("Group discovery failed, continuing without controller groups: {}", err);
                vec![]
            }
        };
        Ok(Self::new(devices, controller_groups, groups))
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn controller_groups(&self) -> &[ControllerGroup] {
        &self.controller_groups
    }

    pub fn groups(&self) -> &[GroupConfig] {
        &self.groups
    }

    /// Accepts a display name (case and surrounding whitespace ignored) or an `adr,ept` id
    pub fn device(&self, name_or_id: &str) -> Option<&DeviceInfo> {
        if let Ok(id) = name_or_id.parse::<DeviceId>() {
            if let Some(device) = self.devices.iter().find(|device| device.id == id) {
                return Some(device);
            }
        }
        let wanted = normalize(name_or_id);
        self.devices
            .iter()
            .find(|device| normalize(&device.name) == wanted)
    }

    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        let wanted = normalize(name);
        self.groups
            .iter()
            .find(|group| normalize(&group.name) == wanted)
    }

    pub fn controller_group(&self, num_or_name: &str) -> Option<&ControllerGroup> {
        let wanted = normalize(num_or_name);
        self.controller_groups
            .iter()
            .find(|group| group.num == num_or_name.trim())
            .or_else(|| {
                self.controller_groups
                    .iter()
                    .find(|group| normalize(&group.name) == wanted)
            })
    }

    pub fn group_members(&self, group: &GroupConfig) -> Vec<DeviceInfo> {
        group
            .devices
            .iter()
            .filter_map(|member| {
                let device = self.device(member);
                if device.is_none() {
                    warn!("Group {} member {:?} not found on controller", group.name, member);
                }
                device.cloned()
            })
            .collect()
    }

    pub fn resolve(&self, target: &str) -> Result<Target> {
        if let Some(group) = target.trim().strip_prefix(CONTROLLER_GROUP_PREFIX) {
            return self
                .controller_group(group)
                .cloned()
                .map(Target::ControllerGroup)
                .ok_or_else(|| BlindsError::UnknownTarget(target.to_owned()));
        }
        if let Some(group) = self.group(target) {
            let members = self.group_members(group);
            if members.is_empty() {
                return Err(BlindsError::EmptyGroup(group.name.clone()));
            }
            return Ok(Target::Group {
                config: group.clone(),
                members,
            });
        }
        self.device(target)
            .cloned()
            .map(Target::Device)
            .ok_or_else(|| BlindsError::UnknownTarget(target.to_owned()))
    }

    pub fn verify_groups(&self) -> Vec<GroupVerification> {
        self.groups
            .iter()
            .map(|group| {
                let mut found = vec![];
                let mut missing = vec![];
                for member in &group.devices {
                    match self.device(member) {
                        Some(device) => found.push(device.clone()),
                        None => missing.push(MissingMember {
                            name: member.clone(),
                            similar: self.similar_names(member),
                        }),
                    }
                }
                GroupVerification {
                    group: group.name.clone(),
                    found,
                    missing,
                }
            })
            .collect()
    }

    fn similar_names(&self, name: &str) -> Vec<String> {
        let wanted = squash(name);
        self.devices
            .iter()
            .filter(|device| squash(&device.name).contains(&wanted))
            .map(|device| device.name.clone())
            .collect()
    }

    /// "Office 1", "Office 2" become "Office Blinds"
    pub fn suggest_groups(&self) -> Vec<GroupConfig> {
        let mut by_prefix: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for device in &self.devices {
            if let Some(prefix) = numbered_prefix(&device.name) {
                by_prefix
                    .entry(prefix.to_owned())
                    .or_default()
                    .push(device.id.to_string());
            }
        }

        let mut groups: Vec<GroupConfig> = by_prefix
            .into_iter()
            .filter(|(_, devices)| devices.len() >= 2)
            .map(|(prefix, devices)| GroupConfig {
                name: format!("{} Blinds", prefix),
                devices,
                dispatch: Default::default(),
            })
            .collect();

        if self.devices.len() >= 3 {
            groups.push(GroupConfig {
                name: ALL_BLINDS_GROUP.to_owned(),
                devices: self
                    .devices
                    .iter()
                    .map(|device| device.id.to_string())
                    .collect(),
                dispatch: Default::default(),
            });
        }

        info!(
            "Auto-generated {} groups from {} devices",
            groups.len(),
            self.devices.len()
        );
        groups
    }
}

/// Prefix of `<letters and spaces> <digits>`
fn numbered_prefix(name: &str) -> Option<&str> {
    let (prefix, number) = name.trim().rsplit_once(char::is_whitespace)?;
    let prefix = prefix.trim_end();
    let is_number = !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    let is_word = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c.is_whitespace());
    (is_number && is_word).then_some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(adr: u32, ept: &str, name: &str) -> DeviceInfo {
        DeviceInfo {
            id: DeviceId {
                adr,
                ept: ept.to_owned(),
            },
            name: name.to_owned(),
            module: format!("Roller ({},{})", adr, ept),
            mac: String::new(),
        }
    }

    fn directory() -> Directory {
        Directory::new(
            vec![
                device(1, "0D", "Office 2"),
                device(1, "0E", "Office 1"),
                device(1, "01", "MBA 3"),
                device(1, "06", "MBA 1"),
                device(1, "19", "Living Room"),
            ],
            vec![ControllerGroup {
                num: "2".to_owned(),
                name: "Downstairs".to_owned(),
            }],
            vec![GroupConfig {
                name: "Office".to_owned(),
                devices: vec!["office 1".to_owned(), "1,0D".to_owned(), "Office 9".to_owned()],
                dispatch: Default::default(),
            }],
        )
    }

    #[test]
    fn device_lookup_by_name_and_id() {
        let directory = directory();
        assert_eq!(directory.device("  living room ").unwrap().id.ept, "19");
        assert_eq!(directory.device("1,0e").unwrap().name, "Office 1");
        assert!(directory.device("Kitchen").is_none());
    }

    #[test]
    fn resolve_targets() {
        let directory = directory();
        match directory.resolve("office").unwrap() {
            Target::Group { members, .. } => {
                let names: Vec<_> = members.iter().map(|member| member.name.as_str()).collect();
                assert_eq!(names, vec!["Office 1", "Office 2"]);
            }
            other => panic!("unexpected target {:?}", other),
        }
        assert!(matches!(
            directory.resolve("group:2").unwrap(),
            Target::ControllerGroup(_)
        ));
        assert!(matches!(
            directory.resolve("group:downstairs").unwrap(),
            Target::ControllerGroup(_)
        ));
        assert!(matches!(
            directory.resolve("MBA 1").unwrap(),
            Target::Device(_)
        ));
        assert!(matches!(
            directory.resolve("Kitchen"),
            Err(BlindsError::UnknownTarget(_))
        ));
        assert!(directory.resolve("group:7").is_err());
    }

    #[test]
    fn group_without_members_does_not_resolve() {
        let directory = Directory::new(
            directory().devices().to_vec(),
            vec![],
            vec![GroupConfig {
                name: "Kitchen".to_owned(),
                devices: vec!["Kitchen 1".to_owned(), "9,01".to_owned()],
                dispatch: Default::default(),
            }],
        );
        match directory.resolve("kitchen") {
            Err(BlindsError::EmptyGroup(name)) => assert_eq!(name, "Kitchen"),
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn verify_reports_missing_with_suggestions() {
        let report = directory().verify_groups();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].found.len(), 2);
        assert_eq!(report[0].missing.len(), 1);
        assert_eq!(report[0].missing[0].name, "Office 9");
        assert!(report[0].missing[0].similar.is_empty());

        let directory = Directory::new(
            directory().devices().to_vec(),
            vec![],
            vec![GroupConfig {
                name: "Living".to_owned(),
                devices: vec!["Living".to_owned()],
                dispatch: Default::default(),
            }],
        );
        let report = directory.verify_groups();
        assert_eq!(report[0].missing[0].similar, vec!["Living Room"]);
    }

    #[test]
    fn suggested_groups() {
        let groups = directory().suggest_groups();
        let names: Vec<_> = groups.iter().map(|group| group.name.as_str()).collect();
        assert_eq!(names, vec!["MBA Blinds", "Office Blinds", "All Blinds"]);
        assert_eq!(groups[0].devices, vec!["1,01", "1,06"]);
        assert_eq!(groups[2].devices.len(), 5);
    }

    #[test]
    fn numbered_prefixes() {
        assert_eq!(numbered_prefix("Office 12"), Some("Office"));
        assert_eq!(numbered_prefix("Living Room 2"), Some("Living Room"));
        assert_eq!(numbered_prefix("Living Room"), None);
        assert_eq!(numbered_prefix("R2 1"), None);
    }
}
