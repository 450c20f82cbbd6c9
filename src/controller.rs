use crate::configuration::ControllerConfig;
use crate::error::{BlindsError, Result};
use crate::protocol::{
    self, Command, ControllerGroup, DeviceId, DeviceInfo, DeviceRecord, DEVICE_COMMAND_PATH,
    DEVICE_LIST_PATH, GROUP_COMMAND_PATH, GROUP_LIST_PATH,
};
use crate::status::DeviceStatus;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;
use tracing::*;

#[derive(Debug, Clone)]
pub struct NiceController {
    http_client: Client,
    base_url: String,
    credentials: Option<(String, Secret<String>)>,
}

impl NiceController {
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        config.validate()?;
        let http_client = Client::builder().timeout(config.timeout()).build()?;

        let credentials = match (&config.username, &config.password) {
            (Some(username), Some(password))
                if !username.is_empty() && !password.expose_secret().is_empty() =>
            {
                debug!("Using basic auth (username: {})", username);
                Some((username.clone(), password.clone()))
            }
            _ => {
                warn!("No authentication configured");
                None
            }
        };

        let base_url = config.base_url.trim_end_matches('/').to_owned();
        debug!(
            "NiceController initialized (base_url: {}, timeout: {:?})",
            base_url,
            config.timeout()
        );

        Ok(Self {
            http_client,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let request = self.http_client.get(url);
        match &self.credentials {
            Some((username, password)) => {
                request.basic_auth(username, Some(password.expose_secret()))
            }
            None => request,
        }
    }

    async fn fetch_device_list(&self) -> Result<String> {
        debug!("Fetching device list from {}/{}", self.base_url, DEVICE_LIST_PATH);
        let response = self.get(DEVICE_LIST_PATH).send().await?;
        debug!("HTTP response received (status: {})", response.status());

        if response.status() == StatusCode::UNAUTHORIZED {
            error!("Authentication failed (401 Unauthorized)");
            return Err(BlindsError::Unauthorized);
        }

        let xml = response.error_for_status()?.text().await?;
        debug!("Received {} bytes of XML", xml.len());
        trace!("Device list XML:\n{}", xml);

        if protocol::looks_like_login_page(&xml) {
            error!("Received HTML/login page instead of XML. Check credentials.");
            return Err(BlindsError::LoginPage);
        }
        Ok(xml)
    }

    async fn device_records(&self) -> Result<Vec<DeviceRecord>> {
        let xml = self.fetch_device_list().await?;
        protocol::parse_device_list(&xml).map_err(|err| {
            error!("Failed to parse device list: {}", err);
            err
        })
    }

    /// Installed devices only
    #[instrument(skip(self))]
    pub async fn discover_devices(&self) -> Result<Vec<DeviceInfo>> {
        let records = self.device_records().await?;
        debug!("Found {} device elements in XML", records.len());

        let mut devices = vec![];
        for record in records.iter() {
            if !record.status.installed {
                debug!("Skipping {} ({}), not installed", record.name(), record.id);
                continue;
            }
            let device = DeviceInfo::from(record);
            debug!("Added device: {} (ID: {})", device.name, device.id);
            devices.push(device);
        }

        info!(
            "Device discovery complete: found {} installed devices",
            devices.len()
        );
        Ok(devices)
    }

    /// Enabled groups only
    #[instrument(skip(self))]
    pub async fn discover_groups(&self) -> Result<Vec<ControllerGroup>> {
        debug!("Fetching group list from {}/{}", self.base_url, GROUP_LIST_PATH);
        let xml = self
            .get(GROUP_LIST_PATH)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let groups = protocol::parse_group_list(&xml)?;
        info!(
            "Group discovery complete: found {} enabled groups",
            groups.len()
        );
        Ok(groups)
    }

    /// Status of every device in one request
    pub async fn device_statuses(&self) -> Result<HashMap<DeviceId, DeviceStatus>> {
        Ok(self
            .device_records()
            .await?
            .into_iter()
            .map(|record| (record.id, record.status))
            .collect())
    }

    pub async fn device_status(&self, device_id: &DeviceId) -> Result<Option<DeviceStatus>> {
        Ok(self.device_statuses().await?.remove(device_id))
    }

    #[instrument(skip(self))]
    pub async fn send_command(&self, device_id: &DeviceId, command: Command) -> Result<()> {
        info!("Sending command: {} to device: {}", command, device_id);
        let response = self
            .get(DEVICE_COMMAND_PATH)
            .query(&[
                ("adr", device_id.adr.to_string().as_str()),
                ("ept", device_id.ept.as_str()),
                ("cmd", command.code()),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|err| {
                error!("HTTP request failed for command '{}': {}", command, err);
                err
            })?;
        info!(
            "Command '{}' sent to device {} (status: {})",
            command,
            device_id,
            response.status()
        );
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn send_group_command(&self, group_num: &str, command: Command) -> Result<()> {
        info!("Sending group command: {} to group: {}", command, group_num);
        let data = command.group_data();
        let xml = self
            .get(GROUP_COMMAND_PATH)
            .query(&[("req", "R"), ("num", group_num), ("dat", data.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        match protocol::parse_command_result(&xml) {
            Ok(result) if result == "0" => {
                info!("Group command '{}' sent to group {}", command, group_num);
                Ok(())
            }
            Ok(result) => {
                warn!("Group command returned result: {}", result);
                Err(BlindsError::GroupCommandRejected {
                    num: group_num.to_owned(),
                    result,
                })
            }
            Err(err) => {
                warn!("Could not parse group command response: {}", err);
                Ok(())
            }
        }
    }

    /// Reachable means anything below a server error
    pub async fn test_connection(&self) -> bool {
        debug!("Testing connection to: {}", self.base_url);
        match self.http_client.get(&self.base_url).send().await {
            Ok(response) => {
                debug!("Connection test response: {}", response.status());
                response.status().as_u16() < 500
            }
            Err(err) => {
                error!("Connection test failed: {}", err);
                false
            }
        }
    }
}
