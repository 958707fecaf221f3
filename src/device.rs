//! Camera device discovery.
//!
//! Devices come from the account's home graph. Only entries that expose the
//! camera streaming trait and carry a Nest hardware model qualify. The upstream
//! order is preserved.

use serde::Deserialize;
use std::time::Duration;

use crate::auth::{AccessToken, TokenCache, HOMEGRAPH_SCOPE};
use crate::error::{Result, SyncError};

pub const CAMERA_STREAM_TRAIT: &str = "action.devices.traits.CameraStream";
pub const NEST_MODEL_MARKER: &str = "Nest";
pub const DEFAULT_HOME_GRAPH_URL: &str =
    "https://googlehomefoyer-pa.googleapis.com/$rpc/google.internal.home.foyer.v1.StructuresService/GetHomeGraph";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
}

/// Home graph response, JSON mapping of the foyer `GetHomeGraph` reply.
#[derive(Debug, Deserialize)]
pub struct HomeGraph {
    pub home: HomeGraphHome,
}

#[derive(Debug, Default, Deserialize)]
pub struct HomeGraphHome {
    #[serde(default)]
    pub devices: Vec<GraphDevice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDevice {
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub hardware: Hardware,
    #[serde(default)]
    pub device_info: DeviceInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct Hardware {
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default)]
    pub agent_info: AgentInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    #[serde(default)]
    pub unique_id: String,
}

impl GraphDevice {
    pub fn is_nest_camera(&self) -> bool {
        self.traits.iter().any(|t| t == CAMERA_STREAM_TRAIT)
            && self.hardware.model.contains(NEST_MODEL_MARKER)
    }
}

pub trait HomeGraphSource: Send {
    fn fetch(&mut self, token: &AccessToken) -> Result<HomeGraph>;
}

pub struct FoyerHomeGraph {
    agent: ureq::Agent,
    url: String,
}

impl FoyerHomeGraph {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: DEFAULT_HOME_GRAPH_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl HomeGraphSource for FoyerHomeGraph {
    fn fetch(&mut self, token: &AccessToken) -> Result<HomeGraph> {
        let response = self
            .agent
            .post(&self.url)
            .set("Authorization", &token.bearer_header())
            .set("Content-Type", "application/json")
            .send_string("{}")
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    SyncError::Discovery(format!("home graph returned HTTP {}", code))
                }
                ureq::Error::Transport(t) => {
                    SyncError::Discovery(format!("home graph unreachable: {}", t))
                }
            })?;
        let body = response
            .into_string()
            .map_err(|e| SyncError::Discovery(format!("failed to read home graph: {}", e)))?;
        parse_home_graph(&body)
    }
}

pub fn parse_home_graph(body: &str) -> Result<HomeGraph> {
    serde_json::from_str(body)
        .map_err(|e| SyncError::Discovery(format!("malformed home graph: {}", e)))
}

enum CatalogBackend {
    HomeGraph(Box<dyn HomeGraphSource>),
    Fixed(Vec<Device>),
}

pub struct DeviceCatalog {
    backend: CatalogBackend,
}

impl DeviceCatalog {
    pub fn from_home_graph(source: Box<dyn HomeGraphSource>) -> Self {
        Self {
            backend: CatalogBackend::HomeGraph(source),
        }
    }

    /// A catalog that always answers with the given devices, bypassing discovery.
    pub fn fixed(devices: Vec<Device>) -> Self {
        Self {
            backend: CatalogBackend::Fixed(devices),
        }
    }

    pub fn list_camera_devices(&mut self, tokens: &mut TokenCache) -> Result<Vec<Device>> {
        let source = match &mut self.backend {
            CatalogBackend::Fixed(devices) => return Ok(devices.clone()),
            CatalogBackend::HomeGraph(source) => source,
        };

        let token = tokens
            .access_token(HOMEGRAPH_SCOPE)
            .map_err(|e| SyncError::Discovery(format!("home graph token: {}", e)))?;
        let graph = source.fetch(&token).map_err(|e| match e {
            SyncError::Discovery(_) => e,
            other => SyncError::Discovery(other.to_string()),
        })?;

        let mut devices = Vec::new();
        for entry in graph.home.devices.iter().filter(|d| d.is_nest_camera()) {
            let id = entry.device_info.agent_info.unique_id.trim();
            if id.is_empty() {
                log::warn!(
                    "skipping camera '{}' without a unique id in the home graph",
                    entry.device_name
                );
                continue;
            }
            let device = Device {
                id: id.to_string(),
                name: entry.device_name.clone(),
            };
            log::info!("found nest device: {} ({})", device.name, device.id);
            devices.push(device);
        }
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"{
        "home": {
            "devices": [
                {
                    "deviceName": "Front Door",
                    "traits": ["action.devices.traits.CameraStream", "action.devices.traits.OnOff"],
                    "hardware": {"model": "Nest Doorbell (battery)"},
                    "deviceInfo": {"agentInfo": {"uniqueId": "cam-front"}}
                },
                {
                    "deviceName": "Kitchen Speaker",
                    "traits": ["action.devices.traits.Volume"],
                    "hardware": {"model": "Nest Mini"},
                    "deviceInfo": {"agentInfo": {"uniqueId": "spk-1"}}
                },
                {
                    "deviceName": "Other Brand Cam",
                    "traits": ["action.devices.traits.CameraStream"],
                    "hardware": {"model": "Acme Cam"},
                    "deviceInfo": {"agentInfo": {"uniqueId": "acme-1"}}
                },
                {
                    "deviceName": "Backyard",
                    "traits": ["action.devices.traits.CameraStream"],
                    "hardware": {"model": "Google Nest Cam (outdoor)"},
                    "deviceInfo": {"agentInfo": {"uniqueId": "cam-back"}}
                }
            ]
        }
    }"#;

    #[test]
    fn filter_requires_camera_trait_and_nest_model() {
        let graph = parse_home_graph(GRAPH).unwrap();
        let names: Vec<_> = graph
            .home
            .devices
            .iter()
            .filter(|d| d.is_nest_camera())
            .map(|d| d.device_name.as_str())
            .collect();
        assert_eq!(names, vec!["Front Door", "Backyard"]);
    }

    #[test]
    fn malformed_graph_is_discovery_error() {
        let err = parse_home_graph(r#"{"structures": []}"#).unwrap_err();
        assert!(matches!(err, SyncError::Discovery(_)));
        assert!(parse_home_graph("not json").is_err());
    }
}
