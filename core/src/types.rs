//! Panel entities and the result envelope.
//!
//! # Design
//! Field sets are the union of what different panel releases send. Every
//! struct is `#[serde(default)]`, so a field a given release leaves out
//! decodes to its zero value. Structured and collection fields the panel may
//! double-encode are wrapped in `Adaptive`, which also decodes `null` as
//! empty; epoch fields use `PanelTime`.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::adaptive::Adaptive;
use crate::epoch::PanelTime;
use crate::error::{Error, Result};

/// The `{obj, success, msg}` wrapper around every endpoint response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    pub obj: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Turn `success: false` into `Error::Rejected`; otherwise yield the payload.
    pub fn into_result(self) -> Result<Option<T>> {
        if self.success {
            Ok(self.obj)
        } else {
            Err(Error::Rejected { msg: self.msg })
        }
    }
}

/// A proxy listener and its clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Inbound {
    pub id: u64,
    pub remark: String,
    pub listen: String,
    pub port: u16,
    pub protocol: String,
    pub settings: Adaptive<InboundSettings>,
    pub stream_settings: Adaptive<StreamSettings>,
    pub sniffing: Adaptive<serde_json::Value>,
    pub tag: String,
    pub enable: bool,
    pub expiry_time: PanelTime,
    pub total: i64,
    pub up: i64,
    pub down: i64,
    pub client_stats: Adaptive<Vec<ClientTraffic>>,
}

impl Inbound {
    /// The client with this email, if the inbound carries one.
    pub fn client_by_email(&self, email: &str) -> Option<&Client> {
        self.settings
            .clients
            .iter()
            .map(|c| &c.0)
            .find(|c| c.email == email)
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.settings.clients.iter().map(|c| &c.0)
    }
}

/// Contents of an inbound's `settings` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundSettings {
    /// The list and each entry may independently arrive string-wrapped.
    pub clients: Adaptive<Vec<Adaptive<Client>>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub decryption: String,
}

impl InboundSettings {
    /// Settings payload for add/update calls: exactly one literal client.
    pub fn single(client: Client) -> Self {
        Self {
            clients: Adaptive(vec![Adaptive(client)]),
            decryption: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamSettings {
    pub network: String,
    pub security: String,
    pub external_proxy: Adaptive<Vec<serde_json::Value>>,
    pub reality_settings: RealitySettings,
    pub tcp_settings: TcpSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RealitySettings {
    pub show: bool,
    pub xver: i32,
    pub dest: String,
    pub server_names: Adaptive<Vec<String>>,
    pub private_key: String,
    pub min_client: String,
    pub max_client: String,
    pub max_timediff: i64,
    pub short_ids: Adaptive<Vec<String>>,
    pub settings: RealityInnerSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RealityInnerSettings {
    pub public_key: String,
    pub fingerprint: String,
    pub server_name: String,
    pub spider_x: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TcpSettings {
    pub accept_proxy_protocol: bool,
    pub header: TcpHeader,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpHeader {
    #[serde(rename = "type")]
    pub kind: String,
}

/// A per-user credential and quota record inside an inbound's settings.
///
/// `inbound_id` is only known when the panel sends it; endpoints that act on
/// a client inside an inbound take the inbound id explicitly instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    pub email: String,
    pub enable: bool,
    pub flow: String,
    pub limit_ip: i64,
    #[serde(rename = "totalGB")]
    pub total_gb: i64,
    pub expiry_time: PanelTime,
    #[serde(deserialize_with = "string_or_number")]
    pub tg_id: String,
    pub sub_id: String,
    pub comment: String,
    pub reset: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound_id: Option<u64>,
    pub up: i64,
    pub down: i64,
    pub all_time: i64,
}

impl Client {
    /// A fresh, enabled client with a random UUID and subscription id.
    pub fn new(email: impl Into<String>) -> Self {
        let sub_id: String = Uuid::new_v4().simple().to_string().chars().take(16).collect();
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            enable: true,
            sub_id,
            ..Self::default()
        }
    }
}

/// Traffic counters the panel keeps per client email.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientTraffic {
    pub id: u64,
    pub inbound_id: u64,
    pub enable: bool,
    pub email: String,
    pub up: i64,
    pub down: i64,
    pub all_time: i64,
    pub expiry_time: PanelTime,
    pub total: i64,
    pub reset: i32,
    pub last_online: i64,
}

// `tgId` is a string on some releases and a number on others.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected string or number, got {other}"))),
    }
}
