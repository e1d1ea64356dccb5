//! Endpoint catalogue for inbounds and clients.
//!
//! # Design
//! Each endpoint is split into a `build_*` function that produces an
//! `HttpRequest` without touching the network, and a `Session` method that
//! executes it and decodes the `ApiResponse` envelope. The builders carry the
//! whole method/path/body contract and are what the unit tests check.
//!
//! Operations on a client inside an inbound take the inbound id explicitly;
//! a `Client` decoded from an inbound's settings does not reliably know it.

use url::form_urlencoded;

use crate::error::{Error, Result};
use crate::http::{HttpRequest, RequestBody};
use crate::links;
use crate::session::Session;
use crate::types::{ApiResponse, Client, ClientTraffic, Inbound, InboundSettings};

/// Envelope of endpoints whose `obj` carries nothing of interest.
pub type MessageResponse = ApiResponse<serde_json::Value>;

/// Percent-encode caller data used as one path segment.
fn segment(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

pub fn build_list_inbounds() -> HttpRequest {
    HttpRequest::get("/inbounds/list")
}

pub fn build_get_inbound(inbound_id: u64) -> HttpRequest {
    HttpRequest::get(&format!("/inbounds/get/{inbound_id}"))
}

pub fn build_reset_all_traffic() -> HttpRequest {
    HttpRequest::post("/inbounds/resetAllTraffics", RequestBody::Empty)
}

pub fn build_reset_inbound_client_traffic(inbound_id: u64) -> HttpRequest {
    HttpRequest::post(
        &format!("/inbounds/resetAllClientTraffics/{inbound_id}"),
        RequestBody::Empty,
    )
}

pub fn build_delete_inbound(inbound_id: u64) -> HttpRequest {
    HttpRequest::post(&format!("/inbounds/del/{inbound_id}"), RequestBody::Empty)
}

pub fn build_delete_depleted_clients(inbound_id: u64) -> HttpRequest {
    HttpRequest::post(
        &format!("/inbounds/delDepletedClients/{inbound_id}"),
        RequestBody::Empty,
    )
}

pub fn build_client_traffic_by_email(email: &str) -> HttpRequest {
    HttpRequest::get(&format!("/inbounds/getClientTraffics/{}", segment(email)))
}

pub fn build_client_traffic_by_id(client_id: &str) -> HttpRequest {
    HttpRequest::get(&format!("/inbounds/getClientTrafficsById/{}", segment(client_id)))
}

/// Form body shared by add/update: the inbound id and a settings object
/// holding exactly one literal client.
fn client_form(inbound_id: u64, client: &Client) -> Result<RequestBody> {
    let settings = serde_json::to_string(&InboundSettings::single(client.clone())).map_err(Error::Encode)?;
    Ok(RequestBody::form([
        ("id", inbound_id.to_string()),
        ("settings", settings),
    ]))
}

pub fn build_add_client(inbound_id: u64, client: &Client) -> Result<HttpRequest> {
    Ok(HttpRequest::post("/inbounds/addClient", client_form(inbound_id, client)?))
}

pub fn build_update_client(inbound_id: u64, client: &Client) -> Result<HttpRequest> {
    if client.id.is_empty() {
        return Err(Error::InvalidRequest(format!(
            "client {:?} has no id to update",
            client.email
        )));
    }
    Ok(HttpRequest::post(
        &format!("/inbounds/updateClient/{}", segment(&client.id)),
        client_form(inbound_id, client)?,
    ))
}

pub fn build_reset_client_traffic(inbound_id: u64, email: &str) -> HttpRequest {
    HttpRequest::post(
        &format!("/inbounds/{inbound_id}/resetClientTraffic/{}", segment(email)),
        RequestBody::Empty,
    )
}

pub fn build_client_ips(email: &str) -> HttpRequest {
    HttpRequest::post(&format!("/inbounds/clientIps/{}", segment(email)), RequestBody::Empty)
}

pub fn build_clear_client_ips(email: &str) -> HttpRequest {
    HttpRequest::post(
        &format!("/inbounds/clearClientIps/{}", segment(email)),
        RequestBody::Empty,
    )
}

pub fn build_delete_client(inbound_id: u64, client_id: &str) -> HttpRequest {
    HttpRequest::post(
        &format!("/inbounds/{inbound_id}/delClient/{}", segment(client_id)),
        RequestBody::Empty,
    )
}

pub fn build_backup_to_telegram() -> HttpRequest {
    HttpRequest::get("/backuptotgbot")
}

impl Session {
    pub fn list_inbounds(&self) -> Result<ApiResponse<Vec<Inbound>>> {
        self.call_api(&build_list_inbounds())
    }

    pub fn get_inbound(&self, inbound_id: u64) -> Result<ApiResponse<Inbound>> {
        self.call_api(&build_get_inbound(inbound_id))
    }

    /// Reset traffic counters of every inbound.
    pub fn reset_all_traffic(&self) -> Result<MessageResponse> {
        self.call_api(&build_reset_all_traffic())
    }

    /// Reset traffic counters of every client in one inbound.
    pub fn reset_inbound_client_traffic(&self, inbound_id: u64) -> Result<MessageResponse> {
        self.call_api(&build_reset_inbound_client_traffic(inbound_id))
    }

    pub fn delete_inbound(&self, inbound_id: u64) -> Result<MessageResponse> {
        self.call_api(&build_delete_inbound(inbound_id))
    }

    /// Remove clients whose quota is used up or whose expiry has passed.
    pub fn delete_depleted_clients(&self, inbound_id: u64) -> Result<MessageResponse> {
        self.call_api(&build_delete_depleted_clients(inbound_id))
    }

    pub fn client_traffic_by_email(&self, email: &str) -> Result<ApiResponse<ClientTraffic>> {
        self.call_api(&build_client_traffic_by_email(email))
    }

    pub fn client_traffic_by_id(&self, client_id: &str) -> Result<ApiResponse<Vec<ClientTraffic>>> {
        self.call_api(&build_client_traffic_by_id(client_id))
    }

    pub fn add_client(&self, inbound_id: u64, client: &Client) -> Result<MessageResponse> {
        self.call_api(&build_add_client(inbound_id, client)?)
    }

    /// Replace the client whose id is `client.id` inside `inbound_id`.
    pub fn update_client(&self, inbound_id: u64, client: &Client) -> Result<MessageResponse> {
        self.call_api(&build_update_client(inbound_id, client)?)
    }

    pub fn reset_client_traffic(&self, inbound_id: u64, email: &str) -> Result<MessageResponse> {
        self.call_api(&build_reset_client_traffic(inbound_id, email))
    }

    /// Recorded source IPs; the panel returns them as text.
    pub fn client_ips(&self, email: &str) -> Result<ApiResponse<String>> {
        self.call_api(&build_client_ips(email))
    }

    pub fn clear_client_ips(&self, email: &str) -> Result<MessageResponse> {
        self.call_api(&build_clear_client_ips(email))
    }

    pub fn delete_client(&self, inbound_id: u64, client_id: &str) -> Result<MessageResponse> {
        self.call_api(&build_delete_client(inbound_id, client_id))
    }

    /// Ask the panel to send a backup to its configured Telegram admins.
    pub fn backup_to_telegram(&self) -> Result<MessageResponse> {
        self.call_api(&build_backup_to_telegram())
    }

    /// Fetch `inbound_id` and format the connection key for `client` on it.
    pub fn connection_key(&self, inbound_id: u64, client: &Client) -> Result<String> {
        let inbound = self
            .get_inbound(inbound_id)?
            .into_result()?
            .ok_or_else(|| Error::Rejected {
                msg: format!("inbound {inbound_id} not found"),
            })?;
        Ok(links::connection_key(&inbound, client, self.host())?)
    }

    pub fn subscription_link(&self, client: &Client) -> Result<String> {
        let config = self.config();
        Ok(links::subscription_link(
            self.scheme(),
            self.host(),
            config.subscription_port,
            &config.subscription_path,
            client,
        )?)
    }
}
