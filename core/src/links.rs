//! Shareable connection keys and subscription links.
//!
//! Pure string formatting over entities already fetched from the panel; no I/O.

use thiserror::Error;
use url::Url;

use crate::types::{Client, Inbound};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("client {email:?} has no subscription id")]
    MissingSubscriptionId { email: String },

    #[error("client {email:?} has no id")]
    MissingClientId { email: String },

    #[error("cannot build link: {0}")]
    Format(#[from] url::ParseError),
}

/// `{protocol}://{id}@{host}:{port}?type=..&security=..#{remark}-{email}` for
/// `client` on `inbound`, reachable at `host`.
///
/// Reality parameters come from the inbound's stream settings; the first
/// server name and short id are used, missing ones are left empty.
pub fn connection_key(inbound: &Inbound, client: &Client, host: &str) -> Result<String, LinkError> {
    if client.id.is_empty() {
        return Err(LinkError::MissingClientId {
            email: client.email.clone(),
        });
    }
    let stream = &inbound.stream_settings;
    let reality = &stream.reality_settings;

    let mut url = Url::parse(&format!(
        "{}://{}@{}:{}",
        inbound.protocol, client.id, host, inbound.port
    ))?;
    url.query_pairs_mut()
        .append_pair("type", &stream.network)
        .append_pair("security", &stream.security)
        .append_pair("pbk", &reality.settings.public_key)
        .append_pair("fp", &reality.settings.fingerprint)
        .append_pair("sni", reality.server_names.first().map_or("", String::as_str))
        .append_pair("sid", reality.short_ids.first().map_or("", String::as_str))
        .append_pair("spx", &reality.settings.spider_x)
        .append_pair("flow", &client.flow);
    url.set_fragment(Some(&format!("{}-{}", inbound.remark, client.email)));
    Ok(url.to_string())
}

/// `{scheme}://{host}:{port}{path}{sub_id}`, with `path` normalised to start
/// and end with `/`.
pub fn subscription_link(
    scheme: &str,
    host: &str,
    port: u16,
    path: &str,
    client: &Client,
) -> Result<String, LinkError> {
    if client.sub_id.is_empty() {
        return Err(LinkError::MissingSubscriptionId {
            email: client.email.clone(),
        });
    }
    let trimmed = path.trim_matches('/');
    let path = if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    };
    Ok(format!("{scheme}://{host}:{port}{path}{}", client.sub_id))
}
