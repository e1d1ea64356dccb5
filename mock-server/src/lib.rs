//! In-memory fake of the panel's login and inbound API.
//!
//! Mirrors the real panel closely enough to drive the client end to end:
//! form-encoded login that sets a session cookie, a cookie-guarded
//! `/panel/api` tree, `{success, msg, obj}` envelopes, and `settings` /
//! `streamSettings` sent as JSON strings unless `MockOptions::literal_settings`
//! asks for the newer literal form. Epoch fields are stored and returned as
//! raw integers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "3x-ui";
pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "admin";

/// Knobs for simulating different panel releases.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockOptions {
    /// Send `settings` and `streamSettings` as JSON objects instead of strings.
    pub literal_settings: bool,
    /// Send list fields (`clients`, `clientStats`, reality `serverNames` and
    /// `shortIds`) as JSON strings holding the array.
    pub wrapped_lists: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStat {
    pub id: u64,
    pub inbound_id: u64,
    pub enable: bool,
    pub email: String,
    pub up: i64,
    pub down: i64,
    pub expiry_time: i64,
    pub total: i64,
    pub reset: i64,
}

#[derive(Debug, Clone)]
pub struct StoredInbound {
    pub id: u64,
    pub remark: String,
    pub port: u16,
    pub protocol: String,
    /// `{"clients": [...]}` as the panel stores it.
    pub settings: Value,
    pub stream_settings: Value,
    pub enable: bool,
    pub expiry_time: i64,
    pub total: i64,
    pub up: i64,
    pub down: i64,
}

#[derive(Debug, Default)]
pub struct Panel {
    pub options: MockOptions,
    pub inbounds: BTreeMap<u64, StoredInbound>,
    pub stats: Vec<ClientStat>,
    pub ips: HashMap<String, Vec<String>>,
    pub sessions: HashSet<String>,
    pub backups_sent: u32,
    next_stat_id: u64,
}

pub type Db = Arc<RwLock<Panel>>;

impl Panel {
    /// Two inbounds: a reality VLESS one with client `alice`, and a VMess one
    /// whose only client `spent` has exhausted its quota.
    pub fn seeded(options: MockOptions) -> Self {
        let mut panel = Panel {
            options,
            ..Panel::default()
        };
        panel.inbounds.insert(
            1,
            StoredInbound {
                id: 1,
                remark: "edge".to_string(),
                port: 443,
                protocol: "vless".to_string(),
                settings: json!({
                    "clients": [{
                        "id": "6f1c5b0e-8f0a-4d3e-9b6c-2a1f3e4d5c6b",
                        "email": "alice",
                        "enable": true,
                        "flow": "xtls-rprx-vision",
                        "limitIp": 0,
                        "totalGB": 0,
                        "expiryTime": 0,
                        "tgId": "",
                        "subId": "alicesub00000000",
                        "reset": 0
                    }],
                    "decryption": "none"
                }),
                stream_settings: json!({
                    "network": "tcp",
                    "security": "reality",
                    "externalProxy": [],
                    "realitySettings": {
                        "show": false,
                        "xver": 0,
                        "dest": "www.example.com:443",
                        "serverNames": ["www.example.com"],
                        "privateKey": "PRIVATE",
                        "shortIds": ["6ba85179e30d4fc2"],
                        "settings": {
                            "publicKey": "PUBKEY",
                            "fingerprint": "chrome",
                            "serverName": "",
                            "spiderX": "/"
                        }
                    },
                    "tcpSettings": {"acceptProxyProtocol": false, "header": {"type": "none"}}
                }),
                enable: true,
                expiry_time: 0,
                total: 0,
                up: 1000,
                down: 2000,
            },
        );
        panel.inbounds.insert(
            2,
            StoredInbound {
                id: 2,
                remark: "legacy".to_string(),
                port: 8443,
                protocol: "vmess".to_string(),
                settings: json!({
                    "clients": [{
                        "id": "0a0b0c0d-0000-4000-8000-00000000000d",
                        "email": "spent",
                        "enable": true,
                        "totalGB": 1000,
                        "expiryTime": 0,
                        "tgId": 12345,
                        "subId": ""
                    }]
                }),
                stream_settings: json!({"network": "ws", "security": "none"}),
                enable: true,
                expiry_time: 1_700_000_000_000,
                total: 0,
                up: 0,
                down: 0,
            },
        );
        panel.push_stat(1, "alice", 0, 0, 100, 200);
        panel.push_stat(2, "spent", 1000, 0, 600, 600);
        panel.ips.insert("alice".to_string(), vec!["10.0.0.2".to_string()]);
        panel
    }

    fn push_stat(&mut self, inbound_id: u64, email: &str, total: i64, expiry_time: i64, up: i64, down: i64) {
        self.next_stat_id += 1;
        self.stats.push(ClientStat {
            id: self.next_stat_id,
            inbound_id,
            enable: true,
            email: email.to_string(),
            up,
            down,
            expiry_time,
            total,
            reset: 0,
        });
    }

    fn render(&self, inbound: &StoredInbound) -> Value {
        let wrap = |v: &Value| {
            if self.options.literal_settings {
                v.clone()
            } else {
                Value::String(v.to_string())
            }
        };
        let stats: Vec<&ClientStat> = self.stats.iter().filter(|s| s.inbound_id == inbound.id).collect();
        let mut settings = inbound.settings.clone();
        let mut stream_settings = inbound.stream_settings.clone();
        let mut client_stats = if stats.is_empty() { Value::Null } else { json!(stats) };
        if self.options.wrapped_lists {
            stringify(settings.get_mut("clients"));
            if let Some(reality) = stream_settings.get_mut("realitySettings") {
                stringify(reality.get_mut("serverNames"));
                stringify(reality.get_mut("shortIds"));
            }
            stringify(Some(&mut client_stats));
        }
        json!({
            "id": inbound.id,
            "up": inbound.up,
            "down": inbound.down,
            "total": inbound.total,
            "remark": inbound.remark,
            "enable": inbound.enable,
            "expiryTime": inbound.expiry_time,
            "clientStats": client_stats,
            "listen": "",
            "port": inbound.port,
            "protocol": inbound.protocol,
            "settings": wrap(&settings),
            "streamSettings": wrap(&stream_settings),
            "tag": format!("inbound-{}", inbound.port),
            "sniffing": "{\"enabled\":false}"
        })
    }

    fn clients_mut(&mut self, inbound_id: u64) -> Option<&mut Vec<Value>> {
        self.inbounds
            .get_mut(&inbound_id)?
            .settings
            .get_mut("clients")?
            .as_array_mut()
    }

    fn email_taken(&self, email: &str) -> bool {
        self.stats.iter().any(|s| s.email == email)
    }
}

/// Replace an array in place with its JSON text.
fn stringify(field: Option<&mut Value>) {
    if let Some(field) = field.filter(|f| f.is_array()) {
        *field = Value::String(field.to_string());
    }
}

fn ok(msg: &str, obj: Value) -> Json<Value> {
    Json(json!({"success": true, "msg": msg, "obj": obj}))
}

fn fail(msg: &str) -> Json<Value> {
    Json(json!({"success": false, "msg": msg, "obj": null}))
}

pub fn app() -> Router {
    app_with(MockOptions::default())
}

pub fn app_with(options: MockOptions) -> Router {
    let db: Db = Arc::new(RwLock::new(Panel::seeded(options)));
    router(db)
}

/// Router over an existing store, so tests can inspect state afterwards.
pub fn router(db: Db) -> Router {
    let api = Router::new()
        .route("/inbounds/list", get(list_inbounds))
        .route("/inbounds/get/{id}", get(get_inbound))
        .route("/inbounds/resetAllTraffics", post(reset_all_traffics))
        .route("/inbounds/resetAllClientTraffics/{id}", post(reset_all_client_traffics))
        .route("/inbounds/del/{id}", post(delete_inbound))
        .route("/inbounds/delDepletedClients/{id}", post(delete_depleted_clients))
        .route("/inbounds/getClientTraffics/{email}", get(client_traffic_by_email))
        .route("/inbounds/getClientTrafficsById/{id}", get(client_traffic_by_id))
        .route("/inbounds/addClient", post(add_client))
        .route("/inbounds/updateClient/{id}", post(update_client))
        .route("/inbounds/{id}/resetClientTraffic/{email}", post(reset_client_traffic))
        .route("/inbounds/{id}/delClient/{client_id}", post(delete_client))
        .route("/inbounds/clientIps/{email}", post(client_ips))
        .route("/inbounds/clearClientIps/{email}", post(clear_client_ips))
        .route("/backuptotgbot", get(backup_to_telegram))
        .route_layer(middleware::from_fn_with_state(db.clone(), require_session));

    Router::new()
        .route("/login", post(login))
        .nest("/panel/api", api)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, MockOptions::default()).await
}

pub async fn run_with(listener: TcpListener, options: MockOptions) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(options)).await
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(&format!("{SESSION_COOKIE}=")).map(str::to_string))
        .next()
}

async fn require_session(State(db): State<Db>, request: Request, next: Next) -> Response {
    let authorized = match session_token(request.headers()) {
        Some(token) => db.read().await.sessions.contains(&token),
        None => false,
    };
    if !authorized {
        debug!(path = %request.uri().path(), "rejecting call without session");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    next.run(request).await
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(default, rename = "twoFactorCode")]
    pub two_factor_code: String,
}

async fn login(State(db): State<Db>, Form(form): Form<LoginForm>) -> Response {
    if form.username != USERNAME || form.password != PASSWORD || !form.two_factor_code.is_empty() {
        return (StatusCode::UNAUTHORIZED, "bad credentials").into_response();
    }
    let token = Uuid::new_v4().simple().to_string();
    db.write().await.sessions.insert(token.clone());
    info!(user = %form.username, "login");
    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly");
    ([(header::SET_COOKIE, cookie)], ok("Login Successfully", Value::Null)).into_response()
}

async fn list_inbounds(State(db): State<Db>) -> Json<Value> {
    let panel = db.read().await;
    let inbounds: Vec<Value> = panel.inbounds.values().map(|i| panel.render(i)).collect();
    ok("", Value::Array(inbounds))
}

async fn get_inbound(State(db): State<Db>, Path(id): Path<u64>) -> Json<Value> {
    let panel = db.read().await;
    match panel.inbounds.get(&id) {
        Some(inbound) => ok("", panel.render(inbound)),
        None => fail("Inbound not found"),
    }
}

async fn reset_all_traffics(State(db): State<Db>) -> Json<Value> {
    let mut panel = db.write().await;
    for inbound in panel.inbounds.values_mut() {
        inbound.up = 0;
        inbound.down = 0;
    }
    for stat in &mut panel.stats {
        stat.up = 0;
        stat.down = 0;
    }
    ok("All traffic has been reset", Value::Null)
}

async fn reset_all_client_traffics(State(db): State<Db>, Path(id): Path<u64>) -> Json<Value> {
    let mut panel = db.write().await;
    for stat in panel.stats.iter_mut().filter(|s| s.inbound_id == id) {
        stat.up = 0;
        stat.down = 0;
    }
    ok("All client traffic has been reset", Value::Null)
}

async fn delete_inbound(State(db): State<Db>, Path(id): Path<u64>) -> Json<Value> {
    let mut panel = db.write().await;
    if panel.inbounds.remove(&id).is_none() {
        return fail("Inbound not found");
    }
    panel.stats.retain(|s| s.inbound_id != id);
    ok("Inbound deleted", json!(id))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

async fn delete_depleted_clients(State(db): State<Db>, Path(id): Path<u64>) -> Json<Value> {
    let mut panel = db.write().await;
    let now = now_millis();
    let depleted: HashSet<String> = panel
        .stats
        .iter()
        .filter(|s| s.inbound_id == id)
        .filter(|s| (s.total > 0 && s.up + s.down >= s.total) || (s.expiry_time > 0 && s.expiry_time <= now))
        .map(|s| s.email.clone())
        .collect();
    let Some(clients) = panel.clients_mut(id) else {
        return fail("Inbound not found");
    };
    clients.retain(|c| !depleted.contains(c["email"].as_str().unwrap_or_default()));
    panel.stats.retain(|s| !depleted.contains(&s.email));
    ok("Depleted clients deleted", Value::Null)
}

async fn client_traffic_by_email(State(db): State<Db>, Path(email): Path<String>) -> Json<Value> {
    let panel = db.read().await;
    let stat = panel.stats.iter().find(|s| s.email == email);
    ok("", json!(stat))
}

async fn client_traffic_by_id(State(db): State<Db>, Path(id): Path<String>) -> Json<Value> {
    let panel = db.read().await;
    let emails: HashSet<&str> = panel
        .inbounds
        .values()
        .filter_map(|i| i.settings["clients"].as_array())
        .flatten()
        .filter(|c| c["id"] == id.as_str())
        .filter_map(|c| c["email"].as_str())
        .collect();
    let stats: Vec<&ClientStat> = panel.stats.iter().filter(|s| emails.contains(s.email.as_str())).collect();
    ok("", json!(stats))
}

#[derive(Debug, Deserialize)]
pub struct ClientForm {
    pub id: u64,
    pub settings: String,
}

/// Clients from an add/update form. The panel only accepts a literal list.
fn parse_clients(settings: &str) -> Result<Vec<Value>, &'static str> {
    let settings: Value = serde_json::from_str(settings).map_err(|_| "invalid settings")?;
    let clients = settings["clients"].as_array().ok_or("settings.clients must be an array")?;
    if clients.is_empty() || !clients.iter().all(Value::is_object) {
        return Err("settings.clients must hold client objects");
    }
    Ok(clients.clone())
}

async fn add_client(State(db): State<Db>, Form(form): Form<ClientForm>) -> Json<Value> {
    let clients = match parse_clients(&form.settings) {
        Ok(c) => c,
        Err(msg) => return fail(msg),
    };
    let mut panel = db.write().await;
    if !panel.inbounds.contains_key(&form.id) {
        return fail("Inbound not found");
    }
    for client in &clients {
        let email = client["email"].as_str().unwrap_or_default();
        if email.is_empty() || panel.email_taken(email) {
            return fail(&format!("Duplicate email: {email}"));
        }
    }
    for client in clients {
        let email = client["email"].as_str().unwrap_or_default().to_string();
        let total = client["totalGB"].as_i64().unwrap_or_default();
        let expiry = client["expiryTime"].as_i64().unwrap_or_default();
        panel.push_stat(form.id, &email, total, expiry, 0, 0);
        if let Some(list) = panel.clients_mut(form.id) {
            list.push(client);
        }
    }
    ok("Client(s) added Successfully", Value::Null)
}

async fn update_client(
    State(db): State<Db>,
    Path(client_id): Path<String>,
    Form(form): Form<ClientForm>,
) -> Json<Value> {
    let mut clients = match parse_clients(&form.settings) {
        Ok(c) => c,
        Err(msg) => return fail(msg),
    };
    let updated = clients.swap_remove(0);
    let mut panel = db.write().await;
    let Some(list) = panel.clients_mut(form.id) else {
        return fail("Inbound not found");
    };
    let Some(slot) = list.iter_mut().find(|c| c["id"] == client_id.as_str()) else {
        return fail("Client not found");
    };
    let old_email = slot["email"].as_str().unwrap_or_default().to_string();
    *slot = updated.clone();
    if let Some(stat) = panel.stats.iter_mut().find(|s| s.email == old_email) {
        stat.email = updated["email"].as_str().unwrap_or_default().to_string();
        stat.enable = updated["enable"].as_bool().unwrap_or_default();
        stat.total = updated["totalGB"].as_i64().unwrap_or_default();
        stat.expiry_time = updated["expiryTime"].as_i64().unwrap_or_default();
    }
    ok("Client updated Successfully", Value::Null)
}

async fn reset_client_traffic(State(db): State<Db>, Path((id, email)): Path<(u64, String)>) -> Json<Value> {
    let mut panel = db.write().await;
    match panel.stats.iter_mut().find(|s| s.inbound_id == id && s.email == email) {
        Some(stat) => {
            stat.up = 0;
            stat.down = 0;
            ok("Traffic has been reset", Value::Null)
        }
        None => fail("Client not found"),
    }
}

async fn delete_client(
    State(db): State<Db>,
    Path((id, client_id)): Path<(u64, String)>,
) -> Json<Value> {
    let mut panel = db.write().await;
    let Some(list) = panel.clients_mut(id) else {
        return fail("Inbound not found");
    };
    let Some(pos) = list.iter().position(|c| c["id"] == client_id.as_str()) else {
        return fail("Client not found");
    };
    let removed = list.remove(pos);
    let email = removed["email"].as_str().unwrap_or_default().to_string();
    panel.stats.retain(|s| s.email != email);
    panel.ips.remove(&email);
    ok("Client deleted", Value::Null)
}

async fn client_ips(State(db): State<Db>, Path(email): Path<String>) -> Json<Value> {
    let panel = db.read().await;
    match panel.ips.get(&email) {
        Some(ips) if !ips.is_empty() => ok("", Value::String(json!(ips).to_string())),
        _ => ok("", Value::String("No IP Record".to_string())),
    }
}

async fn clear_client_ips(State(db): State<Db>, Path(email): Path<String>) -> Json<Value> {
    db.write().await.ips.remove(&email);
    ok("Log Cleared Successfully", Value::Null)
}

async fn backup_to_telegram(State(db): State<Db>) -> Json<Value> {
    db.write().await.backups_sent += 1;
    ok("Backup sent", Value::Null)
}
