//! End-to-end tests against the mock panel over real HTTP.
//!
//! # Design
//! Each test starts its own mock panel on a random port in a background
//! tokio runtime, then drives the blocking `Session` against it: login and
//! cookie reuse, every endpoint in the catalogue, both wire forms of the
//! double-encoded fields, status classification, and timeouts.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use mock_server::MockOptions;
use xui_core::{AuthError, Client, Error, HttpRequest, Session, SessionConfig};

/// Start a mock panel on a random port and return its address.
fn spawn_panel(options: MockOptions) -> SocketAddr {
    let std_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with(listener, options).await
        })
        .unwrap();
    });
    addr
}

/// Configuration pointing at `addr` through the port substitution path.
fn config(addr: SocketAddr) -> SessionConfig {
    SessionConfig::new("http://127.0.0.1", mock_server::USERNAME, mock_server::PASSWORD)
        .with_port(addr.port())
        .with_timeout(Duration::from_secs(5))
}

fn open(options: MockOptions) -> Session {
    Session::open(config(spawn_panel(options))).unwrap()
}

const ALICE_ID: &str = "6f1c5b0e-8f0a-4d3e-9b6c-2a1f3e4d5c6b";

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[test]
fn open_logs_in_and_cookie_is_reused() {
    let addr = spawn_panel(MockOptions::default());
    let session = Session::open(config(addr)).unwrap();
    assert_eq!(session.base_url(), format!("http://127.0.0.1:{}", addr.port()));

    // Several calls in a row, all authorised by the cookie from login.
    for _ in 0..3 {
        let resp = session.list_inbounds().unwrap();
        assert!(resp.success);
    }
}

#[test]
fn wrong_password_yields_auth_error() {
    let addr = spawn_panel(MockOptions::default());
    let cfg = SessionConfig::new("http://127.0.0.1", "admin", "wrong").with_port(addr.port());

    match Session::open(cfg).unwrap_err() {
        Error::Auth(AuthError::Rejected { status, body }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad credentials");
        }
        other => panic!("expected auth rejection, got {other:?}"),
    }
}

#[test]
fn login_can_be_repeated() {
    let session = open(MockOptions::default());
    session.login().unwrap();
    assert!(session.list_inbounds().unwrap().success);
}

#[test]
fn unknown_endpoint_is_api_error() {
    let session = open(MockOptions::default());
    let err = session.execute(&HttpRequest::get("/no/such/endpoint")).unwrap_err();
    assert!(matches!(err, Error::Api { status: 404, .. }), "got {err:?}");
}

#[test]
fn refused_connection_during_login_is_auth_error() {
    // Bind then drop to get a port with nothing listening.
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let cfg = SessionConfig::new("http://127.0.0.1", "admin", "admin").with_port(port);
    assert!(matches!(Session::open(cfg), Err(Error::Auth(AuthError::Transport(_)))));
}

#[test]
fn concurrent_reads_share_one_session() {
    let session = open(MockOptions::default());
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|_| s.spawn(|| session.list_inbounds().unwrap())).collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().obj.unwrap().len(), 2);
        }
    });
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Answer `POST /login` with a session cookie, then stall on anything else.
fn serve_then_stall(stream: TcpStream) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
            return;
        }
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            if line == "\r\n" {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }
        let mut body = vec![0; content_length];
        let _ = reader.read_exact(&mut body);

        if !request_line.starts_with("POST /login") {
            std::thread::sleep(Duration::from_secs(5));
            return;
        }
        let _ = writer.write_all(b"HTTP/1.1 200 OK\r\nSet-Cookie: 3x-ui=t; Path=/\r\nContent-Length: 0\r\n\r\n");
    }
}

fn spawn_stalling_panel() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            std::thread::spawn(move || serve_then_stall(stream));
        }
    });
    addr
}

#[test]
fn stalled_call_times_out_as_transport_error() {
    let addr = spawn_stalling_panel();
    let cfg = config(addr).with_timeout(Duration::from_secs(1));
    let session = Session::open(cfg).unwrap();

    let started = Instant::now();
    let err = session.list_inbounds().unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn stalled_login_times_out_as_auth_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    // Connections complete in the backlog but are never accepted or answered.
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(5));
        drop(listener);
    });

    let cfg = config(addr).with_timeout(Duration::from_secs(1));
    assert!(matches!(Session::open(cfg), Err(Error::Auth(AuthError::Transport(_)))));
}

// ---------------------------------------------------------------------------
// Inbounds
// ---------------------------------------------------------------------------

#[test]
fn string_wrapped_and_literal_releases_decode_identically() {
    let older = open(MockOptions::default()).list_inbounds().unwrap();
    let newer = open(MockOptions {
        literal_settings: true,
        ..MockOptions::default()
    })
    .list_inbounds()
    .unwrap();
    let wrapped_lists = open(MockOptions {
        literal_settings: true,
        wrapped_lists: true,
    })
    .list_inbounds()
    .unwrap();
    assert_eq!(older.obj, newer.obj);
    assert_eq!(wrapped_lists.obj, newer.obj);

    let inbounds = older.obj.unwrap();
    let edge = &inbounds[0];
    assert_eq!(edge.remark, "edge");
    assert_eq!(edge.stream_settings.security, "reality");
    assert_eq!(*edge.stream_settings.reality_settings.short_ids, vec!["6ba85179e30d4fc2"]);
    assert_eq!(edge.client_by_email("alice").unwrap().id, ALICE_ID);
    assert_eq!(edge.client_stats[0].email, "alice");

    let legacy = &inbounds[1];
    assert_eq!(legacy.client_by_email("spent").unwrap().tg_id, "12345");
    assert!(legacy.client_by_email("spent").unwrap().expiry_time.is_unset());
}

#[cfg(not(feature = "seconds-epoch"))]
#[test]
fn inbound_expiry_decodes_as_milliseconds() {
    let inbound = open(MockOptions::default()).get_inbound(2).unwrap().obj.unwrap();
    let at = inbound.expiry_time.get().unwrap();
    assert_eq!(at.unix_timestamp(), 1_700_000_000);
}

#[test]
fn missing_inbound_is_an_unsuccessful_envelope() {
    let session = open(MockOptions::default());
    let resp = session.get_inbound(99).unwrap();
    assert!(!resp.success);
    assert!(matches!(resp.into_result(), Err(Error::Rejected { .. })));
}

#[test]
fn delete_inbound_and_depleted_clients() {
    let session = open(MockOptions::default());

    assert!(session.delete_depleted_clients(2).unwrap().success);
    let legacy = session.get_inbound(2).unwrap().obj.unwrap();
    assert_eq!(legacy.clients().count(), 0);

    assert!(session.delete_inbound(2).unwrap().success);
    let remaining = session.list_inbounds().unwrap().obj.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, 1);
}

#[test]
fn traffic_resets() {
    let session = open(MockOptions::default());

    let before = session.client_traffic_by_email("alice").unwrap().obj.unwrap();
    assert_eq!((before.up, before.down), (100, 200));

    assert!(session.reset_inbound_client_traffic(1).unwrap().success);
    let after = session.client_traffic_by_email("alice").unwrap().obj.unwrap();
    assert_eq!((after.up, after.down), (0, 0));

    assert!(session.reset_all_traffic().unwrap().success);
    let inbound = session.get_inbound(1).unwrap().obj.unwrap();
    assert_eq!((inbound.up, inbound.down), (0, 0));
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

#[test]
fn client_lifecycle() {
    let session = open(MockOptions::default());

    // add
    let mut dave = Client::new("dave");
    dave.total_gb = 5_000;
    let resp = session.add_client(1, &dave).unwrap();
    assert!(resp.success, "{}", resp.msg);

    let inbound = session.get_inbound(1).unwrap().obj.unwrap();
    let stored = inbound.client_by_email("dave").unwrap();
    assert_eq!(stored.id, dave.id);
    assert_eq!(stored.total_gb, 5_000);
    assert!(stored.enable);

    // adding the same email twice is refused by the panel, not by transport
    let dup = session.add_client(1, &dave).unwrap();
    assert!(!dup.success);

    // traffic by email and by id
    let traffic = session.client_traffic_by_email("dave").unwrap().obj.unwrap();
    assert_eq!(traffic.inbound_id, 1);
    assert_eq!(traffic.total, 5_000);
    let by_id = session.client_traffic_by_id(&dave.id).unwrap().obj.unwrap();
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].email, "dave");

    // update
    dave.enable = false;
    assert!(session.update_client(1, &dave).unwrap().success);
    let inbound = session.get_inbound(1).unwrap().obj.unwrap();
    assert!(!inbound.client_by_email("dave").unwrap().enable);

    // reset one client's traffic
    assert!(session.reset_client_traffic(1, "dave").unwrap().success);

    // delete
    assert!(session.delete_client(1, &dave.id).unwrap().success);
    let inbound = session.get_inbound(1).unwrap().obj.unwrap();
    assert!(inbound.client_by_email("dave").is_none());
    assert!(session.client_traffic_by_email("dave").unwrap().obj.is_none());
}

#[test]
fn client_ips_fetch_and_clear() {
    let session = open(MockOptions::default());

    let ips = session.client_ips("alice").unwrap().obj.unwrap();
    assert_eq!(ips, r#"["10.0.0.2"]"#);

    assert!(session.clear_client_ips("alice").unwrap().success);
    let ips = session.client_ips("alice").unwrap().obj.unwrap();
    assert_eq!(ips, "No IP Record");
}

#[test]
fn backup_request_succeeds() {
    let session = open(MockOptions::default());
    assert!(session.backup_to_telegram().unwrap().success);
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

#[test]
fn connection_key_for_existing_client() {
    let session = open(MockOptions::default());
    let inbound = session.get_inbound(1).unwrap().obj.unwrap();
    let alice = inbound.client_by_email("alice").unwrap();

    let key = session.connection_key(1, alice).unwrap();
    assert_eq!(
        key,
        format!(
            "vless://{ALICE_ID}@127.0.0.1:443?type=tcp&security=reality&pbk=PUBKEY&fp=chrome\
             &sni=www.example.com&sid=6ba85179e30d4fc2&spx=%2F&flow=xtls-rprx-vision#edge-alice"
        )
    );

    let missing = session.connection_key(42, alice).unwrap_err();
    assert!(matches!(missing, Error::Rejected { .. }));
}

#[test]
fn subscription_link_uses_configured_port_and_path() {
    let session = open(MockOptions::default());
    let inbound = session.get_inbound(1).unwrap().obj.unwrap();
    let alice = inbound.client_by_email("alice").unwrap();

    let link = session.subscription_link(alice).unwrap();
    assert_eq!(link, "http://127.0.0.1:2096/sub/alicesub00000000");

    let legacy = session.get_inbound(2).unwrap().obj.unwrap();
    let spent = legacy.client_by_email("spent").unwrap();
    assert!(matches!(session.subscription_link(spent), Err(Error::Link(_))));
}
