use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use device_detector::api::{api_error, CredentialStore, InMemoryCredentialStore};
use device_detector::auth::{AuthService, OnboardingStep};
use device_detector::catalog::{DeviceCatalog, LocationClient};
use device_detector::models::{Tokens, User};
use device_detector::{ApiError, ApiGateway, DeviceLookup, HttpMethod, Session};

#[derive(Clone, Debug)]
struct Recorded {
    method: String,
    path: String,
    raw_path: String,
    bearer: Option<String>,
    body: String,
}

impl Recorded {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

struct TestServer {
    url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn paths(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }
}

/// Serve each connection with `handler`, one request per connection.
fn serve<F>(handler: F) -> TestServer
where
    F: Fn(&Recorded) -> (u16, String) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let Ok(request) = read_request(&mut stream) else {
                continue;
            };
            log.lock().unwrap().push(request.clone());
            let (status, body) = handler(&request);
            let _ = write_response(&mut stream, status, body.as_bytes());
        }
    });
    TestServer { url, requests }
}

fn read_request(stream: &mut TcpStream) -> Result<Recorded> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    let bearer = headers.get("authorization").and_then(|value| {
        let parts: Vec<&str> = value.split_whitespace().collect();
        (parts.len() == 2 && parts[0].eq_ignore_ascii_case("bearer")).then(|| parts[1].to_string())
    });
    Ok(Recorded {
        method: method.to_string(),
        path: raw_path.split('?').next().unwrap_or(raw_path).to_string(),
        raw_path: raw_path.to_string(),
        bearer,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

fn write_response(stream: &mut TcpStream, status: u16, body: &[u8]) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        401 => "HTTP/1.1 401 Unauthorized",
        404 => "HTTP/1.1 404 Not Found",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let body: &[u8] = if status == 204 { b"" } else { body };
    let header = format!(
        "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status_line,
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

fn signed_in(url: &str, access: &str, refresh: &str) -> (ApiGateway, Arc<InMemoryCredentialStore>) {
    let store = Arc::new(InMemoryCredentialStore::new());
    let session = Session::shared(store.clone());
    session
        .lock()
        .unwrap()
        .set_tokens(Tokens {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        })
        .unwrap();
    (ApiGateway::new(url, session).unwrap(), store)
}

fn device_json(name: &str) -> Value {
    json!({
        "userId": "u1",
        "name": name,
        "type": "appliance",
        "location": "Kitchen",
        "capabilities": ["reheat"],
        "specifications": "1000 W",
        "detectedAt": 1700000000,
        "needsUpdate": false
    })
}

#[test]
fn lookup_posts_the_label_with_the_access_token() {
    let server = serve(|_| {
        (
            200,
            json!({ "message": "Device found", "device": device_json("Microwave") }).to_string(),
        )
    });
    let (gateway, _) = signed_in(&server.url, "access-1", "refresh-1");
    let catalog = DeviceCatalog::new(gateway);

    let device = catalog.lookup_by_name("Microwave").unwrap().unwrap();
    assert_eq!(device.name, "Microwave");
    assert_eq!(device.kind, "appliance");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/devices");
    assert_eq!(requests[0].bearer.as_deref(), Some("access-1"));
    assert_eq!(requests[0].json(), json!({ "name": "Microwave" }));
}

#[test]
fn unauthorized_request_refreshes_and_retries_once() {
    let server = serve(|request| match (request.path.as_str(), request.bearer.as_deref()) {
        ("/refresh-token", Some("refresh-1")) => (
            200,
            json!({ "tokens": { "accessToken": "access-2", "refreshToken": "refresh-2" } })
                .to_string(),
        ),
        ("/devices", Some("access-2")) => (
            200,
            json!({ "message": "ok", "device": device_json("Oven") }).to_string(),
        ),
        _ => (401, json!({ "error": "expired" }).to_string()),
    });
    let (gateway, store) = signed_in(&server.url, "access-1", "refresh-1");
    let catalog = DeviceCatalog::new(gateway.clone());

    let device = catalog.lookup_by_name("Oven").unwrap().unwrap();
    assert_eq!(device.name, "Oven");
    assert_eq!(
        server.paths(),
        vec!["POST /devices", "POST /refresh-token", "POST /devices"]
    );
    let bearers: Vec<Option<String>> = server.requests().into_iter().map(|r| r.bearer).collect();
    assert_eq!(
        bearers,
        vec![
            Some("access-1".to_string()),
            Some("refresh-1".to_string()),
            Some("access-2".to_string())
        ]
    );
    assert_eq!(store.retrieve().unwrap().as_deref(), Some("refresh-2"));
    assert_eq!(
        gateway.session().lock().unwrap().bearer().as_deref(),
        Some("access-2")
    );
}

#[test]
fn refresh_without_tokens_retries_with_the_refresh_credential() {
    let server = serve(|request| match (request.path.as_str(), request.bearer.as_deref()) {
        ("/refresh-token", _) => (200, json!({ "message": "ok" }).to_string()),
        ("/devices", Some("refresh-1")) => (
            200,
            json!({ "message": "ok", "device": device_json("Toaster") }).to_string(),
        ),
        _ => (401, "{}".to_string()),
    });
    let (gateway, _) = signed_in(&server.url, "access-1", "refresh-1");

    let device = DeviceCatalog::new(gateway).lookup_by_name("Toaster").unwrap();
    assert!(device.is_some());
    assert_eq!(server.requests().len(), 3);
}

#[test]
fn failed_refresh_clears_the_session() {
    let server = serve(|_| (401, json!({ "error": "expired" }).to_string()));
    let (gateway, store) = signed_in(&server.url, "access-1", "refresh-1");
    let catalog = DeviceCatalog::new(gateway.clone());

    let err = catalog.lookup_by_name("Laptop").unwrap_err();
    assert_eq!(api_error(&err), Some(&ApiError::RefreshFailed));
    assert_eq!(err.to_string(), "Failed to refresh token");
    assert_eq!(server.paths(), vec!["POST /devices", "POST /refresh-token"]);

    let session = gateway.session().lock().unwrap();
    assert!(!session.is_signed_in());
    assert_eq!(session.bearer(), None);
    assert_eq!(store.retrieve().unwrap(), None);
}

#[test]
fn missing_records_resolve_to_none() {
    let server = serve(|request| match request.json()["name"].as_str() {
        Some("Remote") => (204, String::new()),
        _ => (404, json!({ "error": "Device not found" }).to_string()),
    });
    let (gateway, _) = signed_in(&server.url, "access-1", "refresh-1");
    let catalog = DeviceCatalog::new(gateway);

    assert_eq!(catalog.lookup_by_name("Mouse").unwrap(), None);
    assert_eq!(catalog.lookup_by_name("Remote").unwrap(), None);

    let err = catalog.lookup("Mouse").unwrap_err();
    assert_eq!(api_error(&err), Some(&ApiError::Status(404)));
    assert_eq!(err.to_string(), "HTTP Error 404");
}

#[test]
fn server_errors_surface_as_failures() {
    let server = serve(|_| (500, "{}".to_string()));
    let (gateway, _) = signed_in(&server.url, "access-1", "refresh-1");

    let err = DeviceCatalog::new(gateway)
        .lookup_by_name("Keyboard")
        .unwrap_err();
    assert_eq!(api_error(&err), Some(&ApiError::Server));
    assert_eq!(err.to_string(), "Internal server error");
}

#[test]
fn get_params_travel_in_the_query_string() {
    let server = serve(|_| {
        (
            200,
            json!([{ "_id": "d1", "name": "Oven", "type": "appliance", "detectedAt": 1 }])
                .to_string(),
        )
    });
    let (gateway, _) = signed_in(&server.url, "access-1", "refresh-1");

    let devices = DeviceCatalog::new(gateway).list("Kitchen").unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, "d1");

    let requests = server.requests();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].raw_path, "/devices?filter=Kitchen");
    assert!(requests[0].body.is_empty());
}

#[test]
fn undecodable_body_is_a_decode_error() {
    let server = serve(|_| (200, "not json".to_string()));
    let (gateway, _) = signed_in(&server.url, "access-1", "refresh-1");

    let err = gateway
        .call::<Value>("/devices/d1", HttpMethod::Get, None)
        .unwrap_err();
    assert!(matches!(api_error(&err), Some(ApiError::Decode(_))));
}

#[test]
fn replacing_locations_updates_the_session() {
    let server = serve(|request| {
        let locations = request.json()["newLocations"].clone();
        (200, json!({ "locations": locations }).to_string())
    });
    let (gateway, _) = signed_in(&server.url, "access-1", "refresh-1");
    {
        let mut session = gateway.session().lock().unwrap();
        let mut user: User = serde_json::from_str(r#"{"userId": "u1"}"#).unwrap();
        user.locations = Some(vec!["Kitchen".to_string(), "Garage".to_string()]);
        session.begin(Some(user), None).unwrap();
        session.set_current_location("Garage");
    }

    let client = LocationClient::new(gateway.clone());
    let updated = client.replace(&["Kitchen".to_string()]).unwrap();
    assert_eq!(updated, vec!["Kitchen".to_string()]);

    let session = gateway.session().lock().unwrap();
    assert_eq!(session.locations(), ["Kitchen".to_string()]);
    assert_eq!(session.current_location(), "All");
    drop(session);

    assert!(client.replace(&["All".to_string()]).is_err());
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn restore_resumes_from_the_stored_credential() {
    let server = serve(|request| match request.path.as_str() {
        "/users/cred-check" => (
            200,
            json!({
                "user": {
                    "userId": "u1",
                    "phoneVerification": true,
                    "emailVerification": false,
                    "locations": ["Office"]
                },
                "tokens": { "accessToken": "access-9", "refreshToken": "refresh-9" }
            })
            .to_string(),
        ),
        _ => (404, "{}".to_string()),
    });
    let store = Arc::new(InMemoryCredentialStore::with_token("stored-refresh"));
    let gateway = ApiGateway::new(&server.url, Session::shared(store.clone())).unwrap();

    let step = AuthService::new(gateway.clone(), "device-token").restore().unwrap();
    assert_eq!(step, Some(OnboardingStep::Email));
    assert_eq!(server.requests()[0].bearer.as_deref(), Some("stored-refresh"));

    let session = gateway.session().lock().unwrap();
    assert_eq!(session.bearer().as_deref(), Some("access-9"));
    assert_eq!(session.current_location(), "Office");
    assert_eq!(store.retrieve().unwrap().as_deref(), Some("refresh-9"));
}

#[test]
fn restore_without_stored_credential_makes_no_request() {
    let server = serve(|_| (500, "{}".to_string()));
    let store = Arc::new(InMemoryCredentialStore::new());
    let gateway = ApiGateway::new(&server.url, Session::shared(store)).unwrap();

    assert_eq!(AuthService::new(gateway, "").restore().unwrap(), None);
    assert!(server.requests().is_empty());
}
