#![allow(dead_code)]

use artisan_market::{
    api::{build_router, AppState},
    config::Config,
};
use serde_json::{json, Value};
use std::net::{SocketAddr, TcpListener};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub async fn spawn_server() -> (SocketAddr, JoinHandle<()>, AppState, tempfile::TempDir) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let config = Config::for_data_dir(addr.to_string(), tmp.path().to_path_buf());
    let state = AppState::new(config).await.unwrap();
    let app = build_router(state.clone());
    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    (addr, server, state, tmp)
}

/// A registered and logged-in account.
pub struct Account {
    pub id: Uuid,
    pub token: String,
}

pub async fn register_client(http: &reqwest::Client, addr: SocketAddr, name: &str) -> Account {
    let email = format!("{}@example.com", name.to_lowercase());
    let resp = http
        .post(format!("http://{}/api/clients/register", addr))
        .json(&json!({
            "name": name,
            "email": email,
            "password": "password123",
            "location": "Lagos"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    login(http, addr, "clients", &email).await
}

pub async fn register_artisan(http: &reqwest::Client, addr: SocketAddr, name: &str) -> Account {
    let email = format!("{}@example.com", name.to_lowercase());
    let resp = http
        .post(format!("http://{}/api/artisans/register", addr))
        .json(&json!({
            "name": name,
            "email": email,
            "password": "password123",
            "profession": "Plumber",
            "skills": ["pipes", "leaks"],
            "location": "Lagos",
            "description": "Fixes anything that drips",
            "hourly_rate": 20.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    login(http, addr, "artisans", &email).await
}

pub async fn login(http: &reqwest::Client, addr: SocketAddr, kind: &str, email: &str) -> Account {
    let resp = http
        .post(format!("http://{}/api/{}/login", addr, kind))
        .json(&json!({"email": email, "password": "password123"}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["token_type"], "bearer");
    Account {
        id: body["user_id"].as_str().unwrap().parse().unwrap(),
        token: body["access_token"].as_str().unwrap().to_string(),
    }
}

pub async fn book(
    http: &reqwest::Client,
    addr: SocketAddr,
    client: &Account,
    artisan: &Account,
    start: &str,
    hours: f64,
) -> reqwest::Response {
    http.post(format!("http://{}/api/bookings", addr))
        .bearer_auth(&client.token)
        .json(&json!({
            "artisan_id": artisan.id,
            "service_name": "Fix sink",
            "service_description": "Kitchen sink leaks",
            "booking_date": start,
            "duration_hours": hours,
            "location": "Lagos",
            "agreed_price": 60.0
        }))
        .send()
        .await
        .unwrap()
}

pub async fn set_status(
    http: &reqwest::Client,
    addr: SocketAddr,
    artisan: &Account,
    booking_id: &str,
    status: &str,
) -> reqwest::Response {
    http.put(format!("http://{}/api/bookings/{}/status", addr, booking_id))
        .bearer_auth(&artisan.token)
        .json(&json!({"status": status}))
        .send()
        .await
        .unwrap()
}
