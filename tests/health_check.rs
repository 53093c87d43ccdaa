//! Integration tests for the health check endpoint

use sessionvault::configuration::{PasswordSettings, TokenSettings};
use sessionvault::startup::{in_memory_session_service, run};
use std::net::TcpListener;

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let tokens = TokenSettings {
        access_secret: "health-access".to_string(),
        access_token_expiry: 60,
        access_issuer: None,
        refresh_secret: "health-refresh".to_string(),
        refresh_token_expiry: 120,
        refresh_issuer: "health".to_string(),
    };
    let sessions = in_memory_session_service(&tokens, &PasswordSettings { hash_cost: 4 })
        .expect("Failed to build session service");
    let server = run(listener, sessions).expect("Failed to create server");

    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}
