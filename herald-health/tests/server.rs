#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use herald_common::{HealthReport, HealthState, ProviderHealth, Signal};
use herald_health::{HealthChecker, HealthConfig, HealthServer};
use pretty_assertions::assert_eq;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::broadcast,
};

async fn get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status line");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

#[tokio::test]
async fn probes_over_http() {
    let config = HealthConfig {
        enabled: true,
        listen_address: "127.0.0.1:0".to_string(),
        max_queue_size: 10,
    };
    let checker = Arc::new(HealthChecker::new(config.max_queue_size));
    let server = HealthServer::new(&config, Arc::clone(&checker)).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (tx, rx) = broadcast::channel(1);
    let handle = tokio::spawn(server.serve(rx));

    assert_eq!(get(addr, "/health/live").await.0, 200);

    let (status, body) = get(addr, "/health/ready").await;
    assert_eq!(status, 503);
    let failing: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(failing["processor_ready"], false);
    assert_eq!(failing["max_queue_size"], 10);

    checker.update(
        HealthReport::new(
            true,
            true,
            vec![ProviderHealth {
                name: "smtp".to_string(),
                healthy: true,
                last_error: None,
            }],
        )
        .with_queue(2, 1, 4),
    );
    checker.set_processor_ready(true);

    assert_eq!(get(addr, "/health/ready").await.0, 200);

    let (status, body) = get(addr, "/health/status").await;
    assert_eq!(status, 200);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["status"], "healthy");
    assert_eq!(report["queue_size"], 2);
    assert_eq!(report["scheduled_size"], 1);
    assert_eq!(report["active_workers"], 4);
    assert_eq!(report["providers"][0]["name"], "smtp");
    assert_eq!(checker.report().unwrap().status, HealthState::Healthy);

    assert_eq!(get(addr, "/nope").await.0, 404);

    tx.send(Signal::Shutdown).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server stops")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn bind_failure_names_the_address() {
    let config = HealthConfig {
        listen_address: "not-an-address".to_string(),
        ..HealthConfig::default()
    };
    let err = HealthServer::new(&config, Arc::new(HealthChecker::new(1)))
        .await
        .err()
        .expect("bind fails");
    assert!(err.to_string().contains("not-an-address"));
}
