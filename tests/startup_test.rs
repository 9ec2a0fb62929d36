mod helpers;

use std::sync::Arc;

use embed_svc::config::ServiceConfig;
use embed_svc::server::{self, ServiceState};
use helpers::*;
use tempfile::TempDir;

fn config_with_model_dir(dir: &TempDir) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.model.dir = dir.path().to_string_lossy().into_owned();
    config.server.host = "127.0.0.1".into();
    config
}

#[test]
fn load_fails_on_empty_model_dir() {
    let tmp = TempDir::new().unwrap();
    let config = config_with_model_dir(&tmp);

    let err = ServiceState::load(&config).err().expect("load must fail");
    let message = format!("{err:#}");
    assert!(message.contains("failed to load model assets"), "{message}");
    assert!(message.contains("model download"), "{message}");
}

#[tokio::test]
async fn serve_fails_before_binding_without_assets() {
    let tmp = TempDir::new().unwrap();
    let scratch = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = scratch.local_addr().unwrap().port();
    drop(scratch);

    let mut config = config_with_model_dir(&tmp);
    config.server.port = port;

    let err = server::serve(config).await.unwrap_err();
    assert!(format!("{err:#}").contains("failed to load model assets"));

    // Nothing was left listening on the port.
    std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
}

#[tokio::test]
async fn bind_fails_when_port_is_taken() {
    let tmp = TempDir::new().unwrap();
    let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

    let mut config = config_with_model_dir(&tmp);
    config.server.port = held.local_addr().unwrap().port();

    let err = server::bind(&config).await.unwrap_err();
    assert!(err.to_string().contains("failed to bind"), "{err:#}");
}

#[tokio::test]
async fn bound_service_answers_health_over_tcp() {
    let tmp = TempDir::new().unwrap();
    let mut config = config_with_model_dir(&tmp);
    config.server.port = 0;

    let listener = server::bind(&config).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = ServiceState::new(fake_embedder(Arc::new(FakeEngine)));
    let handle = tokio::spawn(server::serve_on(listener, state));

    let body = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["dim"], 384);

    handle.abort();
}
