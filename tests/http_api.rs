use std::sync::Arc;
use std::time::Duration;

use ipam_dns_sync::config::SyncConfig;
use ipam_dns_sync::inventory::InventoryExport;
use ipam_dns_sync::{AppState, api, db};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn spawn_app(config: SyncConfig) -> String {
    let db = db::init_memory_db().await.unwrap();
    let state = Arc::new(AppState::new(config, db, Arc::new(InventoryExport::default())));
    let app = api::create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn empty_pdns() -> MockServer {
    let pdns = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "example.com.", "name": "example.com.", "kind": "Native", "rrsets": []
        })))
        .mount(&pdns)
        .await;
    pdns
}

async fn wait_for_terminal(client: &reqwest::Client, base: &str, job_id: i64) -> Value {
    for _ in 0..100 {
        let job: Value = client
            .get(format!("{base}/api/jobs/{job_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if matches!(job["status"].as_str(), Some("completed" | "failed")) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never finished");
}

#[tokio::test]
async fn configure_trigger_and_inspect() {
    let pdns = empty_pdns().await;
    let base = spawn_app(SyncConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{base}/api/servers"))
        .json(&json!({"name": "pdns1", "api_url": format!("{}/api/v1", pdns.uri()), "api_token": "secret"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let server: Value = res.json().await.unwrap();
    assert!(server.get("api_token").is_none());
    let server_id = server["id"].as_i64().unwrap();

    let res = client
        .post(format!("{base}/api/servers"))
        .json(&json!({"name": "pdns1", "api_url": "http://other/api/v1", "api_token": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(format!("{base}/api/zones"))
        .json(&json!({"name": "example.com", "api_servers": [server_id]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("dot"));

    let res = client
        .post(format!("{base}/api/zones"))
        .json(&json!({"name": "example.com.", "api_servers": [server_id], "naming": {"device_method": "device"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let zone: Value = res.json().await.unwrap();
    let zone_id = zone["id"].as_i64().unwrap();

    let res = client
        .post(format!("{base}/api/zones/{zone_id}/sync"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let job: Value = res.json().await.unwrap();
    let job_id = job["id"].as_i64().unwrap();

    let job = wait_for_terminal(&client, &base, job_id).await;
    assert_eq!(job["status"], "completed");
    assert!(!job["result"]["log"].as_array().unwrap().is_empty());
    assert_eq!(job["result"]["output"], json!([]));

    let jobs: Vec<Value> = client
        .get(format!("{base}/api/zones/{zone_id}/jobs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);

    let res = client
        .post(format!("{base}/api/jobs/{job_id}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn missing_objects_and_unsyncable_zones() {
    let base = spawn_app(SyncConfig::default()).await;
    let client = reqwest::Client::new();

    assert_eq!(
        client.get(format!("{base}/api/jobs/42")).send().await.unwrap().status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        client
            .put(format!("{base}/api/zones/42"))
            .json(&json!({"name": "example.com."}))
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::NOT_FOUND
    );

    let zone: Value = client
        .post(format!("{base}/api/zones"))
        .json(&json!({"name": "example.com."}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let res = client
        .post(format!("{base}/api/zones/{}/sync", zone["id"]))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("no valid servers"));

    let res = client
        .post(format!("{base}/api/zones"))
        .json(&json!({"name": "example.com."}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn saving_a_zone_triggers_a_sync_when_enabled() {
    let pdns = empty_pdns().await;
    let base = spawn_app(SyncConfig { sync_on_save: true, ..SyncConfig::default() }).await;
    let client = reqwest::Client::new();

    let server: Value = client
        .post(format!("{base}/api/servers"))
        .json(&json!({"name": "pdns1", "api_url": format!("{}/api/v1", pdns.uri()), "api_token": "secret"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let zone: Value = client
        .post(format!("{base}/api/zones"))
        .json(&json!({"name": "example.com.", "api_servers": [server["id"]]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let jobs: Vec<Value> = client
        .get(format!("{base}/api/zones/{}/jobs", zone["id"]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    let job = wait_for_terminal(&client, &base, jobs[0]["id"].as_i64().unwrap()).await;
    assert_eq!(job["status"], "completed");
}

#[tokio::test]
async fn servers_can_be_edited_and_removed() {
    let base = spawn_app(SyncConfig::default()).await;
    let client = reqwest::Client::new();

    let mut ids = Vec::new();
    for name in ["pdns1", "pdns2"] {
        let server: Value = client
            .post(format!("{base}/api/servers"))
            .json(&json!({"name": name, "api_url": "http://127.0.0.1:8081/api/v1", "api_token": "secret"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        ids.push(server["id"].as_i64().unwrap());
    }

    let res = client
        .put(format!("{base}/api/servers/{}", ids[0]))
        .json(&json!({"name": "pdns-primary", "api_url": "http://10.0.0.53:8081/api/v1", "enabled": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await.unwrap();
    assert_eq!(updated["name"], "pdns-primary");
    assert_eq!(updated["enabled"], false);
    assert!(updated.get("api_token").is_none());

    let res = client
        .put(format!("{base}/api/servers/{}", ids[0]))
        .json(&json!({"name": "pdns2", "api_url": "http://10.0.0.53:8081/api/v1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .put(format!("{base}/api/servers/999"))
        .json(&json!({"name": "ghost", "api_url": "http://10.0.0.53:8081/api/v1", "api_token": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .delete(format!("{base}/api/servers/{}", ids[1]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = client
        .delete(format!("{base}/api/servers/{}", ids[1]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let servers: Vec<Value> = client
        .get(format!("{base}/api/servers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0]["name"], "pdns-primary");
}
