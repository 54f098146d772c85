use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use hodi::config::Config;
use hodi::server::serve;

mod common;
use common::*;

async fn start(config: Config) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        serve(config, listener, async move {
            _ = stopped.await;
        })
        .await
        .unwrap();
    });

    (format!("http://{addr}"), stop, server)
}

#[tokio::test]
async fn queries_are_answered_and_recorded() {
    let config = Config {
        print_sink: true,
        ..default_config()
    };
    let (base, stop, server) = start(config).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{base}/domain/example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["class"], "domain");
    assert_eq!(body["key"], "example.com");
    assert_eq!(body["results"], serde_json::json!([]));

    let hash = client.get(format!("{base}/hash/abc")).send().await.unwrap();
    assert_eq!(hash.status(), 200);
    let body: Value = hash.json().await.unwrap();
    assert_eq!(body["class"], "md5");

    let unknown = client.get(format!("{base}/url/abc")).send().await.unwrap();
    assert_eq!(unknown.status(), 400);

    let liveness = client.get(format!("{base}/_liveness")).send().await.unwrap();
    assert_eq!(liveness.status(), 200);
    let readiness = client.get(format!("{base}/_readiness")).send().await.unwrap();
    assert_eq!(readiness.status(), 200);

    _ = stop.send(());
    server.await.unwrap();
}

#[tokio::test]
async fn host_runs_without_the_source() {
    let (base, stop, server) = start(default_config()).await;

    let index = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(index.text().await.unwrap(), "hodi");

    let response = reqwest::get(format!("{base}/ip/192.0.2.1")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["results"], serde_json::json!([]));

    _ = stop.send(());
    server.await.unwrap();
}
