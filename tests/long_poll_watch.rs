use nacos_config_watcher::{
    ConfigChange, Fingerprint, FingerprintAlgorithm, NacosHttpClient, WatchKey, WatchOptions,
    WatchScheduler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use wiremock::matchers::{body_string, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTENER_PATH: &str = "/nacos/v1/cs/configs/listener";

async fn listener_bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|req| req.url.path() == LISTENER_PATH)
        .map(|req| String::from_utf8_lossy(&req.body).into_owned())
        .collect()
}

#[tokio::test]
async fn change_is_fetched_once_and_next_poll_carries_new_fingerprint() {
    let server = MockServer::start().await;
    let content = "spring:\n  profiles: prod\n";
    let md5 = Fingerprint::compute(content, FingerprintAlgorithm::Md5);

    Mock::given(method("POST"))
        .and(path(LISTENER_PATH))
        .and(body_string("Listening-Configs=app.yml%02DEFAULT_GROUP%02%01"))
        .respond_with(ResponseTemplate::new(200).set_body_string("app.yml%02DEFAULT_GROUP%01\n"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    let settled_body = format!("Listening-Configs=app.yml%02DEFAULT_GROUP%02{}%01", md5);
    Mock::given(method("POST"))
        .and(path(LISTENER_PATH))
        .and(body_string(settled_body.clone()))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nacos/v1/cs/configs"))
        .and(query_param("dataId", "app.yml"))
        .and(query_param("group", "DEFAULT_GROUP"))
        .and(query_param("tenant", ""))
        .respond_with(ResponseTemplate::new(200).set_body_string(content))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(
        NacosHttpClient::new(&server.uri(), Duration::from_secs(2), "integration-test").unwrap(),
    );
    let options = WatchOptions {
        hold_timeout: Duration::from_millis(500),
        initial_backoff: Duration::from_millis(50),
        max_backoff: Duration::from_millis(200),
        ..WatchOptions::default()
    };
    let scheduler = WatchScheduler::new(client.clone(), client, options);

    let (tx, mut changes) = mpsc::unbounded_channel();
    let key = WatchKey::new("app.yml", "DEFAULT_GROUP", "").unwrap();
    scheduler.watch(key.clone(), move |change: &ConfigChange| {
        let _ = tx.send(change.clone());
    });
    scheduler.start().unwrap();

    let change = timeout(Duration::from_secs(5), changes.recv())
        .await
        .expect("no change delivered")
        .unwrap();
    assert_eq!(change.key, key);
    assert_eq!(change.content, content);
    assert_eq!(change.fingerprint, md5);

    let deadline = Instant::now() + Duration::from_secs(5);
    while listener_bodies(&server).await.len() < 3 {
        assert!(Instant::now() < deadline, "listener was not re-polled");
        sleep(Duration::from_millis(20)).await;
    }
    let bodies = listener_bodies(&server).await;
    assert!(bodies[1..].iter().all(|body| body == &settled_body));
    assert!(changes.try_recv().is_err());

    scheduler.stop();
    timeout(Duration::from_secs(5), scheduler.join())
        .await
        .expect("watch loop did not stop");
    let polls_at_stop = listener_bodies(&server).await.len();
    sleep(Duration::from_millis(300)).await;
    assert_eq!(listener_bodies(&server).await.len(), polls_at_stop);

    server.verify().await;
}

#[tokio::test]
async fn unreachable_server_does_not_stop_the_loop() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Arc::new(
        NacosHttpClient::new(&format!("http://{}", addr), Duration::from_secs(1), "test").unwrap(),
    );
    let options = WatchOptions {
        hold_timeout: Duration::from_millis(100),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(20),
        ..WatchOptions::default()
    };
    let scheduler = WatchScheduler::new(client.clone(), client, options);
    scheduler.watch(WatchKey::with_default_group("app.yml").unwrap(), |_: &ConfigChange| {});
    scheduler.start().unwrap();

    sleep(Duration::from_millis(200)).await;
    assert!(scheduler.is_running());

    scheduler.stop();
    timeout(Duration::from_secs(5), scheduler.join())
        .await
        .expect("watch loop did not stop");
    assert!(!scheduler.is_running());
}
