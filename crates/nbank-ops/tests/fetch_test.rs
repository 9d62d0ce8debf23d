//! Bulk fetch against a wiremock registry that also serves the files.

use std::collections::BTreeMap;

use nbank_ops::{fetch, FetchOptions, FetchOutcome};
use nbank_registry::{RegistryClient, RegistryConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> RegistryClient {
    RegistryClient::new(RegistryConfig::new(&server.uri()).unwrap()).unwrap()
}

fn host_root(server: &MockServer) -> String {
    format!("{}/files/", server.address())
}

#[tokio::test]
async fn missing_ids_are_reported_as_no_locations() {
    let server = MockServer::start().await;
    let root = host_root(&server);
    let bulk = format!(
        "{}\n{}\n{}\n",
        serde_json::json!({"name": "st11", "locations": [
            {"scheme": "neurobank", "root": "/home/data/starlings", "resource_name": "st11"},
            {"scheme": "http", "root": root, "resource_name": "st11"}
        ]}),
        serde_json::json!({"name": "st12", "locations": [
            {"scheme": "http", "root": root, "resource_name": "st12"}
        ]}),
        serde_json::json!({"name": "st13", "locations": []}),
    );
    Mock::given(method("POST"))
        .and(path("/bulk/locations/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bulk))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/st11/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"eleven".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/st12/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"twelve".to_vec()))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let options = FetchOptions {
        dest: tmp.path().to_path_buf(),
        extension: Some("wav".into()),
        force: false,
        pool_size: 2,
    };
    let ids: Vec<String> = ["st11", "st12", "st13", "gone_1", "gone_2"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut streamed = Vec::new();
    let outcomes = fetch(&client(&server), &ids, &options, |o| streamed.push(o.id().to_string()))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 5);
    assert_eq!(streamed.len(), 5);

    let by_id: BTreeMap<&str, &FetchOutcome> = outcomes.iter().map(|o| (o.id(), o)).collect();
    assert_eq!(
        by_id["st11"],
        &FetchOutcome::Downloaded {
            id: "st11".into(),
            path: tmp.path().join("st11.wav")
        }
    );
    assert!(matches!(by_id["st12"], FetchOutcome::Downloaded { .. }));
    assert!(matches!(by_id["st13"], FetchOutcome::NoLocations { .. }));
    assert!(matches!(by_id["gone_1"], FetchOutcome::NoLocations { .. }));
    assert!(matches!(by_id["gone_2"], FetchOutcome::NoLocations { .. }));
    // Unknown ids come after every download.
    assert_eq!(&streamed[3..], &["gone_1".to_string(), "gone_2".to_string()]);

    assert_eq!(std::fs::read(tmp.path().join("st11.wav")).unwrap(), b"eleven");
    assert_eq!(std::fs::read(tmp.path().join("st12.wav")).unwrap(), b"twelve");
}

#[tokio::test]
async fn existing_target_is_not_overwritten_without_force() {
    let server = MockServer::start().await;
    let root = host_root(&server);
    let bulk = serde_json::json!({"name": "st11", "locations": [
        {"scheme": "http", "root": root, "resource_name": "st11"}
    ]})
    .to_string();
    Mock::given(method("POST"))
        .and(path("/bulk/locations/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bulk))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/st11/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote".to_vec()))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("st11"), b"local").unwrap();
    let ids = vec!["st11".to_string()];
    let mut options = FetchOptions {
        dest: tmp.path().to_path_buf(),
        ..FetchOptions::default()
    };

    let outcomes = fetch(&client(&server), &ids, &options, |_| {}).await.unwrap();
    assert!(matches!(outcomes[0], FetchOutcome::Failed { .. }));
    assert_eq!(std::fs::read(tmp.path().join("st11")).unwrap(), b"local");

    options.force = true;
    let outcomes = fetch(&client(&server), &ids, &options, |_| {}).await.unwrap();
    assert!(matches!(outcomes[0], FetchOutcome::Downloaded { .. }));
    assert_eq!(std::fs::read(tmp.path().join("st11")).unwrap(), b"remote");
}

#[tokio::test]
async fn local_only_resource_is_not_downloadable() {
    let server = MockServer::start().await;
    let bulk = serde_json::json!({"name": "st11", "locations": [
        {"scheme": "neurobank", "root": "/home/data/starlings", "resource_name": "st11"}
    ]})
    .to_string();
    Mock::given(method("POST"))
        .and(path("/bulk/locations/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bulk))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let options = FetchOptions {
        dest: tmp.path().to_path_buf(),
        ..FetchOptions::default()
    };
    let outcomes = fetch(&client(&server), &["st11".to_string()], &options, |_| {})
        .await
        .unwrap();
    assert_eq!(outcomes, vec![FetchOutcome::NotDownloadable { id: "st11".into() }]);
}
