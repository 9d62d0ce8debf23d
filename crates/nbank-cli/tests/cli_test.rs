//! Exit codes of `nbank` subcommands against a wiremock registry.

use std::fs;

use clap::Parser;
use nbank_cli::cli::{dispatch, Cli};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

async fn run(args: &[&str]) -> anyhow::Result<u8> {
    dispatch(Cli::try_parse_from(args)?).await
}

#[tokio::test]
async fn search_requires_a_filter() {
    let server = MockServer::start().await;
    let uri = server.uri();
    let err = run(&["nbank", "-r", &uri, "search"]).await.unwrap_err();
    assert!(err.to_string().contains("at least one filter"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn verify_exit_code_reflects_mismatches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources/good/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "good", "sha1": ABC_SHA1
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resources/stale/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "stale", "sha1": "0000"
        })))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let good = tmp.path().join("good.txt");
    let stale = tmp.path().join("stale.txt");
    fs::write(&good, b"abc").unwrap();
    fs::write(&stale, b"abc").unwrap();

    let uri = server.uri();
    let ok = run(&["nbank", "-r", &uri, "verify", good.to_str().unwrap()]).await.unwrap();
    assert_eq!(ok, 0);
    let bad = run(&[
        "nbank",
        "-r",
        &uri,
        "verify",
        good.to_str().unwrap(),
        stale.to_str().unwrap(),
    ])
    .await
    .unwrap();
    assert_eq!(bad, 1);
}

#[tokio::test]
async fn missing_file_fails_verification_without_contacting_registry() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let ghost = tmp.path().join("ghost.txt");
    let uri = server.uri();
    let code = run(&["nbank", "-r", &uri, "verify", ghost.to_str().unwrap()])
        .await
        .unwrap();
    assert_eq!(code, 1);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn init_then_deposit_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/archives/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "name": "birds", "scheme": "neurobank", "root": "/x"
        })))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("birds");
    let uri = server.uri();
    let code = run(&["nbank", "-r", &uri, "init", archive.to_str().unwrap()])
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert!(archive.join("nbank.json").is_file());

    let root = archive.canonicalize().unwrap();
    Mock::given(method("GET"))
        .and(path("/archives/"))
        .and(query_param("root", root.to_str().unwrap()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "birds", "scheme": "neurobank", "root": root}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/resources/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "name": "song_1", "locations": ["birds"], "metadata": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = tmp.path().join("song_1.wav");
    fs::write(&file, b"abc").unwrap();
    // The registry comes from the archive's configuration, so no -r here.
    let code = run(&[
        "nbank",
        "deposit",
        "-k",
        "bird=C29",
        archive.to_str().unwrap(),
        file.to_str().unwrap(),
    ])
    .await
    .unwrap();
    assert_eq!(code, 0);
    assert!(!file.exists());
    assert!(root.join("resources/so/song_1.wav").is_file());
}
