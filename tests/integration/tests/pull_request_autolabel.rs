use std::{collections::BTreeSet, net::SocketAddr, sync::Arc, time::Duration};

use hmac::{Hmac, Mac};
use httpmock::prelude::*;
use perch_chat::MemoryRoom;
use perch_github::{
    build_webhook_router, GithubApiClient, GithubClientConfig, WebhookReporter,
    WebhookServerState,
};
use perch_store::{AutolabelKind, BotStore, NewAutolabelRule, SqliteBotStore};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::net::TcpListener;

const SECRET: &str = "integration-secret";

fn sign(body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).expect("hmac key");
    mac.update(body.as_bytes());
    let digest = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    format!("sha256={digest}")
}

fn pull_request_payload(action: &str, body: &str) -> Value {
    let account = json!({ "login": "robin", "html_url": "https://github.com/robin" });
    json!({
        "action": action,
        "pull_request": {
            "number": 12,
            "title": "Stop crashing on start",
            "html_url": "https://github.com/octo/widgets/pull/12",
            "body": body,
            "labels": [],
            "merged": false,
            "head": { "ref": "fix-crash" },
            "base": { "ref": "main" }
        },
        "repository": {
            "name": "widgets",
            "full_name": "octo/widgets",
            "html_url": "https://github.com/octo/widgets",
            "owner": { "login": "octo", "html_url": "https://github.com/octo" },
            "private": false,
            "visibility": "public"
        },
        "sender": account
    })
}

struct Fixture {
    _workspace: tempfile::TempDir,
    room: Arc<MemoryRoom>,
    addr: SocketAddr,
}

async fn start_fixture(github_base: String) -> Fixture {
    let workspace = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        SqliteBotStore::new(workspace.path().join("perch.sqlite3")).expect("sqlite store"),
    );
    store
        .add_autolabel_rule(NewAutolabelRule {
            repository: "widgets".to_string(),
            kind: AutolabelKind::LinkedIssue,
            pattern: "bug".to_string(),
            label: "needs-triage".to_string(),
        })
        .await
        .expect("rule");

    let github = GithubApiClient::new(GithubClientConfig {
        api_base: github_base,
        token: "token".to_string(),
        request_timeout_ms: 2_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
    })
    .expect("github client");
    let room = Arc::new(MemoryRoom::new(1));
    let state = Arc::new(WebhookServerState {
        secret: SECRET.to_string(),
        ignored_repositories: BTreeSet::new(),
        reporter: WebhookReporter::new(room.clone(), store, Arc::new(github)),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, build_webhook_router(state)).await;
    });
    tokio::time::sleep(Duration::from_millis(25)).await;

    Fixture {
        _workspace: workspace,
        room,
        addr,
    }
}

async fn deliver(addr: SocketAddr, payload: &Value) -> StatusCode {
    let body = payload.to_string();
    Client::new()
        .post(format!("http://{addr}/webhook"))
        .header("x-github-event", "pull_request")
        .header("x-github-delivery", "delivery-42")
        .header("x-hub-signature-256", sign(&body))
        .body(body)
        .send()
        .await
        .expect("send webhook")
        .status()
}

#[tokio::test]
async fn integration_opened_pull_request_is_labelled_from_linked_issue_then_reported() {
    let github = MockServer::start();
    let issue = github.mock(|when, then| {
        when.method(GET).path("/repos/octo/widgets/issues/3");
        then.status(200).json_body(json!({
            "number": 3,
            "title": "Crash on start",
            "html_url": "https://github.com/octo/widgets/issues/3",
            "labels": [{ "name": "bug" }]
        }));
    });
    let labels = github.mock(|when, then| {
        when.method(PUT)
            .path("/repos/octo/widgets/issues/12/labels")
            .json_body(json!({ "labels": ["needs-triage"] }));
        then.status(200).json_body(json!([{ "name": "needs-triage" }]));
    });
    let fixture = start_fixture(github.base_url()).await;

    let status = deliver(
        fixture.addr,
        &pull_request_payload("opened", "Fixes #3 by checking the config first."),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    issue.assert_calls(1);
    labels.assert_calls(1);
    let sent = fixture.room.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .text
        .contains("opened pull request [#12](https://github.com/octo/widgets/pull/12)"));
    assert_eq!(sent[0].reply_to, None);
}

#[tokio::test]
async fn regression_pull_request_without_matching_issue_label_is_not_relabelled() {
    let github = MockServer::start();
    let issue = github.mock(|when, then| {
        when.method(GET).path("/repos/octo/widgets/issues/4");
        then.status(200).json_body(json!({
            "number": 4,
            "title": "Docs typo",
            "html_url": "https://github.com/octo/widgets/issues/4",
            "labels": [{ "name": "docs" }]
        }));
    });
    let labels = github.mock(|when, then| {
        when.method(PUT).path("/repos/octo/widgets/issues/12/labels");
        then.status(200).json_body(json!([]));
    });
    let fixture = start_fixture(github.base_url()).await;

    let status = deliver(fixture.addr, &pull_request_payload("opened", "Closes #4")).await;

    assert_eq!(status, StatusCode::OK);
    issue.assert_calls(1);
    labels.assert_calls(0);
    assert_eq!(fixture.room.sent().len(), 1);
}

#[tokio::test]
async fn regression_closed_pull_request_skips_autolabel_lookup() {
    let github = MockServer::start();
    let issue = github.mock(|when, then| {
        when.method(GET).path("/repos/octo/widgets/issues/3");
        then.status(200).json_body(json!({
            "number": 3,
            "title": "Crash on start",
            "html_url": "https://github.com/octo/widgets/issues/3",
            "labels": [{ "name": "bug" }]
        }));
    });
    let fixture = start_fixture(github.base_url()).await;

    let status = deliver(fixture.addr, &pull_request_payload("closed", "Fixes #3")).await;

    assert_eq!(status, StatusCode::OK);
    issue.assert_calls(0);
    let sent = fixture.room.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("closed pull request"));
}

#[tokio::test]
async fn regression_rejected_label_update_still_reports_pull_request() {
    let github = MockServer::start();
    let issue = github.mock(|when, then| {
        when.method(GET).path("/repos/octo/widgets/issues/3");
        then.status(200).json_body(json!({
            "number": 3,
            "title": "Crash on start",
            "html_url": "https://github.com/octo/widgets/issues/3",
            "labels": [{ "name": "bug" }]
        }));
    });
    let labels = github.mock(|when, then| {
        when.method(PUT).path("/repos/octo/widgets/issues/12/labels");
        then.status(403)
            .json_body(json!({ "message": "Resource not accessible by integration" }));
    });
    let fixture = start_fixture(github.base_url()).await;

    let status = deliver(fixture.addr, &pull_request_payload("opened", "Fixes #3")).await;

    assert_eq!(status, StatusCode::OK);
    issue.assert_calls(1);
    labels.assert_calls(1);
    let sent = fixture.room.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("opened pull request [#12](https://github.com/octo/widgets/pull/12)"));
}
