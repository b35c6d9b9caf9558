// Provider-client behaviors against a mock HTTP server:
// pagination, not-found handling, retry on 5xx and rate-limit surfacing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use workpulse_core::PipelineError;
use workpulse_jira::JiraClient;

fn client(server: &MockServer) -> JiraClient {
    JiraClient::new(server.uri(), "etl@example.com", "token", Duration::from_secs(5))
        .unwrap()
        .with_retry_base_delay(Duration::from_millis(1))
}

#[tokio::test]
async fn test_project_search_paginates_until_last() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/project/search"))
        .and(query_param("startAt", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [{"id": "10"}, {"id": "11"}],
            "total": 3,
            "isLast": false
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/project/search"))
        .and(query_param("startAt", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [{"id": "12"}],
            "total": 3,
            "isLast": true
        })))
        .mount(&server)
        .await;

    let projects = client(&server)
        .projects_with_issue_types(&[], 2)
        .await
        .unwrap();

    assert_eq!(projects.len(), 3);
    assert_eq!(projects[2]["id"], "12");
}

#[tokio::test]
async fn test_progress_hook_fires_per_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/field/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [{"id": "customfield_10000"}],
            "total": 1,
            "isLast": true
        })))
        .mount(&server)
        .await;

    let pages = Arc::new(AtomicUsize::new(0));
    let counter = pages.clone();
    let client = client(&server).with_progress_hook(Arc::new(move |current, total| {
        counter.fetch_add(1, Ordering::SeqCst);
        assert_eq!(current, 1);
        assert_eq!(total, Some(1));
    }));

    let fields = client.field_search(Some("development"), 50).await.unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(pages.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_not_found_is_empty_not_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/project/999/statuses"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/dev-status/latest/issue/detail"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.project_statuses("999").await.unwrap().is_empty());
    assert!(client.dev_status("100").await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_error_retries_then_succeeds() {
    let server = MockServer::start().await;

    struct FlakyOnce {
        hits: AtomicUsize,
    }

    impl Respond for FlakyOnce {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            if self.hits.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(502)
            } else {
                ResponseTemplate::new(200).set_body_json(json!({"count": 7}))
            }
        }
    }

    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/approximate-count"))
        .respond_with(FlakyOnce {
            hits: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let count = client(&server).approximate_count("project = P").await.unwrap();
    assert_eq!(count, 7);
}

#[tokio::test]
async fn test_rate_limit_surfaces_reset_and_does_not_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("Retry-After", "120"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let before = Utc::now();
    let err = client(&server)
        .search_jql_page("project = P", 50, None)
        .await
        .unwrap_err();

    match err {
        PipelineError::RateLimited { reset_at } => {
            let reset = reset_at.expect("reset instant should be parsed");
            let delta = (reset - before).num_seconds();
            assert!((115..=125).contains(&delta), "unexpected reset delta {delta}");
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn test_search_page_carries_token_and_issues() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [{"id": "100", "key": "P-1"}],
            "nextPageToken": "tok-2",
            "isLast": false
        })))
        .mount(&server)
        .await;

    let page = client(&server)
        .search_jql_page("project = P AND updated >= -1d", 100, None)
        .await
        .unwrap();

    assert_eq!(page.issues.len(), 1);
    assert_eq!(page.next_page_token.as_deref(), Some("tok-2"));
    assert!(!page.is_final());
}
