// Jira REST client.
//
// Stateless per integration: credentials are injected at construction and
// never cached across workers. Transient failures (transport, 5xx) retry
// with exponential backoff; 404 means "no data"; 429 surfaces as a typed
// rate-limit error carrying the reset instant and is never retried here.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use workpulse_core::{PipelineError, Result};

use crate::types::{ApproximateCount, SearchPage, ValuesPage};

/// Per-page progress callback: (fetched_so_far, expected_total)
pub type ProgressHook = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

#[derive(Clone)]
pub struct JiraClient {
    http: Client,
    base_url: String,
    username: String,
    api_token: String,
    max_retries: u32,
    retry_base_delay: Duration,
    progress: Option<ProgressHook>,
}

impl JiraClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        api_token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PipelineError::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            api_token: api_token.into(),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            progress: None,
        })
    }

    /// Install a per-page progress callback
    pub fn with_progress_hook(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    /// Override the backoff base delay (tests)
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn report_progress(&self, current: u64, total: Option<u64>) {
        if let Some(hook) = &self.progress {
            hook(current, total);
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.username, Some(&self.api_token))
    }

    /// Send with retry. Returns Ok(None) on 404.
    async fn send_with_retry(&self, request: RequestBuilder) -> Result<Option<Response>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let cloned = request.try_clone().ok_or_else(|| {
                PipelineError::provider("Request body is not cloneable for retry")
            })?;

            match self.authed(cloned).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let reset_at = parse_rate_limit_reset(&response);
                        return Err(PipelineError::RateLimited { reset_at });
                    }
                    if status.is_server_error() {
                        if attempt >= self.max_retries {
                            return Err(PipelineError::provider(format!(
                                "Provider returned {status} after {attempt} attempts"
                            )));
                        }
                        self.backoff(attempt).await;
                        continue;
                    }
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(PipelineError::provider(format!(
                            "Provider returned {status}: {body}"
                        )));
                    }
                    return Ok(Some(response));
                }
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(PipelineError::provider(format!(
                            "Request failed after {attempt} attempts: {err}"
                        )));
                    }
                    tracing::warn!(attempt, error = %err, "request failed, retrying");
                    self.backoff(attempt).await;
                }
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.retry_base_delay * 2u32.saturating_pow(attempt);
        tokio::time::sleep(delay).await;
    }

    // ============================================
    // Issue search
    // ============================================

    /// One page of the token-paginated issue search, changelog embedded
    pub async fn search_jql_page(
        &self,
        jql: &str,
        max_results: u32,
        next_page_token: Option<&str>,
    ) -> Result<SearchPage> {
        let mut body = json!({
            "jql": jql,
            "maxResults": max_results,
            "fields": ["*all"],
            "expand": ["changelog"],
        });
        if let Some(token) = next_page_token {
            body["nextPageToken"] = json!(token);
        }

        let request = self.http.post(self.url("/rest/api/3/search/jql")).json(&body);
        match self.send_with_retry(request).await? {
            Some(response) => response
                .json::<SearchPage>()
                .await
                .map_err(|e| PipelineError::provider(format!("Malformed search payload: {e}"))),
            None => Ok(SearchPage {
                issues: Vec::new(),
                next_page_token: None,
                is_last: Some(true),
            }),
        }
    }

    /// Approximate hit count for a JQL query, used for progress totals
    pub async fn approximate_count(&self, jql: &str) -> Result<i64> {
        let request = self
            .http
            .post(self.url("/rest/api/3/search/approximate-count"))
            .json(&json!({ "jql": jql }));

        match self.send_with_retry(request).await? {
            Some(response) => {
                let parsed: ApproximateCount = response.json().await.map_err(|e| {
                    PipelineError::provider(format!("Malformed count payload: {e}"))
                })?;
                Ok(parsed.count)
            }
            None => Ok(0),
        }
    }

    // ============================================
    // Reference data
    // ============================================

    /// All projects (optionally filtered by keys) expanded with issue types
    pub async fn projects_with_issue_types(
        &self,
        project_keys: &[String],
        page_size: u32,
    ) -> Result<Vec<Value>> {
        let mut all_projects: Vec<Value> = Vec::new();
        let mut start_at: i64 = 0;

        loop {
            let mut query: Vec<(String, String)> = vec![
                ("startAt".into(), start_at.to_string()),
                ("maxResults".into(), page_size.to_string()),
                ("expand".into(), "issueTypes".into()),
            ];
            for key in project_keys {
                query.push(("keys".into(), key.clone()));
            }

            let request = self
                .http
                .get(self.url("/rest/api/3/project/search"))
                .query(&query);

            let page: ValuesPage = match self.send_with_retry(request).await? {
                Some(response) => response.json().await.map_err(|e| {
                    PipelineError::provider(format!("Malformed project payload: {e}"))
                })?,
                None => return Ok(all_projects),
            };

            let fetched = page.values.len();
            all_projects.extend(page.values.iter().cloned());
            self.report_progress(
                all_projects.len() as u64,
                page.total.map(|t| t as u64),
            );

            if page.is_final(all_projects.len(), page_size) || fetched == 0 {
                return Ok(all_projects);
            }
            start_at += fetched as i64;
        }
    }

    /// Statuses grouped by issue type for one project; 404 means no data
    pub async fn project_statuses(&self, project_id: &str) -> Result<Vec<Value>> {
        let request = self
            .http
            .get(self.url(&format!("/rest/api/3/project/{project_id}/statuses")));

        match self.send_with_retry(request).await? {
            Some(response) => response
                .json::<Vec<Value>>()
                .await
                .map_err(|e| PipelineError::provider(format!("Malformed statuses payload: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    /// Field catalog search; `query` narrows by field name
    pub async fn field_search(&self, query: Option<&str>, page_size: u32) -> Result<Vec<Value>> {
        let mut all_fields: Vec<Value> = Vec::new();
        let mut start_at: i64 = 0;

        loop {
            let mut params: Vec<(String, String)> = vec![
                ("startAt".into(), start_at.to_string()),
                ("maxResults".into(), page_size.to_string()),
            ];
            if let Some(q) = query {
                params.push(("query".into(), q.to_string()));
            }

            let request = self
                .http
                .get(self.url("/rest/api/3/field/search"))
                .query(&params);

            let page: ValuesPage = match self.send_with_retry(request).await? {
                Some(response) => response.json().await.map_err(|e| {
                    PipelineError::provider(format!("Malformed field payload: {e}"))
                })?,
                None => return Ok(all_fields),
            };

            let fetched = page.values.len();
            all_fields.extend(page.values.iter().cloned());
            self.report_progress(all_fields.len() as u64, page.total.map(|t| t as u64));

            if page.is_final(all_fields.len(), page_size) || fetched == 0 {
                return Ok(all_fields);
            }
            start_at += fetched as i64;
        }
    }

    /// Create-metadata field discovery for the given projects
    pub async fn createmeta_fields(&self, project_keys: &[String]) -> Result<Value> {
        let mut query: Vec<(String, String)> = vec![(
            "expand".into(),
            "projects.issuetypes.fields".into(),
        )];
        for key in project_keys {
            query.push(("projectKeys".into(), key.clone()));
        }

        let request = self
            .http
            .get(self.url("/rest/api/3/issue/createmeta"))
            .query(&query);

        match self.send_with_retry(request).await? {
            Some(response) => response
                .json::<Value>()
                .await
                .map_err(|e| PipelineError::provider(format!("Malformed createmeta payload: {e}"))),
            None => Ok(json!({ "projects": [] })),
        }
    }

    // ============================================
    // Dev status
    // ============================================

    /// Source-control activity index for one issue; None when the provider
    /// has nothing for it.
    pub async fn dev_status(&self, issue_id: &str) -> Result<Option<Value>> {
        let request = self
            .http
            .get(self.url("/rest/dev-status/latest/issue/detail"))
            .query(&[
                ("issueId", issue_id),
                ("applicationType", "GitHub"),
                ("dataType", "branch"),
            ]);

        match self.send_with_retry(request).await? {
            Some(response) => {
                let payload: Value = response.json().await.map_err(|e| {
                    PipelineError::provider(format!("Malformed dev-status payload: {e}"))
                })?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }
}

/// Extract the rate-limit reset instant from response headers:
/// Retry-After (delta seconds) first, then X-RateLimit-Reset (RFC 3339 or
/// epoch seconds).
fn parse_rate_limit_reset(response: &Response) -> Option<DateTime<Utc>> {
    let headers = response.headers();

    if let Some(retry_after) = headers.get("Retry-After") {
        if let Ok(secs) = retry_after.to_str().unwrap_or_default().parse::<i64>() {
            return Some(Utc::now() + chrono::Duration::seconds(secs));
        }
    }

    if let Some(reset) = headers.get("X-RateLimit-Reset") {
        let raw = reset.to_str().unwrap_or_default();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        if let Ok(epoch) = raw.parse::<i64>() {
            return Utc.timestamp_opt(epoch, 0).single();
        }
    }

    None
}
