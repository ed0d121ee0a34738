//! Policy ingestion pipeline
//!
//! ```text
//! analyze_url ─▶ PENDING row + job ─▶ spawned task
//!                                      │ PROCESSING
//!                                      │ fetch page (timeout, cancellable)
//!                                      │ strip markup, truncate
//!                                      │ summarize (cancellable)
//!                                      ▼ COMPLETED | FAILED(error)
//! ```
//!
//! Any failure in the task, including cancellation, ends in `FAILED` with an
//! error message; the row only stays `PROCESSING` if the process dies, and
//! the startup sweep handles that case.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{error, info, warn};
use url::Url;

use crate::auth::RequestContext;
use crate::db::models::{Policy, PolicyAnalysisChanges};
use crate::db::policies::{self, process_status};
use crate::db::Database;
use crate::error::NexusError;
use crate::summarizer::{
    build_prompt, parse_analysis, truncate_content, Summarizer, MAX_CONTENT_CHARS,
};

use super::events::{EventBus, NexusEvent};
use super::jobs::{CancelToken, JobRegistry, JobSnapshot};

const CANCELLED: &str = "cancelled";
const NOT_CONFIGURED: &str = "summarizer not configured";
const TEXT_WIDTH: usize = 120;

/// Reply to an accepted analysis request
#[derive(Debug, Clone)]
pub struct AnalysisAccepted {
    pub policy_id: i32,
    pub job_id: String,
    pub status: String,
}

/// Everything the detached task needs
#[derive(Clone)]
struct Pipeline {
    db: Database,
    events: Arc<EventBus>,
    jobs: JobRegistry,
    summarizer: Option<Arc<dyn Summarizer>>,
    http: Client,
}

pub struct PolicyService {
    pipeline: Pipeline,
}

impl PolicyService {
    pub fn new(
        db: Database,
        events: Arc<EventBus>,
        jobs: JobRegistry,
        summarizer: Option<Arc<dyn Summarizer>>,
        fetch_timeout: Duration,
    ) -> Result<Self, NexusError> {
        let http = Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| NexusError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            pipeline: Pipeline {
                db,
                events,
                jobs,
                summarizer,
                http,
            },
        })
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn list(&self, ctx: &RequestContext) -> Result<Vec<Policy>, NexusError> {
        self.pipeline
            .db
            .with_conn(|conn| policies::list_policies(conn, ctx.scope))
    }

    pub fn get(&self, ctx: &RequestContext, id: i32) -> Result<Policy, NexusError> {
        self.pipeline
            .db
            .with_conn(|conn| policies::get_policy(conn, ctx.scope, id))?
            .ok_or_else(|| NexusError::NotFound(format!("policy {}", id)))
    }

    pub fn job(&self, ctx: &RequestContext, job_id: &str) -> Result<JobSnapshot, NexusError> {
        self.pipeline
            .jobs
            .get(job_id, ctx.scope)
            .ok_or_else(|| NexusError::NotFound(format!("job {}", job_id)))
    }

    pub fn cancel_job(&self, ctx: &RequestContext, job_id: &str) -> Result<JobSnapshot, NexusError> {
        self.pipeline.jobs.cancel(job_id, ctx.scope)
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Record the request and start analysis in the background
    pub fn analyze_url(&self, ctx: &RequestContext, url: &str) -> Result<AnalysisAccepted, NexusError> {
        let url = validate_url(url)?;

        let policy = self.pipeline.db.with_conn(|conn| {
            policies::create_pending(conn, ctx.scope, url.as_str(), Some(ctx.user_id))
        })?;
        let (job, cancel) = self.pipeline.jobs.register(policy.id, ctx.scope);
        info!(policy_id = policy.id, job_id = %job.job_id, env = %ctx.scope, url = %url, "Policy analysis queued");

        let pipeline = self.pipeline.clone();
        let job_id = job.job_id.clone();
        tokio::spawn(async move {
            pipeline.run(policy.id, job_id, url, cancel).await;
        });

        Ok(AnalysisAccepted {
            policy_id: policy.id,
            job_id: job.job_id,
            status: job.status,
        })
    }

    /// Fail rows a previous process left `PENDING`/`PROCESSING`
    pub fn sweep_interrupted(&self) -> Result<usize, NexusError> {
        let swept = self.pipeline.db.with_conn(policies::fail_interrupted)?;
        if swept > 0 {
            warn!(count = swept, "Marked interrupted policy analyses as failed");
        }
        Ok(swept)
    }
}

fn validate_url(raw: &str) -> Result<Url, NexusError> {
    let url = Url::parse(raw.trim()).map_err(|e| NexusError::field("url", e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(NexusError::field("url", format!("unsupported scheme '{}'", other))),
    }
}

fn cancelled() -> NexusError {
    NexusError::Upstream(CANCELLED.into())
}

impl Pipeline {
    async fn run(self, policy_id: i32, job_id: String, url: Url, mut cancel: CancelToken) {
        let (status, error) = match self.process(policy_id, &job_id, &url, &mut cancel).await {
            Ok(()) => (process_status::COMPLETED, None),
            Err(err) => {
                let message = match err {
                    NexusError::Upstream(msg) => msg,
                    other => other.to_string(),
                };
                warn!(policy_id, job_id = %job_id, error = %message, "Policy analysis failed");
                if let Err(e) = self.db.with_conn(|conn| {
                    policies::set_process_status(conn, policy_id, process_status::FAILED, Some(&message))
                }) {
                    error!(policy_id, error = %e, "Failed to record policy failure");
                }
                (process_status::FAILED, Some(message))
            }
        };

        self.jobs.finish(&job_id, status, error.clone());
        self.events.emit(NexusEvent::PolicyStatusChanged {
            policy_id,
            status: status.to_string(),
            error,
        });
    }

    async fn process(
        &self,
        policy_id: i32,
        job_id: &str,
        url: &Url,
        cancel: &mut CancelToken,
    ) -> Result<(), NexusError> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        self.db.with_conn(|conn| {
            policies::set_process_status(conn, policy_id, process_status::PROCESSING, None)
        })?;
        self.jobs.set_status(job_id, process_status::PROCESSING);

        let summarizer = self
            .summarizer
            .clone()
            .ok_or_else(|| NexusError::Upstream(NOT_CONFIGURED.into()))?;

        let html = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            page = self.fetch(url) => page?,
        };
        let text = html2text::from_read(html.as_bytes(), TEXT_WIDTH)
            .map_err(|e| NexusError::Upstream(format!("failed to read page: {}", e)))?;
        let content = truncate_content(text.trim(), MAX_CONTENT_CHARS);

        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let prompt = build_prompt(&content);
        let reply = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            reply = summarizer.summarize(&prompt) => reply?,
        };
        let analysis = parse_analysis(&reply)?;

        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let changes = PolicyAnalysisChanges {
            title: Some(analysis.title.unwrap_or_else(|| "Untitled Policy".to_string())),
            content: Some(content),
            summary: analysis.summary,
            publish_city: analysis.publish_city,
            publish_year: analysis.publish_year,
            industry_tags: analysis.industry_tags,
            mind_map_json: analysis.mind_map.map(|m| m.to_string()),
        };
        self.db
            .with_conn(|conn| policies::complete_policy(conn, policy_id, &changes))?;
        info!(policy_id, job_id, backend = summarizer.id(), "Policy analysis completed");
        Ok(())
    }

    async fn fetch(&self, url: &Url) -> Result<String, NexusError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| NexusError::Upstream(format!("fetch failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NexusError::Upstream(format!("fetch returned HTTP {}", status)));
        }
        response
            .text()
            .await
            .map_err(|e| NexusError::Upstream(format!("fetch body unreadable: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::EnvScope;
    use crate::db::users::{self, CreateUserInput};
    use crate::services::enterprise_service::tests::ctx;
    use crate::summarizer::MockSummarizer;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Service over a fresh database whose first user (id 1) is the `ctx()` caller
    fn service(summarizer: Option<Arc<dyn Summarizer>>) -> PolicyService {
        let db = Database::open_in_memory().unwrap();
        let caller = db
            .with_conn(|conn| {
                users::create_user(
                    conn,
                    &CreateUserInput {
                        username: "ana".into(),
                        email: "ana@corp.example".into(),
                        password_hash: "unused".into(),
                        role: "ARCHITECT".into(),
                        env_scope: EnvScope::Prod,
                        first_name: None,
                        region: None,
                        department: None,
                        manager_id: None,
                    },
                )
            })
            .unwrap();
        assert_eq!(caller.id, ctx(EnvScope::Prod).user_id);

        PolicyService::new(
            db,
            Arc::new(EventBus::new()),
            JobRegistry::new(),
            summarizer,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    async fn wait_terminal(svc: &PolicyService, ctx: &RequestContext, id: i32) -> Policy {
        for _ in 0..250 {
            let policy = svc.get(ctx, id).unwrap();
            if process_status::is_terminal(&policy.process_status) {
                return policy;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("policy {} never reached a terminal status", id);
    }

    #[tokio::test]
    async fn test_non_200_page_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let svc = service(Some(Arc::new(MockSummarizer::default())));
        let demo = ctx(EnvScope::Demo);
        let accepted = svc.analyze_url(&demo, &format!("{}/missing", server.uri())).unwrap();
        assert_eq!(accepted.status, process_status::PENDING);

        let policy = wait_terminal(&svc, &demo, accepted.policy_id).await;
        assert_eq!(policy.process_status, process_status::FAILED);
        assert!(policy.error_message.unwrap().contains("404"));
        let job = svc.job(&demo, &accepted.job_id).unwrap();
        assert_eq!(job.status, process_status::FAILED);
    }

    #[tokio::test]
    async fn test_unreachable_host_fails() {
        let svc = service(Some(Arc::new(MockSummarizer::default())));
        let demo = ctx(EnvScope::Demo);
        let accepted = svc.analyze_url(&demo, "http://127.0.0.1:9/policy").unwrap();
        let policy = wait_terminal(&svc, &demo, accepted.policy_id).await;
        assert_eq!(policy.process_status, process_status::FAILED);
    }

    #[tokio::test]
    async fn test_page_is_summarized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/policy"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><h1>人工智能扶持办法</h1><p>补贴</p></body></html>"),
            )
            .mount(&server)
            .await;

        let mock = Arc::new(MockSummarizer::default());
        let svc = service(Some(mock.clone()));
        let prod = ctx(EnvScope::Prod);
        let accepted = svc.analyze_url(&prod, &format!("{}/policy", server.uri())).unwrap();

        let policy = wait_terminal(&svc, &prod, accepted.policy_id).await;
        assert_eq!(policy.process_status, process_status::COMPLETED);
        assert_eq!(policy.title.as_deref(), Some("Mock Policy"));
        let content = policy.content.unwrap();
        assert!(content.contains("人工智能扶持办法"));
        assert!(!content.contains("<h1>"));
        assert!(policy.mind_map_json.is_some());
        assert_eq!(mock.call_count(), 1);
        assert_eq!(policy.created_by, Some(prod.user_id));

        // Other scope never sees the row or the job
        assert!(svc.get(&ctx(EnvScope::Demo), accepted.policy_id).is_err());
        assert!(svc.job(&ctx(EnvScope::Demo), &accepted.job_id).is_err());
    }

    #[tokio::test]
    async fn test_missing_summarizer_fails() {
        let svc = service(None);
        let demo = ctx(EnvScope::Demo);
        let accepted = svc.analyze_url(&demo, "https://example.invalid/p").unwrap();
        let policy = wait_terminal(&svc, &demo, accepted.policy_id).await;
        assert_eq!(policy.error_message.as_deref(), Some(NOT_CONFIGURED));
    }

    #[tokio::test]
    async fn test_cancel_during_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let svc = service(Some(Arc::new(MockSummarizer::default())));
        let demo = ctx(EnvScope::Demo);
        let accepted = svc.analyze_url(&demo, &format!("{}/slow", server.uri())).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        svc.cancel_job(&demo, &accepted.job_id).unwrap();

        let policy = wait_terminal(&svc, &demo, accepted.policy_id).await;
        assert_eq!(policy.process_status, process_status::FAILED);
        assert_eq!(policy.error_message.as_deref(), Some(CANCELLED));
    }

    #[test]
    fn test_url_validation() {
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("https://gov.cn/p?id=1").is_ok());
    }
}
