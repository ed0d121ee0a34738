//! HTTP API for enterprise-nexus
//!
//! ## Public
//! - `GET /health`, `GET /api/health` - liveness and database probe
//! - `POST /api/auth/login`, `POST /api/auth/demo-login` - issue tokens
//!
//! ## Authenticated (Bearer token; scope comes from the token)
//! - `/api/auth/profile`, `/api/auth/change-password`, `/api/auth/register`
//! - `/api/enterprises[/{id}]`, `/api/enterprises/stats/summary`,
//!   `/api/enterprises/map-data`, `/api/enterprises/quick-parse`
//! - `/api/dashboard/{stats,charts,recent-activities}`
//! - `/api/policies[/{id}]`, `/api/policies/analyze-url`,
//!   `/api/policies/jobs/{jobId}[/cancel]`
//! - `/api/sync/{export,import,validate}`
//! - `/api/data/{export,import,template}`
//! - `/api/reports[/{id}[/download]]`, `/api/reports/stats/summary`
//! - `/api/comments`, `/api/notifications[/{id}/read]`
//! - `/api/users`, `/api/admin/dashboard/{users,god-view}`, `/api/admin/backup`
//!
//! Each authenticated route requires exactly one capability of the
//! caller's role, except the caller's own profile, password and
//! notifications which need only a valid token. Every response carries
//! permissive CORS headers.
//!
//! ```bash
//! TOKEN=$(curl -s -XPOST localhost:3001/api/auth/login \
//!   -d '{"username":"root","password":"secret123"}' | jq -r .accessToken)
//! curl -H "Authorization: Bearer $TOKEN" 'localhost:3001/api/enterprises?priority=P0'
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body as HttpBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::Capability;
use crate::db::enterprises::EnterpriseQuery;
use crate::db::snapshot::snapshot_database;
use crate::error::NexusError;
use crate::services::auth_service::{ChangePasswordInput, LoginInput, RegisterInput};
use crate::services::comment_service::CommentInput;
use crate::services::enterprise_service::EnterpriseInput;
use crate::services::import_export::ExportFilter;
use crate::services::intake::parse_transcript;
use crate::services::report_service::{ReportInput, XLSX_CONTENT_TYPE};
use crate::services::response::{
    accepted, attachment, created, error_response, no_content, ok, with_cors, Body, HandlerResult,
};
use crate::services::sync_service::SyncBatch;
use crate::services::Services;
use crate::views::*;

/// Request bodies above this size are rejected
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Deserialize)]
struct UrlInput {
    url: String,
}

#[derive(Debug, Deserialize)]
struct TextInput {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct SinceQuery {
    #[serde(default)]
    since: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentQuery {
    #[serde(rename = "type")]
    target_type: String,
    id: i32,
}

fn query<T: DeserializeOwned>(uri: &hyper::Uri) -> Result<T, NexusError> {
    serde_urlencoded::from_str(uri.query().unwrap_or(""))
        .map_err(|e| NexusError::InvalidInput(format!("invalid query string: {}", e)))
}

async fn read_body<B>(req: Request<B>) -> Result<Bytes, NexusError>
where
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    let collected = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                NexusError::InvalidInput("request body too large".into())
            } else {
                NexusError::InvalidInput(format!("failed to read body: {}", e))
            }
        })?;
    Ok(collected.to_bytes())
}

async fn read_json<T, B>(req: Request<B>) -> Result<T, NexusError>
where
    T: DeserializeOwned,
    B: HttpBody,
    B::Error: Into<BoxError>,
{
    let bytes = read_body(req).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| NexusError::InvalidInput(format!("invalid JSON body: {}", e)))
}

fn parse_id(raw: &str) -> Result<i32, NexusError> {
    raw.parse()
        .map_err(|_| NexusError::NotFound(format!("no record with id '{}'", raw)))
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
    backups_dir: PathBuf,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr, backups_dir: PathBuf) -> Self {
        Self {
            services,
            bind_addr,
            backups_dir,
        }
    }

    /// Accept connections until the shutdown signal fires
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> Result<(), NexusError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = tokio::select! {
                conn = listener.accept() => conn?,
                _ = shutdown.recv() => {
                    info!("HTTP server shutting down");
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route a request; errors become JSON bodies, CORS is always added
    pub async fn handle_request<B>(&self, req: Request<B>) -> Result<Response<Body>, hyper::Error>
    where
        B: HttpBody,
        B::Error: Into<BoxError>,
    {
        debug!(method = %req.method(), path = %req.uri().path(), "Incoming request");
        let response = match self.route(req).await {
            Ok(resp) => resp,
            Err(err) => error_response(err),
        };
        Ok(with_cors(response))
    }

    async fn route<B>(&self, req: Request<B>) -> HandlerResult
    where
        B: HttpBody,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        let path = req.uri().path().trim_end_matches('/').to_string();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        // Public routes
        match (&method, segments.as_slice()) {
            (&Method::OPTIONS, _) => return Ok(no_content()),
            (&Method::GET, ["health"]) | (&Method::GET, ["api", "health"]) => {
                return Ok(self.handle_health())
            }
            (&Method::POST, ["api", "auth", "login"]) => {
                let input: LoginInput = read_json(req).await?;
                let result = self.services.auth.login(input)?;
                return Ok(ok(&LoginView::from(result)));
            }
            (&Method::POST, ["api", "auth", "demo-login"]) => {
                let result = self.services.auth.demo_login()?;
                return Ok(ok(&LoginView::from(result)));
            }
            _ => {}
        }

        let auth_header = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let ctx = self.services.auth.authenticator().authenticate(auth_header)?;

        match (&method, segments.as_slice()) {
            // Account
            (&Method::GET, ["api", "auth", "profile"]) => {
                Ok(ok(&UserView::from(self.services.auth.profile(&ctx)?)))
            }
            (&Method::POST, ["api", "auth", "change-password"]) => {
                let input: ChangePasswordInput = read_json(req).await?;
                self.services.auth.change_password(&ctx, input)?;
                Ok(ok(&serde_json::json!({ "success": true })))
            }
            (&Method::POST, ["api", "auth", "register"]) => {
                ctx.require(Capability::ManageUsers)?;
                let input: RegisterInput = read_json(req).await?;
                Ok(created(&UserView::from(self.services.auth.register(&ctx, input)?)))
            }
            (&Method::GET, ["api", "users"]) | (&Method::GET, ["api", "admin", "dashboard", "users"]) => {
                ctx.require(Capability::ManageUsers)?;
                let users: Vec<UserView> = self
                    .services
                    .auth
                    .list_users()?
                    .into_iter()
                    .map(UserView::from)
                    .collect();
                Ok(ok(&users))
            }

            // Admin
            (&Method::GET, ["api", "admin", "dashboard", "god-view"]) => {
                ctx.require(Capability::ViewGlobalDashboard)?;
                Ok(ok(&GodViewView::from(self.services.dashboard.god_view(&ctx)?)))
            }
            (&Method::POST, ["api", "admin", "backup"]) => {
                ctx.require(Capability::ManageSystem)?;
                self.handle_backup().await
            }

            // Enterprises
            (&Method::GET, ["api", "enterprises"]) => {
                ctx.require(Capability::ReadEnterprises)?;
                let q: EnterpriseQuery = query(req.uri())?;
                Ok(ok(&EnterprisePageView::from(self.services.enterprises.list(&ctx, &q)?)))
            }
            (&Method::POST, ["api", "enterprises"]) => {
                ctx.require(Capability::WriteEnterprises)?;
                let input: EnterpriseInput = read_json(req).await?;
                Ok(created(&EnterpriseView::from(self.services.enterprises.create(&ctx, input)?)))
            }
            (&Method::GET, ["api", "enterprises", "stats", "summary"]) => {
                ctx.require(Capability::ReadEnterprises)?;
                Ok(ok(&SummaryView::from(self.services.enterprises.summary(&ctx)?)))
            }
            (&Method::GET, ["api", "enterprises", "map-data"]) => {
                ctx.require(Capability::ReadEnterprises)?;
                let points: Vec<MapPointView> = self
                    .services
                    .enterprises
                    .map_data(&ctx)?
                    .into_iter()
                    .map(MapPointView::from)
                    .collect();
                Ok(ok(&points))
            }
            (&Method::POST, ["api", "enterprises", "quick-parse"]) => {
                ctx.require(Capability::WriteEnterprises)?;
                let input: TextInput = read_json(req).await?;
                Ok(ok(&parse_transcript(&input.text)))
            }
            (&Method::GET, ["api", "enterprises", id]) => {
                ctx.require(Capability::ReadEnterprises)?;
                let id = parse_id(id)?;
                Ok(ok(&EnterpriseView::from(self.services.enterprises.get(&ctx, id)?)))
            }
            (&Method::PUT, ["api", "enterprises", id]) => {
                ctx.require(Capability::WriteEnterprises)?;
                let id = parse_id(id)?;
                let input: EnterpriseInput = read_json(req).await?;
                Ok(ok(&EnterpriseView::from(self.services.enterprises.update(&ctx, id, input)?)))
            }
            (&Method::DELETE, ["api", "enterprises", id]) => {
                ctx.require(Capability::DeleteEnterprises)?;
                self.services.enterprises.delete(&ctx, parse_id(id)?)?;
                Ok(ok(&serde_json::json!({ "success": true })))
            }

            // Dashboard
            (&Method::GET, ["api", "dashboard", "stats"]) => {
                ctx.require(Capability::ViewDashboard)?;
                Ok(ok(&StatsView::from(self.services.dashboard.stats(&ctx)?)))
            }
            (&Method::GET, ["api", "dashboard", "charts"]) => {
                ctx.require(Capability::ViewDashboard)?;
                Ok(ok(&ChartsView::from(self.services.dashboard.charts(&ctx)?)))
            }
            (&Method::GET, ["api", "dashboard", "recent-activities"]) => {
                ctx.require(Capability::ViewDashboard)?;
                let feed: Vec<ActivityView> = self
                    .services
                    .dashboard
                    .recent_activities(&ctx)?
                    .into_iter()
                    .map(ActivityView::from)
                    .collect();
                Ok(ok(&feed))
            }

            // Policies
            (&Method::GET, ["api", "policies"]) => {
                ctx.require(Capability::ReadPolicies)?;
                let policies: Vec<PolicyView> = self
                    .services
                    .policies
                    .list(&ctx)?
                    .into_iter()
                    .map(PolicyView::from)
                    .collect();
                Ok(ok(&policies))
            }
            (&Method::POST, ["api", "policies", "analyze-url"]) => {
                ctx.require(Capability::AnalyzePolicy)?;
                let input: UrlInput = read_json(req).await?;
                let started = self.services.policies.analyze_url(&ctx, &input.url)?;
                Ok(accepted(&AnalysisAcceptedView::from(started)))
            }
            (&Method::GET, ["api", "policies", "jobs", job_id]) => {
                ctx.require(Capability::ReadPolicies)?;
                Ok(ok(&JobView::from(self.services.policies.job(&ctx, job_id)?)))
            }
            (&Method::POST, ["api", "policies", "jobs", job_id, "cancel"]) => {
                ctx.require(Capability::AnalyzePolicy)?;
                Ok(ok(&JobView::from(self.services.policies.cancel_job(&ctx, job_id)?)))
            }
            (&Method::GET, ["api", "policies", id]) => {
                ctx.require(Capability::ReadPolicies)?;
                Ok(ok(&PolicyView::from(self.services.policies.get(&ctx, parse_id(id)?)?)))
            }

            // Sync
            (&Method::GET, ["api", "sync", "export"]) => {
                ctx.require(Capability::SyncExport)?;
                let q: SinceQuery = query(req.uri())?;
                let envelope = self.services.sync.export(&ctx, q.since.as_deref())?;
                Ok(ok(&ExportEnvelopeView::from(envelope)))
            }
            (&Method::POST, ["api", "sync", "import"]) => {
                ctx.require(Capability::SyncImport)?;
                let batch: SyncBatch = read_json(req).await?;
                Ok(ok(&ImportReportView::from(self.services.sync.import(&ctx, batch)?)))
            }
            (&Method::POST, ["api", "sync", "validate"]) => {
                ctx.require(Capability::SyncImport)?;
                let batch: SyncBatch = read_json(req).await?;
                Ok(ok(&ValidationReportView::from(self.services.sync.validate(&ctx, &batch)?)))
            }

            // Spreadsheet import/export
            (&Method::GET, ["api", "data", "export"]) => {
                ctx.require(Capability::ExportData)?;
                let filter: ExportFilter = query(req.uri())?;
                let file = self.services.data.export(&ctx, &filter)?;
                Ok(attachment(file.content_type, &file.filename, file.bytes))
            }
            (&Method::POST, ["api", "data", "import"]) => {
                ctx.require(Capability::ImportData)?;
                let bytes = read_body(req).await?;
                let text = std::str::from_utf8(&bytes)
                    .map_err(|_| NexusError::InvalidInput("CSV must be UTF-8".into()))?;
                Ok(ok(&self.services.data.import_csv(&ctx, text)?))
            }
            (&Method::GET, ["api", "data", "template"]) => {
                ctx.require(Capability::ImportData)?;
                Ok(ok(&self.services.data.template()))
            }

            // Intelligence reports
            (&Method::POST, ["api", "reports"]) => {
                ctx.require(Capability::ExportData)?;
                let input: ReportInput = read_json(req).await?;
                Ok(created(&ReportView::from(self.services.reports.generate(&ctx, input)?)))
            }
            (&Method::GET, ["api", "reports"]) => {
                ctx.require(Capability::ExportData)?;
                let reports: Vec<ReportView> = self
                    .services
                    .reports
                    .list(&ctx)?
                    .into_iter()
                    .map(ReportView::from)
                    .collect();
                Ok(ok(&reports))
            }
            (&Method::GET, ["api", "reports", "stats", "summary"]) => {
                ctx.require(Capability::ExportData)?;
                Ok(ok(&ReportStatsView::from(self.services.reports.stats(&ctx)?)))
            }
            (&Method::GET, ["api", "reports", id]) => {
                ctx.require(Capability::ExportData)?;
                Ok(ok(&ReportView::from(self.services.reports.get(&ctx, parse_id(id)?)?)))
            }
            (&Method::GET, ["api", "reports", id, "download"]) => {
                ctx.require(Capability::ExportData)?;
                let file = self.services.reports.download(&ctx, parse_id(id)?)?;
                Ok(attachment(XLSX_CONTENT_TYPE, &file.filename, file.bytes))
            }
            (&Method::DELETE, ["api", "reports", id]) => {
                ctx.require(Capability::ExportData)?;
                self.services.reports.delete(&ctx, parse_id(id)?)?;
                Ok(ok(&serde_json::json!({ "success": true })))
            }

            // Comments and notifications
            (&Method::POST, ["api", "comments"]) => {
                ctx.require(Capability::Comment)?;
                let input: CommentInput = read_json(req).await?;
                Ok(created(&CommentView::from(self.services.comments.create(&ctx, input)?)))
            }
            (&Method::GET, ["api", "comments"]) => {
                ctx.require(Capability::Comment)?;
                let q: CommentQuery = query(req.uri())?;
                let comments: Vec<CommentView> = self
                    .services
                    .comments
                    .list(&ctx, &q.target_type, q.id)?
                    .into_iter()
                    .map(CommentView::from)
                    .collect();
                Ok(ok(&comments))
            }
            (&Method::GET, ["api", "notifications"]) => {
                let inbox: Vec<NotificationView> = self
                    .services
                    .comments
                    .notifications(&ctx)?
                    .into_iter()
                    .map(NotificationView::from)
                    .collect();
                Ok(ok(&inbox))
            }
            (&Method::POST, ["api", "notifications", id, "read"]) => {
                self.services.comments.mark_read(&ctx, parse_id(id)?)?;
                Ok(ok(&serde_json::json!({ "success": true })))
            }

            _ => Err(NexusError::NotFound(format!("{} {}", method, path))),
        }
    }

    fn handle_health(&self) -> Response<Body> {
        let database = match self.services.db.ping() {
            Ok(()) => "ok",
            Err(e) => {
                warn!(error = %e, "Health check database probe failed");
                "error"
            }
        };
        ok(&HealthView {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            database: database.into(),
        })
    }

    async fn handle_backup(&self) -> HandlerResult {
        let source = self.services.db.path().to_string();
        let dir = self.backups_dir.clone();
        let path = tokio::task::spawn_blocking(move || snapshot_database(&source, &dir))
            .await
            .map_err(|e| NexusError::Internal(format!("backup task failed: {}", e)))??;
        Ok(ok(&BackupView {
            path: path.display().to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Authenticator, EnvScope, JwtValidator, MissingScopePolicy, RolePolicy, TokenInput};
    use crate::db::Database;
    use http_body_util::Full;
    use hyper::StatusCode;
    use serde_json::{json, Value};
    use std::time::Duration;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    fn server() -> HttpServer {
        let jwt = JwtValidator::new(SECRET.into(), 600).unwrap();
        let authenticator = Authenticator::new(jwt, RolePolicy::builtin(), MissingScopePolicy::Reject);
        let services = Services::new(
            Database::open_in_memory().unwrap(),
            authenticator,
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        HttpServer::new(
            Arc::new(services),
            "127.0.0.1:0".parse().unwrap(),
            std::env::temp_dir(),
        )
    }

    fn token(role: &str, env: EnvScope) -> String {
        JwtValidator::new(SECRET.into(), 600)
            .unwrap()
            .generate_token(&TokenInput {
                user_id: 1,
                username: "ana".into(),
                role: role.into(),
                env,
            })
            .unwrap()
    }

    async fn call(
        server: &HttpServer,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        let bytes = body.map(|b| b.to_string()).unwrap_or_default();
        let req = builder.body(Full::new(Bytes::from(bytes))).unwrap();
        let resp = server.handle_request(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let server = server();
        let (status, body) = call(&server, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn test_requires_token() {
        let server = server();
        let (status, _) = call(&server, Method::GET, "/api/enterprises", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_enterprise_routes_are_scoped() {
        let server = server();
        let demo = token("operator", EnvScope::Demo);
        let prod = token("operator", EnvScope::Prod);

        let (status, created) = call(
            &server,
            Method::POST,
            "/api/enterprises",
            Some(&demo),
            Some(json!({"name": "Acme AI", "priority": "P0", "isPoweredBy": true})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["envScope"], "DEMO");
        assert_eq!(created["isPoweredBy"], true);
        let id = created["id"].as_i64().unwrap();

        let (_, page) = call(&server, Method::GET, "/api/enterprises?page=0&limit=5", Some(&demo), None).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["limit"], 5);
        let (_, page) = call(&server, Method::GET, "/api/enterprises", Some(&prod), None).await;
        assert_eq!(page["total"], 0);

        let uri = format!("/api/enterprises/{}", id);
        let (status, _) = call(&server, Method::GET, &uri, Some(&prod), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &server,
            Method::POST,
            "/api/enterprises",
            Some(&demo),
            Some(json!({"name": "Bad", "priority": "P7"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "priority");
    }

    #[tokio::test]
    async fn test_role_gate() {
        let server = server();
        let analyst = token("analyst", EnvScope::Demo);
        let (status, _) = call(
            &server,
            Method::POST,
            "/api/enterprises",
            Some(&analyst),
            Some(json!({"name": "Acme AI"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&server, Method::GET, "/api/admin/dashboard/god-view", Some(&analyst), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let cortex = token("CORTEX", EnvScope::Prod);
        let (status, body) = call(&server, Method::GET, "/api/admin/dashboard/god-view", Some(&cortex), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scopes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let server = server();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/enterprises")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = server.handle_request(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_quick_parse_and_backup_guard() {
        let server = server();
        let admin = token("ARCHITECT", EnvScope::Prod);
        let (status, draft) = call(
            &server,
            Method::POST,
            "/api/enterprises/quick-parse",
            Some(&admin),
            Some(json!({"text": "卓望集团【智慧教育】"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(draft["enterpriseName"], "卓望集团");

        // In-memory databases cannot be snapshotted
        let (status, _) = call(&server, Method::POST, "/api/admin/backup", Some(&admin), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_report_lifecycle() {
        let server = server();
        let admin = token("ARCHITECT", EnvScope::Demo);
        let (status, body) = call(
            &server,
            Method::POST,
            "/api/reports",
            Some(&admin),
            Some(json!({"title": "周报", "type": "FORTNIGHTLY"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "type");

        // Reports record their creator, so the caller must exist
        server
            .services
            .db
            .with_conn(|conn| {
                crate::db::users::create_user(
                    conn,
                    &crate::db::users::CreateUserInput {
                        username: "ana".into(),
                        email: "ana@corp.example".into(),
                        password_hash: "unused".into(),
                        role: "ARCHITECT".into(),
                        env_scope: EnvScope::Demo,
                        first_name: None,
                        region: None,
                        department: None,
                        manager_id: None,
                    },
                )
            })
            .unwrap();

        let (status, queued) = call(
            &server,
            Method::POST,
            "/api/reports",
            Some(&admin),
            Some(json!({"title": "周报", "type": "WEEKLY"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(queued["status"], "generating");
        let uri = format!("/api/reports/{}", queued["id"]);

        let mut ready = false;
        for _ in 0..250 {
            let (_, report) = call(&server, Method::GET, &uri, Some(&admin), None).await;
            if report["status"] == "ready" {
                ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(ready);

        let req = Request::builder()
            .uri(format!("{}/download", uri))
            .header(header::AUTHORIZATION, format!("Bearer {}", admin))
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = server.handle_request(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], XLSX_CONTENT_TYPE);

        let (_, stats) = call(&server, Method::GET, "/api/reports/stats/summary", Some(&admin), None).await;
        assert_eq!(stats, json!({"total": 1, "ready": 1}));
        let other = token("ARCHITECT", EnvScope::Prod);
        let (status, _) = call(&server, Method::GET, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&server, Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, list) = call(&server, Method::GET, "/api/reports", Some(&admin), None).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn test_own_inbox_needs_no_capability() {
        let server = server();
        let guest = token("guest", EnvScope::Demo);
        let (status, body) = call(&server, Method::GET, "/api/notifications", Some(&guest), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, _) = call(&server, Method::GET, "/api/enterprises", Some(&guest), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let server = server();
        let admin = token("ARCHITECT", EnvScope::Prod);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/enterprises/quick-parse")
            .header(header::AUTHORIZATION, format!("Bearer {}", admin))
            .body(Full::new(Bytes::from(vec![b' '; MAX_BODY_BYTES + 1])))
            .unwrap();
        let resp = server.handle_request(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert!(value["error"].as_str().unwrap().contains("too large"));
    }
}
