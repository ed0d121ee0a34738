//! Enterprise Nexus - relationship tracking for AI ecosystem partners
//!
//! A single HTTP service over SQLite. Every record lives in exactly one
//! environment scope (`DEMO` or `PROD`) and each request sees only the
//! scope carried in its bearer token.
//!
//! ## Layout
//!
//! ```text
//! ~/.local/share/enterprise-nexus/
//! ├── nexus.db        # SQLite database
//! ├── backups/        # nexus-<timestamp>.db snapshots
//! └── config.toml     # Saved configuration (no secrets)
//! ```
//!
//! ## Modules
//!
//! - `auth` - tokens, password hashing, roles and capabilities, scopes
//! - `db` - connection pool, schema and scope-filtered repositories
//! - `services` - validation and orchestration, async policy jobs, events
//! - `summarizer` - policy summarization backends
//! - `views` - camelCase response shapes (also exported as TypeScript)
//! - `http` - the hyper router

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod services;
pub mod summarizer;
pub mod views;

pub use auth::{Authenticator, EnvScope, RequestContext};
pub use config::{Args, Config};
pub use db::Database;
pub use error::NexusError;
pub use http::HttpServer;
pub use services::Services;
