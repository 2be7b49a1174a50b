//! Per-request context threaded through the pipeline

use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Request context
///
/// Carries the request identity, attribution metadata, the provider call
/// timeout, and the cancellation token. The token is propagated to
/// providers, which must stop work promptly once it fires.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request id
    pub request_id: String,
    /// End-user identifier
    pub user_id: Option<String>,
    /// API key the request was authenticated with
    pub api_key_id: Option<String>,
    /// Project the request is billed against
    pub project_id: Option<String>,
    /// Per-provider-call timeout
    pub timeout: Duration,
    /// Cancellation signal from the client
    pub cancellation: CancellationToken,
    /// Free-form metadata
    pub metadata: HashMap<String, String>,
}

impl RequestContext {
    /// Create a context with a fresh request id and the given timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            request_id: format!("req-{}", Uuid::new_v4()),
            user_id: None,
            api_key_id: None,
            project_id: None,
            timeout,
            cancellation: CancellationToken::new(),
            metadata: HashMap::new(),
        }
    }

    /// Attribute the context to a user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user_id = Some(user.into());
        self
    }

    /// Attribute the context to an API key
    pub fn with_api_key(mut self, api_key_id: impl Into<String>) -> Self {
        self.api_key_id = Some(api_key_id.into());
        self
    }

    /// Attribute the context to a project
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Use the given cancellation token instead of a fresh one
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
