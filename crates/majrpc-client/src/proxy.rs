//! Service-bound call surface.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::{RpcClient, RpcError};

/// Deadline applied when a caller doesn't specify one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// The seam higher layers call through.
///
/// Anything that can issue a named call with arguments and a deadline
/// implements this; production code uses [`ServiceProxy`], tests substitute
/// recording or scripted fakes.
pub trait Caller: Send + Sync {
    /// Issues `method` with `args`, failing if no response arrives
    /// within `timeout`.
    fn call_with_timeout(
        &self,
        method: &str,
        args: Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send;

    /// Issues `method` with the default deadline.
    fn call(
        &self,
        method: &str,
        args: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send {
        self.call_with_timeout(method, args, DEFAULT_CALL_TIMEOUT)
    }
}

/// A client handle bound to one service name.
///
/// Callers address methods by their short name; the proxy supplies the
/// service half of the path. Cloning shares the underlying client.
#[derive(Clone)]
pub struct ServiceProxy {
    service: String,
    client: Arc<RpcClient>,
    default_timeout: Duration,
}

impl ServiceProxy {
    /// Binds `service` on the given client.
    pub fn new(service: impl Into<String>, client: Arc<RpcClient>) -> Self {
        Self {
            service: service.into(),
            client,
            default_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Overrides the deadline used by [`Caller::call`].
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The bound service name.
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Caller for ServiceProxy {
    fn call_with_timeout(
        &self,
        method: &str,
        args: Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send {
        let client = Arc::clone(&self.client);
        let service = self.service.clone();
        let method = method.to_string();
        async move { client.call(&service, &method, args, timeout).await }
    }

    fn call(
        &self,
        method: &str,
        args: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send {
        self.call_with_timeout(method, args, self.default_timeout)
    }
}
