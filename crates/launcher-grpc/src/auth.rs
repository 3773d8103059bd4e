// ABOUTME: Bearer token header provider for broker calls.
// ABOUTME: A single-slot token cell read by the interceptor and replaced on token refresh.

use std::fmt;
use std::sync::{Arc, RwLock};

use tonic::metadata::MetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Metadata key carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Stamps `authorization: Bearer <token>` on every outgoing call.
///
/// Clones share the same slot, so a token set through one clone is what
/// every other clone stamps from then on. The slot holds a whole
/// `Arc<str>`; readers never see a partially written token.
#[derive(Clone, Default)]
pub struct HeaderProvider {
    token: Arc<RwLock<Option<Arc<str>>>>,
}

impl HeaderProvider {
    /// Provider seeded with an initial token.
    pub fn new(token: impl Into<String>) -> Self {
        let provider = Self::default();
        provider.set(token);
        provider
    }

    /// Replace the active token. Last writer wins.
    pub fn set(&self, token: impl Into<String>) {
        let token: Arc<str> = Arc::from(token.into());
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(token);
    }

    /// The token that the next call will carry.
    pub fn current(&self) -> Option<Arc<str>> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Stamp the current token on a request.
    ///
    /// Without a token the request goes out unauthenticated and the broker
    /// rejects it.
    pub fn apply<T>(&self, request: &mut Request<T>) -> Result<(), Status> {
        let Some(token) = self.current() else {
            return Ok(());
        };

        let value: MetadataValue<_> = format!("Bearer {}", token)
            .parse()
            .map_err(|_| Status::internal("invalid token format"))?;
        request.metadata_mut().insert(AUTHORIZATION_HEADER, value);
        Ok(())
    }
}

impl fmt::Debug for HeaderProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.current().is_some() {
            "[REDACTED]"
        } else {
            "<none>"
        };
        f.debug_struct("HeaderProvider").field("token", &state).finish()
    }
}

impl Interceptor for HeaderProvider {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        self.apply(&mut request)?;
        Ok(request)
    }
}
