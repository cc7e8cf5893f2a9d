use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancellation token scoped to one request.
///
/// The token is cancelled when the extractor is dropped, which happens when
/// the handler finishes or when hyper drops the handler future because the
/// client went away. Pass [`RequestCancellation::token`] down the call chain.
pub struct RequestCancellation {
    token: CancellationToken,
    _guard: DropGuard,
}

impl RequestCancellation {
    pub fn new() -> Self {
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        Self {
            token,
            _guard: guard,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Default for RequestCancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> FromRequestParts<S> for RequestCancellation
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(_parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cancelled_on_drop() {
        let cancel = RequestCancellation::new();
        let token = cancel.token().clone();
        assert!(!token.is_cancelled());

        drop(cancel);
        assert!(token.is_cancelled());
    }
}
