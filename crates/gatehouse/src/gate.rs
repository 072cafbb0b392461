//! The server's upgrade gate: path, origin, then bearer token.

use gatehouse_auth::{Clock, HandshakeGate, Identity, SystemClock};
use gatehouse_transport::UpgradeGate;
use http::header::ORIGIN;
use http::{Request, StatusCode};

use crate::AllowedOrigins;

/// Decides which upgrade requests become connections.
///
/// Checks run cheapest first and stop at the first failure:
///
/// | Check                           | Refusal |
/// |---------------------------------|---------|
/// | path equals the endpoint        | 404     |
/// | `Origin` (if sent) is allowed   | 403     |
/// | bearer token verifies           | 401     |
///
/// Every auth failure maps to the same 401 so a client cannot tell a bad
/// signature from an expired token.
pub struct ServerGate<K: Clock = SystemClock> {
    endpoint: String,
    origins: AllowedOrigins,
    handshake: HandshakeGate<K>,
}

impl<K: Clock> ServerGate<K> {
    /// Admits upgrades to `endpoint` from `origins` that carry a bearer
    /// token `handshake` accepts.
    pub fn new(
        endpoint: impl Into<String>,
        origins: AllowedOrigins,
        handshake: HandshakeGate<K>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            origins,
            handshake,
        }
    }
}

impl<K: Clock> UpgradeGate for ServerGate<K> {
    type Principal = Identity;

    fn admit(&self, request: &Request<()>) -> Result<Identity, StatusCode> {
        let path = request.uri().path();
        if path != self.endpoint {
            tracing::warn!(path, "upgrade refused: unknown endpoint");
            return Err(StatusCode::NOT_FOUND);
        }

        if let Some(origin) = request.headers().get(ORIGIN) {
            let permitted = origin
                .to_str()
                .is_ok_and(|origin| self.origins.permits(origin));
            if !permitted {
                tracing::warn!(?origin, "upgrade refused: origin not allowed");
                return Err(StatusCode::FORBIDDEN);
            }
        }

        // `authenticate` logs the specific reason itself.
        self.handshake
            .authenticate(request.headers())
            .map_err(|_| StatusCode::UNAUTHORIZED)
    }
}
