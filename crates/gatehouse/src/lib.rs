//! # Gatehouse
//!
//! Token-gated WebSocket server that keeps exactly one live connection per
//! authenticated identity.
//!
//! A client opens a WebSocket with `Authorization: Bearer <token>`. The
//! upgrade is refused (401) unless the token verifies; on success the
//! verified [`Identity`](gatehouse_auth::Identity) rides on the connection,
//! the identity is registered in the [`SessionRegistry`], and frames flow
//! through your [`MessageHandler`] until the connection closes and the
//! entry is released.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gatehouse::prelude::*;
//!
//! # async fn demo() -> Result<(), GatehouseError> {
//! let config = ServerConfig::from_env()?;
//! let server = GatehouseServer::builder(config)
//!     .handler(EchoHandler)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod gate;
mod handler;
mod lifecycle;
mod message;
mod server;

pub use config::{
    ALLOWED_ORIGINS_ENV, AllowedOrigins, BIND_ADDR_ENV, DEFAULT_BIND_ADDR,
    DEFAULT_ENDPOINT, DEFAULT_HANDSHAKE_TIMEOUT, ENDPOINT_ENV,
    IDLE_TIMEOUT_ENV, ServerConfig,
};
pub use error::GatehouseError;
pub use gate::ServerGate;
pub use lifecycle::{ConnectionLifecycle, LifecycleState};
pub use message::{ECHO_PREFIX, EchoHandler, MessageHandler};
pub use server::{
    GatehouseServer, GatehouseServerBuilder, ServerHandle, WsConnection,
};

pub use gatehouse_auth as auth;
pub use gatehouse_session::SessionRegistry;
pub use gatehouse_transport as transport;

/// Everything needed to stand up a server and talk to its users.
pub mod prelude {
    pub use crate::{
        EchoHandler, GatehouseError, GatehouseServer, MessageHandler,
        ServerConfig, ServerHandle,
    };
    pub use gatehouse_auth::{Identity, TokenCodec, TokenConfig};
    pub use gatehouse_transport::Frame;
}
