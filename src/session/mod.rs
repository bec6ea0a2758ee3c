mod auth;
mod cache;
mod connection;
mod error;
mod resolver;
mod settings;

pub use cache::{AccountCache, AccountCacheEntry};
pub use connection::{ConnectionSession, ConnectionState};
pub use error::SessionError;
pub use resolver::SessionResolver;
pub use settings::{
    normalize_url,
    ProtocolVersion,
    ResolvedSession,
    SessionSettings,
    DEFAULT_ENVIRONMENT,
    SYSTEM_ENGINE_NAME,
};
