//! Authentication and the dual-session bridge.
//!
//! Provides:
//! - Live session state from the primary identity provider ([`SessionFeed`])
//! - Login / registration / logout ([`IdentityService`])
//! - Best-effort secondary login against the external API, with the returned
//!   token cached in a device-local store ([`ExternalTokenManager`])
//!
//! ## Design Decisions
//! - No global "current user": the feed handle is passed explicitly to every
//!   consumer, and each consumer subscribes on its own.
//! - Provider failures carry a structured [`ProviderErrorCode`]; message text
//!   is for humans only.
//! - The secondary login never affects the primary login's result. Its
//!   outcome is logged and broadcast on a separate channel.

pub mod external;
pub mod firebase;
pub mod memory;
pub mod provider;
pub mod service;
pub mod session;
pub mod store;

pub use external::{
    ExternalServiceError, ExternalTokenManager, SecondaryLoginOutcome, EXTERNAL_TOKEN_KEY,
};
pub use firebase::FirebaseIdentityProvider;
pub use memory::MemoryIdentityProvider;
pub use provider::{
    create_provider, Credentials, IdentityProvider, ProviderError, ProviderErrorCode,
};
pub use service::{AuthError, IdentityService, RegistrationProfile};
pub use session::{Session, SessionFeed, SessionSubscription};
pub use store::{KeyValueStore, MemoryKvStore, SqliteKvStore, StorageError};
