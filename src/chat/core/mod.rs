//! Core chat types and identifiers.

pub mod config;
pub mod errors;
pub mod ids;
pub mod message;
pub mod thread;
pub mod turn;

pub use config::{
    AuthBackend, AuthConfig, ChatConfig, ExportConfig, InferenceConfig, InferenceProvider,
    ServerConfig, StoreBackend, StoreConfig, SupabaseConfig,
};
pub use errors::{ChatError, ChatResult};
pub use ids::{ConversationId, MessageId, TurnId, UserIdentity, UserIdentityError};
pub use message::{Message, PersistStatus, Role};
pub use thread::{Thread, ThreadSummary};
pub use turn::{NewTurn, Turn};
