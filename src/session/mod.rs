//! Chat session credentials
//!
//! The chat widget needs a fresh client secret before it can open a conversation.
//! [`CredentialBroker`] requests one from the backend on behalf of a caller identity,
//! generating and persisting a device identity through an [`IdentityStore`] when the
//! caller has none.

mod broker;
mod identity;

pub use broker::{CredentialBroker, CredentialError, SessionCredential};
pub use identity::{
    FileIdentityStore, IDENTITY_KEY, IdentityStore, MemoryIdentityStore, generate_identity,
    resolve_identity,
};
