//! The narrow contract to the chat platform. The dialogue controller
//! depends only on this shape; the real delivery protocol lives outside
//! this crate.

use async_trait::async_trait;

use crate::account::types::ExternalId;
use crate::error::HubError;

/// One inbound message as the transport layer delivers it.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub external_id: ExternalId,
    pub handle: Option<String>,
    pub locale_hint: Option<String>,
    pub text: String,
}

impl InboundEvent {
    pub fn text(external_id: ExternalId, text: impl Into<String>) -> Self {
        InboundEvent {
            external_id,
            handle: None,
            locale_hint: None,
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, external_id: ExternalId, text: &str) -> Result<(), HubError>;
}

/// Stdout-backed transport so the binary can run a conversation end to
/// end without a chat platform.
pub struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(&self, external_id: ExternalId, text: &str) -> Result<(), HubError> {
        println!("[-> {}] {}", external_id, text);
        Ok(())
    }
}
