//! Per-conversation registration dialogue. A small state machine collects
//! the secret phrase, the surname and the given name, then hands off to
//! the provisioning service. The controller exclusively owns the session
//! store; prompts are resolved through the message catalog in the
//! process-wide default locale, as the original flow does.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::account::store::AccountStore;
use crate::account::types::{ExternalId, Role};
use crate::error::HubError;
use crate::messages::MessageCatalog;
use crate::session::{RegistrationState, Session, SessionStore};
use crate::transport::{InboundEvent, Transport};

pub struct DialogueController {
    accounts: Arc<AccountStore>,
    catalog: Arc<MessageCatalog>,
    transport: Arc<dyn Transport>,
    sessions: SessionStore,
    user_secret: String,
    admin_secret: String,
    locale: String,
}

/// Unicode-aware: the check applies in the identity's own script, and
/// empty input counts as invalid.
fn is_alphabetic(text: &str) -> bool {
    !text.is_empty() && text.chars().all(char::is_alphabetic)
}

impl DialogueController {
    pub fn new(
        accounts: Arc<AccountStore>,
        catalog: Arc<MessageCatalog>,
        transport: Arc<dyn Transport>,
        user_secret: String,
        admin_secret: String,
        locale: String,
    ) -> Self {
        DialogueController {
            accounts,
            catalog,
            transport,
            sessions: SessionStore::new(),
            user_secret,
            admin_secret,
            locale,
        }
    }

    pub fn session_state(&self, external_id: ExternalId) -> Option<RegistrationState> {
        self.sessions.state(external_id)
    }

    pub async fn handle_event(&mut self, event: InboundEvent) -> Result<(), HubError> {
        debug!("Inbound event from external id {}", event.external_id);
        match self.sessions.state(event.external_id) {
            None | Some(RegistrationState::Registered) => self.handle_contact(event).await,
            Some(RegistrationState::AwaitingSecret) => self.handle_secret(event).await,
            Some(RegistrationState::AwaitingSurname) => self.handle_surname(event).await,
            Some(RegistrationState::AwaitingGivenName) => self.handle_given_name(event).await,
        }
    }

    async fn reply(&self, external_id: ExternalId, key: &str) -> Result<(), HubError> {
        let text = self.catalog.get(key, &self.locale)?;
        self.transport.send(external_id, text).await
    }

    /// First contact, or steady-state contact from a registered identity.
    async fn handle_contact(&mut self, event: InboundEvent) -> Result<(), HubError> {
        let external_id = event.external_id;
        if let Some(account) = self.accounts.get_account(external_id)? {
            let mut handle_changed = false;
            if let Some(handle) = &event.handle {
                if account.handle.as_deref() != Some(handle.as_str()) {
                    self.accounts.update_handle(external_id, handle)?;
                    handle_changed = true;
                }
            }
            self.sessions
                .insert(external_id, Session::new(RegistrationState::Registered));

            let welcome = self
                .catalog
                .get("welcome_user", &self.locale)?
                .replace("{name}", &account.display_name);
            self.transport.send(external_id, &welcome).await?;
            if handle_changed {
                self.reply(external_id, "update_tag").await?;
            }
            Ok(())
        } else {
            info!("External id {} initiated registration", external_id);
            let mut session = Session::new(RegistrationState::AwaitingSecret);
            session.locale = event.locale_hint.clone();
            self.sessions.insert(external_id, session);
            self.reply(external_id, "enter_secret_phrase").await
        }
    }

    async fn handle_secret(&mut self, event: InboundEvent) -> Result<(), HubError> {
        let external_id = event.external_id;
        let role = if event.text == self.user_secret {
            Some(Role::User)
        } else if event.text == self.admin_secret {
            Some(Role::Admin)
        } else {
            None
        };

        match role {
            Some(role) => {
                debug!("External id {} accepted as {}", external_id, role);
                if let Some(session) = self.sessions.get_mut(external_id) {
                    session.pending_role = Some(role);
                    session.state = RegistrationState::AwaitingSurname;
                }
                self.reply(external_id, "enter_surname").await
            }
            // wrong secret leaves the session untouched
            None => self.reply(external_id, "invalid_secret_phrase").await,
        }
    }

    async fn handle_surname(&mut self, event: InboundEvent) -> Result<(), HubError> {
        let external_id = event.external_id;
        if !is_alphabetic(&event.text) {
            return self.reply(external_id, "invalid_surname").await;
        }
        if let Some(session) = self.sessions.get_mut(external_id) {
            session.surname = Some(event.text.clone());
            session.state = RegistrationState::AwaitingGivenName;
        }
        self.reply(external_id, "enter_name").await
    }

    async fn handle_given_name(&mut self, event: InboundEvent) -> Result<(), HubError> {
        let external_id = event.external_id;
        if !is_alphabetic(&event.text) {
            return self.reply(external_id, "invalid_name").await;
        }

        let (surname, role, session_locale) = match self.sessions.get(external_id) {
            Some(session) => (
                session.surname.clone(),
                session.pending_role,
                session.locale.clone(),
            ),
            None => (None, None, None),
        };
        let surname = surname.ok_or_else(|| {
            HubError::Validation(format!("no surname collected for external id {}", external_id))
        })?;
        let role = role.ok_or_else(|| {
            HubError::Validation(format!("no role resolved for external id {}", external_id))
        })?;
        let display_name = format!("{} {}", surname, event.text);
        let locale = event.locale_hint.or(session_locale);

        let created = if self.accounts.exists(external_id)? {
            Err(HubError::DuplicateIdentity(external_id))
        } else {
            self.accounts.create_account(
                external_id,
                &display_name,
                role,
                None,
                locale.as_deref(),
            )
        };

        // terminal either way: the session never survives this step
        self.sessions.clear(external_id);
        match created {
            Ok(_) => self.reply(external_id, "registration_successful").await,
            Err(e) => {
                warn!(
                    "Provisioning failed for external id {}: {}; the flow must be restarted",
                    external_id, e
                );
                if let Err(send_err) = self.reply(external_id, "registration_failed").await {
                    warn!("Could not deliver failure notice: {}", send_err);
                }
                Err(e)
            }
        }
    }
}
