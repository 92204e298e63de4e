//! Localized message catalog. A TOML file maps message keys to per-locale
//! texts; a missing key or locale is a hard `MessageNotFound`, so a
//! conversation step fails visibly instead of sending a blank reply.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::HubError;

pub struct MessageCatalog {
    messages: HashMap<String, HashMap<String, String>>,
}

impl MessageCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HubError> {
        let path = path.as_ref();
        debug!("Loading message catalog from {}", path.display());
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HubError::FileAccess(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, HubError> {
        let messages: HashMap<String, HashMap<String, String>> = toml::from_str(raw)
            .map_err(|e| HubError::Config(format!("message catalog: {}", e)))?;
        Ok(MessageCatalog { messages })
    }

    pub fn get(&self, key: &str, locale: &str) -> Result<&str, HubError> {
        self.messages
            .get(key)
            .and_then(|by_locale| by_locale.get(locale))
            .map(String::as_str)
            .ok_or_else(|| HubError::MessageNotFound {
                key: key.to_string(),
                locale: locale.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
        [welcome_user]
        en = "Welcome back, {name}!"
        ru = "С возвращением, {name}!"

        [enter_surname]
        en = "Enter your surname"
    "#;

    #[test]
    fn lookup_hits_by_key_and_locale() {
        let catalog = MessageCatalog::from_toml_str(CATALOG).unwrap();
        assert_eq!(
            catalog.get("welcome_user", "ru").unwrap(),
            "С возвращением, {name}!"
        );
    }

    #[test]
    fn missing_key_or_locale_is_message_not_found() {
        let catalog = MessageCatalog::from_toml_str(CATALOG).unwrap();
        assert!(matches!(
            catalog.get("no_such_key", "en"),
            Err(HubError::MessageNotFound { .. })
        ));
        assert!(matches!(
            catalog.get("enter_surname", "ru"),
            Err(HubError::MessageNotFound { .. })
        ));
    }
}
