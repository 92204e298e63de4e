use serde::{Deserialize, Serialize};

use crate::account::policy::TribeAssignment;
use crate::account::types::TribeId;
use crate::error::HubError;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HubConfig {
    pub hub: ProcessConfig,
    pub secrets: SecretConfig,
    pub locales: LocaleConfig,
    pub tribes: TribeConfig,
    pub import: ImportConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProcessConfig {
    pub db_path: String,
    pub messages_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecretConfig {
    pub user_key: String,
    pub admin_key: String,
    /// External ids imported with the admin role.
    #[serde(default)]
    pub superuser_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LocaleConfig {
    pub default: String,
    pub supported: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TribeConfig {
    /// "random" or "fixed"; "fixed" requires `default_tribe`.
    pub assignment: String,
    #[serde(default)]
    pub default_tribe: Option<TribeId>,
    pub seed: Vec<TribeSeed>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TribeSeed {
    pub id: TribeId,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ImportConfig {
    #[serde(default)]
    pub enabled: bool,
    pub path: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            hub: ProcessConfig {
                db_path: "data/hub.db".to_string(),
                messages_path: "data/messages.toml".to_string(),
                log_level: default_log_level(),
            },
            secrets: SecretConfig {
                user_key: "tribe-user-key".to_string(),
                admin_key: "tribe-admin-key".to_string(),
                superuser_ids: vec![],
            },
            locales: LocaleConfig {
                default: "en".to_string(),
                supported: vec!["en".to_string(), "ru".to_string()],
            },
            tribes: TribeConfig {
                assignment: "random".to_string(),
                default_tribe: None,
                seed: vec![
                    TribeSeed {
                        id: 1,
                        name: "Aqua".to_string(),
                    },
                    TribeSeed {
                        id: 2,
                        name: "Ignis".to_string(),
                    },
                ],
            },
            import: ImportConfig {
                enabled: true,
                path: "data/users.txt".to_string(),
            },
        }
    }
}

impl HubConfig {
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => {
                        println!("Config loaded from {}", path);
                        c
                    }
                    Err(e) => {
                        eprintln!("Error parsing config: {}. Using Defaults.", e);
                        Self::default()
                    }
                },
                Err(e) => {
                    eprintln!("Error reading config: {}. Using Defaults.", e);
                    Self::default()
                }
            }
        } else {
            println!("Config file not found at '{}'. Creating default.", path);
            let config = Self::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                let _ = std::fs::write(path, s);
            }
            config
        }
    }

    /// Checked once at startup, before anything touches storage.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.secrets.user_key.is_empty() || self.secrets.admin_key.is_empty() {
            return Err(HubError::Config("secret keys must not be empty".to_string()));
        }
        if self.secrets.user_key == self.secrets.admin_key {
            return Err(HubError::Config(
                "user and admin secret keys must differ".to_string(),
            ));
        }
        if self.locales.supported.is_empty() {
            return Err(HubError::Config("no supported locales".to_string()));
        }
        if !self.locales.supported.contains(&self.locales.default) {
            return Err(HubError::Config(format!(
                "invalid default locale: {}",
                self.locales.default
            )));
        }
        if self.tribes.seed.is_empty() {
            return Err(HubError::Config("no tribes configured".to_string()));
        }
        self.assignment_policy().map(|_| ())
    }

    pub fn assignment_policy(&self) -> Result<TribeAssignment, HubError> {
        let ids: Vec<TribeId> = self.tribes.seed.iter().map(|t| t.id).collect();
        match self.tribes.assignment.as_str() {
            "random" => Ok(TribeAssignment::Random(ids)),
            "fixed" => {
                let id = self.tribes.default_tribe.ok_or_else(|| {
                    HubError::Config("fixed assignment requires default_tribe".to_string())
                })?;
                if !ids.contains(&id) {
                    return Err(HubError::Config(format!(
                        "default_tribe {} is not in the configured tribe set",
                        id
                    )));
                }
                Ok(TribeAssignment::Fixed(id))
            }
            other => Err(HubError::Config(format!(
                "unknown tribe assignment policy: {}",
                other
            ))),
        }
    }

    pub fn seed_tribes(&self) -> Vec<(TribeId, String)> {
        self.tribes
            .seed
            .iter()
            .map(|t| (t.id, t.name.clone()))
            .collect()
    }
}
