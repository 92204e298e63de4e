//! The provisioning service: the only writer of durable account state.
//! Creation paths are atomic (wallet + owning entity in one transaction)
//! and duplicate-safe (the in-transaction uniqueness check is the arbiter,
//! callers consult `exists` first only as a cheap early answer).

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::policy::TribeAssignment;
use super::types::{Account, EventState, ExternalId, Role, Tribe, TribeId, Wallet, WalletToken};
use crate::error::HubError;
use crate::storage::Storage;

/// Result of an idempotent tribe creation.
#[derive(Debug, Clone, PartialEq)]
pub enum TribeOutcome {
    Created(Tribe),
    AlreadyExists,
}

pub struct AccountStore {
    storage: Arc<Storage>,
    assignment: TribeAssignment,
    default_locale: String,
    supported_locales: Vec<String>,
}

impl AccountStore {
    pub fn new(
        storage: Arc<Storage>,
        assignment: TribeAssignment,
        default_locale: String,
        supported_locales: Vec<String>,
    ) -> Self {
        AccountStore {
            storage,
            assignment,
            default_locale,
            supported_locales,
        }
    }

    pub fn exists(&self, external_id: ExternalId) -> Result<bool, HubError> {
        Ok(self.storage.account(external_id)?.is_some())
    }

    pub fn get_account(&self, external_id: ExternalId) -> Result<Option<Account>, HubError> {
        self.storage.account(external_id)
    }

    pub fn account_count(&self) -> usize {
        self.storage.account_count()
    }

    pub fn get_tribe(&self, tribe_id: TribeId) -> Result<Option<Tribe>, HubError> {
        self.storage.tribe(tribe_id)
    }

    /// Case-insensitive tribe lookup, used by the bulk importer.
    pub fn find_tribe_by_name(&self, name: &str) -> Result<Option<Tribe>, HubError> {
        let wanted = name.to_lowercase();
        Ok(self
            .storage
            .tribes()?
            .into_iter()
            .find(|t| t.name.to_lowercase() == wanted))
    }

    pub fn tribes(&self) -> Result<Vec<Tribe>, HubError> {
        self.storage.tribes()
    }

    pub fn wallet_balance(&self, token: WalletToken) -> Result<Decimal, HubError> {
        self.storage
            .wallet(token)?
            .map(|w| w.balance)
            .ok_or_else(|| {
                HubError::ReferentialIntegrity(format!("wallet token {} not found", token))
            })
    }

    pub fn is_supported_locale(&self, locale: &str) -> bool {
        self.supported_locales.iter().any(|l| l == locale)
    }

    fn resolve_locale(&self, locale: Option<&str>) -> String {
        match locale {
            Some(l) if self.is_supported_locale(l) => l.to_string(),
            _ => self.default_locale.clone(),
        }
    }

    /// Create an account with its wallet. When `tribe_id` is absent the
    /// injected assignment policy picks one; the tribe must exist either
    /// way. At most one account per external id: a concurrent duplicate
    /// surfaces as `DuplicateIdentity` from the storage transaction.
    pub fn create_account(
        &self,
        external_id: ExternalId,
        display_name: &str,
        role: Role,
        tribe_id: Option<TribeId>,
        locale: Option<&str>,
    ) -> Result<Account, HubError> {
        debug!(
            "create_account called with external_id: {}, display_name: {:?}, role: {}, \
             tribe_id: {:?}, locale: {:?}",
            external_id, display_name, role, tribe_id, locale
        );

        let tribe_id = match tribe_id {
            Some(id) => id,
            None => self.assignment.assign()?,
        };
        if self.storage.tribe(tribe_id)?.is_none() {
            return Err(HubError::ReferentialIntegrity(format!(
                "tribe {} does not exist",
                tribe_id
            )));
        }

        let wallet_token = self.storage.generate_id()?;
        let account = Account {
            user_id: self.storage.generate_id()?,
            external_id,
            handle: None,
            display_name: display_name.to_string(),
            tribe_id,
            role,
            wallet_token,
            locale: self.resolve_locale(locale),
            bio: None,
            avatar: None,
            created_at: Utc::now().timestamp_millis(),
        };
        self.storage
            .insert_account_with_wallet(&account, &Wallet::new(wallet_token))?;

        info!(
            "User \"{}\" (external id {}) added with role {} in tribe {}",
            display_name, external_id, role, tribe_id
        );
        Ok(account)
    }

    /// Idempotent by name or id: when either already exists the call is a
    /// reported no-op. Otherwise the tribe and its wallet (generated when
    /// no token is supplied) land atomically.
    pub fn create_tribe(
        &self,
        name: &str,
        wallet_token: Option<WalletToken>,
        tribe_id: Option<TribeId>,
    ) -> Result<TribeOutcome, HubError> {
        debug!(
            "create_tribe called with name: {:?}, wallet_token: {:?}, tribe_id: {:?}",
            name, wallet_token, tribe_id
        );

        if self.find_tribe_by_name(name)?.is_some() {
            warn!("Tribe with name '{}' already exists", name);
            return Ok(TribeOutcome::AlreadyExists);
        }
        if let Some(id) = tribe_id {
            if self.storage.tribe(id)?.is_some() {
                warn!("Tribe with id {} already exists", id);
                return Ok(TribeOutcome::AlreadyExists);
            }
        }

        let (token, wallet) = match wallet_token {
            Some(token) => (token, None),
            None => {
                let token = self.storage.generate_id()?;
                (token, Some(Wallet::new(token)))
            }
        };
        let tribe = Tribe {
            tribe_id: match tribe_id {
                Some(id) => id,
                None => self.storage.generate_id()?,
            },
            name: name.to_string(),
            wallet_token: token,
        };
        self.storage
            .insert_tribe_with_wallet(&tribe, wallet.as_ref())?;

        info!(
            "Tribe '{}' added with wallet token {} and tribe id {}",
            name, token, tribe.tribe_id
        );
        Ok(TribeOutcome::Created(tribe))
    }

    pub fn update_handle(&self, external_id: ExternalId, handle: &str) -> Result<(), HubError> {
        self.storage.update_account_handle(external_id, handle)?;
        info!("Handle updated for external id {}: {}", external_id, handle);
        Ok(())
    }

    /// Startup seeding: configured tribes plus the enumerated role and
    /// event-state reference tables. Safe to run on every boot.
    pub fn seed(&self, tribes: &[(TribeId, String)]) -> Result<(), HubError> {
        for (id, name) in tribes {
            self.create_tribe(name, None, Some(*id))?;
        }
        let roles: Vec<(u8, &str)> = Role::all().iter().map(|r| (r.id(), r.as_str())).collect();
        self.storage.seed_roles(&roles)?;
        let states: Vec<(u8, &str)> = EventState::all()
            .iter()
            .map(|s| (s.id(), s.label()))
            .collect();
        self.storage.seed_event_states(&states)?;
        debug!("Reference data seeded: {} tribes", tribes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> (tempfile::TempDir, AccountStore) {
        seeded_store_with(TribeAssignment::Fixed(1))
    }

    fn seeded_store_with(assignment: TribeAssignment) -> (tempfile::TempDir, AccountStore) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let store = AccountStore::new(
            storage,
            assignment,
            "en".to_string(),
            vec!["en".to_string(), "ru".to_string()],
        );
        store
            .seed(&[(1, "Aqua".to_string()), (2, "Ignis".to_string())])
            .unwrap();
        (dir, store)
    }

    #[test]
    fn create_account_provisions_exactly_one_wallet() {
        let (_dir, store) = seeded_store();
        let account = store
            .create_account(111, "Smith Alice", Role::User, None, Some("ru"))
            .unwrap();

        assert!(store.exists(111).unwrap());
        assert_eq!(account.tribe_id, 1);
        assert_eq!(account.locale, "ru");
        assert_eq!(store.wallet_balance(account.wallet_token).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn unsupported_locale_falls_back_to_default() {
        let (_dir, store) = seeded_store();
        let account = store
            .create_account(111, "Smith Alice", Role::User, None, Some("xx"))
            .unwrap();
        assert_eq!(account.locale, "en");

        let absent = store
            .create_account(112, "Lee Bob", Role::User, None, None)
            .unwrap();
        assert_eq!(absent.locale, "en");
    }

    #[test]
    fn unknown_tribe_is_a_referential_error() {
        let (_dir, store) = seeded_store();
        let err = store
            .create_account(111, "Smith Alice", Role::User, Some(99), None)
            .unwrap_err();
        assert!(matches!(err, HubError::ReferentialIntegrity(_)));
        assert!(!store.exists(111).unwrap());
    }

    #[test]
    fn random_assignment_stays_within_configured_tribes() {
        let (_dir, store) = seeded_store_with(TribeAssignment::Random(vec![1, 2]));
        for id in 0..10 {
            let account = store
                .create_account(500 + id, "Smith Alice", Role::User, None, None)
                .unwrap();
            assert!([1, 2].contains(&account.tribe_id));
        }
    }

    #[test]
    fn interleaved_registration_leaves_one_survivor() {
        let (_dir, store) = seeded_store();

        // both contenders observed exists() == false before either wrote
        assert!(!store.exists(111).unwrap());
        store
            .create_account(111, "Smith Alice", Role::User, None, None)
            .unwrap();
        let err = store
            .create_account(111, "Smith Alice", Role::Admin, None, None)
            .unwrap_err();

        assert!(matches!(err, HubError::DuplicateIdentity(111)));
        assert_eq!(store.account_count(), 1);
        assert_eq!(store.get_account(111).unwrap().unwrap().role, Role::User);
    }

    #[test]
    fn create_tribe_twice_is_a_noop() {
        let (_dir, store) = seeded_store();
        let before = store.tribes().unwrap().len();

        let outcome = store.create_tribe("Aqua", None, None).unwrap();
        assert_eq!(outcome, TribeOutcome::AlreadyExists);
        // name match is case-insensitive
        let outcome = store.create_tribe("aqua", None, None).unwrap();
        assert_eq!(outcome, TribeOutcome::AlreadyExists);
        assert_eq!(store.tribes().unwrap().len(), before);
    }

    #[test]
    fn seeded_tribes_have_wallets() {
        let (_dir, store) = seeded_store();
        for tribe in store.tribes().unwrap() {
            assert_eq!(store.wallet_balance(tribe.wallet_token).unwrap(), Decimal::ZERO);
        }
    }

    #[test]
    fn handle_refresh_round_trips() {
        let (_dir, store) = seeded_store();
        store
            .create_account(111, "Smith Alice", Role::User, None, None)
            .unwrap();
        store.update_handle(111, "alice").unwrap();
        assert_eq!(
            store.get_account(111).unwrap().unwrap().handle.as_deref(),
            Some("alice")
        );
    }
}
