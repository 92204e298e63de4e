//! Embedded database layer. One sled tree per table, bincode-encoded
//! values. Inserts that must be atomic together (wallet + account,
//! wallet + tribe) run as multi-tree transactions with commit-or-rollback;
//! the duplicate check lives inside the transaction, so the uniqueness
//! constraint is the sole arbiter under concurrent writers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;

use crate::account::types::{Account, ExternalId, Tribe, TribeId, Wallet, WalletToken};
use crate::error::HubError;

pub struct Storage {
    db: sled::Db,
    accounts: sled::Tree,
    tribes: sled::Tree,
    wallets: sled::Tree,
    // handle -> external id index, keeps handles unique when present
    handles: sled::Tree,
    roles: sled::Tree,
    event_states: sled::Tree,
}

fn storage_err(e: sled::Error) -> HubError {
    HubError::StorageUnavailable(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, HubError> {
    bincode::serialize(value).map_err(|e| HubError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, HubError> {
    bincode::deserialize(bytes).map_err(|e| HubError::Serialization(e.to_string()))
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HubError> {
        let db = sled::open(path).map_err(storage_err)?;
        let accounts = db.open_tree("accounts").map_err(storage_err)?;
        let tribes = db.open_tree("tribes").map_err(storage_err)?;
        let wallets = db.open_tree("wallets").map_err(storage_err)?;
        let handles = db.open_tree("handles").map_err(storage_err)?;
        let roles = db.open_tree("roles").map_err(storage_err)?;
        let event_states = db.open_tree("event_states").map_err(storage_err)?;
        Ok(Storage {
            db,
            accounts,
            tribes,
            wallets,
            handles,
            roles,
            event_states,
        })
    }

    /// Monotonic id sequence, shared by wallet tokens and internal user
    /// ids so the two keyspaces can never collide.
    pub fn generate_id(&self) -> Result<u64, HubError> {
        self.db.generate_id().map_err(storage_err)
    }

    pub fn account(&self, external_id: ExternalId) -> Result<Option<Account>, HubError> {
        match self
            .accounts
            .get(external_id.to_be_bytes())
            .map_err(storage_err)?
        {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    pub fn tribe(&self, tribe_id: TribeId) -> Result<Option<Tribe>, HubError> {
        match self.tribes.get(tribe_id.to_be_bytes()).map_err(storage_err)? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn tribes(&self) -> Result<Vec<Tribe>, HubError> {
        let mut out = Vec::new();
        for entry in self.tribes.iter() {
            let (_, raw) = entry.map_err(storage_err)?;
            out.push(decode(&raw)?);
        }
        Ok(out)
    }

    pub fn wallet(&self, token: WalletToken) -> Result<Option<Wallet>, HubError> {
        match self.wallets.get(token.to_be_bytes()).map_err(storage_err)? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Insert the wallet row, then the account row referencing it, as one
    /// atomic unit. Aborts with `DuplicateIdentity` if the external id is
    /// already present; either both rows land or neither is visible.
    pub fn insert_account_with_wallet(
        &self,
        account: &Account,
        wallet: &Wallet,
    ) -> Result<(), HubError> {
        let account_key = account.external_id.to_be_bytes();
        let wallet_key = wallet.token.to_be_bytes();
        let account_bytes = encode(account)?;
        let wallet_bytes = encode(wallet)?;
        let external_id = account.external_id;

        (&self.accounts, &self.wallets)
            .transaction(|(accounts, wallets)| {
                if accounts.get(&account_key[..])?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        HubError::DuplicateIdentity(external_id),
                    ));
                }
                if wallets.get(&wallet_key[..])?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        HubError::ReferentialIntegrity(format!(
                            "wallet token {} already exists",
                            u64::from_be_bytes(wallet_key)
                        )),
                    ));
                }
                wallets.insert(&wallet_key[..], wallet_bytes.clone())?;
                accounts.insert(&account_key[..], account_bytes.clone())?;
                Ok(())
            })
            .map_err(unwrap_transaction_err)
    }

    /// Insert a tribe, plus a fresh wallet row when one was generated for
    /// it, atomically. The id check inside the transaction is the second
    /// line of defense behind the store's idempotence check.
    pub fn insert_tribe_with_wallet(
        &self,
        tribe: &Tribe,
        wallet: Option<&Wallet>,
    ) -> Result<(), HubError> {
        let tribe_key = tribe.tribe_id.to_be_bytes();
        let tribe_bytes = encode(tribe)?;
        let wallet_parts = match wallet {
            Some(w) => Some((w.token.to_be_bytes(), encode(w)?)),
            None => None,
        };
        let tribe_id = tribe.tribe_id;

        (&self.tribes, &self.wallets)
            .transaction(|(tribes, wallets)| {
                if tribes.get(&tribe_key[..])?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        HubError::ReferentialIntegrity(format!(
                            "tribe id {} already exists",
                            tribe_id
                        )),
                    ));
                }
                if let Some((wallet_key, wallet_bytes)) = &wallet_parts {
                    if wallets.get(&wallet_key[..])?.is_some() {
                        return Err(ConflictableTransactionError::Abort(
                            HubError::ReferentialIntegrity(format!(
                                "wallet token {} already exists",
                                u64::from_be_bytes(*wallet_key)
                            )),
                        ));
                    }
                    wallets.insert(&wallet_key[..], wallet_bytes.clone())?;
                }
                tribes.insert(&tribe_key[..], tribe_bytes.clone())?;
                Ok(())
            })
            .map_err(unwrap_transaction_err)
    }

    /// Point the account at a new handle, keeping the handle index unique.
    /// A no-op when the handle is unchanged.
    pub fn update_account_handle(
        &self,
        external_id: ExternalId,
        handle: &str,
    ) -> Result<(), HubError> {
        let account_key = external_id.to_be_bytes();
        let handle_key = handle.to_lowercase().into_bytes();

        (&self.accounts, &self.handles)
            .transaction(|(accounts, handles)| {
                let raw = accounts.get(&account_key[..])?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(HubError::ReferentialIntegrity(format!(
                        "no account for external id {}",
                        external_id
                    )))
                })?;
                let mut account: Account =
                    decode(&raw).map_err(ConflictableTransactionError::Abort)?;
                if account.handle.as_deref() == Some(handle) {
                    return Ok(());
                }
                if let Some(owner_raw) = handles.get(&handle_key[..])? {
                    let mut owner_bytes = [0u8; 8];
                    owner_bytes.copy_from_slice(&owner_raw);
                    if i64::from_be_bytes(owner_bytes) != external_id {
                        return Err(ConflictableTransactionError::Abort(
                            HubError::ReferentialIntegrity(format!(
                                "handle '{}' is already taken",
                                handle
                            )),
                        ));
                    }
                }
                if let Some(old) = &account.handle {
                    handles.remove(old.to_lowercase().into_bytes())?;
                }
                handles.insert(&handle_key[..], &account_key[..])?;
                account.handle = Some(handle.to_string());
                let updated = encode(&account).map_err(ConflictableTransactionError::Abort)?;
                accounts.insert(&account_key[..], updated)?;
                Ok(())
            })
            .map_err(unwrap_transaction_err)
    }

    /// Seed the enumerated role-name lookup. Insert-if-absent, never
    /// mutated afterwards.
    pub fn seed_roles(&self, entries: &[(u8, &str)]) -> Result<(), HubError> {
        seed_lookup(&self.roles, entries)
    }

    /// Seed the enumerated event-state lookup. Inert reference data.
    pub fn seed_event_states(&self, entries: &[(u8, &str)]) -> Result<(), HubError> {
        seed_lookup(&self.event_states, entries)
    }

    pub fn flush(&self) -> Result<(), HubError> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}

fn unwrap_transaction_err(e: TransactionError<HubError>) -> HubError {
    match e {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => HubError::StorageUnavailable(err.to_string()),
    }
}

fn seed_lookup(tree: &sled::Tree, entries: &[(u8, &str)]) -> Result<(), HubError> {
    for (id, name) in entries {
        let key = [*id];
        if tree.get(key).map_err(storage_err)?.is_none() {
            tree.insert(key, name.as_bytes()).map_err(storage_err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::types::Role;

    fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        (dir, storage)
    }

    fn account(external_id: i64, wallet_token: u64) -> Account {
        Account {
            user_id: 1,
            external_id,
            handle: None,
            display_name: "Smith John".to_string(),
            tribe_id: 1,
            role: Role::User,
            wallet_token,
            locale: "en".to_string(),
            bio: None,
            avatar: None,
            created_at: 0,
        }
    }

    #[test]
    fn account_and_wallet_land_together() {
        let (_dir, storage) = temp_storage();
        storage
            .insert_account_with_wallet(&account(42, 10), &Wallet::new(10))
            .unwrap();

        let stored = storage.account(42).unwrap().unwrap();
        assert_eq!(stored.wallet_token, 10);
        assert!(storage.wallet(10).unwrap().is_some());
    }

    #[test]
    fn duplicate_external_id_aborts_without_orphan_wallet() {
        let (_dir, storage) = temp_storage();
        storage
            .insert_account_with_wallet(&account(42, 10), &Wallet::new(10))
            .unwrap();

        let err = storage
            .insert_account_with_wallet(&account(42, 11), &Wallet::new(11))
            .unwrap_err();
        assert!(matches!(err, HubError::DuplicateIdentity(42)));
        // rollback must leave no trace of the second wallet
        assert_eq!(storage.wallet_count(), 1);
        assert!(storage.wallet(11).unwrap().is_none());
    }

    #[test]
    fn handle_index_rejects_a_taken_handle() {
        let (_dir, storage) = temp_storage();
        storage
            .insert_account_with_wallet(&account(1, 10), &Wallet::new(10))
            .unwrap();
        storage
            .insert_account_with_wallet(&account(2, 11), &Wallet::new(11))
            .unwrap();

        storage.update_account_handle(1, "alice").unwrap();
        let err = storage.update_account_handle(2, "Alice").unwrap_err();
        assert!(matches!(err, HubError::ReferentialIntegrity(_)));

        // re-pointing the same account at its own handle stays a no-op
        storage.update_account_handle(1, "alice").unwrap();
        assert_eq!(
            storage.account(1).unwrap().unwrap().handle.as_deref(),
            Some("alice")
        );
    }

    #[test]
    fn handle_can_move_once_released() {
        let (_dir, storage) = temp_storage();
        storage
            .insert_account_with_wallet(&account(1, 10), &Wallet::new(10))
            .unwrap();
        storage
            .insert_account_with_wallet(&account(2, 11), &Wallet::new(11))
            .unwrap();

        storage.update_account_handle(1, "alice").unwrap();
        storage.update_account_handle(1, "alice_prime").unwrap();
        // the old handle is free again
        storage.update_account_handle(2, "alice").unwrap();
        assert_eq!(
            storage.account(2).unwrap().unwrap().handle.as_deref(),
            Some("alice")
        );
    }

    #[test]
    fn seeding_reference_data_is_idempotent() {
        let (_dir, storage) = temp_storage();
        let roles: Vec<(u8, &str)> = vec![(0, "user"), (1, "admin")];
        storage.seed_roles(&roles).unwrap();
        storage.seed_roles(&roles).unwrap();
        assert_eq!(storage.roles.len(), 2);
    }
}
