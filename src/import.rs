//! Bulk account import. Reads a pipe-delimited user file and provisions
//! each record through the same service the dialogue uses. Records are
//! fault-isolated: a malformed line, an unknown tribe or an existing
//! account is skipped with a warning and never aborts the run. A missing
//! or unreadable file is fatal to the whole run.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::account::store::AccountStore;
use crate::account::types::{ExternalId, Role};
use crate::error::HubError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub skipped: usize,
}

#[derive(Debug, PartialEq)]
struct ImportRecord {
    external_id: ExternalId,
    display_name: String,
    tribe_name: String,
    locale: Option<String>,
}

/// Line format: `externalId | displayName | tribeName [| locale]`.
fn parse_record(line: &str) -> Result<ImportRecord, String> {
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();
    if parts.len() < 3 {
        return Err("expected at least 3 pipe-delimited fields".to_string());
    }
    let external_id: ExternalId = parts[0]
        .parse()
        .map_err(|_| format!("invalid external id {:?}", parts[0]))?;
    Ok(ImportRecord {
        external_id,
        display_name: parts[1].to_string(),
        tribe_name: parts[2].to_string(),
        locale: parts
            .get(3)
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty()),
    })
}

pub async fn load_accounts_from_file(
    path: impl AsRef<Path>,
    accounts: &AccountStore,
    superusers: &HashSet<ExternalId>,
) -> Result<ImportSummary, HubError> {
    let path = path.as_ref();
    debug!("load_accounts_from_file called with path: {}", path.display());

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| HubError::FileAccess(format!("{}: {}", path.display(), e)))?;

    let mut summary = ImportSummary::default();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let record = match parse_record(line) {
            Ok(record) => record,
            Err(reason) => {
                warn!("Skipping malformed line {:?}: {}", line, reason);
                summary.skipped += 1;
                continue;
            }
        };

        let Some(tribe) = accounts.find_tribe_by_name(&record.tribe_name)? else {
            warn!("Tribe not found for tribe_name: {:?}", record.tribe_name);
            summary.skipped += 1;
            continue;
        };
        if accounts.exists(record.external_id)? {
            warn!("User already exists - external id: {}", record.external_id);
            summary.skipped += 1;
            continue;
        }

        let role = if superusers.contains(&record.external_id) {
            Role::Admin
        } else {
            Role::User
        };
        let locale = record
            .locale
            .as_deref()
            .filter(|l| accounts.is_supported_locale(l));
        accounts.create_account(
            record.external_id,
            &record.display_name,
            role,
            Some(tribe.tribe_id),
            locale,
        )?;
        summary.created += 1;
    }

    info!(
        "Users loaded from file: {} created, {} skipped",
        summary.created, summary.skipped
    );
    Ok(summary)
}
