//! Tribe assignment strategy for accounts created without an explicit
//! tribe. Injected into the store at construction so nothing is baked
//! into the provisioning call itself.

use rand::seq::SliceRandom;

use super::types::TribeId;
use crate::error::HubError;

#[derive(Debug, Clone)]
pub enum TribeAssignment {
    /// Every unassigned account lands in this tribe.
    Fixed(TribeId),
    /// Uniform draw over the configured tribes.
    Random(Vec<TribeId>),
}

impl TribeAssignment {
    pub fn assign(&self) -> Result<TribeId, HubError> {
        match self {
            TribeAssignment::Fixed(id) => Ok(*id),
            TribeAssignment::Random(ids) => ids
                .choose(&mut rand::thread_rng())
                .copied()
                .ok_or_else(|| {
                    HubError::Config("no tribes configured for random assignment".to_string())
                }),
        }
    }
}
