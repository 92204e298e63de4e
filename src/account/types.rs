//! Record types for the durable account model: users, tribes, wallets and
//! the enumerated reference data seeded at initialization.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable identity assigned by the external chat platform.
pub type ExternalId = i64;

/// Wallet primary key.
pub type WalletToken = u64;

pub type TribeId = u64;

/// Role attached to an account at creation time. Immutable afterwards;
/// there is no promotion or demotion operation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn id(&self) -> u8 {
        match self {
            Role::User => 0,
            Role::Admin => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn all() -> [Role; 2] {
        [Role::User, Role::Admin]
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}. Allowed: user, admin", s)),
        }
    }
}

/// One provisioned identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Account {
    pub user_id: u64,
    /// Unique and immutable once set.
    pub external_id: ExternalId,
    /// Platform handle, unique when present, refreshed on contact.
    pub handle: Option<String>,
    pub display_name: String,
    pub tribe_id: TribeId,
    pub role: Role,
    /// Set exactly once at creation; uniquely references a wallet row.
    pub wallet_token: WalletToken,
    pub locale: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub created_at: i64,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

/// Affiliation group. Every account's tribe reference must resolve to one
/// of these rows.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Tribe {
    pub tribe_id: TribeId,
    pub name: String,
    pub wallet_token: WalletToken,
}

/// Balance holder, created before or atomically with its owning entity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Wallet {
    pub token: WalletToken,
    pub balance: Decimal,
}

impl Wallet {
    pub fn new(token: WalletToken) -> Self {
        Wallet {
            token,
            balance: Decimal::ZERO,
        }
    }
}

/// Event lifecycle states. Seeded as reference data only; nothing in the
/// provisioning core mutates events.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventState {
    OnReview,
    Approved,
    Rejected,
    InProgress,
    Completed,
}

impl EventState {
    pub fn id(&self) -> u8 {
        match self {
            EventState::OnReview => 0,
            EventState::Approved => 1,
            EventState::Rejected => 2,
            EventState::InProgress => 3,
            EventState::Completed => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventState::OnReview => "on_review",
            EventState::Approved => "approved",
            EventState::Rejected => "rejected",
            EventState::InProgress => "in_progress",
            EventState::Completed => "completed",
        }
    }

    pub fn all() -> [EventState; 5] {
        [
            EventState::OnReview,
            EventState::Approved,
            EventState::Rejected,
            EventState::InProgress,
            EventState::Completed,
        ]
    }
}
