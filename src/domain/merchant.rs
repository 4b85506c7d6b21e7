use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainError;

pub type ServiceId = Uuid;
pub type StoreId = Uuid;

/// Lifecycle of a payable destination. Only `Active` destinations accept transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MerchantStatus {
    Active,
    Pending,
    Disabled,
}

impl MerchantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MerchantStatus::Active => "active",
            MerchantStatus::Pending => "pending",
            MerchantStatus::Disabled => "disabled",
        }
    }
}

impl FromStr for MerchantStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(MerchantStatus::Active),
            "pending" => Ok(MerchantStatus::Pending),
            "disabled" => Ok(MerchantStatus::Disabled),
            other => Err(DomainError::validation(format!("invalid status: {}", other))),
        }
    }
}

impl std::fmt::Display for MerchantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn require_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name is required"));
    }
    Ok(())
}

/// A payable service (utility, subscription, ...) owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub description: Option<String>,
    /// Owning party
    pub owner_id: Uuid,
    pub type_id: Uuid,
    pub status: MerchantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// New services start out pending and must be activated before they accept payments.
    pub fn new(name: String, owner_id: Uuid, type_id: Uuid) -> Result<Self, DomainError> {
        require_name(&name)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description: None,
            owner_id,
            type_id,
            status: MerchantStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == MerchantStatus::Active
    }

    pub fn set_status(&mut self, status: MerchantStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// A payable store owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub type_id: Uuid,
    pub status: MerchantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn new(name: String, owner_id: Uuid, type_id: Uuid) -> Result<Self, DomainError> {
        require_name(&name)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description: None,
            owner_id,
            type_id,
            status: MerchantStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == MerchantStatus::Active
    }

    pub fn set_status(&mut self, status: MerchantStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
