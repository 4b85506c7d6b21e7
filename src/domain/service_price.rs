use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AMOUNT_NOT_POSITIVE;
use super::{Cents, DomainError, Service, ServiceId, normalize_currency};

pub type ServicePriceId = Uuid;

/// Fixed price attached to a service. When a transfer names a price,
/// its amount replaces whatever amount the caller sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePrice {
    pub id: ServicePriceId,
    pub service_id: ServiceId,
    pub description: Option<String>,
    pub amount: Cents,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServicePrice {
    pub fn new(
        service: &Service,
        description: Option<String>,
        amount: Cents,
        currency: &str,
    ) -> Result<Self, DomainError> {
        if amount <= 0 {
            return Err(DomainError::validation(AMOUNT_NOT_POSITIVE));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            service_id: service.id,
            description,
            amount,
            currency: normalize_currency(currency)?,
            created_at: now,
            updated_at: now,
        })
    }
}
