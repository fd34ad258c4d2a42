//! Shipping address models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradepost_core::{AddressId, UserId};

/// Shipping address row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub id: AddressId,
    pub user_id: UserId,
    pub full_name: String,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Address fields as sent by the client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressFields {
    pub full_name: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
}

/// A complete, trimmed address ready to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAddress {
    pub full_name: String,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub phone_number: Option<String>,
}

impl AddressFields {
    /// Require every mandatory field to be present and non-blank.
    ///
    /// # Errors
    ///
    /// Returns the camelCase name of the first missing field.
    pub fn into_new(self) -> Result<NewAddress, &'static str> {
        Ok(NewAddress {
            full_name: required(self.full_name, "fullName")?,
            street_address: required(self.street_address, "streetAddress")?,
            city: required(self.city, "city")?,
            state: required(self.state, "state")?,
            zip_code: required(self.zip_code, "zipCode")?,
            country: required(self.country, "country")?,
            phone_number: optional(self.phone_number),
        })
    }

    /// Overlay these fields onto an existing address.
    ///
    /// # Errors
    ///
    /// Returns the camelCase name of the first field sent as blank.
    pub fn apply_to(self, existing: &ShippingAddress) -> Result<NewAddress, &'static str> {
        let keep = |value: Option<String>, current: &str, field: &'static str| match value {
            Some(v) => required(Some(v), field),
            None => Ok(current.to_owned()),
        };
        Ok(NewAddress {
            full_name: keep(self.full_name, &existing.full_name, "fullName")?,
            street_address: keep(self.street_address, &existing.street_address, "streetAddress")?,
            city: keep(self.city, &existing.city, "city")?,
            state: keep(self.state, &existing.state, "state")?,
            zip_code: keep(self.zip_code, &existing.zip_code, "zipCode")?,
            country: keep(self.country, &existing.country, "country")?,
            phone_number: match self.phone_number {
                Some(v) => optional(Some(v)),
                None => existing.phone_number.clone(),
            },
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, &'static str> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or(field)
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields() -> AddressFields {
        AddressFields {
            full_name: Some("  Ada Obi ".to_string()),
            street_address: Some("12 Marina Rd".to_string()),
            city: Some("Lagos".to_string()),
            state: Some("Lagos".to_string()),
            zip_code: Some("100001".to_string()),
            country: Some("Nigeria".to_string()),
            phone_number: Some("   ".to_string()),
        }
    }

    #[test]
    fn test_into_new_trims() {
        let address = fields().into_new().unwrap();
        assert_eq!(address.full_name, "Ada Obi");
        assert_eq!(address.phone_number, None);
    }

    #[test]
    fn test_into_new_reports_missing_field() {
        let mut f = fields();
        f.zip_code = Some(" ".to_string());
        assert_eq!(f.into_new(), Err("zipCode"));
    }

    #[test]
    fn test_apply_to_keeps_unset_fields() {
        let new = fields().into_new().unwrap();
        let existing = ShippingAddress {
            id: AddressId::new(),
            user_id: UserId::new(),
            full_name: new.full_name,
            street_address: new.street_address,
            city: new.city,
            state: new.state,
            zip_code: new.zip_code,
            country: new.country,
            phone_number: Some("0800".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let patch = AddressFields {
            city: Some("Abuja".to_string()),
            ..AddressFields::default()
        };
        let merged = patch.apply_to(&existing).unwrap();
        assert_eq!(merged.city, "Abuja");
        assert_eq!(merged.country, "Nigeria");
        assert_eq!(merged.phone_number.as_deref(), Some("0800"));
    }
}
