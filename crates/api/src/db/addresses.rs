//! Shipping address repository.

use sqlx::PgPool;

use tradepost_core::{AddressId, UserId};

use super::RepositoryError;
use crate::models::address::{NewAddress, ShippingAddress};

const ADDRESS_COLUMNS: &str = "id, user_id, full_name, street_address, city, state, zip_code, \
     country, phone_number, created_at, updated_at";

/// Repository for shipping address database operations.
pub struct AddressRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AddressRepository<'a> {
    /// Create a new address repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an address by ID regardless of owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: AddressId) -> Result<Option<ShippingAddress>, RepositoryError> {
        let address = sqlx::query_as::<_, ShippingAddress>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM shop.shipping_address WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(address)
    }

    /// A user's addresses, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ShippingAddress>, RepositoryError> {
        let addresses = sqlx::query_as::<_, ShippingAddress>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM shop.shipping_address \
             WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(addresses)
    }

    /// Store a new address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        user_id: UserId,
        address: &NewAddress,
    ) -> Result<ShippingAddress, RepositoryError> {
        let created = sqlx::query_as::<_, ShippingAddress>(&format!(
            r"
            INSERT INTO shop.shipping_address
                (id, user_id, full_name, street_address, city, state, zip_code, country, phone_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ADDRESS_COLUMNS}
            "
        ))
        .bind(AddressId::new())
        .bind(user_id)
        .bind(&address.full_name)
        .bind(&address.street_address)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.zip_code)
        .bind(&address.country)
        .bind(address.phone_number.as_deref())
        .fetch_one(self.pool)
        .await?;
        Ok(created)
    }

    /// Replace every field of an address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address does not exist.
    pub async fn update(
        &self,
        id: AddressId,
        address: &NewAddress,
    ) -> Result<ShippingAddress, RepositoryError> {
        sqlx::query_as::<_, ShippingAddress>(&format!(
            r"
            UPDATE shop.shipping_address
            SET full_name = $2, street_address = $3, city = $4, state = $5,
                zip_code = $6, country = $7, phone_number = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING {ADDRESS_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&address.full_name)
        .bind(&address.street_address)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.zip_code)
        .bind(&address.country)
        .bind(address.phone_number.as_deref())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete an address. Orders keep their rows with the address detached.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address does not exist.
    pub async fn delete(&self, id: AddressId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.shipping_address WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
