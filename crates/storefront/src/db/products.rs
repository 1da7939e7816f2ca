//! Product repository used by the catalog sync.

use sqlx::PgPool;

use super::RepositoryError;
use crate::models::ProductUpsert;

/// Repository for local product rows.
#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh product rows in one transaction.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails; nothing is
    /// written in that case.
    pub async fn upsert_many(&self, products: &[ProductUpsert]) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for product in products {
            let result = sqlx::query(
                r"
                INSERT INTO okapi.products (id, name, description, price, image, in_stock)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    description = COALESCE(EXCLUDED.description, okapi.products.description),
                    price = EXCLUDED.price,
                    image = EXCLUDED.image,
                    in_stock = EXCLUDED.in_stock,
                    updated_at = NOW()
                ",
            )
            .bind(product.id)
            .bind(&product.name)
            .bind(product.description.as_deref())
            .bind(product.price)
            .bind(product.image.as_deref())
            .bind(product.in_stock)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Mark products missing from the latest sync as out of stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_missing_out_of_stock(&self, present: &[i64]) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE okapi.products
            SET in_stock = FALSE, updated_at = NOW()
            WHERE in_stock AND NOT (id = ANY($1))
            ",
        )
        .bind(present)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
