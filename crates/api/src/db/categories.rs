//! Category repository.

use std::collections::HashMap;

use sqlx::{PgConnection, PgPool};

use tradepost_core::CategoryId;

use super::RepositoryError;
use crate::models::catalog::{Category, CategoryDetail, CategoryNode, CategoryRef, ProductSummary};

const CATEGORY_COLUMNS: &str = "id, name, parent_id, created_at, updated_at";
const DUPLICATE_NAME: &str = "Category with this name already exists";
pub const PARENT_NOT_FOUND: &str = "Parent category not found";
pub const PARENT_CYCLE: &str =
    "A category cannot be its own parent or a child of its descendants";

/// Advisory lock held while a category changes parent. Moves are
/// serialised so two of them can never close a loop between them.
const REPARENT_LOCK: i64 = 0x7470_6361_7467_7279;

/// Repository for category database operations.
pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    /// Create a new category repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a category row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM shop.category WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(category)
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create(
        &self,
        name: &str,
        parent_id: Option<CategoryId>,
    ) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>(&format!(
            r"
            INSERT INTO shop.category (id, name, parent_id)
            VALUES ($1, $2, $3)
            RETURNING {CATEGORY_COLUMNS}
            "
        ))
        .bind(CategoryId::new())
        .bind(name)
        .bind(parent_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::on_unique(e, DUPLICATE_NAME))
    }

    /// Every category with its parent and children.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<CategoryNode>, RepositoryError> {
        let categories = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM shop.category ORDER BY name"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(build_tree(categories))
    }

    /// A category with parent, children and product summaries.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    pub async fn detail(&self, id: CategoryId) -> Result<CategoryDetail, RepositoryError> {
        let category = self.get(id).await?.ok_or(RepositoryError::NotFound)?;

        let parent = match category.parent_id {
            Some(parent_id) => {
                sqlx::query_as::<_, CategoryRef>("SELECT id, name FROM shop.category WHERE id = $1")
                    .bind(parent_id)
                    .fetch_optional(self.pool)
                    .await?
            }
            None => None,
        };

        let children = sqlx::query_as::<_, CategoryRef>(
            "SELECT id, name FROM shop.category WHERE parent_id = $1 ORDER BY name",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let products = sqlx::query_as::<_, ProductSummary>(
            r"
            SELECT p.id, p.name, p.price, p.stock,
                   (SELECT url FROM shop.product_image i
                    WHERE i.product_id = p.id ORDER BY position LIMIT 1) AS image_url
            FROM shop.product p
            WHERE p.category_id = $1
            ORDER BY p.created_at DESC
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(CategoryDetail {
            node: CategoryNode {
                category,
                parent,
                children,
            },
            products,
        })
    }

    /// Rename or re-parent a category.
    ///
    /// `parent_id` is `Some(None)` to detach from the current parent. A new
    /// parent is checked for existence and cycles inside the same
    /// transaction as the write.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    /// Returns `RepositoryError::Conflict` if the name is taken.
    /// Returns `RepositoryError::Invalid` if the parent is unknown or would
    /// create a cycle.
    pub async fn update(
        &self,
        id: CategoryId,
        name: Option<&str>,
        parent_id: Option<Option<CategoryId>>,
    ) -> Result<Category, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some(Some(new_parent)) = parent_id {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(REPARENT_LOCK)
                .execute(&mut *tx)
                .await?;

            let parent_exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM shop.category WHERE id = $1)")
                    .bind(new_parent)
                    .fetch_one(&mut *tx)
                    .await?;
            if !parent_exists {
                return Err(RepositoryError::Invalid(PARENT_NOT_FOUND.to_owned()));
            }
            if is_self_or_descendant(&mut *tx, id, new_parent).await? {
                return Err(RepositoryError::Invalid(PARENT_CYCLE.to_owned()));
            }
        }

        let category = sqlx::query_as::<_, Category>(&format!(
            r"
            UPDATE shop.category
            SET name = COALESCE($2, name),
                parent_id = CASE WHEN $3 THEN $4 ELSE parent_id END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CATEGORY_COLUMNS}
            "
        ))
        .bind(id)
        .bind(name)
        .bind(parent_id.is_some())
        .bind(parent_id.flatten())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_unique(e, DUPLICATE_NAME))?
        .ok_or(RepositoryError::NotFound)?;

        tx.commit().await?;
        Ok(category)
    }

    /// Delete a category. Children are detached by the foreign key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    /// Returns `RepositoryError::Conflict` if products still reference it.
    pub async fn delete(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.category WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if RepositoryError::is_foreign_key_violation(&e) {
                    RepositoryError::Conflict(
                        "Category still has products and cannot be deleted".to_owned(),
                    )
                } else {
                    RepositoryError::Database(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Whether `candidate` is `id` itself or sits somewhere below it.
async fn is_self_or_descendant(
    conn: &mut PgConnection,
    id: CategoryId,
    candidate: CategoryId,
) -> Result<bool, RepositoryError> {
    let found: bool = sqlx::query_scalar(
        r"
        WITH RECURSIVE subtree AS (
            SELECT id FROM shop.category WHERE id = $1
            UNION
            SELECT c.id FROM shop.category c JOIN subtree s ON c.parent_id = s.id
        )
        SELECT EXISTS (SELECT 1 FROM subtree WHERE id = $2)
        ",
    )
    .bind(id)
    .bind(candidate)
    .fetch_one(conn)
    .await?;
    Ok(found)
}

/// Attach parent and children references to a flat category list.
fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let names: HashMap<CategoryId, String> = categories
        .iter()
        .map(|c| (c.id, c.name.clone()))
        .collect();

    let mut children: HashMap<CategoryId, Vec<CategoryRef>> = HashMap::new();
    for category in &categories {
        if let Some(parent_id) = category.parent_id {
            children.entry(parent_id).or_default().push(CategoryRef {
                id: category.id,
                name: category.name.clone(),
            });
        }
    }

    categories
        .into_iter()
        .map(|category| {
            let parent = category.parent_id.and_then(|pid| {
                names.get(&pid).map(|name| CategoryRef {
                    id: pid,
                    name: name.clone(),
                })
            });
            let children = children.remove(&category.id).unwrap_or_default();
            CategoryNode {
                category,
                parent,
                children,
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn category(name: &str, parent_id: Option<CategoryId>) -> Category {
        Category {
            id: CategoryId::new(),
            name: name.to_string(),
            parent_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_tree_links_parents_and_children() {
        let clothing = category("Clothing", None);
        let shirts = category("Shirts", Some(clothing.id));
        let hats = category("Hats", Some(clothing.id));
        let clothing_id = clothing.id;

        let tree = build_tree(vec![clothing, hats, shirts]);

        let root = tree.iter().find(|n| n.category.id == clothing_id).unwrap();
        assert!(root.parent.is_none());
        assert_eq!(root.children.len(), 2);

        let shirt_node = tree.iter().find(|n| n.category.name == "Shirts").unwrap();
        assert_eq!(shirt_node.parent.as_ref().unwrap().name, "Clothing");
        assert!(shirt_node.children.is_empty());
    }
}
