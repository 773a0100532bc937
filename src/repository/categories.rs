//! Categories repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookDetails,
        category::{Category, CreateCategory, UpdateCategory},
    },
};

use super::books::map_book_details;

#[derive(Clone)]
pub struct CategoriesRepository {
    pool: Pool<Postgres>,
}

impl CategoriesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// List all categories
    pub async fn list(&self) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    /// Get category by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Category> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))
    }

    /// Check if a category name already exists
    pub async fn name_exists(&self, name: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = if let Some(id) = exclude_id {
            sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM categories WHERE LOWER(name) = LOWER($1) AND id != $2)",
            )
            .bind(name)
            .bind(id)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE LOWER(name) = LOWER($1))")
                .bind(name)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(exists)
    }

    /// Create a new category
    pub async fn create(&self, category: &CreateCategory) -> AppResult<Category> {
        let created = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name, description)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(&category.name)
        .bind(&category.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update an existing category
    pub async fn update(&self, id: i32, category: &UpdateCategory) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&category.name)
        .bind(&category.description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))
    }

    /// Delete a category
    pub async fn delete(&self, id: i32) -> AppResult<Category> {
        sqlx::query_as::<_, Category>("DELETE FROM categories WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))
    }

    /// List all books in a category, author and category populated
    pub async fn list_books(&self, category_id: i32) -> AppResult<Vec<BookDetails>> {
        let rows = sqlx::query(
            r#"
            SELECT b.id AS book_id, b.title AS book_title, b.description AS book_description,
                   b.stock AS book_stock, b.available AS book_available, b.isbn AS book_isbn,
                   b.publication_year AS book_publication_year, b.publisher AS book_publisher,
                   b.pages AS book_pages, b.image AS book_image,
                   b.created_at AS book_created_at, b.updated_at AS book_updated_at,
                   a.id AS author_id, a.name AS author_name, a.birth_year AS author_birth_year,
                   a.nationality AS author_nationality,
                   a.created_at AS author_created_at, a.updated_at AS author_updated_at,
                   c.id AS category_id, c.name AS category_name,
                   c.description AS category_description,
                   c.created_at AS category_created_at, c.updated_at AS category_updated_at
            FROM books b
            JOIN authors a ON b.author_id = a.id
            JOIN categories c ON b.category_id = c.id
            WHERE b.category_id = $1
            ORDER BY b.title
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_book_details).collect())
    }
}
