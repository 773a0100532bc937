//! Books repository for database operations

use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        author::Author,
        book::{availability, Book, BookDetails, CreateBook, UpdateBook},
        category::Category,
    },
};

/// Map a joined books/authors/categories row into a populated book.
/// Expects the `book_`/`author_`/`category_` column aliases used by all
/// populated book queries.
pub(crate) fn map_book_details(row: &PgRow) -> BookDetails {
    BookDetails {
        id: row.get("book_id"),
        title: row.get("book_title"),
        author: Author {
            id: row.get("author_id"),
            name: row.get("author_name"),
            birth_year: row.get("author_birth_year"),
            nationality: row.get("author_nationality"),
            created_at: row.get("author_created_at"),
            updated_at: row.get("author_updated_at"),
        },
        category: Category {
            id: row.get("category_id"),
            name: row.get("category_name"),
            description: row.get("category_description"),
            created_at: row.get("category_created_at"),
            updated_at: row.get("category_updated_at"),
        },
        description: row.get("book_description"),
        stock: row.get("book_stock"),
        available: row.get("book_available"),
        isbn: row.get("book_isbn"),
        publication_year: row.get("book_publication_year"),
        publisher: row.get("book_publisher"),
        pages: row.get("book_pages"),
        image: row.get("book_image"),
        created_at: row.get("book_created_at"),
        updated_at: row.get("book_updated_at"),
    }
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// List all books, author and category populated
    pub async fn list(&self) -> AppResult<Vec<BookDetails>> {
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
            ORDER BY b.title
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_book_details).collect())
    }

    /// Get a book by ID, author and category populated
    pub async fn get_by_id(&self, id: i32) -> AppResult<BookDetails> {
        let row = sqlx::query(
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
            WHERE b.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        Ok(map_book_details(&row))
    }

    /// Get the raw book row (foreign keys unresolved)
    pub async fn get_row_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Check if an ISBN already exists
    pub async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = if let Some(id) = exclude_id {
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND id != $2)")
                .bind(isbn)
                .bind(id)
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1)")
                .bind(isbn)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(exists)
    }

    /// Create a new book. Availability is derived from the initial stock.
    pub async fn create(&self, book: &CreateBook) -> AppResult<BookDetails> {
        let stock = book.stock.unwrap_or(0);

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO books (title, author_id, category_id, description, stock, available,
                               isbn, publication_year, publisher, pages, image)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(&book.title)
        .bind(book.author)
        .bind(book.category)
        .bind(&book.description)
        .bind(stock)
        .bind(availability(stock))
        .bind(&book.isbn)
        .bind(book.publication_year)
        .bind(&book.publisher)
        .bind(book.pages)
        .bind(&book.image)
        .fetch_one(&self.pool)
        .await?;

        self.get_by_id(id).await
    }

    /// Update an existing book. When stock is supplied, availability is
    /// recomputed from it in the same statement; otherwise both keep their
    /// current (already consistent) values.
    pub async fn update(&self, id: i32, book: &UpdateBook) -> AppResult<BookDetails> {
        let updated = sqlx::query(
            r#"
            UPDATE books
            SET title = $2,
                author_id = $3,
                category_id = $4,
                description = $5,
                stock = COALESCE($6, stock),
                available = COALESCE($6, stock) > 0,
                isbn = $7,
                publication_year = $8,
                publisher = $9,
                pages = $10,
                image = $11,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&book.title)
        .bind(book.author)
        .bind(book.category)
        .bind(&book.description)
        .bind(book.stock)
        .bind(&book.isbn)
        .bind(book.publication_year)
        .bind(&book.publisher)
        .bind(book.pages)
        .bind(&book.image)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        self.get_by_id(id).await
    }

    /// Check if any book references the given author
    pub async fn author_in_use(&self, author_id: i32) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE author_id = $1)")
                .bind(author_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Check if any book references the given category
    pub async fn category_in_use(&self, category_id: i32) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE category_id = $1)")
                .bind(category_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Delete a book
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        Ok(())
    }
}
