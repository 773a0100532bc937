//! Catalog management service: authors, categories, and books

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, CreateAuthor, UpdateAuthor},
        book::{BookDetails, CreateBook, UpdateBook},
        category::{Category, CreateCategory, UpdateCategory},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    // Authors

    pub async fn list_authors(&self) -> AppResult<Vec<Author>> {
        self.repository.authors.list().await
    }

    pub async fn get_author(&self, id: i32) -> AppResult<Author> {
        self.repository.authors.get_by_id(id).await
    }

    pub async fn create_author(&self, author: CreateAuthor) -> AppResult<Author> {
        self.repository.authors.create(&author).await
    }

    pub async fn update_author(&self, id: i32, author: UpdateAuthor) -> AppResult<Author> {
        self.repository.authors.update(id, &author).await
    }

    /// Delete an author. Refused while books still reference them.
    pub async fn delete_author(&self, id: i32) -> AppResult<Author> {
        if self.repository.books.author_in_use(id).await? {
            return Err(AppError::Conflict(
                "Author is referenced by existing books".to_string(),
            ));
        }
        self.repository.authors.delete(id).await
    }

    // Categories

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.repository.categories.list().await
    }

    pub async fn get_category(&self, id: i32) -> AppResult<Category> {
        self.repository.categories.get_by_id(id).await
    }

    pub async fn create_category(&self, category: CreateCategory) -> AppResult<Category> {
        if self
            .repository
            .categories
            .name_exists(&category.name, None)
            .await?
        {
            return Err(AppError::Conflict(
                "Category with this name already exists".to_string(),
            ));
        }
        self.repository.categories.create(&category).await
    }

    pub async fn update_category(&self, id: i32, category: UpdateCategory) -> AppResult<Category> {
        if let Some(ref name) = category.name {
            if self.repository.categories.name_exists(name, Some(id)).await? {
                return Err(AppError::Conflict(
                    "Category with this name already exists".to_string(),
                ));
            }
        }
        self.repository.categories.update(id, &category).await
    }

    /// Delete a category. Refused while books still reference it.
    pub async fn delete_category(&self, id: i32) -> AppResult<Category> {
        if self.repository.books.category_in_use(id).await? {
            return Err(AppError::Conflict(
                "Category is referenced by existing books".to_string(),
            ));
        }
        self.repository.categories.delete(id).await
    }

    /// List all books in a category
    pub async fn get_books_by_category(&self, category_id: i32) -> AppResult<Vec<BookDetails>> {
        self.repository.categories.get_by_id(category_id).await?;
        self.repository.categories.list_books(category_id).await
    }

    // Books

    pub async fn list_books(&self) -> AppResult<Vec<BookDetails>> {
        self.repository.books.list().await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<BookDetails> {
        self.repository.books.get_by_id(id).await
    }

    /// Create a book. The author and category references must exist and the
    /// ISBN must be unique; availability is derived from the initial stock.
    pub async fn create_book(&self, book: CreateBook) -> AppResult<BookDetails> {
        self.repository.authors.get_by_id(book.author).await?;
        self.repository.categories.get_by_id(book.category).await?;

        if self.repository.books.isbn_exists(&book.isbn, None).await? {
            return Err(AppError::Conflict(
                "Book with this ISBN already exists".to_string(),
            ));
        }

        self.repository.books.create(&book).await
    }

    /// Update a book. Availability is recomputed whenever stock is supplied.
    pub async fn update_book(&self, id: i32, book: UpdateBook) -> AppResult<BookDetails> {
        self.repository.authors.get_by_id(book.author).await?;
        self.repository.categories.get_by_id(book.category).await?;

        if self.repository.books.isbn_exists(&book.isbn, Some(id)).await? {
            return Err(AppError::Conflict(
                "Book with this ISBN already exists".to_string(),
            ));
        }

        self.repository.books.update(id, &book).await
    }

    /// Delete a book. Refused while it has borrowed loans unless forced.
    pub async fn delete_book(&self, id: i32, force: bool) -> AppResult<()> {
        self.repository.books.get_row_by_id(id).await?;

        if !force && self.repository.loans.book_has_active(id).await? {
            return Err(AppError::Conflict(
                "Book has active loans; pass force=true to delete anyway".to_string(),
            ));
        }

        self.repository.books.delete(id).await
    }
}
