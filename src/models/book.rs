//! Book model and related types.
//!
//! A book carries a lendable `stock` counter and a derived `available` flag.
//! The flag is never assigned independently: every mutation that touches stock
//! recomputes it through [`availability`], so `available == (stock > 0)` holds
//! after every catalog or loan operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::author::Author;
use super::category::Category;

/// Derived availability of a book with the given stock
pub fn availability(stock: i32) -> bool {
    stock > 0
}

/// Book model from database (author/category as foreign keys)
#[derive(Debug, Clone, FromRow)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author_id: i32,
    pub category_id: i32,
    pub description: Option<String>,
    pub stock: i32,
    pub available: bool,
    pub isbn: String,
    pub publication_year: i32,
    pub publisher: String,
    pub pages: i32,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Book with author and category populated, as returned by all read operations
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookDetails {
    pub id: i32,
    pub title: String,
    pub author: Author,
    pub category: Category,
    pub description: Option<String>,
    pub stock: i32,
    pub available: bool,
    pub isbn: String,
    pub publication_year: i32,
    pub publisher: String,
    pub pages: i32,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create book request. `author` and `category` are entity ids.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub author: i32,
    pub category: i32,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    pub publication_year: i32,
    #[validate(length(min = 1, message = "Publisher is required"))]
    pub publisher: String,
    #[validate(range(min = 1, message = "Page count must be positive"))]
    pub pages: i32,
    pub image: Option<String>,
}

/// Update book request. Same mandatory fields as creation; stock is optional
/// and availability is recomputed whenever it is supplied.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub author: i32,
    pub category: i32,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    pub publication_year: i32,
    #[validate(length(min = 1, message = "Publisher is required"))]
    pub publisher: String,
    #[validate(range(min = 1, message = "Page count must be positive"))]
    pub pages: i32,
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_follows_stock() {
        assert!(!availability(0));
        assert!(availability(1));
        assert!(availability(42));
    }

    #[test]
    fn availability_of_negative_stock_is_false() {
        // Stock is CHECK-constrained non-negative, but the derivation must
        // not report a divergent count as available.
        assert!(!availability(-1));
    }
}
