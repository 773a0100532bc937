//! Loans repository for database operations.
//!
//! Stock accounting rides the loan transactions: borrowing decrements the
//! book's stock with a conditional update (`WHERE stock > 0`) and returning
//! increments it, both in the same transaction as the loan mutation, with
//! `available` recomputed from the stock expression. Two concurrent borrows
//! of the last copy cannot both succeed.

use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{CreateLoan, Loan, LoanDetails, LoanStatus, LOAN_PERIOD_DAYS},
        user::UserSummary,
    },
};

use super::books::map_book_details;

/// Joined loan/user/book/author/category column list shared by all populated
/// loan queries. Kept in one place so every read returns the same shape.
const LOAN_DETAILS_SELECT: &str = r#"
SELECT l.id AS loan_id, l.loan_date, l.due_date, l.return_date, l.status AS loan_status,
       l.user_id, u.username AS user_username, u.email AS user_email,
       b.id AS book_id, b.title AS book_title, b.description AS book_description,
       b.stock AS book_stock, b.available AS book_available, b.isbn AS book_isbn,
       b.publication_year AS book_publication_year, b.publisher AS book_publisher,
       b.pages AS book_pages, b.image AS book_image,
       b.created_at AS book_created_at, b.updated_at AS book_updated_at,
       a.id AS author_id, a.name AS author_name, a.birth_year AS author_birth_year,
       a.nationality AS author_nationality,
       a.created_at AS author_created_at, a.updated_at AS author_updated_at,
       c.id AS category_id, c.name AS category_name, c.description AS category_description,
       c.created_at AS category_created_at, c.updated_at AS category_updated_at
FROM loans l
JOIN users u ON l.user_id = u.id
JOIN books b ON l.book_id = b.id
JOIN authors a ON b.author_id = a.id
JOIN categories c ON b.category_id = c.id
"#;

/// Map a joined loan row into a populated loan. Overdue-ness is computed
/// against `now`, never read from storage.
fn map_loan_details(row: &PgRow, now: DateTime<Utc>) -> LoanDetails {
    let status: LoanStatus = row.get("loan_status");
    let loan_date: DateTime<Utc> = row.get("loan_date");
    let due_date: Option<DateTime<Utc>> = row.get("due_date");
    let effective_due = due_date.unwrap_or(loan_date + Duration::days(LOAN_PERIOD_DAYS));

    LoanDetails {
        id: row.get("loan_id"),
        user: UserSummary {
            id: row.get("user_id"),
            username: row.get("user_username"),
            email: row.get("user_email"),
        },
        book: map_book_details(row),
        loan_date,
        due_date,
        return_date: row.get("return_date"),
        status,
        is_overdue: status == LoanStatus::Borrowed && now > effective_due,
    }
}

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Get a loan by ID with user and book populated
    pub async fn get_details_by_id(&self, id: i32) -> AppResult<LoanDetails> {
        let query = format!("{} WHERE l.id = $1", LOAN_DETAILS_SELECT);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;

        Ok(map_loan_details(&row, Utc::now()))
    }

    /// List all loans, populated, newest first
    pub async fn list_all(&self) -> AppResult<Vec<LoanDetails>> {
        let query = format!("{} ORDER BY l.loan_date DESC", LOAN_DETAILS_SELECT);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let now = Utc::now();
        Ok(rows.iter().map(|row| map_loan_details(row, now)).collect())
    }

    /// List loans for a user, populated, newest first
    pub async fn list_by_user(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        let query = format!(
            "{} WHERE l.user_id = $1 ORDER BY l.loan_date DESC",
            LOAN_DETAILS_SELECT
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        let now = Utc::now();
        Ok(rows.iter().map(|row| map_loan_details(row, now)).collect())
    }

    /// List overdue loans: still borrowed, effective due date in the past.
    /// The filter runs at query time; overdue-ness is never stored.
    pub async fn list_overdue(&self) -> AppResult<Vec<LoanDetails>> {
        let query = format!(
            "{} WHERE l.status = 'borrowed' \
             AND COALESCE(l.due_date, l.loan_date + INTERVAL '14 days') < NOW() \
             ORDER BY l.loan_date DESC",
            LOAN_DETAILS_SELECT
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let now = Utc::now();
        Ok(rows.iter().map(|row| map_loan_details(row, now)).collect())
    }

    /// Create a new loan and decrement the book's stock, in one transaction.
    /// The decrement is conditional on `stock > 0`, so concurrent borrows of
    /// the last copy cannot drive stock negative.
    pub async fn create(&self, loan: &CreateLoan) -> AppResult<Loan> {
        let now = Utc::now();
        let due_date = loan
            .due_date
            .unwrap_or(now + Duration::days(LOAN_PERIOD_DAYS));

        let mut tx = self.pool.begin().await?;

        let book = sqlx::query("SELECT stock, available FROM books WHERE id = $1 FOR UPDATE")
            .bind(loan.book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", loan.book_id)))?;

        let stock: i32 = book.get("stock");
        let available: bool = book.get("available");
        if !available || stock <= 0 {
            return Err(AppError::InvalidState(
                "Book is not available for loan".to_string(),
            ));
        }

        let decremented = sqlx::query(
            r#"
            UPDATE books
            SET stock = stock - 1,
                available = stock - 1 > 0,
                updated_at = $2
            WHERE id = $1 AND stock > 0
            "#,
        )
        .bind(loan.book_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if decremented.rows_affected() == 0 {
            return Err(AppError::InvalidState(
                "Book is not available for loan".to_string(),
            ));
        }

        let created = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (user_id, book_id, loan_date, due_date, status)
            VALUES ($1, $2, $3, $4, 'borrowed')
            RETURNING *
            "#,
        )
        .bind(loan.user_id)
        .bind(loan.book_id)
        .bind(now)
        .bind(due_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(created)
    }

    /// Return a loan: set status/return date and restore the book's stock,
    /// in one transaction. A loan is returned exactly once.
    pub async fn return_loan(&self, loan_id: i32) -> AppResult<Loan> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;

        if loan.status == LoanStatus::Returned {
            return Err(AppError::InvalidState("Book already returned".to_string()));
        }

        let returned = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = 'returned', return_date = $2, updated_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(loan_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // available is recomputed from the incremented stock, never assigned
        // independently of it
        sqlx::query(
            r#"
            UPDATE books
            SET stock = stock + 1,
                available = stock + 1 > 0,
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(loan.book_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(returned)
    }

    /// Extend a loan's due date by the given number of days, anchored to the
    /// current effective due date. Returned and overdue loans cannot be
    /// extended.
    pub async fn extend_loan(&self, loan_id: i32, extension_days: i64) -> AppResult<Loan> {
        let loan = self.get_by_id(loan_id).await?;

        if loan.status == LoanStatus::Returned {
            return Err(AppError::InvalidState(
                "Cannot extend a returned loan".to_string(),
            ));
        }

        if loan.is_overdue_at(Utc::now()) {
            return Err(AppError::InvalidState(
                "Cannot extend an overdue loan".to_string(),
            ));
        }

        let new_due_date = loan.extended_due_date(extension_days);

        sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET due_date = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'borrowed'
            RETURNING *
            "#,
        )
        .bind(loan_id)
        .bind(new_due_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))
    }

    /// Set a loan's status. Transitioning borrowed -> returned applies the
    /// full return side effects; a returned loan stays returned.
    pub async fn set_status(&self, loan_id: i32, status: LoanStatus) -> AppResult<Loan> {
        let loan = self.get_by_id(loan_id).await?;

        match (loan.status, status) {
            (LoanStatus::Borrowed, LoanStatus::Returned) => self.return_loan(loan_id).await,
            (LoanStatus::Returned, LoanStatus::Borrowed) => Err(AppError::InvalidState(
                "Cannot reopen a returned loan; create a new loan instead".to_string(),
            )),
            // Same status: nothing to do
            _ => Ok(loan),
        }
    }

    /// Check if a book has outstanding (borrowed) loans
    pub async fn book_has_active(&self, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE book_id = $1 AND status = 'borrowed')",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Check if a user has outstanding (borrowed) loans
    pub async fn user_has_active(&self, user_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND status = 'borrowed')",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
