//! Loan lifecycle service: borrow, return, extend, overdue accounting

use crate::{
    error::{AppError, AppResult},
    models::loan::{CreateLoan, Loan, LoanDetails, LoanStatus},
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
}

impl LoansService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Create a new loan (borrow a book)
    pub async fn create_loan(&self, loan: CreateLoan) -> AppResult<LoanDetails> {
        // Verify user exists; book existence and availability are checked
        // inside the loan transaction
        self.repository.users.get_by_id(loan.user_id).await?;

        let created = self.repository.loans.create(&loan).await?;
        tracing::info!(
            "Loan {} created: user={} book={}",
            created.id,
            created.user_id,
            created.book_id
        );

        self.repository.loans.get_details_by_id(created.id).await
    }

    /// Get a loan by ID, populated. Also used by handlers to resolve the
    /// loan's owner before the ownership policy check.
    pub async fn get_loan(&self, loan_id: i32) -> AppResult<LoanDetails> {
        self.repository.loans.get_details_by_id(loan_id).await
    }

    /// Get the raw loan row (owner resolution without population)
    pub async fn get_loan_row(&self, loan_id: i32) -> AppResult<Loan> {
        self.repository.loans.get_by_id(loan_id).await
    }

    /// List all loans, populated
    pub async fn list_loans(&self) -> AppResult<Vec<LoanDetails>> {
        self.repository.loans.list_all().await
    }

    /// List overdue loans (borrowed, effective due date in the past)
    pub async fn list_overdue(&self) -> AppResult<Vec<LoanDetails>> {
        self.repository.loans.list_overdue().await
    }

    /// Get loans for a user, newest first
    pub async fn get_user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        // Verify user exists
        self.repository.users.get_by_id(user_id).await?;
        self.repository.loans.list_by_user(user_id).await
    }

    /// Return a borrowed book
    pub async fn return_loan(&self, loan_id: i32) -> AppResult<LoanDetails> {
        let returned = self.repository.loans.return_loan(loan_id).await?;
        tracing::info!("Loan {} returned: book={}", returned.id, returned.book_id);

        self.repository.loans.get_details_by_id(loan_id).await
    }

    /// Extend a loan's due date
    pub async fn extend_loan(&self, loan_id: i32, extension_days: i64) -> AppResult<LoanDetails> {
        if extension_days <= 0 {
            return Err(AppError::Validation(
                "Please provide a valid extension period".to_string(),
            ));
        }

        self.repository.loans.extend_loan(loan_id, extension_days).await?;
        self.repository.loans.get_details_by_id(loan_id).await
    }

    /// Set a loan's status, applying return side effects when transitioning
    /// to returned
    pub async fn update_status(&self, loan_id: i32, status: LoanStatus) -> AppResult<LoanDetails> {
        self.repository.loans.set_status(loan_id, status).await?;
        self.repository.loans.get_details_by_id(loan_id).await
    }
}
