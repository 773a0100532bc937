//! Loan lifecycle endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::loan::{CreateLoan, LoanDetails, LoanStatus},
};

use super::AuthenticatedUser;

/// Create loan request
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoanRequest {
    /// Borrowing user ID
    pub user_id: i32,
    /// Book ID
    pub book_id: i32,
    /// Due date; defaults to 14 days from now when omitted
    pub due_date: Option<DateTime<Utc>>,
}

/// Extend loan request
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtendLoanRequest {
    /// Number of days to add to the current due date
    pub extension_days: i64,
}

/// Update loan status request
#[derive(Deserialize, ToSchema)]
pub struct UpdateLoanStatusRequest {
    /// New status: "borrowed" or "returned"
    pub status: String,
}

/// Loan response with populated loan
#[derive(Serialize, ToSchema)]
pub struct LoanResponse {
    pub message: String,
    pub loan: LoanDetails,
}

/// Create a new loan (borrow a book)
#[utoipa::path(
    post,
    path = "/loans/create",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = LoanResponse),
        (status = 400, description = "Book is not available for loan"),
        (status = 404, description = "User or book not found")
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<LoanResponse>)> {
    claims.require_self_or_admin(request.user_id)?;

    let loan = state
        .services
        .loans
        .create_loan(CreateLoan {
            user_id: request.user_id,
            book_id: request.book_id,
            due_date: request.due_date,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LoanResponse {
            message: "Loan created successfully".to_string(),
            loan,
        }),
    ))
}

/// List all loans (admin only)
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All loans, populated", body = Vec<LoanDetails>),
        (status = 403, description = "Admin privileges required")
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_admin()?;

    let loans = state.services.loans.list_loans().await?;
    Ok(Json(loans))
}

/// List overdue loans (admin only)
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans", body = Vec<LoanDetails>),
        (status = 403, description = "Admin privileges required")
    )
)]
pub async fn list_overdue_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_admin()?;

    let loans = state.services.loans.list_overdue().await?;
    Ok(Json(loans))
}

/// Get a loan by ID (owner or admin)
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan(id).await?;
    claims.require_self_or_admin(loan.user.id)?;

    Ok(Json(loan))
}

/// Update loan status (admin only). Transitioning to "returned" applies the
/// same stock restore as an explicit return.
#[utoipa::path(
    put,
    path = "/loans/update/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = UpdateLoanStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = LoanResponse),
        (status = 400, description = "Invalid status or returned loan reopened"),
        (status = 403, description = "Admin privileges required"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn update_loan_status(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateLoanStatusRequest>,
) -> AppResult<Json<LoanResponse>> {
    claims.require_admin()?;

    let status: LoanStatus = request
        .status
        .parse()
        .map_err(|_| AppError::Validation("Invalid status".to_string()))?;

    let loan = state.services.loans.update_status(id, status).await?;

    Ok(Json(LoanResponse {
        message: "Loan status updated successfully".to_string(),
        loan,
    }))
}

/// Extend a loan's due date (owner or admin)
#[utoipa::path(
    put,
    path = "/loans/{id}/extend",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = ExtendLoanRequest,
    responses(
        (status = 200, description = "Loan extended", body = LoanResponse),
        (status = 400, description = "Invalid period, returned, or overdue loan"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn extend_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<ExtendLoanRequest>,
) -> AppResult<Json<LoanResponse>> {
    let current = state.services.loans.get_loan_row(id).await?;
    claims.require_self_or_admin(current.user_id)?;

    let loan = state
        .services
        .loans
        .extend_loan(id, request.extension_days)
        .await?;

    Ok(Json(LoanResponse {
        message: "Loan extended successfully".to_string(),
        loan,
    }))
}

/// Return a borrowed book (owner or admin)
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = LoanResponse),
        (status = 400, description = "Book already returned"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanResponse>> {
    let current = state.services.loans.get_loan_row(id).await?;
    claims.require_self_or_admin(current.user_id)?;

    let loan = state.services.loans.return_loan(id).await?;

    Ok(Json(LoanResponse {
        message: "Book returned successfully".to_string(),
        loan,
    }))
}

/// Get loans for a specific user (self or admin), newest first
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's loan history", body = Vec<LoanDetails>),
        (status = 403, description = "Access denied"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_self_or_admin(user_id)?;

    let loans = state.services.loans.get_user_loans(user_id).await?;
    Ok(Json(loans))
}
