//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, authors, books, categories, health, loans, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Librarium API",
        version = "1.0.0",
        description = "Library Management System REST API",
        license(name = "MIT")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::profile,
        // Authors
        authors::list_authors,
        authors::get_author,
        authors::create_author,
        authors::update_author,
        authors::delete_author,
        // Categories
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        categories::get_books_by_category,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Users
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        // Loans
        loans::create_loan,
        loans::list_loans,
        loans::list_overdue_loans,
        loans::get_loan,
        loans::update_loan_status,
        loans::extend_loan,
        loans::return_loan,
        loans::get_user_loans,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::AuthResponse,
            // Authors
            crate::models::author::Author,
            crate::models::author::CreateAuthor,
            crate::models::author::UpdateAuthor,
            // Categories
            crate::models::category::Category,
            crate::models::category::CreateCategory,
            crate::models::category::UpdateCategory,
            // Books
            crate::models::book::BookDetails,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Users
            crate::models::user::User,
            crate::models::user::UserSummary,
            crate::models::user::Role,
            crate::models::user::RegisterUser,
            crate::models::user::UpdateUser,
            // Loans
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanStatus,
            loans::CreateLoanRequest,
            loans::ExtendLoanRequest,
            loans::UpdateLoanStatusRequest,
            loans::LoanResponse,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and authentication"),
        (name = "authors", description = "Author catalog management"),
        (name = "categories", description = "Category catalog management"),
        (name = "books", description = "Book catalog management"),
        (name = "users", description = "User management"),
        (name = "loans", description = "Loan lifecycle")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
