//! API integration tests
//!
//! These run against a live server and are ignored by default. Start the
//! server on a fresh database (so the "admin" account can be provisioned as
//! the bootstrap admin), then run:
//!
//!     cargo test -- --ignored --test-threads=1

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

const BASE_URL: &str = "http://localhost:8080";

/// Unique suffix so tests can be re-run against the same database
fn unique() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Clock before epoch")
        .as_nanos()
}

/// Register a fresh user and return (token, user id)
async fn register_user(client: &Client, prefix: &str) -> (String, i64) {
    let suffix = unique();
    let response = client
        .post(format!("{}/users/register", BASE_URL))
        .json(&json!({
            "username": format!("{}{}", prefix, suffix),
            "email": format!("{}{}@example.com", prefix, suffix),
            "password": "password1"
        }))
        .send()
        .await
        .expect("Failed to send register request");

    assert_eq!(response.status(), 201);

    let body: Value = response.json().await.expect("Failed to parse register response");
    let token = body["token"].as_str().expect("No token in response").to_string();
    let user_id = body["user"]["id"].as_i64().expect("No user id in response");
    (token, user_id)
}

/// Log in as the provisioned admin account, registering it on a fresh
/// database (the first account becomes the bootstrap admin)
async fn admin_token(client: &Client) -> String {
    let response = client
        .post(format!("{}/users/login", BASE_URL))
        .json(&json!({
            "username": "admin",
            "password": "admin123"
        }))
        .send()
        .await
        .expect("Failed to send login request");

    if response.status().is_success() {
        let body: Value = response.json().await.expect("Failed to parse login response");
        return body["token"].as_str().expect("No token in response").to_string();
    }

    let response = client
        .post(format!("{}/users/register", BASE_URL))
        .json(&json!({
            "username": "admin",
            "email": "admin@example.com",
            "password": "admin123"
        }))
        .send()
        .await
        .expect("Failed to send register request");

    let body: Value = response.json().await.expect("Failed to parse register response");
    assert_eq!(body["user"]["role"], "admin", "First account should bootstrap as admin");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Create an author, a category, and a book with the given stock.
/// Returns the book id.
async fn create_book(client: &Client, stock: i64) -> i64 {
    let suffix = unique();

    let response = client
        .post(format!("{}/authors/create", BASE_URL))
        .json(&json!({
            "name": format!("Author {}", suffix),
            "birthYear": 1950,
            "nationality": "French"
        }))
        .send()
        .await
        .expect("Failed to create author");
    assert_eq!(response.status(), 201);
    let author: Value = response.json().await.expect("Failed to parse author");

    let response = client
        .post(format!("{}/categories/create", BASE_URL))
        .json(&json!({
            "name": format!("Category {}", suffix),
            "description": "Test category"
        }))
        .send()
        .await
        .expect("Failed to create category");
    assert_eq!(response.status(), 201);
    let category: Value = response.json().await.expect("Failed to parse category");

    let response = client
        .post(format!("{}/books/create", BASE_URL))
        .json(&json!({
            "title": format!("Book {}", suffix),
            "author": author["id"],
            "category": category["id"],
            "stock": stock,
            "isbn": format!("isbn-{}", suffix),
            "publicationYear": 1999,
            "publisher": "Test Press",
            "pages": 320
        }))
        .send()
        .await
        .expect("Failed to create book");
    assert_eq!(response.status(), 201);
    let book: Value = response.json().await.expect("Failed to parse book");
    book["id"].as_i64().expect("No book id")
}

async fn get_book(client: &Client, id: i64) -> Value {
    let response = client
        .get(format!("{}/books/{}", BASE_URL, id))
        .send()
        .await
        .expect("Failed to get book");
    assert!(response.status().is_success());
    response.json().await.expect("Failed to parse book")
}

/// Borrow a book; returns the full loan response body
async fn borrow(
    client: &Client,
    token: &str,
    user_id: i64,
    book_id: i64,
    due_date: Option<DateTime<Utc>>,
) -> reqwest::Response {
    let mut body = json!({ "userId": user_id, "bookId": book_id });
    if let Some(due) = due_date {
        body["dueDate"] = json!(due.to_rfc3339());
    }

    client
        .post(format!("{}/loans/create", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .json(&body)
        .send()
        .await
        .expect("Failed to send loan request")
}

#[tokio::test]
#[ignore]
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_register_and_login() {
    let client = Client::new();
    let suffix = unique();

    let response = client
        .post(format!("{}/users/register", BASE_URL))
        .json(&json!({
            "username": format!("reader{}", suffix),
            "email": format!("reader{}@example.com", suffix),
            "password": "password1"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 201);

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["user"]["username"], format!("reader{}", suffix));
    // The password hash must never be serialized
    assert!(body["user"].get("password").is_none());

    let response = client
        .post(format!("{}/users/login", BASE_URL))
        .json(&json!({
            "email": format!("reader{}@example.com", suffix),
            "password": "password1"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();
    let (_, _) = register_user(&client, "badlogin").await;

    let response = client
        .post(format!("{}/users/login", BASE_URL))
        .json(&json!({
            "username": "nonexistent-user",
            "password": "wrong"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_registration_conflicts() {
    let client = Client::new();
    let suffix = unique();
    let payload = json!({
        "username": format!("dup{}", suffix),
        "email": format!("dup{}@example.com", suffix),
        "password": "password1"
    });

    let response = client
        .post(format!("{}/users/register", BASE_URL))
        .json(&payload)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 201);

    let response = client
        .post(format!("{}/users/register", BASE_URL))
        .json(&payload)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 409);
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/loans", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
#[ignore]
async fn test_non_admin_cannot_list_loans() {
    let client = Client::new();
    let (token, _) = register_user(&client, "plain").await;

    let response = client
        .get(format!("{}/loans", BASE_URL))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 403);
}

#[tokio::test]
#[ignore]
async fn test_book_availability_follows_stock() {
    let client = Client::new();

    let book_id = create_book(&client, 3).await;
    let book = get_book(&client, book_id).await;
    assert_eq!(book["stock"], 3);
    assert_eq!(book["available"], true);
    // Read operations populate the references
    assert!(book["author"]["name"].is_string());
    assert!(book["category"]["name"].is_string());

    // Updating stock to zero flips availability
    let response = client
        .put(format!("{}/books/update/{}", BASE_URL, book_id))
        .json(&json!({
            "title": book["title"],
            "author": book["author"]["id"],
            "category": book["category"]["id"],
            "stock": 0,
            "isbn": book["isbn"],
            "publicationYear": book["publicationYear"],
            "publisher": book["publisher"],
            "pages": book["pages"]
        }))
        .send()
        .await
        .expect("Failed to update book");
    assert!(response.status().is_success());

    let book = get_book(&client, book_id).await;
    assert_eq!(book["stock"], 0);
    assert_eq!(book["available"], false);
}

#[tokio::test]
#[ignore]
async fn test_loan_lifecycle_stock_accounting() {
    let client = Client::new();
    let (token, user_id) = register_user(&client, "borrower").await;
    let book_id = create_book(&client, 2).await;

    // Two borrows exhaust the stock
    let first = borrow(&client, &token, user_id, book_id, None).await;
    assert_eq!(first.status(), 201);
    let first: Value = first.json().await.expect("Failed to parse loan");
    let first_loan_id = first["loan"]["id"].as_i64().expect("No loan id");
    assert_eq!(first["loan"]["status"], "borrowed");
    assert_eq!(first["loan"]["isOverdue"], false);

    let second = borrow(&client, &token, user_id, book_id, None).await;
    assert_eq!(second.status(), 201);

    let book = get_book(&client, book_id).await;
    assert_eq!(book["stock"], 0);
    assert_eq!(book["available"], false);

    // The third borrow finds no stock
    let third = borrow(&client, &token, user_id, book_id, None).await;
    assert_eq!(third.status(), 400);

    // Returning one copy restores stock and availability
    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, first_loan_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to return loan");
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse return");
    assert_eq!(body["loan"]["status"], "returned");
    assert!(body["loan"]["returnDate"].is_string());

    let book = get_book(&client, book_id).await;
    assert_eq!(book["stock"], 1);
    assert_eq!(book["available"], true);

    // A second return of the same loan is rejected and the stock is
    // incremented exactly once
    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, first_loan_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 400);

    let book = get_book(&client, book_id).await;
    assert_eq!(book["stock"], 1);
}

#[tokio::test]
#[ignore]
async fn test_default_due_date_is_14_days() {
    let client = Client::new();
    let (token, user_id) = register_user(&client, "dates").await;
    let book_id = create_book(&client, 1).await;

    let response = borrow(&client, &token, user_id, book_id, None).await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse loan");

    let loan_date: DateTime<Utc> = body["loan"]["loanDate"]
        .as_str()
        .expect("No loanDate")
        .parse()
        .expect("Bad loanDate");
    let due_date: DateTime<Utc> = body["loan"]["dueDate"]
        .as_str()
        .expect("No dueDate")
        .parse()
        .expect("Bad dueDate");

    let drift = (due_date - loan_date) - Duration::days(14);
    assert!(drift.num_seconds().abs() <= 1, "dueDate should be loanDate + 14 days");
}

#[tokio::test]
#[ignore]
async fn test_extension_is_anchored_to_due_date() {
    let client = Client::new();
    let (token, user_id) = register_user(&client, "extend").await;
    let book_id = create_book(&client, 1).await;

    let due = Utc::now() + Duration::days(3);
    let response = borrow(&client, &token, user_id, book_id, Some(due)).await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse loan");
    let loan_id = body["loan"]["id"].as_i64().expect("No loan id");

    let response = client
        .put(format!("{}/loans/{}/extend", BASE_URL, loan_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "extensionDays": 7 }))
        .send()
        .await
        .expect("Failed to extend loan");
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse extension");
    let new_due: DateTime<Utc> = body["loan"]["dueDate"]
        .as_str()
        .expect("No dueDate")
        .parse()
        .expect("Bad dueDate");

    // Anchored to the previous due date, not to the clock
    let drift = new_due - (due + Duration::days(7));
    assert!(drift.num_seconds().abs() <= 1);

    // Non-positive extensions are rejected
    let response = client
        .put(format!("{}/loans/{}/extend", BASE_URL, loan_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "extensionDays": 0 }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_overdue_loans() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (token, user_id) = register_user(&client, "late").await;
    let book_id = create_book(&client, 1).await;

    // Borrow with a due date already in the past
    let due = Utc::now() - Duration::hours(1);
    let response = borrow(&client, &token, user_id, book_id, Some(due)).await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse loan");
    let loan_id = body["loan"]["id"].as_i64().expect("No loan id");

    // Overdue loans cannot be extended
    let response = client
        .put(format!("{}/loans/{}/extend", BASE_URL, loan_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "extensionDays": 7 }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 400);

    // The loan shows up in the overdue listing, flagged
    let response = client
        .get(format!("{}/loans/overdue", BASE_URL))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .expect("Failed to list overdue");
    assert!(response.status().is_success());
    let overdue: Value = response.json().await.expect("Failed to parse overdue");
    let entry = overdue
        .as_array()
        .expect("Overdue should be an array")
        .iter()
        .find(|l| l["id"].as_i64() == Some(loan_id))
        .expect("Overdue loan missing from listing");
    assert_eq!(entry["isOverdue"], true);

    // Returned loans drop out of the overdue listing regardless of due date
    let response = client
        .post(format!("{}/loans/{}/return", BASE_URL, loan_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to return loan");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/loans/overdue", BASE_URL))
        .header("Authorization", format!("Bearer {}", admin))
        .send()
        .await
        .expect("Failed to list overdue");
    let overdue: Value = response.json().await.expect("Failed to parse overdue");
    assert!(overdue
        .as_array()
        .expect("Overdue should be an array")
        .iter()
        .all(|l| l["id"].as_i64() != Some(loan_id)));
}

#[tokio::test]
#[ignore]
async fn test_update_loan_status() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (token, user_id) = register_user(&client, "status").await;
    let book_id = create_book(&client, 1).await;

    let response = borrow(&client, &token, user_id, book_id, None).await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Failed to parse loan");
    let loan_id = body["loan"]["id"].as_i64().expect("No loan id");

    // Unknown status values are rejected
    let response = client
        .put(format!("{}/loans/update/{}", BASE_URL, loan_id))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&json!({ "status": "lost" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 400);

    // Transitioning to returned applies the return side effects
    let response = client
        .put(format!("{}/loans/update/{}", BASE_URL, loan_id))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&json!({ "status": "returned" }))
        .send()
        .await
        .expect("Failed to update status");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse update");
    assert_eq!(body["loan"]["status"], "returned");

    let book = get_book(&client, book_id).await;
    assert_eq!(book["stock"], 1);
    assert_eq!(book["available"], true);

    // A returned loan cannot be reopened
    let response = client
        .put(format!("{}/loans/update/{}", BASE_URL, loan_id))
        .header("Authorization", format!("Bearer {}", admin))
        .json(&json!({ "status": "borrowed" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore]
async fn test_user_loans_are_private_and_newest_first() {
    let client = Client::new();
    let (token, user_id) = register_user(&client, "history").await;
    let (other_token, _) = register_user(&client, "other").await;

    let first_book = create_book(&client, 1).await;
    let second_book = create_book(&client, 1).await;

    let response = borrow(&client, &token, user_id, first_book, None).await;
    assert_eq!(response.status(), 201);
    let response = borrow(&client, &token, user_id, second_book, None).await;
    assert_eq!(response.status(), 201);

    let response = client
        .get(format!("{}/users/{}/loans", BASE_URL, user_id))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Failed to list user loans");
    assert!(response.status().is_success());

    let loans: Value = response.json().await.expect("Failed to parse loans");
    let loans = loans.as_array().expect("Loans should be an array");
    assert_eq!(loans.len(), 2);

    let first_date: DateTime<Utc> = loans[0]["loanDate"].as_str().unwrap().parse().unwrap();
    let second_date: DateTime<Utc> = loans[1]["loanDate"].as_str().unwrap().parse().unwrap();
    assert!(first_date >= second_date, "Loans should be newest first");

    // Another user cannot read this history
    let response = client
        .get(format!("{}/users/{}/loans", BASE_URL, user_id))
        .header("Authorization", format!("Bearer {}", other_token))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 403);
}

#[tokio::test]
#[ignore]
async fn test_delete_book_with_active_loan_conflicts() {
    let client = Client::new();
    let (token, user_id) = register_user(&client, "deleter").await;
    let book_id = create_book(&client, 1).await;

    let response = borrow(&client, &token, user_id, book_id, None).await;
    assert_eq!(response.status(), 201);

    let response = client
        .delete(format!("{}/books/delete/{}", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 409);

    let response = client
        .delete(format!("{}/books/delete/{}?force=true", BASE_URL, book_id))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 204);
}
