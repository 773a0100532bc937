//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{RegisterUser, Role, UpdateUser, User, UserClaims},
    repository::Repository,
};

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Register a new user and return them with a signed token.
    /// Only an admin caller may assign a role other than "user".
    pub async fn register(
        &self,
        request: RegisterUser,
        caller: Option<&UserClaims>,
    ) -> AppResult<(String, User)> {
        if self
            .repository
            .users
            .username_exists(&request.username, None)
            .await?
            || self.repository.users.email_exists(&request.email, None).await?
        {
            return Err(AppError::Conflict(
                "User already exists with this email or username".to_string(),
            ));
        }

        // The very first account becomes the bootstrap admin; after that only
        // an admin caller may assign roles
        let role = match caller {
            Some(claims) if claims.is_admin() => request.role.unwrap_or(Role::User),
            _ if self.repository.users.count().await? == 0 => Role::Admin,
            _ => Role::User,
        };

        let password_hash = self.hash_password(&request.password)?;

        let user = self
            .repository
            .users
            .create(&request.username, &request.email, &password_hash, role)
            .await?;

        tracing::info!("Registered user {} (id={})", user.username, user.id);

        let token = self.issue_token(&user)?;
        Ok((token, user))
    }

    /// Authenticate by username or email and return a signed token.
    /// The error message does not reveal whether the user exists.
    pub async fn login(&self, login: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_login(login)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !self.verify_password(&user.password, password) {
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }

        let token = self.issue_token(&user)?;
        Ok((token, user))
    }

    /// Get a user by ID (used for profiles and existence checks)
    pub async fn get_user(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// List all users
    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.repository.users.list().await
    }

    /// Update a user. Role changes require an admin caller; username/email
    /// uniqueness is re-checked against other users.
    pub async fn update_user(
        &self,
        id: i32,
        request: UpdateUser,
        caller: &UserClaims,
    ) -> AppResult<User> {
        if request.role.is_some() && !caller.is_admin() {
            return Err(AppError::Authorization(
                "Only administrators may change roles".to_string(),
            ));
        }

        if let Some(ref username) = request.username {
            if self.repository.users.username_exists(username, Some(id)).await? {
                return Err(AppError::Conflict(
                    "Username already in use by another user".to_string(),
                ));
            }
        }
        if let Some(ref email) = request.email {
            if self.repository.users.email_exists(email, Some(id)).await? {
                return Err(AppError::Conflict(
                    "Email already in use by another user".to_string(),
                ));
            }
        }

        let password_hash = match request.password {
            Some(ref password) => Some(self.hash_password(password)?),
            None => None,
        };

        self.repository
            .users
            .update(
                id,
                request.username.as_deref(),
                request.email.as_deref(),
                password_hash.as_deref(),
                request.role,
            )
            .await
    }

    /// Delete a user. Refused while the user has borrowed loans unless forced.
    pub async fn delete_user(&self, id: i32, force: bool) -> AppResult<()> {
        self.repository.users.get_by_id(id).await?;

        if !force && self.repository.loans.user_has_active(id).await? {
            return Err(AppError::Conflict(
                "User has active loans; pass force=true to delete anyway".to_string(),
            ));
        }

        self.repository.users.delete(id).await
    }

    /// Create a JWT for the given user
    pub fn issue_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    }

    fn verify_password(&self, hash: &str, password: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}
