//! User lookup and token authentication.

use gradebook_common::{AppError, AppResult};
use gradebook_db::entities::user;
use gradebook_db::repositories::UserRepository;

/// User service.
#[derive(Clone)]
pub struct UserService {
    repo: UserRepository,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub const fn new(repo: UserRepository) -> Self {
        Self { repo }
    }

    /// Authenticate a bearer token against active users.
    pub async fn authenticate_by_token(&self, token: &str) -> AppResult<user::Model> {
        self.repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: &str) -> AppResult<user::Model> {
        self.repo.get_by_id(id).await
    }
}
