use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::ServiceError;
use crate::store::UserStore;
use crate::types::{User, UserInput};

/// User registration. The `registered_objects` counter is only ever moved
/// by the confirmation protocol.
pub struct UserService {
    users: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn create_user(&self, input: UserInput) -> Result<User, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::Invalid("name must not be empty"));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            email: input.email,
            registered_objects: 0,
        };
        self.users.insert_user(user.clone()).await?;
        info!(user_id = %user.id, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.users.get_user(id).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        Ok(self.users.list_users().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryUserStore;

    #[tokio::test]
    async fn test_create_user_starts_at_zero() {
        let service = UserService::new(Arc::new(InMemoryUserStore::new()));
        let user = service
            .create_user(UserInput {
                name: "Ann".to_string(),
                email: "ann@example.com".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(user.registered_objects, 0);
        assert_eq!(service.get_user(&user.id).await.unwrap(), Some(user.clone()));
        assert_eq!(service.list_users().await.unwrap(), vec![user]);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let service = UserService::new(Arc::new(InMemoryUserStore::new()));
        let result = service
            .create_user(UserInput {
                name: " ".to_string(),
                email: "x@example.com".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Invalid(_))));
    }
}
