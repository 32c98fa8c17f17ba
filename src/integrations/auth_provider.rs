//! Authentication provider
//!
//! Customer logins live in a hosted GoTrue-compatible auth service. The
//! back office only creates users (with a temporary password) when an
//! application is approved, and removes them when a user is deleted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{check_status, http_client, IntegrationError};

const SERVICE: &str = "auth provider";

/// User to create in the auth provider
#[derive(Debug, Clone)]
pub struct NewAuthUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create a confirmed user; returns the provider's user id
    async fn create_user(&self, user: &NewAuthUser) -> Result<Uuid, IntegrationError>;

    /// Delete a user; deleting an unknown user succeeds
    async fn delete_user(&self, user_id: Uuid) -> Result<(), IntegrationError>;
}

#[derive(Serialize)]
struct CreateUserBody<'a> {
    email: &'a str,
    password: &'a str,
    email_confirm: bool,
    user_metadata: UserMetadata<'a>,
}

#[derive(Serialize)]
struct UserMetadata<'a> {
    first_name: &'a str,
    last_name: &'a str,
}

#[derive(Deserialize)]
struct CreatedUser {
    id: Uuid,
}

/// Admin API client for the hosted auth service
#[derive(Clone)]
pub struct SupabaseAuthClient {
    client: Client,
    project_url: String,
    service_role_key: String,
}

impl SupabaseAuthClient {
    pub fn new(project_url: &str, service_role_key: &str, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            project_url: project_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        }
    }

    fn users_url(&self) -> String {
        format!("{}/auth/v1/admin/users", self.project_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthClient {
    async fn create_user(&self, user: &NewAuthUser) -> Result<Uuid, IntegrationError> {
        let body = CreateUserBody {
            email: &user.email,
            password: &user.password,
            email_confirm: true,
            user_metadata: UserMetadata {
                first_name: &user.first_name,
                last_name: &user.last_name,
            },
        };

        let response = self
            .authorized(self.client.post(self.users_url()))
            .json(&body)
            .send()
            .await
            .map_err(|source| IntegrationError::Transport {
                service: SERVICE,
                source,
            })?;

        let created: CreatedUser = check_status(SERVICE, response, false)
            .await?
            .json()
            .await
            .map_err(|e| IntegrationError::Decode {
                service: SERVICE,
                message: e.to_string(),
            })?;

        tracing::info!(auth_user_id = %created.id, "Auth user created");
        Ok(created.id)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), IntegrationError> {
        let response = self
            .authorized(self.client.delete(format!("{}/{}", self.users_url(), user_id)))
            .send()
            .await
            .map_err(|source| IntegrationError::Transport {
                service: SERVICE,
                source,
            })?;

        check_status(SERVICE, response, true).await?;
        tracing::info!(auth_user_id = %user_id, "Auth user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn new_user() -> NewAuthUser {
        NewAuthUser {
            email: "ada@example.com".to_string(),
            password: "Tmp#Pass2345".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_user_posts_admin_request() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .and(body_partial_json(json!({
                "email": "ada@example.com",
                "email_confirm": true,
                "user_metadata": { "first_name": "Ada" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": user_id,
                "email": "ada@example.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = SupabaseAuthClient::new(&server.uri(), "service-key", Duration::from_secs(5));
        assert_eq!(client.create_user(&new_user()).await.unwrap(), user_id);
    }

    #[tokio::test]
    async fn test_create_user_surfaces_provider_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("email already registered"),
            )
            .mount(&server)
            .await;

        let client = SupabaseAuthClient::new(&server.uri(), "service-key", Duration::from_secs(5));
        let err = client.create_user(&new_user()).await.unwrap_err();

        match err {
            IntegrationError::Status { status, body, .. } => {
                assert_eq!(status, 422);
                assert!(body.contains("already registered"));
            }
            other => panic!("Expected Status error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_missing_user_is_ok() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();

        Mock::given(method("DELETE"))
            .and(path(format!("/auth/v1/admin/users/{}", user_id)))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        // Trailing slash on the base URL must not double up
        let base = format!("{}/", server.uri());
        let client = SupabaseAuthClient::new(&base, "service-key", Duration::from_secs(5));
        assert!(client.delete_user(user_id).await.is_ok());
    }
}
