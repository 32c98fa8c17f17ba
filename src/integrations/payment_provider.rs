//! Payment provider
//!
//! Each approved customer gets a customer record at the payment provider.
//! The integration is optional; without an API key it is skipped.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use super::{check_status, http_client, IntegrationError};

const SERVICE: &str = "payment provider";

/// Customer to register with the payment provider
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a customer; returns the provider's customer id
    async fn create_customer(&self, customer: &NewCustomer) -> Result<String, IntegrationError>;

    /// Delete a customer; deleting an unknown customer succeeds
    async fn delete_customer(&self, customer_id: &str) -> Result<(), IntegrationError>;
}

#[derive(Deserialize)]
struct CustomerResponse {
    id: String,
}

/// Stripe-style REST client (form-encoded bodies, bearer secret key)
#[derive(Clone)]
pub struct StripePaymentClient {
    client: Client,
    api_url: String,
    secret_key: String,
}

impl StripePaymentClient {
    pub fn new(api_url: &str, secret_key: &str, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentClient {
    async fn create_customer(&self, customer: &NewCustomer) -> Result<String, IntegrationError> {
        let user_id = customer.user_id.to_string();
        let form = [
            ("email", customer.email.as_str()),
            ("name", customer.name.as_str()),
            ("metadata[user_id]", user_id.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/customers", self.api_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|source| IntegrationError::Transport {
                service: SERVICE,
                source,
            })?;

        let created: CustomerResponse = check_status(SERVICE, response, false)
            .await?
            .json()
            .await
            .map_err(|e| IntegrationError::Decode {
                service: SERVICE,
                message: e.to_string(),
            })?;

        tracing::info!(
            user_id = %customer.user_id,
            customer_id = %created.id,
            "Payment customer created"
        );
        Ok(created.id)
    }

    async fn delete_customer(&self, customer_id: &str) -> Result<(), IntegrationError> {
        let response = self
            .client
            .delete(format!("{}/v1/customers/{}", self.api_url, customer_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|source| IntegrationError::Transport {
                service: SERVICE,
                source,
            })?;

        check_status(SERVICE, response, true).await?;
        tracing::info!(customer_id, "Payment customer deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_customer_form_encoded() {
        let server = MockServer::start().await;
        let user_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/v1/customers"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("email=ada%40example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cus_123",
                "object": "customer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripePaymentClient::new(&server.uri(), "sk_test_123", Duration::from_secs(5));
        let customer = NewCustomer {
            user_id,
            email: "ada@example.com".to_string(),
            name: "Ada Lovelace".to_string(),
        };

        assert_eq!(client.create_customer(&customer).await.unwrap(), "cus_123");
    }

    #[tokio::test]
    async fn test_undecodable_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = StripePaymentClient::new(&server.uri(), "sk_test_123", Duration::from_secs(5));
        let customer = NewCustomer {
            user_id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            name: "Ada Lovelace".to_string(),
        };

        let err = client.create_customer(&customer).await.unwrap_err();
        assert!(matches!(err, IntegrationError::Decode { .. }));
        assert_eq!(err.service(), "payment provider");
    }

    #[tokio::test]
    async fn test_delete_customer_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v1/customers/cus_123"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = StripePaymentClient::new(&server.uri(), "sk_test_123", Duration::from_secs(5));
        let err = client.delete_customer("cus_123").await.unwrap_err();
        assert!(matches!(err, IntegrationError::Status { status: 500, .. }));
    }
}
