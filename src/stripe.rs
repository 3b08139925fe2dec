use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

const API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment provider error: {0}")]
    Api(String),
}

/// Reconciliation tags carried on every intent. Confirmation reads the listing
/// id back from here, never from the request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntentMetadata {
    #[serde(rename = "listingId", default)]
    pub listing_id: String,
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(rename = "listingName", default)]
    pub listing_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
    #[serde(default)]
    pub metadata: IntentMetadata,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

#[derive(Debug, Deserialize)]
struct Customer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Refund {
    id: String,
}

/// External payment processor, injected as a capability. `None` at the
/// call sites means payments were not configured at process start.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(&self, email: &str, name: &str) -> Result<String, PaymentError>;

    async fn create_payment_intent(
        &self,
        amount_cents: i64,
        customer_id: &str,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, PaymentError>;

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;

    /// Refunds the full charge behind the intent, returning the refund id.
    async fn create_refund(&self, intent_id: &str) -> Result<String, PaymentError>;
}

/// Stripe's REST API: form-encoded requests, JSON responses, secret key as
/// basic-auth username.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Self {
        StripeClient {
            http: reqwest::Client::new(),
            secret_key: secret_key.into(),
        }
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, PaymentError> {
        if resp.status().is_success() {
            return Ok(resp.json().await?);
        }
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        let message = body["error"]["message"].as_str().unwrap_or("unknown error");
        Err(PaymentError::Api(format!("{}: {}", status, message)))
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, PaymentError> {
        let resp = self
            .http
            .post(format!("{}{}", API_BASE, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await?;
        Self::parse(resp).await
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_customer(&self, email: &str, name: &str) -> Result<String, PaymentError> {
        let customer: Customer = self
            .post_form(
                "/customers",
                &[("email", email.to_string()), ("name", name.to_string())],
            )
            .await?;
        Ok(customer.id)
    }

    async fn create_payment_intent(
        &self,
        amount_cents: i64,
        customer_id: &str,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, PaymentError> {
        self.post_form(
            "/payment_intents",
            &[
                ("amount", amount_cents.to_string()),
                ("currency", "usd".to_string()),
                ("customer", customer_id.to_string()),
                ("metadata[listingId]", metadata.listing_id),
                ("metadata[userId]", metadata.user_id),
                ("metadata[listingName]", metadata.listing_name),
            ],
        )
        .await
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let resp = self
            .http
            .get(format!("{}/payment_intents/{}", API_BASE, intent_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;
        Self::parse(resp).await
    }

    async fn create_refund(&self, intent_id: &str) -> Result<String, PaymentError> {
        let refund: Refund = self
            .post_form("/refunds", &[("payment_intent", intent_id.to_string())])
            .await?;
        Ok(refund.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_deserializes_with_metadata() {
        let intent: PaymentIntent = serde_json::from_str(
            r#"{
                "id": "pi_123",
                "client_secret": "pi_123_secret_abc",
                "status": "succeeded",
                "metadata": {"listingId": "l1", "userId": "u2", "listingName": "Cottage"}
            }"#,
        )
        .unwrap();
        assert!(intent.is_succeeded());
        assert_eq!(intent.metadata.listing_id, "l1");
        assert_eq!(intent.metadata.user_id, "u2");
    }

    #[test]
    fn intent_tolerates_missing_metadata() {
        let intent: PaymentIntent = serde_json::from_str(
            r#"{"id": "pi_123", "client_secret": null, "status": "requires_payment_method"}"#,
        )
        .unwrap();
        assert!(!intent.is_succeeded());
        assert!(intent.metadata.listing_id.is_empty());
    }
}
