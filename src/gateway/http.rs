//! HTTP gateway client
//!
//! Speaks a Paystack-style REST API: bearer secret key, JSON bodies and a
//! `{status, message, data}` envelope on every response.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{
    ChargeVerification, CheckoutSession, GatewayError, InitializeTransaction, PaymentGateway,
    RecipientRequest, TransferRequest, TransferResult,
};
use crate::config::GatewayConfig;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RecipientData {
    recipient_code: String,
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl HttpGateway {
    /// Build a client with the configured timeout
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpGateway {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;
        debug!(status = status.as_u16(), "gateway response");

        if !status.is_success() {
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .map(|envelope| envelope.message)
                .unwrap_or(body);
            return Err(GatewayError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        if !envelope.status {
            return Err(GatewayError::Rejected(envelope.message));
        }
        envelope
            .data
            .ok_or_else(|| GatewayError::MalformedResponse("response has no data".to_string()))
    }
}

fn classify_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout
    } else if error.is_decode() {
        GatewayError::MalformedResponse(error.to_string())
    } else {
        GatewayError::Transport(error.to_string())
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn initialize_transaction(&self, request: InitializeTransaction) -> Result<CheckoutSession, GatewayError> {
        self.send(self.client.post(self.url("/transaction/initialize")).json(&request))
            .await
    }

    async fn verify_transaction(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        self.send(self.client.get(self.url(&format!("/transaction/verify/{}", reference))))
            .await
    }

    async fn create_transfer_recipient(&self, request: RecipientRequest) -> Result<String, GatewayError> {
        let data: RecipientData = self
            .send(self.client.post(self.url("/transferrecipient")).json(&request))
            .await?;
        Ok(data.recipient_code)
    }

    async fn initiate_transfer(&self, request: TransferRequest) -> Result<TransferResult, GatewayError> {
        self.send(self.client.post(self.url("/transfer")).json(&request))
            .await
    }

    async fn verify_transfer(&self, reference: &str) -> Result<TransferResult, GatewayError> {
        self.send(self.client.get(self.url(&format!("/transfer/verify/{}", reference))))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::TransferStatus;

    #[test]
    fn test_envelope_parses_transfer() {
        let body = r#"{"status":true,"message":"Transfer has been queued","data":{"reference":"abc","transfer_code":"TRF_1","status":"otp","amount":43000}}"#;
        let envelope: Envelope<TransferResult> = serde_json::from_str(body).unwrap();
        assert!(envelope.status);
        let data = envelope.data.unwrap();
        assert_eq!(data.status, TransferStatus::Otp);
        assert_eq!(data.transfer_code.as_deref(), Some("TRF_1"));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let gateway = HttpGateway::new(&GatewayConfig {
            base_url: "https://gateway.test/".to_string(),
            ..GatewayConfig::default()
        })
        .unwrap();
        assert_eq!(gateway.url("/transfer"), "https://gateway.test/transfer");
    }
}
