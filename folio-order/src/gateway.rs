use async_trait::async_trait;
use folio_core::payment::{GatewayError, GatewayRequest, GatewayResponse, PaymentGateway};
use folio_shared::Masked;
use folio_store::app_config::PaymentConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct TransactionDetails {
    order_id: String,
    gross_amount: i64,
}

#[derive(Debug, Serialize)]
struct ItemDetails<'a> {
    id: String,
    price: i64,
    quantity: i32,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct TransactionBody<'a> {
    transaction_details: TransactionDetails,
    item_details: Vec<ItemDetails<'a>>,
}

impl<'a> From<&'a GatewayRequest> for TransactionBody<'a> {
    fn from(request: &'a GatewayRequest) -> Self {
        Self {
            transaction_details: TransactionDetails {
                order_id: request.order_id.to_string(),
                gross_amount: request.gross_amount_cents,
            },
            item_details: request
                .items
                .iter()
                .map(|item| ItemDetails {
                    id: item.id.to_string(),
                    price: item.price_cents,
                    quantity: item.quantity,
                    name: &item.name,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TransactionReply {
    token: Option<String>,
    redirect_url: String,
}

/// Hosted-checkout provider reached over HTTPS, authenticated with the
/// merchant server key as the basic-auth user.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    endpoint: String,
    server_key: Masked<String>,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/transactions", config.base_url.trim_end_matches('/')),
            server_key: config.server_key.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_transaction(
        &self,
        request: &GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(self.server_key.expose(), Some(""))
            .json(&TransactionBody::from(request))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(order_id = %request.order_id, %status, "Payment provider declined transaction");
            return Err(GatewayError::Rejected(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(GatewayError::Unavailable(format!("provider returned {}", status)));
        }

        let reply: TransactionReply = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("malformed provider reply: {}", e)))?;

        Ok(GatewayResponse {
            token: reply.token,
            redirect_url: reply.redirect_url,
        })
    }
}

/// In-process gateway. Answers from a script of outcomes, then succeeds.
#[derive(Default)]
pub struct MockPaymentGateway {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<(), GatewayError>>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = Result<(), GatewayError>>) -> Self {
        let gateway = Self::default();
        gateway.push_outcomes(outcomes);
        gateway
    }

    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = Result<(), GatewayError>>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(outcomes);
    }

    /// Number of times the provider was actually invoked
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_transaction(
        &self,
        request: &GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let outcome = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Ok(()));
        outcome?;

        let token = uuid::Uuid::new_v4().simple().to_string();
        Ok(GatewayResponse {
            redirect_url: format!("https://pay.mock.local/checkout/{}", token),
            token: Some(token),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::payment::GatewayLineItem;
    use folio_shared::{ItemId, OrderId};

    fn request() -> GatewayRequest {
        GatewayRequest {
            order_id: OrderId(7),
            gross_amount_cents: 5198,
            items: vec![GatewayLineItem {
                id: ItemId(1),
                name: "Dune".into(),
                price_cents: 2599,
                quantity: 2,
            }],
        }
    }

    #[test]
    fn test_wire_body_shape() {
        let request = request();
        let body = serde_json::to_value(TransactionBody::from(&request)).unwrap();
        assert_eq!(body["transaction_details"]["order_id"], "7");
        assert_eq!(body["transaction_details"]["gross_amount"], 5198);
        assert_eq!(body["item_details"][0]["name"], "Dune");
        assert_eq!(body["item_details"][0]["quantity"], 2);
    }

    #[tokio::test]
    async fn test_mock_follows_script_then_succeeds() {
        let gateway = MockPaymentGateway::with_outcomes([
            Err(GatewayError::Unavailable("down".into())),
            Err(GatewayError::Rejected("card declined".into())),
        ]);

        assert!(matches!(
            gateway.create_transaction(&request()).await,
            Err(GatewayError::Unavailable(_))
        ));
        assert!(matches!(
            gateway.create_transaction(&request()).await,
            Err(GatewayError::Rejected(_))
        ));
        let response = gateway.create_transaction(&request()).await.unwrap();
        assert!(response.redirect_url.ends_with(response.token.as_deref().unwrap()));
        assert_eq!(gateway.calls(), 3);
        assert_eq!(gateway.requests()[0].gross_amount_cents, 5198);
    }
}
