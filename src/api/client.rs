use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::AppError;
use crate::models::order::Order;

const PENDING_ORDERS_PATH: &str = "/api/orders/me/pending";

/// Consumer of the delivery backend's REST API.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn pending_orders_url(&self) -> String {
        format!("{}{}", self.base_url, PENDING_ORDERS_PATH)
    }

    /// Orders of the signed-in user that are still in flight.
    pub async fn pending_orders(&self) -> Result<Vec<Order>, AppError> {
        let mut request = self.client.get(self.pending_orders_url());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let orders: Vec<Order> = request.send().await?.error_for_status()?.json().await?;
        debug!(count = orders.len(), "fetched pending orders");
        Ok(orders)
    }

    pub async fn find_order(&self, order_id: &str) -> Result<Order, AppError> {
        self.pending_orders()
            .await?
            .into_iter()
            .find(|order| order.id == order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::BackendClient;

    #[test]
    fn pending_orders_url_joins_cleanly() {
        let client =
            BackendClient::new("https://backend.example/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.pending_orders_url(),
            "https://backend.example/api/orders/me/pending"
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_upstream_error() {
        let client =
            BackendClient::new("http://127.0.0.1:9", None, Duration::from_millis(500)).unwrap();
        let err = client.pending_orders().await.unwrap_err();
        assert!(matches!(err, crate::error::AppError::Upstream(_)));
    }
}
