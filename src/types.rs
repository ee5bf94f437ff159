use serde::{Deserialize, Serialize};

use crate::{DeliveryError, Result};

/// One line of an order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    pub price: f64,
}

impl OrderItem {
    pub fn new(product_id: impl Into<String>, quantity: u32, price: f64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }
}

/// Payload of `POST /api/delivery`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub order_id: String,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub shipping_address: String,
    /// ISO-8601 creation time.
    pub timestamp: String,
}

impl DeliveryRequest {
    /// Builds a request stamped with the current time.
    ///
    /// When `total_amount` is `None` it is computed from the items.
    pub fn new(
        order_id: impl Into<String>,
        customer_name: impl Into<String>,
        items: Vec<OrderItem>,
        total_amount: Option<f64>,
        shipping_address: impl Into<String>,
    ) -> Self {
        let total_amount = total_amount.unwrap_or_else(|| items_total(&items));
        Self {
            order_id: order_id.into(),
            customer_name: customer_name.into(),
            items,
            total_amount,
            shipping_address: shipping_address.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Sum of `price * quantity`, rounded to cents.
pub fn items_total(items: &[OrderItem]) -> f64 {
    let total: f64 = items
        .iter()
        .map(|item| item.price * f64::from(item.quantity))
        .sum();
    (total * 100.0).round() / 100.0
}

/// Body returned by `POST /api/delivery`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub order_id: String,
    #[serde(default)]
    pub processed_at: String,
}

impl DeliveryResponse {
    /// Turns `success: false` into [`DeliveryError::Rejected`].
    pub fn into_accepted(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(DeliveryError::Rejected {
                order_id: self.order_id,
                message: self.message,
            })
        }
    }
}

/// Body returned by `GET /api/delivery/health`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub database: Option<DatabaseHealth>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseHealth {
    pub status: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}
