use delivery_http::{DeliveryClient, DeliveryRequest, OrderItem};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client = DeliveryClient::from_env()?;

    match client.health_probe().await {
        Ok(health) => tracing::info!(status = %health.status, "delivery service reachable"),
        Err(err) => tracing::warn!(category = %err.category(), "delivery service degraded: {err}"),
    }

    let order = DeliveryRequest::new(
        "ORD-DEMO0001",
        "Jane Doe",
        vec![
            OrderItem::new("PROD-001", 2, 29.99),
            OrderItem::new("PROD-002", 1, 5.50),
        ],
        None,
        "123 Main St, Anytown, ST 12345",
    );

    match client.submit_order(&order).await.and_then(|r| r.into_accepted()) {
        Ok(response) => println!("accepted {} at {}", response.order_id, response.processed_at),
        Err(err) => {
            let message = err
                .downstream_message()
                .unwrap_or_else(|| err.to_string());
            println!("failed with {}: {message}", err.boundary_status());
        }
    }

    Ok(())
}
