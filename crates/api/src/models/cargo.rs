//! Shipments and tracking events.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use emporium_core::{CargoId, CargoStatus, OrderId, OrderStatus};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Cargo {
    pub id: CargoId,
    pub order_id: OrderId,
    pub carrier: String,
    pub tracking_number: String,
    pub status: CargoStatus,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub cargo_id: CargoId,
    pub status: CargoStatus,
    pub location: Option<String>,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// A shipment with its events, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct CargoTracking {
    #[serde(flatten)]
    pub cargo: Cargo,
    pub events: Vec<TrackingEvent>,
}

/// Order status implied by a cargo status, if it moves the order.
#[must_use]
pub const fn order_status_for(status: CargoStatus) -> Option<OrderStatus> {
    match status {
        CargoStatus::Delivered => Some(OrderStatus::Delivered),
        _ => None,
    }
}

/// Upper-case prefix from the carrier name, at most four letters.
fn carrier_prefix(carrier: &str) -> String {
    let prefix: String = carrier
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(4)
        .collect::<String>()
        .to_ascii_uppercase();
    if prefix.is_empty() { "CRG".to_string() } else { prefix }
}

/// Carrier prefix followed by ten random digits.
#[must_use]
pub fn generate_tracking_number<R: Rng + ?Sized>(carrier: &str, rng: &mut R) -> String {
    let digits: String = (0..10)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect();
    format!("{}{digits}", carrier_prefix(carrier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_number_format() {
        let number = generate_tracking_number("Ups Express", &mut rand::rng());
        assert!(number.starts_with("UPSE"));
        assert_eq!(number.len(), 14);
        assert!(number[4..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_tracking_number_blank_carrier() {
        let number = generate_tracking_number("  ", &mut rand::rng());
        assert!(number.starts_with("CRG"));
        assert_eq!(number.len(), 13);
    }

    #[test]
    fn test_delivery_moves_order() {
        assert_eq!(order_status_for(CargoStatus::Delivered), Some(OrderStatus::Delivered));
        assert_eq!(order_status_for(CargoStatus::InTransit), None);
    }
}
