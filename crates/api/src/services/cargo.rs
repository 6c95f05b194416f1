//! Shipments and tracking.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use emporium_core::{CargoId, CargoStatus, NotificationKind, OrderId, OrderStatus, UserId};

use crate::db::{RepositoryError, UnitOfWork, cargo, orders, users};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::cargo::{CargoTracking, generate_tracking_number, order_status_for};
use crate::models::{Cargo, NewNotification, Order, TrackingEvent};
use crate::services::notification::notify_quietly;
use crate::services::order::{announce_status_change, invalid_transition};
use crate::state::AppState;

const MAX_CARRIER_CHARS: usize = 100;

/// Fresh tracking numbers tried before giving up on a clash.
const TRACKING_NUMBER_ATTEMPTS: usize = 5;

/// Body of `POST /api/admin/cargo`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateShipment {
    pub order_id: OrderId,
    pub carrier: String,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

/// Body of `POST /api/admin/cargo/{id}/events`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTrackingEvent {
    pub status: CargoStatus,
    pub location: Option<String>,
    pub description: String,
}

fn validate_carrier(carrier: &str) -> Result<&str> {
    let carrier = carrier.trim();
    if carrier.is_empty() {
        return Err(AppError::validation("carrier is required"));
    }
    if carrier.chars().count() > MAX_CARRIER_CHARS {
        return Err(AppError::validation(format!(
            "carrier must be at most {MAX_CARRIER_CHARS} characters"
        )));
    }
    Ok(carrier)
}

fn invalid_cargo_transition(from: CargoStatus, to: CargoStatus) -> AppError {
    AppError::conflict(
        "INVALID_STATUS_TRANSITION",
        format!("cannot move a shipment from {from} to {to}"),
    )
}

fn shipment_exists() -> AppError {
    AppError::conflict("SHIPMENT_EXISTS", "this order already has a shipment")
}

pub struct CargoService<'a> {
    state: &'a AppState,
}

impl<'a> CargoService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Ship a processing order.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_STATUS_TRANSITION` unless the order is processing and
    /// `SHIPMENT_EXISTS` for a second shipment.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_shipment(&self, request: &CreateShipment) -> Result<CargoTracking> {
        let carrier = validate_carrier(&request.carrier)?;

        let mut uow = UnitOfWork::begin(self.state.pool()).await?;
        let order = orders::lock(uow.conn(), request.order_id)
            .await?
            .ok_or_else(|| AppError::not_found("order not found"))?;
        if order.status != OrderStatus::Processing {
            return Err(invalid_transition(order.status, OrderStatus::Shipped));
        }
        if cargo::exists_for_order(uow.conn(), order.id).await? {
            return Err(shipment_exists());
        }

        let mut created = None;
        for _ in 0..TRACKING_NUMBER_ATTEMPTS {
            let tracking_number = generate_tracking_number(carrier, &mut rand::rng());
            created = cargo::create(
                uow.conn(),
                order.id,
                carrier,
                &tracking_number,
                request.estimated_delivery,
            )
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => shipment_exists(),
                other => other.into(),
            })?;
            if created.is_some() {
                break;
            }
            tracing::debug!(%tracking_number, "Tracking number taken, regenerating");
        }
        let shipment = created.ok_or_else(|| {
            AppError::Internal("could not allocate a unique tracking number".to_string())
        })?;
        let tracking_number = shipment.tracking_number.clone();
        let event = cargo::add_event(
            uow.conn(),
            shipment.id,
            CargoStatus::Shipped,
            None,
            &format!("Handed over to {carrier}"),
        )
        .await?;
        let shipped = orders::set_status(uow.conn(), order.id, OrderStatus::Shipped).await?;
        uow.commit().await?;

        tracing::info!(cargo_id = %shipment.id, %tracking_number, "Shipment created");
        add_breadcrumb(
            "cargo",
            "Shipment created",
            Some(&[("tracking_number", tracking_number.as_str())]),
        );

        self.announce_event(&shipped, &shipment, &event).await;
        announce_status_change(self.state, &shipped, order.status).await;
        Ok(CargoTracking {
            cargo: shipment,
            events: vec![event],
        })
    }

    /// Append a tracking event, advancing the shipment.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_STATUS_TRANSITION` for a move the shipment lifecycle
    /// forbids.
    #[instrument(skip(self, request), fields(status = %request.status))]
    pub async fn add_tracking_event(
        &self,
        cargo_id: CargoId,
        request: &NewTrackingEvent,
    ) -> Result<CargoTracking> {
        let description = request.description.trim();
        if description.is_empty() {
            return Err(AppError::validation("description is required"));
        }
        let location = request
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        let mut uow = UnitOfWork::begin(self.state.pool()).await?;
        let current = cargo::lock(uow.conn(), cargo_id)
            .await?
            .ok_or_else(|| AppError::not_found("shipment not found"))?;
        if !current.status.can_transition_to(request.status) {
            return Err(invalid_cargo_transition(current.status, request.status));
        }

        let updated = cargo::set_status(uow.conn(), cargo_id, request.status).await?;
        let event =
            cargo::add_event(uow.conn(), cargo_id, request.status, location, description).await?;

        let order = orders::lock(uow.conn(), updated.order_id)
            .await?
            .ok_or_else(|| AppError::not_found("order not found"))?;
        let mut moved = None;
        if let Some(next) = order_status_for(request.status)
            && order.status.can_transition_to(next)
        {
            moved = Some(orders::set_status(uow.conn(), order.id, next).await?);
        }
        let events = cargo::events(uow.conn(), cargo_id).await?;
        uow.commit().await?;

        tracing::info!(%cargo_id, from = %current.status, to = %request.status, "Tracking event added");
        self.announce_event(&order, &updated, &event).await;
        if let Some(moved) = &moved {
            announce_status_change(self.state, moved, order.status).await;
        }
        Ok(CargoTracking {
            cargo: updated,
            events,
        })
    }

    /// Public lookup by tracking number.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown tracking number.
    pub async fn track(&self, tracking_number: &str) -> Result<CargoTracking> {
        let pool = self.state.pool();
        let shipment = cargo::get_by_tracking_number(pool, tracking_number.trim())
            .await?
            .ok_or_else(|| AppError::not_found("shipment not found"))?;
        let events = cargo::events(pool, shipment.id).await?;
        Ok(CargoTracking {
            cargo: shipment,
            events,
        })
    }

    /// `owner` restricts the lookup to that user's orders; `None` for admins.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown or foreign order, or one
    /// that has not shipped.
    pub async fn get_for_order(&self, order_id: OrderId, owner: Option<UserId>) -> Result<CargoTracking> {
        let pool = self.state.pool();
        orders::get(pool, order_id)
            .await?
            .filter(|o| owner.is_none_or(|user_id| o.user_id == user_id))
            .ok_or_else(|| AppError::not_found("order not found"))?;
        let shipment = cargo::get_for_order(pool, order_id)
            .await?
            .ok_or_else(|| AppError::not_found("shipment not found"))?;
        let events = cargo::events(pool, shipment.id).await?;
        Ok(CargoTracking {
            cargo: shipment,
            events,
        })
    }

    /// Notify and email the order owner about a tracking event. Never fails.
    async fn announce_event(&self, order: &Order, shipment: &Cargo, event: &TrackingEvent) {
        let pool = self.state.pool();
        notify_quietly(
            pool,
            &NewNotification::new(
                order.user_id,
                NotificationKind::CargoUpdate,
                format!("Shipment {} {}", shipment.tracking_number, event.status),
                event.description.clone(),
            )
            .with_reference(order.id),
        )
        .await;

        match users::get_by_id(pool, order.user_id).await {
            Ok(Some(user)) => {
                if let Err(e) = self
                    .state
                    .email()
                    .send_shipment_update(pool, &user, &order.order_number, shipment, event)
                    .await
                {
                    tracing::warn!(cargo_id = %shipment.id, error = %e, "Failed to send shipment email");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(order_id = %order.id, error = %e, "Failed to load order owner"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_carrier() {
        assert_eq!(validate_carrier("  DHL ").ok(), Some("DHL"));
        assert!(validate_carrier("   ").is_err());
        assert!(validate_carrier(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_transition_errors_share_code() {
        let err = invalid_cargo_transition(CargoStatus::Delivered, CargoStatus::InTransit);
        assert_eq!(err.code(), "INVALID_STATUS_TRANSITION");
        assert_eq!(shipment_exists().code(), "SHIPMENT_EXISTS");
    }

    #[test]
    fn test_event_body_allows_missing_location() {
        let parsed: NewTrackingEvent = serde_json::from_value(serde_json::json!({
            "status": "in_transit",
            "description": "Departed hub",
        }))
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(parsed.status, CargoStatus::InTransit);
        assert_eq!(parsed.location, None);
    }
}
