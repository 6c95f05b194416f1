//! Status enums for various entities.
//!
//! Each enum maps to a Postgres enum type of the same (snake case) name when
//! the `postgres` feature is enabled. Lifecycle enums expose their transition
//! table through `can_transition_to`.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Implements `as_str` and `Display` from a variant -> wire name table.
macro_rules! wire_names {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// The snake case name used on the wire and in the database.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// User role with different permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// A shopper.
    #[default]
    Customer,
    /// Full access to catalog, order and sweep endpoints.
    Admin,
}

wire_names!(UserRole { Customer => "customer", Admin => "admin" });

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

wire_names!(OrderStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl OrderStatus {
    /// Whether an order may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Cancelled)
                | (Self::Confirmed, Self::Processing | Self::Cancelled)
                | (Self::Processing, Self::Shipped | Self::Cancelled)
                | (Self::Shipped, Self::Delivered)
                | (Self::Delivered, Self::Refunded)
        )
    }

    /// Whether the customer can still cancel the order themselves.
    #[must_use]
    pub const fn is_customer_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// No further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }
}

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    PartiallyRefunded,
    Refunded,
}

wire_names!(PaymentStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    PartiallyRefunded => "partially_refunded",
    Refunded => "refunded",
});

impl PaymentStatus {
    /// Whether money can still be returned on this payment.
    #[must_use]
    pub const fn is_refundable(self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyRefunded)
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CreditCard,
    BankTransfer,
    CashOnDelivery,
}

wire_names!(PaymentMethod {
    CreditCard => "credit_card",
    BankTransfer => "bank_transfer",
    CashOnDelivery => "cash_on_delivery",
});

/// Coupon discount type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "discount_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` percent of the eligible amount.
    Percentage,
    /// `discount_value` off the eligible amount.
    FixedAmount,
    /// Shipping is waived.
    FreeShipping,
}

wire_names!(DiscountType {
    Percentage => "percentage",
    FixedAmount => "fixed_amount",
    FreeShipping => "free_shipping",
});

/// Shipment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "cargo_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CargoStatus {
    #[default]
    Preparing,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    Returned,
}

wire_names!(CargoStatus {
    Preparing => "preparing",
    Shipped => "shipped",
    InTransit => "in_transit",
    OutForDelivery => "out_for_delivery",
    Delivered => "delivered",
    Returned => "returned",
});

impl CargoStatus {
    /// Whether a shipment may move from `self` to `next`.
    ///
    /// Shipments advance one step at a time and may be returned until
    /// delivered.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Delivered | Self::Returned, _) => false,
            (_, Self::Returned) => true,
            (Self::Preparing, Self::Shipped)
            | (Self::Shipped, Self::InTransit)
            | (Self::InTransit, Self::OutForDelivery)
            | (Self::OutForDelivery, Self::Delivered) => true,
            _ => false,
        }
    }
}

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "notification_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderStatus,
    Payment,
    CargoUpdate,
    PriceDrop,
    BackInStock,
    General,
}

wire_names!(NotificationKind {
    OrderStatus => "order_status",
    Payment => "payment",
    CargoUpdate => "cargo_update",
    PriceDrop => "price_drop",
    BackInStock => "back_in_stock",
    General => "general",
});

/// Reason for a stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "movement_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Restock,
    Sale,
    Return,
    Adjustment,
}

wire_names!(MovementType {
    Restock => "restock",
    Sale => "sale",
    Return => "return",
    Adjustment => "adjustment",
});

/// Delivery state of an outgoing email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "email_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

wire_names!(EmailStatus {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALL_ORDER: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    #[test]
    fn test_order_happy_path() {
        let path = [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Refunded,
        ];
        for pair in path.windows(2) {
            if let [from, to] = pair {
                assert!(from.can_transition_to(*to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_order_cannot_skip_or_go_back() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_terminal_order_states_have_no_exits() {
        for from in ALL_ORDER.iter().filter(|s| s.is_terminal()) {
            for to in ALL_ORDER {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_order_never_transitions_to_itself() {
        for s in ALL_ORDER {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn test_customer_cancellable() {
        assert!(OrderStatus::Pending.is_customer_cancellable());
        assert!(OrderStatus::Confirmed.is_customer_cancellable());
        assert!(!OrderStatus::Processing.is_customer_cancellable());
    }

    #[test]
    fn test_cargo_transitions() {
        assert!(CargoStatus::Preparing.can_transition_to(CargoStatus::Shipped));
        assert!(CargoStatus::Shipped.can_transition_to(CargoStatus::InTransit));
        assert!(CargoStatus::InTransit.can_transition_to(CargoStatus::OutForDelivery));
        assert!(CargoStatus::OutForDelivery.can_transition_to(CargoStatus::Delivered));
        assert!(!CargoStatus::Shipped.can_transition_to(CargoStatus::OutForDelivery));
        assert!(!CargoStatus::InTransit.can_transition_to(CargoStatus::InTransit));
        assert!(!CargoStatus::Shipped.can_transition_to(CargoStatus::Preparing));
        assert!(CargoStatus::InTransit.can_transition_to(CargoStatus::Returned));
        assert!(!CargoStatus::Preparing.can_transition_to(CargoStatus::Delivered));
        assert!(!CargoStatus::Delivered.can_transition_to(CargoStatus::Returned));
        assert!(!CargoStatus::Returned.can_transition_to(CargoStatus::Shipped));
    }

    #[test]
    fn test_payment_refundable() {
        assert!(PaymentStatus::Completed.is_refundable());
        assert!(PaymentStatus::PartiallyRefunded.is_refundable());
        assert!(!PaymentStatus::Failed.is_refundable());
        assert!(!PaymentStatus::Refunded.is_refundable());
    }

    #[test]
    fn test_wire_names_match_serde() {
        let json = serde_json::to_string(&CargoStatus::OutForDelivery).unwrap();
        assert_eq!(json, format!("\"{}\"", CargoStatus::OutForDelivery.as_str()));
        let json = serde_json::to_string(&PaymentStatus::PartiallyRefunded).unwrap();
        assert_eq!(json, format!("\"{}\"", PaymentStatus::PartiallyRefunded));
    }

    #[test]
    fn test_user_role_from_str() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!("root".parse::<UserRole>().is_err());
    }
}
