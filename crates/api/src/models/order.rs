//! Orders, their items and totals.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use emporium_core::{OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, UserId, round_money};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
    #[sqlx(flatten)]
    #[serde(rename = "shipping_address")]
    pub shipping: ShippingAddress,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored on the order as `shipping_*` columns.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShippingAddress {
    #[sqlx(rename = "shipping_name")]
    pub name: String,
    #[sqlx(rename = "shipping_phone")]
    pub phone: String,
    #[sqlx(rename = "shipping_line1")]
    pub line1: String,
    #[sqlx(rename = "shipping_line2")]
    #[serde(default)]
    pub line2: Option<String>,
    #[sqlx(rename = "shipping_city")]
    pub city: String,
    #[sqlx(rename = "shipping_postal_code")]
    pub postal_code: String,
    #[sqlx(rename = "shipping_country")]
    pub country: String,
}

impl ShippingAddress {
    /// Trim every field, dropping a blank second line.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            line1: self.line1.trim().to_string(),
            line2: self
                .line2
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            city: self.city.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
            country: self.country.trim().to_string(),
        }
    }

    /// Name of the first required field that is blank.
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("name", &self.name),
            ("phone", &self.phone),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// An order with its items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Shipping pricing: a flat rate waived above a threshold.
#[derive(Debug, Clone, Copy)]
pub struct ShippingRule {
    pub flat_rate: Decimal,
    pub free_threshold: Decimal,
}

impl ShippingRule {
    /// Shipping for a merchandise amount already net of discount.
    #[must_use]
    pub fn cost_for(&self, net_subtotal: Decimal) -> Decimal {
        if net_subtotal >= self.free_threshold {
            Decimal::ZERO
        } else {
            self.flat_rate
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    /// `total = max(subtotal - discount, 0) + shipping`.
    ///
    /// A free-shipping coupon zeroes shipping and contributes no merchandise
    /// discount; its value is reported as `discount`.
    #[must_use]
    pub fn compute(
        subtotal: Decimal,
        discount: Decimal,
        free_shipping_coupon: bool,
        rule: ShippingRule,
    ) -> Self {
        let subtotal = round_money(subtotal);
        let discount = round_money(discount.max(Decimal::ZERO));

        if free_shipping_coupon {
            return Self {
                subtotal,
                discount,
                shipping: Decimal::ZERO,
                total: subtotal,
            };
        }

        let discount = discount.min(subtotal);
        let net = (subtotal - discount).max(Decimal::ZERO);
        let shipping = rule.cost_for(net);
        Self {
            subtotal,
            discount,
            shipping,
            total: round_money(net + shipping),
        }
    }
}

/// `ORD-YYYYMMDD-XXXXXX` with six random upper-case alphanumerics.
#[must_use]
pub fn generate_order_number<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let suffix: String = (0..6)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect();
    format!("ORD-{}-{suffix}", now.format("%Y%m%d"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn rule() -> ShippingRule {
        ShippingRule {
            flat_rate: dec("29.90"),
            free_threshold: dec("500.00"),
        }
    }

    #[test]
    fn test_totals_with_flat_shipping() {
        let t = OrderTotals::compute(dec("100.00"), dec("10.00"), false, rule());
        assert_eq!(t.shipping, dec("29.90"));
        assert_eq!(t.total, dec("119.90"));
    }

    #[test]
    fn test_free_shipping_threshold_after_discount() {
        // 520 - 30 = 490 is below the threshold.
        let t = OrderTotals::compute(dec("520.00"), dec("30.00"), false, rule());
        assert_eq!(t.shipping, dec("29.90"));

        let t = OrderTotals::compute(dec("520.00"), dec("20.00"), false, rule());
        assert_eq!(t.shipping, Decimal::ZERO);
        assert_eq!(t.total, dec("500.00"));
    }

    #[test]
    fn test_free_shipping_coupon() {
        let t = OrderTotals::compute(dec("40.00"), dec("29.90"), true, rule());
        assert_eq!(t.shipping, Decimal::ZERO);
        assert_eq!(t.discount, dec("29.90"));
        assert_eq!(t.total, dec("40.00"));
    }

    #[test]
    fn test_discount_clamped_to_subtotal() {
        let t = OrderTotals::compute(dec("10.00"), dec("50.00"), false, rule());
        assert_eq!(t.discount, dec("10.00"));
        assert_eq!(t.total, dec("29.90"));
    }

    #[test]
    fn test_order_number_format() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let number = generate_order_number(now, &mut rand::rng());
        assert!(number.starts_with("ORD-20260314-"));
        let suffix = &number["ORD-20260314-".len()..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_shipping_address_validation() {
        let address = ShippingAddress {
            name: " Ada ".to_string(),
            phone: "555-0100".to_string(),
            line1: "1 Analytical Way".to_string(),
            line2: Some("   ".to_string()),
            city: "London".to_string(),
            postal_code: " ".to_string(),
            country: "GB".to_string(),
        }
        .normalized();

        assert_eq!(address.name, "Ada");
        assert_eq!(address.line2, None);
        assert_eq!(address.missing_field(), Some("postal_code"));
    }
}
