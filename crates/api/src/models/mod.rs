//! Domain models.
//!
//! Entity structs map one-to-one onto table rows (`sqlx::FromRow`). Business
//! rules that only need loaded rows (coupon validation, wishlist change
//! detection, totals, stock arithmetic) live here as pure functions so the
//! services stay a thin sequence of reads and writes.

pub mod cargo;
pub mod cart;
pub mod category;
pub mod coupon;
pub mod email;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod payment;
pub mod product;
pub mod review;
pub mod slug;
pub mod user;
pub mod wishlist;

pub use cargo::{Cargo, TrackingEvent};
pub use cart::{Cart, CartLine, CartView};
pub use category::{Category, CategoryNode};
pub use coupon::{Coupon, CouponCheck, CouponLine, CouponRejection};
pub use email::EmailLog;
pub use inventory::InventoryMovement;
pub use notification::{NewNotification, Notification};
pub use order::{Order, OrderItem, OrderTotals, ShippingAddress};
pub use payment::Payment;
pub use product::{Product, ProductView, RatingSummary};
pub use review::Review;
pub use user::{User, UserProfile};
pub use wishlist::{WishlistChange, WishlistItemSnapshot};
