//! Storefront orders domain module.
//!
//! This crate contains business rules for orders and product purchases,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).
//! Carts and billing profiles are owned elsewhere; only the parts of them that
//! order rules read are modelled here.

pub mod billing;
pub mod cart;
pub mod lifecycle;
pub mod order;
pub mod order_number;
pub mod purchase;

pub use billing::{BillingProfile, Requester};
pub use cart::Cart;
pub use lifecycle::{CartSaved, OrderSaved};
pub use order::{DEFAULT_SHIPPING_TOTAL_MINOR, Order, OrderRecord, OrderStatus, exclude_unsubmitted};
pub use order_number::{OrderNumber, OrderNumberGenerator};
pub use purchase::{ProductPurchase, ProductPurchaseRecord};
