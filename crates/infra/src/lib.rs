//! Infrastructure layer: configuration, storage, the order lifecycle reactor
//! and the order service the storefront calls.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod repository;
pub mod service;


pub use config::{ConfigError, OrdersConfig};
pub use error::{OrdersError, OrdersResult, StoreError};
pub use lifecycle::OrderLifecycle;
pub use repository::{
    BillingProfileStore, CartStore, InMemoryBillingProfileStore, InMemoryCartStore,
    InMemoryOrderRepository, InMemoryProductPurchaseRepository, OrderRepository,
    PostgresOrderRepository, PostgresProductPurchaseRepository, ProductPurchaseRepository,
};
pub use service::{ConfiguredOrderService, InMemoryOrderService, OrderService};
