//! Repositories for orders, purchases and the collaborators orders read from.
//!
//! Each trait exposes named operations rather than a query builder. In-memory
//! implementations back tests and dev; Postgres implementations back
//! production for the tables this subsystem owns.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use kart_core::{BillingProfileId, CartId, OrderId, ProductPurchaseId};
use kart_orders::{BillingProfile, Cart, Order, OrderNumber, ProductPurchase, Requester};

use crate::error::{OrdersError, StoreError};

pub use in_memory::{
    InMemoryBillingProfileStore, InMemoryCartStore, InMemoryOrderRepository,
    InMemoryProductPurchaseRepository,
};
pub use postgres::{PostgresOrderRepository, PostgresProductPurchaseRepository};

/// Order persistence.
///
/// Listings are ordered newest first by creation time, then by last update.
pub trait OrderRepository: Send + Sync {
    /// Persist a new order. Fails with `AlreadyExists` if the id is taken.
    fn insert(&self, order: &Order) -> Result<(), StoreError>;

    /// Overwrite an existing order. Fails with `NotFound` if it was never inserted.
    fn update(&self, order: &Order) -> Result<(), StoreError>;

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError>;

    fn number_taken(&self, number: &OrderNumber) -> Result<bool, StoreError>;

    fn list_by_billing_profile(
        &self,
        billing_profile: BillingProfileId,
    ) -> Result<Vec<Order>, StoreError>;

    /// Every order ever built from `cart`, active or not.
    fn list_by_cart(&self, cart: CartId) -> Result<Vec<Order>, StoreError>;

    /// Active orders in `created` status for exactly this profile and cart.
    fn list_open(
        &self,
        billing_profile: BillingProfileId,
        cart: CartId,
    ) -> Result<Vec<Order>, StoreError>;

    /// Orders that have moved past `created`.
    fn list_submitted(&self) -> Result<Vec<Order>, StoreError>;

    /// Deactivate orders on `cart` whose billing profile differs from `owner`.
    ///
    /// Returns how many orders changed.
    fn deactivate_other_owners(
        &self,
        cart: CartId,
        owner: Option<BillingProfileId>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

/// Product purchase persistence.
pub trait ProductPurchaseRepository: Send + Sync {
    fn insert(&self, purchase: &ProductPurchase) -> Result<(), StoreError>;

    fn get(&self, id: ProductPurchaseId) -> Result<Option<ProductPurchase>, StoreError>;

    /// Purchases that have not been refunded.
    fn list_active(&self) -> Result<Vec<ProductPurchase>, StoreError>;

    fn list_active_for_billing_profile(
        &self,
        billing_profile: BillingProfileId,
    ) -> Result<Vec<ProductPurchase>, StoreError>;

    /// Flag a purchase as refunded and return it.
    fn mark_refunded(
        &self,
        id: ProductPurchaseId,
        now: DateTime<Utc>,
    ) -> Result<ProductPurchase, StoreError>;
}

/// Cart storage as seen by orders.
///
/// `save` runs the store's registered observers after writing, so the error
/// type is the orders error rather than a bare storage error.
pub trait CartStore: Send + Sync {
    fn get(&self, id: CartId) -> Result<Option<Cart>, StoreError>;

    /// Write the cart; returns true if it did not exist before.
    fn save(&self, cart: &Cart) -> Result<bool, OrdersError>;
}

/// Billing profile resolution.
pub trait BillingProfileStore: Send + Sync {
    /// Find the requester's profile or make one.
    ///
    /// Users and guests get a stored profile. Anonymous requesters get a
    /// transient profile that is never stored and so owns no orders.
    /// The flag is true when the profile was made by this call.
    fn get_or_new(&self, requester: &Requester) -> Result<(BillingProfile, bool), StoreError>;

    fn get(&self, id: BillingProfileId) -> Result<Option<BillingProfile>, StoreError>;
}

impl<R> OrderRepository for Arc<R>
where
    R: OrderRepository + ?Sized,
{
    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        (**self).insert(order)
    }

    fn update(&self, order: &Order) -> Result<(), StoreError> {
        (**self).update(order)
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).get(id)
    }

    fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        (**self).find_by_number(number)
    }

    fn number_taken(&self, number: &OrderNumber) -> Result<bool, StoreError> {
        (**self).number_taken(number)
    }

    fn list_by_billing_profile(
        &self,
        billing_profile: BillingProfileId,
    ) -> Result<Vec<Order>, StoreError> {
        (**self).list_by_billing_profile(billing_profile)
    }

    fn list_by_cart(&self, cart: CartId) -> Result<Vec<Order>, StoreError> {
        (**self).list_by_cart(cart)
    }

    fn list_open(
        &self,
        billing_profile: BillingProfileId,
        cart: CartId,
    ) -> Result<Vec<Order>, StoreError> {
        (**self).list_open(billing_profile, cart)
    }

    fn list_submitted(&self) -> Result<Vec<Order>, StoreError> {
        (**self).list_submitted()
    }

    fn deactivate_other_owners(
        &self,
        cart: CartId,
        owner: Option<BillingProfileId>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        (**self).deactivate_other_owners(cart, owner, now)
    }
}

impl<R> ProductPurchaseRepository for Arc<R>
where
    R: ProductPurchaseRepository + ?Sized,
{
    fn insert(&self, purchase: &ProductPurchase) -> Result<(), StoreError> {
        (**self).insert(purchase)
    }

    fn get(&self, id: ProductPurchaseId) -> Result<Option<ProductPurchase>, StoreError> {
        (**self).get(id)
    }

    fn list_active(&self) -> Result<Vec<ProductPurchase>, StoreError> {
        (**self).list_active()
    }

    fn list_active_for_billing_profile(
        &self,
        billing_profile: BillingProfileId,
    ) -> Result<Vec<ProductPurchase>, StoreError> {
        (**self).list_active_for_billing_profile(billing_profile)
    }

    fn mark_refunded(
        &self,
        id: ProductPurchaseId,
        now: DateTime<Utc>,
    ) -> Result<ProductPurchase, StoreError> {
        (**self).mark_refunded(id, now)
    }
}

impl<S> CartStore for Arc<S>
where
    S: CartStore + ?Sized,
{
    fn get(&self, id: CartId) -> Result<Option<Cart>, StoreError> {
        (**self).get(id)
    }

    fn save(&self, cart: &Cart) -> Result<bool, OrdersError> {
        (**self).save(cart)
    }
}

impl<S> BillingProfileStore for Arc<S>
where
    S: BillingProfileStore + ?Sized,
{
    fn get_or_new(&self, requester: &Requester) -> Result<(BillingProfile, bool), StoreError> {
        (**self).get_or_new(requester)
    }

    fn get(&self, id: BillingProfileId) -> Result<Option<BillingProfile>, StoreError> {
        (**self).get(id)
    }
}

/// Newest first by creation time, then by last update.
pub(crate) fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| b.updated().cmp(&a.updated()))
    });
}
