use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kart_core::{
    BillingProfileId, DomainError, DomainResult, Entity, OrderId, ProductId, ProductPurchaseId,
    UserId,
};

use crate::cart::Cart;
use crate::order::{Order, OrderStatus};

/// Flat persisted form of a [`ProductPurchase`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPurchaseRecord {
    pub id: ProductPurchaseId,
    pub user: Option<UserId>,
    pub billing_profile: BillingProfileId,
    pub product: ProductId,
    pub refunded: bool,
    pub updated: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// One product bought by a billing profile.
///
/// `user` is empty for guest checkouts. Purchases are never deleted; a refund
/// only flips the `refunded` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPurchase {
    id: ProductPurchaseId,
    user: Option<UserId>,
    billing_profile: BillingProfileId,
    product: ProductId,
    refunded: bool,
    updated: DateTime<Utc>,
    timestamp: DateTime<Utc>,
}

impl ProductPurchase {
    pub fn new(
        id: ProductPurchaseId,
        user: Option<UserId>,
        billing_profile: BillingProfileId,
        product: ProductId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user,
            billing_profile,
            product,
            refunded: false,
            updated: now,
            timestamp: now,
        }
    }

    /// Id of the purchase for cart line `index` of `order`.
    ///
    /// Derived (UUIDv5) rather than random, so recording the same payment
    /// again produces the same ids and storage can reject the repeats.
    pub fn line_id(order: OrderId, index: usize) -> ProductPurchaseId {
        let line = (index as u64).to_be_bytes();
        ProductPurchaseId::from_uuid(Uuid::new_v5(order.as_uuid(), &line))
    }

    /// One purchase per product in the cart of a paid order, with ids from
    /// [`ProductPurchase::line_id`].
    pub fn for_paid_order(
        order: &Order,
        cart: &Cart,
        user: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<ProductPurchase>> {
        if order.status() != OrderStatus::Paid {
            return Err(DomainError::invariant(format!(
                "purchases are recorded for paid orders, order {} is {}",
                order.id_typed(),
                order.status()
            )));
        }
        if cart.id_typed() != order.cart() {
            return Err(DomainError::invariant("cart does not belong to order"));
        }
        let billing_profile = order
            .billing_profile()
            .ok_or_else(|| DomainError::invariant("paid order has no billing profile"))?;

        Ok(cart
            .products()
            .iter()
            .enumerate()
            .map(|(index, product)| {
                let id = Self::line_id(order.id_typed(), index);
                ProductPurchase::new(id, user, billing_profile, *product, now)
            })
            .collect())
    }

    pub fn from_record(record: ProductPurchaseRecord) -> Self {
        Self {
            id: record.id,
            user: record.user,
            billing_profile: record.billing_profile,
            product: record.product,
            refunded: record.refunded,
            updated: record.updated,
            timestamp: record.timestamp,
        }
    }

    pub fn to_record(&self) -> ProductPurchaseRecord {
        ProductPurchaseRecord {
            id: self.id,
            user: self.user,
            billing_profile: self.billing_profile,
            product: self.product,
            refunded: self.refunded,
            updated: self.updated,
            timestamp: self.timestamp,
        }
    }

    pub fn id_typed(&self) -> ProductPurchaseId {
        self.id
    }

    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    pub fn billing_profile(&self) -> BillingProfileId {
        self.billing_profile
    }

    pub fn product(&self) -> ProductId {
        self.product
    }

    pub fn is_refunded(&self) -> bool {
        self.refunded
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn refund(&mut self, now: DateTime<Utc>) {
        if !self.refunded {
            self.refunded = true;
            self.updated = now;
        }
    }
}

impl Entity for ProductPurchase {
    type Id = ProductPurchaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
