use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kart_core::{CartId, Entity, Money, ProductId};

/// Read view of a shopping cart.
///
/// Line items and pricing are computed by the cart module; orders only read
/// the resulting total, the products and whether everything is digital.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    products: Vec<ProductId>,
    total: Money,
    is_digital: bool,
    updated: DateTime<Utc>,
}

impl Cart {
    /// An empty physical-goods cart.
    pub fn new(id: CartId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            products: Vec::new(),
            total: Money::zero(),
            is_digital: false,
            updated: now,
        }
    }

    pub fn with_products(mut self, products: Vec<ProductId>) -> Self {
        self.products = products;
        self
    }

    pub fn with_total(mut self, total: Money) -> Self {
        self.total = total;
        self
    }

    pub fn with_digital(mut self, is_digital: bool) -> Self {
        self.is_digital = is_digital;
        self
    }

    pub fn id_typed(&self) -> CartId {
        self.id
    }

    pub fn products(&self) -> &[ProductId] {
        &self.products
    }

    pub fn total(&self) -> Money {
        self.total
    }

    /// True when nothing in the cart needs to be shipped.
    pub fn is_digital(&self) -> bool {
        self.is_digital
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    pub fn set_total(&mut self, total: Money, now: DateTime<Utc>) {
        self.total = total;
        self.updated = now;
    }

    pub fn set_products(&mut self, products: Vec<ProductId>, now: DateTime<Utc>) {
        self.products = products;
        self.updated = now;
    }

    pub fn set_digital(&mut self, is_digital: bool, now: DateTime<Utc>) {
        self.is_digital = is_digital;
        self.updated = now;
    }
}

impl Entity for Cart {
    type Id = CartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cart_is_empty_and_physical() {
        let now = Utc::now();
        let cart = Cart::new(CartId::new(), now);
        assert!(cart.products().is_empty());
        assert_eq!(cart.total(), Money::zero());
        assert!(!cart.is_digital());
        assert_eq!(cart.updated(), now);
    }

    #[test]
    fn setters_touch_updated() {
        let start = Utc::now();
        let later = start + chrono::Duration::seconds(30);
        let mut cart = Cart::new(CartId::new(), start).with_products(vec![ProductId::new()]);

        cart.set_total(Money::from_minor(12_00), later);
        assert_eq!(cart.total(), Money::from_minor(12_00));
        assert_eq!(cart.updated(), later);

        cart.set_digital(true, later + chrono::Duration::seconds(1));
        assert!(cart.is_digital());
        assert!(cart.updated() > later);
    }
}
