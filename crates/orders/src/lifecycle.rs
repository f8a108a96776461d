//! Facts raised when carts and orders are written.

use chrono::{DateTime, Utc};

use kart_events::Event;

use crate::cart::Cart;
use crate::order::Order;

/// A cart was written. `created` is true for the first write only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSaved {
    pub cart: Cart,
    pub created: bool,
    pub occurred_at: DateTime<Utc>,
}

/// An order was written. `created` is true for the first write only.
///
/// Carries the cart the order was built from, so handlers can price it
/// without reading the cart back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSaved {
    pub order: Order,
    pub cart: Cart,
    pub created: bool,
    pub occurred_at: DateTime<Utc>,
}

impl Event for CartSaved {
    fn event_type(&self) -> &'static str {
        "cart.saved"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl Event for OrderSaved {
    fn event_type(&self) -> &'static str {
        "order.saved"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
