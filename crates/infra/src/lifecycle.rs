//! Order lifecycle reactor.
//!
//! Side effects that follow cart and order writes:
//!
//! ```text
//! new order (before first insert) → assign order number, deactivate other owners' orders on the cart
//! order inserted                 → recompute its total from the cart
//! existing cart updated          → recompute the total of the cart's only order
//! ```
//!
//! The reactor is called explicitly by whoever performs the write (the
//! [`OrderService`](crate::service::OrderService) for orders, the cart store's
//! observer list for carts). Its own writes go through
//! [`OrderRepository::update`], which raises nothing, so a reaction can never
//! trigger another reaction.

use chrono::Utc;
use tracing::{debug, instrument, warn};

use kart_events::EventHandler;
use kart_orders::{Cart, CartSaved, Order, OrderNumberGenerator, OrderSaved};

use crate::error::{OrdersError, OrdersResult};
use crate::repository::OrderRepository;

#[derive(Debug)]
pub struct OrderLifecycle<O> {
    orders: O,
    numbers: OrderNumberGenerator,
}

impl<O> OrderLifecycle<O>
where
    O: OrderRepository,
{
    pub fn new(orders: O, numbers: OrderNumberGenerator) -> Self {
        Self { orders, numbers }
    }

    /// Runs before an order is inserted for the first time.
    ///
    /// Numbers the order if it has no number yet, then deactivates every order
    /// on the same cart that belongs to a different billing profile (a cart
    /// handed from a guest session to a signed-in account).
    #[instrument(skip(self, order), fields(order_id = %order.id_typed(), cart_id = %order.cart()), err)]
    pub fn prepare_new_order(&self, order: &mut Order) -> OrdersResult<()> {
        if order.order_number().is_none() {
            let number = self
                .numbers
                .generate_unique(|candidate| {
                    self.orders.number_taken(candidate).map_err(OrdersError::from)
                })?;
            order.assign_order_number(number)?;
        }

        let deactivated =
            self.orders
                .deactivate_other_owners(order.cart(), order.billing_profile(), Utc::now())?;
        if deactivated > 0 {
            debug!(deactivated, "deactivated orders left on cart by another billing profile");
        }
        Ok(())
    }

    fn recompute_and_store(&self, order: &mut Order, cart: &Cart) -> OrdersResult<()> {
        let total = order.recompute_total(cart, Utc::now())?;
        self.orders.update(order)?;
        debug!(order_id = %order.id_typed(), %total, "order total recomputed");
        Ok(())
    }
}

impl<O> EventHandler<CartSaved> for OrderLifecycle<O>
where
    O: OrderRepository,
{
    type Error = OrdersError;

    /// A brand-new cart has no orders yet, so only updates are considered.
    /// With zero or several orders on the cart nothing is recomputed; several
    /// orders is logged, since which one to price is ambiguous.
    fn handle(&self, event: &CartSaved) -> Result<(), Self::Error> {
        if event.created {
            return Ok(());
        }

        let cart_id = event.cart.id_typed();
        let mut orders = self.orders.list_by_cart(cart_id)?;
        match orders.len() {
            0 => Ok(()),
            1 => {
                let mut order = orders.remove(0);
                self.recompute_and_store(&mut order, &event.cart)
            }
            n => {
                warn!(%cart_id, orders = n, "cart has several orders; totals left unchanged");
                Ok(())
            }
        }
    }
}

impl<O> EventHandler<OrderSaved> for OrderLifecycle<O>
where
    O: OrderRepository,
{
    type Error = OrdersError;

    /// Prices an order once, right after its first insert. Later saves
    /// leave the total to the cart reaction.
    fn handle(&self, event: &OrderSaved) -> Result<(), Self::Error> {
        if !event.created {
            return Ok(());
        }
        let mut order = event.order.clone();
        self.recompute_and_store(&mut order, &event.cart)
    }
}
