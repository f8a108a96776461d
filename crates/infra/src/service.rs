//! Order operations as the checkout flow calls them.
//!
//! ```text
//! get_or_create ─┬─ open order for (profile, cart)? ── return it
//!                └─ none ── prepare (number, deactivate others) → insert → OrderSaved{created} → priced
//! mark_paid ───── fulfillable? ── status = paid → update → purchases recorded
//! ```
//!
//! Every order write made here is followed by an explicit [`OrderSaved`]
//! notification to the lifecycle reactor.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};

use kart_core::{AddressId, BillingProfileId, CartId, Money, OrderId, ProductPurchaseId};
use kart_events::EventHandler;
use kart_orders::{
    Cart, Order, OrderNumber, OrderSaved, OrderStatus, ProductPurchase, Requester,
    exclude_unsubmitted,
};

use crate::config::OrdersConfig;
use crate::error::{OrdersError, OrdersResult, StoreError};
use crate::lifecycle::OrderLifecycle;
use crate::repository::{
    BillingProfileStore, CartStore, InMemoryBillingProfileStore, InMemoryCartStore,
    InMemoryOrderRepository, InMemoryProductPurchaseRepository, OrderRepository,
    PostgresOrderRepository, PostgresProductPurchaseRepository, ProductPurchaseRepository,
};

pub struct OrderService<O, P, C, B> {
    orders: O,
    purchases: P,
    carts: C,
    profiles: B,
    lifecycle: Arc<OrderLifecycle<O>>,
    config: OrdersConfig,
}

/// Service wired to in-memory stores.
pub type InMemoryOrderService = OrderService<
    Arc<InMemoryOrderRepository>,
    Arc<InMemoryProductPurchaseRepository>,
    Arc<InMemoryCartStore>,
    Arc<InMemoryBillingProfileStore>,
>;

impl InMemoryOrderService {
    /// Fresh in-memory stores, with the lifecycle reactor observing cart saves.
    pub fn in_memory(config: OrdersConfig) -> Result<Self, StoreError> {
        let carts = InMemoryCartStore::arc();
        let service = OrderService::new(
            InMemoryOrderRepository::arc(),
            InMemoryProductPurchaseRepository::arc(),
            carts.clone(),
            InMemoryBillingProfileStore::arc(),
            config,
        );
        carts.subscribe(service.lifecycle())?;
        Ok(service)
    }
}

/// Service whose order and purchase stores are picked at runtime.
pub type ConfiguredOrderService<C, B> =
    OrderService<Arc<dyn OrderRepository>, Arc<dyn ProductPurchaseRepository>, C, B>;

impl<C, B> ConfiguredOrderService<C, B>
where
    C: CartStore,
    B: BillingProfileStore,
{
    /// Postgres stores when `use_persistent_stores` is set, in-memory otherwise.
    ///
    /// The pool connects lazily, so this must run inside a tokio runtime when
    /// Postgres is selected. Register [`OrderService::lifecycle`] with the
    /// cart store afterwards.
    pub fn from_config(config: OrdersConfig, carts: C, profiles: B) -> OrdersResult<Self> {
        let orders: Arc<dyn OrderRepository>;
        let purchases: Arc<dyn ProductPurchaseRepository>;
        if config.use_persistent_stores {
            let url = config.require_database_url()?;
            let pool = PgPool::connect_lazy(url)
                .map_err(|e| StoreError::Storage(format!("invalid DATABASE_URL: {e}")))?;
            orders = Arc::new(PostgresOrderRepository::new(pool.clone()));
            purchases = Arc::new(PostgresProductPurchaseRepository::new(pool));
            info!("order stores: postgres");
        } else {
            orders = InMemoryOrderRepository::arc();
            purchases = InMemoryProductPurchaseRepository::arc();
            info!("order stores: in-memory");
        }
        Ok(OrderService::new(orders, purchases, carts, profiles, config))
    }
}

impl<C, B> OrderService<PostgresOrderRepository, PostgresProductPurchaseRepository, C, B>
where
    C: CartStore,
    B: BillingProfileStore,
{
    /// Orders and purchases in Postgres; carts and profiles stay with their owners.
    ///
    /// Register [`OrderService::lifecycle`] with the cart store so cart
    /// updates reprice orders.
    pub fn postgres(pool: PgPool, carts: C, profiles: B, config: OrdersConfig) -> Self {
        OrderService::new(
            PostgresOrderRepository::new(pool.clone()),
            PostgresProductPurchaseRepository::new(pool),
            carts,
            profiles,
            config,
        )
    }
}

impl<O, P, C, B> OrderService<O, P, C, B>
where
    O: OrderRepository + Clone + 'static,
    P: ProductPurchaseRepository,
    C: CartStore,
    B: BillingProfileStore,
{
    pub fn new(orders: O, purchases: P, carts: C, profiles: B, config: OrdersConfig) -> Self {
        let lifecycle = Arc::new(OrderLifecycle::new(orders.clone(), config.order_numbers));
        Self {
            orders,
            purchases,
            carts,
            profiles,
            lifecycle,
            config,
        }
    }

    /// The reactor, for registration with a cart store.
    pub fn lifecycle(&self) -> Arc<OrderLifecycle<O>> {
        self.lifecycle.clone()
    }

    pub fn config(&self) -> &OrdersConfig {
        &self.config
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    pub fn carts(&self) -> &C {
        &self.carts
    }

    pub fn profiles(&self) -> &B {
        &self.profiles
    }

    /// All orders owned by the requester's billing profile, newest first.
    #[instrument(skip(self, requester), err)]
    pub fn find_for_requester(&self, requester: &Requester) -> OrdersResult<Vec<Order>> {
        let (profile, _) = self.profiles.get_or_new(requester)?;
        Ok(self.orders.list_by_billing_profile(profile.id_typed())?)
    }

    /// The requester's orders that have moved past `created`.
    pub fn find_submitted_for_requester(&self, requester: &Requester) -> OrdersResult<Vec<Order>> {
        Ok(exclude_unsubmitted(self.find_for_requester(requester)?))
    }

    /// Every order that has moved past `created`.
    pub fn list_submitted(&self) -> OrdersResult<Vec<Order>> {
        Ok(self.orders.list_submitted()?)
    }

    pub fn find_by_number(&self, number: &OrderNumber) -> OrdersResult<Option<Order>> {
        Ok(self.orders.find_by_number(number)?)
    }

    pub fn get(&self, id: OrderId) -> OrdersResult<Order> {
        self.load_order(id)
    }

    /// The open order for this profile and cart, or a new one.
    ///
    /// With several open orders (which should not happen) the most recently
    /// created one is returned and the anomaly is logged.
    #[instrument(skip(self), err)]
    pub fn get_or_create(
        &self,
        billing_profile: BillingProfileId,
        cart_id: CartId,
    ) -> OrdersResult<(Order, bool)> {
        let mut open = self.orders.list_open(billing_profile, cart_id)?;
        if !open.is_empty() {
            if open.len() > 1 {
                warn!(
                    %billing_profile,
                    %cart_id,
                    open_orders = open.len(),
                    "several open orders for one billing profile and cart; using the newest"
                );
            }
            return Ok((open.remove(0), false));
        }

        let cart = self.load_cart(cart_id)?;
        let mut order = Order::new(
            OrderId::new(),
            cart_id,
            Some(billing_profile),
            self.config.default_shipping_total,
            Utc::now(),
        );
        self.lifecycle.prepare_new_order(&mut order)?;
        self.orders.insert(&order)?;

        let id = order.id_typed();
        self.lifecycle.handle(&OrderSaved {
            order,
            cart,
            created: true,
            occurred_at: Utc::now(),
        })?;

        let order = self.load_order(id)?;
        info!(order_id = %id, order_number = %order, total = %order.total(), "order created");
        Ok((order, true))
    }

    /// Reprice an order from its cart and store it.
    #[instrument(skip(self), err)]
    pub fn recompute_total(&self, order_id: OrderId) -> OrdersResult<Money> {
        let mut order = self.load_order(order_id)?;
        let cart = self.load_cart(order.cart())?;
        let total = order.recompute_total(&cart, Utc::now())?;
        self.save_existing(order, cart)?;
        Ok(total)
    }

    /// Attach checkout addresses. The total is not touched.
    #[instrument(skip(self), err)]
    pub fn attach_addresses(
        &self,
        order_id: OrderId,
        shipping: Option<AddressId>,
        billing: Option<AddressId>,
    ) -> OrdersResult<Order> {
        let mut order = self.load_order(order_id)?;
        let cart = self.load_cart(order.cart())?;
        order.attach_addresses(shipping, billing, Utc::now());
        self.save_existing(order.clone(), cart)?;
        Ok(order)
    }

    /// Take payment if the order is complete; returns the resulting status.
    ///
    /// On the transition to `paid`, one purchase per product in the cart is
    /// recorded. Purchases are written before the order, with ids derived
    /// from the order line, so a call that fails part way leaves the order
    /// unpaid and the retry fills in only the missing purchases. Calls on an
    /// order that is already paid change nothing.
    #[instrument(skip(self), err)]
    pub fn mark_paid(&self, order_id: OrderId) -> OrdersResult<OrderStatus> {
        let mut order = self.load_order(order_id)?;
        let cart = self.load_cart(order.cart())?;
        let before = order.status();
        let now = Utc::now();
        let after = order.mark_paid(&cart, now)?;
        if after == before {
            return Ok(after);
        }

        let user = match order.billing_profile() {
            Some(profile) => self.profiles.get(profile)?.and_then(|p| p.user()),
            None => None,
        };
        let purchases = ProductPurchase::for_paid_order(&order, &cart, user, now)?;

        let mut recorded = 0;
        for purchase in &purchases {
            match self.purchases.insert(purchase) {
                Ok(()) => recorded += 1,
                Err(StoreError::AlreadyExists(_)) => {
                    debug!(purchase_id = %purchase.id_typed(), "purchase kept from an earlier attempt");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.save_existing(order, cart)?;
        info!(%order_id, purchases = purchases.len(), recorded, "order paid");
        Ok(after)
    }

    /// Record a fulfilment outcome (shipped, refunded, ...) for a paid order.
    #[instrument(skip(self), err)]
    pub fn advance_status(&self, order_id: OrderId, next: OrderStatus) -> OrdersResult<Order> {
        let mut order = self.load_order(order_id)?;
        let cart = self.load_cart(order.cart())?;
        order.advance_status(next, Utc::now())?;
        self.save_existing(order.clone(), cart)?;
        Ok(order)
    }

    /// Purchases that have not been refunded.
    pub fn list_active_purchases(&self) -> OrdersResult<Vec<ProductPurchase>> {
        Ok(self.purchases.list_active()?)
    }

    /// The requester's purchases that have not been refunded.
    pub fn purchases_for_requester(&self, requester: &Requester) -> OrdersResult<Vec<ProductPurchase>> {
        let (profile, _) = self.profiles.get_or_new(requester)?;
        Ok(self
            .purchases
            .list_active_for_billing_profile(profile.id_typed())?)
    }

    #[instrument(skip(self), err)]
    pub fn refund_purchase(&self, id: ProductPurchaseId) -> OrdersResult<ProductPurchase> {
        self.purchases
            .mark_refunded(id, Utc::now())
            .map_err(|e| match e {
                StoreError::NotFound(_) => OrdersError::PurchaseNotFound(id.to_string()),
                other => other.into(),
            })
    }

    fn save_existing(&self, order: Order, cart: Cart) -> OrdersResult<()> {
        self.orders.update(&order)?;
        self.lifecycle.handle(&OrderSaved {
            order,
            cart,
            created: false,
            occurred_at: Utc::now(),
        })
    }

    fn load_order(&self, id: OrderId) -> OrdersResult<Order> {
        self.orders
            .get(id)?
            .ok_or_else(|| OrdersError::OrderNotFound(id.to_string()))
    }

    fn load_cart(&self, id: CartId) -> OrdersResult<Cart> {
        self.carts.get(id)?.ok_or(OrdersError::CartNotFound(id))
    }
}
