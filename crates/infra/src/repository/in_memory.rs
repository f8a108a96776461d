//! In-memory repositories for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use kart_core::{BillingProfileId, CartId, OrderId, ProductPurchaseId};
use kart_events::{EventHandler, notify_all};
use kart_orders::{
    BillingProfile, Cart, CartSaved, Order, OrderNumber, OrderStatus, ProductPurchase, Requester,
};

use super::{
    BillingProfileStore, CartStore, OrderRepository, ProductPurchaseRepository, sort_newest_first,
};
use crate::error::{OrdersError, StoreError};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
}

/// In-memory order table.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn select(&self, predicate: impl Fn(&Order) -> bool) -> Result<Vec<Order>, StoreError> {
        let orders = read(&self.orders)?;
        let mut selected: Vec<Order> = orders.values().filter(|o| predicate(o)).cloned().collect();
        sort_newest_first(&mut selected);
        Ok(selected)
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = write(&self.orders)?;
        if orders.contains_key(&order.id_typed()) {
            return Err(StoreError::AlreadyExists(order.id_typed().to_string()));
        }
        orders.insert(order.id_typed(), order.clone());
        Ok(())
    }

    fn update(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = write(&self.orders)?;
        match orders.get_mut(&order.id_typed()) {
            Some(slot) => {
                *slot = order.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(order.id_typed().to_string())),
        }
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(read(&self.orders)?.get(&id).cloned())
    }

    fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        Ok(self
            .select(|o| o.order_number() == Some(number))?
            .into_iter()
            .next())
    }

    fn number_taken(&self, number: &OrderNumber) -> Result<bool, StoreError> {
        let orders = read(&self.orders)?;
        Ok(orders.values().any(|o| o.order_number() == Some(number)))
    }

    fn list_by_billing_profile(
        &self,
        billing_profile: BillingProfileId,
    ) -> Result<Vec<Order>, StoreError> {
        self.select(|o| o.billing_profile() == Some(billing_profile))
    }

    fn list_by_cart(&self, cart: CartId) -> Result<Vec<Order>, StoreError> {
        self.select(|o| o.cart() == cart)
    }

    fn list_open(
        &self,
        billing_profile: BillingProfileId,
        cart: CartId,
    ) -> Result<Vec<Order>, StoreError> {
        self.select(|o| {
            o.is_open() && o.cart() == cart && o.billing_profile() == Some(billing_profile)
        })
    }

    fn list_submitted(&self) -> Result<Vec<Order>, StoreError> {
        self.select(|o| o.status() != OrderStatus::Created)
    }

    fn deactivate_other_owners(
        &self,
        cart: CartId,
        owner: Option<BillingProfileId>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut orders = write(&self.orders)?;
        let mut changed = 0;
        for order in orders.values_mut() {
            if order.cart() == cart && order.billing_profile() != owner && order.is_active() {
                order.deactivate(now);
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// In-memory product purchase table.
#[derive(Debug, Default)]
pub struct InMemoryProductPurchaseRepository {
    purchases: RwLock<HashMap<ProductPurchaseId, ProductPurchase>>,
}

impl InMemoryProductPurchaseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn select(
        &self,
        predicate: impl Fn(&ProductPurchase) -> bool,
    ) -> Result<Vec<ProductPurchase>, StoreError> {
        let purchases = read(&self.purchases)?;
        let mut selected: Vec<ProductPurchase> =
            purchases.values().filter(|p| predicate(p)).cloned().collect();
        selected.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(selected)
    }
}

impl ProductPurchaseRepository for InMemoryProductPurchaseRepository {
    fn insert(&self, purchase: &ProductPurchase) -> Result<(), StoreError> {
        let mut purchases = write(&self.purchases)?;
        if purchases.contains_key(&purchase.id_typed()) {
            return Err(StoreError::AlreadyExists(purchase.id_typed().to_string()));
        }
        purchases.insert(purchase.id_typed(), purchase.clone());
        Ok(())
    }

    fn get(&self, id: ProductPurchaseId) -> Result<Option<ProductPurchase>, StoreError> {
        Ok(read(&self.purchases)?.get(&id).cloned())
    }

    fn list_active(&self) -> Result<Vec<ProductPurchase>, StoreError> {
        self.select(|p| !p.is_refunded())
    }

    fn list_active_for_billing_profile(
        &self,
        billing_profile: BillingProfileId,
    ) -> Result<Vec<ProductPurchase>, StoreError> {
        self.select(|p| !p.is_refunded() && p.billing_profile() == billing_profile)
    }

    fn mark_refunded(
        &self,
        id: ProductPurchaseId,
        now: DateTime<Utc>,
    ) -> Result<ProductPurchase, StoreError> {
        let mut purchases = write(&self.purchases)?;
        let purchase = purchases
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        purchase.refund(now);
        Ok(purchase.clone())
    }
}

type CartObserver = Arc<dyn EventHandler<CartSaved, Error = OrdersError>>;

/// In-memory cart table that tells its observers about every write.
#[derive(Default)]
pub struct InMemoryCartStore {
    carts: RwLock<HashMap<CartId, Cart>>,
    observers: RwLock<Vec<CartObserver>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register an observer for every later `save`.
    pub fn subscribe(&self, observer: CartObserver) -> Result<(), StoreError> {
        write(&self.observers)?.push(observer);
        Ok(())
    }
}

impl core::fmt::Debug for InMemoryCartStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let observers = self.observers.read().map(|o| o.len()).unwrap_or(0);
        f.debug_struct("InMemoryCartStore")
            .field("carts", &self.carts)
            .field("observers", &observers)
            .finish()
    }
}

impl CartStore for InMemoryCartStore {
    fn get(&self, id: CartId) -> Result<Option<Cart>, StoreError> {
        Ok(read(&self.carts)?.get(&id).cloned())
    }

    fn save(&self, cart: &Cart) -> Result<bool, OrdersError> {
        let created = write(&self.carts)?
            .insert(cart.id_typed(), cart.clone())
            .is_none();

        // Observers may read carts back, so no lock is held while they run.
        let observers = read(&self.observers)?.clone();
        let event = CartSaved {
            cart: cart.clone(),
            created,
            occurred_at: Utc::now(),
        };
        notify_all(&observers, &event)?;

        Ok(created)
    }
}

/// In-memory billing profiles keyed by user or guest email.
#[derive(Debug, Default)]
pub struct InMemoryBillingProfileStore {
    profiles: RwLock<HashMap<BillingProfileId, BillingProfile>>,
}

impl InMemoryBillingProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl BillingProfileStore for InMemoryBillingProfileStore {
    fn get_or_new(&self, requester: &Requester) -> Result<(BillingProfile, bool), StoreError> {
        if *requester == Requester::Anonymous {
            return Ok((BillingProfile::for_requester(BillingProfileId::new(), requester), true));
        }

        let mut profiles = write(&self.profiles)?;
        let existing = profiles.values().find(|profile| match requester {
            Requester::User { user_id, .. } => profile.user() == Some(*user_id),
            Requester::Guest { email } => profile.is_guest() && profile.email() == Some(email.as_str()),
            Requester::Anonymous => false,
        });
        if let Some(profile) = existing {
            return Ok((profile.clone(), false));
        }

        let profile = BillingProfile::for_requester(BillingProfileId::new(), requester);
        profiles.insert(profile.id_typed(), profile.clone());
        Ok((profile, true))
    }

    fn get(&self, id: BillingProfileId) -> Result<Option<BillingProfile>, StoreError> {
        Ok(read(&self.profiles)?.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use kart_core::{Money, ProductId, UserId};

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn order_on(cart: CartId, profile: Option<BillingProfileId>) -> Order {
        Order::new(OrderId::new(), cart, profile, Money::from_minor(50_00), test_time())
    }

    #[test]
    fn insert_then_update_round_trip() {
        let repo = InMemoryOrderRepository::new();
        let mut order = order_on(CartId::new(), None);
        repo.insert(&order).unwrap();
        assert!(matches!(repo.insert(&order), Err(StoreError::AlreadyExists(_))));

        order.deactivate(test_time());
        repo.update(&order).unwrap();
        assert_eq!(repo.get(order.id_typed()).unwrap(), Some(order));
    }

    #[test]
    fn update_of_unknown_order_fails() {
        let repo = InMemoryOrderRepository::new();
        let order = order_on(CartId::new(), None);
        assert!(matches!(repo.update(&order), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn listings_are_newest_first() {
        let repo = InMemoryOrderRepository::new();
        let profile = BillingProfileId::new();
        let cart = CartId::new();
        let t0 = test_time();
        let older = Order::new(OrderId::new(), cart, Some(profile), Money::zero(), t0);
        let newer = Order::new(
            OrderId::new(),
            cart,
            Some(profile),
            Money::zero(),
            t0 + chrono::Duration::seconds(5),
        );
        repo.insert(&older).unwrap();
        repo.insert(&newer).unwrap();

        let listed = repo.list_by_billing_profile(profile).unwrap();
        assert_eq!(listed, vec![newer, older]);
    }

    #[test]
    fn deactivate_other_owners_spares_the_owner() {
        let repo = InMemoryOrderRepository::new();
        let cart = CartId::new();
        let owner = BillingProfileId::new();
        let mine = order_on(cart, Some(owner));
        let stranger = order_on(cart, Some(BillingProfileId::new()));
        let anonymous = order_on(cart, None);
        let elsewhere = order_on(CartId::new(), None);
        for o in [&mine, &stranger, &anonymous, &elsewhere] {
            repo.insert(o).unwrap();
        }

        let changed = repo.deactivate_other_owners(cart, Some(owner), test_time()).unwrap();

        assert_eq!(changed, 2);
        assert!(repo.get(mine.id_typed()).unwrap().unwrap().is_active());
        assert!(!repo.get(stranger.id_typed()).unwrap().unwrap().is_active());
        assert!(!repo.get(anonymous.id_typed()).unwrap().unwrap().is_active());
        assert!(repo.get(elsewhere.id_typed()).unwrap().unwrap().is_active());
    }

    #[test]
    fn purchases_listing_hides_refunds() {
        let repo = InMemoryProductPurchaseRepository::new();
        let profile = BillingProfileId::new();
        let kept = ProductPurchase::new(ProductPurchaseId::new(), None, profile, ProductId::new(), test_time());
        let refunded = ProductPurchase::new(ProductPurchaseId::new(), None, profile, ProductId::new(), test_time());
        let other = ProductPurchase::new(
            ProductPurchaseId::new(),
            None,
            BillingProfileId::new(),
            ProductId::new(),
            test_time(),
        );
        for p in [&kept, &refunded, &other] {
            repo.insert(p).unwrap();
        }

        let flipped = repo.mark_refunded(refunded.id_typed(), test_time()).unwrap();
        assert!(flipped.is_refunded());

        let active = repo.list_active().unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|p| !p.is_refunded()));
        assert_eq!(repo.list_active_for_billing_profile(profile).unwrap(), vec![kept]);
        assert!(repo.get(refunded.id_typed()).unwrap().is_some());
    }

    #[test]
    fn refund_of_unknown_purchase_fails() {
        let repo = InMemoryProductPurchaseRepository::new();
        let err = repo.mark_refunded(ProductPurchaseId::new(), test_time()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[derive(Default)]
    struct SeenCarts(Mutex<Vec<(CartId, bool)>>);

    impl EventHandler<CartSaved> for SeenCarts {
        type Error = OrdersError;

        fn handle(&self, event: &CartSaved) -> Result<(), Self::Error> {
            self.0.lock().unwrap().push((event.cart.id_typed(), event.created));
            Ok(())
        }
    }

    #[test]
    fn cart_store_reports_creation_then_updates() {
        let store = InMemoryCartStore::new();
        let seen = Arc::new(SeenCarts::default());
        store.subscribe(seen.clone()).unwrap();

        let mut cart = Cart::new(CartId::new(), test_time());
        assert!(store.save(&cart).unwrap());
        cart.set_total(Money::from_minor(1_00), test_time());
        assert!(!store.save(&cart).unwrap());

        let id = cart.id_typed();
        assert_eq!(*seen.0.lock().unwrap(), vec![(id, true), (id, false)]);
        assert_eq!(store.get(id).unwrap(), Some(cart));
    }

    #[test]
    fn billing_profiles_are_reused_per_identity() {
        let store = InMemoryBillingProfileStore::new();
        let user = Requester::User {
            user_id: UserId::new(),
            email: "ana@example.com".to_string(),
        };
        let guest = Requester::Guest {
            email: "ana@example.com".to_string(),
        };

        let (first, created) = store.get_or_new(&user).unwrap();
        assert!(created);
        let (again, created) = store.get_or_new(&user).unwrap();
        assert!(!created);
        assert_eq!(first, again);

        let (guest_profile, created) = store.get_or_new(&guest).unwrap();
        assert!(created);
        assert_ne!(guest_profile.id_typed(), first.id_typed());
    }

    #[test]
    fn anonymous_profiles_are_transient() {
        let store = InMemoryBillingProfileStore::new();
        let (a, created) = store.get_or_new(&Requester::Anonymous).unwrap();
        assert!(created);
        let (b, _) = store.get_or_new(&Requester::Anonymous).unwrap();
        assert_ne!(a.id_typed(), b.id_typed());
        assert!(store.get(a.id_typed()).unwrap().is_none());
    }
}
