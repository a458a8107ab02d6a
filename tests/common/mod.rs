#![allow(dead_code)]

use cfmapper::prelude::*;
use cfmapper::storage::MemoryStore;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Shipped,
    Cancelled,
}

column_enum!(OrderStatus { Pending, Shipped, Cancelled });

#[derive(Debug, Default)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
}

impl Entity for Product {
    const FAMILY: &'static str = "Product";

    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new()
            .field(field!(Self, id).identity())
            .field(field!(Self, name))
            .field(field!(Self, price))
    }
}

#[derive(Debug, Default)]
pub struct Order {
    pub order_id: String,
    pub product: Relation<Product>,
    pub user_id: String,
    pub quantity: i64,
    pub refund: Decimal,
    pub price_paid: Decimal,
    pub status: OrderStatus,
    pub placed_at: Option<DateTime<Utc>>,
}

impl Entity for Order {
    const FAMILY: &'static str = "Order";

    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new()
            .field(field!(Self, order_id).identity().column("ORDERID"))
            .field(field!(Self, product))
            .field(field!(Self, user_id).indexed())
            .field(field!(Self, quantity).counter())
            .field(field!(Self, refund).decimal_counter(2))
            .field(field!(Self, price_paid).column("PRICEPAID"))
            .field(field!(Self, status))
            .field(field!(Self, placed_at))
    }
}

#[derive(Debug)]
pub struct Goals;

impl DictionaryFamily for Goals {
    const FAMILY: &'static str = "Goals";
}

#[derive(Debug, Default)]
pub struct Account {
    pub guid: String,
    pub nickname: Option<String>,
    pub xp: i64,
    pub goals: DictionaryList<Goals>,
}

impl Entity for Account {
    const FAMILY: &'static str = "Account";

    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new()
            .field(field!(Self, guid).identity())
            .field(field!(Self, nickname))
            .field(field!(Self, xp).counter())
            .field(field!(Self, goals))
    }
}

#[derive(Debug, Default)]
pub struct Game {
    pub id: String,
    pub title: String,
    pub players: i64,
}

impl Entity for Game {
    const FAMILY: &'static str = "Game";

    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new()
            .field(field!(Self, id).identity())
            .field(field!(Self, title))
            .field(field!(Self, players).indexed())
    }
}

#[derive(Debug, Default)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub games: RelationList<Game>,
}

impl Entity for Room {
    const FAMILY: &'static str = "Room";

    fn descriptor() -> EntityDescriptor<Self> {
        EntityDescriptor::new()
            .field(field!(Self, id).identity())
            .field(field!(Self, name))
            .field(field!(Self, games))
    }
}

pub fn column_family_store() -> Store {
    Store::open(StoreConfig::new("tests")).unwrap()
}

/// Column-family store plus the raw store underneath, for inspecting tombstones.
pub fn column_family_store_with_raw() -> (Store, Arc<MemoryStore>) {
    let raw = Arc::new(MemoryStore::new(vec!["10.0.0.1:9160".to_string()]));
    let store = Store::over(raw.clone(), StoreConfig::new("tests")).unwrap();
    (store, raw)
}

pub fn relational_store() -> Store {
    Store::open(StoreConfig::new("tests").backend(BackendKind::Relational)).unwrap()
}

/// One fresh store per backend; every scenario must behave the same on both.
pub fn stores() -> Vec<Store> {
    vec![column_family_store(), relational_store()]
}

pub fn product(id: &str, price: &str) -> Product {
    Product {
        id: id.to_string(),
        name: format!("product {}", id),
        price: price.parse().unwrap(),
    }
}

pub fn order(id: &str, user: &str, quantity: i64) -> Order {
    Order {
        order_id: id.to_string(),
        product: Relation::new("p1"),
        user_id: user.to_string(),
        quantity,
        refund: Decimal::ZERO,
        price_paid: "19.99".parse().unwrap(),
        status: OrderStatus::Pending,
        placed_at: DateTime::from_timestamp_millis(1_700_000_000_000),
    }
}
