mod common;

use cfmapper::prelude::*;
use common::{Game, Order, Room, order, product, stores};

fn game(id: &str) -> Game {
    Game {
        id: id.to_string(),
        title: format!("game {}", id),
        ..Game::default()
    }
}

#[test]
fn test_single_relation_resolves_lazily() {
    for store in stores() {
        store.save(&product("p1", "4.25")).unwrap();
        store.save(&order("r-1", "u1", 1)).unwrap();

        let found: Order = store.find("r-1").unwrap().unwrap();
        assert_eq!(found.product.id(), Some("p1"));
        assert!(!found.product.is_resolved());

        let target = found.product.get().unwrap();
        assert_eq!(target.name, "product p1");
        assert_eq!(target.price, "4.25".parse::<Decimal>().unwrap());
        assert!(found.product.is_resolved());
    }
}

#[test]
fn test_deleted_target_reads_as_none() {
    for store in stores() {
        store.save(&product("p1", "1.00")).unwrap();
        store.save(&order("r-2", "u1", 1)).unwrap();
        store.delete::<common::Product>("p1").unwrap();

        let found: Order = store.find("r-2").unwrap().unwrap();
        assert_eq!(found.product.id(), Some("p1"));
        assert!(found.product.get().is_none());
    }
}

#[test]
fn test_resolution_is_memoized() {
    for store in stores() {
        store.save(&product("p1", "1.00")).unwrap();
        store.save(&order("r-3", "u1", 1)).unwrap();

        let found: Order = store.find("r-3").unwrap().unwrap();
        let first = found.product.get().unwrap();
        store.delete::<common::Product>("p1").unwrap();

        let again = found.product.get().unwrap();
        assert_eq!(first.id, again.id);
    }
}

#[test]
fn test_relation_list_round_trip() {
    for store in stores() {
        for id in ["g1", "g2", "g3"] {
            store.save(&game(id)).unwrap();
        }

        let mut room = Room {
            id: "room-1".to_string(),
            name: "lobby".to_string(),
            ..Room::default()
        };
        room.games.push(game("g1")).unwrap();
        room.games.push_id("g2");
        room.games.push_id("g3");
        store.save(&room).unwrap();

        let loaded: Room = store.find("room-1").unwrap().unwrap();
        assert_eq!(loaded.games.ids(), vec!["g1", "g2", "g3"]);
        let titles: Vec<String> = loaded
            .games
            .iter()
            .map(|g| g.map(|g| g.title.clone()).unwrap_or_default())
            .collect();
        assert_eq!(titles, vec!["game g1", "game g2", "game g3"]);
    }
}

#[test]
fn test_relation_list_edits_are_saved_as_ids() {
    for store in stores() {
        store.save(&game("g1")).unwrap();
        store.save(&game("g2")).unwrap();

        let mut room = Room {
            id: "room-2".to_string(),
            ..Room::default()
        };
        room.games.push_id("g1");
        room.games.push_id("missing");
        store.save(&room).unwrap();

        let mut loaded: Room = store.find("room-2").unwrap().unwrap();
        assert!(loaded.games.get(1).is_none());

        loaded.games.set(1, game("g2")).unwrap();
        store.save(&loaded).unwrap();

        assert_eq!(
            store.get::<Room>("room-2", "games").unwrap(),
            Some(Value::ReferenceList(vec!["g1".into(), "g2".into()]))
        );
        let reloaded: Room = store.find("room-2").unwrap().unwrap();
        assert_eq!(reloaded.games.get(1).unwrap().title, "game g2");
    }
}
