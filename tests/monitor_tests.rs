mod common;

use cfmapper::prelude::*;
use common::{Order, order, stores};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_published_saves_land_after_shutdown() {
    for store in stores() {
        let monitor = store.spawn_monitor();
        for i in 0..20 {
            monitor
                .publish_save_with_counters(&order(&format!("m-{:02}", i), "u1", i))
                .unwrap();
        }

        let stats = monitor.shutdown().await.unwrap();
        assert_eq!(stats.completed, 20);
        assert_eq!(stats.failed, 0);
        assert_eq!(store.count::<Order>().unwrap(), 20);
        assert_eq!(store.find::<Order>("m-07").unwrap().unwrap().quantity, 7);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deletes_run_in_order() {
    for store in stores() {
        for i in 0..5 {
            store.save(&order(&format!("d-{}", i), "u1", 0)).unwrap();
        }

        let monitor = store.spawn_monitor();
        monitor.publish_delete::<Order>("d-0").unwrap();
        monitor.publish_delete_all::<Order>().unwrap();
        let stats = monitor.shutdown().await.unwrap();

        assert_eq!(stats.completed, 2);
        assert_eq!(store.count::<Order>().unwrap(), 0);
    }
}

#[tokio::test]
async fn test_invalid_record_is_rejected_at_publish() {
    let store = common::column_family_store();
    let monitor = store.spawn_monitor();
    assert!(monitor.publish_save(&Order::default()).is_err());

    let stats = monitor.shutdown().await.unwrap();
    assert_eq!(stats.completed, 0);
}

#[tokio::test]
async fn test_storage_failures_are_counted() {
    let (store, raw) = common::column_family_store_with_raw();
    store.save(&order("f-1", "u1", 0)).unwrap();
    raw.set_offline(true);

    let monitor = store.spawn_monitor();
    monitor.publish_save(&order("f-2", "u1", 0)).unwrap();
    monitor.publish_delete::<Order>("f-1").unwrap();
    let stats = monitor.shutdown().await.unwrap();

    assert_eq!(stats.completed, 0);
    assert_eq!(stats.failed, 2);
}
