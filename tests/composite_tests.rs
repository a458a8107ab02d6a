mod common;

use cfmapper::prelude::*;
use common::{Account, Goals, stores};
use std::time::Duration;

fn account(guid: &str) -> Account {
    Account {
        guid: guid.to_string(),
        nickname: Some("ace".to_string()),
        ..Account::default()
    }
}

#[test]
fn test_write_and_read_entries() {
    for store in stores() {
        store.write_dictionary_entry::<Goals>("acct-1", "weekly", "score", "10", None).unwrap();
        store.write_dictionary_entry::<Goals>("acct-1", "weekly", "level", "2", None).unwrap();
        store.write_dictionary_entry::<Goals>("acct-1", "daily", "score", "1", None).unwrap();

        let weekly = store.dictionary::<Goals>("acct-1", "weekly").unwrap();
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly.get("score"), Some("10"));
        assert!(!weekly.is_changed());

        assert_eq!(store.dictionary_keys::<Goals>("acct-1").unwrap(), vec!["daily", "weekly"]);
        assert!(store.dictionary::<Goals>("acct-2", "weekly").unwrap().is_empty());
    }
}

#[test]
fn test_entry_overwrite_keeps_siblings() {
    for store in stores() {
        store.write_dictionary_entry::<Goals>("acct-3", "weekly", "score", "10", None).unwrap();
        store.write_dictionary_entry::<Goals>("acct-3", "weekly", "level", "2", None).unwrap();
        store.write_dictionary_entry::<Goals>("acct-3", "weekly", "score", "11", None).unwrap();

        let weekly = store.dictionary::<Goals>("acct-3", "weekly").unwrap();
        assert_eq!(weekly.get("score"), Some("11"));
        assert_eq!(weekly.get("level"), Some("2"));
    }
}

#[test]
fn test_delete_entry_and_dictionary() {
    for store in stores() {
        for key in ["a", "b", "c"] {
            store.write_dictionary_entry::<Goals>("acct-4", "weekly", key, "1", None).unwrap();
        }
        store.write_dictionary_entry::<Goals>("acct-4", "daily", "a", "1", None).unwrap();

        assert_eq!(store.delete_dictionary::<Goals>("acct-4", "weekly", Some("b")).unwrap(), 1);
        assert_eq!(store.delete_dictionary::<Goals>("acct-4", "weekly", None).unwrap(), 2);
        assert_eq!(store.dictionary_keys::<Goals>("acct-4").unwrap(), vec!["daily"]);

        assert_eq!(store.delete_all_dictionaries::<Goals>("acct-4").unwrap(), 1);
        assert!(store.dictionaries::<Goals>("acct-4").unwrap().is_empty());
    }
}

#[test]
fn test_expired_entries_disappear() {
    for store in stores() {
        store
            .write_dictionary_entry::<Goals>("acct-5", "weekly", "bonus", "5", Some(Duration::from_millis(1)))
            .unwrap();
        store.write_dictionary_entry::<Goals>("acct-5", "weekly", "score", "1", None).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let weekly = store.dictionary::<Goals>("acct-5", "weekly").unwrap();
        assert_eq!(weekly.get("bonus"), None);
        assert_eq!(weekly.get("score"), Some("1"));
    }
}

#[test]
fn test_record_saves_changed_dictionaries() {
    for store in stores() {
        let mut acct = account("acct-6");
        acct.goals.entry("acct-6", "weekly").insert("score", "10");
        acct.goals.entry("acct-6", "daily").insert("score", "3");
        store.save(&acct).unwrap();

        let mut loaded: Account = store.find("acct-6").unwrap().unwrap();
        assert_eq!(loaded.goals.len(), 2);
        assert_eq!(loaded.goals.get("weekly").unwrap().get("score"), Some("10"));
        assert!(loaded.goals.iter().all(|d| !d.is_changed()));

        loaded.goals.entry("acct-6", "weekly").insert("level", "4");
        store.save(&loaded).unwrap();

        let weekly = store.dictionary::<Goals>("acct-6", "weekly").unwrap();
        assert_eq!(weekly.get("score"), Some("10"));
        assert_eq!(weekly.get("level"), Some("4"));
    }
}

#[test]
fn test_dictionary_without_row_key_uses_record_key() {
    for store in stores() {
        let mut acct = account("acct-7");
        let mut weekly = Dictionary::new("", "weekly");
        weekly.insert("score", "8");
        acct.goals.push(weekly);
        store.save(&acct).unwrap();

        assert_eq!(store.dictionary::<Goals>("acct-7", "weekly").unwrap().get("score"), Some("8"));
    }
}

#[test]
fn test_dictionary_delete_counts_only_live_entries() {
    for store in stores() {
        store
            .write_dictionary_entry::<Goals>("acct-9", "weekly", "bonus", "5", Some(Duration::ZERO))
            .unwrap();
        store.write_dictionary_entry::<Goals>("acct-9", "weekly", "score", "1", None).unwrap();

        assert_eq!(store.delete_dictionary::<Goals>("acct-9", "weekly", None).unwrap(), 1);
        assert!(store.dictionary::<Goals>("acct-9", "weekly").unwrap().is_empty());
    }
}

#[test]
fn test_dictionary_family_is_cleared_across_rows() {
    for store in stores() {
        for row in ["acct-10", "acct-11", "acct-12"] {
            store.write_dictionary_entry::<Goals>(row, "weekly", "score", "1", None).unwrap();
            store.write_dictionary_entry::<Goals>(row, "daily", "score", "2", None).unwrap();
        }

        assert_eq!(store.delete_dictionary_family::<Goals>().unwrap(), 3);
        for row in ["acct-10", "acct-11", "acct-12"] {
            assert!(store.dictionaries::<Goals>(row).unwrap().is_empty());
        }
        assert_eq!(store.delete_dictionary_family::<Goals>().unwrap(), 0);

        store.write_dictionary_entry::<Goals>("acct-10", "weekly", "score", "3", None).unwrap();
        assert_eq!(store.dictionary::<Goals>("acct-10", "weekly").unwrap().get("score"), Some("3"));
    }
}
