//! Behaviour every credential store must share.

use credential_storage::{CredentialKey, CredentialStore, InMemoryCredentialStore};
use std::sync::Arc;
use std::thread;

fn stores() -> Vec<(Arc<dyn CredentialStore>, Option<tempfile::TempDir>)> {
    let mut stores: Vec<(Arc<dyn CredentialStore>, Option<tempfile::TempDir>)> =
        vec![(Arc::new(InMemoryCredentialStore::new()), None)];

    #[cfg(unix)]
    {
        let dir = tempfile::tempdir().unwrap();
        let store = credential_storage::FileCredentialStore::new(dir.path());
        stores.push((Arc::new(store), Some(dir)));
    }

    stores
}

#[test]
fn save_then_get_round_trips() {
    for (store, _dir) in stores() {
        let key = CredentialKey::id_token("acct.example.com", "jdoe").to_string();
        store.save(&key, "id-token-value").unwrap();
        assert_eq!(
            store.get(&key).unwrap().as_deref(),
            Some("id-token-value"),
            "store {}",
            store.name()
        );

        assert!(store.remove(&key).unwrap());
        assert_eq!(store.get(&key).unwrap(), None, "store {}", store.name());
    }
}

#[test]
fn second_save_overwrites_first() {
    for (store, _dir) in stores() {
        store.save("k", "v1").unwrap();
        store.save("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"), "store {}", store.name());
    }
}

#[test]
fn removing_absent_key_changes_nothing() {
    for (store, _dir) in stores() {
        store.save("kept", "secret").unwrap();
        assert!(!store.remove("absent").unwrap());
        assert_eq!(store.get("kept").unwrap().as_deref(), Some("secret"));
        assert_eq!(store.get("absent").unwrap(), None);
    }
}

#[test]
fn secrets_with_special_characters_survive() {
    for (store, _dir) in stores() {
        let secret = "ver:1-hint:42-ETMsDgAAAYx\"quoted\"\n\u{00e9}";
        store.save("special", secret).unwrap();
        assert_eq!(store.get("special").unwrap().as_deref(), Some(secret));
    }
}

#[test]
fn concurrent_mixed_operations_do_not_corrupt() {
    for (store, _dir) in stores() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for j in 0..20 {
                        let key = format!("t{}-{}", i, j);
                        store.save(&key, &key).unwrap();
                        assert_eq!(store.get(&key).unwrap().as_deref(), Some(key.as_str()));
                        if j % 2 == 0 {
                            store.remove(&key).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..4 {
            for j in 0..20 {
                let key = format!("t{}-{}", i, j);
                assert_eq!(store.has(&key).unwrap(), j % 2 == 1, "store {}", store.name());
            }
        }
    }
}
