use proptest::prelude::*;

use crate::registry::{Registry, RegistryError, UserHandle};
use crate::session::ConnId;

fn handle(conn: ConnId) -> UserHandle {
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    UserHandle { conn, tx }
}

proptest! {
    // Every login with a distinct name succeeds and the registry size
    // equals the number of successful logins.
    #[test]
    fn distinct_names_all_register(
        names in prop::collection::hash_set("[a-z]{1,12}", 1..32)
    ) {
        let registry = Registry::new();

        for (i, name) in names.iter().enumerate() {
            let roster = registry.register(name, handle(i as ConnId)).unwrap();
            prop_assert_eq!(roster.len(), i);
        }

        prop_assert_eq!(registry.len(), names.len());
        for name in &names {
            prop_assert!(registry.lookup(name).is_some());
        }
    }

    // A second claim on any registered name fails and changes nothing.
    #[test]
    fn taken_names_are_rejected(
        names in prop::collection::hash_set("[a-z]{1,12}", 1..16),
        pick in any::<prop::sample::Index>()
    ) {
        let registry = Registry::new();
        for (i, name) in names.iter().enumerate() {
            registry.register(name, handle(i as ConnId)).unwrap();
        }

        let taken: Vec<&String> = names.iter().collect();
        let victim = taken[pick.index(taken.len())];
        let before = registry.len();

        prop_assert_eq!(
            registry.register(victim, handle(999)).unwrap_err(),
            RegistryError::NameTaken
        );
        prop_assert_eq!(registry.len(), before);
        prop_assert_ne!(registry.lookup(victim).unwrap().conn, 999);
    }

    // snapshot_names never contains the excluded name and contains
    // everything else exactly once.
    #[test]
    fn snapshot_excludes_exactly_one_name(
        names in prop::collection::hash_set("[a-z]{1,12}", 1..16),
        pick in any::<prop::sample::Index>()
    ) {
        let registry = Registry::new();
        for (i, name) in names.iter().enumerate() {
            registry.register(name, handle(i as ConnId)).unwrap();
        }

        let all: Vec<&String> = names.iter().collect();
        let own = all[pick.index(all.len())];

        let mut snapshot = registry.snapshot_names(own);
        snapshot.sort();
        let mut expected: Vec<String> =
            names.iter().filter(|n| *n != own).cloned().collect();
        expected.sort();
        prop_assert_eq!(snapshot, expected);
    }

    // Register/remove round trips leave the registry empty; removal is
    // idempotent.
    #[test]
    fn remove_round_trip(
        names in prop::collection::hash_set("[a-z]{1,12}", 1..16)
    ) {
        let registry = Registry::new();
        for (i, name) in names.iter().enumerate() {
            registry.register(name, handle(i as ConnId)).unwrap();
        }

        for name in &names {
            prop_assert!(registry.remove(name).is_some());
            prop_assert!(registry.remove(name).is_none());
        }
        prop_assert!(registry.is_empty());
    }
}
