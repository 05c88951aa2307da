use super::*;
use crate::quota::types::Identity;
use crate::testing::TestItem;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

fn controller_with(items: Vec<TestItem>) -> (Arc<MutationController<TestItem>>, SignalBus) {
    let bus = SignalBus::new();
    let controller = MutationController::new(&bus, None);
    controller.replace_collection(items);
    (controller, bus)
}

fn network_error() -> RemoteError {
    RemoteError::transport("connection reset")
}

#[tokio::test]
async fn test_add_is_visible_before_remote_resolves() {
    let (controller, _bus) = controller_with(vec![]);
    let jane = TestItem::named("Jane Doe");

    let observer = Arc::clone(&controller);
    let observed_item = jane.clone();
    let outcome = controller
        .toggle(
            SubjectKey::from("expert-Jane Doe"),
            jane.clone(),
            false,
            move || async move {
                assert!(observer.contains(&observed_item));
                assert!(observer.is_pending(&SubjectKey::from("expert-Jane Doe")));
                Ok(())
            },
            || async { Ok(()) },
        )
        .await;

    assert_eq!(
        outcome,
        ToggleOutcome::Committed {
            direction: MutationDirection::Add
        }
    );
    assert!(controller.contains(&jane));
    assert_eq!(controller.pending_count(), 0);
}

#[tokio::test]
async fn test_failed_add_restores_previous_state() {
    let before = vec![TestItem::named("John Roe")];
    let (controller, _bus) = controller_with(before.clone());

    let outcome = controller
        .toggle(
            SubjectKey::from("expert-Jane Doe"),
            TestItem::named("Jane Doe"),
            false,
            || async { Err(network_error()) },
            || async { Ok(()) },
        )
        .await;

    assert_eq!(
        outcome,
        ToggleOutcome::RolledBack {
            direction: MutationDirection::Add,
            error: network_error(),
        }
    );
    assert_eq!(controller.snapshot(), CollectionState::new(before));
    assert!(!controller.is_pending(&SubjectKey::from("expert-Jane Doe")));
}

#[tokio::test]
async fn test_failed_remove_restores_record_in_place() {
    let before = vec![
        TestItem::named("A"),
        TestItem::named("B"),
        TestItem::named("C"),
    ];
    let (controller, _bus) = controller_with(before.clone());

    let outcome = controller
        .toggle(
            SubjectKey::from("expert-B"),
            TestItem::named("B"),
            true,
            || async { Ok(()) },
            || async { Err(RemoteError::rejected("not allowed")) },
        )
        .await;

    assert!(matches!(outcome, ToggleOutcome::RolledBack { .. }));
    assert_eq!(controller.snapshot().items(), before.as_slice());
}

#[tokio::test]
async fn test_second_toggle_while_pending_is_ignored() {
    let (controller, _bus) = controller_with(vec![]);
    let adds = Arc::new(AtomicUsize::new(0));

    let first_adds = Arc::clone(&adds);
    let second_adds = Arc::clone(&adds);
    let (first, second) = tokio::join!(
        controller.toggle(
            SubjectKey::from("trial-NCT123"),
            TestItem::site("NCT123"),
            false,
            move || async move {
                first_adds.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(())
            },
            || async { Ok(()) },
        ),
        controller.toggle(
            SubjectKey::from("trial-NCT123"),
            TestItem::site("NCT123"),
            false,
            move || async move {
                second_adds.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            || async { Ok(()) },
        ),
    );

    assert!(first.is_committed());
    assert_eq!(second, ToggleOutcome::Skipped(SkipReason::AlreadyPending));
    assert_eq!(adds.load(Ordering::SeqCst), 1);
    assert_eq!(controller.snapshot().len(), 1);
}

#[tokio::test]
async fn test_rollback_keeps_other_subjects_changes() {
    let (controller, _bus) = controller_with(vec![TestItem::named("Existing")]);
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let (slow, fast, _) = tokio::join!(
        controller.toggle(
            SubjectKey::from("expert-Slow"),
            TestItem::named("Slow"),
            false,
            move || async move {
                let _ = release_rx.await;
                Err(network_error())
            },
            || async { Ok(()) },
        ),
        controller.toggle(
            SubjectKey::from("expert-Fast"),
            TestItem::named("Fast"),
            false,
            || async { Ok(()) },
            || async { Ok(()) },
        ),
        async move {
            let _ = release_tx.send(());
        },
    );

    assert!(matches!(slow, ToggleOutcome::RolledBack { .. }));
    assert!(fast.is_committed());
    assert_eq!(
        controller.snapshot().items(),
        &[TestItem::named("Existing"), TestItem::named("Fast")]
    );
}

#[tokio::test]
async fn test_identity_change_discards_in_flight_response() {
    let (controller, bus) = controller_with(vec![TestItem::named("Existing")]);
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let (outcome, _) = tokio::join!(
        controller.toggle(
            SubjectKey::from("expert-Jane Doe"),
            TestItem::named("Jane Doe"),
            false,
            move || async move {
                let _ = release_rx.await;
                Err(network_error())
            },
            || async { Ok(()) },
        ),
        async {
            bus.publish(Signal::IdentityChanged(Identity::Authenticated));
            let _ = release_tx.send(());
        },
    );

    assert_eq!(outcome, ToggleOutcome::Skipped(SkipReason::Stale));
    assert!(controller.snapshot().is_empty());
    assert_eq!(controller.pending_count(), 0);
}

#[tokio::test]
async fn test_refresh_absorbs_server_enrichment() {
    let (controller, _bus) = controller_with(vec![]);
    let enriched = TestItem {
        server_id: Some("fav-1".to_string()),
        ..TestItem::named("Jane Doe")
    };

    let server_copy = enriched.clone();
    let outcome = controller
        .toggle_with_refresh(
            SubjectKey::from("expert-Jane Doe"),
            TestItem::named("Jane Doe"),
            false,
            || async { Ok(()) },
            || async { Ok(()) },
            move || async move { Ok(vec![server_copy]) },
        )
        .await;

    assert!(outcome.is_committed());
    assert_eq!(controller.snapshot().items(), &[enriched]);
}

#[tokio::test]
async fn test_failed_refresh_keeps_committed_state() {
    let (controller, _bus) = controller_with(vec![]);

    let outcome = controller
        .toggle_with_refresh(
            SubjectKey::from("expert-Jane Doe"),
            TestItem::named("Jane Doe"),
            false,
            || async { Ok(()) },
            || async { Ok(()) },
            || async { Err(network_error()) },
        )
        .await;

    assert!(outcome.is_committed());
    assert!(controller.contains(&TestItem::named("Jane Doe")));
}

#[tokio::test]
async fn test_view_watchers_see_optimistic_state() {
    let (controller, _bus) = controller_with(vec![]);
    let mut view_rx = controller.subscribe_view();

    let watcher = view_rx.clone();
    controller
        .toggle(
            SubjectKey::from("publication-42"),
            TestItem {
                id: Some(42),
                ..TestItem::default()
            },
            false,
            move || async move {
                assert_eq!(watcher.borrow().len(), 1);
                Err(network_error())
            },
            || async { Ok(()) },
        )
        .await;

    assert!(view_rx.has_changed().unwrap());
    assert!(view_rx.borrow_and_update().is_empty());
}

#[test]
fn test_replace_collection_waits_for_in_flight_changes() {
    let (controller, _bus) = controller_with(vec![]);
    controller.begin(
        &SubjectKey::from("expert-A"),
        TestItem::named("A"),
        MutationDirection::Add,
    );

    assert!(!controller.replace_collection(vec![TestItem::named("B")]));
    assert!(controller.contains(&TestItem::named("A")));
}

fn arb_item() -> impl Strategy<Value = TestItem> {
    (
        proptest::option::of("[a-c]{1,2}"),
        proptest::option::of(0u64..4),
        proptest::option::of("S[0-3]"),
    )
        .prop_map(|(name, id, site_id)| TestItem {
            name,
            id,
            site_id,
            server_id: None,
        })
}

proptest! {
    #[test]
    fn prop_failed_toggle_restores_collection(
        initial in proptest::collection::vec(arb_item(), 0..6),
        candidate in arb_item(),
        currently_member in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let (controller, _bus) = controller_with(initial);
        let before = controller.snapshot();

        let outcome = runtime.block_on(controller.toggle(
            SubjectKey::from("subject"),
            candidate,
            currently_member,
            || async { Err(network_error()) },
            || async { Err(network_error()) },
        ));

        prop_assert!(
            matches!(outcome, ToggleOutcome::RolledBack { .. }),
            "unexpected outcome"
        );
        prop_assert_eq!(controller.snapshot(), before);
        prop_assert_eq!(controller.pending_count(), 0);
    }
}
