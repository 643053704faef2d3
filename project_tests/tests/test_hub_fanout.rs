//! Fan-out isolation over arbitrary session layouts.

use lib_naibao::core::{BroadcastTarget, Hub, HubConfig};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_broadcast_reaches_exactly_the_babys_sessions(
        babies in prop::collection::vec(1u64..5, 1..12),
        target in 1u64..5,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (hub, _task) = Hub::spawn(HubConfig::default(), CancellationToken::new());
            let mut registrations = Vec::new();
            for (user, baby) in babies.iter().enumerate() {
                registrations.push(hub.register(user as u64 + 1, *baby).await.unwrap());
            }

            hub.broadcast_to_baby(target, "ping").await.unwrap();
            // a count is answered after every earlier command has been applied
            let expected = babies.iter().filter(|b| **b == target).count();
            prop_assert_eq!(hub.session_count(BroadcastTarget::Baby(target)).await.unwrap(), expected);

            for registration in registrations.iter_mut() {
                let got = registration.outbound.try_recv().ok();
                if registration.baby_id == target {
                    prop_assert_eq!(got.as_deref(), Some(&b"ping"[..]));
                } else {
                    prop_assert!(got.is_none());
                }
            }
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_unregister_twice_and_late_broadcasts() {
    let (hub, _task) = Hub::spawn(HubConfig::default(), CancellationToken::new());
    let mut registration = hub.register(1, 1).await.unwrap();

    assert!(hub.unregister(registration.id).await.unwrap());
    assert!(!hub.unregister(registration.id).await.unwrap());
    hub.broadcast_to_baby(1, "late").await.unwrap();
    assert_eq!(hub.session_count(BroadcastTarget::All).await.unwrap(), 0);
    assert_eq!(registration.outbound.recv().await, None);
}
