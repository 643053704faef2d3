//! Activating a reference standards version changes the next recommendation.

use lib_naibao::models::StandardEntry;
use lib_naibao::services::{GrowthInput, ServiceError};
use project_tests::{newborn, stack};
use serde_json::json;

const OPERATOR: u64 = 99;

fn milk_by_weight(version: &str, recommended: f64) -> StandardEntry {
    StandardEntry {
        id: 0,
        version: version.to_string(),
        standard_type: "milk_by_weight".to_string(),
        month_min: Some(0),
        month_max: Some(12),
        data: json!({ "min": 120, "max": 160, "recommended": recommended, "unit": "ml/kg/day" }),
        is_active: true,
    }
}

#[tokio::test]
async fn test_activated_coefficient_drives_the_daily_standard() {
    let stack = stack(&[OPERATOR]);
    let services = &stack.services;
    let baby = services.family.create_baby(1, newborn("Doudou", 60)).await.unwrap();
    services
        .growth
        .upsert_record(
            1,
            baby.id,
            GrowthInput {
                record_date: stack.clock.now().date_naive(),
                weight_kg: Some(5.0),
                height_cm: None,
            },
        )
        .await
        .unwrap();

    // built-in 135 ml/kg/day until a version is active
    let before = services.feeding.feeding_stats(1, baby.id).await.unwrap();
    assert_eq!(before.recommended.daily_standard, 675);

    services.standards.import_entry(OPERATOR, milk_by_weight("2025.1", 150.0)).await.unwrap();
    let still = services.feeding.feeding_stats(1, baby.id).await.unwrap();
    assert_eq!(still.recommended.daily_standard, 675);

    services.standards.activate_version(OPERATOR, "2025.1").await.unwrap();
    let after = services.feeding.feeding_stats(1, baby.id).await.unwrap();
    assert_eq!(after.recommended.daily_standard, 750);

    services.standards.import_entry(OPERATOR, milk_by_weight("2025.2", 140.0)).await.unwrap();
    services.standards.activate_version(OPERATOR, "2025.2").await.unwrap();
    let switched = services.feeding.feeding_stats(1, baby.id).await.unwrap();
    assert_eq!(switched.recommended.daily_standard, 700);
    assert_eq!(
        services.standards.versions(OPERATOR).await.unwrap(),
        vec!["2025.1".to_string(), "2025.2".to_string()]
    );
}

#[tokio::test]
async fn test_family_admins_are_not_standards_operators() {
    let stack = stack(&[OPERATOR]);
    let services = &stack.services;
    services.family.create_baby(1, newborn("Doudou", 10)).await.unwrap();

    assert!(matches!(
        services.standards.import_entry(1, milk_by_weight("x", 150.0)).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        services.standards.activate_version(1, "x").await,
        Err(ServiceError::Forbidden(_))
    ));
}
