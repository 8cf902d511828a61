use super::models::{JobType, PlanTier, Tenant, WebhookEvent};
use super::queries::webhook_circuit_open;
use chrono::{Duration, Utc};
use uuid::Uuid;

fn test_tenant(failures: i32, last_success: Option<chrono::DateTime<Utc>>) -> Tenant {
    Tenant {
        id: Uuid::new_v4(),
        name: "acme".into(),
        email: "billing@acme.test".into(),
        transactional_consent: true,
        marketing_consent: false,
        pre_deletion_notice_consent: true,
        brand_color: None,
        brand_logo_url: None,
        brand_footer: None,
        retention_days: None,
        webhook_url: Some("https://acme.test/hooks".into()),
        webhook_secret: Some("s3cr3t".into()),
        webhook_active: true,
        webhook_consecutive_failures: failures,
        webhook_last_success_at: last_success,
        plan_tier: PlanTier::Pro,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn circuit_closed_under_failure_threshold() {
    let tenant = test_tenant(9, None);
    assert!(!webhook_circuit_open(&tenant));
}

#[test]
fn circuit_open_with_no_prior_success() {
    let tenant = test_tenant(10, None);
    assert!(webhook_circuit_open(&tenant));
}

#[test]
fn circuit_open_with_recent_success_still_counted() {
    let tenant = test_tenant(12, Some(Utc::now() - Duration::minutes(5)));
    assert!(webhook_circuit_open(&tenant));
}

#[test]
fn circuit_closes_after_success_window_elapses() {
    let tenant = test_tenant(15, Some(Utc::now() - Duration::minutes(31)));
    assert!(!webhook_circuit_open(&tenant));
}

#[test]
fn plan_tier_priority_ordering_favors_scale() {
    assert!(PlanTier::Scale.priority() < PlanTier::Pro.priority());
    assert!(PlanTier::Pro.priority() < PlanTier::Free.priority());
}

#[test]
fn job_type_extension_matches_format() {
    assert_eq!(JobType::Csv.extension(), "csv");
    assert_eq!(JobType::Json.extension(), "json");
    assert_eq!(JobType::Xlsx.extension(), "xlsx");
}

#[test]
fn webhook_event_as_str_matches_wire_format() {
    assert_eq!(WebhookEvent::ExportCompleted.as_str(), "export.completed");
    assert_eq!(WebhookEvent::ExportFailed.as_str(), "export.failed");
}
