mod common;

use common::{clinician_ctx, fields, message, patient_ctx, payload, service, system_ctx};
use serde_json::json;
use uuid::Uuid;

use messages_service::error::AppError;
use messages_service::identity::UserType;
use messages_service::models::MessageType;
use messages_service::repository::MessageRepository;

#[tokio::test]
async fn create_round_trips_through_get_by_uuid() {
    let (svc, _) = service();
    let ctx = patient_ctx("p1");
    let created = svc
        .create(&ctx, &payload("p1", "patient", "l1", "location", 0))
        .await
        .unwrap();

    let fetched = svc.get_by_uuid(created.uuid).await.unwrap();
    assert_eq!(fetched.sender, "p1");
    assert_eq!(fetched.sender_type, UserType::Patient);
    assert_eq!(fetched.receiver, "l1");
    assert_eq!(fetched.receiver_type, UserType::Location);
    assert_eq!(fetched.message_type.value, 0);
    assert_eq!(fetched.content, "please call back");
    assert_eq!(fetched.created_by, "p1");
    assert!(!fetched.created.is_empty());
    assert!(!fetched.modified.is_empty());
}

#[tokio::test]
async fn create_rejects_unknown_fields() {
    let (svc, _) = service();
    let mut body = payload("p1", "patient", "l1", "location", 0);
    body.insert("surprise".into(), json!("x"));
    let err = svc.create(&patient_ctx("p1"), &body).await.unwrap_err();
    assert!(matches!(err, AppError::UnknownField(f) if f == "surprise"));
}

#[tokio::test]
async fn create_rejects_missing_or_empty_required_fields() {
    let (svc, _) = service();
    let ctx = patient_ctx("p1");

    let mut body = payload("p1", "patient", "l1", "location", 0);
    body.remove("content");
    let err = svc.create(&ctx, &body).await.unwrap_err();
    assert!(matches!(err, AppError::MissingRequiredField(f) if f == "content"));

    let mut body = payload("p1", "patient", "l1", "location", 0);
    body.insert("content".into(), json!(""));
    let err = svc.create(&ctx, &body).await.unwrap_err();
    assert!(matches!(err, AppError::MissingRequiredField(f) if f == "content"));

    let mut body = payload("p1", "patient", "l1", "location", 0);
    body.insert("sender".into(), json!(null));
    let err = svc.create(&ctx, &body).await.unwrap_err();
    assert!(matches!(err, AppError::MissingRequiredField(f) if f == "sender"));
}

#[tokio::test]
async fn create_rejects_empty_optional_fields() {
    let (svc, _) = service();
    let mut body = payload("p1", "patient", "l1", "location", 0);
    body.insert("internal".into(), json!(""));
    let err = svc.create(&patient_ctx("p1"), &body).await.unwrap_err();
    assert!(matches!(err, AppError::EmptyField(f) if f == "internal"));
}

#[tokio::test]
async fn create_rejects_unknown_message_type_codes() {
    let (svc, _) = service();
    // 4 is the retired urgent callback slot
    let body = payload("p1", "patient", "l1", "location", 4);
    let err = svc.create(&patient_ctx("p1"), &body).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidMessageType(_)));

    let mut body = payload("p1", "patient", "l1", "location", 0);
    body.insert("message_type".into(), json!({"code": 0}));
    let err = svc.create(&patient_ctx("p1"), &body).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidMessageType(_)));
}

#[tokio::test]
async fn create_accepts_optional_fields() {
    let (svc, _) = service();
    let mut body = payload("c1", "clinician", "p1", "patient", 5);
    body.insert("internal".into(), json!("triage"));
    body.insert("retrieved".into(), json!("2024-06-01T09:00:00+01:00"));
    let dto = svc
        .create(&clinician_ctx("c1", ""), &body)
        .await
        .unwrap();
    assert_eq!(dto.internal.as_deref(), Some("triage"));
    assert_eq!(dto.retrieved.as_deref(), Some("2024-06-01T09:00:00+01:00"));
    assert!(dto.confirmed.is_none());
}

#[tokio::test]
async fn get_by_uuid_misses_unknown_and_soft_deleted_messages() {
    let (svc, repo) = service();
    assert!(matches!(
        svc.get_by_uuid(Uuid::new_v4()).await.unwrap_err(),
        AppError::NotFound
    ));

    let msg = message("p1", UserType::Patient, "l1", UserType::Location, MessageType::General, 0);
    let uuid = msg.uuid;
    repo.insert(msg).await.unwrap();
    svc.delete(uuid).await.unwrap();
    assert!(matches!(
        svc.get_by_uuid(uuid).await.unwrap_err(),
        AppError::NotFound
    ));
}

#[tokio::test]
async fn update_validates_payload_shape() {
    let (svc, _) = service();
    let ctx = patient_ctx("p1");
    let created = svc
        .create(&ctx, &payload("p1", "patient", "l1", "location", 0))
        .await
        .unwrap();

    let err = svc.update(&ctx, created.uuid, &fields(json!({}))).await.unwrap_err();
    assert!(matches!(err, AppError::EmptyUpdate));

    let err = svc
        .update(&ctx, created.uuid, &fields(json!({"sender": "x"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NonUpdatableField(f) if f == "sender"));

    // message_type is settable at creation only
    let err = svc
        .update(&ctx, created.uuid, &fields(json!({"message_type": {"value": 1}})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NonUpdatableField(f) if f == "message_type"));

    let err = svc
        .update(&ctx, Uuid::new_v4(), &fields(json!({"internal": "x"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn update_rejects_empty_and_null_timestamps() {
    let (svc, _) = service();
    let ctx = patient_ctx("p1");
    let created = svc
        .create(&ctx, &payload("p1", "patient", "l1", "location", 0))
        .await
        .unwrap();

    for bad in [json!({"retrieved": ""}), json!({"retrieved": null})] {
        let err = svc.update(&ctx, created.uuid, &fields(bad)).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyField(f) if f == "retrieved"));
    }
    let err = svc
        .update(&ctx, created.uuid, &fields(json!({"confirmed": 12345})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTimestamp { .. }));
}

#[tokio::test]
async fn update_related_message_must_reference_another_existing_message() {
    let (svc, _) = service();
    let ctx = patient_ctx("p1");
    let first = svc
        .create(&ctx, &payload("p1", "patient", "l1", "location", 0))
        .await
        .unwrap();
    let second = svc
        .create(&ctx, &payload("p1", "patient", "l1", "location", 0))
        .await
        .unwrap();

    // self-reference
    let err = svc
        .update(
            &ctx,
            first.uuid,
            &fields(json!({"related_message": first.uuid.to_string()})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRelatedMessage(_)));

    // nonexistent target
    let err = svc
        .update(
            &ctx,
            first.uuid,
            &fields(json!({"related_message": Uuid::new_v4().to_string()})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRelatedMessage(_)));

    // valid reference round-trips
    svc.update(
        &ctx,
        first.uuid,
        &fields(json!({"related_message": second.uuid.to_string()})),
    )
    .await
    .unwrap();
    let fetched = svc.get_by_uuid(first.uuid).await.unwrap();
    assert_eq!(fetched.related_message, Some(second.uuid));
}

#[tokio::test]
async fn update_splits_and_rejoins_zoned_timestamps() {
    let (svc, _) = service();
    let ctx = patient_ctx("p1");
    let created = svc
        .create(&ctx, &payload("p1", "patient", "l1", "location", 0))
        .await
        .unwrap();

    svc.update(
        &ctx,
        created.uuid,
        &fields(json!({"confirmed": "2024-06-01T18:15:00+05:30", "confirmed_by": "c1"})),
    )
    .await
    .unwrap();
    let fetched = svc.get_by_uuid(created.uuid).await.unwrap();
    assert_eq!(fetched.confirmed.as_deref(), Some("2024-06-01T18:15:00+05:30"));
    assert_eq!(fetched.confirmed_by.as_deref(), Some("c1"));
}

#[tokio::test]
async fn sender_listing_requires_a_resolved_role() {
    let (svc, repo) = service();
    repo.insert(message("p1", UserType::Patient, "l1", UserType::Location, MessageType::General, 0))
        .await
        .unwrap();

    let found = svc.get_by_sender(&patient_ctx("p1"), "p1").await.unwrap();
    assert_eq!(found.len(), 1);

    // system claims resolve no role for the id, so nothing is visible
    let found = svc.get_by_sender(&system_ctx("s1"), "p1").await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn receiver_listing_applies_the_role_only_when_resolved() {
    let (svc, repo) = service();
    repo.insert(message("p1", UserType::Patient, "x1", UserType::Location, MessageType::General, 0))
        .await
        .unwrap();
    repo.insert(message("p2", UserType::Patient, "x1", UserType::Clinician, MessageType::General, 1))
        .await
        .unwrap();

    // unresolved role: both rows, newest first
    let found = svc.get_by_receiver(&system_ctx("s1"), "x1").await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].sender, "p1");

    // location role resolved via header: only the location-typed row
    let found = svc
        .get_by_receiver(&clinician_ctx("c1", "x1"), "x1")
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].receiver_type, UserType::Location);
}

#[tokio::test]
async fn callback_messages_stay_active_until_cancelled() {
    let (svc, _) = service();
    let ctx = patient_ctx("p1");
    let callback = svc
        .create(&ctx, &payload("p1", "patient", "l1", "location", 5))
        .await
        .unwrap();

    // confirmed callbacks remain in the active view
    svc.update(
        &ctx,
        callback.uuid,
        &fields(json!({"confirmed": "2024-06-01T10:00:00+00:00"})),
    )
    .await
    .unwrap();
    let active = svc.get_active_by_sender(&ctx, "p1").await.unwrap();
    assert_eq!(active.len(), 1);

    // but a confirmed general message does not
    let general = svc
        .create(&ctx, &payload("p1", "patient", "l1", "location", 0))
        .await
        .unwrap();
    svc.update(
        &ctx,
        general.uuid,
        &fields(json!({"confirmed": "2024-06-01T10:00:00+00:00"})),
    )
    .await
    .unwrap();
    let active = svc.get_active_by_sender(&ctx, "p1").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].uuid, callback.uuid);
}

#[tokio::test]
async fn active_callbacks_by_receiver_drop_cancelled_entries() {
    let (svc, _) = service();
    let ctx = patient_ctx("p1");
    let callback = svc
        .create(&ctx, &payload("p1", "patient", "l1", "location", 5))
        .await
        .unwrap();

    let active = svc.get_active_callbacks_by_receiver("l1").await.unwrap();
    assert_eq!(active.len(), 1);

    svc.update(
        &ctx,
        callback.uuid,
        &fields(json!({"cancelled": "2024-06-01T10:00:00+00:00", "cancelled_by": "c1"})),
    )
    .await
    .unwrap();
    let active = svc.get_active_callbacks_by_receiver("l1").await.unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn pair_listing_is_exact_and_active_variant_respects_the_pair() {
    let (svc, repo) = service();
    // unconfirmed message on an unrelated pair
    repo.insert(message("p2", UserType::Patient, "l2", UserType::Location, MessageType::General, 5))
        .await
        .unwrap();
    repo.insert(message("p1", UserType::Patient, "l1", UserType::Location, MessageType::General, 0))
        .await
        .unwrap();

    let found = svc.get_by_sender_and_receiver("p1", "l1").await.unwrap();
    assert_eq!(found.len(), 1);

    // the unrelated unconfirmed message must not leak into the active pair view
    let active = svc.get_active_by_sender_and_receiver("p1", "l1").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].sender, "p1");
}

#[tokio::test]
async fn alerts_are_hidden_from_the_combined_lookup_but_not_pair_lookups() {
    let (svc, repo) = service();
    repo.insert(message("p1", UserType::Patient, "c1", UserType::Clinician, MessageType::RedAlert, 0))
        .await
        .unwrap();
    repo.insert(message("p1", UserType::Patient, "c1", UserType::Clinician, MessageType::General, 1))
        .await
        .unwrap();

    let combined = svc
        .get_by_sender_or_receiver(&patient_ctx("p1"), "p1")
        .await
        .unwrap();
    assert_eq!(combined.len(), 1);
    assert_eq!(combined[0].message_type.value, 0);

    let pair = svc.get_by_sender_and_receiver("p1", "c1").await.unwrap();
    assert_eq!(pair.len(), 2);
}

#[tokio::test]
async fn patient_traffic_is_visible_to_any_clinician() {
    let (svc, repo) = service();
    // p1 <-> clinician c1 and p1 <-> clinician c2
    repo.insert(message("p1", UserType::Patient, "c1", UserType::Clinician, MessageType::General, 0))
        .await
        .unwrap();
    repo.insert(message("c2", UserType::Clinician, "p1", UserType::Patient, MessageType::General, 1))
        .await
        .unwrap();

    // c3 was party to neither message; patient traffic resolves anyway
    let found = svc
        .get_by_sender_or_receiver(&clinician_ctx("c3", ""), "p1")
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn clinician_fallback_limits_other_clinician_traffic_to_their_own() {
    let (svc, repo) = service();
    // c2's traffic with c1 and with an unrelated clinician c9
    repo.insert(message("c2", UserType::Clinician, "c1", UserType::Clinician, MessageType::General, 0))
        .await
        .unwrap();
    repo.insert(message("c2", UserType::Clinician, "c9", UserType::Clinician, MessageType::General, 1))
        .await
        .unwrap();
    // c2's traffic with location l1
    repo.insert(message("l1", UserType::Location, "c2", UserType::Clinician, MessageType::General, 2))
        .await
        .unwrap();

    let found = svc
        .get_by_sender_or_receiver(&clinician_ctx("c1", "l1"), "c2")
        .await
        .unwrap();
    let senders: Vec<&str> = found.iter().map(|m| m.sender.as_str()).collect();
    assert_eq!(found.len(), 2);
    assert!(senders.contains(&"c2"));
    assert!(senders.contains(&"l1"));
    assert!(!found.iter().any(|m| m.receiver == "c9"));
}

#[tokio::test]
async fn system_identities_see_the_plain_union() {
    let (svc, repo) = service();
    repo.insert(message("x1", UserType::System, "c1", UserType::Clinician, MessageType::RedAlert, 0))
        .await
        .unwrap();
    repo.insert(message("c1", UserType::Clinician, "x1", UserType::System, MessageType::General, 1))
        .await
        .unwrap();

    let found = svc
        .get_by_sender_or_receiver(&system_ctx("any-system"), "x1")
        .await
        .unwrap();
    // unrestricted: both rows, alerts included
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn combined_lookup_without_identity_basis_is_forbidden() {
    let (svc, _) = service();
    let ctx = messages_service::identity::IdentityContext::new(Default::default(), None);
    let err = svc.get_by_sender_or_receiver(&ctx, "p1").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
}

#[tokio::test]
async fn active_callbacks_for_patients_keep_only_patients_with_a_standing_callback() {
    let (svc, _) = service();
    let p1 = patient_ctx("p1");
    let p2 = patient_ctx("p2");
    svc.create(&p1, &payload("p1", "patient", "l1", "location", 5))
        .await
        .unwrap();
    // p2's callback is already confirmed
    let confirmed = svc
        .create(&p2, &payload("p2", "patient", "l1", "location", 5))
        .await
        .unwrap();
    svc.update(
        &p2,
        confirmed.uuid,
        &fields(json!({"confirmed": "2024-06-01T10:00:00+00:00"})),
    )
    .await
    .unwrap();

    let callbacks = svc
        .get_active_callbacks_for_patients(&["p1".to_string(), "p2".to_string()])
        .await
        .unwrap();
    assert_eq!(callbacks.len(), 1);
    assert!(callbacks.contains_key("p1"));
}

#[tokio::test]
async fn active_callbacks_for_patients_return_the_most_recent_per_sender() {
    let (svc, repo) = service();
    let older = message("p1", UserType::Patient, "l1", UserType::Location, MessageType::Callback, 60);
    let newer = message("p1", UserType::Patient, "l1", UserType::Location, MessageType::Callback, 1);
    let newer_uuid = newer.uuid;
    repo.insert(older).await.unwrap();
    repo.insert(newer).await.unwrap();

    let callbacks = svc
        .get_active_callbacks_for_patients(&["p1".to_string()])
        .await
        .unwrap();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks["p1"].uuid, newer_uuid);
}

#[tokio::test]
async fn soft_deleted_messages_vanish_from_listings() {
    let (svc, repo) = service();
    let msg = message("p1", UserType::Patient, "l1", UserType::Location, MessageType::General, 0);
    let uuid = msg.uuid;
    repo.insert(msg).await.unwrap();

    assert_eq!(svc.get_by_sender(&patient_ctx("p1"), "p1").await.unwrap().len(), 1);
    svc.delete(uuid).await.unwrap();
    assert!(svc.get_by_sender(&patient_ctx("p1"), "p1").await.unwrap().is_empty());
}

#[tokio::test]
async fn bulk_seeding_accepts_builtin_fields() {
    let repo = std::sync::Arc::new(
        messages_service::repository::memory::InMemoryMessageRepository::new(),
    );
    let svc = messages_service::service::MessageService::new(repo).with_builtin_fields(true);
    let ctx = system_ctx("seeder");

    let known = Uuid::new_v4();
    let mut seeded = payload("p1", "patient", "l1", "location", 0);
    seeded.insert("uuid".into(), json!(known.to_string()));
    seeded.insert("created".into(), json!("2024-01-01T00:00:00+00:00"));
    seeded.insert("created_by".into(), json!("fixtures"));

    svc.create_many(&ctx, &[seeded, payload("p2", "patient", "l1", "location", 0)])
        .await
        .unwrap();

    let fetched = svc.get_by_uuid(known).await.unwrap();
    assert_eq!(fetched.created_by, "fixtures");
    assert_eq!(fetched.created, "2024-01-01T00:00:00Z");
}

#[tokio::test]
async fn builtin_fields_are_rejected_without_the_seeding_flag() {
    let (svc, _) = service();
    let mut body = payload("p1", "patient", "l1", "location", 0);
    body.insert("uuid".into(), json!(Uuid::new_v4().to_string()));
    let err = svc.create(&patient_ctx("p1"), &body).await.unwrap_err();
    assert!(matches!(err, AppError::UnknownField(f) if f == "uuid"));
}
