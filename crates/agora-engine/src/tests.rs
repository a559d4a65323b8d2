use std::sync::Arc;

use agora_core::canonical::{CanonicalEvent, CanonicalGroup, EventKind, EventStatus};
use agora_core::envelope::{DomainEvent, event_type};
use agora_core::fmt::BoxedErrorResult;
use agora_core::id::{BadgeId, GroupId, UserId};
use agora_core::{Platform, Timestamp, payload};
use agora_db::{
    AchievementRecord, ClaimLinkRecord, Database, GroupRecord, PlatformConnection, ProgressMode,
    RsvpStatus, SyncConfig,
};
use agora_providers::{
    FetchOpts, FetchOutcome, FetchResult, ProviderAdapter, ProviderEnv, ProviderRegistry,
};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::dispatch::EventHandler as _;
use crate::{
    AchievementEngine, BusReceiver, ClaimService, FavoritesService, NotificationRelayer,
    Notifier, RsvpService, ServiceError, SyncOpts, SyncService, bus_channel,
};

/// Adapter whose responses are set by the test.
struct StubAdapter {
    outcome: Mutex<FetchOutcome>,
}

impl StubAdapter {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(FetchOutcome::default()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn platform(&self) -> Platform {
        Platform::Meetup
    }

    fn display_name(&self) -> &'static str {
        "Stub"
    }

    fn is_configured(&self, _env: &ProviderEnv) -> bool {
        true
    }

    async fn initialize(&self, _env: &ProviderEnv) -> FetchResult<()> {
        Ok(())
    }

    async fn fetch_events(
        &self,
        _platform_id: &str,
        _opts: &FetchOpts,
    ) -> FetchResult<FetchOutcome> {
        Ok(self.outcome.lock().await.clone())
    }

    async fn fetch_group(&self, _platform_id: &str) -> FetchResult<Option<CanonicalGroup>> {
        Ok(self.outcome.lock().await.group.clone())
    }
}

fn test_group(slug: &str) -> GroupRecord {
    GroupRecord {
        slug: slug.to_string(),
        name: slug.to_string(),
        description: None,
        connections: vec![PlatformConnection {
            platform: Platform::Meetup,
            platform_id: slug.to_string(),
            slug: slug.to_string(),
            link: None,
            active: true,
            last_sync_at: None,
            last_error: None,
        }],
        member_count: 0,
        photo_url: None,
        display: true,
        featured: false,
        tags: vec![],
        social_links: Default::default(),
        sync: SyncConfig {
            active: true,
            last_sync_at: None,
            last_error: None,
        },
        badge_limits: Default::default(),
        created_at: Timestamp::from(0),
    }
}

fn future_event(platform_id: &str, offset_secs: u64) -> CanonicalEvent {
    CanonicalEvent {
        platform_id: platform_id.to_string(),
        platform: Platform::Meetup,
        title: format!("Event {platform_id}"),
        description: None,
        event_url: format!("https://example.com/{platform_id}"),
        photo_url: None,
        start_time: Timestamp::now().saturating_add_secs(offset_secs),
        end_time: None,
        timezone: "America/New_York".to_string(),
        duration: None,
        status: EventStatus::Active,
        kind: EventKind::Physical,
        rsvp_count: 0,
        max_attendees: None,
        venue: None,
    }
}

fn drain_bus(rx: &mut BusReceiver) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn sync_fixture() -> BoxedErrorResult<(
    Arc<Database>,
    Arc<StubAdapter>,
    SyncService,
    BusReceiver,
    GroupId,
)> {
    let db = Arc::new(Database::new_in_memory().await?);
    let group_id = GroupId::random();
    db.insert_group(group_id, test_group("rustaceans")).await?;

    let stub = Arc::new(StubAdapter::new());
    let mut registry = ProviderRegistry::new();
    registry.register(stub.clone());

    let (bus_tx, bus_rx) = bus_channel(64);
    let sync = SyncService::new(
        db.clone(),
        Arc::new(registry),
        ProviderEnv::default(),
        bus_tx,
    );
    Ok((db, stub, sync, bus_rx, group_id))
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn sync_infers_deletion_of_vanished_future_events() -> BoxedErrorResult<()> {
    let (db, stub, sync, mut bus_rx, group_id) = sync_fixture().await?;

    // Seed three future active events upstream.
    *stub.outcome.lock().await = FetchOutcome {
        group: None,
        events: vec![
            future_event("x", 3_600),
            future_event("y", 7_200),
            future_event("z", 10_800),
        ],
    };
    let first = sync.sync_group(group_id).await?;
    assert!(first.success);
    assert_eq!(first.events_created, 3);

    let synced = drain_bus(&mut bus_rx);
    assert!(synced.iter().any(|e| e.event_type == event_type::EVENTS_SYNCED));

    // Upstream now only returns x and y.
    *stub.outcome.lock().await = FetchOutcome {
        group: None,
        events: vec![future_event("x", 3_600), future_event("y", 7_200)],
    };
    let second = sync.sync_group(group_id).await?;
    assert!(second.success);
    assert_eq!(second.events_created, 0);
    assert_eq!(second.events_updated, 2);
    assert_eq!(second.events_deleted, 1);

    let (_, z_record) = db
        .read_with(|tx| Database::get_event_by_platform_tx(tx, Platform::Meetup, "z"))
        .await?
        .expect("z exists");
    assert_eq!(z_record.status, EventStatus::Cancelled);

    // The deletion is an announced shape change.
    let synced = drain_bus(&mut bus_rx);
    assert!(synced.iter().any(|e| e.event_type == event_type::EVENTS_SYNCED));

    // A third, unchanged sync is silent.
    let third = sync.sync_group(group_id).await?;
    assert_eq!(third.events_created, 0);
    assert_eq!(third.events_deleted, 0);
    let synced = drain_bus(&mut bus_rx);
    assert!(!synced.iter().any(|e| e.event_type == event_type::EVENTS_SYNCED));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn sync_all_reports_partial_failure_and_completes() -> BoxedErrorResult<()> {
    let (_db, stub, sync, mut bus_rx, _group_id) = sync_fixture().await?;

    *stub.outcome.lock().await = FetchOutcome {
        group: None,
        events: vec![future_event("a", 3_600)],
    };

    let result = sync.sync_all_groups(&SyncOpts::default()).await?;
    assert!(result.success);
    assert_eq!(result.total, 1);
    assert_eq!(result.succeeded, 1);

    let events = drain_bus(&mut bus_rx);
    assert!(
        events
            .iter()
            .any(|e| e.event_type == event_type::SYNC_COMPLETED)
    );
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn counter_achievement_awards_badge_once() -> BoxedErrorResult<()> {
    let db = Arc::new(Database::new_in_memory().await?);
    db.upsert_achievement(
        "first_checkin",
        AchievementRecord {
            name: "First Check-in".to_string(),
            description: None,
            icon: Some("star".to_string()),
            color: Some("#ff7a00".to_string()),
            target_value: 1,
            badge_slug: Some("first-checkin-badge".to_string()),
            entitlement: None,
            points: 10,
            event_type: Some(event_type::EVENT_CHECKIN.to_string()),
            conditions: None,
            progress_mode: ProgressMode::Counter,
            gauge_field: None,
            hidden: false,
            enabled: true,
        },
    )
    .await?;

    let (bus_tx, mut bus_rx) = bus_channel(64);
    let engine = AchievementEngine::new(db.clone(), bus_tx);

    let user = UserId::random();
    let checkin = DomainEvent::new(
        event_type::EVENT_CHECKIN,
        payload! { "userId" => user.to_string() },
    )
    .with_user(user);

    engine.begin_batch().await;
    engine.handle(&checkin).await.expect("handled");
    engine.end_batch().await;

    let progress = db.get_progress(user, "first_checkin").await?.expect("row");
    assert_eq!(progress.current_value, 1);
    assert!(progress.completed_at.is_some());

    let badges = db.list_user_badges(user).await?;
    assert_eq!(badges.len(), 1);
    assert_eq!(badges[0].1.slug, "first-checkin-badge");

    let emitted = drain_bus(&mut bus_rx);
    let types: Vec<&str> = emitted.iter().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&event_type::ACHIEVEMENT_UNLOCKED));
    assert!(types.contains(&event_type::BADGE_ISSUED));
    assert!(types.contains(&event_type::USER_SCORE_CHANGED));

    // At-least-once delivery: reprocessing the same event changes nothing.
    engine.begin_batch().await;
    engine.handle(&checkin).await.expect("handled");
    engine.end_batch().await;

    let progress = db.get_progress(user, "first_checkin").await?.expect("row");
    assert_eq!(progress.current_value, 1);
    assert_eq!(db.list_user_badges(user).await?.len(), 1);
    let emitted = drain_bus(&mut bus_rx);
    assert!(emitted.is_empty());
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn gauge_achievement_latches_and_never_uncompletes() -> BoxedErrorResult<()> {
    let db = Arc::new(Database::new_in_memory().await?);
    db.upsert_achievement(
        "score_100",
        AchievementRecord {
            name: "Century".to_string(),
            description: None,
            icon: None,
            color: None,
            target_value: 100,
            badge_slug: None,
            entitlement: None,
            points: 0,
            event_type: Some(event_type::USER_SCORE_CHANGED.to_string()),
            conditions: None,
            progress_mode: ProgressMode::Gauge,
            gauge_field: Some("totalScore".to_string()),
            hidden: false,
            enabled: true,
        },
    )
    .await?;

    let (bus_tx, mut bus_rx) = bus_channel(64);
    let engine = AchievementEngine::new(db.clone(), bus_tx);
    let user = UserId::random();

    let score_event = |score: u64| {
        DomainEvent::new(
            event_type::USER_SCORE_CHANGED,
            payload! { "userId" => user.to_string(), "totalScore" => score },
        )
        .with_user(user)
    };

    engine.begin_batch().await;
    engine.handle(&score_event(80)).await.expect("handled");
    let progress = db.get_progress(user, "score_100").await?.expect("row");
    assert_eq!(progress.current_value, 80);
    assert!(progress.completed_at.is_none());
    assert!(drain_bus(&mut bus_rx).is_empty());

    engine.handle(&score_event(120)).await.expect("handled");
    let progress = db.get_progress(user, "score_100").await?.expect("row");
    assert_eq!(progress.current_value, 120);
    assert!(progress.completed_at.is_some());
    let emitted = drain_bus(&mut bus_rx);
    assert!(
        emitted
            .iter()
            .any(|e| e.event_type == event_type::ACHIEVEMENT_UNLOCKED)
    );

    // A lower snapshot afterwards does not un-complete or regress the row.
    engine.handle(&score_event(50)).await.expect("handled");
    engine.end_batch().await;
    let progress = db.get_progress(user, "score_100").await?.expect("row");
    assert_eq!(progress.current_value, 120);
    assert!(progress.completed_at.is_some());
    assert!(drain_bus(&mut bus_rx).is_empty());
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn achievement_conditions_gate_progress() -> BoxedErrorResult<()> {
    let db = Arc::new(Database::new_in_memory().await?);
    db.upsert_achievement(
        "meetup_checkin",
        AchievementRecord {
            name: "Meetup regular".to_string(),
            description: None,
            icon: None,
            color: None,
            target_value: 1,
            badge_slug: None,
            entitlement: None,
            points: 0,
            event_type: Some(event_type::EVENT_CHECKIN.to_string()),
            conditions: Some(r#"[{"field":"platform","op":"eq","value":"meetup"}]"#.to_string()),
            progress_mode: ProgressMode::Counter,
            gauge_field: None,
            hidden: false,
            enabled: true,
        },
    )
    .await?;

    let (bus_tx, _bus_rx) = bus_channel(64);
    let engine = AchievementEngine::new(db.clone(), bus_tx);
    let user = UserId::random();

    engine.begin_batch().await;
    engine
        .handle(
            &DomainEvent::new(
                event_type::EVENT_CHECKIN,
                payload! { "userId" => user.to_string(), "platform" => "luma" },
            )
            .with_user(user),
        )
        .await
        .expect("handled");
    assert!(db.get_progress(user, "meetup_checkin").await?.is_none());

    engine
        .handle(
            &DomainEvent::new(
                event_type::EVENT_CHECKIN,
                payload! { "userId" => user.to_string(), "platform" => "meetup" },
            )
            .with_user(user),
        )
        .await
        .expect("handled");
    engine.end_batch().await;
    let progress = db.get_progress(user, "meetup_checkin").await?.expect("row");
    assert!(progress.completed_at.is_some());
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn waitlist_promotion_is_single_shot() -> BoxedErrorResult<()> {
    let db = Arc::new(Database::new_in_memory().await?);
    let group_id = GroupId::random();
    db.insert_group(group_id, test_group("rustaceans")).await?;

    let mut canonical = future_event("small-room", 3_600);
    canonical.max_attendees = Some(1);
    let event_id = db
        .write_with(|tx| {
            Database::upsert_event_by_platform_tx(tx, &canonical, group_id, None, Timestamp::now())
        })
        .await?
        .event_id();

    let service = RsvpService::new(db.clone());
    let user_a = UserId::random();
    let user_b = UserId::random();

    let (a, _) = service.create_rsvp(event_id, user_a).await?;
    assert_eq!(a.status, RsvpStatus::Confirmed);

    let (b, _) = service.create_rsvp(event_id, user_b).await?;
    assert_eq!(b.status, RsvpStatus::Waitlisted);
    assert_eq!(b.waitlist_position, Some(1));

    // A second create by A conflicts while the first is active.
    assert!(matches!(
        service.create_rsvp(event_id, user_a).await,
        Err(ServiceError::Conflict { .. })
    ));

    let (cancelled, events) = service.cancel_rsvp(event_id, user_a).await?;
    assert_eq!(cancelled.status, RsvpStatus::Cancelled);
    // B took the freed seat.
    let b_row = db.get_rsvp(event_id, user_b).await?.expect("row");
    assert_eq!(b_row.status, RsvpStatus::Confirmed);
    assert_eq!(b_row.waitlist_position, None);

    let promoted = events
        .iter()
        .find(|e| {
            e.event_type == event_type::EVENT_RSVP
                && e.payload.get("promotedFromWaitlist")
                    == Some(&serde_json::Value::Bool(true))
        })
        .expect("promotion event");
    assert_eq!(
        promoted.payload.get("userId").and_then(|v| v.as_str()),
        Some(user_b.to_string().as_str())
    );

    // A's RSVP is already cancelled; a repeat cancel promotes nobody.
    assert!(matches!(
        service.cancel_rsvp(event_id, user_a).await,
        Err(ServiceError::NotFound { .. })
    ));
    assert_eq!(cancelled.rsvp_count, 1);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn rsvp_against_cancelled_event_is_gone() -> BoxedErrorResult<()> {
    let db = Arc::new(Database::new_in_memory().await?);
    let group_id = GroupId::random();
    db.insert_group(group_id, test_group("rustaceans")).await?;

    let canonical = future_event("doomed", 3_600);
    let event_id = db
        .write_with(|tx| {
            let outcome = Database::upsert_event_by_platform_tx(
                tx,
                &canonical,
                group_id,
                None,
                Timestamp::now(),
            )?;
            Database::cancel_event_tx(tx, outcome.event_id())?;
            Ok(outcome.event_id())
        })
        .await?;

    let service = RsvpService::new(db.clone());
    assert!(matches!(
        service.create_rsvp(event_id, UserId::random()).await,
        Err(ServiceError::Gone { .. })
    ));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn claim_link_exhaustion_admits_exactly_max_uses() -> BoxedErrorResult<()> {
    let db = Arc::new(Database::new_in_memory().await?);
    let badge_id = BadgeId::random();
    db.insert_badge(
        badge_id,
        agora_db::BadgeRecord {
            slug: "conference-2025".to_string(),
            name: "Conference 2025".to_string(),
            description: None,
            icon: None,
            color: None,
            points: 25,
            sort_order: 0,
            hidden: false,
            group_id: None,
            created_at: Timestamp::now(),
        },
    )
    .await?;
    db.insert_claim_link(
        "one-shot",
        ClaimLinkRecord {
            badge_id,
            max_uses: Some(1),
            current_uses: 0,
            expires_at: None,
            achievement_key: None,
            custom_event_type: None,
            custom_payload: None,
            created_at: Timestamp::now(),
        },
    )
    .await?;

    let service = Arc::new(ClaimService::new(db.clone()));
    let user_a = UserId::random();
    let user_b = UserId::random();

    let (first, second) = tokio::join!(
        service.claim_badge("one-shot", user_a),
        service.claim_badge("one-shot", user_b),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = if first.is_err() { first } else { second };
    assert!(matches!(failure, Err(ServiceError::Gone { .. })));

    let link = db.get_claim_link("one-shot").await?.expect("row");
    assert_eq!(link.current_uses, 1);

    let awarded_a = db.list_user_badges(user_a).await?.len();
    let awarded_b = db.list_user_badges(user_b).await?.len();
    assert_eq!(awarded_a + awarded_b, 1);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn claiming_a_held_badge_conflicts() -> BoxedErrorResult<()> {
    let db = Arc::new(Database::new_in_memory().await?);
    let badge_id = BadgeId::random();
    db.insert_badge(
        badge_id,
        agora_db::BadgeRecord {
            slug: "repeat".to_string(),
            name: "Repeat".to_string(),
            description: None,
            icon: None,
            color: None,
            points: 5,
            sort_order: 0,
            hidden: false,
            group_id: None,
            created_at: Timestamp::now(),
        },
    )
    .await?;
    db.insert_claim_link(
        "reusable",
        ClaimLinkRecord {
            badge_id,
            max_uses: None,
            current_uses: 0,
            expires_at: None,
            achievement_key: None,
            custom_event_type: None,
            custom_payload: None,
            created_at: Timestamp::now(),
        },
    )
    .await?;

    let service = ClaimService::new(db.clone());
    let user = UserId::random();
    let (_, events) = service.claim_badge("reusable", user).await?;
    assert!(
        events
            .iter()
            .any(|e| e.event_type == event_type::USER_BADGE_CLAIMED)
    );
    assert!(matches!(
        service.claim_badge("reusable", user).await,
        Err(ServiceError::Conflict { .. })
    ));
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn favorites_round_trip_drives_broadcast_count() -> BoxedErrorResult<()> {
    let db = Arc::new(Database::new_in_memory().await?);
    let group_id = GroupId::random();
    db.insert_group(group_id, test_group("rustaceans")).await?;

    let service = FavoritesService::new(db.clone());
    let user = UserId::random();

    let (added, events) = service.add_favorite(user, "rustaceans").await?;
    assert!(!added.already_existed);
    assert_eq!(events.len(), 1);

    // Second add: idempotent, no event.
    let (again, events) = service.add_favorite(user, "rustaceans").await?;
    assert!(again.already_existed);
    assert!(events.is_empty());

    // Relay the add through the notification handler and observe the
    // broadcast count.
    let notifier = Notifier::new();
    let mut broadcast_rx = notifier.subscribe_broadcast();
    let relayer = NotificationRelayer::new(db.clone(), notifier.clone());
    relayer
        .handle(
            &DomainEvent::new(
                event_type::USER_FAVORITE_ADDED,
                payload! {
                    "userId" => user.to_string(),
                    "groupId" => group_id.to_string(),
                    "groupSlug" => "rustaceans",
                },
            )
            .with_user(user),
        )
        .await
        .expect("handled");
    let broadcast = broadcast_rx.try_recv().expect("broadcast sent");
    assert_eq!(broadcast.kind, "favorite.count_changed");
    assert_eq!(
        broadcast.payload.get("favoriteCount").and_then(|v| v.as_u64()),
        Some(1)
    );

    // Remove deletes and emits; removing again is silent.
    let (_, events) = service.remove_favorite(user, "rustaceans").await?;
    assert_eq!(events.len(), 1);
    let (_, events) = service.remove_favorite(user, "rustaceans").await?;
    assert!(events.is_empty());
    Ok(())
}
