use agora_core::canonical::{CanonicalEvent, CanonicalVenue, EventKind, EventStatus};
use agora_core::fmt::BoxedErrorResult;
use agora_core::id::{BadgeId, EventId, GroupId, UserId};
use agora_core::{Platform, Timestamp};

use crate::{
    BadgeRecord, CheckinCodeRecord, ClaimLinkRecord, Database, GroupRecord, PlatformConnection,
    RedeemRefusal, SyncConfig, SyncStatus, UpsertOutcome,
};

pub(crate) async fn temp_db() -> BoxedErrorResult<Database> {
    Ok(Database::new_in_memory().await?)
}

pub(crate) fn test_group(slug: &str) -> GroupRecord {
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

pub(crate) fn test_event(platform_id: &str, start: u64) -> CanonicalEvent {
    CanonicalEvent {
        platform_id: platform_id.to_string(),
        platform: Platform::Meetup,
        title: format!("Event {platform_id}"),
        description: None,
        event_url: format!("https://example.com/{platform_id}"),
        photo_url: None,
        start_time: Timestamp::from(start),
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

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn upsert_event_is_unique_per_platform_id() -> BoxedErrorResult<()> {
    let db = temp_db().await?;
    let group_id = GroupId::random();
    db.insert_group(group_id, test_group("rustaceans")).await?;

    let canonical = test_event("abc", 10_000);
    let now = Timestamp::from(500);

    let first = db
        .write_with(|tx| Database::upsert_event_by_platform_tx(tx, &canonical, group_id, None, now))
        .await?;
    let UpsertOutcome::Created(event_id) = first else {
        panic!("first upsert must create");
    };

    // Same upstream id again, changed title.
    let mut changed = canonical.clone();
    changed.title = "New title".to_string();
    let second = db
        .write_with(|tx| Database::upsert_event_by_platform_tx(tx, &changed, group_id, None, now))
        .await?;
    assert_eq!(second, UpsertOutcome::Updated(event_id));

    let record = db.get_event(event_id).await?.expect("row exists");
    assert_eq!(record.title, "New title");

    // Only one row for the group.
    assert_eq!(db.list_events_by_group(group_id).await?.len(), 1);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn online_venues_share_one_row_per_platform() -> BoxedErrorResult<()> {
    let db = temp_db().await?;

    let mut online_a = CanonicalVenue::online();
    online_a.name = "Zoom".to_string();
    let online_b = CanonicalVenue::online();

    let (a, b) = db
        .write_with(|tx| {
            Ok((
                Database::upsert_venue_tx(tx, Platform::Meetup, &online_a)?,
                Database::upsert_venue_tx(tx, Platform::Meetup, &online_b)?,
            ))
        })
        .await?;
    assert_eq!(a, b);

    // A different platform gets its own shared row.
    let c = db
        .write_with(|tx| {
            Database::upsert_venue_tx(tx, Platform::Eventbrite, &CanonicalVenue::online())
        })
        .await?;
    assert_ne!(a, c);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn future_active_listing_skips_past_and_cancelled() -> BoxedErrorResult<()> {
    let db = temp_db().await?;
    let group_id = GroupId::random();
    db.insert_group(group_id, test_group("rustaceans")).await?;

    let now = Timestamp::from(5_000);
    db.write_with(|tx| {
        let past = Database::upsert_event_by_platform_tx(
            tx,
            &test_event("past", 1_000),
            group_id,
            None,
            now,
        )?;
        let future = Database::upsert_event_by_platform_tx(
            tx,
            &test_event("future", 9_000),
            group_id,
            None,
            now,
        )?;
        let cancelled = Database::upsert_event_by_platform_tx(
            tx,
            &test_event("gone", 9_500),
            group_id,
            None,
            now,
        )?;
        Database::cancel_event_tx(tx, cancelled.event_id())?;

        let listed = Database::list_future_active_events_by_group_tx(tx, group_id, now)?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, future.event_id());
        assert_ne!(listed[0].0, past.event_id());
        Ok(())
    })
    .await?;
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn progress_latch_is_monotonic() -> BoxedErrorResult<()> {
    let db = temp_db().await?;
    let user = UserId::random();
    let now = Timestamp::from(100);

    db.write_with(|tx| {
        Database::ensure_progress_tx(tx, user, "first_checkin", 0, 1, now)?;
        let after = Database::increment_progress_tx(tx, user, "first_checkin", now)?
            .expect("row exists");
        assert_eq!(after.current_value, 1);

        assert!(Database::complete_progress_tx(tx, user, "first_checkin", now)?);
        // Second completion attempt does not re-latch.
        assert!(!Database::complete_progress_tx(tx, user, "first_checkin", now)?);

        // Post-completion updates are frozen out.
        let frozen = Database::increment_progress_tx(tx, user, "first_checkin", now)?
            .expect("row exists");
        assert_eq!(frozen.current_value, 1);
        let frozen = Database::set_gauge_progress_tx(tx, user, "first_checkin", 99, now)?
            .expect("row exists");
        assert_eq!(frozen.current_value, 1);
        Ok(())
    })
    .await?;

    let record = db.get_progress(user, "first_checkin").await?.expect("row");
    assert_eq!(record.current_value, 1);
    assert!(record.completed_at.is_some());
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn badge_award_is_unique_per_pair() -> BoxedErrorResult<()> {
    let db = temp_db().await?;
    let user = UserId::random();
    let badge_id = BadgeId::random();
    let now = Timestamp::from(100);

    db.insert_badge(
        badge_id,
        BadgeRecord {
            slug: "first-checkin-badge".into(),
            name: "First Check-in".into(),
            description: None,
            icon: None,
            color: None,
            points: 10,
            sort_order: 0,
            hidden: false,
            group_id: None,
            created_at: now,
        },
    )
    .await?;

    let (first, second) = db
        .write_with(|tx| {
            Ok((
                Database::award_badge_tx(tx, user, badge_id, None, now)?,
                Database::award_badge_tx(tx, user, badge_id, None, now)?,
            ))
        })
        .await?;
    assert!(first);
    assert!(!second);

    assert_eq!(db.list_user_badges(user).await?.len(), 1);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn claim_uses_never_exceed_max() -> BoxedErrorResult<()> {
    let db = temp_db().await?;
    let now = Timestamp::from(100);
    db.insert_claim_link(
        "secret-code",
        ClaimLinkRecord {
            badge_id: BadgeId::random(),
            max_uses: Some(1),
            current_uses: 0,
            expires_at: None,
            achievement_key: None,
            custom_event_type: None,
            custom_payload: None,
            created_at: now,
        },
    )
    .await?;

    let (first, second) = db
        .write_with(|tx| {
            Ok((
                Database::increment_claim_uses_tx(tx, "secret-code")?,
                Database::increment_claim_uses_tx(tx, "secret-code")?,
            ))
        })
        .await?;
    assert!(first);
    assert!(!second);

    let record = db.get_claim_link("secret-code").await?.expect("row");
    assert_eq!(record.current_uses, 1);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn checkin_code_redemption_is_bounded_and_unique() -> BoxedErrorResult<()> {
    let db = temp_db().await?;
    let event_id = EventId::random();
    let now = Timestamp::from(100);
    db.insert_checkin_code(
        event_id,
        "door-code",
        CheckinCodeRecord {
            max_uses: Some(2),
            current_uses: 0,
            created_at: now,
        },
    )
    .await?;

    let user_a = UserId::random();
    let user_b = UserId::random();
    let user_c = UserId::random();

    db.write_with(|tx| {
        assert!(Database::redeem_checkin_code_tx(tx, event_id, "door-code", user_a, now)?.is_ok());
        // Same user twice.
        assert!(matches!(
            Database::redeem_checkin_code_tx(tx, event_id, "door-code", user_a, now)?,
            Err(RedeemRefusal::AlreadyCheckedIn)
        ));
        assert!(Database::redeem_checkin_code_tx(tx, event_id, "door-code", user_b, now)?.is_ok());
        // Code exhausted.
        assert!(matches!(
            Database::redeem_checkin_code_tx(tx, event_id, "door-code", user_c, now)?,
            Err(RedeemRefusal::Exhausted)
        ));
        assert!(matches!(
            Database::redeem_checkin_code_tx(tx, event_id, "nope", user_c, now)?,
            Err(RedeemRefusal::UnknownCode)
        ));
        Ok(())
    })
    .await?;

    let code = db
        .get_checkin_code(event_id, "door-code")
        .await?
        .expect("row");
    assert_eq!(code.current_uses, 2);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn favorites_add_is_idempotent_remove_reports_deletion() -> BoxedErrorResult<()> {
    let db = temp_db().await?;
    let user = UserId::random();
    let group = GroupId::random();
    let now = Timestamp::from(100);

    let (added, again) = db
        .write_with(|tx| {
            Ok((
                Database::add_favorite_tx(tx, user, group, now)?,
                Database::add_favorite_tx(tx, user, group, now)?,
            ))
        })
        .await?;
    assert!(added);
    assert!(!again);
    assert_eq!(db.favorite_count(group).await?, 1);

    let (removed, again) = db
        .write_with(|tx| {
            Ok((
                Database::remove_favorite_tx(tx, user, group)?,
                Database::remove_favorite_tx(tx, user, group)?,
            ))
        })
        .await?;
    assert!(removed);
    assert!(!again);
    assert_eq!(db.favorite_count(group).await?, 0);
    Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn sync_logs_list_newest_first_and_freeze_on_completion() -> BoxedErrorResult<()> {
    let db = temp_db().await?;
    let group_id = GroupId::random();

    let older = db
        .write_with(|tx| {
            Database::start_sync_log_tx(
                tx,
                group_id,
                Platform::Meetup,
                "rustaceans",
                Timestamp::from(100),
            )
        })
        .await?;
    let newer = db
        .write_with(|tx| {
            Database::start_sync_log_tx(
                tx,
                group_id,
                Platform::Meetup,
                "rustaceans",
                Timestamp::from(200),
            )
        })
        .await?;

    db.write_with(|tx| {
        Database::complete_sync_log_tx(
            tx,
            older,
            SyncStatus::Success,
            Timestamp::from(150),
            3,
            1,
            0,
            None,
        )?;
        // A second completion attempt must not rewrite the audit row.
        Database::complete_sync_log_tx(
            tx,
            older,
            SyncStatus::Failed,
            Timestamp::from(999),
            0,
            0,
            0,
            Some("late failure"),
        )?;
        Ok(())
    })
    .await?;

    let logs = db.list_sync_logs(10, None).await?;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].id, newer.1);
    assert_eq!(logs[1].id, older.1);
    assert_eq!(logs[1].status, SyncStatus::Success);
    assert_eq!(logs[1].events_created, 3);
    assert_eq!(logs[1].error, None);
    Ok(())
}
