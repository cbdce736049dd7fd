//! End-to-end consensus flows: votes to verdict to itinerary, expiry,
//! races between deciding votes and the expiry sweep.

mod common;

use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;

use common::*;
use tripsync::consensus::{EngineSettings, lifecycle, scheduler, votes};
use tripsync::errors::AppError;
use tripsync::models::proposal::{ProposalAction, ProposalFilter, ProposalStatus, ResolutionMethod};
use tripsync::models::vote::{Ballot, VoteType, VoteUpsert};
use tripsync::store::{ItineraryStore, ProposalStore, VoteStore};

fn love() -> Ballot {
    Ballot::new(VoteType::Love, None)
}

fn no(reason: &str) -> Ballot {
    Ballot::new(VoteType::No, Some(reason))
}

async fn status_of(fx: &Fixture, proposal_id: i64) -> ProposalStatus {
    fx.engine
        .store
        .find_proposal(fx.trip_id, proposal_id)
        .await
        .expect("find")
        .expect("exists")
        .status
}

async fn count_named(fx: &Fixture, day: usize, name: &str) -> usize {
    day_names(fx, day).await.iter().filter(|n| *n == name).count()
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_round_trip_vote_to_itinerary() {
    let fx = setup();
    let p = propose(&fx, VOTER, "LX Factory brunch", 0, "11:00").await;

    let first = votes::cast_vote(&fx.engine, fx.trip_id, p.id, OWNER, &love()).await.expect("owner");
    assert_eq!(first.proposal.status, ProposalStatus::Voting);

    let second = votes::cast_vote(&fx.engine, fx.trip_id, p.id, EDITOR, &love()).await.expect("editor");
    assert_eq!(second.proposal.status, ProposalStatus::Approved);
    assert_eq!(second.proposal.resolution_method, Some(ResolutionMethod::Consensus));
    assert!(second.proposal.applied_at.is_some());

    assert_eq!(
        day_names(&fx, 0).await,
        vec!["Pastéis de Belém", "LX Factory brunch", "Time Out Market"]
    );
    assert_eq!(count_named(&fx, 0, "LX Factory brunch").await, 1);
    println!("[PASS] two loves out of four approve and land sorted in day 0");
}

#[tokio::test]
async fn test_veto_rejects_without_touching_itinerary() {
    let fx = setup();
    let p = propose(&fx, EDITOR, "Skydiving", 1, "08:00").await;

    votes::cast_vote(&fx.engine, fx.trip_id, p.id, OWNER, &love()).await.expect("owner");
    let open = votes::cast_vote(&fx.engine, fx.trip_id, p.id, VOTER, &no("too risky"))
        .await
        .expect("first no");
    assert_eq!(open.proposal.status, ProposalStatus::Voting, "1/4 is under the veto share");

    let vetoed = votes::cast_vote(&fx.engine, fx.trip_id, p.id, VOTER_TWO, &no("same"))
        .await
        .expect("second no");
    assert_eq!(vetoed.proposal.status, ProposalStatus::Rejected);
    assert!(day_names(&fx, 1).await.is_empty());
}

#[tokio::test]
async fn test_single_no_in_three_voter_pool_vetoes() {
    let fx = setup();
    fx.engine.store.remove_collaborator(fx.trip_id, VOTER_TWO);
    let p = propose(&fx, EDITOR, "Karaoke", 1, "22:00").await;

    let outcome = votes::cast_vote(&fx.engine, fx.trip_id, p.id, VOTER, &no("please no"))
        .await
        .expect("no");
    assert_eq!(outcome.proposal.status, ProposalStatus::Rejected);

    let listing = lifecycle::list_proposals(&fx.engine, fx.trip_id, OWNER, &ProposalFilter::default())
        .await
        .expect("list");
    assert_eq!(listing.total_voters, 3);
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_partial_quorum_fallback_on_read_after_expiry() {
    let fx = setup_with_expiry(Duration::milliseconds(200));
    let p = propose(&fx, EDITOR, "Sunset cruise", 2, "19:00").await;
    votes::cast_vote(&fx.engine, fx.trip_id, p.id, OWNER, &love()).await.expect("owner");

    tokio::time::sleep(StdDuration::from_millis(300)).await;

    let view = lifecycle::get_proposal(&fx.engine, fx.trip_id, p.id, VIEWER).await.expect("read");
    assert_eq!(view.proposal.status, ProposalStatus::Approved);
    assert_eq!(view.proposal.resolution_method, Some(ResolutionMethod::Expired));
    assert_eq!(view.consensus.hours_remaining, 0);
    assert_eq!(day_names(&fx, 2).await, vec!["Cervejaria Ramiro", "Sunset cruise"]);
}

#[tokio::test]
async fn test_expiry_without_votes_expires() {
    let fx = setup_with_expiry(Duration::milliseconds(150));
    let p = propose(&fx, EDITOR, "Nobody cares", 1, "10:00").await;

    tokio::time::sleep(StdDuration::from_millis(250)).await;

    let listing = lifecycle::list_proposals(&fx.engine, fx.trip_id, OWNER, &ProposalFilter::default())
        .await
        .expect("list");
    let view = listing
        .proposals
        .iter()
        .find(|v| v.proposal.id == p.id)
        .expect("listed");
    assert_eq!(view.proposal.status, ProposalStatus::Expired);
    assert!(view.proposal.resolved_at.is_some());
}

#[tokio::test]
async fn test_vote_after_expiry_settles_then_conflicts() {
    let fx = setup_with_expiry(Duration::milliseconds(150));
    let p = propose(&fx, EDITOR, "Late idea", 1, "10:00").await;
    votes::cast_vote(&fx.engine, fx.trip_id, p.id, VOTER, &Ballot::new(VoteType::Concerns, Some("meh")))
        .await
        .expect("concerns");

    tokio::time::sleep(StdDuration::from_millis(250)).await;

    let err = votes::cast_vote(&fx.engine, fx.trip_id, p.id, OWNER, &love())
        .await
        .expect_err("expired");
    assert!(matches!(err, AppError::Conflict(_)), "{err}");

    let stored = fx
        .engine
        .store
        .find_proposal(fx.trip_id, p.id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(stored.status, ProposalStatus::Rejected, "negative >= positive at expiry");
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_concurrent_deciding_votes_insert_exactly_once() {
    let fx = setup();
    let p = propose(&fx, EDITOR, "Gulbenkian", 1, "10:00").await;
    votes::cast_vote(&fx.engine, fx.trip_id, p.id, OWNER, &love()).await.expect("owner");

    let ballot = love();
    let (a, b) = tokio::join!(
        votes::cast_vote(&fx.engine, fx.trip_id, p.id, EDITOR, &ballot),
        votes::cast_vote(&fx.engine, fx.trip_id, p.id, VOTER, &ballot),
    );
    for r in [&a, &b] {
        if let Err(e) = r {
            assert!(matches!(e, AppError::Conflict(_)), "only a lost race may fail: {e}");
        }
    }
    assert!(a.is_ok() || b.is_ok());

    let stored = fx
        .engine
        .store
        .find_proposal(fx.trip_id, p.id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(stored.status, ProposalStatus::Approved);
    assert_eq!(count_named(&fx, 1, "Gulbenkian").await, 1);
    println!("[PASS] racing deciding votes apply the activity once");
}

#[tokio::test]
async fn test_concurrent_approvals_on_one_trip_both_land() {
    let fx = setup();
    let p1 = propose(&fx, EDITOR, "Morning run", 1, "07:00").await;
    let p2 = propose(&fx, VOTER, "Evening show", 1, "20:00").await;

    let (a, b) = tokio::join!(
        lifecycle::force_resolve(&fx.engine, fx.trip_id, p1.id, OWNER, ProposalAction::Approve),
        lifecycle::force_resolve(&fx.engine, fx.trip_id, p2.id, OWNER, ProposalAction::Approve),
    );
    a.expect("p1");
    b.expect("p2");

    assert_eq!(day_names(&fx, 1).await, vec!["Morning run", "Evening show"]);
    let itinerary = fx
        .engine
        .store
        .load_itinerary(fx.trip_id)
        .await
        .expect("load")
        .expect("trip");
    assert_eq!(itinerary.version, 2);
}

// ---------------------------------------------------------------------------
// Expiry sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sweep_resolves_expired_proposals() {
    let fx = setup_with_expiry(Duration::milliseconds(150));
    let quiet = propose(&fx, EDITOR, "Quiet", 1, "10:00").await;
    let liked = propose(&fx, EDITOR, "Liked", 1, "12:00").await;
    votes::cast_vote(&fx.engine, fx.trip_id, liked.id, VOTER, &love()).await.expect("vote");

    tokio::time::sleep(StdDuration::from_millis(250)).await;

    let report = scheduler::sweep_once(&fx.engine).await.expect("sweep");
    assert_eq!(report.resolved, 2);
    assert_eq!(report.failed, 0);

    assert_eq!(status_of(&fx, quiet.id).await, ProposalStatus::Expired);
    assert_eq!(status_of(&fx, liked.id).await, ProposalStatus::Approved);
    assert_eq!(day_names(&fx, 1).await, vec!["Liked"]);

    let again = scheduler::sweep_once(&fx.engine).await.expect("second sweep");
    assert_eq!(again, scheduler::SweepReport::default());
}

#[tokio::test]
async fn test_sweep_retries_unapplied_approval() {
    let fx = setup_with(EngineSettings {
        itinerary_retry_limit: 2,
        ..Default::default()
    });
    let p = propose(&fx, EDITOR, "Day trip to Cascais", 2, "09:00").await;

    // Drop day 2 so the approval cannot be applied yet.
    let store = &fx.engine.store;
    let itinerary = store.load_itinerary(fx.trip_id).await.expect("load").expect("trip");
    assert!(store
        .save_itinerary(fx.trip_id, itinerary.version, &itinerary.days[..2])
        .await
        .expect("shrink"));

    let approved = lifecycle::force_resolve(&fx.engine, fx.trip_id, p.id, OWNER, ProposalAction::Approve)
        .await
        .expect("approval stands even if applying fails");
    assert_eq!(approved.status, ProposalStatus::Approved);
    assert!(approved.applied_at.is_none());

    let shrunk = store.load_itinerary(fx.trip_id).await.expect("load").expect("trip");
    assert!(store
        .save_itinerary(fx.trip_id, shrunk.version, &seed_days())
        .await
        .expect("restore"));

    let report = scheduler::sweep_once(&fx.engine).await.expect("sweep");
    assert_eq!(report.applied, 1);
    assert_eq!(count_named(&fx, 2, "Day trip to Cascais").await, 1);

    let stored = store.find_proposal(fx.trip_id, p.id).await.expect("find").expect("exists");
    assert!(stored.applied_at.is_some());
    assert!(stored.resolved_at.is_some_and(|at| at <= Utc::now()));
}

#[tokio::test]
async fn test_owner_override_after_expiry_conflicts() {
    let fx = setup_with_expiry(Duration::milliseconds(150));
    let p = propose(&fx, EDITOR, "Forgotten idea", 1, "10:00").await;

    tokio::time::sleep(StdDuration::from_millis(250)).await;

    let err = lifecycle::force_resolve(&fx.engine, fx.trip_id, p.id, OWNER, ProposalAction::Approve)
        .await
        .expect_err("already expired");
    assert!(matches!(err, AppError::Conflict(_)), "{err}");
    assert_eq!(status_of(&fx, p.id).await, ProposalStatus::Expired);
    assert!(day_names(&fx, 1).await.is_empty());
}

#[tokio::test]
async fn test_late_read_of_veto_keeps_consensus_method() {
    let fx = setup_with_expiry(Duration::milliseconds(150));
    let p = propose(&fx, EDITOR, "Bullfight", 1, "17:00").await;

    // Votes written without a settle in between, so the first evaluation
    // happens after the window has closed.
    for user in [VOTER, VOTER_TWO] {
        fx.engine
            .store
            .upsert_vote(&VoteUpsert {
                proposal_id: p.id,
                user_id: user,
                vote_type: VoteType::No,
                comment: Some("no thanks".to_string()),
                at: Utc::now(),
            })
            .await
            .expect("upsert")
            .expect("open");
    }

    tokio::time::sleep(StdDuration::from_millis(250)).await;

    let view = lifecycle::get_proposal(&fx.engine, fx.trip_id, p.id, OWNER).await.expect("read");
    assert_eq!(view.proposal.status, ProposalStatus::Rejected);
    assert_eq!(view.proposal.resolution_method, Some(ResolutionMethod::Consensus));
    assert!(view.consensus.expired);
    assert!(!view.consensus.expiry_fallback);
}
