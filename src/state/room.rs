use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use thiserror::Error;
use tokio::time::Instant;

/// Derived room status, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    /// At least one non-spectator still has no estimation (or the room is empty).
    Estimating,
    /// Every non-spectator has estimated and a flip is currently valid.
    Flippable,
    /// Estimations have been revealed.
    Flipped,
}

/// One participant in a room.
#[derive(Debug, Clone)]
pub struct User {
    /// Stable opaque identifier (21-character token), client-generated.
    pub id: String,
    /// Display name, mutable.
    pub name: String,
    /// Current vote; `None` while not contributing one.
    pub estimation: Option<f64>,
    /// Spectators never hold an estimation.
    pub is_spectator: bool,
    /// Client-reported foreground/background state, independent of connection liveness.
    pub is_present: bool,
    /// When this user first heartbeated into the room.
    pub first_heartbeat: Instant,
    /// Refreshed by every heartbeat message and by successful join/rejoin.
    pub last_heartbeat: Instant,
}

impl User {
    fn new(id: String, name: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            name,
            estimation: None,
            is_spectator: false,
            is_present: true,
            first_heartbeat: now,
            last_heartbeat: now,
        }
    }
}

/// Error returned when a mutation targets a user the room does not contain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("user `{user_id}` not found in room {room_id}")]
pub struct UnknownUser {
    /// Room the mutation targeted.
    pub room_id: u64,
    /// The missing user id.
    pub user_id: String,
}

/// Outcome of a [`Room::flip`] call.
///
/// A flip never raises an error to the caller: when the room is not flippable
/// the call is a rejected no-op that still marks the room dirty so a confused
/// client gets a corrective resync.
#[derive(Debug, Clone)]
pub enum FlipOutcome {
    /// The room flipped; the record must be handed to the persistence sink
    /// exactly once.
    Flipped(FlipRecord),
    /// Not flippable yet. The room was marked dirty, nothing else changed.
    Rejected,
    /// The room was already flipped; nothing changed at all.
    AlreadyFlipped,
}

/// Snapshot of the votes revealed by a flip, consumed by the persistence sink.
#[derive(Debug, Clone)]
pub struct FlipRecord {
    pub room_id: u64,
    pub started_at: SystemTime,
    pub flipped_at: SystemTime,
    pub estimations: Vec<FlipEstimation>,
}

/// One revealed vote inside a [`FlipRecord`].
#[derive(Debug, Clone)]
pub struct FlipEstimation {
    pub user_id: String,
    pub user_name: String,
    pub estimation: f64,
}

/// The voting state machine for a single room.
///
/// Knows nothing about connections or transport; every mutation marks the
/// room dirty so the broadcast fan-out owes connected clients a snapshot.
#[derive(Debug)]
pub struct Room {
    id: u64,
    started_at: SystemTime,
    last_updated: SystemTime,
    users: IndexMap<String, User>,
    is_flipped: bool,
    is_auto_flip: bool,
    dirty: bool,
    generation: u64,
}

impl Room {
    /// Create an empty room. Rooms are created lazily on first join.
    pub fn new(id: u64) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            started_at: now,
            last_updated: now,
            users: IndexMap::new(),
            is_flipped: false,
            is_auto_flip: false,
            dirty: false,
            generation: 0,
        }
    }

    /// Numeric room id, stable for the session's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the current voting round started. Reset by [`Room::reset`].
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Last time a broadcast for this room completed.
    pub fn last_updated(&self) -> SystemTime {
        self.last_updated
    }

    /// Ordered user collection, insertion order significant for display.
    pub fn users(&self) -> &IndexMap<String, User> {
        &self.users
    }

    /// Whether estimations are currently revealed.
    pub fn is_flipped(&self) -> bool {
        self.is_flipped
    }

    /// Whether the room flips automatically once everyone has voted.
    pub fn is_auto_flip(&self) -> bool {
        self.is_auto_flip
    }

    /// Whether a broadcast is owed to connected clients.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Generation counter; incremented by flip and reset so stale scheduled
    /// auto-flips self-invalidate.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Derived status of the room.
    pub fn status(&self) -> RoomStatus {
        if self.is_flipped {
            RoomStatus::Flipped
        } else if self.is_flippable() {
            RoomStatus::Flippable
        } else {
            RoomStatus::Estimating
        }
    }

    /// A flip is valid iff the room is not flipped, at least one non-spectator
    /// exists, and every user is either a spectator or has estimated.
    pub fn is_flippable(&self) -> bool {
        !self.is_flipped
            && self.users.values().any(|user| !user.is_spectator)
            && self
                .users
                .values()
                .all(|user| user.is_spectator || user.estimation.is_some())
    }

    /// Whether a delayed auto-flip should be scheduled right now.
    pub fn needs_auto_flip(&self) -> bool {
        self.is_auto_flip && self.is_flippable()
    }

    /// Insert a user, or refresh an existing one.
    ///
    /// Rejoining preserves `estimation`, `is_spectator` and `is_present`;
    /// only the display name and the heartbeat are refreshed. Always marks
    /// the room dirty, which repairs any client drifted out of sync.
    pub fn add_or_rejoin_user(&mut self, user_id: &str, name: &str) {
        match self.users.get_mut(user_id) {
            Some(user) => {
                user.name = name.to_owned();
                user.last_heartbeat = Instant::now();
            }
            None => {
                self.users.insert(
                    user_id.to_owned(),
                    User::new(user_id.to_owned(), name.to_owned()),
                );
            }
        }
        self.dirty = true;
    }

    /// Remove a user if present, returning whether anything changed.
    ///
    /// Removing the last unestimated voter can make the room newly
    /// flippable; callers must re-check [`Room::needs_auto_flip`] afterward.
    pub fn remove_user(&mut self, user_id: &str) -> bool {
        let removed = self.users.shift_remove(user_id).is_some();
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Set or clear a user's estimation. Placing a vote always exits spectator mode.
    pub fn set_estimation(
        &mut self,
        user_id: &str,
        estimation: Option<f64>,
    ) -> Result<(), UnknownUser> {
        let user = self.user_mut(user_id)?;
        user.estimation = estimation;
        user.is_spectator = false;
        self.dirty = true;
        Ok(())
    }

    /// Toggle spectator mode. A spectator cannot hold a vote.
    pub fn set_spectator(&mut self, user_id: &str, is_spectator: bool) -> Result<(), UnknownUser> {
        let user = self.user_mut(user_id)?;
        user.is_spectator = is_spectator;
        if is_spectator {
            user.estimation = None;
        }
        self.dirty = true;
        Ok(())
    }

    /// Rename a user; no status effect.
    pub fn change_username(&mut self, user_id: &str, name: &str) -> Result<(), UnknownUser> {
        let user = self.user_mut(user_id)?;
        user.name = name.to_owned();
        self.dirty = true;
        Ok(())
    }

    /// Update the client-reported foreground/background indicator.
    pub fn set_presence(&mut self, user_id: &str, is_present: bool) -> Result<(), UnknownUser> {
        let user = self.user_mut(user_id)?;
        user.is_present = is_present;
        self.dirty = true;
        Ok(())
    }

    /// Refresh a user's liveness timestamp. Does not mark the room dirty.
    pub fn touch_heartbeat(&mut self, user_id: &str) -> Result<(), UnknownUser> {
        let user = self.user_mut(user_id)?;
        user.last_heartbeat = Instant::now();
        Ok(())
    }

    /// Enable or disable auto-flip; callers re-check [`Room::needs_auto_flip`].
    pub fn set_auto_flip(&mut self, is_auto_flip: bool) {
        self.is_auto_flip = is_auto_flip;
        self.dirty = true;
    }

    /// Reveal all estimations.
    ///
    /// See [`FlipOutcome`] for the three possible results. On success the
    /// generation counter advances so pending auto-flip tasks for the previous
    /// round self-invalidate.
    pub fn flip(&mut self) -> FlipOutcome {
        if self.is_flipped {
            return FlipOutcome::AlreadyFlipped;
        }
        if !self.is_flippable() {
            self.dirty = true;
            return FlipOutcome::Rejected;
        }

        self.is_flipped = true;
        self.generation += 1;
        self.dirty = true;

        FlipOutcome::Flipped(FlipRecord {
            room_id: self.id,
            started_at: self.started_at,
            flipped_at: SystemTime::now(),
            estimations: self
                .users
                .values()
                .filter(|user| !user.is_spectator)
                .filter_map(|user| {
                    user.estimation.map(|estimation| FlipEstimation {
                        user_id: user.id.clone(),
                        user_name: user.name.clone(),
                        estimation,
                    })
                })
                .collect(),
        })
    }

    /// Start a fresh voting round: clear every estimation and the flip flag.
    pub fn reset(&mut self) {
        for user in self.users.values_mut() {
            user.estimation = None;
        }
        self.is_flipped = false;
        let now = SystemTime::now();
        self.started_at = now;
        self.last_updated = now;
        self.generation += 1;
        self.dirty = true;
    }

    /// Ids of users whose last heartbeat is older than `timeout`.
    pub fn expired_users(&self, timeout: Duration) -> Vec<String> {
        self.users
            .values()
            .filter(|user| user.last_heartbeat.elapsed() > timeout)
            .map(|user| user.id.clone())
            .collect()
    }

    /// Mark the broadcast for this room as completed.
    pub fn broadcast_completed(&mut self) {
        self.dirty = false;
        self.last_updated = SystemTime::now();
    }

    fn user_mut(&mut self, user_id: &str) -> Result<&mut User, UnknownUser> {
        let room_id = self.id;
        self.users.get_mut(user_id).ok_or_else(|| UnknownUser {
            room_id,
            user_id: user_id.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "aaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "bbbbbbbbbbbbbbbbbbbbb";

    fn room_with(users: &[&str]) -> Room {
        let mut room = Room::new(42);
        for id in users {
            room.add_or_rejoin_user(id, &format!("user-{id}"));
        }
        room
    }

    #[test]
    fn two_users_estimate_then_flip() {
        let mut room = room_with(&[ALICE]);
        assert_eq!(room.status(), RoomStatus::Estimating);

        room.add_or_rejoin_user(BOB, "bob");
        assert_eq!(room.status(), RoomStatus::Estimating);

        room.set_estimation(ALICE, Some(5.0)).unwrap();
        assert_eq!(room.status(), RoomStatus::Estimating);

        room.set_estimation(BOB, Some(8.0)).unwrap();
        assert_eq!(room.status(), RoomStatus::Flippable);

        let outcome = room.flip();
        assert_eq!(room.status(), RoomStatus::Flipped);
        let FlipOutcome::Flipped(record) = outcome else {
            panic!("expected a successful flip, got {outcome:?}");
        };
        assert_eq!(record.room_id, 42);
        let values: Vec<f64> = record.estimations.iter().map(|e| e.estimation).collect();
        assert_eq!(values, vec![5.0, 8.0]);
    }

    #[test]
    fn single_unestimated_voter_is_not_flippable() {
        let room = room_with(&[ALICE]);
        assert_eq!(room.status(), RoomStatus::Estimating);
        assert!(!room.is_flippable());
    }

    #[test]
    fn spectators_alone_never_make_a_room_flippable() {
        let mut room = room_with(&[ALICE]);
        room.set_spectator(ALICE, true).unwrap();
        assert_eq!(room.status(), RoomStatus::Estimating);
    }

    #[test]
    fn removing_unestimated_voter_reevaluates_flippability() {
        let mut room = room_with(&[ALICE, BOB]);
        room.set_estimation(ALICE, Some(3.0)).unwrap();
        room.set_estimation(BOB, Some(5.0)).unwrap();
        assert_eq!(room.status(), RoomStatus::Flippable);

        // B leaves before the flip; the room must still be flippable with
        // just the remaining estimated voter.
        assert!(room.remove_user(BOB));
        assert_eq!(room.status(), RoomStatus::Flippable);
    }

    #[test]
    fn rejoin_is_idempotent_and_preserves_vote() {
        let mut room = room_with(&[ALICE]);
        room.set_estimation(ALICE, Some(5.0)).unwrap();
        room.set_presence(ALICE, false).unwrap();

        room.add_or_rejoin_user(ALICE, "user-renamed");

        assert_eq!(room.user_count(), 1);
        let user = &room.users()[ALICE];
        assert_eq!(user.estimation, Some(5.0));
        assert!(!user.is_spectator);
        assert!(!user.is_present);
        assert_eq!(user.name, "user-renamed");
        assert!(room.is_dirty());
    }

    #[test]
    fn estimating_exits_spectator_mode() {
        let mut room = room_with(&[ALICE]);
        room.set_spectator(ALICE, true).unwrap();
        room.set_estimation(ALICE, Some(1.0)).unwrap();
        assert!(!room.users()[ALICE].is_spectator);
        assert_eq!(room.status(), RoomStatus::Flippable);
    }

    #[test]
    fn turning_spectator_clears_estimation() {
        let mut room = room_with(&[ALICE, BOB]);
        room.set_estimation(ALICE, Some(2.0)).unwrap();
        room.set_estimation(BOB, Some(3.0)).unwrap();
        room.set_spectator(BOB, true).unwrap();
        assert_eq!(room.users()[BOB].estimation, None);
        // A remains the only (estimated) voter, so the room stays flippable.
        assert_eq!(room.status(), RoomStatus::Flippable);
    }

    #[test]
    fn flip_on_unflippable_room_is_a_dirty_noop() {
        let mut room = room_with(&[ALICE]);
        room.broadcast_completed();
        assert!(!room.is_dirty());

        let outcome = room.flip();
        assert!(matches!(outcome, FlipOutcome::Rejected));
        assert!(!room.is_flipped());
        assert!(room.is_dirty());
    }

    #[test]
    fn flip_when_already_flipped_is_silent() {
        let mut room = room_with(&[ALICE]);
        room.set_estimation(ALICE, Some(5.0)).unwrap();
        assert!(matches!(room.flip(), FlipOutcome::Flipped(_)));
        room.broadcast_completed();

        let outcome = room.flip();
        assert!(matches!(outcome, FlipOutcome::AlreadyFlipped));
        assert!(!room.is_dirty());
    }

    #[test]
    fn flip_record_skips_spectators() {
        let mut room = room_with(&[ALICE, BOB]);
        room.set_estimation(ALICE, Some(13.0)).unwrap();
        room.set_spectator(BOB, true).unwrap();

        let FlipOutcome::Flipped(record) = room.flip() else {
            panic!("room should be flippable");
        };
        assert_eq!(record.estimations.len(), 1);
        assert_eq!(record.estimations[0].user_id, ALICE);
    }

    #[test]
    fn reset_clears_votes_and_advances_generation() {
        let mut room = room_with(&[ALICE]);
        room.set_estimation(ALICE, Some(8.0)).unwrap();
        assert!(matches!(room.flip(), FlipOutcome::Flipped(_)));
        let generation = room.generation();

        room.reset();
        assert!(!room.is_flipped());
        assert_eq!(room.users()[ALICE].estimation, None);
        assert_eq!(room.status(), RoomStatus::Estimating);
        assert_eq!(room.generation(), generation + 1);
    }

    #[test]
    fn status_invariants_hold() {
        let mut room = room_with(&[ALICE, BOB]);
        room.set_estimation(ALICE, Some(1.0)).unwrap();
        room.set_estimation(BOB, Some(2.0)).unwrap();

        assert_eq!(room.status(), RoomStatus::Flippable);
        assert!(room.users().values().any(|u| !u.is_spectator));
        assert!(
            room.users()
                .values()
                .all(|u| u.is_spectator || u.estimation.is_some())
        );

        room.flip();
        assert_eq!(room.status(), RoomStatus::Flipped);
        assert!(room.is_flipped());
    }

    #[test]
    fn needs_auto_flip_requires_flag_and_flippability() {
        let mut room = room_with(&[ALICE]);
        room.set_auto_flip(true);
        assert!(!room.needs_auto_flip());

        room.set_estimation(ALICE, Some(5.0)).unwrap();
        assert!(room.needs_auto_flip());

        room.set_auto_flip(false);
        assert!(!room.needs_auto_flip());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_users_reports_stale_heartbeats() {
        let mut room = room_with(&[ALICE, BOB]);
        tokio::time::advance(Duration::from_secs(20)).await;
        room.touch_heartbeat(BOB).unwrap();
        tokio::time::advance(Duration::from_secs(15)).await;

        let expired = room.expired_users(Duration::from_secs(30));
        assert_eq!(expired, vec![ALICE.to_owned()]);
    }

    #[test]
    fn mutations_on_unknown_users_are_rejected() {
        let mut room = room_with(&[ALICE]);
        let err = room.set_estimation(BOB, Some(1.0)).unwrap_err();
        assert_eq!(err.user_id, BOB);
        assert_eq!(err.room_id, 42);
        assert!(room.touch_heartbeat(BOB).is_err());
    }
}
