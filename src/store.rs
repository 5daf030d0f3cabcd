//! Storage abstraction for user records and room aggregates.
//!
//! The production document store lives outside this subsystem; these traits
//! are the seam it is consumed through. All identity mutations are
//! field-scoped to one platform's sub-record: concurrent updates to
//! different platforms of the same user never clobber each other, matching a
//! partial `$set`-style update in the real store. The in-memory
//! implementations serve single-instance deployments and tests.

use crate::model::{
    Platform, PlatformIdentity, RoomId, RoomPlatformStatus, UserId, UserRecord,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// User persistence contract consumed by the updater and validator.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<UserRecord>>;

    /// Fetch many users at once. Unknown ids are simply absent.
    async fn find_by_ids(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, UserRecord>>;

    /// Replace one platform's identity sub-record. Other platforms' fields
    /// are untouched. Returns false when the user does not exist.
    async fn update_platform_identity(
        &self,
        user_id: &UserId,
        platform: Platform,
        identity: PlatformIdentity,
    ) -> Result<bool>;

    /// Set the validity flag and validation timestamp for one identity.
    async fn set_identity_validity(
        &self,
        user_id: &UserId,
        platform: Platform,
        is_valid: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Stamp only `last_validation_check`, leaving validity untouched. Used
    /// when an existence check errored and proved nothing either way.
    async fn stamp_validation_check(
        &self,
        user_id: &UserId,
        platform: Platform,
        checked_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Stamp `last_refresh_attempt` ahead of an external fetch.
    async fn stamp_refresh_attempt(
        &self,
        user_id: &UserId,
        platform: Platform,
        attempted_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Identities with a username whose `last_validation_check` is absent or
    /// older than `checked_before`. Input to the validator sweep.
    async fn identities_needing_validation(
        &self,
        checked_before: DateTime<Utc>,
    ) -> Result<Vec<(UserId, Platform, String)>>;

    /// Health check.
    async fn health_check(&self) -> bool;

    /// Downcast helper to access backend-specific implementations.
    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

/// Room aggregate contract: membership in, refresh summaries out.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Member ids for a room, or `None` when the room does not exist.
    async fn member_ids(&self, room_id: &RoomId) -> Result<Option<Vec<UserId>>>;

    /// Write the summarized refresh status consumed by the UI layer.
    async fn record_platform_status(
        &self,
        room_id: &RoomId,
        platform: Platform,
        status: RoomPlatformStatus,
    ) -> Result<()>;

    async fn platform_status(
        &self,
        room_id: &RoomId,
        platform: Platform,
    ) -> Result<Option<RoomPlatformStatus>>;
}

/// Simple in-memory user store for testing and single-instance deployments.
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<UserId, UserRecord>>>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, user: UserRecord) {
        self.users.write().await.insert(user.id, user);
    }

    async fn with_identity<F>(&self, user_id: &UserId, platform: Platform, mutate: F) -> bool
    where
        F: FnOnce(&mut PlatformIdentity),
    {
        let mut users = self.users.write().await;
        match users.get_mut(user_id) {
            Some(user) => {
                let identity = user.identities.entry(platform).or_default();
                mutate(identity);
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.get(user_id).cloned())
    }

    async fn find_by_ids(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, UserRecord>> {
        let users = self.users.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| users.get(id).map(|user| (*id, user.clone())))
            .collect())
    }

    async fn update_platform_identity(
        &self,
        user_id: &UserId,
        platform: Platform,
        identity: PlatformIdentity,
    ) -> Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(user_id) {
            Some(user) => {
                // Whole sub-record replacement, scoped to this platform only.
                user.identities.insert(platform, identity);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_identity_validity(
        &self,
        user_id: &UserId,
        platform: Platform,
        is_valid: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .with_identity(user_id, platform, |identity| {
                identity.is_valid = is_valid;
                identity.last_validation_check = Some(checked_at);
            })
            .await)
    }

    async fn stamp_validation_check(
        &self,
        user_id: &UserId,
        platform: Platform,
        checked_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .with_identity(user_id, platform, |identity| {
                identity.last_validation_check = Some(checked_at);
            })
            .await)
    }

    async fn stamp_refresh_attempt(
        &self,
        user_id: &UserId,
        platform: Platform,
        attempted_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .with_identity(user_id, platform, |identity| {
                identity.last_refresh_attempt = Some(attempted_at);
            })
            .await)
    }

    async fn identities_needing_validation(
        &self,
        checked_before: DateTime<Utc>,
    ) -> Result<Vec<(UserId, Platform, String)>> {
        let users = self.users.read().await;
        let mut due = Vec::new();
        for user in users.values() {
            for (platform, identity) in &user.identities {
                let Some(username) = identity.trimmed_username() else {
                    continue;
                };
                let needs_check = identity
                    .last_validation_check
                    .map(|checked| checked < checked_before)
                    .unwrap_or(true);
                if needs_check {
                    due.push((user.id, *platform, username.to_string()));
                }
            }
        }
        Ok(due)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

/// In-memory room directory: member lists plus per-platform refresh status.
pub struct InMemoryRoomDirectory {
    rooms: Arc<RwLock<HashMap<RoomId, RoomEntry>>>,
}

#[derive(Default)]
struct RoomEntry {
    members: Vec<UserId>,
    platform_status: HashMap<Platform, RoomPlatformStatus>,
}

impl InMemoryRoomDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert_room(&self, room_id: RoomId, members: Vec<UserId>) {
        self.rooms.write().await.insert(
            room_id,
            RoomEntry {
                members,
                platform_status: HashMap::new(),
            },
        );
    }
}

impl Default for InMemoryRoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn member_ids(&self, room_id: &RoomId) -> Result<Option<Vec<UserId>>> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(room_id).map(|entry| entry.members.clone()))
    }

    async fn record_platform_status(
        &self,
        room_id: &RoomId,
        platform: Platform,
        status: RoomPlatformStatus,
    ) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        match rooms.get_mut(room_id) {
            Some(entry) => {
                entry.platform_status.insert(platform, status);
                Ok(())
            }
            None => anyhow::bail!("room {room_id} not found"),
        }
    }

    async fn platform_status(
        &self,
        room_id: &RoomId,
        platform: Platform,
    ) -> Result<Option<RoomPlatformStatus>> {
        let rooms = self.rooms.read().await;
        Ok(rooms
            .get(room_id)
            .and_then(|entry| entry.platform_status.get(&platform).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BulkCounts, GithubStats, PlatformStats, RoomUpdateStatus};
    use uuid::Uuid;

    fn user_with_username(platform: Platform, username: &str) -> UserRecord {
        let mut user = UserRecord::new("tester");
        user.identities
            .insert(platform, PlatformIdentity::with_username(username));
        user
    }

    #[tokio::test]
    async fn test_find_by_ids_skips_unknown() {
        let store = InMemoryUserStore::new();
        let known = user_with_username(Platform::Github, "alice");
        let known_id = known.id;
        store.insert(known).await;

        let unknown = Uuid::new_v4();
        let found = store.find_by_ids(&[known_id, unknown]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&known_id));
    }

    #[tokio::test]
    async fn test_update_platform_identity_is_field_scoped() {
        let store = InMemoryUserStore::new();
        let mut user = user_with_username(Platform::Github, "alice");
        user.identities
            .insert(Platform::Leetcode, PlatformIdentity::with_username("alice_lc"));
        let user_id = user.id;
        store.insert(user).await;

        let mut updated = PlatformIdentity::with_username("alice");
        updated.stats = Some(PlatformStats::Github(GithubStats {
            public_repos: 9,
            ..GithubStats::default()
        }));
        updated.last_updated = Some(Utc::now());
        assert!(
            store
                .update_platform_identity(&user_id, Platform::Github, updated)
                .await
                .unwrap()
        );

        let user = store.find_by_id(&user_id).await.unwrap().unwrap();
        assert!(user.identity(Platform::Github).unwrap().stats.is_some());
        // The other platform's identity is untouched.
        assert_eq!(
            user.username_for(Platform::Leetcode),
            Some("alice_lc"),
            "updating github must not clobber leetcode"
        );
    }

    #[tokio::test]
    async fn test_update_unknown_user_returns_false() {
        let store = InMemoryUserStore::new();
        let result = store
            .update_platform_identity(
                &Uuid::new_v4(),
                Platform::Github,
                PlatformIdentity::default(),
            )
            .await
            .unwrap();
        assert!(!result);
    }

    #[tokio::test]
    async fn test_set_validity_and_stamp_check() {
        let store = InMemoryUserStore::new();
        let user = user_with_username(Platform::Codeforces, "ghost");
        let user_id = user.id;
        store.insert(user).await;

        let checked_at = Utc::now();
        store
            .set_identity_validity(&user_id, Platform::Codeforces, false, checked_at)
            .await
            .unwrap();

        let identity = store
            .find_by_id(&user_id)
            .await
            .unwrap()
            .unwrap()
            .identity(Platform::Codeforces)
            .cloned()
            .unwrap();
        assert!(!identity.is_valid);
        assert_eq!(identity.last_validation_check, Some(checked_at));

        // stamp_validation_check alone must not flip validity back.
        let later = Utc::now();
        store
            .stamp_validation_check(&user_id, Platform::Codeforces, later)
            .await
            .unwrap();
        let identity = store
            .find_by_id(&user_id)
            .await
            .unwrap()
            .unwrap()
            .identity(Platform::Codeforces)
            .cloned()
            .unwrap();
        assert!(!identity.is_valid);
        assert_eq!(identity.last_validation_check, Some(later));
    }

    #[tokio::test]
    async fn test_identities_needing_validation_filters() {
        let store = InMemoryUserStore::new();
        let now = Utc::now();
        let cutoff = now - chrono::Duration::days(7);

        // Never checked: due.
        let never_checked = user_with_username(Platform::Github, "alice");
        let never_checked_id = never_checked.id;
        store.insert(never_checked).await;

        // Checked recently: not due.
        let mut fresh = user_with_username(Platform::Github, "bob");
        if let Some(identity) = fresh.identities.get_mut(&Platform::Github) {
            identity.last_validation_check = Some(now - chrono::Duration::days(1));
        }
        store.insert(fresh).await;

        // Checked long ago: due.
        let mut stale = user_with_username(Platform::Leetcode, "carol");
        let stale_id = stale.id;
        if let Some(identity) = stale.identities.get_mut(&Platform::Leetcode) {
            identity.last_validation_check = Some(now - chrono::Duration::days(10));
        }
        store.insert(stale).await;

        // No username: never due.
        let mut nameless = UserRecord::new("nameless");
        nameless
            .identities
            .insert(Platform::Codeforces, PlatformIdentity::default());
        store.insert(nameless).await;

        let due = store.identities_needing_validation(cutoff).await.unwrap();
        let due_ids: Vec<UserId> = due.iter().map(|(id, _, _)| *id).collect();
        assert_eq!(due.len(), 2);
        assert!(due_ids.contains(&never_checked_id));
        assert!(due_ids.contains(&stale_id));
    }

    #[tokio::test]
    async fn test_room_directory_round_trip() {
        let rooms = InMemoryRoomDirectory::new();
        let room_id = Uuid::new_v4();
        let members = vec![Uuid::new_v4(), Uuid::new_v4()];
        rooms.insert_room(room_id, members.clone()).await;

        assert_eq!(rooms.member_ids(&room_id).await.unwrap(), Some(members));
        assert_eq!(rooms.member_ids(&Uuid::new_v4()).await.unwrap(), None);

        let status = RoomPlatformStatus {
            update_status: RoomUpdateStatus::Completed,
            last_updated: Utc::now(),
            last_results: BulkCounts {
                total: 2,
                processed: 2,
                successful: 2,
                failed: 0,
                skipped: 0,
                from_cache: 1,
            },
        };
        rooms
            .record_platform_status(&room_id, Platform::Github, status.clone())
            .await
            .unwrap();

        let stored = rooms
            .platform_status(&room_id, Platform::Github)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_results, status.last_results);
        assert!(rooms
            .platform_status(&room_id, Platform::Leetcode)
            .await
            .unwrap()
            .is_none());
    }
}
