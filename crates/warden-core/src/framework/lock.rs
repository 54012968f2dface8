//! Composite-key asynchronous reader/writer locks.
//!
//! [`KeyedLock`] protects cached per-guild and per-member aggregate state.
//! Channels only serialize work within themselves; two channels touching the
//! same member (a message and a voice-state change, say) are serialized by
//! taking the same member lock here.
//!
//! # Lock layout
//!
//! Every guild lazily gets one entry holding:
//!
//! - `aggregate`: protects guild-level state (`LockKey::Guild`)
//! - `writer_gate`: held shared by every per-member writer
//! - `reader_gate`: held shared by every per-member reader
//! - one RW lock per member (`LockKey::Member`)
//!
//! The all-users modes take the gates exclusively, which keeps out every
//! per-member holder that conflicts with them without enumerating members:
//!
//! | Scope | Takes |
//! |-------|-------|
//! | `Read(Guild)` | aggregate (R) |
//! | `Write(Guild)` | aggregate (W) |
//! | `Read(Member)` | reader_gate (R), member (R) |
//! | `Write(Member)` | writer_gate (R), member (W) |
//! | `ReadAllUsers` | aggregate (R), writer_gate (W) |
//! | `WriteAllUsers` | aggregate (W), writer_gate (W), reader_gate (W) |
//!
//! Locks are always taken in the order aggregate, writer_gate, reader_gate,
//! member, and nothing is ever upgraded, so acquisition cannot deadlock.
//! Per-member acquisition never touches `aggregate`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::foundation::error::{LockError, LockResult};
use crate::foundation::id::{GuildId, Identity, UserId};

/// What a lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Guild-level aggregate state.
    Guild(GuildId),
    /// A single member's aggregate state.
    Member(GuildId, UserId),
}

impl LockKey {
    /// Returns the guild this key belongs to.
    pub fn guild(&self) -> GuildId {
        match self {
            Self::Guild(guild) | Self::Member(guild, _) => *guild,
        }
    }
}

impl From<Identity> for LockKey {
    fn from(identity: Identity) -> Self {
        Self::Member(identity.guild, identity.user)
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guild(guild) => write!(f, "guild {guild}"),
            Self::Member(guild, user) => write!(f, "member {guild}/{user}"),
        }
    }
}

/// A lock request, usually derived from an action's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    /// No lock needed.
    #[default]
    None,
    /// Shared access to one key.
    Read(LockKey),
    /// Exclusive access to one key.
    Write(LockKey),
    /// Consistent view of every member of a guild.
    ReadAllUsers(GuildId),
    /// Exclusive access to every member of a guild.
    WriteAllUsers(GuildId),
}

impl LockScope {
    /// Returns the guild this scope touches, if any.
    pub fn guild(&self) -> Option<GuildId> {
        match self {
            Self::None => None,
            Self::Read(key) | Self::Write(key) => Some(key.guild()),
            Self::ReadAllUsers(guild) | Self::WriteAllUsers(guild) => Some(*guild),
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("no lock"),
            Self::Read(key) => write!(f, "read {key}"),
            Self::Write(key) => write!(f, "write {key}"),
            Self::ReadAllUsers(guild) => write!(f, "read all users of guild {guild}"),
            Self::WriteAllUsers(guild) => write!(f, "write all users of guild {guild}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Shared,
    Exclusive,
}

type Slot = Arc<RwLock<()>>;

// Held only so dropping releases them.
#[allow(dead_code)]
enum Held {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

impl Mode {
    async fn acquire(self, slot: Slot) -> Held {
        match self {
            Self::Shared => Held::Shared(slot.read_owned().await),
            Self::Exclusive => Held::Exclusive(slot.write_owned().await),
        }
    }
}

#[derive(Default)]
struct GuildLocks {
    aggregate: Slot,
    writer_gate: Slot,
    reader_gate: Slot,
    members: HashMap<UserId, Slot>,
}

impl GuildLocks {
    fn member(&mut self, user: UserId) -> Slot {
        Arc::clone(self.members.entry(user).or_default())
    }

    fn is_idle(&self) -> bool {
        self.members.is_empty()
            && Arc::strong_count(&self.aggregate) == 1
            && Arc::strong_count(&self.writer_gate) == 1
            && Arc::strong_count(&self.reader_gate) == 1
    }
}

/// Scoped ownership of a [`LockScope`].
///
/// Every sub-lock is released when the guard is dropped, whether the
/// protected code returned normally, returned early with an error, or
/// panicked.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct KeyedGuard {
    scope: LockScope,
    _held: Vec<Held>,
}

impl KeyedGuard {
    /// Returns the scope this guard holds.
    pub fn scope(&self) -> LockScope {
        self.scope
    }
}

impl fmt::Debug for KeyedGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedGuard")
            .field("scope", &self.scope)
            .field("held", &self._held.len())
            .finish()
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        trace!(scope = %self.scope, "Released lock");
    }
}

/// Asynchronous reader/writer locks keyed by guild and member.
///
/// Entries are created on first use. Waiting suspends the task; it never
/// blocks a thread. Locks of different guilds never wait on each other.
#[derive(Default)]
pub struct KeyedLock {
    guilds: Mutex<HashMap<GuildId, GuildLocks>>,
}

impl KeyedLock {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes `key` in shared mode.
    pub async fn read(
        &self,
        key: impl Into<LockKey>,
        token: &CancellationToken,
    ) -> LockResult<KeyedGuard> {
        self.acquire(LockScope::Read(key.into()), token).await
    }

    /// Takes `key` in exclusive mode.
    pub async fn write(
        &self,
        key: impl Into<LockKey>,
        token: &CancellationToken,
    ) -> LockResult<KeyedGuard> {
        self.acquire(LockScope::Write(key.into()), token).await
    }

    /// Takes a consistent read view over every member of `guild`.
    ///
    /// Per-member readers may proceed concurrently; per-member writers wait.
    pub async fn read_all_users(
        &self,
        guild: GuildId,
        token: &CancellationToken,
    ) -> LockResult<KeyedGuard> {
        self.acquire(LockScope::ReadAllUsers(guild), token).await
    }

    /// Takes exclusive access to every member of `guild`.
    pub async fn write_all_users(
        &self,
        guild: GuildId,
        token: &CancellationToken,
    ) -> LockResult<KeyedGuard> {
        self.acquire(LockScope::WriteAllUsers(guild), token).await
    }

    /// Acquires whatever `scope` asks for.
    ///
    /// If `token` fires before every sub-lock is held, the ones already
    /// taken are released and [`LockError::Cancelled`] is returned.
    pub async fn acquire(
        &self,
        scope: LockScope,
        token: &CancellationToken,
    ) -> LockResult<KeyedGuard> {
        let plan = self.plan(scope);
        let mut held = Vec::with_capacity(plan.len());

        for (slot, mode) in plan {
            let guard = tokio::select! {
                biased;
                guard = mode.acquire(slot) => guard,
                () = token.cancelled() => {
                    warn!(
                        scope = %scope,
                        partially_held = held.len(),
                        "Lock acquisition cancelled, releasing partial locks"
                    );
                    return Err(LockError::Cancelled {
                        guild: scope.guild().unwrap_or(GuildId(0)),
                        scope: scope.to_string(),
                    });
                }
            };
            held.push(guard);
        }

        trace!(scope = %scope, "Acquired lock");
        Ok(KeyedGuard { scope, _held: held })
    }

    /// Resolves a scope into the ordered list of sub-locks to take.
    ///
    /// Runs entirely under the table mutex so a concurrent prune can never
    /// drop an entry someone is about to wait on.
    fn plan(&self, scope: LockScope) -> Vec<(Slot, Mode)> {
        let Some(guild) = scope.guild() else {
            return Vec::new();
        };

        let mut guilds = self.guilds.lock();
        let entry = guilds.entry(guild).or_default();

        match scope {
            LockScope::None => Vec::new(),
            LockScope::Read(LockKey::Guild(_)) => {
                vec![(Arc::clone(&entry.aggregate), Mode::Shared)]
            }
            LockScope::Write(LockKey::Guild(_)) => {
                vec![(Arc::clone(&entry.aggregate), Mode::Exclusive)]
            }
            LockScope::Read(LockKey::Member(_, user)) => vec![
                (Arc::clone(&entry.reader_gate), Mode::Shared),
                (entry.member(user), Mode::Shared),
            ],
            LockScope::Write(LockKey::Member(_, user)) => vec![
                (Arc::clone(&entry.writer_gate), Mode::Shared),
                (entry.member(user), Mode::Exclusive),
            ],
            LockScope::ReadAllUsers(_) => vec![
                (Arc::clone(&entry.aggregate), Mode::Shared),
                (Arc::clone(&entry.writer_gate), Mode::Exclusive),
            ],
            LockScope::WriteAllUsers(_) => vec![
                (Arc::clone(&entry.aggregate), Mode::Exclusive),
                (Arc::clone(&entry.writer_gate), Mode::Exclusive),
                (Arc::clone(&entry.reader_gate), Mode::Exclusive),
            ],
        }
    }

    /// Drops entries nobody holds or waits on. Returns how many member
    /// entries were removed.
    pub fn prune_idle(&self) -> usize {
        let mut guilds = self.guilds.lock();
        let mut removed = 0;

        for locks in guilds.values_mut() {
            let before = locks.members.len();
            locks.members.retain(|_, slot| Arc::strong_count(slot) > 1);
            removed += before - locks.members.len();
        }
        guilds.retain(|_, locks| !locks.is_idle());

        removed
    }

    /// Returns the number of guilds with a live entry.
    pub fn guild_count(&self) -> usize {
        self.guilds.lock().len()
    }
}

impl fmt::Debug for KeyedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLock")
            .field("guilds", &self.guild_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready_ok};

    fn member(guild: u64, user: u64) -> LockKey {
        LockKey::Member(GuildId(guild), UserId(user))
    }

    #[tokio::test]
    async fn test_writer_excludes_reader_same_member() {
        let locks = KeyedLock::new();
        let token = CancellationToken::new();

        let writer = locks.write(member(1, 7), &token).await.unwrap();

        let mut reader = tokio_test::task::spawn(locks.read(member(1, 7), &token));
        assert_pending!(reader.poll());

        // A different member of the same guild is not affected.
        let other = tokio::time::timeout(
            Duration::from_millis(100),
            locks.write(member(1, 8), &token),
        )
        .await
        .expect("writer on another member must not wait");
        assert!(other.is_ok());

        drop(writer);
        assert!(reader.is_woken());
        let guard = assert_ready_ok!(reader.poll());
        assert_eq!(guard.scope(), LockScope::Read(member(1, 7)));
    }

    #[tokio::test]
    async fn test_readers_share_member() {
        let locks = KeyedLock::new();
        let token = CancellationToken::new();

        let _a = locks.read(member(1, 7), &token).await.unwrap();
        let mut b = tokio_test::task::spawn(locks.read(member(1, 7), &token));
        assert_ready_ok!(b.poll());

        let mut writer = tokio_test::task::spawn(locks.write(member(1, 7), &token));
        assert_pending!(writer.poll());
    }

    #[tokio::test]
    async fn test_write_all_users_excludes_members() {
        let locks = KeyedLock::new();
        let token = CancellationToken::new();

        let all = locks.write_all_users(GuildId(1), &token).await.unwrap();

        let mut reader = tokio_test::task::spawn(locks.read(member(1, 3), &token));
        let mut writer = tokio_test::task::spawn(locks.write(member(1, 4), &token));
        let mut guild = tokio_test::task::spawn(locks.read(LockKey::Guild(GuildId(1)), &token));
        assert_pending!(reader.poll());
        assert_pending!(writer.poll());
        assert_pending!(guild.poll());

        drop(all);
        assert_ready_ok!(reader.poll());
        assert_ready_ok!(writer.poll());
        assert_ready_ok!(guild.poll());
    }

    #[tokio::test]
    async fn test_member_lock_blocks_write_all_users() {
        let locks = KeyedLock::new();
        let token = CancellationToken::new();

        let member_guard = locks.read(member(1, 9), &token).await.unwrap();

        let mut all = tokio_test::task::spawn(locks.write_all_users(GuildId(1), &token));
        assert_pending!(all.poll());

        drop(member_guard);
        assert_ready_ok!(all.poll());
    }

    #[tokio::test]
    async fn test_read_all_users_admits_readers_not_writers() {
        let locks = KeyedLock::new();
        let token = CancellationToken::new();

        let all = locks.read_all_users(GuildId(1), &token).await.unwrap();

        let mut reader = tokio_test::task::spawn(locks.read(member(1, 3), &token));
        assert_ready_ok!(reader.poll());

        let mut writer = tokio_test::task::spawn(locks.write(member(1, 3), &token));
        assert_pending!(writer.poll());

        drop(all);
        drop(reader);
        assert_ready_ok!(writer.poll());
    }

    #[tokio::test]
    async fn test_cancelled_write_all_users_releases_partial_locks() {
        let locks = KeyedLock::new();
        let outer = CancellationToken::new();
        let token = CancellationToken::new();

        // A member reader holds the reader gate, so the bulk lock gets stuck
        // after taking the aggregate lock and the writer gate.
        let reader = locks.read(member(1, 7), &outer).await.unwrap();

        let mut all = tokio_test::task::spawn(locks.write_all_users(GuildId(1), &token));
        assert_pending!(all.poll());

        token.cancel();
        let result = all.poll();
        assert!(matches!(
            result,
            std::task::Poll::Ready(Err(LockError::Cancelled { .. }))
        ));
        drop(all);

        // Nothing the cancelled request took is still held.
        let mut guild = tokio_test::task::spawn(locks.write(LockKey::Guild(GuildId(1)), &outer));
        assert_ready_ok!(guild.poll());
        let mut writer = tokio_test::task::spawn(locks.write(member(1, 8), &outer));
        assert_ready_ok!(writer.poll());

        drop(reader);
    }

    #[tokio::test]
    async fn test_release_after_error() {
        let locks = KeyedLock::new();
        let token = CancellationToken::new();

        async fn failing(locks: &KeyedLock, token: &CancellationToken) -> Result<(), String> {
            let _guard = locks.write(member(2, 2), token).await.map_err(|e| e.to_string())?;
            Err("protected code failed".to_string())
        }

        assert!(failing(&locks, &token).await.is_err());

        let again = tokio::time::timeout(
            Duration::from_millis(100),
            locks.write(member(2, 2), &token),
        )
        .await
        .expect("lock must be free after the failing holder returned");
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_release_after_panic() {
        let locks = Arc::new(KeyedLock::new());
        let token = CancellationToken::new();

        let task_locks = Arc::clone(&locks);
        let task_token = token.clone();
        let result = tokio::spawn(async move {
            let _guard = task_locks.write(member(3, 1), &task_token).await.unwrap();
            panic!("protected code panicked");
        })
        .await;
        assert!(result.is_err());

        let again = tokio::time::timeout(
            Duration::from_millis(100),
            locks.write(member(3, 1), &token),
        )
        .await
        .expect("lock must be free after the panicking holder unwound");
        assert!(again.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_guilds_are_independent_under_stress() {
        let locks = Arc::new(KeyedLock::new());
        let token = CancellationToken::new();

        // Guild A is locked for the whole test.
        let held = locks.write_all_users(GuildId(100), &token).await.unwrap();

        let done = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for i in 0..64u64 {
            let locks = Arc::clone(&locks);
            let token = token.clone();
            let done = Arc::clone(&done);
            tasks.push(tokio::spawn(async move {
                for round in 0..20u64 {
                    let key = member(200, (i + round) % 8);
                    let _g = if round % 3 == 0 {
                        locks.write(key, &token).await.unwrap()
                    } else {
                        locks.read(key, &token).await.unwrap()
                    };
                    tokio::task::yield_now().await;
                }
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(tasks))
            .await
            .expect("guild B must make progress while guild A is held");
        assert_eq!(done.load(Ordering::SeqCst), 64);
        drop(held);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_member_writers_are_mutually_exclusive() {
        let locks = Arc::new(KeyedLock::new());
        let token = CancellationToken::new();
        let inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let locks = Arc::clone(&locks);
            let token = token.clone();
            let inside = Arc::clone(&inside);
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    let _g = locks.write(member(1, 1), &token).await.unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    tokio::task::yield_now().await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }

        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
    }

    #[tokio::test]
    async fn test_prune_idle() {
        let locks = KeyedLock::new();
        let token = CancellationToken::new();

        let kept = locks.read(member(1, 1), &token).await.unwrap();
        drop(locks.write(member(1, 2), &token).await.unwrap());
        drop(locks.write(member(2, 1), &token).await.unwrap());
        assert_eq!(locks.guild_count(), 2);

        assert_eq!(locks.prune_idle(), 2);
        assert_eq!(locks.guild_count(), 1);

        drop(kept);
        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.guild_count(), 0);
    }

    #[tokio::test]
    async fn test_no_scope_is_free() {
        let locks = KeyedLock::new();
        let token = CancellationToken::new();
        token.cancel();

        let guard = locks.acquire(LockScope::None, &token).await.unwrap();
        assert_eq!(guard.scope(), LockScope::None);
        assert_eq!(locks.guild_count(), 0);
    }
}
