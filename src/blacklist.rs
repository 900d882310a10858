//! Token blacklist (C11): bounded in-memory JTI -> expiry map used to
//! reject revoked/logged-out access tokens before their natural `exp`
//! (spec.md §4.14). Swept periodically by the scheduler so the map never
//! grows past the set of tokens that are both blacklisted and unexpired.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct Blacklist {
    entries: DashMap<Uuid, DateTime<Utc>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Blacklist a JTI until its token's own expiry; entries past their
    /// expiry are meaningless so swept away on the next pass.
    pub fn insert(&self, jti: Uuid, expires_at: DateTime<Utc>) {
        self.entries.insert(jti, expires_at);
    }

    /// O(1) membership check. An expired-but-unswept entry is treated as
    /// not blacklisted (the token would already fail `exp` validation).
    pub fn is_blacklisted(&self, jti: Uuid) -> bool {
        match self.entries.get(&jti) {
            Some(expires_at) => *expires_at > Utc::now(),
            None => false,
        }
    }

    /// Drop entries whose underlying token has already expired.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn insert_and_check() {
        let bl = Blacklist::new();
        let jti = Uuid::new_v4();
        assert!(!bl.is_blacklisted(jti));
        bl.insert(jti, Utc::now() + Duration::seconds(60));
        assert!(bl.is_blacklisted(jti));
    }

    #[test]
    fn sweep_drops_expired_entries_only() {
        let bl = Blacklist::new();
        let expired = Uuid::new_v4();
        let live = Uuid::new_v4();
        bl.insert(expired, Utc::now() - Duration::seconds(1));
        bl.insert(live, Utc::now() + Duration::seconds(60));

        let dropped = bl.sweep();
        assert_eq!(dropped, 1);
        assert!(!bl.is_blacklisted(expired));
        assert!(bl.is_blacklisted(live));
        assert_eq!(bl.len(), 1);
    }
}
