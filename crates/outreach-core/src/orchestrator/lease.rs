//! Per-campaign single-writer lease.
//!
//! A lease is a row in the `leases` table with a holder, an expiry and a
//! fence token. Every new acquisition increments the fence, so a holder that
//! stalled past its expiry can tell that someone else took over even if the
//! new holder happens to reuse its id. Expiry is the only crash recovery:
//! once `expires_at` passes, any holder may take the lease.
//!
//! Released leases stay in the table, expired in place, so the fence keeps
//! counting up across release/acquire cycles.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::error::{OutreachError, Result};

use super::db::{OutreachDb, WriteTxn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub campaign_id: String,
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
    pub renewed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub fence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
}

impl Lease {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.released_at.is_none() && self.expires_at > now
    }

    fn same_grant(&self, other: &Lease) -> bool {
        self.holder_id == other.holder_id && self.fence == other.fence
    }
}

/// Acquire, renew, validate and release campaign leases.
#[derive(Clone)]
pub struct LeaseManager {
    db: Arc<OutreachDb>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl LeaseManager {
    pub fn new(db: Arc<OutreachDb>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { db, clock, ttl }
    }

    /// Take the lease for `campaign_id`.
    ///
    /// Succeeds when no active lease exists or when `holder_id` already holds
    /// it (which renews). Otherwise fails with `AlreadyHeld`.
    pub fn acquire(&self, campaign_id: &str, holder_id: &str) -> Result<Lease> {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.db.write(|t| {
            let current = t.lease(campaign_id)?;
            let lease = match current {
                Some(l) if l.is_active(now) && l.holder_id == holder_id => Lease {
                    renewed_at: now,
                    expires_at: now + ttl,
                    ..l
                },
                Some(l) if l.is_active(now) => {
                    return Err(OutreachError::AlreadyHeld {
                        campaign: campaign_id.to_string(),
                        holder: l.holder_id,
                        expires_at: l.expires_at,
                    })
                }
                previous => Lease {
                    campaign_id: campaign_id.to_string(),
                    holder_id: holder_id.to_string(),
                    acquired_at: now,
                    renewed_at: now,
                    expires_at: now + ttl,
                    fence: previous.map_or(0, |p| p.fence) + 1,
                    released_at: None,
                },
            };
            t.put_lease(&lease)?;
            debug!(campaign_id, holder_id, fence = lease.fence, "lease acquired");
            Ok(lease)
        })
    }

    /// Extend `lease` by one TTL. Fails with `LeaseLost` unless it is still
    /// the active grant.
    pub fn renew(&self, lease: &mut Lease) -> Result<()> {
        let now = self.clock.now();
        let ttl = self.ttl;
        let renewed = self.db.write(|t| {
            let mut current = current_grant(t, lease, now)?;
            current.renewed_at = now;
            current.expires_at = now + ttl;
            t.put_lease(&current)?;
            Ok(current)
        })?;
        *lease = renewed;
        Ok(())
    }

    /// Check that `lease` is still the active grant without changing it.
    pub fn validate(&self, lease: &Lease) -> Result<()> {
        let now = self.clock.now();
        let current = self.db.lease(&lease.campaign_id)?;
        match current {
            Some(c) if c.same_grant(lease) && c.is_active(now) => Ok(()),
            _ => Err(OutreachError::LeaseLost(lease.campaign_id.clone())),
        }
    }

    /// Give the lease up. Returns false (and changes nothing) when another
    /// grant has replaced it.
    pub fn release(&self, lease: &Lease) -> Result<bool> {
        let now = self.clock.now();
        self.db.write(|t| match t.lease(&lease.campaign_id)? {
            Some(mut c) if c.same_grant(lease) && c.released_at.is_none() => {
                c.released_at = Some(now);
                c.expires_at = c.expires_at.min(now);
                t.put_lease(&c)?;
                debug!(campaign_id = %lease.campaign_id, fence = lease.fence, "lease released");
                Ok(true)
            }
            _ => Ok(false),
        })
    }
}

fn current_grant(t: &WriteTxn, lease: &Lease, now: DateTime<Utc>) -> Result<Lease> {
    match t.lease(&lease.campaign_id)? {
        Some(c) if c.same_grant(lease) && c.is_active(now) => Ok(c),
        _ => Err(OutreachError::LeaseLost(lease.campaign_id.clone())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Barrier;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<OutreachDb>, Arc<ManualClock>, LeaseManager) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(OutreachDb::open(&dir.path().join("test.db")).unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mgr = LeaseManager::new(db.clone(), clock.clone(), Duration::seconds(60));
        (dir, db, clock, mgr)
    }

    #[test]
    fn second_holder_is_refused_until_expiry() {
        let (_dir, _db, clock, mgr) = setup();
        let a = mgr.acquire("camp", "a").unwrap();
        assert_eq!(a.fence, 1);

        match mgr.acquire("camp", "b").unwrap_err() {
            OutreachError::AlreadyHeld { holder, .. } => assert_eq!(holder, "a"),
            other => panic!("expected AlreadyHeld, got {other:?}"),
        }

        clock.advance(Duration::seconds(61));
        let b = mgr.acquire("camp", "b").unwrap();
        assert_eq!(b.fence, 2);
        assert!(matches!(mgr.validate(&a), Err(OutreachError::LeaseLost(_))));
        mgr.validate(&b).unwrap();
    }

    #[test]
    fn reacquire_by_same_holder_renews() {
        let (_dir, _db, clock, mgr) = setup();
        let first = mgr.acquire("camp", "a").unwrap();
        clock.advance(Duration::seconds(30));
        let again = mgr.acquire("camp", "a").unwrap();
        assert_eq!(again.fence, first.fence);
        assert_eq!(again.expires_at, first.expires_at + Duration::seconds(30));
    }

    #[test]
    fn renew_extends_and_detects_loss() {
        let (_dir, _db, clock, mgr) = setup();
        let mut lease = mgr.acquire("camp", "a").unwrap();
        clock.advance(Duration::seconds(50));
        mgr.renew(&mut lease).unwrap();
        clock.advance(Duration::seconds(50));
        mgr.validate(&lease).unwrap();

        clock.advance(Duration::seconds(11));
        assert!(matches!(
            mgr.renew(&mut lease),
            Err(OutreachError::LeaseLost(_))
        ));
    }

    #[test]
    fn release_frees_and_keeps_fence_monotonic() {
        let (_dir, db, _clock, mgr) = setup();
        let a = mgr.acquire("camp", "a").unwrap();
        assert!(mgr.release(&a).unwrap());
        assert!(!mgr.release(&a).unwrap());
        assert!(matches!(mgr.validate(&a), Err(OutreachError::LeaseLost(_))));

        let b = mgr.acquire("camp", "b").unwrap();
        assert_eq!(b.fence, 2);
        assert!(!mgr.release(&a).unwrap());
        assert_eq!(db.lease("camp").unwrap().unwrap().holder_id, "b");
    }

    #[test]
    fn concurrent_acquire_has_one_winner() {
        let (_dir, _db, _clock, mgr) = setup();
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let mgr = mgr.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    mgr.acquire("camp", &format!("holder-{i}")).is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn leases_are_per_campaign() {
        let (_dir, _db, _clock, mgr) = setup();
        mgr.acquire("one", "a").unwrap();
        mgr.acquire("two", "b").unwrap();
    }
}
