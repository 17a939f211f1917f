//! Persistent storage for campaigns, leads, attempts and leases using redb.
//!
//! # Table design
//!
//! Values are JSON-encoded. The `due` table is a pure index:
//! ```text
//! ( campaign_id, next_action_at_ms: u64, lead_id ) -> ()
//! ```
//! redb orders tuple keys element by element, so one range scan from
//! `(c, 0, "")` to `(c, now_ms + 1, "")` yields every due lead of a campaign
//! in `(next_action_at, lead_id)` order. [`WriteTxn::put_lead`] keeps the
//! index in step with the lead row inside the same transaction.
//!
//! Terminal leads are never indexed.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::campaign::Campaign;
use crate::error::{OutreachError, Result};
use crate::lead::Lead;
use crate::ledger::OutreachAttempt;
use crate::signal::LeadSignal;
use crate::suppression::SuppressionEntry;

use super::lease::Lease;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const CAMPAIGNS: TableDefinition<&str, &[u8]> = TableDefinition::new("campaigns");
const LEADS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("leads");
const DUE: TableDefinition<(&str, u64, &str), ()> = TableDefinition::new("due");
/// Key: idempotency key.
const ATTEMPTS: TableDefinition<&str, &[u8]> = TableDefinition::new("attempts");
const LEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("leases");
/// Key: `"<kind>:<value>"`.
const SUPPRESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("suppressions");
/// Key: (campaign, UTC date `YYYY-MM-DD`).
const SEND_COUNTS: TableDefinition<(&str, &str), u64> = TableDefinition::new("send_counts");
/// Key: (campaign, sequence number). FIFO per campaign.
const SIGNALS: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("signals");

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn store_err(e: impl std::fmt::Display) -> OutreachError {
    OutreachError::Store(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(store_err)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(store_err)
}

fn due_ms(at: DateTime<Utc>) -> u64 {
    at.timestamp_millis().max(0) as u64
}

fn get_json<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> Result<Option<T>> {
    match table.get(key).map_err(store_err)? {
        Some(v) => Ok(Some(decode(v.value())?)),
        None => Ok(None),
    }
}

fn scan_json<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for entry in table.iter().map_err(store_err)? {
        let (_, v) = entry.map_err(store_err)?;
        out.push(decode(v.value())?);
    }
    Ok(out)
}

fn get_lead_in(
    table: &impl ReadableTable<(&'static str, &'static str), &'static [u8]>,
    campaign_id: &str,
    lead_id: &str,
) -> Result<Option<Lead>> {
    match table.get((campaign_id, lead_id)).map_err(store_err)? {
        Some(v) => Ok(Some(decode(v.value())?)),
        None => Ok(None),
    }
}

fn leads_of(
    table: &impl ReadableTable<(&'static str, &'static str), &'static [u8]>,
    campaign_id: &str,
) -> Result<Vec<Lead>> {
    let mut out = Vec::new();
    for entry in table.range((campaign_id, "")..).map_err(store_err)? {
        let (k, v) = entry.map_err(store_err)?;
        if k.value().0 != campaign_id {
            break;
        }
        out.push(decode(v.value())?);
    }
    Ok(out)
}

fn first_suppression(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    keys: &[String],
) -> Result<Option<SuppressionEntry>> {
    for key in keys {
        if let Some(entry) = get_json(table, key)? {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

fn count_in(
    table: &impl ReadableTable<(&'static str, &'static str), u64>,
    campaign_id: &str,
    day: &str,
) -> Result<u64> {
    Ok(table
        .get((campaign_id, day))
        .map_err(store_err)?
        .map(|v| v.value())
        .unwrap_or(0))
}

fn signals_of(
    table: &impl ReadableTable<(&'static str, u64), &'static [u8]>,
    campaign_id: &str,
) -> Result<Vec<(u64, LeadSignal)>> {
    let mut out = Vec::new();
    for entry in table
        .range((campaign_id, 0u64)..=(campaign_id, u64::MAX))
        .map_err(store_err)?
    {
        let (k, v) = entry.map_err(store_err)?;
        out.push((k.value().1, decode(v.value())?));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// OutreachDb
// ---------------------------------------------------------------------------

/// The single database behind every campaign.
pub struct OutreachDb {
    db: Database,
}

impl OutreachDb {
    /// Open or create the redb database at `path`, creating every table up
    /// front so readers never see a missing table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(CAMPAIGNS).map_err(store_err)?;
        wt.open_table(LEADS).map_err(store_err)?;
        wt.open_table(DUE).map_err(store_err)?;
        wt.open_table(ATTEMPTS).map_err(store_err)?;
        wt.open_table(LEASES).map_err(store_err)?;
        wt.open_table(SUPPRESSIONS).map_err(store_err)?;
        wt.open_table(SEND_COUNTS).map_err(store_err)?;
        wt.open_table(SIGNALS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    /// Run `f` in one write transaction. Commits on `Ok`, aborts on `Err`.
    ///
    /// `f` is synchronous, so a transaction can never be held across an
    /// `.await`.
    pub fn write<T>(&self, f: impl FnOnce(&WriteTxn) -> Result<T>) -> Result<T> {
        let txn = WriteTxn {
            wt: self.db.begin_write().map_err(store_err)?,
        };
        let out = f(&txn)?;
        txn.wt.commit().map_err(store_err)?;
        Ok(out)
    }

    pub fn campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(CAMPAIGNS).map_err(store_err)?;
        get_json(&table, id)
    }

    /// Load a campaign, failing with `CampaignNotFound` when absent.
    pub fn require_campaign(&self, id: &str) -> Result<Campaign> {
        self.campaign(id)?
            .ok_or_else(|| OutreachError::CampaignNotFound(id.to_string()))
    }

    /// All campaigns, sorted by id.
    pub fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(CAMPAIGNS).map_err(store_err)?;
        scan_json(&table)
    }

    pub fn lead(&self, campaign_id: &str, lead_id: &str) -> Result<Option<Lead>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(LEADS).map_err(store_err)?;
        get_lead_in(&table, campaign_id, lead_id)
    }

    /// All leads of a campaign, sorted by lead id.
    pub fn list_leads(&self, campaign_id: &str) -> Result<Vec<Lead>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(LEADS).map_err(store_err)?;
        leads_of(&table, campaign_id)
    }

    /// Non-terminal leads with `next_action_at <= now`, ordered by
    /// `(next_action_at, lead_id)`, at most `limit` of them.
    pub fn due_leads(&self, campaign_id: &str, now: DateTime<Utc>, limit: usize) -> Result<Vec<Lead>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let due = rt.open_table(DUE).map_err(store_err)?;
        let leads = rt.open_table(LEADS).map_err(store_err)?;
        let upper = due_ms(now).saturating_add(1);

        let mut out = Vec::new();
        for entry in due
            .range((campaign_id, 0u64, "")..(campaign_id, upper, ""))
            .map_err(store_err)?
        {
            if out.len() >= limit {
                break;
            }
            let (k, _) = entry.map_err(store_err)?;
            let (_, _, lead_id) = k.value();
            if let Some(lead) = get_lead_in(&leads, campaign_id, lead_id)? {
                if !lead.state.is_terminal() {
                    out.push(lead);
                }
            }
        }
        Ok(out)
    }

    pub fn attempt(&self, key: &str) -> Result<Option<OutreachAttempt>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ATTEMPTS).map_err(store_err)?;
        get_json(&table, key)
    }

    /// Attempts of one campaign (or all), newest first.
    pub fn list_attempts(&self, campaign_id: Option<&str>) -> Result<Vec<OutreachAttempt>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ATTEMPTS).map_err(store_err)?;
        let mut all: Vec<OutreachAttempt> = scan_json(&table)?;
        if let Some(c) = campaign_id {
            all.retain(|a| a.campaign_id == c);
        }
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    pub fn lease(&self, campaign_id: &str) -> Result<Option<Lease>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(LEASES).map_err(store_err)?;
        get_json(&table, campaign_id)
    }

    pub fn list_suppressions(&self) -> Result<Vec<SuppressionEntry>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SUPPRESSIONS).map_err(store_err)?;
        scan_json(&table)
    }

    /// First suppression entry matching any of `keys`.
    pub fn suppression_for(&self, keys: &[String]) -> Result<Option<SuppressionEntry>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SUPPRESSIONS).map_err(store_err)?;
        first_suppression(&table, keys)
    }

    pub fn send_count(&self, campaign_id: &str, day: &str) -> Result<u64> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SEND_COUNTS).map_err(store_err)?;
        count_in(&table, campaign_id, day)
    }

    /// Queued signals for a campaign in arrival order.
    pub fn pending_signals(&self, campaign_id: &str) -> Result<Vec<(u64, LeadSignal)>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(SIGNALS).map_err(store_err)?;
        signals_of(&table, campaign_id)
    }
}

// ---------------------------------------------------------------------------
// WriteTxn
// ---------------------------------------------------------------------------

/// A write transaction handed to [`OutreachDb::write`] closures.
///
/// Each method opens the table it needs and drops it before returning, so
/// methods can be freely combined inside one transaction.
pub struct WriteTxn {
    wt: WriteTransaction,
}

impl WriteTxn {
    pub fn campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let table = self.wt.open_table(CAMPAIGNS).map_err(store_err)?;
        get_json(&table, id)
    }

    pub fn put_campaign(&self, campaign: &Campaign) -> Result<()> {
        let value = encode(campaign)?;
        let mut table = self.wt.open_table(CAMPAIGNS).map_err(store_err)?;
        table
            .insert(campaign.id.as_str(), value.as_slice())
            .map_err(store_err)?;
        Ok(())
    }

    pub fn lead(&self, campaign_id: &str, lead_id: &str) -> Result<Option<Lead>> {
        let table = self.wt.open_table(LEADS).map_err(store_err)?;
        get_lead_in(&table, campaign_id, lead_id)
    }

    /// Insert or replace a lead and move its entry in the due index.
    pub fn put_lead(&self, lead: &Lead) -> Result<()> {
        let value = encode(lead)?;
        let key = (lead.campaign_id.as_str(), lead.id.as_str());

        let previous_due = {
            let mut leads = self.wt.open_table(LEADS).map_err(store_err)?;
            let previous = get_lead_in(&leads, key.0, key.1)?;
            leads.insert(key, value.as_slice()).map_err(store_err)?;
            previous.and_then(|p| p.next_action_at)
        };

        let mut due = self.wt.open_table(DUE).map_err(store_err)?;
        if let Some(at) = previous_due {
            due.remove((key.0, due_ms(at), key.1)).map_err(store_err)?;
        }
        if let Some(at) = lead.next_action_at.filter(|_| !lead.state.is_terminal()) {
            due.insert((key.0, due_ms(at), key.1), ()).map_err(store_err)?;
        }
        Ok(())
    }

    /// Insert a lead only if its identity is not already present.
    /// Returns true if inserted.
    pub fn insert_lead(&self, lead: &Lead) -> Result<bool> {
        if self.lead(&lead.campaign_id, &lead.id)?.is_some() {
            return Ok(false);
        }
        self.put_lead(lead)?;
        Ok(true)
    }

    pub fn attempt(&self, key: &str) -> Result<Option<OutreachAttempt>> {
        let table = self.wt.open_table(ATTEMPTS).map_err(store_err)?;
        get_json(&table, key)
    }

    pub fn put_attempt(&self, attempt: &OutreachAttempt) -> Result<()> {
        let value = encode(attempt)?;
        let mut table = self.wt.open_table(ATTEMPTS).map_err(store_err)?;
        table
            .insert(attempt.idempotency_key.as_str(), value.as_slice())
            .map_err(store_err)?;
        Ok(())
    }

    pub fn attempts_for(&self, campaign_id: &str) -> Result<Vec<OutreachAttempt>> {
        let table = self.wt.open_table(ATTEMPTS).map_err(store_err)?;
        let mut all: Vec<OutreachAttempt> = scan_json(&table)?;
        all.retain(|a| a.campaign_id == campaign_id);
        Ok(all)
    }

    pub fn lease(&self, campaign_id: &str) -> Result<Option<Lease>> {
        let table = self.wt.open_table(LEASES).map_err(store_err)?;
        get_json(&table, campaign_id)
    }

    pub fn put_lease(&self, lease: &Lease) -> Result<()> {
        let value = encode(lease)?;
        let mut table = self.wt.open_table(LEASES).map_err(store_err)?;
        table
            .insert(lease.campaign_id.as_str(), value.as_slice())
            .map_err(store_err)?;
        Ok(())
    }

    /// Add an entry. Returns false if the key was already suppressed (the
    /// original entry is kept).
    pub fn put_suppression(&self, entry: &SuppressionEntry) -> Result<bool> {
        let key = entry.key();
        let mut table = self.wt.open_table(SUPPRESSIONS).map_err(store_err)?;
        if table.get(key.as_str()).map_err(store_err)?.is_some() {
            return Ok(false);
        }
        let value = encode(entry)?;
        table
            .insert(key.as_str(), value.as_slice())
            .map_err(store_err)?;
        Ok(true)
    }

    pub fn send_count(&self, campaign_id: &str, day: &str) -> Result<u64> {
        let table = self.wt.open_table(SEND_COUNTS).map_err(store_err)?;
        count_in(&table, campaign_id, day)
    }

    pub fn increment_send_count(&self, campaign_id: &str, day: &str) -> Result<u64> {
        let mut table = self.wt.open_table(SEND_COUNTS).map_err(store_err)?;
        let next = count_in(&table, campaign_id, day)? + 1;
        table.insert((campaign_id, day), next).map_err(store_err)?;
        Ok(next)
    }

    /// Append a signal to the campaign's queue, returning its sequence number.
    pub fn push_signal(&self, signal: &LeadSignal) -> Result<u64> {
        let c = signal.campaign_id.as_str();
        let mut table = self.wt.open_table(SIGNALS).map_err(store_err)?;
        let last = table
            .range((c, 0u64)..=(c, u64::MAX))
            .map_err(store_err)?
            .next_back()
            .transpose()
            .map_err(store_err)?
            .map(|(k, _)| k.value().1);
        let seq = last.map_or(0, |s| s + 1);
        let value = encode(signal)?;
        table.insert((c, seq), value.as_slice()).map_err(store_err)?;
        Ok(seq)
    }

    pub fn remove_signal(&self, campaign_id: &str, seq: u64) -> Result<()> {
        let mut table = self.wt.open_table(SIGNALS).map_err(store_err)?;
        table.remove((campaign_id, seq)).map_err(store_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
