use crate::error::{OutreachError, Result};
use crate::paths;
use crate::types::Channel;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// SequenceStep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub channel: Channel,
    pub template_ref: String,
    /// Delay from the previous step; for step 0, delay from qualification.
    #[serde(default)]
    pub delay_secs: u64,
}

// ---------------------------------------------------------------------------
// NoReplyDisposition
// ---------------------------------------------------------------------------

/// Where a lead goes once its reply window closes without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoReplyDisposition {
    #[default]
    Nurture,
    Lose,
}

impl fmt::Display for NoReplyDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoReplyDisposition::Nurture => f.write_str("nurture"),
            NoReplyDisposition::Lose => f.write_str("lose"),
        }
    }
}

// ---------------------------------------------------------------------------
// CampaignDefinition
// ---------------------------------------------------------------------------

/// Operator-authored campaign file, as imported by `campaign create --file`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_daily_cap")]
    pub daily_cap: u32,
    #[serde(default = "default_batch_cap")]
    pub batch_cap: u32,
    /// Defaults to the channels used by `steps`.
    #[serde(default)]
    pub enabled_channels: Vec<Channel>,
    pub steps: Vec<SequenceStep>,
    #[serde(default = "default_reply_window")]
    pub reply_window_secs: u64,
    #[serde(default)]
    pub no_reply_disposition: NoReplyDisposition,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

fn default_daily_cap() -> u32 {
    100
}

fn default_batch_cap() -> u32 {
    25
}

fn default_reply_window() -> u64 {
    7 * 24 * 3600
}

impl CampaignDefinition {
    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    fn channels(&self) -> Vec<Channel> {
        if !self.enabled_channels.is_empty() {
            let mut c = self.enabled_channels.clone();
            c.sort();
            c.dedup();
            return c;
        }
        let mut c: Vec<Channel> = self.steps.iter().map(|s| s.channel).collect();
        c.sort();
        c.dedup();
        c
    }
}

// ---------------------------------------------------------------------------
// Campaign
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub daily_cap: u32,
    pub batch_cap: u32,
    pub enabled_channels: Vec<Channel>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub killed: bool,
    pub steps: Vec<SequenceStep>,
    pub reply_window_secs: u64,
    #[serde(default)]
    pub no_reply_disposition: NoReplyDisposition,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn from_definition(def: CampaignDefinition, now: DateTime<Utc>) -> Result<Self> {
        let campaign = Self {
            name: def.name.clone().unwrap_or_else(|| def.id.clone()),
            enabled_channels: def.channels(),
            id: def.id,
            daily_cap: def.daily_cap,
            batch_cap: def.batch_cap,
            paused: false,
            killed: false,
            steps: def.steps,
            reply_window_secs: def.reply_window_secs,
            no_reply_disposition: def.no_reply_disposition,
            variables: def.variables,
            created_at: now,
            updated_at: now,
        };
        campaign.validate()?;
        Ok(campaign)
    }

    pub fn validate(&self) -> Result<()> {
        paths::validate_slug(&self.id)?;
        let invalid = |reason: String| OutreachError::InvalidCampaign {
            campaign: self.id.clone(),
            reason,
        };
        if self.steps.is_empty() {
            return Err(invalid("at least one sequence step is required".into()));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if !self.enabled_channels.contains(&step.channel) {
                return Err(invalid(format!(
                    "step {i} uses channel '{}' which is not enabled",
                    step.channel
                )));
            }
            paths::validate_slug(&step.template_ref)
                .map_err(|_| invalid(format!("step {i} has invalid template_ref '{}'", step.template_ref)))?;
        }
        Ok(())
    }

    /// Replace the mutable settings from `def`.
    ///
    /// When `steps_locked` is set (some attempt already references this
    /// campaign) the existing steps must be kept verbatim; new steps may
    /// only be appended.
    pub fn apply_update(
        &mut self,
        def: CampaignDefinition,
        steps_locked: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if def.id != self.id {
            return Err(OutreachError::InvalidCampaign {
                campaign: self.id.clone(),
                reason: format!("definition id '{}' does not match", def.id),
            });
        }
        if steps_locked {
            for (index, existing) in self.steps.iter().enumerate() {
                if def.steps.get(index) != Some(existing) {
                    return Err(OutreachError::StepImmutable {
                        campaign: self.id.clone(),
                        index,
                    });
                }
            }
        }
        let mut updated = self.clone();
        updated.name = def.name.clone().unwrap_or_else(|| self.name.clone());
        updated.enabled_channels = def.channels();
        updated.daily_cap = def.daily_cap;
        updated.batch_cap = def.batch_cap;
        updated.steps = def.steps;
        updated.reply_window_secs = def.reply_window_secs;
        updated.no_reply_disposition = def.no_reply_disposition;
        updated.variables = def.variables;
        updated.updated_at = now;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn step(&self, index: u32) -> Option<&SequenceStep> {
        self.steps.get(index as usize)
    }

    /// True once every step has been delivered to a lead at `sequence_index`.
    pub fn is_sequence_complete(&self, sequence_index: u32) -> bool {
        sequence_index as usize >= self.steps.len()
    }

    /// When the step at `index` becomes due, counting from `from`.
    pub fn step_due_at(&self, index: u32, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.step(index)
            .map(|s| from + Duration::seconds(s.delay_secs.min(i64::MAX as u64) as i64))
    }

    /// Schedule after step `sent_index` was delivered at `now`: the next step's
    /// delay, or the reply window after the final step.
    pub fn next_action_after(&self, sent_index: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        self.step_due_at(sent_index + 1, now).unwrap_or_else(|| {
            now + Duration::seconds(self.reply_window_secs.min(i64::MAX as u64) as i64)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
