use anyhow::Context;
use outreach_core::config::Config;
use outreach_core::orchestrator::OutreachDb;
use outreach_core::{io, paths};
use std::path::Path;

const SAMPLE_TEMPLATE: &str = "\
subject: Quick question, {{ first_name | there }}
body: |
  Hi {{ first_name | there }},

  {{ sender }} here. Would a short call next week make sense?
";

const SAMPLE_FOLLOW_UP: &str = "\
body: |
  Hi {{ first_name | there }}, just bumping this in case it got buried.
";

const SAMPLE_CAMPAIGN: &str = "\
# Import with: outreach campaign create --file .outreach/example-campaign.yaml
id: example
name: Example campaign
daily_cap: 100
batch_cap: 25
reply_window_secs: 604800
no_reply_disposition: nurture
variables:
  sender: Your Name
steps:
  - channel: email
    template_ref: intro
    delay_secs: 0
  - channel: email
    template_ref: follow-up
    delay_secs: 259200
";

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing outreach in: {}", root.display());

    for dir in [paths::OUTREACH_DIR, paths::TEMPLATES_DIR, paths::OUTBOX_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    let samples = [
        (paths::template_path(root, "intro"), SAMPLE_TEMPLATE),
        (paths::template_path(root, "follow-up"), SAMPLE_FOLLOW_UP),
        (root.join(paths::OUTREACH_DIR).join("example-campaign.yaml"), SAMPLE_CAMPAIGN),
    ];
    for (path, content) in samples {
        let rel = path.strip_prefix(root).unwrap_or(&path).display().to_string();
        if io::write_if_missing(&path, content.as_bytes())? {
            println!("  created: {rel}");
        } else {
            println!("  exists:  {rel}");
        }
    }

    let db_path = paths::db_path(root);
    OutreachDb::open(&db_path)
        .with_context(|| format!("failed to create database {}", db_path.display()))?;
    println!("  ready:   {}", paths::DB_FILE);

    println!("\nNext: edit the example campaign, then `outreach campaign create --file ...`");
    Ok(())
}
