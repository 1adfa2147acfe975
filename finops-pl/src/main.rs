//! finops-pl - Pattern Learning service binary
//!
//! Runs one learning cycle for a tenant: scans the tenant's transactions,
//! records pattern occurrences, then validates all pending patterns against
//! the configured language model.
//!
//! Usage:
//!   finops-pl <tenant_id>                  run a learning + validation cycle
//!   finops-pl <tenant_id> report           print per-status pattern counts
//!   finops-pl <tenant_id> reset-rejected   reset rejected patterns to pending

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use finops_common::events::EventBus;
use finops_pl::db::{patterns, transactions};
use finops_pl::services::{group_transactions, ChatLlmClient, OccurrenceTracker};
use finops_pl::ValidationPass;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args = std::env::args().skip(1);
    let tenant_id = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("Usage: finops-pl <tenant_id> [report|reset-rejected]"))?;
    let command = args.next();

    info!("Starting finops-pl (Pattern Learning)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Tenant: {}", tenant_id);

    // Resolve data folder and open the database
    let data_folder = finops_common::config::resolve_data_folder(None);
    let db_path = finops_common::config::database_path(&data_folder);
    info!("Database: {}", db_path.display());
    let db_pool = finops_common::db::init_database(&db_path).await?;

    match command.as_deref() {
        Some("report") => {
            for (status, count) in patterns::count_by_status(&db_pool, &tenant_id).await? {
                println!("{:12} {}", status, count);
            }
            return Ok(());
        }
        Some("reset-rejected") => {
            let reset = patterns::reset_rejected(&db_pool, &tenant_id).await?;
            info!(tenant_id, reset, "Reset rejected patterns to pending");
            return Ok(());
        }
        Some(other) => {
            anyhow::bail!("Unknown command: {}", other);
        }
        None => {}
    }

    // Learning phase: group the tenant's transactions and record occurrences
    let window = transactions::list_transactions(&db_pool, &tenant_id).await?;
    info!(transaction_count = window.len(), "Loaded transaction window");
    let groups = group_transactions(&window, true);
    let tracker = OccurrenceTracker::new(db_pool.clone());
    let candidates = tracker.record_groups(&tenant_id, &groups).await?;
    info!(pattern_count = candidates.len(), "Recorded pattern occurrences");

    // Validation phase: one LLM call per pending pattern, bounded concurrency
    let llm_config = finops_common::config::LlmConfig::load()?;
    let concurrency = llm_config.concurrency;
    let client = ChatLlmClient::new(llm_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize LLM client: {}", e))?;

    let event_bus = EventBus::new(100);
    let pass = ValidationPass::new(db_pool, event_bus, client).with_concurrency(concurrency);

    // Interrupt between patterns on Ctrl-C; in-flight patterns drain cleanly
    let cancel_token = tokio_util::sync::CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; finishing in-flight patterns");
            signal_token.cancel();
        }
    });

    let processed = pass
        .process_pending_pattern_suggestions(&tenant_id, &cancel_token)
        .await?;
    info!(tenant_id, processed, "Learning cycle complete");

    Ok(())
}
