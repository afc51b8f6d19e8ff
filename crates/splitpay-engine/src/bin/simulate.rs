//! # Table Simulation
//!
//! Plays one dinner end to end against a SQLite file and prints the
//! obligations and the leaderboard as JSON.
//!
//! ## Usage
//! ```bash
//! # In-memory database, default config
//! cargo run -p splitpay-engine --bin simulate
//!
//! # Keep the result in a file
//! cargo run -p splitpay-engine --bin simulate -- --db ./splitpay_dev.db
//!
//! # Load a config file
//! cargo run -p splitpay-engine --bin simulate -- --config ./splitpay.toml
//! ```
//!
//! ## Script
//! - Ama opens a session; Kofi and Esi join with the code
//! - One receipt, five items: two exclusive, one shared by all, one shared by two, one left unassigned
//! - Everyone requests their total; Ama and Kofi pay, Esi's charge fails
//! - Ama and Kofi's payments are backdated so the tiers differ

use chrono::{Duration, Utc};
use serde_json::json;
use splitpay_core::{AssignmentRequest, ItemDraft, Participant, PaymentMethod};
use splitpay_engine::telemetry::{init_tracing, DEFAULT_FILTER};
use splitpay_engine::{EngineConfig, RecordingProvider, SplitEngine};
use std::env;
use std::path::PathBuf;

/// Scanned receipt lines: name, price.
const MENU: &[(&str, &str)] = &[
    ("Jollof rice with chicken", "65.00"),
    ("Banku and tilapia", "80.00"),
    ("Kelewele platter", "30.00"),
    ("Sobolo (jug)", "25.00"),
    ("Bottled water", "5.00"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(DEFAULT_FILTER);

    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<String> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("SplitPay table simulation");
                println!();
                println!("Usage: simulate [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: in-memory)");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = EngineConfig::load(config_path)?;
    config.storage.database_path = PathBuf::from(db_path.unwrap_or_else(|| ":memory:".to_string()));

    let engine = SplitEngine::connect(config).await?;

    let ama = Participant::new("ama", "Ama Owusu").with_phone("+233201234567");
    let kofi = Participant::new("kofi", "Kofi Mensah");
    let esi = Participant::new("esi", "Esi Boateng");

    let session = engine.create_session(&ama).await?;
    engine.join_session(&session.join_code, &kofi).await?;
    engine.join_session(&session.join_code, &esi).await?;

    let receipt = engine
        .create_receipt(&session.id, &ama.id, Some("receipts/dinner.jpg".to_string()))
        .await?;

    let mut drafts = Vec::with_capacity(MENU.len());
    for (name, price) in MENU {
        drafts.push(ItemDraft::new(*name, price.parse()?));
    }
    let items = engine.add_items(&receipt.id, &drafts).await?;

    let plan = [
        AssignmentRequest::exclusive("ama"),
        AssignmentRequest::exclusive("kofi"),
        AssignmentRequest::shared(["ama", "kofi", "esi"]),
        AssignmentRequest::shared(["kofi", "esi"]),
    ];
    for (item, request) in items.iter().zip(plan.iter()) {
        engine.assign_item(&item.id, request, None).await?;
    }

    let obligations = engine.session_obligations(&session.id).await?;

    let provider = RecordingProvider::new();
    let methods = [
        (&ama, PaymentMethod::GhanaPay, Some(Duration::hours(3))),
        (&kofi, PaymentMethod::MtnMobileMoney, Some(Duration::hours(30))),
        (&esi, PaymentMethod::VodafoneCash, None),
    ];
    for (payer, method, paid_after) in methods {
        let record = engine
            .request_obligation_payment(&session.id, &payer.id, Some(method))
            .await?;
        engine.submit_charge(&provider, &record.id).await?;

        match paid_after {
            Some(after) => {
                engine
                    .record_outcome(&record.id, true, record.requested_at + after)
                    .await?
            }
            None => engine.record_outcome(&record.id, false, Utc::now()).await?,
        };
    }

    let leaderboard = engine.build_leaderboard(&session.id).await?;
    let session = engine.get_session(&session.id).await?;

    let output = json!({
        "session": session,
        "obligations": obligations,
        "warnings": obligations.warnings(),
        "charges": provider.charges(),
        "leaderboard": leaderboard,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    engine.database().close().await;
    Ok(())
}
