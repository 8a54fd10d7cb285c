mod calc;
mod dataset;
mod export;
mod ipc;
mod ranking;
mod store;

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scoreboardd")]
#[command(about = "Score lookup sidecar: weighted totals, section ranks and class statistics over stdio", version)]
struct Args {
    /// Dataset JSON file; the bundled sample dataset is served when omitted
    #[arg(short, long, env = "SCOREBOARDD_DATASET")]
    dataset: Option<PathBuf>,

    /// What to do with malformed score records: zero or reject
    #[arg(short, long, env = "SCOREBOARDD_MALFORMED", default_value = "zero")]
    malformed: calc::MalformedPolicy,
}

fn main() -> anyhow::Result<()> {
    // stdout carries IPC responses; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scoreboardd=info")),
        )
        .init();

    let args = Args::parse();

    let store = match &args.dataset {
        Some(path) => {
            let store = dataset::load_dataset(path)?;
            info!(path = %path.display(), "loaded dataset");
            store
        }
        None => {
            let store = dataset::sample_dataset()?;
            info!("no dataset configured, serving bundled sample");
            store
        }
    };
    info!(
        sections = store.sections().len(),
        digest = store.digest(),
        policy = %args.malformed,
        "dataset ready"
    );
    for (section, student_id, defect) in store.malformed_records() {
        warn!(
            section,
            student_id,
            %defect,
            policy = %args.malformed,
            "malformed score record in dataset"
        );
    }

    let state = ipc::AppState {
        store: Arc::new(store),
        policy: args.malformed,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&state, req),
            Err(e) => {
                // No id to echo back.
                let mut resp = ipc::err("", "bad_json", e.to_string(), None);
                if let Some(obj) = resp.as_object_mut() {
                    obj.remove("id");
                }
                resp
            }
        };

        writeln!(stdout, "{}", resp).context("failed to write response")?;
        stdout.flush().context("failed to flush response")?;
    }

    info!("stdin closed, exiting");
    Ok(())
}
