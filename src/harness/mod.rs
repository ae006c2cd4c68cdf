//! Headless entry point: scan payloads from stdin, report the accepted
//! identifier, and optionally record an allocation for it.

mod line_feed;

pub use line_feed::LineFeedFacility;

use std::{env, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio::io::BufReader;
use tokio::sync::mpsc;

use crate::allocation::{AllocationClient, AllocationRequest};
use crate::scanner::{ChannelObserver, ScanEvent, ScanSession, STREAM_ENDED_MESSAGE};
use crate::settings::SettingsStore;

const SETTINGS_PATH_VAR: &str = "EQUIPMENT_SCAN_SETTINGS";
const API_TOKEN_VAR: &str = "EQUIPMENT_SCAN_API_TOKEN";
const DEBUG_VAR: &str = "EQUIPMENT_SCAN_DEBUG";
const DEFAULT_SETTINGS_FILE: &str = "equipment-scan.json";

pub async fn run() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let debug_mode = env::var(DEBUG_VAR)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    env_logger::Builder::from_default_env()
        .filter_level(if debug_mode {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    info!("equipment-scan starting up...");

    let settings_path = env::var(SETTINGS_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = SettingsStore::new(settings_path)?;
    if settings.write_if_missing()? {
        info!("Wrote default settings to {}", settings.path().display());
    }

    let allocator = match (settings.allocation(), env::var(API_TOKEN_VAR).ok()) {
        (Some(allocation), Some(token)) => Some(
            AllocationClient::from_settings(&allocation, &token)
                .context("failed to configure allocation client")?,
        ),
        (Some(_), None) => {
            warn!("Allocation API configured but {} is not set; skipping allocation", API_TOKEN_VAR);
            None
        }
        (None, _) => None,
    };

    let facility = Arc::new(LineFeedFacility::new(BufReader::new(tokio::io::stdin()), "stdin"));
    let (observer, mut events) = ChannelObserver::new();
    let session = ScanSession::new(facility, Arc::new(observer), settings.scanner());

    session.open().await.context("failed to open scanner")?;

    let Some(identifier) = wait_for_identifier(&mut events).await else {
        session.close().await;
        bail!("no identifier accepted before input ended");
    };

    println!("{identifier}");

    if let Some(client) = allocator {
        let receipt = client
            .allocate(&AllocationRequest::single(identifier.clone()))
            .await
            .with_context(|| format!("failed to allocate '{identifier}'"))?;
        info!("Allocation recorded ({}): {}", receipt.status, receipt.body);
    }

    Ok(())
}

async fn wait_for_identifier(events: &mut mpsc::UnboundedReceiver<ScanEvent>) -> Option<String> {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ScanEvent::Accepted { identifier }) => return Some(identifier),
                Some(ScanEvent::Error { message }) if message == STREAM_ENDED_MESSAGE => return None,
                Some(ScanEvent::Error { message }) => warn!("{message}"),
                Some(ScanEvent::Closed) | None => return None,
                Some(_) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing scanner");
                return None;
            }
        }
    }
}
