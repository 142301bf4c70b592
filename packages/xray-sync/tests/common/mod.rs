//! Shared helpers for xray-sync integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use xray_sync::{InMemoryRemote, RemoteCall, SyncConfig, XraySync};

static INIT: Once = Once::new();

/// Initialize logging for tests (once). Only active when RUST_LOG is set.
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

pub const PROJECT: &str = "DEMO";
pub const USER: &str = "ci-bot";

pub fn engine(remote: &Arc<InMemoryRemote>, config: SyncConfig) -> XraySync<InMemoryRemote> {
    init_test_logging();
    XraySync::new(remote.clone(), config, PROJECT, USER)
}

/// Key of the record created for `summary`, if any
pub fn created_key(calls: &[RemoteCall], summary: &str) -> Option<String> {
    calls.iter().find_map(|call| match call {
        RemoteCall::CreateRecord { key, fields } if fields.summary.as_deref() == Some(summary) => {
            Some(key.clone())
        }
        _ => None,
    })
}

/// Mutating calls other than folder creation
pub fn record_calls(calls: Vec<RemoteCall>) -> Vec<RemoteCall> {
    calls
        .into_iter()
        .filter(|call| !matches!(call, RemoteCall::CreateFolder { .. }))
        .collect()
}
