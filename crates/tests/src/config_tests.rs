//! The shipped configuration file, and how it resolves into upstreams.

use sanctos_core::{
    config::AppConfig,
    upstream::{UpstreamRegistry, DEFAULT_UPSTREAM},
};
use serial_test::serial;
use std::{collections::HashMap, path::PathBuf};

fn shipped_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/config.toml")
}

#[test]
#[serial]
fn test_shipped_config_loads_and_validates() {
    let config = AppConfig::from_file(shipped_config()).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.bind_port, 8787);
    assert_eq!(config.cache.swr_window_seconds, 60);
    assert_eq!(config.upstreams.secret_keys, vec!["HELIUS_RPC_URL", "QUICKNODE_RPC_URL"]);
    assert!(!config.indexer.is_enabled());
    assert!(config.metrics.enabled);
}

#[test]
#[serial]
fn test_secret_upstreams_take_precedence() {
    let mut config = AppConfig::from_file(shipped_config()).unwrap();
    let env: HashMap<&str, &str> = HashMap::from([
        ("QUICKNODE_RPC_URL", "solana-mainnet.quiknode.pro/abc123"),
        ("UPSTREAM_ALIASES", "QuickNode"),
    ]);
    config.apply_edge_env(|name| env.get(name).map(|v| (*v).to_string()));

    let registry = UpstreamRegistry::resolve(&config.upstreams, |name| {
        env.get(name).map(|v| (*v).to_string())
    });
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.labels(), vec!["QuickNode"]);
    assert_eq!(
        registry.primary().map(|e| e.url.as_str()),
        Some("https://solana-mainnet.quiknode.pro/abc123")
    );
}

#[test]
#[serial]
fn test_plain_urls_used_without_secrets() {
    let config = AppConfig::from_file(shipped_config()).unwrap();
    let registry = UpstreamRegistry::resolve(&config.upstreams, |_| None);
    assert_eq!(registry.redacted_urls(), vec![DEFAULT_UPSTREAM.to_string()]);
}

#[test]
fn test_empty_upstream_list_falls_back_to_public_endpoint() {
    let mut config = AppConfig::default();
    config.apply_edge_env(|name| (name == "UPSTREAMS").then(|| " , ,".to_string()));
    let registry = UpstreamRegistry::resolve(&config.upstreams, |_| None);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.labels().len(), 1);
}
