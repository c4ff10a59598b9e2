use std::path::{Path, PathBuf};

use chrono::Utc;
use rja_adapters::{adapter_for_source, AdapterContext, SourceKind, SourceRegistry};
use rja_storage::{HttpClientConfig, HttpFetcher};
use uuid::Uuid;

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root")
}

#[test]
fn workspace_registry_parses_and_live_sources_ship_disabled() {
    let registry = SourceRegistry::load(workspace_root().join("sources.yaml")).unwrap();
    assert!(!registry.sources.is_empty());
    for source in &registry.sources {
        if !matches!(source.kind, SourceKind::Fixture { .. }) {
            assert!(!source.enabled, "{} should not run by default", source.source_id);
        }
    }
}

#[tokio::test]
async fn enabled_fixture_sources_yield_candidates() {
    let root = workspace_root();
    let registry = SourceRegistry::load(root.join("sources.yaml")).unwrap();
    let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
    let ctx = AdapterContext::new(Uuid::new_v4(), Utc::now());

    let selected = registry.select(&[]).unwrap();
    assert!(!selected.is_empty());
    for source in selected {
        let adapter = adapter_for_source(source, &root);
        assert_eq!(adapter.source_id(), source.source_id);
        let candidates = adapter.fetch(&http, &ctx).await.unwrap();
        assert!(!candidates.is_empty(), "{} produced nothing", source.source_id);
        for c in &candidates {
            assert_eq!(c.source_name, source.source_id);
            assert!(!c.url.is_empty());
            assert!(!c.employer.is_empty());
        }
    }
}
