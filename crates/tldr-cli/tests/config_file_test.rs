//! Configuration loading from TOML files on disk.

use std::io::Write;

use tempfile::NamedTempFile;
use tldr_cli::{ConfigError, Overrides, ProviderKind, TldrConfig};
use tldr_core::EstimatorKind;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

#[test]
fn full_file_is_loaded() {
    let file = write_config(
        r#"
        estimator = "words"

        [provider]
        kind = "mock"
        model = "local-summarizer"
        temperature = 0.0
        max_output_tokens = 256

        [pipeline]
        max_chunk_units = 800
        branching_factor = 4
        max_reduce_depth = 2
        retry_attempts = 5
        style_hint = "bullets"
        concurrency = 8
        timeout_secs = 120
        "#,
    );

    let cfg = TldrConfig::load(Some(file.path())).unwrap();
    assert_eq!(cfg.estimator, EstimatorKind::Words);
    assert_eq!(cfg.provider.kind, ProviderKind::Mock);
    assert_eq!(cfg.provider.model, "local-summarizer");
    assert_eq!(cfg.provider.max_output_tokens, 256);
    assert_eq!(cfg.pipeline.max_chunk_units, 800);
    assert_eq!(cfg.pipeline.branching_factor, 4);
    assert_eq!(cfg.pipeline.style_hint, "bullets");
    assert_eq!(cfg.pipeline.timeout_secs, Some(120));
    cfg.validate().unwrap();
}

#[test]
fn partial_file_keeps_defaults() {
    let file = write_config("[pipeline]\nbranching_factor = 3\n");
    let cfg = TldrConfig::load(Some(file.path())).unwrap();
    let defaults = TldrConfig::default();
    assert_eq!(cfg.pipeline.branching_factor, 3);
    assert_eq!(cfg.pipeline.max_chunk_units, defaults.pipeline.max_chunk_units);
    assert_eq!(cfg.provider, defaults.provider);
}

#[test]
fn flags_win_over_file() {
    let file = write_config("[provider]\nkind = \"mock\"\n\n[pipeline]\nconcurrency = 2\n");
    let overrides = Overrides {
        concurrency: Some(6),
        style: Some("one line".into()),
        ..Default::default()
    };
    let cfg = TldrConfig::resolve(Some(file.path()), &overrides).unwrap();
    assert_eq!(cfg.pipeline.concurrency, 6);
    assert_eq!(cfg.pipeline.style_hint, "one line");
    assert_eq!(cfg.provider.kind, ProviderKind::Mock);
}

#[test]
fn resolve_rejects_invalid_values() {
    let file = write_config("[pipeline]\nmax_reduce_depth = 0\n");
    let err = TldrConfig::resolve(Some(file.path()), &Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn malformed_toml_names_the_file() {
    let file = write_config("[pipeline\nbroken");
    let err = TldrConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = TldrConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn no_path_means_defaults() {
    assert_eq!(TldrConfig::load(None).unwrap(), TldrConfig::default());
}
