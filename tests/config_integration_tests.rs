//! Integration tests for RpaConfig and the override file
//!
//! These tests verify:
//! - Defaults when no override file exists
//! - Override precedence and partial namespaces
//! - Fallbacks for absent or mistyped keys
//! - Settings snapshot consumed by the converter

use camino::Utf8PathBuf;
use excel2pdf_rpa::models::{FailureKind, OrientationPreference};
use excel2pdf_rpa::{RpaConfig, Settings};
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

fn write_config(dir: &Utf8PathBuf, json: &str) -> Utf8PathBuf {
    let path = dir.join("rpa_config.json");
    fs::write(&path, json).unwrap();
    path
}

#[test]
fn test_defaults_without_override_file() {
    let (_temp_dir, dir) = create_test_config_dir();
    let config = RpaConfig::load(dir.join("rpa_config.json"));

    assert!(config.source().is_none());
    assert!(config.warning().is_none());
    assert_eq!(config.settings(), Settings::default());
    assert_eq!(config.get_or("excel.timeout_seconds", 0u64), 300);
    assert_eq!(config.get_or("pdf.default_quality", 0u32), 600);
    assert_eq!(config.get_or("rpa.exit_codes.general_error", 0i32), 99);
}

#[test]
fn test_override_supersedes_defaults() {
    let (_temp_dir, dir) = create_test_config_dir();
    let path = write_config(
        &dir,
        r#"{
            "excel": {"retry_attempts": 5, "visible": true},
            "pdf": {"default_orientation": "landscape", "margins_cm": 2.0},
            "rpa": {"exit_codes": {"timeout": 124}, "log_level": "DEBUG"}
        }"#,
    );

    let config = RpaConfig::load(&path);
    let settings = config.settings();

    assert_eq!(config.source(), Some(path.as_path()));
    assert_eq!(settings.excel.retry_attempts, 5);
    assert!(settings.excel.visible);
    assert_eq!(settings.excel.timeout_seconds, 300);
    assert_eq!(settings.excel.retry_delay, 5.0);
    assert_eq!(settings.pdf.orientation(), OrientationPreference::Landscape);
    assert_eq!(settings.pdf.margins_cm, 2.0);
    assert!(settings.pdf.fit_to_width);
    assert_eq!(settings.rpa.log_level, "DEBUG");
    assert_eq!(settings.rpa.exit_codes.for_failure(FailureKind::Timeout), 124);
    assert_eq!(settings.rpa.exit_codes.file_not_found, 1);
    assert_eq!(settings.cleanup, Settings::default().cleanup);
}

#[test]
fn test_malformed_override_falls_back_to_defaults() {
    let (_temp_dir, dir) = create_test_config_dir();
    let path = write_config(&dir, "{ \"excel\": { \"timeout_seconds\": ");

    let config = RpaConfig::load(&path);

    assert!(config.warning().is_some());
    assert!(config.source().is_none());
    assert_eq!(config.settings(), Settings::default());
}

#[test]
fn test_mistyped_value_keeps_default() {
    let (_temp_dir, dir) = create_test_config_dir();
    let path = write_config(
        &dir,
        r#"{"excel": {"timeout_seconds": "soon", "retry_attempts": 1}}"#,
    );

    let settings = RpaConfig::load(&path).settings();

    assert_eq!(settings.excel.timeout_seconds, 300);
    assert_eq!(settings.excel.retry_attempts, 1);
}

#[test]
fn test_lookup_through_scalar_returns_fallback() {
    let config = RpaConfig::defaults();

    assert_eq!(
        config.get_or("excel.timeout_seconds.nested", "fallback".to_string()),
        "fallback"
    );
    assert_eq!(config.get_or("rpa.exit_codes.unknown", -1i32), -1);
}

proptest! {
    #[test]
    fn prop_absent_keys_return_fallback(
        segments in prop::collection::vec("missing_[a-z]{1,8}", 1..4),
        fallback in any::<i64>(),
    ) {
        let config = RpaConfig::defaults();
        let key = segments.join(".");
        prop_assert_eq!(config.get_or(&key, fallback), fallback);
    }

    #[test]
    fn prop_absent_leaf_under_known_namespace(
        namespace in prop::sample::select(vec!["excel", "pdf", "rpa", "cleanup", "batch"]),
        leaf in "zz_[a-z]{1,10}",
        fallback in ".{0,16}",
    ) {
        let config = RpaConfig::defaults();
        let key = format!("{}.{}", namespace, leaf);
        prop_assert_eq!(config.get_or(&key, fallback.clone()), fallback);
    }

    #[test]
    fn prop_override_value_wins(retries in 0u32..50, timeout in 1u64..10_000) {
        let (_temp_dir, dir) = create_test_config_dir();
        let path = write_config(
            &dir,
            &format!(
                r#"{{"excel": {{"retry_attempts": {}, "timeout_seconds": {}}}}}"#,
                retries, timeout
            ),
        );

        let settings = RpaConfig::load(&path).settings();
        prop_assert_eq!(settings.excel.retry_attempts, retries);
        prop_assert_eq!(settings.excel.timeout_seconds, timeout);
        prop_assert_eq!(settings.excel.retry_delay, 5.0);
    }
}
