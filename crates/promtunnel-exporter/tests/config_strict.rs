#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use promtunnel_exporter::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
metrics:
  prot: 9100 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert!(!cfg.debug);
    assert_eq!(cfg.metrics.port, 9090);
}

#[test]
fn explicit_port_and_debug() {
    let ok = r#"
version: 1
debug: true
metrics:
  port: 9100
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert!(cfg.debug);
    assert_eq!(cfg.metrics.port, 9100);
}

#[test]
fn zero_port_is_rejected() {
    let bad = r#"
version: 1
metrics:
  port: 0
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("metrics.port"));
}

#[test]
fn unknown_version_is_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert!(matches!(err, promtunnel_core::TunnelError::UnsupportedVersion));
}

#[test]
fn missing_file_is_a_config_error() {
    let err = config::load_from_file("/nonexistent/promtunnel.yaml").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}
