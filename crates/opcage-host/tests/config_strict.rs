//! Strict parsing of policy documents.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use opcage_host::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
namespaces:
  - namespace: "sys.math"
    access: allowed
    typez: []   # typo must fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_INPUT");
}

#[test]
fn ok_minimal_policy() {
    let ok = r#"
version: 1
namespaces:
  - namespace: "sys.math"
    access: allowed
"#;
    let (policy, settings) = config::load_from_str(ok).expect("must parse");
    assert!(policy.get_namespace("sys.math").is_some());
    assert_eq!(settings.stack_bytes_limit, 1024);
    assert_eq!(settings.array_length_limit, 100);
    assert_eq!(settings.time_limit.as_millis(), 500);
}

#[test]
fn wrong_version_is_rejected() {
    let bad = r#"
version: 2
namespaces: []
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_INPUT");
    assert!(err.to_string().contains("version"));
}

#[test]
fn guard_ranges_are_validated() {
    let bad = r#"
version: 1
guard:
  time_limit_ms: 0
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "BAD_INPUT");
    assert!(err.to_string().contains("time_limit_ms"));
}

#[test]
fn member_neutral_is_rejected() {
    let bad = r#"
version: 1
namespaces:
  - namespace: "sys.io"
    access: denied
    types:
      - name: "Path"
        access: neutral
        members:
          - name: "join"
            access: neutral
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONTRACT");
}

#[test]
fn duplicate_namespace_is_rejected() {
    let bad = r#"
version: 1
namespaces:
  - namespace: "sys.math"
    access: allowed
  - namespace: "sys.math"
    access: denied
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn rewriters_parse_including_substitute() {
    let ok = r#"
version: 1
namespaces:
  - namespace: "sys.mem"
    access: allowed
    types:
      - name: "Buf"
        members:
          - name: "alloc"
            access: allowed
            rewriters:
              - array-length-check
              - substitute:
                  declaring: { namespace: "sys.mem", name: "Buf" }
                  name: "alloc_checked"
                  params: 1
                  returns: { namespace: "lang", name: "int" }
"#;
    let (policy, _) = config::load_from_str(ok).expect("must parse");
    let rule = policy
        .get_namespace("sys.mem")
        .unwrap()
        .get_type("Buf")
        .unwrap()
        .get_member("alloc")
        .unwrap();
    let rewriters = rule.rewriters().unwrap();
    assert_eq!(rewriters.len(), 2);
    assert_eq!(rewriters[0].short_name(), "array-length-check");
    assert_eq!(rewriters[1].short_name(), "substitute");
}

#[test]
fn json_documents_load_too() {
    let ok = r#"{
  "version": 1,
  "namespaces": [
    { "namespace": "sys.math", "access": "allowed" }
  ]
}"#;
    let (policy, _) = config::load_from_json(ok).expect("must parse");
    assert!(policy.get_namespace("sys.math").is_some());
}
