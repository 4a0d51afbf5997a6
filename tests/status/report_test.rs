//! Status report aggregation over the policy file and the audit log.

use std::path::Path;

use portcullis::status::StatusReport;

fn audit_line(timestamp: &str, event: &str, container_id: &str) -> String {
    format!(
        r#"{{"timestamp":"{timestamp}","event":"{event}","container_id":"{container_id}","image":"app:1.0","message":"test","digest":"sha256:aa11"}}"#
    )
}

fn write_fixtures(dir: &Path, audit_lines: &[String]) -> (std::path::PathBuf, std::path::PathBuf) {
    let policy_path = dir.join("policy.json");
    let audit_path = dir.join("audit.log");

    // Tag key and digest key for the same image, plus a legacy digest-keyed
    // entry without a digest field.
    let policy = r#"{
        "app:1.0": {"layers": ["cafe"], "digest": "sha256:aa11"},
        "sha256:aa11": {"layers": ["cafe"], "digest": "sha256:aa11", "image": "app:1.0"},
        "sha256:bb22": {"layers": ["f00d"]}
    }"#;
    std::fs::write(&policy_path, policy).expect("write policy");
    std::fs::write(&audit_path, format!("{}\n", audit_lines.join("\n"))).expect("write audit");

    (policy_path, audit_path)
}

#[test]
fn counts_unique_digests_and_verdict_totals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lines = vec![
        audit_line("2026-08-29T10:00:00Z", "CREATED", "c1"),
        audit_line("2026-08-29T10:00:01Z", "ALLOWED", "c1"),
        audit_line("2026-08-29T10:05:00Z", "CREATED", "c2"),
        audit_line("2026-08-29T10:05:01Z", "BLOCKED", "c2"),
        audit_line("2026-08-29T11:00:00Z", "BLOCKED", "c3"),
    ];
    let (policy_path, audit_path) = write_fixtures(dir.path(), &lines);

    let report = StatusReport::build(&policy_path, &audit_path);

    // Two entries share sha256:aa11; the legacy entry counts by its key.
    assert_eq!(report.registered_images, 2);
    assert_eq!(report.allowed, 1);
    assert_eq!(report.blocked, 2);
}

#[test]
fn last_events_are_newest_first_and_capped_at_five() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lines: Vec<String> = (0..7)
        .map(|i| audit_line(&format!("2026-08-29T10:0{i}:00Z"), "ALLOWED", &format!("c{i}")))
        .collect();
    let (policy_path, audit_path) = write_fixtures(dir.path(), &lines);

    let report = StatusReport::build(&policy_path, &audit_path);

    assert_eq!(report.last_events.len(), 5);
    assert_eq!(report.last_events[0].container_id, "c6");
    assert_eq!(report.last_events[4].container_id, "c2");
}

#[test]
fn malformed_audit_lines_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lines = vec![
        audit_line("2026-08-29T10:00:00Z", "ALLOWED", "c1"),
        "not json".to_owned(),
        String::new(),
        audit_line("2026-08-29T10:01:00Z", "BLOCKED", "c2"),
    ];
    let (policy_path, audit_path) = write_fixtures(dir.path(), &lines);

    let report = StatusReport::build(&policy_path, &audit_path);

    assert_eq!(report.allowed, 1);
    assert_eq!(report.blocked, 1);
    assert_eq!(report.last_events.len(), 2);
}

#[test]
fn missing_files_yield_an_empty_report() {
    let dir = tempfile::tempdir().expect("tempdir");

    let report = StatusReport::build(
        &dir.path().join("policy.json"),
        &dir.path().join("audit.log"),
    );

    assert_eq!(report.registered_images, 0);
    assert_eq!(report.allowed, 0);
    assert_eq!(report.blocked, 0);
    assert!(report.last_events.is_empty());
}

#[test]
fn render_is_plain_text_with_summary_and_events() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lines = vec![audit_line("2026-08-29T10:00:00Z", "BLOCKED", "c1")];
    let (policy_path, audit_path) = write_fixtures(dir.path(), &lines);

    let rendered = StatusReport::build(&policy_path, &audit_path).render();

    assert!(rendered.contains("== Portcullis Status =="));
    assert!(rendered.contains("Registered images: 2"));
    assert!(rendered.contains("Blocked containers: 1"));
    assert!(rendered.contains("BLOCKED"));
    assert!(rendered.contains("c1"));
}

#[test]
fn render_notes_when_there_are_no_events() {
    let dir = tempfile::tempdir().expect("tempdir");

    let rendered = StatusReport::build(
        &dir.path().join("policy.json"),
        &dir.path().join("audit.log"),
    )
    .render();

    assert!(rendered.contains("(no events yet)"));
}
