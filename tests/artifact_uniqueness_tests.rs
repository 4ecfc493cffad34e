mod common;

use common::{dir_entries, file_name};
use covsession::{find_reports, generate_token, is_report_file_name, CoverageSession};
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

const TRIALS: usize = 10_000;

#[test]
fn test_sequential_sessions_never_collide() {
    let tmp = TempDir::new().unwrap();
    let mut names = HashSet::with_capacity(TRIALS);

    for i in 0..TRIALS {
        let session = CoverageSession::builder()
            .report_dir(tmp.path())
            .session_id(&format!("run {i}"))
            .start()
            .unwrap();
        let path = session.finish().unwrap();
        let name = file_name(&path);
        assert!(is_report_file_name(&name), "bad artifact name: {name}");
        assert!(names.insert(name), "artifact name repeated after {i} runs");
    }

    assert_eq!(dir_entries(tmp.path()).len(), TRIALS);
}

#[test]
fn test_tokens_never_collide() {
    let mut tokens = HashSet::with_capacity(TRIALS);
    for _ in 0..TRIALS {
        let token = generate_token().unwrap();
        assert_eq!(token.len(), 32);
        assert!(tokens.insert(token));
    }
}

#[test]
fn test_find_reports_lists_only_artifacts() {
    let tmp = TempDir::new().unwrap();
    let first = CoverageSession::builder()
        .report_dir(tmp.path())
        .start()
        .unwrap()
        .finish()
        .unwrap();
    let second = CoverageSession::builder()
        .report_dir(tmp.path())
        .start()
        .unwrap()
        .finish()
        .unwrap();

    fs::write(tmp.path().join("notes.cov"), "").unwrap();
    fs::write(tmp.path().join("coverage.drcov"), "").unwrap();
    fs::create_dir(tmp.path().join("0123456789abcdef0123456789abcdef.cov")).unwrap();

    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(find_reports(tmp.path()).unwrap(), expected);
}
