use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

use webgrab_scan::progress::{read_hosts, ProgressStore};
use webgrab_scan::scanner::pending_hosts;

#[test]
fn skip_set_matches_ledger_after_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("processed_ips.txt");

    let first = ProgressStore::open(&path, false).unwrap();
    for host in ["10.0.0.1", "10.0.0.2", "bms.local"] {
        assert!(first.mark_complete(host).unwrap());
    }
    drop(first);

    let second = ProgressStore::open(&path, true).unwrap();
    assert_eq!(second.completed(), read_hosts(&path).unwrap());
    assert_eq!(second.completed_count(), 3);

    let input: Vec<String> = ["10.0.0.1", "10.0.0.3", "bms.local", "10.0.0.4"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(pending_hosts(&input, &second.completed()), vec!["10.0.0.3", "10.0.0.4"]);
}

#[test]
fn completed_hosts_are_never_written_twice() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("processed_ips.txt");
    fs::write(&path, "10.0.0.1\n").unwrap();

    let store = ProgressStore::open(&path, true).unwrap();
    assert!(!store.mark_complete("10.0.0.1").unwrap());
    assert!(store.mark_complete("10.0.0.2").unwrap());
    assert!(!store.mark_complete("10.0.0.2").unwrap());

    let lines: Vec<String> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines, vec!["10.0.0.1", "10.0.0.2"]);
}

#[test]
fn fresh_run_appends_to_existing_ledger() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("processed_ips.txt");
    fs::write(&path, "old-host\n").unwrap();

    let store = ProgressStore::open(&path, false).unwrap();
    assert!(!store.contains("old-host"));
    assert!(store.mark_complete("new-host").unwrap());

    let expected: HashSet<String> = ["old-host", "new-host"].iter().map(|s| s.to_string()).collect();
    assert_eq!(read_hosts(&path).unwrap(), expected);
}

#[test]
fn ledger_directory_is_created_on_first_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("processed_ips.txt");
    let store = ProgressStore::open(&path, true).unwrap();
    assert!(!path.exists());
    store.mark_complete("10.0.0.7").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "10.0.0.7\n");
}
