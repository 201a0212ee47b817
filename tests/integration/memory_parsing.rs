use buildwarden::exec::memory::{
    bytes_to_mb, evaluate, parse_stat_ppid, parse_status_rss, MemoryVerdict,
};

#[test]
fn ppid_is_read_after_the_last_parenthesis() {
    let stat = "4242 (node (worker) 1) S 4100 4242 4100 0 -1 4194560";
    assert_eq!(parse_stat_ppid(stat), Some(4100));
}

#[test]
fn ppid_parse_rejects_truncated_lines() {
    assert_eq!(parse_stat_ppid("4242 (sh) S"), None);
    assert_eq!(parse_stat_ppid("garbage"), None);
}

#[test]
fn rss_is_converted_from_kilobytes() {
    let status = "Name:\tnode\nVmPeak:\t  900000 kB\nVmRSS:\t  204800 kB\nThreads:\t11\n";
    assert_eq!(parse_status_rss(status), Some(204_800 * 1024));
    assert_eq!(bytes_to_mb(parse_status_rss(status).unwrap()), 200);
}

#[test]
fn kernel_threads_have_no_rss() {
    assert_eq!(parse_status_rss("Name:\tkthreadd\nState:\tS (sleeping)\n"), None);
}

#[test]
fn verdict_thresholds() {
    let mb = 1024 * 1024;
    assert_eq!(evaluate(100 * mb, 1000), MemoryVerdict::WithinLimit);
    assert_eq!(evaluate(950 * mb, 1000), MemoryVerdict::NearLimit);
    assert_eq!(evaluate(1000 * mb, 1000), MemoryVerdict::NearLimit);
    assert_eq!(evaluate(1001 * mb, 1000), MemoryVerdict::Exceeded);
}

#[cfg(target_os = "linux")]
#[test]
fn own_process_has_measurable_rss() {
    use buildwarden::exec::memory::{process_rss_bytes, process_tree_rss_bytes};

    let pid = std::process::id();
    assert!(process_rss_bytes(pid).unwrap() > 0);
    assert!(process_tree_rss_bytes(pid).unwrap() > 0);
}
