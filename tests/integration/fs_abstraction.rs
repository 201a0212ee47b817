use std::path::Path;

use buildwarden::fs::mock::MockFileSystem;
use buildwarden::fs::FileSystem;

#[test]
fn adding_a_file_creates_its_directories() {
    let fs = MockFileSystem::new();
    fs.add_file("/repo/apps/web/.next/BUILD_ID", "abc");

    assert!(fs.is_dir(Path::new("/repo/apps/web/.next")));
    assert!(fs.is_dir(Path::new("/repo")));
    assert!(!fs.is_dir(Path::new("/repo/apps/web/.next/BUILD_ID")));
    assert_eq!(
        fs.read_to_string(Path::new("/repo/apps/web/.next/BUILD_ID")).unwrap(),
        "abc"
    );
}

#[test]
fn remove_dir_all_drops_the_subtree_only() {
    let fs = MockFileSystem::new();
    fs.add_file("/w/.next/cache/a.pack", "1");
    fs.add_file("/w/.next/BUILD_ID", "2");

    fs.remove_dir_all(Path::new("/w/.next/cache")).unwrap();

    assert!(!fs.exists(Path::new("/w/.next/cache")));
    assert!(!fs.exists(Path::new("/w/.next/cache/a.pack")));
    assert!(fs.exists(Path::new("/w/.next/BUILD_ID")));
}

#[test]
fn removing_a_missing_directory_is_not_an_error() {
    let fs = MockFileSystem::new();
    assert!(fs.remove_dir_all(Path::new("/nowhere")).is_ok());
}

#[test]
fn refused_writes_leave_nothing_behind() {
    let fs = MockFileSystem::new();
    fs.set_fail_writes(true);

    assert!(fs.write(Path::new("logs/report.json"), b"{}").is_err());
    assert!(fs.files().is_empty());

    fs.set_fail_writes(false);
    fs.write(Path::new("logs/report.json"), b"{}").unwrap();
    assert_eq!(fs.files(), vec![Path::new("logs/report.json").to_path_buf()]);
}
