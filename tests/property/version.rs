use buildwarden::pipeline::RuntimeVersion;
use proptest::prelude::*;

fn version_strategy() -> impl Strategy<Value = RuntimeVersion> {
    (0u64..100, 0u64..100, 0u64..1_000).prop_map(|(a, b, c)| RuntimeVersion::new(a, b, c))
}

proptest! {
    #[test]
    fn display_then_parse_is_identity(v in version_strategy()) {
        prop_assert_eq!(RuntimeVersion::parse(&v.to_string()), Some(v));
        prop_assert_eq!(RuntimeVersion::parse(&format!("v{v}")), Some(v));
    }

    #[test]
    fn ordering_follows_components(a in version_strategy(), b in version_strategy()) {
        let by_tuple = (a.major, a.minor, a.patch).cmp(&(b.major, b.minor, b.patch));
        prop_assert_eq!(a.cmp(&b), by_tuple);
    }

    #[test]
    fn finds_version_in_tool_banner(v in version_strategy(), tool in "[a-z]{1,8}") {
        let banner = format!("{tool} version {v} linux/amd64");
        prop_assert_eq!(RuntimeVersion::find_in(&banner), Some(v));
    }
}

#[test]
fn parse_is_lenient_about_missing_parts_and_suffixes() {
    assert_eq!(RuntimeVersion::parse("20"), Some(RuntimeVersion::new(20, 0, 0)));
    assert_eq!(RuntimeVersion::parse("v18.17"), Some(RuntimeVersion::new(18, 17, 0)));
    assert_eq!(
        RuntimeVersion::parse("1.2.3-rc.1"),
        Some(RuntimeVersion::new(1, 2, 3))
    );
    assert_eq!(RuntimeVersion::parse("latest"), None);
}

#[test]
fn find_in_skips_non_version_text() {
    assert_eq!(
        RuntimeVersion::find_in("Python 3.11.4\n"),
        Some(RuntimeVersion::new(3, 11, 4))
    );
    assert_eq!(RuntimeVersion::find_in("no digits here"), None);
}
