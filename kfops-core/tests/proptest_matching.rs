//! Property-based tests for name matching using proptest.

use proptest::prelude::*;

use kfops_core::MatchMode;
use kfops_core::pipelines::in_cluster_endpoint;

proptest! {
    #[test]
    fn exact_match_implies_contains(name in "[a-z0-9-]{0,24}", wanted in "[a-z0-9-]{0,24}") {
        if MatchMode::Exact.matches(&name, &wanted) {
            prop_assert!(MatchMode::Contains.matches(&name, &wanted));
        }
    }

    #[test]
    fn name_always_matches_itself(name in "[a-zA-Z0-9_.-]{0,32}") {
        prop_assert!(MatchMode::Exact.matches(&name, &name));
        prop_assert!(MatchMode::Contains.matches(&name, &name));
    }

    #[test]
    fn decorated_names_match_by_substring_only(
        prefix in "[a-z]{1,8}",
        wanted in "[a-z0-9-]{1,16}",
        suffix in "[a-z]{1,8}",
    ) {
        let decorated = format!("{prefix}{wanted}{suffix}");
        prop_assert!(MatchMode::Contains.matches(&decorated, &wanted));
        prop_assert!(!MatchMode::Exact.matches(&decorated, &wanted));
    }

    #[test]
    fn match_mode_display_parses_back(exact in any::<bool>()) {
        let mode = if exact { MatchMode::Exact } else { MatchMode::Contains };
        prop_assert_eq!(mode.to_string().parse::<MatchMode>().unwrap(), mode);
    }

    #[test]
    fn in_cluster_endpoint_is_valid_url(ns in "[a-z][a-z0-9-]{0,30}") {
        let endpoint = in_cluster_endpoint(&ns);
        let url = url::Url::parse(&endpoint).unwrap();
        prop_assert_eq!(url.scheme(), "https");
        prop_assert_eq!(url.port(), Some(8443));
        let expected_host = format!("ds-pipeline-dspa.{ns}.svc");
        prop_assert_eq!(url.host_str(), Some(expected_host.as_str()));
    }
}
