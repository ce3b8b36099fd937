// File: config_tests.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

#[cfg(test)]
mod tests {
    use crate::config::{RunConfig, DEFAULT_BLOCK_PHRASES};
    use crate::payload::DatasetType;
    use rstest::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn from_pairs(pairs: &[(&str, &str)]) -> RunConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_run_config_default() {
        let config = RunConfig::new();

        assert_eq!(config.fast_block_detection(), true);
        assert_eq!(
            config.block_status().iter().copied().collect::<Vec<_>>(),
            vec![403, 406, 429]
        );
        assert_eq!(config.block_phrases().len(), DEFAULT_BLOCK_PHRASES.len());
        assert_eq!(config.peek_bytes(), 2048);
        assert_eq!(config.retry_base_delay(), Duration::from_millis(50));
        assert_eq!(config.max_inflight(), 5000);
        assert_eq!(config.batch_size(), 10_000);
        assert_eq!(config.queue_capacity(), 10_000);
        assert_eq!(config.sink_join_timeout(), Duration::from_secs(30));
        assert_eq!(config.smoke_n(), None);
        assert_eq!(config.smoke_shuffle(), true);
        assert_eq!(config.progress_interval(), Duration::from_secs(5));
        assert_eq!(config.rate_limit(), 0);
        assert_eq!(config.stream_threshold(), 1024 * 1024);
    }

    #[test]
    fn test_empty_environment_matches_defaults() {
        let config = from_pairs(&[]);
        let defaults = RunConfig::default();

        assert_eq!(config.block_status(), defaults.block_status());
        assert_eq!(config.block_phrases(), defaults.block_phrases());
        assert_eq!(
            config.profile(DatasetType::Legitimate),
            defaults.profile(DatasetType::Legitimate)
        );
        assert_eq!(
            config.profile(DatasetType::Malicious),
            defaults.profile(DatasetType::Malicious)
        );
    }

    #[test]
    fn test_domain_profiles() {
        let config = RunConfig::new();

        let legit = config.profile(DatasetType::Legitimate);
        assert_eq!(legit.connect_timeout, Duration::from_secs(4));
        assert_eq!(legit.read_timeout, Duration::from_secs(6));
        assert_eq!(legit.retries, 0);
        assert_eq!(legit.concurrency, 800);
        assert_eq!(legit.inspect_body, false);
        assert_eq!(legit.head_timeout(), Duration::from_secs(10));

        let mal = config.profile(DatasetType::Malicious);
        assert_eq!(mal.read_timeout, Duration::from_secs(10));
        assert_eq!(mal.retries, 1);
        assert_eq!(mal.concurrency, 25);
        assert_eq!(mal.inspect_body, true);
    }

    #[test]
    fn test_disabling_fast_detection_inspects_both_domains() {
        let config = from_pairs(&[("FAST_BLOCK_DETECTION", "false")]);

        assert_eq!(config.fast_block_detection(), false);
        assert!(config.profile(DatasetType::Legitimate).inspect_body);
        assert!(config.profile(DatasetType::Malicious).inspect_body);
    }

    #[rstest]
    #[case("1", true)]
    #[case("TRUE", true)]
    #[case("yes", true)]
    #[case("Y", true)]
    #[case("0", false)]
    #[case("off", false)]
    fn test_flag_parsing(#[case] raw: &str, #[case] expected: bool) {
        let config = from_pairs(&[("SMOKE_SHUFFLE", raw)]);
        assert_eq!(config.smoke_shuffle(), expected);
    }

    #[rstest]
    #[case("ASYNC_MAX_INFLIGHT", "abc")]
    #[case("ASYNC_MAX_INFLIGHT", "0")]
    #[case("ASYNC_MAX_INFLIGHT", "-5")]
    #[case("ASYNC_MAX_INFLIGHT", "")]
    fn test_invalid_numbers_fall_back(#[case] key: &str, #[case] raw: &str) {
        let config = from_pairs(&[(key, raw)]);
        assert_eq!(config.max_inflight(), 5000);
    }

    #[test]
    fn test_numeric_overrides() {
        let config = from_pairs(&[
            ("PEEK_BYTES", "512"),
            ("HTTP_CONNECT_TIMEOUT", "1.5"),
            ("MAL_HTTP_READ_TIMEOUT", "20"),
            ("MAL_HTTP_RETRIES", "3"),
            ("ASYNC_CONCURRENCY", "100"),
            ("MALICIOUS_CONCURRENCY", "5"),
            ("SINK_BATCH_SIZE", "50"),
            ("SMOKE_N", "10"),
            ("RATE_LIMIT", "200"),
        ]);

        assert_eq!(config.peek_bytes(), 512);
        let legit = config.profile(DatasetType::Legitimate);
        assert_eq!(legit.connect_timeout, Duration::from_millis(1500));
        assert_eq!(legit.concurrency, 100);

        let mal = config.profile(DatasetType::Malicious);
        // Malicious connect timeout follows the general one unless set.
        assert_eq!(mal.connect_timeout, Duration::from_millis(1500));
        assert_eq!(mal.read_timeout, Duration::from_secs(20));
        assert_eq!(mal.retries, 3);
        assert_eq!(mal.concurrency, 5);

        assert_eq!(config.batch_size(), 50);
        assert_eq!(config.smoke_n(), Some(10));
        assert_eq!(config.rate_limit(), 200);
    }

    #[rstest]
    #[case("-1")]
    #[case("0")]
    #[case("NaN")]
    #[case("inf")]
    #[case("1e20")]
    fn test_out_of_range_timeout_falls_back(#[case] raw: &str) {
        let config = from_pairs(&[("HTTP_READ_TIMEOUT", raw)]);
        assert_eq!(
            config.profile(DatasetType::Legitimate).read_timeout,
            Duration::from_secs(6)
        );
    }

    #[test]
    fn test_pool_timeout_applies_to_both_profiles() {
        let config = from_pairs(&[("HTTP_POOL_TIMEOUT", "12.5")]);

        assert_eq!(
            config.profile(DatasetType::Legitimate).pool_timeout,
            Duration::from_millis(12_500)
        );
        assert_eq!(
            config.profile(DatasetType::Malicious).pool_timeout,
            Duration::from_millis(12_500)
        );
    }

    #[test]
    fn test_huge_timeouts_saturate_the_head_deadline() {
        let config = from_pairs(&[
            ("HTTP_READ_TIMEOUT", "1e19"),
            ("HTTP_WRITE_TIMEOUT", "1e19"),
        ]);
        let legit = config.profile(DatasetType::Legitimate);

        assert_eq!(legit.read_timeout, Duration::from_secs_f64(1e19));
        assert_eq!(legit.head_timeout(), Duration::MAX);
    }

    #[rstest]
    #[case("403, 418", vec![403, 418])]
    #[case("503", vec![503])]
    #[case("403,nope", vec![403, 406, 429])]
    fn test_block_status_parsing(#[case] raw: &str, #[case] expected: Vec<u16>) {
        let config = from_pairs(&[("BLOCK_STATUS", raw)]);
        assert_eq!(
            config.block_status().iter().copied().collect::<Vec<_>>(),
            expected
        );
    }

    #[test]
    fn test_block_phrases_are_appended() {
        let config = from_pairs(&[("BLOCK_PHRASES", "Blocked by edge|| || Denied by policy")]);
        let phrases = config.block_phrases();

        assert_eq!(phrases.len(), DEFAULT_BLOCK_PHRASES.len() + 2);
        assert_eq!(phrases[0], DEFAULT_BLOCK_PHRASES[0]);
        assert!(phrases.iter().any(|p| p == "Blocked by edge"));
        assert!(phrases.iter().any(|p| p == "Denied by policy"));
    }

    #[test]
    fn test_setters() {
        let mut config = RunConfig::new();

        config.set_fast_block_detection(false);
        config.set_peek_bytes(64);
        config.set_timeouts(
            DatasetType::Malicious,
            Duration::from_millis(100),
            Duration::from_millis(200),
        );
        config.set_retries(DatasetType::Legitimate, 2);
        config.set_concurrency(DatasetType::Malicious, 3);
        config.set_max_inflight(7);
        config.set_smoke_n(Some(4));

        assert_eq!(config.fast_block_detection(), false);
        assert_eq!(config.peek_bytes(), 64);
        let mal = config.profile(DatasetType::Malicious);
        assert_eq!(mal.connect_timeout, Duration::from_millis(100));
        assert_eq!(mal.read_timeout, Duration::from_millis(200));
        assert_eq!(mal.concurrency, 3);
        assert_eq!(config.profile(DatasetType::Legitimate).retries, 2);
        assert_eq!(config.max_inflight(), 7);
        assert_eq!(config.smoke_n(), Some(4));
    }
}
