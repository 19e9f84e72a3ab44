#[cfg(test)]
mod tests {
    use super::super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.tasks.ttl_secs, 3600);
        assert_eq!(config.tasks.sweep_interval_secs, 600);
        assert_eq!(config.download.item_delay_ms, 2000);
        assert_eq!(
            config.download.enabled_sources,
            vec!["open_access", "unpaywall", "scihub", "libgen"]
        );
    }

    #[test]
    fn test_short_timeout_below_long_timeout() {
        let dl = DownloadConfig::default();
        assert!(dl.short_timeout_secs < dl.long_timeout_secs,
            "Lookup timeout ({}) should be below scrape timeout ({})",
            dl.short_timeout_secs, dl.long_timeout_secs);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [download]
            enabled_sources = ["unpaywall", "scihub"]
            item_delay_ms = 0

            [search]
            year_from = 2015
            year_to = 2024
            "#,
        )
        .unwrap();
        assert_eq!(config.download.enabled_sources, vec!["unpaywall", "scihub"]);
        assert_eq!(config.download.item_delay_ms, 0);
        assert_eq!(config.download.long_timeout_secs, 45);
        assert_eq!(config.search.year_from, Some(2015));
        assert_eq!(config.search.results_per_query, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_year_range_rejected() {
        let config = Config::from_toml_str("[search]\nyear_from = 2024\nyear_to = 2010\n").unwrap();
        assert!(matches!(config.validate(), Err(PapyrixError::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_error() {
        assert!(matches!(
            Config::from_toml_str("[server\nport = 1"),
            Err(PapyrixError::ConfigParse(_))
        ));
    }
}
