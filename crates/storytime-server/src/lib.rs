pub mod config;

/// Filter used when `RUST_LOG` is unset. Covers both binaries and every
/// workspace crate.
pub const DEFAULT_LOG_FILTER: &str = "storytime=debug,storytime_seed=debug,storytime_server=debug,\
                                      storytime_api=debug,storytime_db=info,tower_http=debug";

/// Install the `tracing` subscriber, honouring `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_names_every_target() {
        let targets: Vec<&str> = DEFAULT_LOG_FILTER
            .split(',')
            .filter_map(|directive| directive.split('=').next())
            .collect();
        for target in [
            "storytime",
            "storytime_seed",
            "storytime_server",
            "storytime_api",
            "storytime_db",
        ] {
            assert!(targets.contains(&target), "{}", target);
        }
        assert!(DEFAULT_LOG_FILTER.parse::<tracing_subscriber::EnvFilter>().is_ok());
    }
}
