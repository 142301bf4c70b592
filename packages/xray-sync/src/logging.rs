use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber for sync runs.
///
/// `RUST_LOG` takes precedence over `default_directive` (e.g. `"xray_sync=info"`).
/// Calling this more than once, or after another subscriber was installed,
/// is a no-op.
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("info");
        init_logging("debug");
        tracing::info!("logging initialised twice without panicking");
    }
}
