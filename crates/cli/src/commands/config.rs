use parley_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|secret| redact(secret.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_owned());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_owned()];
    lines.push(format!("  llm.provider = {:?}", config.llm.provider));
    lines.push(format!("  llm.model = {}", config.llm.model));
    lines.push(format!("  llm.api_key = {api_key}"));
    lines.push(format!(
        "  llm.base_url = {}",
        config.llm.base_url.as_deref().unwrap_or("(unset)")
    ));
    lines.push(format!("  llm.timeout_secs = {}", config.llm.timeout_secs));
    lines.push(format!("  llm.max_retries = {}", config.llm.max_retries));
    lines.push(format!("  surface.mode = {:?}", config.surface.mode));
    lines.push(format!(
        "  surface.bridge_url = {}",
        config.surface.bridge_url.as_deref().unwrap_or("(unset)")
    ));
    lines.push(format!(
        "  surface.navigation_settle_secs = {}",
        config.surface.navigation_settle_secs
    ));
    lines.push(format!("  timing.poll_interval_secs = {}", config.timing.poll_interval_secs));
    lines.push(format!("  timing.debounce_secs = {}", config.timing.debounce_secs));
    lines.push(format!("  timing.watchdog_secs = {}", config.timing.watchdog_secs));
    lines.push(format!(
        "  timing.watchdog_composing_secs = {}",
        config.timing.watchdog_composing_secs
    ));
    lines.push(format!(
        "  timing.typing_suppression_secs = {}",
        config.timing.typing_suppression_secs
    ));
    lines.push(format!("  stall.initial_delay_secs = {}", config.stall.initial_delay_secs));
    lines.push(format!("  stall.min_interval_secs = {}", config.stall.min_interval_secs));
    lines.push(format!("  stall.jitter_max_secs = {}", config.stall.jitter_max_secs));
    lines.push(format!("  logging.level = {}", config.logging.level));
    lines.push(format!("  logging.format = {:?}", config.logging.format));

    lines.join("\n")
}

fn redact(secret: &str) -> String {
    if secret.len() <= 8 {
        return "********".to_owned();
    }
    format!("{}...{}", &secret[..4], &secret[secret.len() - 2..])
}

#[cfg(test)]
mod tests {
    use super::redact;

    #[test]
    fn short_secrets_are_fully_masked() {
        assert_eq!(redact("abc"), "********");
    }

    #[test]
    fn long_secrets_keep_only_the_edges() {
        assert_eq!(redact("sk-test-1234567890"), "sk-t...90");
    }
}
