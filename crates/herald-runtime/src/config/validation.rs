//! Configuration validation utilities.

use super::error::{ConfigLoadError, ConfigLoadResult};
use super::schema::{DispatchConfig, ExecutorConfig, HeraldConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
///
/// Unknown log levels are already rejected when the configuration is
/// extracted, so only cross-field rules are checked here.
pub fn validate_config(config: &HeraldConfig) -> ConfigLoadResult<()> {
    validate_dispatch_config(&config.dispatch)?;
    validate_executor_config(&config.executor)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigLoadResult<()> {
    let separator = dispatch.argument_separator;
    if separator.is_control() && !separator.is_whitespace() {
        return Err(ConfigLoadError::validation(format!(
            "Argument separator must not be a control character: {separator:?}"
        )));
    }
    Ok(())
}

fn validate_executor_config(executor: &ExecutorConfig) -> ConfigLoadResult<()> {
    if executor.worker_threads == 0 {
        return Err(ConfigLoadError::validation(
            "Executor worker_threads must be at least 1",
        ));
    }

    if executor.thread_name.trim().is_empty() {
        return Err(ConfigLoadError::validation(
            "Executor thread_name must not be empty",
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigLoadResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigLoadError::validation(
            "logging.file_path is required when logging.output is 'file'",
        ));
    }

    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigLoadError::validation(format!(
            "Log filter module name must not be empty: {module:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&HeraldConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_prefix_is_accepted() {
        let mut config = HeraldConfig::default();
        config.dispatch.prefix = String::new();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_separator_rules() {
        let mut config = HeraldConfig::default();

        config.dispatch.argument_separator = '\t';
        assert!(validate_config(&config).is_ok());

        config.dispatch.argument_separator = ',';
        assert!(validate_config(&config).is_ok());

        config.dispatch.argument_separator = '\u{7}';
        assert!(matches!(
            validate_config(&config),
            Err(ConfigLoadError::Validation { .. })
        ));
    }

    #[test]
    fn test_executor_rules() {
        let mut config = HeraldConfig::default();
        config.executor.worker_threads = 0;
        assert!(validate_config(&config).is_err());

        let mut config = HeraldConfig::default();
        config.executor.thread_name = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = HeraldConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("herald.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_filter_module() {
        let mut config = HeraldConfig::default();
        config.logging.filters.insert(String::new(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }
}
