use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T: ?Sized> {
    fn validate(&self, field: &str, value: &T) -> Result<(), ConfigError>;
}

/// Identifier validator for locator names and run-level environments
pub struct IdentifierValidator;

impl ConfigValidator<str> for IdentifierValidator {
    fn validate(&self, field: &str, value: &str) -> Result<(), ConfigError> {
        if value.is_empty() {
            return Err(ConfigError::missing_required(field, "It must not be empty"));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ConfigError::invalid_value(
                field,
                value,
                "an identifier without whitespace",
            ));
        }
        Ok(())
    }
}

/// Lower-bound validator for integer settings
pub struct MinimumValidator {
    pub min: i32,
}

impl ConfigValidator<i32> for MinimumValidator {
    fn validate(&self, field: &str, value: &i32) -> Result<(), ConfigError> {
        if *value < self.min {
            return Err(ConfigError::invalid_value(
                field,
                value.to_string(),
                format!("a value of at least {}", self.min),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validator() {
        assert!(IdentifierValidator.validate("name", "system").is_ok());
        assert!(matches!(
            IdentifierValidator.validate("name", ""),
            Err(ConfigError::MissingRequired { .. })
        ));
        assert!(matches!(
            IdentifierValidator.validate("name", "two words"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_minimum_validator() {
        let validator = MinimumValidator { min: -1 };
        assert!(validator.validate("baseline", &-1).is_ok());
        assert!(validator.validate("baseline", &7).is_ok());

        let error = validator.validate("baseline", &-2).unwrap_err();
        assert!(error.to_string().contains("baseline"));
    }
}
