use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Platform ceiling for a single invocation.
pub const MAX_TIMEOUT_SECS: u64 = 15 * 60;

pub const DEFAULT_RUNTIME: &str = "python3.11";

/// `module.function` entry point of a unit's code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerRef {
    pub module: String,
    pub function: String,
}

impl HandlerRef {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidHandler(value.to_string());
        let (module, function) = value.rsplit_once('.').ok_or_else(invalid)?;
        let ident = |s: &str| {
            !s.is_empty()
                && s.split('.').all(|part| {
                    !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                })
        };
        if !ident(module) || !ident(function) {
            return Err(invalid());
        }
        Ok(Self {
            module: module.to_string(),
            function: function.to_string(),
        })
    }
}

impl core::fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

impl Serialize for HandlerRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HandlerRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        HandlerRef::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Static definition of a compute unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeUnitSpec {
    pub function_name: String,
    pub runtime: String,
    pub handler: HandlerRef,
    pub timeout_secs: u64,
}

impl ComputeUnitSpec {
    pub fn new(function_name: impl Into<String>, handler: HandlerRef) -> Self {
        Self {
            function_name: function_name.into(),
            runtime: DEFAULT_RUNTIME.to_string(),
            handler,
            timeout_secs: MAX_TIMEOUT_SECS,
        }
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.function_name.trim().is_empty() {
            return Err(ConfigError::InvalidHandler(
                "function name must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidTimeout(format!(
                "{}s is outside 1..={MAX_TIMEOUT_SECS}s",
                self.timeout_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_ref_splits_on_last_dot() {
        let h = HandlerRef::parse("main.lambda_handler").unwrap();
        assert_eq!(h.module, "main");
        assert_eq!(h.function, "lambda_handler");
        assert_eq!(h.to_string(), "main.lambda_handler");

        let nested = HandlerRef::parse("pkg.digest.run").unwrap();
        assert_eq!(nested.module, "pkg.digest");
    }

    #[test]
    fn handler_ref_rejects_malformed_values() {
        for bad in ["main", ".handler", "main.", "main..handler", "main.lambda-handler"] {
            assert!(HandlerRef::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn default_bound_is_the_platform_ceiling() {
        let unit = ComputeUnitSpec::new("fn", HandlerRef::parse("main.lambda_handler").unwrap());
        assert_eq!(unit.timeout(), Duration::from_secs(900));
        assert_eq!(unit.runtime, "python3.11");
        assert!(unit.validate().is_ok());
    }

    #[test]
    fn bound_outside_ceiling_is_rejected() {
        let handler = HandlerRef::parse("main.lambda_handler").unwrap();
        assert!(ComputeUnitSpec::new("fn", handler.clone()).with_timeout_secs(0).validate().is_err());
        assert!(ComputeUnitSpec::new("fn", handler).with_timeout_secs(901).validate().is_err());
    }

    #[test]
    fn handler_ref_serializes_as_string() {
        let h = HandlerRef::parse("main.lambda_handler").unwrap();
        assert_eq!(serde_json::to_string(&h).unwrap(), "\"main.lambda_handler\"");
    }
}
