use serde::{Deserialize, Serialize};

use crate::error::{RepocketError, RepocketResult};

/// Session configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepocketConfig {
    /// Longest chain of pointers followed while loading one record.
    pub max_pointer_depth: usize,
    /// Skip (with a warning) stored hash fields the record type does not
    /// declare. When off, such fields fail the load.
    pub skip_unknown_fields: bool,
}

impl Default for RepocketConfig {
    fn default() -> Self {
        Self {
            max_pointer_depth: 16,
            skip_unknown_fields: true,
        }
    }
}

impl RepocketConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> RepocketResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RepocketError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> RepocketResult<String> {
        toml::to_string(self).map_err(|e| RepocketError::Config(e.to_string()))
    }

    pub fn validate(&self) -> RepocketResult<()> {
        if self.max_pointer_depth == 0 {
            return Err(RepocketError::Config(
                "max_pointer_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
