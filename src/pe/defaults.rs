// Default parser configuration
// These are recommendations, not format requirements

use crate::utils::is_env_true;

/// Parse the security directory unless told otherwise
pub const DEFAULT_PARSE_SIGNATURES: bool = true;

/// Parse the load configuration directory unless told otherwise
pub const DEFAULT_PARSE_LOAD_CONFIG: bool = true;

/// Upper bound on WIN_CERTIFICATE entries decoded per image
pub const DEFAULT_MAX_SIGNATURES: usize = 16;

/// Environment switches honoured by [`ParserConfig::from_env`]
pub const ENV_SKIP_SIGNATURES: &str = "PEFORGE_SKIP_SIGNATURES";
pub const ENV_SKIP_LOAD_CONFIG: &str = "PEFORGE_SKIP_LOAD_CONFIG";

/// What the PE front-end decodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    pub parse_signatures: bool,
    pub parse_load_config: bool,
    pub max_signatures: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            parse_signatures: DEFAULT_PARSE_SIGNATURES,
            parse_load_config: DEFAULT_PARSE_LOAD_CONFIG,
            max_signatures: DEFAULT_MAX_SIGNATURES,
        }
    }
}

impl ParserConfig {
    /// Defaults adjusted by `PEFORGE_SKIP_*` environment switches
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if is_env_true(ENV_SKIP_SIGNATURES) {
            config.parse_signatures = false;
        }
        if is_env_true(ENV_SKIP_LOAD_CONFIG) {
            config.parse_load_config = false;
        }
        config
    }

    /// Only the security directory, no load configuration
    pub fn signatures_only() -> Self {
        ParserConfig {
            parse_load_config: false,
            ..Self::default()
        }
    }

    /// Only the load configuration, no signature decoding
    pub fn load_config_only() -> Self {
        ParserConfig {
            parse_signatures: false,
            ..Self::default()
        }
    }
}
