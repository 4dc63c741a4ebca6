//! Magic link strategy configuration
//!
//! A [`StrategyConfig`] is the mutable, serializable description of how magic
//! links behave for one resource. It becomes usable only after
//! [`StrategyConfig::validate`] checks it against the resource's
//! [`ResourceSchema`] and produces an immutable [`Strategy`]. Every runtime
//! decision reads the [`Strategy`]; nothing mutates it afterwards.
//!
//! # Example
//!
//! ```
//! use kagi_core::strategy::{ResourceSchema, StrategyConfig};
//!
//! let schema = ResourceSchema::new("user").unique_field("email");
//! let strategy = StrategyConfig::builder("magic_link")
//!     .registration_enabled(true)
//!     .build()
//!     .validate(&schema)
//!     .unwrap();
//!
//! assert_eq!(strategy.sign_in_action_name(), "sign_in_with_magic_link");
//! assert_eq!(strategy.request_action_name(), "request_magic_link");
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    identity::{IdentityComparison, IdentityField, IdentityKind},
};

pub const DEFAULT_STRATEGY_NAME: &str = "magic_link";

/// Ten minutes
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 600;

/// Thirty days
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 30 * 24 * 60 * 60;

pub const DEFAULT_TOKEN_PARAM_NAME: &str = "token";

const ENV_PREFIX: &str = "KAGI_MAGIC_LINK_";

fn default_strategy_name() -> String {
    DEFAULT_STRATEGY_NAME.to_string()
}

fn default_token_lifetime_secs() -> i64 {
    DEFAULT_TOKEN_LIFETIME_SECS
}

fn default_token_param_name() -> String {
    DEFAULT_TOKEN_PARAM_NAME.to_string()
}

fn default_true() -> bool {
    true
}

/// Declarative magic link settings for a single resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy name, used to derive action names
    #[serde(default = "default_strategy_name")]
    pub name: String,

    #[serde(default)]
    pub identity_field: IdentityField,

    #[serde(default = "default_token_lifetime_secs")]
    pub token_lifetime_secs: i64,

    #[serde(default = "default_true")]
    pub single_use: bool,

    #[serde(default = "default_true")]
    pub prevent_hijacking: bool,

    #[serde(default)]
    pub registration_enabled: bool,

    /// Explicit request action name. Derived from `name` when absent.
    #[serde(default)]
    pub request_action_name: Option<String>,

    /// Explicit sign-in action name. Derived from `name` when absent.
    #[serde(default)]
    pub sign_in_action_name: Option<String>,

    /// Query parameter carrying the token in generated links
    #[serde(default = "default_token_param_name")]
    pub token_param_name: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: default_strategy_name(),
            identity_field: IdentityField::default(),
            token_lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
            single_use: true,
            prevent_hijacking: true,
            registration_enabled: false,
            request_action_name: None,
            sign_in_action_name: None,
            token_param_name: default_token_param_name(),
        }
    }
}

impl StrategyConfig {
    pub fn builder(name: impl Into<String>) -> StrategyConfigBuilder {
        StrategyConfigBuilder {
            config: StrategyConfig {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Load the configuration from `KAGI_MAGIC_LINK_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable values are an error.
    ///
    /// | Variable                                  | Setting                |
    /// | ----------------------------------------- | ---------------------- |
    /// | `KAGI_MAGIC_LINK_IDENTITY_FIELD`          | `identity_field.name`  |
    /// | `KAGI_MAGIC_LINK_IDENTITY_COMPARISON`     | `identity_field.comparison` |
    /// | `KAGI_MAGIC_LINK_TOKEN_LIFETIME_SECS`     | `token_lifetime_secs`  |
    /// | `KAGI_MAGIC_LINK_SINGLE_USE`              | `single_use`           |
    /// | `KAGI_MAGIC_LINK_PREVENT_HIJACKING`       | `prevent_hijacking`    |
    /// | `KAGI_MAGIC_LINK_REGISTRATION_ENABLED`    | `registration_enabled` |
    /// | `KAGI_MAGIC_LINK_REQUEST_ACTION_NAME`     | `request_action_name`  |
    /// | `KAGI_MAGIC_LINK_SIGN_IN_ACTION_NAME`     | `sign_in_action_name`  |
    /// | `KAGI_MAGIC_LINK_TOKEN_PARAM_NAME`        | `token_param_name`     |
    pub fn from_env(name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(name, |key| std::env::var(key).ok())
    }

    /// Same as [`StrategyConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(name: impl Into<String>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let key = format!("{ENV_PREFIX}{suffix}");
            lookup(&key).map(|value| (key, value))
        };

        let mut config = StrategyConfig {
            name: name.into(),
            ..Default::default()
        };

        if let Some((_, field)) = var("IDENTITY_FIELD") {
            let kind = if field == "email" {
                IdentityKind::Email
            } else {
                IdentityKind::Text
            };
            config.identity_field = IdentityField::new(field).with_kind(kind);
        }
        if let Some((_, comparison)) = var("IDENTITY_COMPARISON") {
            config.identity_field.comparison = comparison.parse::<IdentityComparison>()?;
        }
        if let Some((key, secs)) = var("TOKEN_LIFETIME_SECS") {
            config.token_lifetime_secs = secs
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                    key,
                    message: e.to_string(),
                })?;
        }
        if let Some((key, value)) = var("SINGLE_USE") {
            config.single_use = parse_bool(key, &value)?;
        }
        if let Some((key, value)) = var("PREVENT_HIJACKING") {
            config.prevent_hijacking = parse_bool(key, &value)?;
        }
        if let Some((key, value)) = var("REGISTRATION_ENABLED") {
            config.registration_enabled = parse_bool(key, &value)?;
        }
        config.request_action_name = var("REQUEST_ACTION_NAME").map(|(_, v)| v);
        config.sign_in_action_name = var("SIGN_IN_ACTION_NAME").map(|(_, v)| v);
        if let Some((_, param)) = var("TOKEN_PARAM_NAME") {
            config.token_param_name = param;
        }

        Ok(config)
    }

    /// Check the configuration against `resource` and freeze it.
    ///
    /// This is the only way to obtain a [`Strategy`]. It fails when the
    /// identity field is missing or not unique on the resource, when the
    /// token lifetime is not positive or longer than [`MAX_TOKEN_LIFETIME_SECS`],
    /// or when the action names clash.
    pub fn validate(&self, resource: &ResourceSchema) -> Result<Strategy, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name".to_string()));
        }

        match resource.fields.get(&self.identity_field.name) {
            None => {
                return Err(ConfigError::UnknownIdentityField {
                    resource: resource.name.clone(),
                    field: self.identity_field.name.clone(),
                });
            }
            Some(descriptor) if !descriptor.unique => {
                return Err(ConfigError::IdentityFieldNotUnique {
                    resource: resource.name.clone(),
                    field: self.identity_field.name.clone(),
                });
            }
            Some(_) => {}
        }

        if self.token_lifetime_secs <= 0 {
            return Err(ConfigError::NonPositiveLifetime);
        }
        let token_lifetime = Duration::try_seconds(self.token_lifetime_secs)
            .filter(|_| self.token_lifetime_secs <= MAX_TOKEN_LIFETIME_SECS)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "token_lifetime_secs".to_string(),
                message: format!(
                    "{} seconds exceeds the maximum of {MAX_TOKEN_LIFETIME_SECS}",
                    self.token_lifetime_secs
                ),
            })?;

        let request_action_name =
            resolve_action_name(resource, self.request_action_name.as_deref(), || {
                derive_request_action_name(&self.name)
            })?;
        let sign_in_action_name =
            resolve_action_name(resource, self.sign_in_action_name.as_deref(), || {
                derive_sign_in_action_name(&self.name)
            })?;

        if request_action_name == sign_in_action_name {
            return Err(ConfigError::InvalidValue {
                key: "sign_in_action_name".to_string(),
                message: format!(
                    "request and sign-in actions must differ, both are '{sign_in_action_name}'"
                ),
            });
        }

        if self.token_param_name.trim().is_empty() {
            return Err(ConfigError::MissingField("token_param_name".to_string()));
        }

        tracing::debug!(
            strategy = %self.name,
            resource = %resource.name,
            identity_field = %self.identity_field.name,
            comparison = %self.identity_field.comparison,
            single_use = self.single_use,
            prevent_hijacking = self.prevent_hijacking,
            registration_enabled = self.registration_enabled,
            "Validated magic link strategy"
        );

        Ok(Strategy {
            name: self.name.clone(),
            resource: resource.name.clone(),
            identity_field: self.identity_field.clone(),
            token_lifetime,
            single_use: self.single_use,
            prevent_hijacking: self.prevent_hijacking,
            registration_enabled: self.registration_enabled,
            request_action_name,
            sign_in_action_name,
            token_param_name: self.token_param_name.clone(),
        })
    }
}

fn parse_bool(key: String, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key,
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

/// `request_<strategy>`
pub fn derive_request_action_name(strategy_name: &str) -> String {
    format!("request_{strategy_name}")
}

/// `sign_in_with_<strategy>`
pub fn derive_sign_in_action_name(strategy_name: &str) -> String {
    format!("sign_in_with_{strategy_name}")
}

// Explicit names may point at actions the resource already defines. Derived
// names must not shadow them.
fn resolve_action_name(
    resource: &ResourceSchema,
    explicit: Option<&str>,
    derive: impl FnOnce() -> String,
) -> Result<String, ConfigError> {
    if let Some(name) = explicit {
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "action_name".to_string(),
                message: "action names cannot be blank".to_string(),
            });
        }
        return Ok(name.to_string());
    }

    let derived = derive();
    if resource.actions.contains(&derived) {
        return Err(ConfigError::ActionCollision {
            resource: resource.name.clone(),
            action: derived,
        });
    }
    Ok(derived)
}

pub struct StrategyConfigBuilder {
    config: StrategyConfig,
}

impl StrategyConfigBuilder {
    pub fn identity_field(mut self, field: IdentityField) -> Self {
        self.config.identity_field = field;
        self
    }

    pub fn token_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.token_lifetime_secs = lifetime.num_seconds();
        self
    }

    pub fn single_use(mut self, single_use: bool) -> Self {
        self.config.single_use = single_use;
        self
    }

    pub fn prevent_hijacking(mut self, prevent_hijacking: bool) -> Self {
        self.config.prevent_hijacking = prevent_hijacking;
        self
    }

    pub fn registration_enabled(mut self, registration_enabled: bool) -> Self {
        self.config.registration_enabled = registration_enabled;
        self
    }

    pub fn request_action_name(mut self, name: impl Into<String>) -> Self {
        self.config.request_action_name = Some(name.into());
        self
    }

    pub fn sign_in_action_name(mut self, name: impl Into<String>) -> Self {
        self.config.sign_in_action_name = Some(name.into());
        self
    }

    pub fn token_param_name(mut self, name: impl Into<String>) -> Self {
        self.config.token_param_name = name.into();
        self
    }

    pub fn build(self) -> StrategyConfig {
        self.config
    }
}

/// A field declared on a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Whether the resource enforces uniqueness on this field
    pub unique: bool,
}

/// The shape of the resource a strategy authenticates: its fields and the
/// actions it already defines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub name: String,
    fields: BTreeMap<String, FieldDescriptor>,
    actions: BTreeSet<String>,
}

impl ResourceSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn field(self, name: impl Into<String>) -> Self {
        self.with_field(name, false)
    }

    pub fn unique_field(self, name: impl Into<String>) -> Self {
        self.with_field(name, true)
    }

    fn with_field(mut self, name: impl Into<String>, unique: bool) -> Self {
        let name = name.into();
        self.fields.insert(name.clone(), FieldDescriptor { name, unique });
        self
    }

    /// Declare an action the resource defines independently of this strategy
    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.actions.insert(name.into());
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains(name)
    }
}

/// A validated, immutable magic link strategy
///
/// Built only by [`StrategyConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    name: String,
    resource: String,
    identity_field: IdentityField,
    token_lifetime: Duration,
    single_use: bool,
    prevent_hijacking: bool,
    registration_enabled: bool,
    request_action_name: String,
    sign_in_action_name: String,
    token_param_name: String,
}

impl Strategy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn identity_field(&self) -> &IdentityField {
        &self.identity_field
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    pub fn single_use(&self) -> bool {
        self.single_use
    }

    pub fn prevent_hijacking(&self) -> bool {
        self.prevent_hijacking
    }

    pub fn registration_enabled(&self) -> bool {
        self.registration_enabled
    }

    pub fn request_action_name(&self) -> &str {
        &self.request_action_name
    }

    pub fn sign_in_action_name(&self) -> &str {
        &self.sign_in_action_name
    }

    pub fn token_param_name(&self) -> &str {
        &self.token_param_name
    }
}
