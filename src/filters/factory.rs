//! Guard chain construction from configuration
//!
//! An empty `[[guards]]` list yields the standard chain. Otherwise the
//! listed guards run in the order given, with optional per-guard parameters
//! overriding the `[limits]` section.

use serde::Deserialize;
use thiserror::Error;

use super::fields::FieldCountFilter;
use super::honeypot::HoneypotFilter;
use super::presence::PresenceFilter;
use super::rate::RateLimitFilter;
use super::size::SizeFilter;
use super::{FilterChain, SubmissionFilter};
use crate::config::{FilterConfig, LimitsConfig};
use crate::limits::DynRateLimiter;

/// Errors that can occur when creating guards from configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterFactoryError {
    #[error("Unknown guard: {0}")]
    UnknownFilter(String),

    #[error("Invalid guard parameters: {0}")]
    InvalidParameters(String),
}

/// Shared state the guards are built around
#[derive(Clone)]
pub struct GuardDeps {
    pub limits: LimitsConfig,
    pub rate_limiter: DynRateLimiter,
}

#[derive(Deserialize, Default)]
struct HoneypotParams {
    field: Option<String>,
}

#[derive(Deserialize, Default)]
struct FieldCountParams {
    max_fields: Option<usize>,
}

#[derive(Deserialize, Default)]
struct SizeParams {
    max_bytes: Option<u64>,
}

fn params<T: for<'de> Deserialize<'de>>(config: &FilterConfig) -> Result<T, FilterFactoryError> {
    serde_json::from_value(serde_json::Value::Object(config.parameters.clone())).map_err(|e| {
        FilterFactoryError::InvalidParameters(format!("{} configuration error: {e}", config.name))
    })
}

/// Create a guard from configuration
pub fn create_filter(
    config: &FilterConfig,
    deps: &GuardDeps,
) -> Result<Box<dyn SubmissionFilter>, FilterFactoryError> {
    match config.name.as_str() {
        "HoneypotFilter" => {
            let p: HoneypotParams = params(config)?;
            let field = p.field.unwrap_or_else(|| deps.limits.honeypot_field.clone());
            Ok(Box::new(HoneypotFilter::new(field)))
        }
        "RateLimitFilter" => Ok(Box::new(RateLimitFilter::new(deps.rate_limiter.clone()))),
        "PresenceFilter" => Ok(Box::new(PresenceFilter)),
        "FieldCountFilter" => {
            let p: FieldCountParams = params(config)?;
            let max = p.max_fields.unwrap_or(deps.limits.max_fields);
            if max == 0 {
                return Err(FilterFactoryError::InvalidParameters(
                    "FieldCountFilter max_fields must be positive".into(),
                ));
            }
            Ok(Box::new(FieldCountFilter::new(
                max,
                deps.limits.honeypot_field.clone(),
            )))
        }
        "SizeFilter" => {
            let p: SizeParams = params(config)?;
            Ok(Box::new(SizeFilter::new(
                p.max_bytes.unwrap_or(deps.limits.max_data_bytes),
            )))
        }
        _ => Err(FilterFactoryError::UnknownFilter(config.name.clone())),
    }
}

/// The standard guard order
#[must_use]
pub fn default_chain(deps: &GuardDeps) -> FilterChain {
    FilterChain::new()
        .add_filter(Box::new(HoneypotFilter::new(
            deps.limits.honeypot_field.clone(),
        )))
        .add_filter(Box::new(RateLimitFilter::new(deps.rate_limiter.clone())))
        .add_filter(Box::new(PresenceFilter))
        .add_filter(Box::new(FieldCountFilter::new(
            deps.limits.max_fields,
            deps.limits.honeypot_field.clone(),
        )))
        .add_filter(Box::new(SizeFilter::new(deps.limits.max_data_bytes)))
}

/// Create a guard chain from a list of guard configurations
pub fn create_filter_chain(
    configs: &[FilterConfig],
    deps: &GuardDeps,
) -> Result<FilterChain, FilterFactoryError> {
    if configs.is_empty() {
        return Ok(default_chain(deps));
    }

    let mut chain = FilterChain::new();
    for config in configs {
        chain = chain.add_filter(create_filter(config, deps)?);
    }
    Ok(chain)
}
