mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Access, Attribute, Config, Cursor, Engine, Policy, PolicyProviderConfig, Search, Service,
	SmartSearch, Sort,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

/// Reads the JSON attribute mapping consumed by the attribute smart filter.
pub fn load_attribute_mapping(path: &Path) -> Result<Vec<Attribute>> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadAttributeMapping { path: path.to_path_buf(), source: err })?;

	serde_json::from_str(&raw)
		.map_err(|err| Error::ParseAttributeMapping { path: path.to_path_buf(), source: err })
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.search.max_result_window == 0 {
		return Err(Error::Validation {
			message: "search.max_result_window must be greater than zero.".to_string(),
		});
	}
	if cfg.search.default_limit == 0 {
		return Err(Error::Validation {
			message: "search.default_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.search.default_limit > cfg.search.max_result_window {
		return Err(Error::Validation {
			message: "search.default_limit must not exceed search.max_result_window.".to_string(),
		});
	}
	if cfg.search.aggregation_size == 0 {
		return Err(Error::Validation {
			message: "search.aggregation_size must be greater than zero.".to_string(),
		});
	}
	if !cfg.sort.dynamic_namespace.ends_with('.') || cfg.sort.dynamic_namespace.len() < 2 {
		return Err(Error::Validation {
			message: "sort.dynamic_namespace must be a non-empty prefix ending with '.'."
				.to_string(),
		});
	}
	if !cfg.sort.keyword_suffix.starts_with('.') || cfg.sort.keyword_suffix.len() < 2 {
		return Err(Error::Validation {
			message: "sort.keyword_suffix must be a non-empty suffix starting with '.'."
				.to_string(),
		});
	}
	if cfg.sort.field_type_cache_ttl_secs == 0 {
		return Err(Error::Validation {
			message: "sort.field_type_cache_ttl_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.cursor.keep_alive_secs == 0 {
		return Err(Error::Validation {
			message: "cursor.keep_alive_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.cursor.cache_ttl_secs == 0 {
		return Err(Error::Validation {
			message: "cursor.cache_ttl_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.policy.enabled {
		if !cfg.policy.id_template.contains("%s") {
			return Err(Error::Validation {
				message: "policy.id_template must contain the %s partition placeholder."
					.to_string(),
			});
		}
		if cfg.policy.provider.api_base.trim().is_empty() {
			return Err(Error::Validation {
				message: "policy.provider.api_base must be non-empty when policy is enabled."
					.to_string(),
			});
		}
		if cfg.policy.provider.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "policy.provider.timeout_ms must be greater than zero.".to_string(),
			});
		}
	}
	if cfg.engine.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "engine.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.access.owners_field.trim().is_empty() || cfg.access.viewers_field.trim().is_empty() {
		return Err(Error::Validation {
			message: "access.owners_field and access.viewers_field must be non-empty."
				.to_string(),
		});
	}

	for (key, value) in
		cfg.policy.provider.default_headers.iter().chain(cfg.engine.default_headers.iter())
	{
		if !value.is_string() {
			return Err(Error::Validation {
				message: format!("default_headers.{key} must be a string."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.smart_search
		.attribute_mapping
		.as_deref()
		.map(|path| path.as_os_str().to_string_lossy().trim().is_empty())
		.unwrap_or(false)
	{
		cfg.smart_search.attribute_mapping = None;
	}

	cfg.engine.api_base = cfg.engine.api_base.trim_end_matches('/').to_string();
	cfg.policy.provider.api_base = cfg.policy.provider.api_base.trim_end_matches('/').to_string();
}
