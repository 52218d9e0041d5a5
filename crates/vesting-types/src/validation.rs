//! Shape checks for backend implementation tables.
//!
//! Each pluggable backend (storage, funds, account) describes its
//! `[<section>.implementations.<name>]` table with a [`Schema`], and the
//! factory rejects a table that does not match before building anything.

use crate::U256;
use alloy_primitives::Address;
use thiserror::Error;

/// A table that does not match its schema. `field` is a dotted path, with
/// `[i]` for array positions, e.g. `balances[1].token`.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: String,
	},
}

/// Value kinds a backend table can hold.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// 0x-prefixed 20-byte hex string.
	Address,
	/// Decimal integer string of up to 256 bits. Amounts overflow TOML
	/// integers, so they are written as strings.
	Amount,
	Array(Box<FieldType>),
	Table(Schema),
}

pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	/// Extra check run after the type check passed.
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, path: &str, value: &toml::Value) -> Result<(), ValidationError> {
		check_type(path, value, &self.field_type)?;
		match &self.validator {
			Some(validator) => validator(value).map_err(|message| ValidationError::InvalidValue {
				field: path.to_string(),
				message,
			}),
			None => Ok(()),
		}
	}
}

/// Required and optional fields of one table. Unknown keys are ignored.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		self.validate_at("", config)
	}

	fn validate_at(&self, prefix: &str, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config.as_table().ok_or_else(|| ValidationError::TypeMismatch {
			field: if prefix.is_empty() { "root".to_string() } else { prefix.to_string() },
			expected: "table",
			actual: config.type_str().to_string(),
		})?;
		let path = |name: &str| {
			if prefix.is_empty() {
				name.to_string()
			} else {
				format!("{}.{}", prefix, name)
			}
		};

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(path(&field.name)))?;
			field.check(&path(&field.name), value)?;
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(&path(&field.name), value)?;
			}
		}
		Ok(())
	}
}

fn check_type(path: &str, value: &toml::Value, expected: &FieldType) -> Result<(), ValidationError> {
	let mismatch = |expected: &'static str| ValidationError::TypeMismatch {
		field: path.to_string(),
		expected,
		actual: value.type_str().to_string(),
	};
	let invalid = |message: String| ValidationError::InvalidValue {
		field: path.to_string(),
		message,
	};

	match expected {
		FieldType::String => {
			value.as_str().ok_or_else(|| mismatch("string"))?;
		},
		FieldType::Address => {
			let raw = value.as_str().ok_or_else(|| mismatch("address"))?;
			raw.parse::<Address>()
				.map_err(|_| invalid(format!("'{}' is not a valid address", raw)))?;
		},
		FieldType::Amount => {
			let raw = value.as_str().ok_or_else(|| mismatch("amount string"))?;
			U256::from_str_radix(raw, 10)
				.map_err(|_| invalid(format!("'{}' is not a decimal amount", raw)))?;
		},
		FieldType::Array(item) => {
			let items = value.as_array().ok_or_else(|| mismatch("array"))?;
			for (i, entry) in items.iter().enumerate() {
				check_type(&format!("{}[{}]", path, i), entry, item)?;
			}
		},
		FieldType::Table(schema) => schema.validate_at(path, value)?,
	}
	Ok(())
}

/// Configuration schema of one backend implementation, returned by the
/// backend interfaces' `config_schema()`.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
