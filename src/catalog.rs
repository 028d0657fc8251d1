//! Read-only formula catalog: exact lookup, ordered listing, and substring search.
//!
//! The catalog is loaded once and never mutated afterwards, so it can be shared behind an
//! [`Arc`] by any number of readers. Formulas keep the order they were declared in; both
//! [`FormulaCatalog::list`] and [`FormulaCatalog::search`] preserve it.

pub mod formula;

pub use formula::*;

// std
use std::collections::HashMap;
// self
use crate::{_prelude::*, auth::FormulaId};

const BUILTIN_CATALOG: &str = include_str!("catalog/builtin.json");

/// Errors raised while loading a catalog.
#[derive(Debug, ThisError)]
pub enum CatalogError {
	/// Two formulas share the same identifier.
	#[error("Formula `{id}` is declared more than once.")]
	DuplicateId {
		/// Offending identifier.
		id: FormulaId,
	},
	/// Catalog JSON did not match the formula model.
	#[error("Catalog JSON is invalid at `{path}`.")]
	Parse {
		/// JSON path of the failing value.
		path: String,
		/// Underlying parse failure.
		#[source]
		source: serde_json::Error,
	},
}
impl From<serde_path_to_error::Error<serde_json::Error>> for CatalogError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::Parse { path: e.path().to_string(), source: e.into_inner() }
	}
}

/// Identifier + label pair used for navigation and listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaSummary {
	/// Formula identifier.
	pub id: FormulaId,
	/// Display name.
	pub label: String,
}

/// Immutable, insertion-ordered set of formulas keyed by identifier.
#[derive(Clone, Debug, Default)]
pub struct FormulaCatalog {
	formulas: Vec<Formula>,
	index: HashMap<FormulaId, usize>,
}
impl FormulaCatalog {
	/// Builds a catalog, rejecting duplicate identifiers.
	pub fn from_formulas<I>(formulas: I) -> Result<Self, CatalogError>
	where
		I: IntoIterator<Item = Formula>,
	{
		let mut catalog = Self::default();

		for formula in formulas {
			if catalog.index.contains_key(&formula.id) {
				return Err(CatalogError::DuplicateId { id: formula.id });
			}

			catalog.index.insert(formula.id.clone(), catalog.formulas.len());
			catalog.formulas.push(formula);
		}

		Ok(catalog)
	}

	/// Parses a JSON array of formulas.
	pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
		let de = &mut serde_json::Deserializer::from_str(json);
		let formulas: Vec<Formula> = serde_path_to_error::deserialize(de)?;

		Self::from_formulas(formulas)
	}

	/// Parses a JSON array of formulas from raw bytes.
	pub fn from_json_slice(json: &[u8]) -> Result<Self, CatalogError> {
		let de = &mut serde_json::Deserializer::from_slice(json);
		let formulas: Vec<Formula> = serde_path_to_error::deserialize(de)?;

		Self::from_formulas(formulas)
	}

	/// Loads the catalog compiled into the crate.
	pub fn builtin() -> Result<Self, CatalogError> {
		Self::from_json_str(BUILTIN_CATALOG)
	}

	/// Exact-key lookup.
	pub fn get(&self, id: &str) -> Option<&Formula> {
		self.index.get(id).map(|&idx| &self.formulas[idx])
	}

	/// Lists `{id, label}` pairs in catalog order.
	pub fn list(&self) -> Vec<FormulaSummary> {
		self.formulas
			.iter()
			.map(|formula| FormulaSummary { id: formula.id.clone(), label: formula.label.clone() })
			.collect()
	}

	/// Case-insensitive substring search over id, label, and method names.
	///
	/// Results keep catalog order. An empty query matches every formula.
	pub fn search(&self, query: &str) -> Vec<&Formula> {
		let needle = query.to_lowercase();

		self.formulas.iter().filter(|formula| formula.matches_lowercase(&needle)).collect()
	}

	/// Iterates formulas in catalog order.
	pub fn iter(&self) -> impl Iterator<Item = &Formula> {
		self.formulas.iter()
	}

	/// Returns the number of formulas.
	pub fn len(&self) -> usize {
		self.formulas.len()
	}

	/// Returns true when the catalog holds no formulas.
	pub fn is_empty(&self) -> bool {
		self.formulas.is_empty()
	}
}
