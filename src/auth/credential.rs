//! Authorization header wrapper that redacts sensitive material.

// self
use crate::_prelude::*;

/// Redacted `Authorization` header value derived from an access token.
///
/// The raw token is folded into the header on construction and never kept on its own.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);
impl Credential {
	/// Builds a `Bearer` header value from a freshly issued access token.
	pub fn bearer(access_token: impl AsRef<str>) -> Self {
		Self(format!("Bearer {}", access_token.as_ref()))
	}

	/// Returns the header value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for Credential {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Credential").field(&"<redacted>").finish()
	}
}
impl Display for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn bearer_prefixes_token() {
		assert_eq!(Credential::bearer("tok").expose(), "Bearer tok");
	}

	#[test]
	fn formatters_redact() {
		let credential = Credential::bearer("super-secret");

		assert_eq!(format!("{credential:?}"), "Credential(\"<redacted>\")");
		assert_eq!(format!("{credential}"), "<redacted>");
	}
}
