//! Formula data model: one provider's authentication recipe.

// crates.io
use indexmap::IndexMap;
// self
use crate::{
	_prelude::*,
	auth::{FormulaId, MethodName},
	error::ConfigError,
};

/// Named authentication recipe for one external API provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Formula {
	/// Stable catalog key.
	pub id: FormulaId,
	/// Display name.
	pub label: String,
	/// Optional free-text description.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Authentication methods keyed by method name.
	#[serde(default)]
	pub methods: IndexMap<MethodName, Method>,
	/// APIs reachable with tokens minted by this formula.
	#[serde(default)]
	pub apis: IndexMap<String, Api>,
	/// OAuth clients bundled with the formula, in preference order.
	#[serde(default)]
	pub clients: Vec<Client>,
	/// Hint for disambiguating several accounts at the same provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub identity: Option<Identity>,
}
impl Formula {
	/// Returns true when `query` (already lowercased) appears in the id, label, or any method
	/// name.
	pub(crate) fn matches_lowercase(&self, query: &str) -> bool {
		self.id.to_lowercase().contains(query)
			|| self.label.to_lowercase().contains(query)
			|| self.methods.keys().any(|name| name.to_lowercase().contains(query))
	}

	/// Resolves everything the device playground needs from this formula.
	///
	/// The playground activates only when the formula defines a `device_code` method with
	/// `device` and `token` endpoints, an API usable with that method, and a client that
	/// supports it. `client_name` pins a specific bundled client; otherwise the first matching
	/// client wins.
	pub fn device_playground(
		&self,
		client_name: Option<&str>,
	) -> Result<DevicePlayground, ConfigError> {
		let unavailable =
			|reason| ConfigError::PlaygroundUnavailable { formula: self.id.to_string(), reason };
		let method =
			self.methods.get(MethodName::DEVICE_CODE).ok_or(unavailable("no device_code method"))?;
		let device_endpoint = method.endpoint("device")?.ok_or(unavailable("no device endpoint"))?;
		let token_endpoint = method.endpoint("token")?.ok_or(unavailable("no token endpoint"))?;
		let (api_name, api) = self
			.apis
			.iter()
			.find(|(_, api)| api.supports(MethodName::DEVICE_CODE))
			.ok_or(unavailable("no API accepts device_code tokens"))?;
		let client = self
			.clients
			.iter()
			.filter(|client| client.supports(MethodName::DEVICE_CODE))
			.find(|client| client_name.is_none_or(|name| client.name == name))
			.ok_or(unavailable("no client supports device_code"))?;

		Ok(DevicePlayground {
			formula: self.id.clone(),
			api_name: api_name.clone(),
			api: api.clone(),
			client: client.clone(),
			device_endpoint,
			token_endpoint,
			scope: method.scope.clone(),
		})
	}

	/// Returns true when [`Formula::device_playground`] would succeed for the default client.
	pub fn supports_device_playground(&self) -> bool {
		self.device_playground(None).is_ok()
	}
}

/// Method record describing how to authenticate with one grant or key style.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Method {
	/// Optional display label.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	/// Named endpoint URLs (`device`, `token`, `authorize`, ...).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub endpoints: Option<IndexMap<String, String>>,
	/// Space-delimited scope string.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
	/// Manual app-registration hint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub register: Option<Register>,
	/// RFC 7591 dynamic registration parameters.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dynamic_registration: Option<DynamicRegistration>,
}
impl Method {
	/// Parses the named endpoint, returning `None` when it is not declared.
	pub fn endpoint(&self, name: &str) -> Result<Option<Url>, ConfigError> {
		let Some(raw) = self.endpoints.as_ref().and_then(|endpoints| endpoints.get(name)) else {
			return Ok(None);
		};

		Url::parse(raw)
			.map(Some)
			.map_err(|source| ConfigError::InvalidEndpoint { name: name.to_owned(), source })
	}

	/// Iterates the individual scopes of the space-delimited `scope` string.
	pub fn scopes(&self) -> impl Iterator<Item = &str> {
		self.scope.as_deref().unwrap_or_default().split_whitespace()
	}
}

/// Manual registration hint: where to register an app and the steps to follow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
	/// Registration page.
	pub url: String,
	/// Ordered human-readable steps.
	#[serde(default)]
	pub steps: Vec<String>,
}

/// Dynamic client registration parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicRegistration {
	/// Requested client name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_name: Option<String>,
	/// Requested grant types.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub grant_types: Vec<String>,
	/// Requested response types.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub response_types: Vec<String>,
	/// Requested token endpoint auth method.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_endpoint_auth_method: Option<String>,
	/// Provider-specific parameters kept verbatim.
	#[serde(flatten)]
	pub extra: BTreeMap<String, JsonValue>,
}

/// API reachable with tokens from one or more methods.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Api {
	/// Base URL requests are issued against.
	pub base_url: String,
	/// Header template, e.g. `Authorization: Bearer {token}`.
	pub auth_header: String,
	/// Documentation link.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub docs_url: Option<String>,
	/// Spec flavor (`openapi`, `graphql`, ...).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub spec_type: Option<String>,
	/// Methods whose tokens this API accepts.
	#[serde(default)]
	pub methods: Vec<MethodName>,
	/// Endpoint used for the playground's starter snippet.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub example_endpoint: Option<String>,
	/// URL placeholders the caller must fill in.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variables: Option<IndexMap<String, ApiVariable>>,
}
impl Api {
	/// Returns true when tokens from `method` are valid for this API.
	pub fn supports(&self, method: &str) -> bool {
		self.methods.iter().any(|name| &**name == method)
	}

	/// Joins `base_url` with the example endpoint, if one is declared.
	pub fn example_url(&self) -> Option<String> {
		let endpoint = self.example_endpoint.as_deref()?;

		Some(format!(
			"{}/{}",
			self.base_url.trim_end_matches('/'),
			endpoint.trim_start_matches('/')
		))
	}
}

/// Named URL placeholder of an API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVariable {
	/// What the value is and where to find it.
	pub hint: String,
	/// Sample value.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub example: Option<String>,
}

/// OAuth client bundled with a formula.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
	/// Display name.
	pub name: String,
	/// OAuth client identifier.
	pub id: String,
	/// Client secret for providers that require one even for public clients.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub secret: Option<String>,
	/// Where the client credentials come from.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	/// Methods this client is registered for.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub methods: Option<Vec<MethodName>>,
	/// Fixed redirect URI registered for the client.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub redirect_uri: Option<String>,
}
impl Client {
	/// Returns true when the client is registered for `method`.
	pub fn supports(&self, method: &str) -> bool {
		self.methods.as_ref().is_some_and(|methods| methods.iter().any(|name| &**name == method))
	}
}
impl Debug for Client {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client")
			.field("name", &self.name)
			.field("id", &self.id)
			.field("secret_set", &self.secret.is_some())
			.field("source", &self.source)
			.field("methods", &self.methods)
			.field("redirect_uri", &self.redirect_uri)
			.finish()
	}
}

/// Account disambiguation hint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	/// Label for the identity field.
	pub label: String,
	/// Explanation shown to callers.
	pub hint: String,
}

/// Everything the device playground needs, resolved from a single formula.
#[derive(Clone, Debug, PartialEq)]
pub struct DevicePlayground {
	/// Formula the parameters came from.
	pub formula: FormulaId,
	/// Name of the API the credential will be used against.
	pub api_name: String,
	/// API record the credential will be used against.
	pub api: Api,
	/// Bundled client performing the grant.
	pub client: Client,
	/// Device authorization endpoint.
	pub device_endpoint: Url,
	/// Token endpoint polled for the access token.
	pub token_endpoint: Url,
	/// Scope requested during device authorization.
	pub scope: Option<String>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn formula(json: &str) -> Formula {
		serde_json::from_str(json).expect("Formula fixture should parse.")
	}

	const DEVICE_READY: &str = r#"{
		"id": "acme",
		"label": "Acme",
		"methods": {
			"device_code": {
				"endpoints": {
					"device": "https://acme.test/device",
					"token": "https://acme.test/token"
				},
				"scope": "read write"
			}
		},
		"apis": {
			"rest": {
				"base_url": "https://api.acme.test/",
				"auth_header": "Authorization: Bearer {token}",
				"methods": ["device_code"],
				"example_endpoint": "/me"
			}
		},
		"clients": [
			{ "name": "web", "id": "web-id", "methods": ["authorization_code"] },
			{ "name": "cli", "id": "cli-id", "secret": "s", "methods": ["device_code"] }
		]
	}"#;

	#[test]
	fn device_playground_resolves_all_three_parts() {
		let playground =
			formula(DEVICE_READY).device_playground(None).expect("Playground should resolve.");

		assert_eq!(playground.client.id, "cli-id");
		assert_eq!(playground.api_name, "rest");
		assert_eq!(playground.device_endpoint.as_str(), "https://acme.test/device");
		assert_eq!(playground.token_endpoint.as_str(), "https://acme.test/token");
		assert_eq!(playground.scope.as_deref(), Some("read write"));
		assert_eq!(playground.api.example_url().as_deref(), Some("https://api.acme.test/me"));
	}

	#[test]
	fn device_playground_requires_a_device_client() {
		let mut formula = formula(DEVICE_READY);

		formula.clients.retain(|client| client.name == "web");

		assert!(matches!(
			formula.device_playground(None),
			Err(ConfigError::PlaygroundUnavailable { reason: "no client supports device_code", .. })
		));
		assert!(!formula.supports_device_playground());
	}

	#[test]
	fn device_playground_honors_client_name() {
		let formula = formula(DEVICE_READY);

		assert!(formula.device_playground(Some("cli")).is_ok());
		assert!(formula.device_playground(Some("web")).is_err());
	}

	#[test]
	fn client_debug_hides_secret() {
		let formula = formula(DEVICE_READY);
		let rendered = format!("{:?}", formula.clients[1]);

		assert!(rendered.contains("secret_set: true"));
		assert!(!rendered.contains("\"s\""));
	}

	#[test]
	fn method_scopes_split_on_whitespace() {
		let formula = formula(DEVICE_READY);
		let method = formula.methods.get("device_code").expect("Method should exist.");

		assert_eq!(method.scopes().collect::<Vec<_>>(), ["read", "write"]);
	}

	#[test]
	fn sections_keep_declaration_order() {
		let formula = formula(
			r#"{
				"id": "acme",
				"label": "Acme",
				"methods": { "zeta": {}, "device_code": {}, "alpha": {} },
				"apis": {
					"rest": { "base_url": "https://a.test/", "auth_header": "Authorization: Bearer {token}" },
					"graphql": { "base_url": "https://b.test/", "auth_header": "Authorization: Bearer {token}" }
				}
			}"#,
		);
		let methods = formula.methods.keys().map(|name| &**name).collect::<Vec<_>>();
		let apis = formula.apis.keys().map(String::as_str).collect::<Vec<_>>();

		assert_eq!(methods, ["zeta", "device_code", "alpha"]);
		assert_eq!(apis, ["rest", "graphql"]);
		assert!(formula.methods.contains_key(MethodName::DEVICE_CODE));

		let json = serde_json::to_string(&formula.methods).expect("Methods should serialize.");

		assert!(json.find("zeta") < json.find("alpha"));
	}
}
