// self
use schlussel_playground::{
	catalog::FormulaCatalog,
	error::{ConfigError, Error},
	flows::DeviceFlowParams,
	relay::TARGET_URL_FIELD,
};

fn builtin() -> FormulaCatalog {
	FormulaCatalog::builtin().expect("Bundled catalog should parse.")
}

#[test]
fn builtin_catalog_lists_formulas_in_declaration_order() {
	let catalog = builtin();
	let ids = catalog.list().into_iter().map(|summary| summary.id.to_string()).collect::<Vec<_>>();

	assert_eq!(ids, ["github", "gitlab", "linear"]);
	assert_eq!(catalog.len(), 3);
	assert_eq!(catalog.get("gitlab").map(|formula| formula.label.as_str()), Some("GitLab"));
	assert!(catalog.get("bitbucket").is_none());
}

#[test]
fn search_matches_method_names_and_an_empty_query_matches_everything() {
	let catalog = builtin();
	let ids = |query: &str| {
		catalog.search(query).into_iter().map(|formula| formula.id.to_string()).collect::<Vec<_>>()
	};

	assert_eq!(ids("DEVICE_CODE"), ["github", "gitlab"]);
	assert_eq!(ids("git"), ["github", "gitlab"]);
	assert_eq!(ids(""), ["github", "gitlab", "linear"]);
	assert!(ids("zzz").is_empty());
}

#[test]
fn device_playground_resolves_endpoints_and_client() {
	let catalog = builtin();
	let github = catalog.get("github").expect("GitHub formula should be bundled.");
	let playground =
		github.device_playground(None).expect("GitHub formula should support the playground.");

	assert_eq!(playground.device_endpoint.as_str(), "https://github.com/login/device/code");
	assert_eq!(playground.token_endpoint.as_str(), "https://github.com/login/oauth/access_token");
	assert_eq!(playground.client.name, "gh-cli");
	assert_eq!(playground.api.example_url().as_deref(), Some("https://api.github.com/user"));

	let params = DeviceFlowParams::from(&playground);
	let form = params.device_form();

	assert_eq!(form[0], (TARGET_URL_FIELD.to_owned(), playground.device_endpoint.to_string()));
	assert!(form.contains(&("scope".to_owned(), "repo read:org gist".to_owned())));
}

#[test]
fn formulas_without_device_support_explain_why() {
	let catalog = builtin();

	for id in ["gitlab", "linear"] {
		let formula = catalog.get(id).expect("Formula should be bundled.");
		let err = formula.device_playground(None).expect_err("Playground should be unavailable.");

		assert!(matches!(err, ConfigError::PlaygroundUnavailable { .. }));
		assert!(!formula.supports_device_playground());
		assert!(Error::from(err).to_string().contains(id));
	}
}
