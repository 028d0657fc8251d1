//! Axum routes exposing the relay over HTTP.

// crates.io
use axum::{
	Form, Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::post,
};
use tokio::net::TcpListener;
// self
use crate::{
	_prelude::*,
	http::HttpTransport,
	relay::{RelayGateway, RelayKind},
};

type SharedGateway<T> = Arc<RelayGateway<T>>;

/// Builds a router serving `POST /device-code-relay` and `POST /token-relay`.
pub fn router<T>(gateway: SharedGateway<T>) -> Router
where
	T: ?Sized + HttpTransport,
{
	Router::new()
		.route(RelayKind::DeviceCode.path(), post(device_code_handler::<T>))
		.route(RelayKind::Token.path(), post(token_handler::<T>))
		.with_state(gateway)
}

/// Serves the relay routes on `listener` until the server stops.
pub async fn serve<T>(listener: TcpListener, gateway: SharedGateway<T>) -> std::io::Result<()>
where
	T: ?Sized + HttpTransport,
{
	axum::serve(listener, router(gateway)).await
}

async fn device_code_handler<T>(
	State(gateway): State<SharedGateway<T>>,
	Form(form): Form<Vec<(String, String)>>,
) -> Response
where
	T: ?Sized + HttpTransport,
{
	respond(&gateway, RelayKind::DeviceCode, form).await
}

async fn token_handler<T>(
	State(gateway): State<SharedGateway<T>>,
	Form(form): Form<Vec<(String, String)>>,
) -> Response
where
	T: ?Sized + HttpTransport,
{
	respond(&gateway, RelayKind::Token, form).await
}

async fn respond<T>(
	gateway: &RelayGateway<T>,
	kind: RelayKind,
	form: Vec<(String, String)>,
) -> Response
where
	T: ?Sized + HttpTransport,
{
	match gateway.relay(kind, form).await {
		Ok(json) => (StatusCode::OK, Json(json)).into_response(),
		Err(e) => {
			let status =
				StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);

			(status, Json(e.to_json())).into_response()
		},
	}
}
