//! Assembles a ready-to-use client from configuration and a credential
//! backend.

use std::sync::Arc;

use routelink_common::auth::{
    CredentialBackend, CredentialStore, EndpointRefresher, RefreshSettings, SessionContext,
};
use routelink_common::http::{HttpTransport, Transport};
use routelink_common::{AuthenticatedClient, ClientConfig};
use tracing::info;

use crate::errors::InfraResult;
use crate::http::ReqwestTransport;

const USER_AGENT: &str = concat!("routelink/", env!("CARGO_PKG_VERSION"));

/// Build an [`AuthenticatedClient`] backed by reqwest.
///
/// Loads any persisted session from `backend`. The refresh exchange goes
/// through the same transport as regular requests. The expiry monitor is
/// not started; call
/// [`spawn_monitor`](routelink_common::RefreshCoordinator::spawn_monitor)
/// on `client.session().coordinator()` to run it.
///
/// # Errors
/// Returns [`InfraError`](crate::InfraError) if the configuration is
/// invalid, the persisted session cannot be read, or the HTTP client cannot
/// be built.
pub async fn connect(
    config: ClientConfig,
    backend: Arc<dyn CredentialBackend>,
) -> InfraResult<AuthenticatedClient> {
    config.validate()?;
    let transport = ReqwestTransport::builder().user_agent(USER_AGENT).build()?;
    connect_with_transport(config, backend, Arc::new(transport)).await
}

/// Like [`connect`] with a caller-supplied transport.
///
/// # Errors
/// See [`connect`].
pub async fn connect_with_transport(
    config: ClientConfig,
    backend: Arc<dyn CredentialBackend>,
    transport: Arc<dyn HttpTransport>,
) -> InfraResult<AuthenticatedClient> {
    config.validate()?;
    let refresh_url = config.refresh_url()?;

    let store = Arc::new(CredentialStore::open(backend).await?);
    let refresher = Arc::new(EndpointRefresher::new(
        Transport::new(Arc::clone(&transport)),
        refresh_url,
        config.timeout,
    ));
    let session = SessionContext::new(store, refresher, RefreshSettings::from(&config));

    let client = AuthenticatedClient::new(config, transport, session)?;
    info!(authenticated = client.session().store().is_authenticated(), "client connected");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use routelink_common::auth::MemoryBackend;
    use routelink_common::testing::{fixtures, ScriptedTransport};
    use routelink_common::time::SystemClock;
    use routelink_common::ConfigError;

    use super::*;
    use crate::InfraError;

    #[tokio::test]
    async fn restores_persisted_session() {
        let tokens = fixtures::session(&SystemClock, "persisted", Duration::from_secs(600));
        let backend = Arc::new(MemoryBackend::with_tokens(tokens));

        let client = connect_with_transport(
            ClientConfig::new("http://api.test"),
            backend,
            Arc::new(ScriptedTransport::new()),
        )
        .await
        .expect("client");

        assert_eq!(client.session().store().access_token().as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let result = connect(ClientConfig::new(""), Arc::new(MemoryBackend::new())).await;
        assert!(matches!(result, Err(InfraError::Config(ConfigError::Invalid(_)))));
    }
}
