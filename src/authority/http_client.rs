use crate::authority::Error;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default)]
pub struct HttpClientConfig {
    pub server_ca_bundle: Option<String>,
    pub client_certificate: Option<String>,
    pub client_private_key: Option<String>,
    pub timeout: Option<Duration>,
}

/// HTTPS-capable client used to reach the review authority.
///
/// Redirects are never followed: review endpoints answer directly.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Option<Duration>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, Error> {
        let tls_config = build_tls_config(
            config.server_ca_bundle,
            config.client_certificate,
            config.client_private_key,
        )?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .build();

        Ok(Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            timeout: config.timeout,
        })
    }

    /// Sends the request and buffers the whole response body.
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<(StatusCode, Bytes), Error> {
        let exchange = async {
            let response = self.client.request(request).await?;
            let status = response.status();
            let body = response.into_body().collect().await?.to_bytes();
            Ok::<_, Error>((status, body))
        };

        match self.timeout {
            Some(duration) => timeout(duration, exchange).await.map_err(|_| {
                debug!("Authority request timed out after {duration:?}");
                Error::Timeout
            })?,
            None => exchange.await,
        }
    }
}

fn build_tls_config(
    server_ca_bundle: Option<String>,
    client_certificate: Option<String>,
    client_private_key: Option<String>,
) -> Result<rustls::ClientConfig, Error> {
    let mut root_store = RootCertStore::empty();
    let certs = if let Some(server_ca_bundle) = server_ca_bundle {
        CertificateDer::pem_file_iter(server_ca_bundle)?.collect::<Result<Vec<_>, _>>()?
    } else {
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!("Unable to load a platform certificate: {error}");
        }
        native.certs
    };
    root_store.add_parsable_certificates(certs);

    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::aws_lc_rs::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(root_store);

    let tls_config = match (client_certificate, client_private_key) {
        (Some(client_certificate), Some(client_private_key)) => {
            let certs = CertificateDer::pem_file_iter(client_certificate)?
                .collect::<Result<Vec<_>, _>>()?;
            let key = PrivateKeyDer::from_pem_file(client_private_key)?;
            builder.with_client_auth_cert(certs, key)?
        }
        (None, Some(_)) | (Some(_), None) => {
            return Err(Error::Configuration(
                "Client certificate and private key must be both provided".to_string(),
            ));
        }
        (None, None) => builder.with_no_client_auth(),
    };

    Ok(tls_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_certificate_requires_key() {
        let config = HttpClientConfig {
            client_certificate: Some("/client.pem".to_string()),
            ..HttpClientConfig::default()
        };

        let result = HttpClient::new(config);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_missing_ca_bundle_is_an_error() {
        let config = HttpClientConfig {
            server_ca_bundle: Some("/does/not/exist.pem".to_string()),
            ..HttpClientConfig::default()
        };

        assert!(HttpClient::new(config).is_err());
    }
}
