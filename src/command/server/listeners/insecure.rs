use crate::command::server::error::Error;
use crate::command::server::listeners::{accept, build_listener, connection_timeouts};
use crate::command::server::serve_request;
use crate::command::server::ServerContext;
use crate::configuration::ServerConfig;
use arc_swap::ArcSwap;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Plain HTTP listener. Requests can only authenticate with bearer tokens.
pub struct InsecureListener {
    binding_address: SocketAddr,
    context: ArcSwap<ServerContext>,
    timeouts: ArcSwap<[Duration; 2]>,
}

impl InsecureListener {
    pub fn new(server_config: &ServerConfig, context: ServerContext) -> Self {
        let binding_address = SocketAddr::new(server_config.bind_address, server_config.port);

        Self {
            binding_address,
            context: ArcSwap::from_pointee(context),
            timeouts: ArcSwap::from_pointee(connection_timeouts(server_config)),
        }
    }

    pub fn notify_config_change(&self, server_config: &ServerConfig, context: ServerContext) {
        self.timeouts
            .store(Arc::new(connection_timeouts(server_config)));
        self.context.store(Arc::new(context));
    }

    pub async fn serve(&self) -> Result<(), Error> {
        info!("Listening on {} (non-TLS)", self.binding_address);
        let listener = build_listener(self.binding_address).await?;

        loop {
            debug!("Waiting for incoming connection");
            let (tcp, remote_address) = accept(&listener).await?;

            let stream = TokioIo::new(tcp);
            let context = Arc::clone(&self.context.load());
            let timeouts = Arc::clone(&self.timeouts.load());

            tokio::spawn(Box::pin(serve_request(
                stream,
                context,
                None,
                timeouts,
                remote_address,
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::server::server_context::tests::create_test_server_context;

    fn server_config(toml: &str) -> ServerConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_insecure_listener_new() {
        let config = server_config(
            r#"
            bind_address = "127.0.0.1"
            port = 8080
            query_timeout = 1800
            query_timeout_grace_period = 30
            "#,
        );

        let listener = InsecureListener::new(&config, create_test_server_context());

        assert_eq!(
            listener.binding_address,
            SocketAddr::from(([127, 0, 0, 1], 8080))
        );
        let timeouts = listener.timeouts.load();
        assert_eq!(timeouts[0], Duration::from_secs(1800));
        assert_eq!(timeouts[1], Duration::from_secs(30));
    }

    #[test]
    fn test_insecure_listener_new_with_ipv6() {
        let config = server_config(
            r#"
            bind_address = "::1"
            port = 9000
            "#,
        );

        let listener = InsecureListener::new(&config, create_test_server_context());

        assert_eq!(listener.binding_address.ip().to_string(), "::1");
        assert_eq!(listener.binding_address.port(), 9000);
    }

    #[test]
    fn test_insecure_listener_notify_config_change() {
        let config = server_config(r#"bind_address = "127.0.0.1""#);
        let listener = InsecureListener::new(&config, create_test_server_context());

        let updated = server_config(
            r#"
            bind_address = "127.0.0.1"
            query_timeout = 10
            "#,
        );
        listener.notify_config_change(&updated, create_test_server_context());

        assert_eq!(listener.timeouts.load()[0], Duration::from_secs(10));
    }
}
