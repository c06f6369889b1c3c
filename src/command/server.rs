use crate::command;
use crate::configuration::{self, Configuration, ServerTlsConfig};
use argh::FromArgs;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod error;
mod http_server;
mod listeners;
mod server_context;

pub use error::Error;
use http_server::serve_request;
use listeners::insecure::InsecureListener;
use listeners::tls::TlsListener;
use server_context::ServerContext;

pub enum ServiceListener {
    Insecure(InsecureListener),
    Secure(TlsListener),
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "serve",
    description = "Run the forward-auth identity server"
)]
pub struct Options {}

pub struct Command {
    listener: ServiceListener,
    shutdown: CancellationToken,
}

impl Command {
    pub fn new(config: &Configuration) -> Result<Command, configuration::Error> {
        let shutdown = CancellationToken::new();
        let context = ServerContext::from_configuration(config, shutdown.clone())?;

        let listener = match &config.server.tls {
            None => ServiceListener::Insecure(InsecureListener::new(&config.server, context)),
            Some(tls_config) => {
                ServiceListener::Secure(TlsListener::new(&config.server, tls_config, context)?)
            }
        };

        Ok(Command { listener, shutdown })
    }

    pub fn notify_config_change(&self, config: &Configuration) -> Result<(), configuration::Error> {
        let context = ServerContext::from_configuration(config, self.shutdown.clone())?;

        match (&self.listener, &config.server.tls) {
            (ServiceListener::Insecure(listener), _) => {
                listener.notify_config_change(&config.server, context);
            }
            (ServiceListener::Secure(listener), Some(tls_config)) => {
                listener.notify_config_change(&config.server, tls_config, context)?;
            }
            (ServiceListener::Secure(_), None) => {
                info!("TLS cannot be disabled without a restart, keeping current listener");
            }
        }

        Ok(())
    }

    pub fn notify_tls_config_change(
        &self,
        tls_config: &ServerTlsConfig,
    ) -> Result<(), configuration::Error> {
        if let ServiceListener::Secure(listener) = &self.listener {
            listener.notify_tls_config_change(tls_config)?;
        }

        Ok(())
    }

    /// Serves until the listener fails or Ctrl-C is received. Shutdown cancels every
    /// resolution still in flight.
    pub async fn run(&self) -> Result<(), command::Error> {
        let serve = async {
            match &self.listener {
                ServiceListener::Insecure(listener) => listener.serve().await,
                ServiceListener::Secure(listener) => listener.serve().await,
            }
        };

        tokio::select! {
            result = serve => {
                self.shutdown.cancel();
                result?;
            }
            signal = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, cancelling in-flight resolutions");
                self.shutdown.cancel();
                signal?;
            }
        }

        Ok(())
    }
}
