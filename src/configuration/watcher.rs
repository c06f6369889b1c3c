use crate::command::server;
use crate::configuration::{resolve_path, Configuration, ServerTlsConfig};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Reloads the server when the configuration file or the TLS material it points to changes.
pub struct ConfigWatcher {
    _handle: tokio::task::JoinHandle<()>,
}

impl ConfigWatcher {
    pub fn new(
        config_path: &str,
        server: Arc<server::Command>,
    ) -> Result<Self, crate::command::Error> {
        info!("Setting up config watcher for: {}", config_path);

        let config_file_path = std::fs::canonicalize(PathBuf::from(config_path))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = watch_config_loop(config_file_path, server).await {
                error!("Config watcher failed: {}", e);
            }
        });

        Ok(Self { _handle: handle })
    }
}

fn get_tls_paths(tls_config: &ServerTlsConfig, config_dir: &Path) -> Vec<PathBuf> {
    [
        Some(&tls_config.server_certificate_bundle),
        Some(&tls_config.server_private_key),
        tls_config.client_ca_bundle.as_ref(),
    ]
    .into_iter()
    .flatten()
    .filter_map(|path| resolve_path(config_dir, path).canonicalize().ok())
    .collect()
}

fn watched_paths(config: &Configuration, config_dir: &Path) -> HashSet<PathBuf> {
    config
        .server
        .tls
        .as_ref()
        .map(|tls_config| get_tls_paths(tls_config, config_dir))
        .unwrap_or_default()
        .into_iter()
        .collect()
}

async fn watch_config_loop(
    config_path: PathBuf,
    server: Arc<server::Command>,
) -> Result<(), crate::command::Error> {
    use notify::event::ModifyKind;
    use tokio::sync::mpsc;

    let (tx, mut rx) = mpsc::channel::<Event>(100);
    let config_dir = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();

    loop {
        let tx_clone = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx_clone.blocking_send(event);
            }
        })?;

        watcher.watch(&config_path, RecursiveMode::NonRecursive)?;

        let current_config = Configuration::load(&config_path)?;
        let watched_tls_paths = watched_paths(&current_config, &config_dir);
        for path in &watched_tls_paths {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
            info!("Watching TLS file: {:?}", path);
        }

        let mut should_restart_watcher = false;

        while !should_restart_watcher {
            match rx.recv().await {
                Some(event)
                    if matches!(
                        event.kind,
                        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
                    ) =>
                {
                    if event.paths.iter().any(|p| p == &config_path) {
                        info!("Configuration file changed, reloading");

                        let Ok(new_config) = Configuration::load(&config_path) else {
                            error!("Failed to reload configuration");
                            continue;
                        };

                        if watched_paths(&new_config, &config_dir) != watched_tls_paths {
                            info!("TLS file paths changed, recreating watchers");
                            should_restart_watcher = true;
                        }

                        reload_full_config(&server, &new_config);
                    } else if event.paths.iter().any(|p| watched_tls_paths.contains(p)) {
                        info!("TLS certificate changed, reloading");
                        reload_tls_only(&server, &config_path);
                    }
                }
                None => {
                    error!("Config watcher channel closed");
                    return Ok(());
                }
                _ => {}
            }
        }

        drop(watcher);
    }
}

fn reload_full_config(server: &Arc<server::Command>, config: &Configuration) {
    if let Err(e) = server.notify_config_change(config) {
        error!("Failed to notify server of configuration change: {e}");
    } else {
        info!("Configuration reloaded");
    }
}

fn reload_tls_only(server: &Arc<server::Command>, config_path: &Path) {
    let Ok(config) = Configuration::load(config_path) else {
        return;
    };

    if let Some(tls_config) = &config.server.tls {
        match server.notify_tls_config_change(tls_config) {
            Ok(()) => info!("TLS configuration reloaded"),
            Err(e) => error!("Failed to reload TLS configuration: {e}"),
        }
    }
}
