use anyhow::{bail, Context};
use flow::stubs::InMemoryResourceStore;
use flow::{Action, ResourceStore, Step};
use flow_controller::{Controller, ControllerConfig};
use flow_transport::{HttpTransport, TransportRegistry};
use log::{error, info};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Recursos iniciales para el store en memoria.
#[derive(Debug, Deserialize)]
struct Seed {
    #[serde(default)]
    actions: Vec<Action>,
    #[serde(default)]
    steps: Vec<Step>,
}

/// Arranque del controlador de steps.
///
/// Lee la configuración del entorno, prepara el store y los transportes,
/// arranca el controlador y lo para con Ctrl+C o SIGTERM. Los servidores
/// HTTP/RPC de cara al cliente y el recolector de basura viven fuera de este
/// proceso.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = ControllerConfig::from_env().context("configuración")?;
    info!("echoer controller start..., {}", config.storage_uri);

    if !config.storage_uri.starts_with("memory://") {
        bail!("almacenamiento no soportado: {} (sólo memory://)", config.storage_uri);
    }
    let store = Arc::new(InMemoryResourceStore::new());
    if let Some(path) = &config.seed_file {
        load_seed(&store, &config.namespace, path)?;
    }

    let http = HttpTransport::with_timeout(config.http_timeout).context("cliente HTTP")?;
    let transports = TransportRegistry::standard(http);
    let store: Arc<dyn ResourceStore> = store;
    let controller = Arc::new(Controller::new(store, transports, &config));

    let mut runner = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run().await })
    };

    tokio::select! {
        () = wait_for_shutdown_signal() => {
            if let Err(e) = controller.stop().await {
                error!("error al parar el controlador: {}", e);
            }
            runner.await.context("tarea del controlador")??;
        }
        finished = &mut runner => {
            // snapshot inicial fallido o fin del flujo de cambios
            finished.context("tarea del controlador")??;
        }
    }
    Ok(())
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_seed(store: &InMemoryResourceStore, namespace: &str, path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("leyendo {}", path.display()))?;
    let seed: Seed = serde_json::from_str(&raw).with_context(|| format!("parseando {}", path.display()))?;
    for action in &seed.actions {
        store.put_action(namespace, action)?;
    }
    for step in &seed.steps {
        store.put_step(namespace, step)?;
    }
    info!("seed cargado: {} acciones, {} steps", seed.actions.len(), seed.steps.len());
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("no se pudo escuchar Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("no se pudo escuchar SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("SIGINT recibido"),
        () = terminate => info!("SIGTERM recibido"),
    }
}
