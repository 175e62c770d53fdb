use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use vigil_node_core::server::NodeServer;
use vigil_node_core::socket;

mod analyze;
mod capability;

use capability::SourceCapability;

#[derive(Debug, Parser)]
#[command(name = "vigil-source-node", version)]
struct Cli {
    /// Socket path to bind (defaults to VIGIL_SOURCE_SOCK or the well-known
    /// temp-directory path).
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let path = socket::resolve_socket_path(cli.socket, "source");
    if let Err(e) = run(path).await {
        eprintln!("vigil-source-node: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(path: PathBuf) -> std::io::Result<()> {
    let server = NodeServer::new(&path, Arc::new(SourceCapability::new()));
    server.start().await?;
    println!("started on {}", path.display());

    let control = server.control();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("shutdown requested (ctrl-c)"),
            _ = sigterm.recv() => info!("shutdown requested (sigterm)"),
        }
        control.signal_stop();
    });

    server.join().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_node_core::client::NodeClient;
    use vigil_node_core::value::{Mapping, Value};

    fn temp_socket() -> PathBuf {
        std::env::temp_dir().join(format!("vigil-source-test-{}.sock", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn analyzes_source_over_the_wire() {
        let path = temp_socket();
        let server = NodeServer::new(&path, Arc::new(SourceCapability::new()));
        server.start().await.unwrap();

        let client = NodeClient::new(&path);
        let params = Value::Map(Mapping::new().with(
            "input",
            Mapping::new().with("source", "#include <vector>\nint main() {\n    return 0;\n}\n"),
        ));

        let resp = client.call("node.execute", "1", params).await.unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result.as_map().get("function_count").unwrap().as_int(), 1);
        assert_eq!(result.as_map().get("lines").unwrap().as_int(), 4);

        let info = client.call("node.info", "2", Value::Null).await.unwrap();
        assert_eq!(
            info.result.unwrap().as_map().get("node_id").unwrap().as_str(),
            "vigil.source"
        );

        server.stop().await;
    }
}
