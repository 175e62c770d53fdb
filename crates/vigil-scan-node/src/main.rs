use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use vigil_node_core::server::NodeServer;
use vigil_node_core::socket;

mod capability;
mod scan;

use capability::ScanCapability;

#[derive(Debug, Parser)]
#[command(name = "vigil-scan-node", version)]
struct Cli {
    /// Socket path to bind (defaults to VIGIL_SCAN_SOCK or the well-known
    /// temp-directory path).
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let path = socket::resolve_socket_path(cli.socket, "scan");
    if let Err(e) = run(path).await {
        eprintln!("vigil-scan-node: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(path: PathBuf) -> std::io::Result<()> {
    let server = NodeServer::new(&path, Arc::new(ScanCapability::new()));
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
        std::env::temp_dir().join(format!("vigil-scan-test-{}.sock", uuid::Uuid::new_v4()))
    }

    fn sample_tree() -> PathBuf {
        let root = std::env::temp_dir().join(format!("vigil-scan-wire-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("inner")).unwrap();
        std::fs::write(root.join("top.rs"), b"fn top() {}\n").unwrap();
        std::fs::write(root.join("inner/leaf.rs"), b"fn leaf() {}\n").unwrap();
        root
    }

    #[tokio::test]
    async fn validate_then_execute_over_the_wire() {
        let path = temp_socket();
        let root = sample_tree();
        let server = NodeServer::new(&path, Arc::new(ScanCapability::new()));
        server.start().await.unwrap();

        let client = NodeClient::new(&path);
        let params = Value::Map(Mapping::new().with(
            "input",
            Mapping::new().with("root", root.display().to_string()),
        ));

        let resp = client
            .call("node.validate", "1", params.clone())
            .await
            .unwrap();
        assert!(resp.result.unwrap().as_map().get("valid").unwrap().as_bool());

        let resp = client.call("node.execute", "2", params).await.unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result.as_map().get("total_files").unwrap().as_int(), 2);

        server.stop().await;
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn validate_rejects_missing_root_over_the_wire() {
        let path = temp_socket();
        let server = NodeServer::new(&path, Arc::new(ScanCapability::new()));
        server.start().await.unwrap();

        let client = NodeClient::new(&path);
        let params = Value::Map(Mapping::new().with("input", Mapping::new()));
        let resp = client.call("node.validate", "3", params).await.unwrap();
        let result = resp.result.unwrap();
        assert!(!result.as_map().get("valid").unwrap().as_bool());
        assert_eq!(result.as_map().get("errors").unwrap().as_seq().len(), 1);

        server.stop().await;
    }
}
