use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use vigil_node_core::server::NodeServer;
use vigil_node_core::socket;

mod capability;
mod eval;

use capability::LogicCapability;

#[derive(Debug, Parser)]
#[command(name = "vigil-logic-node", version)]
struct Cli {
    /// Socket path to bind (defaults to VIGIL_LOGIC_SOCK or the well-known
    /// temp-directory path).
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let path = socket::resolve_socket_path(cli.socket, "logic");
    if let Err(e) = run(path).await {
        eprintln!("vigil-logic-node: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(path: PathBuf) -> std::io::Result<()> {
    let server = NodeServer::new(&path, Arc::new(LogicCapability::new()));
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
    use vigil_node_core::proto;
    use vigil_node_core::value::{Mapping, Value};

    fn temp_socket() -> PathBuf {
        std::env::temp_dir().join(format!("vigil-logic-test-{}.sock", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn info_reports_the_logic_identity() {
        let path = temp_socket();
        let server = NodeServer::new(&path, Arc::new(LogicCapability::new()));
        server.start().await.unwrap();

        let client = NodeClient::new(&path);
        let resp = client.call("node.info", "1", Value::Null).await.unwrap();
        assert_eq!(resp.id, "1");
        assert_eq!(
            resp.result.unwrap().as_map().get("node_id").unwrap().as_str(),
            "vigil.logic"
        );

        server.stop().await;
    }

    #[tokio::test]
    async fn trivial_expression_evaluates_over_the_wire() {
        let path = temp_socket();
        let server = NodeServer::new(&path, Arc::new(LogicCapability::new()));
        server.start().await.unwrap();

        let client = NodeClient::new(&path);
        let params = Value::Map(
            Mapping::new().with("input", Mapping::new().with("expression", "1 == 1")),
        );
        let resp = client.call("node.execute", "2", params).await.unwrap();
        assert_eq!(resp.id, "2");
        assert_eq!(resp.result.unwrap(), Value::Bool(true));

        server.stop().await;
    }

    #[tokio::test]
    async fn unknown_method_over_the_wire() {
        let path = temp_socket();
        let server = NodeServer::new(&path, Arc::new(LogicCapability::new()));
        server.start().await.unwrap();

        let client = NodeClient::new(&path);
        let resp = client
            .call("does.not.exist", "3", Value::Null)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, proto::METHOD_NOT_FOUND);

        server.stop().await;
    }

    #[tokio::test]
    async fn evaluation_fault_rides_in_the_result() {
        let path = temp_socket();
        let server = NodeServer::new(&path, Arc::new(LogicCapability::new()));
        server.start().await.unwrap();

        let client = NodeClient::new(&path);
        let params = Value::Map(
            Mapping::new().with("input", Mapping::new().with("expression", "1 / 0")),
        );
        let resp = client.call("node.execute", "4", params).await.unwrap();
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(
            result.as_map().get("error").unwrap().as_str(),
            "division by zero"
        );

        server.stop().await;
    }
}
