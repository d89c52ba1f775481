use mock_cluster::config::ClusterConfig;
use mock_cluster::metrics::MetricsService;
use mock_cluster::target::CallDescriptor;
use mock_cluster::{build_invoker, connect_store, init_tracing};
use serde_json::Value;
use std::env;
use std::process;

const USAGE: &str = "Usage: mock-cluster <config_file> <method> [json_args...]";

#[tokio::main]
async fn main() {
    // Initialize tracing
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let (config_path, method) = match (args.first(), args.get(1)) {
        (Some(config_path), Some(method)) => (config_path.clone(), method.clone()),
        _ => {
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };

    // Arguments that are not valid JSON are passed as strings
    let arguments: Vec<Value> = args[2..]
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
        .collect();

    // Load configuration
    let config = match ClusterConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        process::exit(1);
    }

    let metrics = match MetricsService::new() {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Metrics error: {}", e);
            process::exit(1);
        }
    };

    let store = connect_store(&config).await;
    let invoker = match build_invoker(&config, &config.services[0], store) {
        Ok(invoker) => invoker,
        Err(e) => {
            eprintln!("Failed to build invoker: {}", e);
            process::exit(1);
        }
    };

    let call = CallDescriptor::new(method, arguments);
    let result = invoker.invoke(&call).await;
    invoker.destroy();

    match result {
        Ok(reply) => {
            match serde_json::to_string_pretty(&reply) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Failed to encode reply: {}", e);
                    process::exit(1);
                }
            }
            eprintln!("{}", metrics.render());
        }
        Err(failure) => {
            eprintln!("Call failed: {}", failure);
            eprintln!("{}", metrics.render());
            process::exit(2);
        }
    }
}
