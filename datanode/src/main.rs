use datanode::{serve_data_node, BlockStore, DataNodeConfig};
use log::info;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use tokio::net::TcpListener;

const DEFAULT_CONFIG_PATH: &str = "datanode.json";

fn usage() -> String {
    format!(
        "usage: datanode [--config <path>]\n\
         defaults:\n\
         --config {}",
        DEFAULT_CONFIG_PATH
    )
}

fn parse_args() -> Result<PathBuf, String> {
    let args = std::env::args().skip(1).collect::<Vec<String>>();
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Err(usage()),
            "--config" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --config".to_string())?;
                config_path = PathBuf::from(value);
            }
            other => {
                return Err(format!("unknown argument: {}\n{}", other, usage()));
            }
        }
        i += 1;
    }
    Ok(config_path)
}

#[tokio::main]
async fn main() {
    let config_path = match parse_args() {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{}", msg);
            exit(1);
        }
    };

    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .expect("init logger");

    let config = match DataNodeConfig::load_or_init(&config_path).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("load config failed: {}", e);
            exit(1);
        }
    };

    let store = match BlockStore::open(config.block_dir.clone()).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("open block store failed: {}", e);
            exit(1);
        }
    };

    let listener = match TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("bind {} failed: {}", config.listen_addr, e);
            exit(1);
        }
    };
    info!("datanode listening on {}", config.listen_addr);
    serve_data_node(store, listener).await;
}
