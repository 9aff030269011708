use log::info;
use namenode::{serve_name_node, NameNodeConfig, NameNodeEngine};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use tokio::net::TcpListener;

const DEFAULT_CONFIG_PATH: &str = "namenode.json";

fn usage() -> String {
    format!(
        "usage: namenode [--config <path>]\n\
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

    let config = match NameNodeConfig::load_or_init(&config_path).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("load config failed: {}", e);
            exit(1);
        }
    };

    let engine = match NameNodeEngine::from_config(&config).await {
        Ok(e) => Arc::new(e),
        Err(e) => {
            eprintln!("start engine failed: {}", e);
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
    info!("namenode listening on {}", config.listen_addr);
    serve_name_node(engine, listener).await;
}
