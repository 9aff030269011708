use log::error;
use sdfs_client::SdfsClient;
use sdfs_lib::{EntryKind, SdfsResult};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::process::exit;

const COPY_BUF_SIZE: usize = 64 * 1024;

enum Command {
    Get { remote: String, local: PathBuf },
    Put { local: PathBuf, remote: String },
    Mkdir { remote: String },
    List { remote: String },
    Delete { remote: String },
}

fn usage() -> String {
    "usage: sdfs <command> ...\n\
     commands:\n\
     get <remote-uri> <local-path>\n\
     put <local-path> <remote-uri>\n\
     mkdir <remote-uri>\n\
     list <remote-uri>\n\
     delete <remote-uri>\n\
     remote uris look like sdfs://host[:port]/path"
        .to_string()
}

fn parse_args() -> Result<Command, String> {
    let args = std::env::args().skip(1).collect::<Vec<String>>();
    let arg = |i: usize| -> Result<String, String> {
        args.get(i).cloned().ok_or_else(usage)
    };
    match args.first().map(String::as_str) {
        Some("get") => Ok(Command::Get {
            remote: arg(1)?,
            local: PathBuf::from(arg(2)?),
        }),
        Some("put") => Ok(Command::Put {
            local: PathBuf::from(arg(1)?),
            remote: arg(2)?,
        }),
        Some("mkdir") => Ok(Command::Mkdir { remote: arg(1)? }),
        Some("list") => Ok(Command::List { remote: arg(1)? }),
        Some("delete") => Ok(Command::Delete { remote: arg(1)? }),
        _ => Err(usage()),
    }
}

async fn run(command: Command) -> SdfsResult<()> {
    let client = SdfsClient::new();
    match command {
        Command::Get { remote, local } => {
            let mut channel = client.open_readonly(&remote).await?;
            let mut out = Vec::with_capacity(channel.size()? as usize);
            let mut buf = vec![0u8; COPY_BUF_SIZE];
            loop {
                let n = channel.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            channel.close().await?;
            tokio::fs::write(&local, &out).await?;
        }
        Command::Put { local, remote } => {
            let data = tokio::fs::read(&local).await?;
            let mut channel = client.create(&remote).await?;
            let mut written = 0usize;
            while written < data.len() {
                let end = (written + COPY_BUF_SIZE).min(data.len());
                written += channel.write(&data[written..end]).await?;
            }
            channel.close().await?;
        }
        Command::Mkdir { remote } => {
            client.mkdir(&remote).await?;
        }
        Command::List { remote } => {
            for entry in client.list(&remote).await? {
                let kind = match entry.kind {
                    EntryKind::Dir => "Dir ",
                    EntryKind::File => "File",
                };
                println!("{}  {}", kind, entry.name);
            }
        }
        Command::Delete { remote } => {
            client.delete(&remote).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let command = match parse_args() {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{}", msg);
            exit(1);
        }
    };

    TermLogger::init(
        LevelFilter::Warn,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .expect("init logger");

    if let Err(e) = run(command).await {
        error!("{}", e);
        eprintln!("sdfs: {}", e);
        exit(1);
    }
}
