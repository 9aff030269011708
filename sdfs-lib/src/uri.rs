use crate::{SdfsError, SdfsResult, NAME_NODE_PORT};

/// A parsed `sdfs://host[:port]/path` URI. Parsing happens client-side,
/// before any RPC is attempted; the namenode only ever sees the path part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdfsUri {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl SdfsUri {
    pub fn parse(uri: &str) -> SdfsResult<Self> {
        let rest = uri
            .strip_prefix("sdfs://")
            .or_else(|| uri.strip_prefix("SDFS://"))
            .ok_or_else(|| {
                SdfsError::InvalidArgument(format!("not an sdfs uri: {}", uri))
            })?;
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => {
                return Err(SdfsError::InvalidArgument(format!(
                    "missing path in uri: {}",
                    uri
                )))
            }
        };
        if authority.is_empty() {
            return Err(SdfsError::InvalidArgument(format!(
                "missing host in uri: {}",
                uri
            )));
        }
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str.parse::<u16>().map_err(|_| {
                    SdfsError::InvalidArgument(format!("bad port in uri: {}", uri))
                })?;
                (host.to_string(), port)
            }
            None => (authority.to_string(), NAME_NODE_PORT),
        };
        if host.is_empty() {
            return Err(SdfsError::InvalidArgument(format!(
                "missing host in uri: {}",
                uri
            )));
        }
        Ok(Self {
            host,
            port,
            path: path.to_string(),
        })
    }
}

/// Split a remote path into its directory-entry components. The root is the
/// empty component list; empty components ("a//b") are rejected.
pub fn path_components(path: &str) -> SdfsResult<Vec<String>> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut components = Vec::new();
    for part in trimmed.split('/') {
        if part.is_empty() {
            return Err(SdfsError::InvalidArgument(format!(
                "empty component in path: {}",
                path
            )));
        }
        components.push(part.to_string());
    }
    Ok(components)
}
