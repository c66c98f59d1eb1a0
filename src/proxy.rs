use reqwest::blocking::ClientBuilder;
use reqwest::Proxy;

use crate::config::ProxyConfig;

/// Transport-level proxy setting resolved from the user's proxy config.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransportProxy {
    #[default]
    Direct,
    Http { host: String, port: u16 },
    Socks { host: String, port: u16 },
}

/// Pure resolution of the configured proxy. A disabled proxy or an empty
/// host means a direct connection; an unrecognized kind falls back to HTTP.
/// Invalid host/port values are not validated here, they surface when the
/// transport is built.
pub fn resolve(config: &ProxyConfig) -> TransportProxy {
    if !config.enabled || config.host.is_empty() {
        return TransportProxy::Direct;
    }

    let host = config.host.clone();
    let port = config.port;
    if config.kind.eq_ignore_ascii_case("socks") {
        TransportProxy::Socks { host, port }
    } else {
        TransportProxy::Http { host, port }
    }
}

impl TransportProxy {
    pub fn url(&self) -> Option<String> {
        match self {
            TransportProxy::Direct => None,
            TransportProxy::Http { host, port } => Some(format!("http://{}:{}", host, port)),
            TransportProxy::Socks { host, port } => Some(format!("socks5://{}:{}", host, port)),
        }
    }

    pub fn apply(&self, builder: ClientBuilder) -> reqwest::Result<ClientBuilder> {
        match self.url() {
            Some(url) => Ok(builder.proxy(Proxy::all(url)?)),
            None => Ok(builder.no_proxy()),
        }
    }
}
