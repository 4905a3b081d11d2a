use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Proxy protocol type, as understood by the supervised engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Vmess,
    Vless,
    #[serde(rename = "ss")]
    Shadowsocks,
    Trojan,
    Http,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Vmess => "vmess",
            ProxyProtocol::Vless => "vless",
            ProxyProtocol::Shadowsocks => "ss",
            ProxyProtocol::Trojan => "trojan",
            ProxyProtocol::Http => "http",
            ProxyProtocol::Socks5 => "socks5",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "vmess" => Some(ProxyProtocol::Vmess),
            "vless" => Some(ProxyProtocol::Vless),
            "ss" | "shadowsocks" => Some(ProxyProtocol::Shadowsocks),
            "trojan" => Some(ProxyProtocol::Trojan),
            "http" => Some(ProxyProtocol::Http),
            "socks5" => Some(ProxyProtocol::Socks5),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One candidate upstream proxy endpoint
///
/// The node set is owned by an external fetcher; inside the pool nodes are
/// referenced by `name` only. `params` carries the full engine-side proxy
/// definition and is opaque to the core beyond being handed to the
/// configuration renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyNode {
    /// Stable unique name, the registry key
    pub name: String,
    pub server: String,
    pub port: u16,
    pub protocol: ProxyProtocol,
    /// Opaque engine configuration payload (credentials, transport options...)
    #[serde(default)]
    pub params: Value,
}

impl ProxyNode {
    pub fn new(name: impl Into<String>, server: impl Into<String>, port: u16, protocol: ProxyProtocol) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            port,
            protocol,
            params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parsing_and_display() {
        assert_eq!(ProxyProtocol::from_str("VMESS"), Some(ProxyProtocol::Vmess));
        assert_eq!(
            ProxyProtocol::from_str("shadowsocks"),
            Some(ProxyProtocol::Shadowsocks)
        );
        assert_eq!(ProxyProtocol::from_str("ss"), Some(ProxyProtocol::Shadowsocks));
        assert_eq!(ProxyProtocol::from_str("unknown"), None);

        assert_eq!(ProxyProtocol::Shadowsocks.to_string(), "ss");
        assert_eq!(ProxyProtocol::Socks5.to_string(), "socks5");
    }

    #[test]
    fn test_node_construction() {
        let node = ProxyNode::new("jp-01", "proxy.example", 443, ProxyProtocol::Vmess)
            .with_params(serde_json::json!({"uuid": "abc", "tls": true}));

        assert_eq!(node.name, "jp-01");
        assert_eq!(node.port, 443);
        assert_eq!(node.params["uuid"], "abc");
    }

    #[test]
    fn test_node_serde_roundtrip_defaults_params() {
        let raw = r#"{"name":"a","server":"s.example","port":8080,"protocol":"http"}"#;
        let node: ProxyNode = serde_json::from_str(raw).unwrap();
        assert_eq!(node.protocol, ProxyProtocol::Http);
        assert!(node.params.is_null());
    }
}
