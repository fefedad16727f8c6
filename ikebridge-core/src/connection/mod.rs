//! Connection configuration model
//!
//! Canonical, validated representation of one IPsec connection definition.
//! Instances are only produced by [`translator::parse`] and are immutable
//! afterwards.

use secrecy::{ExposeSecret, Secret};

pub mod translator;

pub use translator::{parse, parse_value, to_document};

/// One tunnel definition as understood by the bridge
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Unique connection name, routing key for every later operation
    pub name: String,

    /// IKE major version (0 accepts both)
    pub version: IkeVersion,

    /// Local addresses to bind to (empty means any)
    pub local_addrs: Vec<String>,

    /// Ordered list of remote gateways; never empty
    pub remote_addrs: Vec<String>,

    /// IKE proposals, passed through to the daemon unchanged
    pub proposals: Vec<String>,

    /// Local authentication round
    pub local: AuthConfig,

    /// Remote authentication round
    pub remote: AuthConfig,

    /// Child SA definitions
    pub children: Vec<ChildConfig>,

    /// Dead peer detection interval in seconds
    pub dpd_delay: Option<u32>,

    /// Per-connection failover ceiling, overrides the bridge default
    pub max_retries: Option<u32>,
}

impl ConnectionConfig {
    /// Whether more than one gateway is configured
    pub fn is_failover_eligible(&self) -> bool {
        self.remote_addrs.len() > 1
    }
}

/// IKE protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IkeVersion {
    Any,
    V1,
    #[default]
    V2,
}

impl IkeVersion {
    /// Numeric value as used by swanctl.conf
    pub fn as_u8(&self) -> u8 {
        match self {
            IkeVersion::Any => 0,
            IkeVersion::V1 => 1,
            IkeVersion::V2 => 2,
        }
    }
}

/// Authentication method tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Psk,
    Pubkey,
    /// EAP with the given method, e.g. `mschapv2`
    Eap(String),
}

impl AuthMethod {
    /// Tag as written in documents and swanctl.conf
    pub fn as_tag(&self) -> String {
        match self {
            AuthMethod::Psk => "psk".to_string(),
            AuthMethod::Pubkey => "pubkey".to_string(),
            AuthMethod::Eap(kind) => format!("eap-{}", kind),
        }
    }
}

/// Credential reference attached to an authentication round
///
/// Shared secrets are wrapped so they never show up in logs or debug output.
#[derive(Debug, Clone)]
pub enum Credential {
    /// No credential (allowed for the remote round)
    None,
    /// Certificate file reference, relative to the daemon's x509 directory
    Certificate(String),
    /// Shared secret for PSK or EAP
    Secret(Secret<String>),
}

impl Credential {
    /// Expose the shared secret, if any (use with caution!)
    ///
    /// Only the daemon adapter should call this, when handing the secret
    /// over to the daemon.
    pub fn expose_secret(&self) -> Option<&str> {
        match self {
            Credential::Secret(secret) => Some(secret.expose_secret()),
            _ => None,
        }
    }
}

/// One authentication round
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub method: AuthMethod,
    pub id: String,
    pub credential: Credential,
}

/// Child SA descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildConfig {
    pub name: String,
    pub local_ts: Vec<TrafficSelector>,
    pub remote_ts: Vec<TrafficSelector>,
    pub esp_proposals: Vec<String>,
    pub mode: ChildMode,
    pub start_action: StartAction,
    pub dpd_action: DpdAction,
}

/// IPsec mode of a child SA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildMode {
    #[default]
    Tunnel,
    Transport,
}

/// What the daemon does with a child once the connection is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartAction {
    #[default]
    None,
    Trap,
    Start,
}

/// What the daemon does with a child when DPD declares the peer dead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DpdAction {
    #[default]
    Clear,
    Trap,
    Restart,
}

macro_rules! keyword_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Keyword as written in documents and swanctl.conf
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            /// Parse the keyword, `None` if unknown
            pub fn from_keyword(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

keyword_enum!(ChildMode { Tunnel => "tunnel", Transport => "transport" });
keyword_enum!(StartAction { None => "none", Trap => "trap", Start => "start" });
keyword_enum!(DpdAction { Clear => "clear", Trap => "trap", Restart => "restart" });

/// A traffic selector in swanctl syntax
///
/// Kept as the validated source text; the optional `[proto/port]` suffix is
/// passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficSelector(String);

impl TrafficSelector {
    pub(crate) fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrafficSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
