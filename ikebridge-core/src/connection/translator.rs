//! JSON document to `ConnectionConfig` translation
//!
//! Parses a connection document field by field and reports the first
//! validation failure together with the path of the offending field.
//! Identity and credential fields are never defaulted.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;
use secrecy::Secret;
use serde_json::{json, Map, Value};

use crate::connection::{
    AuthConfig, AuthMethod, ChildConfig, ChildMode, ConnectionConfig, Credential, DpdAction,
    IkeVersion, StartAction, TrafficSelector,
};
use crate::error::ValidationError;

/// Proposal keyword standing for the daemon's default algorithm set
const DEFAULT_PROPOSAL: &str = "default";

/// Selector keyword for the address negotiated at runtime
const DYNAMIC_SELECTOR: &str = "dynamic";

/// Parse raw JSON bytes into a validated connection configuration
pub fn parse(json: &[u8]) -> Result<ConnectionConfig, ValidationError> {
    let value: Value = serde_json::from_slice(json).map_err(|e| ValidationError::NotAnObject {
        reason: e.to_string(),
    })?;
    parse_value(&value)
}

/// Parse an already decoded JSON value into a validated connection configuration
///
/// Unknown fields (including the `command` discriminator of a request) are
/// ignored.
pub fn parse_value(value: &Value) -> Result<ConnectionConfig, ValidationError> {
    let doc = Section::root(value)?;

    let name = doc.required_str("name")?;
    validate_name(&name, &doc.path("name"))?;

    let version = match doc.optional_u32("version")? {
        None => IkeVersion::default(),
        Some(0) => IkeVersion::Any,
        Some(1) => IkeVersion::V1,
        Some(2) => IkeVersion::V2,
        Some(other) => {
            return Err(ValidationError::InvalidValue {
                path: doc.path("version"),
                message: format!("IKE version must be 0, 1 or 2, got {}", other),
            })
        }
    };

    let local_addrs = match doc.optional_str_list("local_addrs")? {
        Some(addrs) => {
            for (i, addr) in addrs.iter().enumerate() {
                if addr != "%any" && !is_valid_address(addr) {
                    return Err(ValidationError::InvalidAddress {
                        path: format!("{}[{}]", doc.path("local_addrs"), i),
                        value: addr.clone(),
                    });
                }
            }
            addrs
        }
        None => Vec::new(),
    };

    let remote_addrs = doc.required_str_list("remote_addrs")?;
    for (i, addr) in remote_addrs.iter().enumerate() {
        if !is_valid_address(addr) {
            return Err(ValidationError::InvalidAddress {
                path: format!("{}[{}]", doc.path("remote_addrs"), i),
                value: addr.clone(),
            });
        }
    }

    let proposals = doc
        .optional_str_list("proposals")?
        .unwrap_or_else(|| vec![DEFAULT_PROPOSAL.to_string()]);
    validate_proposals(&proposals, &doc.path("proposals"))?;

    let local = parse_auth(&doc.section("local")?, true)?;
    let remote = parse_auth(&doc.section("remote")?, false)?;

    let mut children = Vec::new();
    let mut child_names = HashSet::new();
    for (i, child) in doc.optional_array("children")?.iter().enumerate() {
        let section = Section::nested(child, format!("{}[{}]", doc.path("children"), i))?;
        let child = parse_child(&section)?;
        if !child_names.insert(child.name.clone()) {
            return Err(ValidationError::InvalidValue {
                path: section.path("name"),
                message: format!("duplicate child name '{}'", child.name),
            });
        }
        children.push(child);
    }

    let dpd_delay = doc.optional_u32("dpd_delay")?;

    let max_retries = doc.optional_u32("max_retries")?;
    if max_retries == Some(0) {
        return Err(ValidationError::InvalidValue {
            path: doc.path("max_retries"),
            message: "max_retries must be at least 1".to_string(),
        });
    }

    Ok(ConnectionConfig {
        name,
        version,
        local_addrs,
        remote_addrs,
        proposals,
        local,
        remote,
        children,
        dpd_delay,
        max_retries,
    })
}

/// Render a configuration back into the document form accepted by [`parse`]
///
/// The shared secret is included, so the result must be treated as
/// sensitive.
pub fn to_document(config: &ConnectionConfig) -> Value {
    let children: Vec<Value> = config.children.iter().map(child_document).collect();
    let mut doc = json!({
        "name": config.name,
        "version": config.version.as_u8(),
        "remote_addrs": config.remote_addrs,
        "proposals": config.proposals,
        "local": auth_document(&config.local),
        "remote": auth_document(&config.remote),
        "children": children,
    });

    if let Some(map) = doc.as_object_mut() {
        if !config.local_addrs.is_empty() {
            map.insert("local_addrs".to_string(), json!(config.local_addrs));
        }
        if let Some(delay) = config.dpd_delay {
            map.insert("dpd_delay".to_string(), json!(delay));
        }
        if let Some(retries) = config.max_retries {
            map.insert("max_retries".to_string(), json!(retries));
        }
    }

    doc
}

fn auth_document(auth: &AuthConfig) -> Value {
    let mut map = Map::new();
    map.insert("auth".to_string(), json!(auth.method.as_tag()));
    map.insert("id".to_string(), json!(auth.id));
    match &auth.credential {
        Credential::None => {}
        Credential::Certificate(cert) => {
            map.insert("certs".to_string(), json!(cert));
        }
        Credential::Secret(_) => {
            map.insert(
                "secret".to_string(),
                json!(auth.credential.expose_secret().unwrap_or_default()),
            );
        }
    }
    Value::Object(map)
}

fn child_document(child: &ChildConfig) -> Value {
    let selectors =
        |ts: &[TrafficSelector]| ts.iter().map(|t| t.to_string()).collect::<Vec<String>>();
    json!({
        "name": child.name,
        "local_ts": selectors(&child.local_ts),
        "remote_ts": selectors(&child.remote_ts),
        "esp_proposals": child.esp_proposals,
        "mode": child.mode.as_str(),
        "start_action": child.start_action.as_str(),
        "dpd_action": child.dpd_action.as_str(),
    })
}

fn parse_auth(section: &Section<'_>, local: bool) -> Result<AuthConfig, ValidationError> {
    let tag = section.required_str("auth")?;
    let method = match tag.as_str() {
        "psk" => AuthMethod::Psk,
        "pubkey" => AuthMethod::Pubkey,
        eap if eap.len() > 4 && eap.starts_with("eap-") && is_keyword(&eap[4..]) => {
            AuthMethod::Eap(eap[4..].to_string())
        }
        other => {
            return Err(ValidationError::InvalidValue {
                path: section.path("auth"),
                message: format!("unsupported authentication method '{}'", other),
            })
        }
    };

    let id = section.required_str("id")?;
    validate_text(&id, &section.path("id"))?;

    let credential = match method {
        AuthMethod::Pubkey => {
            let cert = if local {
                Some(section.required_str("certs")?)
            } else {
                section.optional_str("certs")?
            };
            if let Some(cert) = &cert {
                validate_text(cert, &section.path("certs"))?;
            }
            cert.map(Credential::Certificate).unwrap_or(Credential::None)
        }
        AuthMethod::Psk | AuthMethod::Eap(_) => {
            let secret = if local {
                Some(section.required_str("secret")?)
            } else {
                section.optional_str("secret")?
            };
            secret
                .map(|s| Credential::Secret(Secret::new(s)))
                .unwrap_or(Credential::None)
        }
    };

    Ok(AuthConfig {
        method,
        id,
        credential,
    })
}

fn parse_child(section: &Section<'_>) -> Result<ChildConfig, ValidationError> {
    let name = section.required_str("name")?;
    validate_name(&name, &section.path("name"))?;

    let local_ts = parse_selectors(section, "local_ts")?;
    let remote_ts = parse_selectors(section, "remote_ts")?;

    let esp_proposals = section
        .optional_str_list("esp_proposals")?
        .unwrap_or_else(|| vec![DEFAULT_PROPOSAL.to_string()]);
    validate_proposals(&esp_proposals, &section.path("esp_proposals"))?;

    let mode = section.optional_keyword("mode", ChildMode::from_keyword)?;
    let start_action = section.optional_keyword("start_action", StartAction::from_keyword)?;
    let dpd_action = section.optional_keyword("dpd_action", DpdAction::from_keyword)?;

    Ok(ChildConfig {
        name,
        local_ts,
        remote_ts,
        esp_proposals,
        mode: mode.unwrap_or_default(),
        start_action: start_action.unwrap_or_default(),
        dpd_action: dpd_action.unwrap_or_default(),
    })
}

fn parse_selectors(
    section: &Section<'_>,
    key: &str,
) -> Result<Vec<TrafficSelector>, ValidationError> {
    let raw = section
        .optional_str_list(key)?
        .unwrap_or_else(|| vec![DYNAMIC_SELECTOR.to_string()]);

    raw.into_iter()
        .enumerate()
        .map(|(i, ts)| {
            if is_valid_selector(&ts) {
                Ok(TrafficSelector::new(ts))
            } else {
                Err(ValidationError::InvalidSelector {
                    path: format!("{}[{}]", section.path(key), i),
                    value: ts,
                })
            }
        })
        .collect()
}

/// Connection and child names become file names and swanctl.conf section
/// names: letters, digits, `.`, `-` and `_`, not starting with `.`
pub(crate) fn validate_name(name: &str, path: &str) -> Result<(), ValidationError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
    if name.is_empty() {
        return Err(ValidationError::Empty {
            path: path.to_string(),
        });
    }
    if name.starts_with('.') || !name.chars().all(allowed) {
        return Err(ValidationError::InvalidValue {
            path: path.to_string(),
            message: format!(
                "'{}' may only contain letters, digits, '.', '-' and '_' and must not start with '.'",
                name.escape_debug()
            ),
        });
    }
    Ok(())
}

/// Identities and certificate references are written as quoted swanctl.conf
/// values, so quotes, backslashes, braces and control characters are refused
fn validate_text(value: &str, path: &str) -> Result<(), ValidationError> {
    match value
        .chars()
        .find(|c| c.is_control() || matches!(c, '"' | '\\' | '{' | '}'))
    {
        Some(c) => Err(ValidationError::InvalidValue {
            path: path.to_string(),
            message: format!("character '{}' is not allowed", c.escape_debug()),
        }),
        None => Ok(()),
    }
}

/// Algorithm keywords such as `aes256gcm16-prfsha384-ecp384`
fn is_keyword(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '!' | '+'))
}

fn validate_proposals(proposals: &[String], path: &str) -> Result<(), ValidationError> {
    for (i, proposal) in proposals.iter().enumerate() {
        if !is_keyword(proposal) {
            return Err(ValidationError::InvalidValue {
                path: format!("{}[{}]", path, i),
                message: format!("'{}' is not a proposal keyword", proposal.escape_debug()),
            });
        }
    }
    Ok(())
}

fn hostname_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)*\.?$")
            .expect("Failed to compile hostname pattern")
    })
}

/// Gateway address check: IP literal or RFC 1123 hostname
pub(crate) fn is_valid_address(value: &str) -> bool {
    if value.parse::<IpAddr>().is_ok() {
        return true;
    }
    // Dotted digits that failed to parse are a broken IP, not a hostname
    if value.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return false;
    }
    value.len() <= 253 && hostname_pattern().is_match(value)
}

/// Traffic selector check: `dynamic`, IP, CIDR or `a-b` range, with an
/// optional `[proto/port]` suffix
pub(crate) fn is_valid_selector(value: &str) -> bool {
    let base = match value.find('[') {
        Some(open) => {
            let suffix = &value[open..];
            if suffix.len() < 3 || !suffix.ends_with(']') {
                return false;
            }
            let inner = &suffix[1..suffix.len() - 1];
            if !inner
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '%' | '-' | '_' | '.'))
            {
                return false;
            }
            &value[..open]
        }
        None => value,
    };

    if base == DYNAMIC_SELECTOR {
        return true;
    }
    if base.parse::<IpAddr>().is_ok() {
        return true;
    }
    if let Some((addr, prefix)) = base.split_once('/') {
        let max_prefix = match addr.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => 32,
            Ok(IpAddr::V6(_)) => 128,
            Err(_) => return false,
        };
        return prefix.parse::<u8>().map(|p| p <= max_prefix).unwrap_or(false);
    }
    if let Some((from, to)) = base.split_once('-') {
        return matches!(
            (from.parse::<IpAddr>(), to.parse::<IpAddr>()),
            (Ok(IpAddr::V4(_)), Ok(IpAddr::V4(_))) | (Ok(IpAddr::V6(_)), Ok(IpAddr::V6(_)))
        );
    }
    false
}

/// A JSON object together with its path inside the document
struct Section<'a> {
    map: &'a Map<String, Value>,
    prefix: String,
}

impl<'a> Section<'a> {
    fn root(value: &'a Value) -> Result<Self, ValidationError> {
        let map = value.as_object().ok_or_else(|| ValidationError::NotAnObject {
            reason: "expected a JSON object at the top level".to_string(),
        })?;
        Ok(Self {
            map,
            prefix: String::new(),
        })
    }

    fn nested(value: &'a Value, path: String) -> Result<Self, ValidationError> {
        let map = value
            .as_object()
            .ok_or_else(|| ValidationError::InvalidValue {
                path: path.clone(),
                message: "expected an object".to_string(),
            })?;
        Ok(Self { map, prefix: path })
    }

    fn path(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.prefix, key)
        }
    }

    /// Fetch a field, treating JSON `null` as absent
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn section(&self, key: &str) -> Result<Section<'a>, ValidationError> {
        let value = self.get(key).ok_or_else(|| ValidationError::MissingField {
            path: self.path(key),
        })?;
        Section::nested(value, self.path(key))
    }

    fn optional_str(&self, key: &str) -> Result<Option<String>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Err(ValidationError::Empty {
                path: self.path(key),
            }),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(ValidationError::InvalidValue {
                path: self.path(key),
                message: "expected a string".to_string(),
            }),
        }
    }

    fn required_str(&self, key: &str) -> Result<String, ValidationError> {
        self.optional_str(key)?
            .ok_or_else(|| ValidationError::MissingField {
                path: self.path(key),
            })
    }

    fn optional_u32(&self, key: &str) -> Result<Option<u32>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| ValidationError::InvalidValue {
                    path: self.path(key),
                    message: "expected a non-negative integer".to_string(),
                }),
        }
    }

    fn optional_array(&self, key: &str) -> Result<&'a [Value], ValidationError> {
        match self.get(key) {
            None => Ok(&[]),
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(_) => Err(ValidationError::InvalidValue {
                path: self.path(key),
                message: "expected an array".to_string(),
            }),
        }
    }

    /// String list; present-but-empty lists are rejected
    fn optional_str_list(&self, key: &str) -> Result<Option<Vec<String>>, ValidationError> {
        if self.get(key).is_none() {
            return Ok(None);
        }
        let items = self.optional_array(key)?;
        if items.is_empty() {
            return Err(ValidationError::Empty {
                path: self.path(key),
            });
        }
        items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) if !s.is_empty() => Ok(s.clone()),
                Value::String(_) => Err(ValidationError::Empty {
                    path: format!("{}[{}]", self.path(key), i),
                }),
                _ => Err(ValidationError::InvalidValue {
                    path: format!("{}[{}]", self.path(key), i),
                    message: "expected a string".to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn required_str_list(&self, key: &str) -> Result<Vec<String>, ValidationError> {
        self.optional_str_list(key)?
            .ok_or_else(|| ValidationError::MissingField {
                path: self.path(key),
            })
    }

    fn optional_keyword<T>(
        &self,
        key: &str,
        from_keyword: fn(&str) -> Option<T>,
    ) -> Result<Option<T>, ValidationError> {
        match self.optional_str(key)? {
            None => Ok(None),
            Some(word) => from_keyword(&word)
                .map(Some)
                .ok_or_else(|| ValidationError::InvalidValue {
                    path: self.path(key),
                    message: format!("unknown keyword '{}'", word),
                }),
        }
    }
}
