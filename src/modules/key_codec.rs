// src/modules/key_codec.rs
//
// Listener wire format.
//
// request  := { dataId FS group FS fingerprint [ FS tenant ] ES }
// response := { dataId FS group [ FS tenant ] ES }   (URL-encoded by the server)
//
// FS is byte 2, ES is byte 1. An empty response means nothing changed.

use crate::error::{Result, WatchError};
use crate::modules::fingerprint_store::Fingerprint;
use crate::modules::watch_key::WatchKey;
use log::warn;
use std::collections::HashSet;

pub const FIELD_SEPARATOR: char = '\u{2}';
pub const ENTRY_SEPARATOR: char = '\u{1}';

/// One entry of the watch list sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    pub key: WatchKey,
    pub fingerprint: Fingerprint,
}

impl WatchRegistration {
    pub fn new(key: WatchKey, fingerprint: Fingerprint) -> Self {
        Self { key, fingerprint }
    }
}

/// Encodes registrations in order. The unknown fingerprint is sent as an
/// empty field.
pub fn encode(registrations: &[WatchRegistration]) -> Result<String> {
    let mut out = String::new();
    for registration in registrations {
        let key = &registration.key;
        let fingerprint = registration.fingerprint.as_str();
        if key.data_id().is_empty() || key.group().is_empty() {
            return Err(WatchError::Encoding(format!("incomplete key {}", key)));
        }
        for field in [key.data_id(), key.group(), key.tenant(), fingerprint] {
            if field.contains(FIELD_SEPARATOR) || field.contains(ENTRY_SEPARATOR) {
                return Err(WatchError::Encoding(format!(
                    "field {:?} of {} contains a separator",
                    field, key
                )));
            }
        }

        out.push_str(key.data_id());
        out.push(FIELD_SEPARATOR);
        out.push_str(key.group());
        out.push(FIELD_SEPARATOR);
        out.push_str(fingerprint);
        if !key.tenant().is_empty() {
            out.push(FIELD_SEPARATOR);
            out.push_str(key.tenant());
        }
        out.push(ENTRY_SEPARATOR);
    }
    Ok(out)
}

/// Decodes the keys the server reports as changed, distinct and in response
/// order. Malformed entries are skipped.
///
/// The body is always percent-decoded first, since the server escapes it.
/// Raw separator bytes pass through unchanged, but a literal `%XX` in a raw
/// body is decoded too: `app%2Eyml` comes back as `app.yml`.
pub fn decode(body: &str) -> Result<Vec<WatchKey>> {
    let decoded = urlencoding::decode(body)
        .map_err(|e| WatchError::Decode(format!("response is not valid UTF-8: {}", e)))?;

    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for segment in decoded.trim().split(ENTRY_SEPARATOR) {
        if segment.is_empty() {
            continue;
        }
        let fields: Vec<&str> = segment.split(FIELD_SEPARATOR).collect();
        let (data_id, group, tenant) = match fields.as_slice() {
            [data_id, group] => (*data_id, *group, ""),
            [data_id, group, tenant] => (*data_id, *group, *tenant),
            _ => {
                warn!(
                    "Skipping listener entry with {} fields: {:?}",
                    fields.len(),
                    segment
                );
                continue;
            }
        };
        if data_id.is_empty() || group.is_empty() {
            warn!("Skipping listener entry with empty data id or group: {:?}", segment);
            continue;
        }
        match WatchKey::new(data_id, group, tenant) {
            Ok(key) => {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
            Err(e) => warn!("Skipping listener entry {:?}: {}", segment, e),
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::fingerprint_store::FingerprintAlgorithm;
    use std::collections::HashMap;

    fn key(data_id: &str, group: &str, tenant: &str) -> WatchKey {
        WatchKey::new(data_id, group, tenant).unwrap()
    }

    /// Server side of the protocol: parse a request watch list, compare it
    /// against stored content and answer with the changed keys, URL-encoded.
    fn simulate_server(request: &str, contents: &HashMap<WatchKey, String>) -> String {
        let mut response = String::new();
        for entry in request.split(ENTRY_SEPARATOR).filter(|e| !e.is_empty()) {
            let fields: Vec<&str> = entry.split(FIELD_SEPARATOR).collect();
            let tenant = fields.get(3).copied().unwrap_or("");
            let k = key(fields[0], fields[1], tenant);
            let server_md5 = contents
                .get(&k)
                .map(|c| Fingerprint::compute(c, FingerprintAlgorithm::Md5))
                .unwrap_or_default();
            if server_md5.as_str() != fields[2] {
                response.push_str(fields[0]);
                response.push_str("%02");
                response.push_str(fields[1]);
                if !tenant.is_empty() {
                    response.push_str("%02");
                    response.push_str(tenant);
                }
                response.push_str("%01");
            }
        }
        response
    }

    #[test]
    fn encodes_tenant_after_fingerprint() {
        let regs = vec![
            WatchRegistration::new(key("app.yml", "DEFAULT_GROUP", ""), Fingerprint::unknown()),
            WatchRegistration::new(key("db", "infra", "prod"), Fingerprint::from("abc")),
        ];
        assert_eq!(
            encode(&regs).unwrap(),
            "app.yml\u{2}DEFAULT_GROUP\u{2}\u{1}db\u{2}infra\u{2}abc\u{2}prod\u{1}"
        );
    }

    #[test]
    fn encode_rejects_separator_in_fingerprint() {
        let regs = vec![WatchRegistration::new(
            key("app.yml", "DEFAULT_GROUP", ""),
            Fingerprint::from("a\u{1}b"),
        )];
        assert!(matches!(encode(&regs), Err(WatchError::Encoding(_))));
    }

    #[test]
    fn empty_and_separator_only_bodies_decode_to_nothing() {
        assert!(decode("").unwrap().is_empty());
        assert!(decode("  \r\n").unwrap().is_empty());
        assert!(decode("\u{1}\u{1}").unwrap().is_empty());
        assert!(decode("%01%01\n").unwrap().is_empty());
    }

    #[test]
    fn decodes_raw_and_url_encoded_bodies() {
        let raw = decode("app.yml\u{2}DEFAULT_GROUP\u{1}db\u{2}infra\u{2}prod\u{1}").unwrap();
        let escaped = decode("app.yml%02DEFAULT_GROUP%01db%02infra%02prod%01\n").unwrap();
        assert_eq!(raw, escaped);
        assert_eq!(
            raw,
            vec![key("app.yml", "DEFAULT_GROUP", ""), key("db", "infra", "prod")]
        );
    }

    #[test]
    fn malformed_segments_do_not_affect_siblings() {
        let keys = decode("lonely%01a%02g%01x%02y%02z%02extra%01%02g%01b%02g%01a%02g%01").unwrap();
        assert_eq!(keys, vec![key("a", "g", ""), key("b", "g", "")]);
    }

    #[test]
    fn percent_sequences_are_decoded_even_in_raw_bodies() {
        let keys = decode("app%2Eyml\u{2}DEFAULT_GROUP\u{1}").unwrap();
        assert_eq!(keys, vec![key("app.yml", "DEFAULT_GROUP", "")]);
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        assert!(matches!(decode("%FF%FE"), Err(WatchError::Decode(_))));
    }

    #[test]
    fn server_reports_exactly_the_keys_whose_fingerprint_differs() {
        let unchanged = key("same.yml", "DEFAULT_GROUP", "");
        let edited = key("edited.yml", "DEFAULT_GROUP", "dev");
        let fresh = key("fresh.yml", "g", "");
        let absent = key("absent.yml", "g", "");

        let mut server = HashMap::new();
        server.insert(unchanged.clone(), "a: 1".to_string());
        server.insert(edited.clone(), "b: 2".to_string());
        server.insert(fresh.clone(), "c: 3".to_string());

        let md5 = |c: &str| Fingerprint::compute(c, FingerprintAlgorithm::Md5);
        let regs = vec![
            WatchRegistration::new(unchanged.clone(), md5("a: 1")),
            WatchRegistration::new(edited.clone(), md5("b: 1")),
            WatchRegistration::new(fresh.clone(), Fingerprint::unknown()),
            WatchRegistration::new(absent.clone(), Fingerprint::unknown()),
        ];

        let response = simulate_server(&encode(&regs).unwrap(), &server);
        assert_eq!(decode(&response).unwrap(), vec![edited, fresh]);
    }
}
