// Per-attempt request identity: randomized User-Agent plus spoofed
// forwarding headers. Opaque to the rest of the engine.

use crate::config::HeaderConfig;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Build the header set for one request. With randomization disabled the
/// configured default set is returned verbatim.
pub fn random_headers(config: &HeaderConfig) -> HeaderMap {
    if !config.randomize {
        return from_pairs(&config.default_headers);
    }

    let mut rng = rand::thread_rng();
    let user_agent = config
        .user_agents
        .choose(&mut rng)
        .map(String::as_str)
        .unwrap_or("Mozilla/5.0");

    let a = rng.gen_range(1..=255);
    let b = rng.gen_range(1..=255);
    let c = rng.gen_range(1..=255);
    let forwarded_for = format!("127.{a}.{b}.{c}");
    let client_ip = format!("127.{c}.{a}.{b}");

    let pairs = [
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
        ("User-Agent", user_agent),
        ("X-Forwarded-For", forwarded_for.as_str()),
        ("Client-IP", client_ip.as_str()),
        ("Accept-Encoding", "gzip, deflate"),
        ("Accept-Language", "zh-CN,zh;q=0.8"),
        ("Referer", "http://www.baidu.com/"),
        ("Content-Type", "application/x-www-form-urlencoded"),
    ];

    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

fn from_pairs(pairs: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderConfig;

    #[test]
    fn disabled_mode_returns_defaults() {
        let config = HeaderConfig {
            randomize: false,
            ..HeaderConfig::default()
        };
        let headers = random_headers(&config);
        assert_eq!(headers.get("User-Agent").unwrap(), "Gatecrash Test");
        assert!(headers.get("X-Forwarded-For").is_none());
    }

    #[test]
    fn randomized_mode_spoofs_loopback_forwarding() {
        let config = HeaderConfig::default();
        let headers = random_headers(&config);
        let xff = headers.get("X-Forwarded-For").unwrap().to_str().unwrap();
        assert!(xff.starts_with("127."));
        assert_eq!(xff.split('.').count(), 4);

        let ua = headers.get("User-Agent").unwrap().to_str().unwrap();
        assert!(config.user_agents.iter().any(|candidate| candidate == ua));
    }
}
