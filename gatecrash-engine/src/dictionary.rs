use crate::config::AuditConfig;
use crate::error::DictionaryError;
use crate::logging::RunLog;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;
use url::Url;

/// Minimum length for a hostname label or suffix-join to become a password
/// candidate.
const MIN_HOST_PART_LEN: usize = 5;

/// Merge every configured source into deduplicated username/password lists.
/// Sources are additive in a fixed order: static base lists, optional file
/// wordlists, host-derived passwords.
pub fn build(
    url: &str,
    config: &AuditConfig,
    log: &RunLog,
) -> Result<(Vec<String>, Vec<String>), DictionaryError> {
    let dict = &config.dictionary;
    let mut usernames = dict.base_usernames.clone();
    let mut passwords = dict.base_passwords.clone();

    if let Some(ref path) = dict.username_file {
        let loaded = load_wordlist(path)?;
        log.info(&format!(
            "[*] loaded {} usernames from {}",
            loaded.len(),
            path.display()
        ));
        usernames.extend(loaded);
    }
    if let Some(ref path) = dict.password_file {
        let loaded = load_wordlist(path)?;
        log.info(&format!(
            "[*] loaded {} passwords from {}",
            loaded.len(),
            path.display()
        ));
        passwords.extend(loaded);
    }

    if dict.host_derived {
        let derived = host_derived_passwords(url, &dict.domain_suffixes);
        if derived.is_empty() {
            log.info("[*] host-derived source contributed no candidates");
        } else {
            log.info(&format!(
                "[*] derived {} password candidates from hostname",
                derived.len()
            ));
        }
        passwords.extend(derived);
    }

    let usernames = dedup(usernames);
    let passwords = dedup(passwords);

    if usernames.is_empty() || passwords.is_empty() {
        return Err(DictionaryError::EmptyDictionary);
    }

    log.info(&format!(
        "[*] dictionary ready: {} usernames x {} passwords",
        usernames.len(),
        passwords.len()
    ));
    Ok((usernames, passwords))
}

/// The fixed SQL injection payload list, used as both the username and the
/// password candidates. Engaged only after the normal dictionary exhausts.
pub fn build_sql_injection(config: &AuditConfig) -> (Vec<String>, Vec<String>) {
    let payloads = config.dictionary.sql_injection.payloads.clone();
    (payloads.clone(), payloads)
}

/// Newline-delimited wordlist; blank lines and `#` comments are skipped.
/// A missing file is an empty source, not an error.
fn load_wordlist(path: &Path) -> Result<Vec<String>, DictionaryError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Password candidates derived from the target hostname. A literal IPv4
/// host contributes nothing. For a dotted host: every right-aligned
/// suffix-join of labels, and every individual label crossed with the
/// configured suffixes, both subject to the minimum length.
fn host_derived_passwords(url: &str, suffixes: &[String]) -> Vec<String> {
    let Some(host) = host_of(url) else {
        return Vec::new();
    };
    if host.parse::<Ipv4Addr>().is_ok() {
        return Vec::new();
    }

    let labels: Vec<&str> = host.split('.').collect();
    let mut passwords = Vec::new();

    for i in 0..labels.len() {
        let joined = labels[i..].join(".");
        if joined.len() >= MIN_HOST_PART_LEN {
            passwords.push(joined);
        }
    }

    for label in &labels {
        if label.len() < MIN_HOST_PART_LEN {
            continue;
        }
        for suffix in suffixes {
            passwords.push(format!("{label}{suffix}"));
        }
    }

    passwords
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
}

/// Order-preserving dedup; first occurrence wins.
fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn suffixes(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ipv4_host_contributes_nothing() {
        let derived = host_derived_passwords("http://192.168.1.10/admin", &suffixes(&["", "123"]));
        assert!(derived.is_empty());
    }

    #[test]
    fn dotted_host_generates_joins_and_suffixed_labels() {
        let derived =
            host_derived_passwords("http://test.example.com/login", &suffixes(&["", "123"]));

        // Right-aligned joins of length >= 5
        assert!(derived.contains(&"test.example.com".to_string()));
        assert!(derived.contains(&"example.com".to_string()));
        // "com" join is too short
        assert!(!derived.contains(&"com".to_string()));

        // Labels of length >= 5 crossed with suffixes, empty suffix included
        assert!(derived.contains(&"example".to_string()));
        assert!(derived.contains(&"example123".to_string()));

        // "test" is shorter than the minimum, with or without suffix
        assert!(!derived.contains(&"test".to_string()));
        assert!(!derived.contains(&"test123".to_string()));
    }

    #[test]
    fn every_derived_base_meets_minimum_length() {
        let sfx = suffixes(&["", "888"]);
        let derived = host_derived_passwords("http://a.bb.ccc.dddd.eeeee.ff/", &sfx);
        for candidate in &derived {
            let base_len = if candidate.contains('.') {
                candidate.len()
            } else {
                let stripped = sfx
                    .iter()
                    .filter(|s| !s.is_empty())
                    .find_map(|s| candidate.strip_suffix(s.as_str()))
                    .unwrap_or(candidate);
                stripped.len()
            };
            assert!(base_len >= MIN_HOST_PART_LEN, "too short: {candidate}");
        }
    }

    #[test]
    fn wordlist_skips_blank_and_comment_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "admin").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file, "  root  ").unwrap();

        let words = load_wordlist(file.path()).unwrap();
        assert_eq!(words, vec!["admin".to_string(), "root".to_string()]);
    }

    #[test]
    fn missing_wordlist_is_an_empty_source() {
        let words = load_wordlist(Path::new("/nonexistent/wordlist.txt")).unwrap();
        assert!(words.is_empty());
    }

    #[test]
    fn merged_dictionary_is_deduplicated() {
        let mut config = AuditConfig::default();
        config.dictionary.base_usernames = vec!["admin".into(), "admin".into(), "root".into()];
        config.dictionary.base_passwords = vec!["123456".into(), "123456".into()];
        config.dictionary.host_derived = false;

        let (users, passes) =
            build("http://10.0.0.1/login", &config, &RunLog::discard()).unwrap();
        assert_eq!(users, vec!["admin".to_string(), "root".to_string()]);
        assert_eq!(passes, vec!["123456".to_string()]);
    }

    #[test]
    fn empty_merge_is_an_error() {
        let mut config = AuditConfig::default();
        config.dictionary.base_usernames.clear();
        config.dictionary.base_passwords.clear();
        config.dictionary.host_derived = false;

        let result = build("http://10.0.0.1/login", &config, &RunLog::discard());
        assert!(matches!(result, Err(DictionaryError::EmptyDictionary)));
    }

    #[test]
    fn sql_injection_payloads_serve_both_roles() {
        let config = AuditConfig::default();
        let (users, passes) = build_sql_injection(&config);
        assert_eq!(users, passes);
        assert!(!users.is_empty());
    }
}
