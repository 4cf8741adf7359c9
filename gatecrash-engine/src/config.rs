use crate::error::AuditError;
use crate::model::CmsSignature;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Typed configuration for one audit run. Every subsystem reads its own
/// section; `validate` is checked once at load time so the pipeline can
/// assume the tables are usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub timing: TimingConfig,
    pub probe: ProbeConfig,
    /// Keywords whose presence in body+headers marks an attempt as a
    /// definite failure.
    pub fail_words: Vec<String>,
    pub parser: ParserConfig,
    pub dictionary: DictionaryConfig,
    pub headers: HeaderConfig,
    /// CMS signature table; first match in order wins.
    pub cms: Vec<CmsSignature>,
    /// Optional proxy URL applied to every request of the run.
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Fixed sleep after every response.
    pub delay_ms: u64,
    /// Wall-clock budget for one whole target (analyze + trial + verify).
    pub target_budget_secs: u64,
    /// Trial worker pool size within one target.
    pub max_workers: usize,
    /// Every Nth attempt logs a header-rotation checkpoint.
    pub rotation_interval: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            delay_ms: 30,
            target_budget_secs: 180,
            max_workers: 1,
            rotation_interval: 200,
        }
    }
}

/// The known-invalid pair used for baseline and verification probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub username: String,
    pub password: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "length_test".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Sentinel value for inputs that carry no `value` attribute.
    pub default_value: String,
    pub username_keywords: Vec<String>,
    pub password_keywords: Vec<String>,
    /// The lower-cased form markup must contain at least one of these.
    pub login_keywords: Vec<String>,
    /// Body keywords that indicate a CAPTCHA is present.
    pub captcha_keywords: Vec<String>,
    /// Tokens matched against input names to spot the CAPTCHA field.
    pub captcha_field_tokens: Vec<String>,
    /// Tokens matched against img sources to spot the CAPTCHA image.
    pub captcha_image_tokens: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_value: "0000".to_string(),
            username_keywords: str_vec(&["user", "name", "zhanghao", "yonghu", "email", "account"]),
            password_keywords: str_vec(&["pass", "pw", "mima"]),
            login_keywords: str_vec(&[
                "用户名", "密码", "login", "denglu", "登录", "user", "pass", "yonghu", "mima",
                "admin",
            ]),
            captcha_keywords: str_vec(&[
                "验证码", "captcha", "验 证 码", "点击更换", "点击刷新", "看不清", "认证码",
                "安全问题",
            ]),
            captcha_field_tokens: str_vec(&["captcha", "code", "verify", "验证码"]),
            captcha_image_tokens: str_vec(&[
                "captcha", "codeimg", "checkcode", "verify", "验证码", "安全验证", "认证码",
                "校验码",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    pub base_usernames: Vec<String>,
    pub base_passwords: Vec<String>,
    /// Optional newline-delimited wordlists; blank and `#` lines skipped.
    pub username_file: Option<PathBuf>,
    pub password_file: Option<PathBuf>,
    /// Derive password candidates from the target hostname.
    pub host_derived: bool,
    /// Suffixes crossed with hostname labels; the empty suffix keeps the
    /// bare label.
    pub domain_suffixes: Vec<String>,
    pub sql_injection: SqlInjectionConfig,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            base_usernames: str_vec(&["admin"]),
            base_passwords: str_vec(&[
                "admin",
                "admin123",
                "123456",
                "password",
                "12345678",
                "admin888",
                "admin@123",
                "root",
                "111111",
                "666666",
                "888888",
                "admin666",
                "qwerty",
                "{user}",
                "{user}123",
                "{user}666",
                "{user}888",
                "{user}@123",
            ]),
            username_file: None,
            password_file: None,
            host_derived: true,
            domain_suffixes: str_vec(&["", "123", "666", "888", "123456"]),
            sql_injection: SqlInjectionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlInjectionConfig {
    /// Engage the payload list after normal exhaustion even without an
    /// eligible CMS profile.
    pub always: bool,
    pub payloads: Vec<String>,
}

impl Default for SqlInjectionConfig {
    fn default() -> Self {
        Self {
            always: false,
            payloads: str_vec(&[
                "admin' or 'a'='a",
                "'or'='or'",
                "admin' or '1'='1' or 1=1",
                "')or('a'='a",
                "'or 1=1 -- -",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// When false every request carries `default_headers` verbatim.
    pub randomize: bool,
    pub user_agents: Vec<String>,
    pub default_headers: Vec<(String, String)>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            randomize: true,
            user_agents: str_vec(&[
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/51.0.2704.106 Safari/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.5993.120 Safari/537.36",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.5938.149 Safari/537.36",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:119.0) Gecko/20100101 Firefox/119.0",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 13.5; rv:118.0) Gecko/20100101 Firefox/118.0",
                "Mozilla/5.0 (X11; Linux x86_64; rv:117.0) Gecko/20100101 Firefox/117.0",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.61",
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Safari/605.1.15",
                "Mozilla/5.0 (Linux; Android 14; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
                "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:118.0) Gecko/20100101 Firefox/118.0",
                "Opera/10.60 (Windows NT 5.1; U; zh-cn) Presto/2.6.30 Version/10.60",
            ]),
            default_headers: vec![
                (
                    "Accept".to_string(),
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                        .to_string(),
                ),
                ("User-Agent".to_string(), "Gatecrash Test".to_string()),
                ("Accept-Encoding".to_string(), "gzip, deflate".to_string()),
                ("Accept-Language".to_string(), "zh-CN,zh;q=0.8".to_string()),
                ("Referer".to_string(), "http://www.baidu.com/".to_string()),
                (
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ),
            ],
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            probe: ProbeConfig::default(),
            fail_words: str_vec(&[
                "密码错误", "重试", "不正确", "密码有误", "不成功", "重新输入", "不存在",
                "登录失败", "登陆失败", "已被锁定", "安全拦截", "还可以尝试", "无效", "攻击行为",
                "用户不存在", "非法", "安全威胁", "防火墙", "不合法", "尝试次数",
                "history.go", "history.back", "Denied", "Illegal operation",
                "password is incorrect", "login failed", "invalid password",
                "incorrect username", "too many attempts", "account does not exist",
            ]),
            parser: ParserConfig::default(),
            dictionary: DictionaryConfig::default(),
            headers: HeaderConfig::default(),
            cms: default_cms_table(),
            proxy: None,
        }
    }
}

fn default_cms_table() -> Vec<CmsSignature> {
    vec![
        CmsSignature {
            name: "discuz".to_string(),
            keyword: "admin_questionid".to_string(),
            success_marker: Some("admin.php?action=logout".to_string()),
            death_marker: Some("密码错误次数过多".to_string()),
            sql_injection_eligible: false,
            advisory_note: None,
        },
        CmsSignature {
            name: "dedecms".to_string(),
            keyword: "newdedecms".to_string(),
            success_marker: None,
            death_marker: None,
            sql_injection_eligible: false,
            advisory_note: None,
        },
        CmsSignature {
            name: "phpweb".to_string(),
            keyword: "width:100%;height:100%;background:#ffffff;padding:160px".to_string(),
            success_marker: Some("admin.php?action=logout".to_string()),
            death_marker: None,
            sql_injection_eligible: true,
            advisory_note: Some(
                "phpweb is known to accept the universal password admin' or '1'='1' or '1'='1"
                    .to_string(),
            ),
        },
        CmsSignature {
            name: "ecshop".to_string(),
            keyword: "validator.required('username', user_name_empty);".to_string(),
            success_marker: Some("ECSCP[admin_pass]".to_string()),
            death_marker: None,
            sql_injection_eligible: false,
            advisory_note: None,
        },
        CmsSignature {
            name: "phpmyadmin".to_string(),
            keyword: "pma_username".to_string(),
            success_marker: Some("db_structure.php".to_string()),
            death_marker: None,
            sql_injection_eligible: false,
            advisory_note: None,
        },
    ]
}

impl AuditConfig {
    /// Load from a JSON file; missing sections fall back to the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AuditError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| AuditError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.timing.max_workers == 0 {
            return Err(AuditError::Config("max_workers must be at least 1".into()));
        }
        if self.timing.rotation_interval == 0 {
            return Err(AuditError::Config("rotation_interval must be at least 1".into()));
        }
        if self.probe.username.is_empty() || self.probe.password.is_empty() {
            return Err(AuditError::Config("probe credentials must not be empty".into()));
        }
        if self.parser.username_keywords.is_empty() || self.parser.password_keywords.is_empty() {
            return Err(AuditError::Config(
                "username/password keyword tables must not be empty".into(),
            ));
        }
        if self.parser.login_keywords.is_empty() {
            return Err(AuditError::Config("login keyword table must not be empty".into()));
        }
        if self.headers.randomize && self.headers.user_agents.is_empty() {
            return Err(AuditError::Config(
                "header randomization enabled with an empty user agent pool".into(),
            ));
        }
        Ok(())
    }
}

fn str_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_validates() {
        AuditConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = AuditConfig::default();
        config.timing.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_keyword_table_rejected() {
        let mut config = AuditConfig::default();
        config.parser.password_keywords.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_probe_credentials_rejected() {
        let mut config = AuditConfig::default();
        config.probe.password.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"timing": {{"max_workers": 8}}, "probe": {{"username": "nobody"}}}}"#
        )
        .unwrap();

        let config = AuditConfig::from_file(file.path()).unwrap();
        assert_eq!(config.timing.max_workers, 8);
        assert_eq!(config.probe.username, "nobody");
        // Untouched sections keep their defaults
        assert_eq!(config.timing.rotation_interval, 200);
        assert!(!config.dictionary.base_passwords.is_empty());
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(AuditConfig::from_file(file.path()).is_err());
    }
}
