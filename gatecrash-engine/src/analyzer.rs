use crate::captcha::{self, CaptchaSolver};
use crate::config::AuditConfig;
use crate::error::AnalysisError;
use crate::http::Session;
use crate::logging::RunLog;
use crate::model::{CmsProfile, Target};
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Analyzes one login page into a [`Target`]. Steps run in a fixed order
/// and any of them may abort the target.
pub struct PageAnalyzer<'a> {
    session: &'a Session,
    config: &'a AuditConfig,
    solver: Option<Arc<dyn CaptchaSolver>>,
    log: &'a RunLog,
}

/// Owned extract of the sliced form markup. Parsing happens up front so no
/// DOM handle is held across await points.
struct FormMarkup {
    action: Option<String>,
    /// Input name/value pairs in document order; `None` value means the
    /// attribute was absent.
    inputs: Vec<(String, Option<String>)>,
    image_sources: Vec<String>,
}

impl<'a> PageAnalyzer<'a> {
    pub fn new(
        session: &'a Session,
        config: &'a AuditConfig,
        solver: Option<Arc<dyn CaptchaSolver>>,
        log: &'a RunLog,
    ) -> Self {
        Self {
            session,
            config,
            solver,
            log,
        }
    }

    pub async fn analyze(&self, url: &str) -> Result<Target, AnalysisError> {
        let page = self.session.fetch_page(url).await?;
        self.log.info(&format!(
            "[*] {} responded with status {}, {} bytes",
            url,
            page.status,
            page.body.len()
        ));

        let cms_profile = self.match_cms(&page.body);

        let markup = extract_form_markup(&page.body)?;
        self.check_login_likeness(&markup)?;

        let form = parse_form_markup(&markup);

        let (captcha_field, captcha_image_url, captcha_seed) =
            self.resolve_captcha(url, &page.body, &form).await;

        let submit_path = resolve_submit_path(url, form.action.as_deref())?;
        debug!("submit path resolved to {}", submit_path);

        let (username_field, password_field, mut form_fields) = self.classify_fields(&form)?;

        if let (Some(field), Some(seed)) = (&captcha_field, &captcha_seed) {
            set_field(&mut form_fields, field, seed);
        }

        Ok(Target {
            url: url.to_string(),
            submit_path,
            username_field,
            password_field,
            form_fields,
            captcha_field,
            captcha_image_url,
            cms_profile,
        })
    }

    /// First signature whose keyword appears in the raw body wins.
    fn match_cms(&self, body: &str) -> Option<CmsProfile> {
        for signature in &self.config.cms {
            if !signature.keyword.is_empty() && body.contains(&signature.keyword) {
                self.log
                    .info(&format!("[*] recognized CMS: {}", signature.name));
                let profile = CmsProfile::from_signature(signature);
                if let Some(ref note) = profile.advisory_note {
                    self.log.info(&format!("[*] {note}"));
                }
                return Some(profile);
            }
        }
        None
    }

    /// The lower-cased form markup must contain at least one login keyword.
    fn check_login_likeness(&self, markup: &str) -> Result<(), AnalysisError> {
        let lowered = markup.to_lowercase();
        if self
            .config
            .parser
            .login_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
        {
            Ok(())
        } else {
            Err(AnalysisError::NotALoginPage)
        }
    }

    /// CAPTCHA detection is best-effort throughout: a missing element or a
    /// failed recognition leaves the target without CAPTCHA support.
    async fn resolve_captcha(
        &self,
        page_url: &str,
        body: &str,
        form: &FormMarkup,
    ) -> (Option<String>, Option<String>, Option<String>) {
        let body_lower = body.to_lowercase();
        let keyword_hit = self
            .config
            .parser
            .captcha_keywords
            .iter()
            .any(|keyword| body_lower.contains(&keyword.to_lowercase()));
        if !keyword_hit {
            return (None, None, None);
        }
        self.log
            .info(&format!("[*] {page_url} appears to use a CAPTCHA"));

        let field = form.inputs.iter().map(|(name, _)| name).find(|name| {
            let lowered = name.to_lowercase();
            self.config
                .parser
                .captcha_field_tokens
                .iter()
                .any(|token| lowered.contains(&token.to_lowercase()))
        });

        let image_url = form
            .image_sources
            .iter()
            .find(|src| {
                let lowered = src.to_lowercase();
                self.config
                    .parser
                    .captcha_image_tokens
                    .iter()
                    .any(|token| lowered.contains(&token.to_lowercase()))
            })
            .and_then(|src| resolve_against(page_url, src));

        let (Some(field), Some(image_url)) = (field, image_url) else {
            self.log
                .info("[*] CAPTCHA keyword present but no field/image pair found, continuing");
            return (None, None, None);
        };

        self.log.info(&format!(
            "[*] CAPTCHA detected: field={field}, image={image_url}"
        ));

        let seed = match &self.solver {
            Some(solver) => captcha::fetch_seed(self.session, solver, &image_url, self.log).await,
            None => None,
        };

        (Some(field.clone()), Some(image_url), seed)
    }

    /// Extract every named input, drop reset fields, and classify exactly
    /// one username and one password field by first keyword match.
    #[allow(clippy::type_complexity)]
    fn classify_fields(
        &self,
        form: &FormMarkup,
    ) -> Result<(String, String, Vec<(String, String)>), AnalysisError> {
        let parser = &self.config.parser;
        let mut fields: Vec<(String, String)> = Vec::new();

        for (name, value) in &form.inputs {
            if name.is_empty() || name.to_lowercase().contains("reset") {
                continue;
            }
            let value = value.clone().unwrap_or_else(|| parser.default_value.clone());
            set_field(&mut fields, name, &value);
        }

        let mut username_field = String::new();
        let mut password_field = String::new();

        for (name, _) in &fields {
            let lowered = name.to_lowercase();
            if username_field.is_empty()
                && *name != password_field
                && parser
                    .username_keywords
                    .iter()
                    .any(|keyword| lowered.contains(&keyword.to_lowercase()))
            {
                username_field = name.clone();
                continue;
            }
            if password_field.is_empty()
                && *name != username_field
                && parser
                    .password_keywords
                    .iter()
                    .any(|keyword| lowered.contains(&keyword.to_lowercase()))
            {
                password_field = name.clone();
            }
        }

        if username_field.is_empty() || password_field.is_empty() {
            return Err(AnalysisError::NoLoginParameters);
        }

        Ok((username_field, password_field, fields))
    }
}

/// Slice from the first `<form` to the LAST `</form>` in the document.
/// Deliberately greedy: tolerant of malformed markup before the form, at
/// the cost of merging multi-form pages (known limitation).
fn extract_form_markup(body: &str) -> Result<String, AnalysisError> {
    const CLOSE: &str = "</form>";
    if let Some(start) = body.find("<form")
        && let Some(end) = body.rfind(CLOSE)
        && end > start
    {
        return Ok(body[start..end + CLOSE.len()].to_string());
    }
    Err(AnalysisError::NoFormFound(form_diagnostics(body)))
}

fn form_diagnostics(body: &str) -> String {
    let lowered = body.to_lowercase();
    let mut details = format!("page is {} bytes", body.len());
    if !lowered.contains("<body") {
        details.push_str(", no <body> tag");
    }
    if !lowered.contains("<input") {
        details.push_str(", no <input> elements");
    }
    if body.contains("404") || lowered.contains("not found") {
        details.push_str(", looks like a 404 page");
    } else if body.contains("500") || lowered.contains("internal server error") {
        details.push_str(", looks like a server error page");
    } else if body.contains("<script") && body.contains("location.href") {
        details.push_str(", contains a redirect script");
    }
    details
}

fn parse_form_markup(markup: &str) -> FormMarkup {
    let fragment = Html::parse_fragment(markup);
    let form_selector = Selector::parse("form").expect("static selector");
    let input_selector = Selector::parse("input").expect("static selector");
    let img_selector = Selector::parse("img").expect("static selector");

    let action = fragment
        .select(&form_selector)
        .next()
        .and_then(|form| form.value().attr("action"))
        .map(str::to_string);

    let inputs = fragment
        .select(&input_selector)
        .filter_map(|input| {
            input.value().attr("name").map(|name| {
                (
                    name.to_string(),
                    input.value().attr("value").map(str::to_string),
                )
            })
        })
        .collect();

    let image_sources = fragment
        .select(&img_selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::to_string)
        .collect();

    FormMarkup {
        action,
        inputs,
        image_sources,
    }
}

/// Resolve the form `action` into the URL trials will POST to.
fn resolve_submit_path(page_url: &str, action: Option<&str>) -> Result<String, AnalysisError> {
    let action = action.unwrap_or("").trim();

    let path = if action.starts_with("http") {
        action.to_string()
    } else if action.is_empty() {
        // Self-submitting form
        page_url.to_string()
    } else if let Some(stripped) = action.strip_prefix('/') {
        let parsed = Url::parse(page_url).map_err(|_| AnalysisError::NoSubmitPath)?;
        let host = parsed.host_str().ok_or(AnalysisError::NoSubmitPath)?;
        match parsed.port() {
            Some(port) => format!("{}://{}:{}/{}", parsed.scheme(), host, port, stripped),
            None => format!("{}://{}/{}", parsed.scheme(), host, stripped),
        }
    } else {
        // Relative: resolved after dropping the page URL's last path segment
        resolve_against(page_url, action).ok_or(AnalysisError::NoSubmitPath)?
    };

    if path.is_empty() {
        return Err(AnalysisError::NoSubmitPath);
    }
    Ok(path)
}

fn resolve_against(base: &str, relative: &str) -> Option<String> {
    Url::parse(base)
        .ok()?
        .join(relative)
        .ok()
        .map(|resolved| resolved.to_string())
}

/// Replace an existing field's value or append a new one, preserving order.
fn set_field(fields: &mut Vec<(String, String)>, name: &str, value: &str) {
    if let Some(entry) = fields.iter_mut().find(|(n, _)| n == name) {
        entry.1 = value.to_string();
    } else {
        fields.push((name.to_string(), value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_slice_is_greedy_to_last_close_tag() {
        let body = r#"<html><form id="search"><input name="q"></form>
            <form id="login"><input name="user"><input name="pass"></form></html>"#;
        let markup = extract_form_markup(body).unwrap();
        assert!(markup.starts_with("<form id=\"search\""));
        assert!(markup.ends_with("</form>"));
        assert!(markup.contains("id=\"login\""));
    }

    #[test]
    fn missing_form_reports_diagnostics() {
        let err = extract_form_markup("<html><body>404 not found</body></html>").unwrap_err();
        match err {
            AnalysisError::NoFormFound(details) => {
                assert!(details.contains("no <input> elements"));
                assert!(details.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn absolute_action_used_verbatim() {
        let path =
            resolve_submit_path("http://host/login.php", Some("https://other/do_login")).unwrap();
        assert_eq!(path, "https://other/do_login");
    }

    #[test]
    fn rooted_action_resolves_against_host() {
        let path =
            resolve_submit_path("http://host:8080/a/b/login.php", Some("/do_login.php")).unwrap();
        assert_eq!(path, "http://host:8080/do_login.php");
    }

    #[test]
    fn empty_action_means_self_submit() {
        let path = resolve_submit_path("http://host/login.php", Some("")).unwrap();
        assert_eq!(path, "http://host/login.php");
        let path = resolve_submit_path("http://host/login.php", None).unwrap();
        assert_eq!(path, "http://host/login.php");
    }

    #[test]
    fn relative_action_drops_last_segment() {
        let path =
            resolve_submit_path("http://host/admin/login.php", Some("do_login.php")).unwrap();
        assert_eq!(path, "http://host/admin/do_login.php");
    }

    #[test]
    fn inputs_keep_document_order() {
        let form = parse_form_markup(
            r#"<form><input name="user" value="u"><input name="pass"><input name="token" value="t"></form>"#,
        );
        let names: Vec<&str> = form.inputs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["user", "pass", "token"]);
        assert_eq!(form.inputs[1].1, None);
    }
}
