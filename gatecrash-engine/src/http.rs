use crate::captcha::CaptchaSolver;
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::headers::random_headers;
use crate::model::Target;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One target's HTTP session. Cookie jar and connection pool are scoped to
/// the target; dropping the session releases both. Cheap to clone, safe to
/// share across trial workers.
#[derive(Clone)]
pub struct Session {
    client: Client,
    headers: crate::config::HeaderConfig,
    delay: Duration,
    solver: Option<Arc<dyn CaptchaSolver>>,
}

/// Decoded response as the classifier sees it.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    /// Response headers flattened to text so markers can match against them.
    pub headers_text: String,
    pub body: String,
}

impl PageResponse {
    /// Byte length of the body, the differencing fingerprint.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Marker search space: body plus flattened headers.
    pub fn haystack(&self) -> String {
        format!("{}{}", self.body, self.headers_text)
    }
}

impl Session {
    pub fn new(config: &AuditConfig) -> crate::error::Result<Self> {
        let timeout = Duration::from_secs(config.timing.request_timeout_secs);
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(true)
            .cookie_store(true)
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5));

        if let Some(ref proxy) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| AuditError::Config(format!("invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| AuditError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            headers: config.headers.clone(),
            delay: Duration::from_millis(config.timing.delay_ms),
            solver: None,
        })
    }

    /// Attach a CAPTCHA recognizer. Every login submission then refreshes
    /// the CAPTCHA field with a freshly recognized seed.
    pub fn with_solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Blocking-style GET of a page body with fresh randomized headers.
    pub async fn fetch_page(&self, url: &str) -> reqwest::Result<PageResponse> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .headers(random_headers(&self.headers))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// GET raw bytes, used for CAPTCHA images.
    pub async fn fetch_bytes(&self, url: &str) -> reqwest::Result<(u16, Vec<u8>)> {
        debug!("GET (bytes) {}", url);
        let response = self
            .client
            .get(url)
            .headers(random_headers(&self.headers))
            .send()
            .await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        Ok((status, bytes.to_vec()))
    }

    /// Form-encoded POST with a caller-supplied header set.
    pub async fn submit_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        headers: HeaderMap,
    ) -> reqwest::Result<PageResponse> {
        debug!("POST {} ({} fields)", url, fields.len());
        let response = self
            .client
            .post(url)
            .headers(headers)
            .form(fields)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// The single request path shared by calibration probes, trial attempts
    /// and verification: fresh randomized headers, the target's captured
    /// form fields with credentials filled in (and a freshly recognized
    /// CAPTCHA seed where applicable), then the configured post-response
    /// delay.
    pub async fn submit_login(
        &self,
        target: &Target,
        username: &str,
        password: &str,
    ) -> reqwest::Result<PageResponse> {
        let mut fields = target.attempt_fields(username, password);
        self.refresh_captcha(target, &mut fields).await;
        let result = self
            .submit_form(&target.submit_path, &fields, random_headers(&self.headers))
            .await;
        tokio::time::sleep(self.delay).await;
        result
    }

    /// CAPTCHA seeds are single-use, so the image is re-fetched and
    /// re-recognized before every submission. Any failure leaves the field
    /// at its previous value.
    async fn refresh_captcha(&self, target: &Target, fields: &mut [(String, String)]) {
        let (Some(solver), Some(field), Some(image_url)) = (
            &self.solver,
            &target.captcha_field,
            &target.captcha_image_url,
        ) else {
            return;
        };
        match self.fetch_bytes(image_url).await {
            Ok((200, bytes)) => {
                if let Some(seed) = solver.recognize(&bytes)
                    && let Some(entry) = fields.iter_mut().find(|(name, _)| name == field)
                {
                    entry.1 = seed;
                }
            }
            Ok((status, _)) => debug!("CAPTCHA refresh returned status {}", status),
            Err(e) => warn!("CAPTCHA refresh failed: {}", e),
        }
    }

    async fn decode(response: reqwest::Response) -> reqwest::Result<PageResponse> {
        let status = response.status().as_u16();
        let headers_text = format!("{:?}", response.headers());
        let body = response.text().await?;
        Ok(PageResponse {
            status,
            headers_text,
            body,
        })
    }
}
