// OCR seam. The recognizer is an opaque collaborator; the engine only ever
// sees a best-effort text guess and degrades to no CAPTCHA support when no
// solver is wired in.

use crate::http::Session;
use crate::logging::RunLog;
use std::sync::Arc;
use tracing::warn;

/// Maps CAPTCHA image bytes to a best-effort text guess.
pub trait CaptchaSolver: Send + Sync {
    fn recognize(&self, image: &[u8]) -> Option<String>;
}

/// Download the CAPTCHA image and run it through the solver. Any failure is
/// non-fatal; the caller continues without a seed value.
pub async fn fetch_seed(
    session: &Session,
    solver: &Arc<dyn CaptchaSolver>,
    image_url: &str,
    log: &RunLog,
) -> Option<String> {
    match session.fetch_bytes(image_url).await {
        Ok((200, bytes)) => {
            let guess = solver.recognize(&bytes);
            match &guess {
                Some(text) => log.info(&format!("[*] CAPTCHA recognized as: {text}")),
                None => log.info("[*] CAPTCHA recognizer returned no guess"),
            }
            guess
        }
        Ok((status, _)) => {
            log.error(&format!(
                "[-] CAPTCHA image fetch returned status {status}: {image_url}"
            ));
            None
        }
        Err(e) => {
            warn!("CAPTCHA image fetch failed: {}", e);
            log.error(&format!("[-] CAPTCHA image fetch failed: {e}"));
            None
        }
    }
}
