// Baseline calibration and post-hoc verification. Both ride the same
// request path as real trial attempts so the failure fingerprint reflects
// identical header, proxy and delay policy.

use crate::captcha::CaptchaSolver;
use crate::config::AuditConfig;
use crate::error::CalibrationError;
use crate::http::Session;
use crate::logging::RunLog;
use crate::model::{Baseline, Candidate, Target};
use std::sync::Arc;
use tracing::debug;

/// Establish the failure fingerprint with two known-invalid probes. A
/// target whose failure page length is not deterministic cannot be probed
/// by length differencing.
pub async fn calibrate(
    session: &Session,
    target: &Target,
    config: &AuditConfig,
    log: &RunLog,
) -> Result<Baseline, CalibrationError> {
    let username = &config.probe.username;
    let password = &config.probe.password;

    let first = session.submit_login(target, username, password).await?.len();
    let second = session.submit_login(target, username, password).await?.len();

    if first != second {
        return Err(CalibrationError::UnstableBaseline { first, second });
    }

    log.info(&format!("[*] baseline fingerprint: {first} bytes"));
    Ok(Baseline { fingerprint: first })
}

/// Independently re-confirm a winning pair in a fresh session. The baseline
/// is re-probed rather than reused, guarding against transient-page false
/// positives from length differencing.
pub async fn verify(
    target: &Target,
    config: &AuditConfig,
    solver: Option<Arc<dyn CaptchaSolver>>,
    log: &RunLog,
    username: &str,
    password: &str,
) -> bool {
    let candidate = Candidate::new(username, password);
    let password = candidate.effective_password();

    let mut session = match Session::new(config) {
        Ok(session) => session,
        Err(e) => {
            log.error(&format!("[-] verification session failed: {e}"));
            return false;
        }
    };
    if let Some(solver) = solver {
        session = session.with_solver(solver);
    }

    let invalid = session
        .submit_login(target, &config.probe.username, &config.probe.password)
        .await;
    let attempt = session.submit_login(target, username, &password).await;

    match (invalid, attempt) {
        (Ok(invalid), Ok(attempt)) => {
            debug!(
                "verify: invalid={} candidate={} status={}",
                invalid.len(),
                attempt.len(),
                attempt.status
            );
            if invalid.len() == attempt.len() || attempt.status == 403 {
                return false;
            }
            true
        }
        (Err(e), _) | (_, Err(e)) => {
            log.error(&format!("[-] verification request failed: {e}"));
            false
        }
    }
}
