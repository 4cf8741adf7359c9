use crate::config::AuditConfig;
use crate::http::{PageResponse, Session};
use crate::logging::RunLog;
use crate::model::{AttemptRecord, Baseline, Candidate, Target, Verdict};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Classify one attempt's response. Fixed precedence, first match wins:
/// CMS success marker, CMS death marker, failure keyword, field-name echo,
/// length differencing.
pub fn classify(
    target: &Target,
    baseline: Baseline,
    fail_words: &[String],
    response: &PageResponse,
    username: &str,
    password: &str,
) -> Verdict {
    let haystack = response.haystack();

    if let Some(ref cms) = target.cms_profile {
        if let Some(ref marker) = cms.success_marker
            && haystack.contains(marker.as_str())
        {
            return Verdict::Found {
                username: username.to_string(),
                password: password.to_string(),
            };
        }
        if let Some(ref marker) = cms.death_marker
            && haystack.contains(marker.as_str())
        {
            return Verdict::Stop;
        }
    }

    if fail_words.iter().any(|word| haystack.contains(word.as_str())) {
        return Verdict::Inconclusive;
    }

    // Both field names echoed back usually means the form was re-rendered
    // rather than submitted. Heuristic; see design notes.
    if response.body.contains(&target.username_field)
        && response.body.contains(&target.password_field)
    {
        return Verdict::Inconclusive;
    }

    if response.len() != baseline.fingerprint {
        return Verdict::Found {
            username: username.to_string(),
            password: password.to_string(),
        };
    }

    Verdict::Inconclusive
}

/// Iterates candidate pairs against one target and stops on the first
/// decisive signal. Sequential by default; a worker pool when the
/// configured concurrency is above one.
pub struct TrialEngine<'a> {
    session: &'a Session,
    target: &'a Target,
    baseline: Baseline,
    config: &'a AuditConfig,
    log: &'a RunLog,
}

impl<'a> TrialEngine<'a> {
    pub fn new(
        session: &'a Session,
        target: &'a Target,
        baseline: Baseline,
        config: &'a AuditConfig,
        log: &'a RunLog,
    ) -> Self {
        Self {
            session,
            target,
            baseline,
            config,
            log,
        }
    }

    /// Returns the winning pair, or `None` when the dictionary exhausts or
    /// a death marker aborts the search.
    pub async fn run(&self, usernames: &[String], passwords: &[String]) -> Option<(String, String)> {
        let workers = self.config.timing.max_workers;
        if workers > 1 {
            self.log.info(&format!(
                "[*] trialing {} with {} workers",
                self.target.url, workers
            ));
            self.run_concurrent(usernames, passwords, workers).await
        } else {
            self.run_sequential(usernames, passwords).await
        }
    }

    /// Username-major, password-minor order.
    async fn run_sequential(
        &self,
        usernames: &[String],
        passwords: &[String],
    ) -> Option<(String, String)> {
        let total = (usernames.len() * passwords.len()) as u64;
        let mut attempt = 0u64;

        for username in usernames {
            for password in passwords {
                attempt += 1;
                let candidate = Candidate::new(username.clone(), password.clone());
                let password = candidate.effective_password();
                self.report_progress(&AttemptRecord {
                    number: attempt,
                    total,
                    username: username.clone(),
                    password: password.clone(),
                });

                let response = match self.session.submit_login(self.target, username, &password).await
                {
                    Ok(response) => response,
                    Err(e) => {
                        self.log.error(&format!("[-] request failed: {e}"));
                        continue;
                    }
                };

                match classify(
                    self.target,
                    self.baseline,
                    &self.config.fail_words,
                    &response,
                    username,
                    &password,
                ) {
                    Verdict::Found { username, password } => return Some((username, password)),
                    Verdict::Stop => {
                        self.log
                            .info(&format!("[-] {} raised a death marker, stopping", self.target.url));
                        return None;
                    }
                    Verdict::Inconclusive => {}
                }
            }
        }
        None
    }

    /// All pairs are enumerated up front and partitioned across workers; no
    /// ordering guarantee among completions. The first decisive signal is
    /// pinned and never overwritten; the cancellation flag stops dispatch of
    /// new attempts while in-flight ones run to completion.
    async fn run_concurrent(
        &self,
        usernames: &[String],
        passwords: &[String],
        workers: usize,
    ) -> Option<(String, String)> {
        let candidates: Vec<Candidate> = usernames
            .iter()
            .flat_map(|username| {
                passwords
                    .iter()
                    .map(move |password| Candidate::new(username.clone(), password.clone()))
            })
            .collect();
        let total = candidates.len() as u64;

        let cancel = Arc::new(AtomicBool::new(false));
        let first_hit: Arc<Mutex<Option<(String, String)>>> = Arc::new(Mutex::new(None));
        let progress = Arc::new(AtomicU64::new(0));
        let semaphore = Arc::new(Semaphore::new(workers));

        let per_worker = candidates.len().div_ceil(workers);
        let mut pool: JoinSet<()> = JoinSet::new();

        for worker_id in 0..workers {
            let start = worker_id * per_worker;
            if start >= candidates.len() {
                break;
            }
            let end = usize::min(start + per_worker, candidates.len());
            let slice = candidates[start..end].to_vec();

            let session = self.session.clone();
            let target = self.target.clone();
            let baseline = self.baseline;
            let fail_words = self.config.fail_words.clone();
            let rotation_interval = self.config.timing.rotation_interval;
            let log = self.log.clone();
            let cancel = cancel.clone();
            let first_hit = first_hit.clone();
            let progress = progress.clone();
            let semaphore = semaphore.clone();

            pool.spawn(async move {
                debug!("trial worker {} started ({} candidates)", worker_id, slice.len());
                for candidate in slice {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(_permit) = semaphore.acquire().await else {
                        break;
                    };

                    let attempt = progress.fetch_add(1, Ordering::SeqCst) + 1;
                    let password = candidate.effective_password();
                    if attempt % rotation_interval == 1 {
                        log.info(&format!("[*] attempt {attempt}: rotating request identity"));
                    }
                    let record = AttemptRecord {
                        number: attempt,
                        total,
                        username: candidate.username.clone(),
                        password: password.clone(),
                    };
                    log.info(&record.progress_line(&target.url));

                    let response = match session
                        .submit_login(&target, &candidate.username, &password)
                        .await
                    {
                        Ok(response) => response,
                        Err(e) => {
                            log.error(&format!("[-] request failed: {e}"));
                            continue;
                        }
                    };

                    match classify(
                        &target,
                        baseline,
                        &fail_words,
                        &response,
                        &candidate.username,
                        &password,
                    ) {
                        Verdict::Found { username, password } => {
                            let mut slot = first_hit.lock().await;
                            if slot.is_none() {
                                *slot = Some((username, password));
                            }
                            cancel.store(true, Ordering::SeqCst);
                            break;
                        }
                        Verdict::Stop => {
                            log.info(&format!("[-] {} raised a death marker, stopping", target.url));
                            cancel.store(true, Ordering::SeqCst);
                            break;
                        }
                        Verdict::Inconclusive => {}
                    }
                }
                debug!("trial worker {} finished", worker_id);
            });
        }

        // The pool lives inside the pipeline future: dropping it (target
        // budget expiry) aborts every worker, so nothing keeps submitting
        // against a target that was already reported.
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                warn!("trial worker panicked");
            }
        }

        let hit = first_hit.lock().await.take();
        hit
    }

    fn report_progress(&self, record: &AttemptRecord) {
        if record.number % self.config.timing.rotation_interval == 1 {
            self.log.info(&format!(
                "[*] attempt {}: rotating request identity",
                record.number
            ));
        }
        self.log.info(&record.progress_line(&self.target.url));
    }
}
