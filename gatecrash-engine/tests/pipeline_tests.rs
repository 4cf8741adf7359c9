use gatecrash_engine::captcha::CaptchaSolver;
use gatecrash_engine::config::AuditConfig;
use gatecrash_engine::error::CalibrationError;
use gatecrash_engine::http::Session;
use gatecrash_engine::logging::RunLog;
use gatecrash_engine::model::{CmsSignature, Target, TargetOutcome};
use gatecrash_engine::probe;
use gatecrash_engine::Orchestrator;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const LOGIN_PAGE: &str = r#"<html><body>
    <form action="/do_login.php" method="post">
        <input name="user" value="">
        <input name="pass" value="">
    </form>
</body></html>"#;

const FAIL_PAGE: &str = "<html>bad credentials, padding padding</html>";
const WELCOME_PAGE: &str = "<html>welcome to the control panel, plenty of content</html>";

fn test_config() -> AuditConfig {
    let mut config = AuditConfig::default();
    config.timing.delay_ms = 0;
    config.timing.request_timeout_secs = 5;
    config.dictionary.base_usernames = vec!["admin".to_string()];
    config.dictionary.base_passwords = vec!["123456".to_string(), "letmein".to_string()];
    config
}

async fn serve_login_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(server)
        .await;
}

/// Answers the login POST with a success page only when the submitted form
/// body carries the secret fragment; every other attempt gets the same
/// fixed-length failure page.
struct LoginResponder {
    secret: &'static str,
    success: ResponseTemplate,
}

impl LoginResponder {
    fn new(secret: &'static str) -> Self {
        Self {
            secret,
            success: ResponseTemplate::new(200).set_body_string(WELCOME_PAGE),
        }
    }

    fn with_success(secret: &'static str, success: ResponseTemplate) -> Self {
        Self { secret, success }
    }
}

impl Respond for LoginResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body);
        if body.contains(self.secret) {
            self.success.clone()
        } else {
            ResponseTemplate::new(200).set_body_string(FAIL_PAGE)
        }
    }
}

async fn mount_login_responder(server: &MockServer, responder: LoginResponder) {
    Mock::given(method("POST"))
        .and(path("/do_login.php"))
        .respond_with(responder)
        .mount(server)
        .await;
}

fn orchestrator(config: AuditConfig) -> Orchestrator {
    Orchestrator::new(Arc::new(config), RunLog::discard())
}

async fn post_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .count()
}

#[tokio::test]
async fn weak_credentials_are_discovered_and_verified() {
    let server = MockServer::start().await;
    serve_login_page(&server).await;
    mount_login_responder(&server, LoginResponder::new("pass=letmein")).await;

    let outcome = orchestrator(test_config())
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;

    assert_eq!(
        outcome,
        TargetOutcome::Cracked {
            username: "admin".to_string(),
            password: "letmein".to_string()
        }
    );
}

#[tokio::test]
async fn exhausted_dictionary_is_not_found() {
    let server = MockServer::start().await;
    serve_login_page(&server).await;
    mount_login_responder(&server, LoginResponder::new("pass=nobody-has-this")).await;

    let outcome = orchestrator(test_config())
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;

    assert_eq!(outcome, TargetOutcome::NotFound);
}

/// A 403 on the verification pass rejects the pair even though the trial
/// phase saw a length difference.
#[tokio::test]
async fn forbidden_verification_rejects_the_hit() {
    let server = MockServer::start().await;
    serve_login_page(&server).await;
    mount_login_responder(
        &server,
        LoginResponder::with_success(
            "pass=letmein",
            ResponseTemplate::new(403).set_body_string("<html>blocked by the gateway</html>"),
        ),
    )
    .await;

    let outcome = orchestrator(test_config())
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;

    assert_eq!(outcome, TargetOutcome::NotFound);
}

fn demo_target(server: &MockServer) -> Target {
    Target {
        url: format!("{}/login.php", server.uri()),
        submit_path: format!("{}/do_login.php", server.uri()),
        username_field: "user".to_string(),
        password_field: "pass".to_string(),
        form_fields: vec![
            ("user".to_string(), "0000".to_string()),
            ("pass".to_string(), "0000".to_string()),
        ],
        captcha_field: None,
        captcha_image_url: None,
        cms_profile: None,
    }
}

#[tokio::test]
async fn stable_failure_page_calibrates() {
    let server = MockServer::start().await;
    mount_login_responder(&server, LoginResponder::new("pass=never")).await;

    let config = test_config();
    let session = Session::new(&config).unwrap();
    let log = RunLog::discard();

    let baseline = probe::calibrate(&session, &demo_target(&server), &config, &log)
        .await
        .unwrap();
    assert_eq!(baseline.fingerprint, FAIL_PAGE.len());
}

/// Alternating failure-page lengths make length differencing useless; the
/// target must be abandoned during calibration.
struct JitteryResponder {
    hits: AtomicUsize,
}

impl Respond for JitteryResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.hits.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_string(format!("nonce {n} padding {}", "x".repeat(n)))
    }
}

#[tokio::test]
async fn unstable_failure_page_aborts_calibration() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/do_login.php"))
        .respond_with(JitteryResponder {
            hits: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let config = test_config();
    let session = Session::new(&config).unwrap();
    let log = RunLog::discard();

    let err = probe::calibrate(&session, &demo_target(&server), &config, &log)
        .await
        .unwrap_err();
    assert!(matches!(err, CalibrationError::UnstableBaseline { .. }));
}

#[tokio::test]
async fn death_marker_abandons_the_target_early() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html>lockcms-panel
            <form action="/do_login.php"><input name="user"><input name="pass"></form></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/do_login.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("account locked, come back later"))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.cms = vec![CmsSignature {
        name: "lockcms".to_string(),
        keyword: "lockcms-panel".to_string(),
        success_marker: None,
        death_marker: Some("account locked".to_string()),
        sql_injection_eligible: false,
        advisory_note: None,
    }];

    let outcome = orchestrator(config)
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;
    assert_eq!(outcome, TargetOutcome::NotFound);

    // Two calibration probes plus a single trial attempt; the marker stops
    // the search before the rest of the dictionary is dispatched.
    assert_eq!(post_count(&server).await, 3);
}

/// With no hit from the normal dictionary and the payload list forced on,
/// the trial phase reruns with the SQL injection pairs.
#[tokio::test]
async fn sql_injection_payloads_rerun_after_exhaustion() {
    let server = MockServer::start().await;
    serve_login_page(&server).await;
    mount_login_responder(&server, LoginResponder::new("pass=sqlipwn")).await;

    let mut config = test_config();
    config.dictionary.sql_injection.always = true;
    config.dictionary.sql_injection.payloads = vec!["sqlipwn".to_string()];

    let outcome = orchestrator(config)
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;

    assert_eq!(
        outcome,
        TargetOutcome::Cracked {
            username: "sqlipwn".to_string(),
            password: "sqlipwn".to_string()
        }
    );
}

/// Budget expiry must also stop the concurrent trial workers: once the
/// orchestrator reports `Timeout`, no further attempts may reach the target.
#[tokio::test]
async fn timeout_aborts_inflight_trial_workers() {
    let server = MockServer::start().await;
    serve_login_page(&server).await;
    Mock::given(method("POST"))
        .and(path("/do_login.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(FAIL_PAGE)
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let mut config = test_config();
    config.timing.max_workers = 4;
    config.timing.target_budget_secs = 1;
    // Far more work than fits in the budget
    config.dictionary.base_passwords = (0..40).map(|i| format!("pw{i}")).collect();

    let outcome = orchestrator(config)
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;
    assert_eq!(outcome, TargetOutcome::Timeout);

    // Give any request that was already on the wire time to land, then
    // confirm the count stays put.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let settled = post_count(&server).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(post_count(&server).await, settled);
}

#[tokio::test]
async fn slow_target_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(LOGIN_PAGE)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut config = test_config();
    config.timing.target_budget_secs = 1;

    let outcome = orchestrator(config)
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;
    assert_eq!(outcome, TargetOutcome::Timeout);
}

#[tokio::test]
async fn analysis_failure_becomes_a_failed_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nothing here</html>"))
        .mount(&server)
        .await;

    let outcome = orchestrator(test_config())
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;
    assert!(matches!(outcome, TargetOutcome::Failed(_)));
}

/// One bad target must not sink the rest of the batch.
#[tokio::test]
async fn batch_continues_past_failures() {
    let server = MockServer::start().await;
    serve_login_page(&server).await;
    mount_login_responder(&server, LoginResponder::new("pass=letmein")).await;
    Mock::given(method("GET"))
        .and(path("/empty.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>no form</html>"))
        .mount(&server)
        .await;

    let urls = vec![
        format!("{}/empty.php", server.uri()),
        format!("{}/login.php", server.uri()),
    ];
    let outcomes = orchestrator(test_config()).run_batch(&urls).await;

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0].1, TargetOutcome::Failed(_)));
    assert_eq!(
        outcomes[1].1,
        TargetOutcome::Cracked {
            username: "admin".to_string(),
            password: "letmein".to_string()
        }
    );
}

#[tokio::test]
async fn concurrent_trials_pin_the_winning_pair() {
    let server = MockServer::start().await;
    serve_login_page(&server).await;
    mount_login_responder(&server, LoginResponder::new("pass=letmein")).await;

    let mut config = test_config();
    config.timing.max_workers = 4;
    config.dictionary.base_passwords = vec![
        "123456".to_string(),
        "password".to_string(),
        "qwerty".to_string(),
        "letmein".to_string(),
        "111111".to_string(),
        "abc123".to_string(),
        "admin888".to_string(),
        "root".to_string(),
    ];

    let outcome = orchestrator(config)
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;

    assert_eq!(
        outcome,
        TargetOutcome::Cracked {
            username: "admin".to_string(),
            password: "letmein".to_string()
        }
    );
}

/// The `{user}` placeholder expands before the form is sent.
#[tokio::test]
async fn placeholder_passwords_expand_on_the_wire() {
    let server = MockServer::start().await;
    serve_login_page(&server).await;
    mount_login_responder(&server, LoginResponder::new("pass=admin888")).await;

    let mut config = test_config();
    config.dictionary.base_passwords = vec!["{user}888".to_string()];

    let outcome = orchestrator(config)
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;

    assert_eq!(
        outcome,
        TargetOutcome::Cracked {
            username: "admin".to_string(),
            password: "admin888".to_string()
        }
    );
}

/// Hands out a different seed on every recognition, so reuse shows up as a
/// duplicate value on the wire.
struct CountingSolver {
    seeds: AtomicUsize,
}

impl CaptchaSolver for CountingSolver {
    fn recognize(&self, _image: &[u8]) -> Option<String> {
        Some(format!("seed{}", self.seeds.fetch_add(1, Ordering::SeqCst)))
    }
}

/// CAPTCHA seeds are single-use: every login POST, calibration probes
/// included, must carry a freshly recognized value.
#[tokio::test]
async fn captcha_seed_is_refreshed_per_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html>please enter the captcha
            <form action="/do_login.php">
                <input name="user" value="">
                <input name="pass" value="">
                <input name="captcha_code" value="">
                <img src="/captcha_img.php">
            </form></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/captcha_img.php"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
        .mount(&server)
        .await;
    mount_login_responder(&server, LoginResponder::new("pass=nobody-has-this")).await;

    let outcome = orchestrator(test_config())
        .with_solver(Arc::new(CountingSolver {
            seeds: AtomicUsize::new(0),
        }))
        .run_target(1, &format!("{}/login.php", server.uri()))
        .await;
    assert_eq!(outcome, TargetOutcome::NotFound);

    let seeds: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| {
            let body = String::from_utf8_lossy(&r.body).to_string();
            body.split('&')
                .find(|pair| pair.starts_with("captcha_code="))
                .expect("attempt missing CAPTCHA field")
                .to_string()
        })
        .collect();

    // Two calibration probes plus two trial attempts, no seed used twice
    assert_eq!(seeds.len(), 4);
    let distinct: HashSet<&String> = seeds.iter().collect();
    assert_eq!(distinct.len(), seeds.len());
}
