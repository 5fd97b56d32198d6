//! Integration tests for requirement resolution and route dispatch.
//!
//! These tests drive complete routes through `Route::handle` and count how
//! often each handler and authorizer runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use session_requirer::{
    Account, AuthorizeContext, Authorization, Authorizer, AuthorizerError, Bundle, Csrf, Denial,
    DenialKind, Field, MemorySessionStore, Outcome, RequestAdapter, Requirer, RequirementSet, Resolution,
    Route, Session, SessionMechanism, SessionProcurer, SessionStore, SessionValue, Source,
    ValidationErrorKind, ValidationFailures, CSRF_FIELD,
};

#[derive(Debug)]
struct FoodCritic {
    username: String,
}

#[derive(Debug)]
struct Admin;

/// Grants `FoodCritic` to sessions with a bound account.
struct CriticAuthorizer {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Authorizer<()> for CriticAuthorizer {
    type Capability = FoodCritic;

    async fn authorize(
        &self,
        cx: AuthorizeContext<'_, ()>,
    ) -> Result<Option<FoodCritic>, AuthorizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let accounts = cx
            .store
            .bound_accounts(cx.session)
            .await
            .map_err(|e| AuthorizerError::backend(e.to_string()))?;
        Ok(accounts.into_iter().next().map(|account| FoodCritic {
            username: account.username,
        }))
    }
}

/// Never grants `Admin`.
struct AdminAuthorizer {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Authorizer<()> for AdminAuthorizer {
    type Capability = Admin;

    async fn authorize(&self, _cx: AuthorizeContext<'_, ()>) -> Result<Option<Admin>, AuthorizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

#[derive(Default, Clone)]
struct Counters {
    primary: Arc<AtomicUsize>,
    invalid: Arc<AtomicUsize>,
    denied: Arc<AtomicUsize>,
}

impl Counters {
    fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.primary.load(Ordering::SeqCst),
            self.invalid.load(Ordering::SeqCst),
            self.denied.load(Ordering::SeqCst),
        )
    }
}

struct Harness {
    store: Arc<MemorySessionStore>,
    requirer: Requirer,
    critic_calls: Arc<AtomicUsize>,
    admin_calls: Arc<AtomicUsize>,
}

fn harness() -> Harness {
    let store = Arc::new(MemorySessionStore::new());
    let critic_calls = Arc::new(AtomicUsize::new(0));
    let admin_calls = Arc::new(AtomicUsize::new(0));
    let requirer = Requirer::builder(SessionProcurer::new(store.clone()), store.clone())
        .authorizer(CriticAuthorizer {
            calls: critic_calls.clone(),
        })
        .authorizer(AdminAuthorizer {
            calls: admin_calls.clone(),
        })
        .build()
        .expect("valid requirer");

    Harness {
        store,
        requirer,
        critic_calls,
        admin_calls,
    }
}

/// A route whose handlers count their invocations and describe what they saw.
fn counted_route(requirer: &Requirer, set: RequirementSet, counters: &Counters) -> Route<(), String> {
    let primary = counters.primary.clone();
    let invalid = counters.invalid.clone();
    let denied = counters.denied.clone();

    requirer
        .route(set)
        .handler(move |bundle: Bundle| {
            primary.fetch_add(1, Ordering::SeqCst);
            async move { bundle.names().collect::<Vec<_>>().join(",") }
        })
        .on_validation_failure(move |_req: &RequestAdapter, failures: ValidationFailures| {
            invalid.fetch_add(1, Ordering::SeqCst);
            failures.to_string()
        })
        .on_denied(move |_req: &RequestAdapter, denial: Denial| {
            denied.fetch_add(1, Ordering::SeqCst);
            denial.to_string()
        })
        .build()
        .expect("valid route")
}

fn secure_get(id: &str, query: &str) -> RequestAdapter {
    let mut request = RequestAdapter::new(id.to_string());
    request.set_secure(true);
    request.set_query_string(query);
    request
}

async fn cookie_session(store: &MemorySessionStore, request: &mut RequestAdapter) -> Arc<Session> {
    let session = store
        .new_session(true, SessionMechanism::Cookie)
        .await
        .expect("session created");
    request.add_cookie(
        "Requirer-Secure-Session".to_string(),
        session.identifier().expose_secret().clone(),
    );
    session
}

fn rating_set() -> RequirementSet {
    RequirementSet::builder()
        .require("name", Field::text())
        .require("rating", Field::integer_in(1..=5))
        .build()
        .expect("valid set")
}

#[tokio::test]
async fn out_of_range_rating_fails_validation() {
    let h = harness();
    let counters = Counters::default();
    let route = counted_route(&h.requirer, rating_set(), &counters);

    let mut request = secure_get("req-rate-6", "name=Pizza&rating=6");
    let outcome = route.handle(&mut request).await;

    match outcome {
        Outcome::ValidationFailed(page) => {
            assert!(page.contains("rating: value must be between 1 and 5"));
            assert!(!page.contains("name:"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
    assert_eq!(counters.snapshot(), (0, 1, 0));
}

#[tokio::test]
async fn valid_rating_resolves_bundle() {
    let h = harness();
    let set = rating_set();

    let mut request = secure_get("req-rate-4", "name=Pizza&rating=4");
    match h.requirer.resolve(&set, &mut request).await {
        Resolution::Resolved(bundle) => {
            assert_eq!(bundle.len(), 2);
            assert_eq!(bundle.text("name"), Some("Pizza"));
            assert_eq!(bundle.integer("rating"), Some(4));
        }
        other => panic!("expected resolved, got {:?}", other),
    }
}

#[tokio::test]
async fn valid_rating_invokes_primary_handler_once() {
    let h = harness();
    let counters = Counters::default();
    let route = counted_route(&h.requirer, rating_set(), &counters);

    let mut request = secure_get("req-rate-4", "name=Pizza&rating=4");
    let outcome = route.handle(&mut request).await;

    assert_eq!(outcome.into_response().as_deref(), Some("name,rating"));
    assert_eq!(counters.snapshot(), (1, 0, 0));
}

#[tokio::test]
async fn every_validation_error_is_collected() {
    let h = harness();
    let counters = Counters::default();
    let set = RequirementSet::builder()
        .require("first", Field::integer())
        .require("second", Field::text())
        .require("third", Field::integer_in(1..=5))
        .build()
        .unwrap();
    let route = counted_route(&h.requirer, set, &counters);

    let mut request = secure_get("req-multi", "first=abc&second=ok&third=0");
    let outcome = route.handle(&mut request).await;

    match outcome {
        Outcome::ValidationFailed(page) => {
            assert!(page.starts_with("2 invalid field(s)"));
            assert!(page.contains("first: expected an integer"));
            assert!(page.contains("third: value must be between 1 and 5"));
            assert!(!page.contains("second"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
    assert_eq!(counters.snapshot(), (0, 1, 0));
}

#[tokio::test]
async fn validation_failure_handler_receives_every_failure() {
    let h = harness();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_in_handler = seen.clone();

    let route = h
        .requirer
        .route(
            RequirementSet::builder()
                .require("a", Field::integer())
                .require("b", Field::integer())
                .build()
                .unwrap(),
        )
        .handler(|_bundle: Bundle| async {})
        .on_validation_failure(move |req: &RequestAdapter, failures: ValidationFailures| {
            assert_eq!(req.request_id(), "req-collect");
            let mut seen = seen_in_handler.lock().unwrap();
            for failure in &failures {
                seen.push((failure.field.clone(), failure.error.kind()));
            }
        })
        .on_denied(|_req: &RequestAdapter, _denial: Denial| {})
        .build()
        .unwrap();

    let mut request = secure_get("req-collect", "b=x");
    route.handle(&mut request).await;

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            ("a".to_string(), ValidationErrorKind::Required),
            ("b".to_string(), ValidationErrorKind::InvalidType),
        ]
    );
}

#[tokio::test]
async fn denial_takes_precedence_over_validation_failure() {
    let h = harness();
    let counters = Counters::default();
    let set = RequirementSet::builder()
        .require("rating", Field::integer_in(1..=5))
        .require("admin", Authorization::<Admin>::required())
        .build()
        .unwrap();
    let route = counted_route(&h.requirer, set, &counters);

    let mut request = secure_get("req-deny", "rating=99");
    let outcome = route.handle(&mut request).await;

    match outcome {
        Outcome::Denied(page) => assert!(page.contains("DENIED")),
        other => panic!("expected denial, got {:?}", other),
    }
    assert_eq!(counters.snapshot(), (0, 0, 1));
}

#[tokio::test]
async fn failing_prerequisite_skips_every_descriptor() {
    let h = harness();
    let counters = Counters::default();
    let set = RequirementSet::builder()
        .prerequisite("tls", SessionValue::require_confidential())
        .require("critic", Authorization::<FoodCritic>::required())
        .require("admin", Authorization::<Admin>::optional())
        .require("name", Field::text())
        .build()
        .unwrap();
    let route = counted_route(&h.requirer, set, &counters);

    let mut request = RequestAdapter::new("req-plain".to_string());
    let outcome = route.handle(&mut request).await;

    match outcome {
        Outcome::Denied(page) => assert!(page.contains("prerequisite failed (tls)")),
        other => panic!("expected denial, got {:?}", other),
    }
    assert_eq!(h.critic_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.admin_calls.load(Ordering::SeqCst), 0);
    assert_eq!(counters.snapshot(), (0, 0, 1));
}

#[tokio::test]
async fn optional_authorization_resolves_to_absent() {
    let h = harness();
    let set = RequirementSet::builder()
        .require("admin", Authorization::<Admin>::optional())
        .build()
        .unwrap();

    let absent = Arc::new(AtomicUsize::new(0));
    let absent_in_handler = absent.clone();
    let route = h
        .requirer
        .route(set)
        .handler(move |bundle: Bundle| {
            if bundle.is_absent("admin") && bundle.capability::<Admin>("admin").is_none() {
                absent_in_handler.fetch_add(1, Ordering::SeqCst);
            }
            async {}
        })
        .on_validation_failure(|_req: &RequestAdapter, _f: ValidationFailures| {})
        .on_denied(|_req: &RequestAdapter, _d: Denial| {})
        .build()
        .unwrap();

    let mut request = secure_get("req-optional", "");
    let outcome = route.handle(&mut request).await;

    assert!(outcome.is_resolved());
    assert_eq!(absent.load(Ordering::SeqCst), 1);
    assert_eq!(h.admin_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unauthenticated_critic_is_denied() {
    let h = harness();
    let counters = Counters::default();
    let set = RequirementSet::builder()
        .require("critic", Authorization::<FoodCritic>::required())
        .build()
        .unwrap();
    let route = counted_route(&h.requirer, set, &counters);

    let mut request = secure_get("req-critic", "");
    let outcome = route.handle(&mut request).await;

    match outcome {
        Outcome::Denied(page) => assert!(page.contains("FoodCritic DENIED (critic)")),
        other => panic!("expected denial, got {:?}", other),
    }
    assert_eq!(counters.snapshot(), (0, 0, 1));
}

#[tokio::test]
async fn bound_account_is_granted_critic_capability() {
    let h = harness();
    let set = RequirementSet::builder()
        .require("critic", Authorization::<FoodCritic>::required())
        .build()
        .unwrap();

    let mut request = secure_get("req-critic-ok", "");
    let session = cookie_session(&h.store, &mut request).await;
    h.store.bind_account(&session, Account::new("acct-7", "ada")).await;

    match h.requirer.resolve(&set, &mut request).await {
        Resolution::Resolved(bundle) => {
            let critic = bundle.capability::<FoodCritic>("critic").expect("granted");
            assert_eq!(critic.username, "ada");
        }
        other => panic!("expected resolved, got {:?}", other),
    }
}

#[tokio::test]
async fn repeated_authorizations_each_call_the_authorizer() {
    let h = harness();
    let set = RequirementSet::builder()
        .require("first", Authorization::<Admin>::optional())
        .require("second", Authorization::<Admin>::optional())
        .build()
        .unwrap();

    let mut request = secure_get("req-repeat", "");
    let resolution = h.requirer.resolve(&set, &mut request).await;

    assert!(matches!(resolution, Resolution::Resolved(_)));
    assert_eq!(h.admin_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unregistered_capability_is_denied() {
    let h = harness();
    let counters = Counters::default();
    let set = RequirementSet::builder()
        .require("cap", Authorization::<String>::required())
        .build()
        .unwrap();
    let route = counted_route(&h.requirer, set, &counters);

    let mut request = secure_get("req-unregistered", "");
    assert!(matches!(route.handle(&mut request).await, Outcome::Denied(_)));
}

#[tokio::test]
async fn csrf_protects_cookie_sessions() {
    let h = harness();
    let counters = Counters::default();
    let set = RequirementSet::builder()
        .prerequisite("csrf", Csrf::new())
        .require("name", Field::text().source(Source::Body))
        .build()
        .unwrap();
    let route = counted_route(&h.requirer, set, &counters);

    let mut forged = secure_get("req-forged", "");
    forged.set_method("POST");
    cookie_session(&h.store, &mut forged).await;
    forged.set_body("application/x-www-form-urlencoded", "name=Pizza");

    match route.handle(&mut forged).await {
        Outcome::Denied(page) => assert!(page.contains("CSRF TOKEN FAILURE")),
        other => panic!("expected denial, got {:?}", other),
    }

    let mut genuine = secure_get("req-genuine", "");
    genuine.set_method("POST");
    let session = cookie_session(&h.store, &mut genuine).await;
    genuine.set_body(
        "application/x-www-form-urlencoded",
        format!(
            "name=Pizza&{}={}",
            CSRF_FIELD,
            session.identifier().expose_secret()
        ),
    );

    assert!(route.handle(&mut genuine).await.is_resolved());
    assert_eq!(counters.snapshot(), (1, 0, 1));
}

#[tokio::test]
async fn csrf_denial_reports_kind() {
    let h = harness();
    let set = RequirementSet::builder()
        .prerequisite("csrf", Csrf::new())
        .build()
        .unwrap();

    let mut request = secure_get("req-wrong-token", "");
    request.set_method("POST");
    cookie_session(&h.store, &mut request).await;
    request.set_body(
        "application/x-www-form-urlencoded",
        format!("{}=not-the-session", CSRF_FIELD),
    );

    match h.requirer.resolve(&set, &mut request).await {
        Resolution::Denied(denial) => {
            assert_eq!(denial.kind, DenialKind::CrossSiteRequestForgery);
            assert_eq!(denial.descriptor, "csrf");
            assert!(!denial.message.contains("not-the-session"));
        }
        other => panic!("expected denial, got {:?}", other),
    }
}

#[tokio::test]
async fn header_sessions_are_exempt_from_csrf() {
    let h = harness();
    let set = RequirementSet::builder()
        .prerequisite("csrf", Csrf::new())
        .build()
        .unwrap();

    let session = h
        .store
        .new_session(true, SessionMechanism::Header)
        .await
        .unwrap();
    let mut request = secure_get("req-header", "");
    request.set_method("POST");
    request.add_header(
        "X-Auth-Token".to_string(),
        session.identifier().expose_secret().clone(),
    );

    let resolution = h.requirer.resolve(&set, &mut request).await;
    assert!(matches!(resolution, Resolution::Resolved(_)));
}

#[tokio::test]
async fn json_body_fields() {
    let h = harness();
    let set = rating_set();

    let mut request = secure_get("req-json", "");
    request.set_method("PUT");
    cookie_session(&h.store, &mut request).await;
    request.set_body("application/json", r#"{"name": "Pizza", "rating": 5}"#);

    match h.requirer.resolve(&set, &mut request).await {
        Resolution::Resolved(bundle) => {
            assert_eq!(bundle.text("name"), Some("Pizza"));
            assert_eq!(bundle.integer("rating"), Some(5));
        }
        other => panic!("expected resolved, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_json_body_fails_each_body_field() {
    let h = harness();
    let set = rating_set();

    let mut request = secure_get("req-bad-json", "");
    request.set_method("POST");
    cookie_session(&h.store, &mut request).await;
    request.set_body("application/json", "{\"name\": ");

    match h.requirer.resolve(&set, &mut request).await {
        Resolution::ValidationFailed(failures) => {
            assert_eq!(failures.len(), 2);
            for failure in &failures {
                assert_eq!(failure.error.kind(), ValidationErrorKind::MalformedBody);
                assert_eq!(failure.error.message(), "request body could not be decoded");
            }
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[tokio::test]
async fn session_unavailable_runs_no_handler() {
    let h = harness();
    let counters = Counters::default();
    let route = counted_route(&h.requirer, rating_set(), &counters);

    let mut request = secure_get("req-no-session", "name=Pizza&rating=4");
    request.set_method("POST");

    assert!(matches!(
        route.handle(&mut request).await,
        Outcome::SessionUnavailable(_)
    ));
    assert_eq!(counters.snapshot(), (0, 0, 0));
}

#[tokio::test]
async fn new_session_cookie_is_set_on_first_get() {
    let h = harness();
    let set = RequirementSet::builder()
        .require("session", SessionValue::session())
        .require("confidential", SessionValue::is_confidential())
        .build()
        .unwrap();

    let mut request = secure_get("req-first-visit", "");
    match h.requirer.resolve(&set, &mut request).await {
        Resolution::Resolved(bundle) => {
            let session = bundle.session("session").expect("session injected");
            assert_eq!(bundle.bool("confidential"), Some(true));
            let cookie = &request.response_cookies()[0];
            assert_eq!(&cookie.value, session.identifier().expose_secret());
            assert!(cookie.header_value().contains("Secure; HttpOnly"));
        }
        other => panic!("expected resolved, got {:?}", other),
    }
}

struct FailingAuthorizer;

#[async_trait]
impl Authorizer<()> for FailingAuthorizer {
    type Capability = FoodCritic;

    async fn authorize(
        &self,
        _cx: AuthorizeContext<'_, ()>,
    ) -> Result<Option<FoodCritic>, AuthorizerError> {
        Err(AuthorizerError::backend("database offline"))
    }
}

struct HangingAuthorizer;

#[async_trait]
impl Authorizer<()> for HangingAuthorizer {
    type Capability = Admin;

    async fn authorize(&self, _cx: AuthorizeContext<'_, ()>) -> Result<Option<Admin>, AuthorizerError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Some(Admin))
    }
}

#[tokio::test]
async fn authorizer_failure_is_session_unavailable() {
    let store = Arc::new(MemorySessionStore::new());
    let requirer = Requirer::builder(SessionProcurer::new(store.clone()), store)
        .authorizer(FailingAuthorizer)
        .build()
        .unwrap();
    let counters = Counters::default();
    let set = RequirementSet::builder()
        .require("critic", Authorization::<FoodCritic>::optional())
        .build()
        .unwrap();
    let route = counted_route(&requirer, set, &counters);

    let mut request = secure_get("req-db-down", "");
    match route.handle(&mut request).await {
        Outcome::SessionUnavailable(error) => assert!(error.to_string().contains("database offline")),
        other => panic!("expected session unavailable, got {:?}", other),
    }
    assert_eq!(counters.snapshot(), (0, 0, 0));
}

#[tokio::test]
async fn hung_authorizer_times_out() {
    let store = Arc::new(MemorySessionStore::new());
    let requirer = Requirer::builder(SessionProcurer::new(store.clone()), store)
        .authorizer(HangingAuthorizer)
        .authorization_timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let set = RequirementSet::builder()
        .require("admin", Authorization::<Admin>::required())
        .build()
        .unwrap();

    let mut request = secure_get("req-hang", "");
    let resolution = requirer.resolve(&set, &mut request).await;

    match resolution {
        Resolution::SessionUnavailable(error) => {
            assert!(error.to_string().contains("timed out after 20ms"))
        }
        other => panic!("expected session unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn requirer_prerequisites_apply_to_every_route() {
    let store = Arc::new(MemorySessionStore::new());
    let requirer = Requirer::builder(SessionProcurer::new(store.clone()), store)
        .prerequisite("tls", SessionValue::require_confidential())
        .build()
        .unwrap();
    let counters = Counters::default();
    let first = counted_route(&requirer, rating_set(), &counters);
    let second = counted_route(
        &requirer,
        RequirementSet::builder().build().unwrap(),
        &counters,
    );

    let mut plain = RequestAdapter::new("req-plain-1".to_string());
    plain.set_query_string("name=Pizza&rating=4");
    assert!(matches!(first.handle(&mut plain).await, Outcome::Denied(_)));

    let mut plain = RequestAdapter::new("req-plain-2".to_string());
    assert!(matches!(second.handle(&mut plain).await, Outcome::Denied(_)));

    let mut secure = secure_get("req-secure", "");
    assert!(second.handle(&mut secure).await.is_resolved());
    assert_eq!(counters.snapshot(), (1, 0, 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn routes_are_shared_across_concurrent_requests() {
    let h = harness();
    let counters = Counters::default();
    let route = Arc::new(counted_route(&h.requirer, rating_set(), &counters));

    let mut tasks = Vec::new();
    for n in 0..16 {
        let route = route.clone();
        tasks.push(tokio::spawn(async move {
            let rating = if n % 2 == 0 { 4 } else { 9 };
            let mut request = secure_get(&format!("req-{}", n), &format!("name=Pie&rating={}", rating));
            route.handle(&mut request).await.is_resolved()
        }));
    }

    let mut resolved = 0;
    for task in tasks {
        if task.await.expect("task completed") {
            resolved += 1;
        }
    }

    assert_eq!(resolved, 8);
    assert_eq!(counters.snapshot(), (8, 8, 0));
}

async fn post_rating(h: &Harness, content_type: &str, body: String) -> Option<i64> {
    let set = RequirementSet::builder()
        .require("rating", Field::integer_in(1..=5))
        .build()
        .unwrap();

    let mut request = secure_get("req-post-rating", "rating=1");
    request.set_method("POST");
    cookie_session(&h.store, &mut request).await;
    request.set_body(content_type, body);

    match h.requirer.resolve(&set, &mut request).await {
        Resolution::Resolved(bundle) => bundle.integer("rating"),
        other => panic!("expected resolved, got {:?}", other),
    }
}

#[tokio::test]
async fn form_body_overrides_query_argument() {
    let h = harness();
    let rating = post_rating(&h, "application/x-www-form-urlencoded", "rating=5".to_string()).await;
    assert_eq!(rating, Some(5));
}

#[tokio::test]
async fn json_body_ignores_query_argument() {
    let h = harness();
    let rating = post_rating(&h, "application/json", r#"{"rating": 5}"#.to_string()).await;
    assert_eq!(rating, Some(5));
}

#[tokio::test]
async fn multipart_form_fields_are_resolved() {
    let h = harness();
    let body = "--X\r\n\
                Content-Disposition: form-data; name=\"rating\"\r\n\r\n\
                5\r\n\
                --X--\r\n"
        .to_string();
    let rating = post_rating(&h, "multipart/form-data; boundary=X", body).await;
    assert_eq!(rating, Some(5));
}
