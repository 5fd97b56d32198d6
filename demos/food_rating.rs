//! Food rating demonstration.
//!
//! This example walks one browser session through a small food-rating site:
//! 1. A first visit issues a session cookie and rates a dish
//! 2. An out-of-range rating reaches the validation-failure handler
//! 3. A critic-only page denies an anonymous session
//! 4. After logging in, the same session is granted the `FoodCritic` capability
//! 5. A POST without the CSRF token is refused; with it, it succeeds
//!
//! Run with: `cargo run --example food_rating`

use std::sync::Arc;

use async_trait::async_trait;
use session_requirer::{
    Account, AuthorizeContext, Authorization, Authorizer, AuthorizerError, Bundle, Csrf, Denial,
    Field, MemorySessionStore, Outcome, RequestAdapter, Requirer, RequirementSet, Route, Source,
    SessionProcurer, SessionValue, TextSanitizer, ValidationFailures, CSRF_FIELD,
};

/// Capability held by logged-in food critics.
#[derive(Debug)]
struct FoodCritic {
    username: String,
}

/// Grants `FoodCritic` to any session with a bound account.
struct CriticAuthorizer;

#[async_trait]
impl Authorizer<()> for CriticAuthorizer {
    type Capability = FoodCritic;

    async fn authorize(
        &self,
        cx: AuthorizeContext<'_, ()>,
    ) -> Result<Option<FoodCritic>, AuthorizerError> {
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

fn failure_page(_req: &RequestAdapter, failures: ValidationFailures) -> String {
    let mut page = String::from("400 Please fix the following:");
    for failure in &failures {
        page.push_str(&format!("\n  - {}: {}", failure.field, failure.error.message()));
    }
    page
}

fn denied_page(_req: &RequestAdapter, denial: Denial) -> String {
    format!("403 {}", denial)
}

fn show(outcome: Outcome<String>) {
    match outcome {
        Outcome::SessionUnavailable(e) => println!("500 {}", e),
        Outcome::Cancelled => println!("499 cancelled"),
        other => {
            if let Some(page) = other.into_response() {
                println!("{}", page);
            }
        }
    }
}

fn browser_request(id: &str, cookie: Option<&(String, String)>) -> RequestAdapter {
    let mut request = RequestAdapter::new(id.to_string());
    request.set_secure(true);
    if let Some((name, value)) = cookie {
        request.add_cookie(name.clone(), value.clone());
    }
    request
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    println!("=== Food Rating Example ===\n");

    let store = Arc::new(MemorySessionStore::new());
    let requirer = Requirer::builder(SessionProcurer::new(store.clone()), store.clone())
        .authorizer(CriticAuthorizer)
        .build()
        .expect("valid requirer");

    let rate: Route<(), String> = requirer
        .route(
            RequirementSet::builder()
                .require(
                    "name",
                    Field::text().validate(TextSanitizer::default_limits()),
                )
                .require("rating", Field::integer_in(1..=5))
                .build()
                .expect("valid requirements"),
        )
        .handler(|bundle: Bundle| async move {
            format!(
                "200 Thanks! {} rated {}/5",
                bundle.text("name").unwrap_or_default(),
                bundle.integer("rating").unwrap_or_default()
            )
        })
        .on_validation_failure(failure_page)
        .on_denied(denied_page)
        .build()
        .expect("valid route");

    let review: Route<(), String> = requirer
        .route(
            RequirementSet::builder()
                .prerequisite("csrf", Csrf::new())
                .require("critic", Authorization::<FoodCritic>::required())
                .require("review", Field::text().source(Source::Body))
                .build()
                .expect("valid requirements"),
        )
        .handler(|bundle: Bundle| async move {
            let critic = bundle
                .capability::<FoodCritic>("critic")
                .map(|c| c.username.clone())
                .unwrap_or_default();
            format!(
                "200 Review by {} published: {:?}",
                critic,
                bundle.text("review").unwrap_or_default()
            )
        })
        .on_validation_failure(failure_page)
        .on_denied(denied_page)
        .build()
        .expect("valid route");

    let critic_page: Route<(), String> = requirer
        .route(
            RequirementSet::builder()
                .require("session", SessionValue::session())
                .require("critic", Authorization::<FoodCritic>::required())
                .build()
                .expect("valid requirements"),
        )
        .handler(|bundle: Bundle| async move {
            let critic = bundle
                .capability::<FoodCritic>("critic")
                .map(|c| c.username.clone())
                .unwrap_or_default();
            format!("200 Welcome back, {}", critic)
        })
        .on_validation_failure(failure_page)
        .on_denied(denied_page)
        .build()
        .expect("valid route");

    let accounts = store.clone();
    let login: Route<(), String> = requirer
        .route(
            RequirementSet::builder()
                .prerequisite("csrf", Csrf::new())
                .require("session", SessionValue::session())
                .require("username", Field::text().source(Source::Body))
                .build()
                .expect("valid requirements"),
        )
        .handler(move |bundle: Bundle| {
            let accounts = accounts.clone();
            async move {
                let username = bundle.text("username").unwrap_or_default().to_string();
                match bundle.session("session") {
                    Some(session) => {
                        let account = Account::new(format!("acct-{}", username), username.clone());
                        accounts.bind_account(session, account).await;
                        format!("200 Logged in as {}", username)
                    }
                    None => "500 no session".to_string(),
                }
            }
        })
        .on_validation_failure(failure_page)
        .on_denied(denied_page)
        .build()
        .expect("valid route");

    // Scenario 1: First visit
    println!("--- Scenario 1: First Visit Rates a Dish ---");
    let mut request = browser_request("req-001", None);
    request.set_query_string("name=Pizza&rating=4");
    show(rate.handle(&mut request).await);

    let cookie = match request.response_cookies().first() {
        Some(cookie) => {
            println!("Set-Cookie: {}", cookie.header_value().replace(&cookie.value, "<redacted>"));
            (cookie.name.clone(), cookie.value.clone())
        }
        None => {
            eprintln!("no session cookie was issued");
            return;
        }
    };

    // Scenario 2: Invalid rating
    println!("\n--- Scenario 2: Out-of-Range Rating ---");
    let mut request = browser_request("req-002", Some(&cookie));
    request.set_query_string("name=Pizza&rating=6");
    show(rate.handle(&mut request).await);

    // Scenario 3: Anonymous session on a critic page
    println!("\n--- Scenario 3: Critic Page Without Login ---");
    let mut request = browser_request("req-003", Some(&cookie));
    show(critic_page.handle(&mut request).await);

    // Scenario 4: Log in, then retry
    println!("\n--- Scenario 4: Critic Page After Login ---");
    let mut request = browser_request("req-004", Some(&cookie));
    request.set_method("POST");
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("username", "ada")
        .append_pair(CSRF_FIELD, &cookie.1)
        .finish();
    request.set_body("application/x-www-form-urlencoded", body);
    show(login.handle(&mut request).await);

    let mut request = browser_request("req-005", Some(&cookie));
    show(critic_page.handle(&mut request).await);

    // Scenario 5: CSRF protection on a POST
    println!("\n--- Scenario 5: Publishing a Review ---");
    let mut forged = browser_request("req-006", Some(&cookie));
    forged.set_method("POST");
    forged.set_body("application/x-www-form-urlencoded", "review=Terrible!");
    println!("Without CSRF token:");
    show(review.handle(&mut forged).await);

    let mut genuine = browser_request("req-007", Some(&cookie));
    genuine.set_method("POST");
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("review", "Crisp crust, generous toppings.")
        .append_pair(CSRF_FIELD, &cookie.1)
        .finish();
    genuine.set_body("application/x-www-form-urlencoded", body);
    println!("With CSRF token:");
    show(review.handle(&mut genuine).await);

    println!("\n=== Example Complete ===");
}
