use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;

use studymate::{
    config::Config,
    error::Result as AppResult,
    models::user::Role,
    repositories::store::UserRepository,
    routes::build_router,
    services::payments::PaymentGateway,
    state::AppState,
};

const SECRET: &[u8] = b"integration_test_secret_0123456789abcdef";

struct FakeGateway;

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment_intent(&self, amount: i64, currency: &str) -> AppResult<String> {
        Ok(format!("pi_{}_{}_secret", amount, currency))
    }
}

// Shared test context
struct TestContext {
    state: AppState,
    base_url: String,
}

impl TestContext {
    async fn spawn() -> Self {
        let state = AppState::in_memory(Config::for_memory(SECRET), Arc::new(FakeGateway));
        let app = build_router(state.clone()).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            state,
            base_url: format!("http://{}", addr),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A cookie-holding client signed in as `email`.
    async fn sign_in(&self, email: &str) -> reqwest::Client {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .unwrap();

        let saved = client
            .post(self.url("/users"))
            .json(&json!({ "email": email, "name": "Test User" }))
            .send()
            .await
            .unwrap();
        assert!(saved.status().is_success());

        let token = client
            .post(self.url("/jwt"))
            .json(&json!({ "email": email }))
            .send()
            .await
            .unwrap();
        assert_eq!(token.status(), StatusCode::OK);
        assert!(token.headers().get("set-cookie").is_some());

        client
    }

    async fn grant(&self, email: &str, role: Role) {
        self.state.store.users.upsert_role(email, role).await.unwrap();
    }

    async fn admin(&self) -> reqwest::Client {
        let client = self.sign_in("admin@studymate.test").await;
        self.grant("admin@studymate.test", Role::Admin).await;
        client
    }

    async fn tutor(&self, email: &str) -> reqwest::Client {
        let client = self.sign_in(email).await;
        self.grant(email, Role::Tutor).await;
        client
    }
}

fn session_body(title: &str) -> Value {
    let now = Utc::now();
    json!({
        "title": title,
        "description": "Linear equations and friends",
        "tutorName": "Tess Tutor",
        "registrationWindow": { "start": now, "end": now + Duration::days(7) },
        "classWindow": { "start": now + Duration::days(8), "end": now + Duration::days(30) },
        "durationMinutes": 90
    })
}

async fn create_session(ctx: &TestContext, tutor: &reqwest::Client, title: &str) -> String {
    let response = tutor
        .post(ctx.url("/study-sessions"))
        .json(&session_body(title))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    body["insertedId"].as_str().unwrap().to_string()
}

async fn approve(ctx: &TestContext, admin: &reqwest::Client, id: &str, fee: f64) {
    let response = admin
        .patch(ctx.url(&format!("/study-sessions/approve/{}", id)))
        .json(&json!({ "registrationFee": fee }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_401_and_wrong_role_is_403() {
        let ctx = TestContext::spawn().await;

        let anonymous = reqwest::Client::new();
        let response = anonymous
            .get(ctx.url("/tutor-requests"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string());

        let student = ctx.sign_in("student@studymate.test").await;
        let response = student.get(ctx.url("/tutor-requests")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = student
            .post(ctx.url("/study-sessions"))
            .json(&session_body("Sneaky"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = anonymous
            .get(ctx.url("/study-sessions"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_application_approval_and_deactivation_drive_the_role() {
        let ctx = TestContext::spawn().await;
        let admin = ctx.admin().await;
        let email = "candidate@studymate.test";
        let student = ctx.sign_in(email).await;

        let application = json!({
            "name": "Casey Candidate",
            "experience": "Two years of peer tutoring",
            "subjects": ["Math", "Physics"]
        });

        let response = student
            .post(ctx.url("/tutor-requests"))
            .json(&application)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = response.json::<Value>().await.unwrap()["insertedId"]
            .as_str()
            .unwrap()
            .to_string();

        let duplicate = student
            .post(ctx.url("/tutor-requests"))
            .json(&application)
            .send()
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let own = student
            .get(ctx.url(&format!("/tutor-requests/user/{}", email)))
            .send()
            .await
            .unwrap();
        assert_eq!(own.json::<Value>().await.unwrap()["status"], "pending");

        let pending: Value = admin
            .get(ctx.url("/tutor-requests"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(pending.as_array().unwrap().len(), 1);

        let decided = admin
            .patch(ctx.url(&format!("/tutor-requests/{}", id)))
            .json(&json!({ "status": "approved" }))
            .send()
            .await
            .unwrap();
        assert_eq!(decided.status(), StatusCode::OK);
        assert_eq!(decided.json::<Value>().await.unwrap()["modifiedCount"], 1);

        let tutor_flag: Value = student
            .get(ctx.url(&format!("/users/tutor/{}", email)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(tutor_flag["tutor"], true);

        // The same token now passes the tutor gate.
        create_session(&ctx, &student, "Physics 101").await;

        let deactivated = admin
            .patch(ctx.url(&format!("/tutor-requests/deactivate/{}", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(deactivated.status(), StatusCode::OK);

        let role: Value = student
            .get(ctx.url(&format!("/users/role/{}", email)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(role["role"], "student");

        let response = student
            .post(ctx.url("/study-sessions"))
            .json(&session_body("Physics 102"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_duplicate_live_title_conflicts() {
        let ctx = TestContext::spawn().await;
        let tutor = ctx.tutor("tess@studymate.test").await;

        create_session(&ctx, &tutor, "Algebra 101").await;

        let response = tutor
            .post(ctx.url("/study-sessions"))
            .json(&session_body("Algebra 101"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let other = ctx.tutor("otto@studymate.test").await;
        create_session(&ctx, &other, "Algebra 101").await;
    }

    #[tokio::test]
    async fn test_booking_an_approved_paid_session() {
        let ctx = TestContext::spawn().await;
        let admin = ctx.admin().await;
        let tutor = ctx.tutor("tess@studymate.test").await;
        let student = ctx.sign_in("sam@studymate.test").await;

        let id = create_session(&ctx, &tutor, "Algebra 101").await;

        let early = student
            .post(ctx.url("/booked-sessions"))
            .json(&json!({ "sessionId": id, "paymentRef": "pi_early" }))
            .send()
            .await
            .unwrap();
        assert_eq!(early.status(), StatusCode::CONFLICT);

        approve(&ctx, &admin, &id, 25.0).await;

        let intent: Value = student
            .post(ctx.url("/create-payment-intent"))
            .json(&json!({ "sessionId": id }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(intent["amount"], 2500);
        assert_eq!(intent["clientSecret"], "pi_2500_usd_secret");

        let unpaid = student
            .post(ctx.url("/booked-sessions"))
            .json(&json!({ "sessionId": id }))
            .send()
            .await
            .unwrap();
        assert_eq!(unpaid.status(), StatusCode::BAD_REQUEST);

        let booked = student
            .post(ctx.url("/booked-sessions"))
            .json(&json!({ "sessionId": id, "paymentRef": "pi_2500" }))
            .send()
            .await
            .unwrap();
        assert_eq!(booked.status(), StatusCode::CREATED);

        let again = student
            .post(ctx.url("/booked-sessions"))
            .json(&json!({ "sessionId": id, "paymentRef": "pi_2501" }))
            .send()
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let check: Value = student
            .get(ctx.url(&format!(
                "/booked-sessions/check?sessionId={}&studentEmail=sam@studymate.test",
                id
            )))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(check["booked"], true);

        let mine: Value = student
            .get(ctx.url("/booked-sessions/user/sam@studymate.test?page=1&limit=5"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(mine["total"], 1);

        let snooping = tutor
            .get(ctx.url("/booked-sessions/user/sam@studymate.test"))
            .send()
            .await
            .unwrap();
        assert_eq!(snooping.status(), StatusCode::FORBIDDEN);

        let deleted: Value = admin
            .delete(ctx.url(&format!("/study-sessions/{}", id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(deleted["bookingsRemoved"], 1);
    }

    #[tokio::test]
    async fn test_reject_then_reapply_keeps_the_record() {
        let ctx = TestContext::spawn().await;
        let admin = ctx.admin().await;
        let tutor = ctx.tutor("tess@studymate.test").await;
        let id = create_session(&ctx, &tutor, "Chemistry 101").await;

        let rejected = admin
            .patch(ctx.url(&format!("/study-sessions/reject/{}", id)))
            .json(&json!({ "reason": "Schedule overlaps exams", "feedback": "Move it a week" }))
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::CREATED);

        let reapplied: Value = tutor
            .patch(ctx.url(&format!("/study-sessions/reapply/{}", id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reapplied["modifiedCount"], 1);

        let noop: Value = tutor
            .patch(ctx.url(&format!("/study-sessions/reapply/{}", id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(noop["matchedCount"], 1);
        assert_eq!(noop["modifiedCount"], 0);

        let session: Value = tutor
            .get(ctx.url(&format!("/study-sessions/{}", id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(session["status"], "pending");

        let records: Value = tutor
            .get(ctx.url(&format!("/rejections/{}", id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let records = records.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["reason"], "Schedule overlaps exams");

        let stranger = ctx.tutor("otto@studymate.test").await;
        let response = stranger
            .patch(ctx.url(&format!("/study-sessions/reapply/{}", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Pending sessions are hidden from everyone but the tutor and admins
        let session_url = ctx.url(&format!("/study-sessions/{}", id));
        let hidden = stranger.get(&session_url).send().await.unwrap();
        assert_eq!(hidden.status(), StatusCode::NOT_FOUND);
        let anonymous = reqwest::get(&session_url).await.unwrap();
        assert_eq!(anonymous.status(), StatusCode::NOT_FOUND);
        let reviewed = admin.get(&session_url).send().await.unwrap();
        assert_eq!(reviewed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_fee_edits_are_admin_only() {
        let ctx = TestContext::spawn().await;
        let admin = ctx.admin().await;
        let tutor = ctx.tutor("tess@studymate.test").await;
        let id = create_session(&ctx, &tutor, "Biology 101").await;

        let response = tutor
            .patch(ctx.url(&format!("/study-sessions/{}", id)))
            .json(&json!({ "registrationFee": 5.0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = tutor
            .patch(ctx.url(&format!("/study-sessions/{}", id)))
            .json(&json!({ "title": "Biology 101: Cells" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        approve(&ctx, &admin, &id, 10.0).await;

        let response = tutor
            .patch(ctx.url(&format!("/study-sessions/{}", id)))
            .json(&json!({ "description": "Too late" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = admin
            .patch(ctx.url(&format!("/study-sessions/{}", id)))
            .json(&json!({ "registrationFee": 12.5 }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let catalogue: Value = reqwest::get(ctx.url("/study-sessions"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(catalogue["total"], 1);
        assert_eq!(catalogue["items"][0]["registrationFee"], 12.5);
        assert_eq!(catalogue["items"][0]["title"], "Biology 101: Cells");
    }
}
