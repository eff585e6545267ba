// Microsoft client-credentials adapter.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use chrono::TimeDelta;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    use crate::errors::BrokerError;
    use crate::sources::microsoft::MicrosoftTokenizer;
    use crate::sources::Tokenizer;
    use crate::tests::common::{microsoft_config, spawn_axum, Hits};

    fn tokenizer(login_endpoint: String) -> MicrosoftTokenizer {
        MicrosoftTokenizer::new(&microsoft_config("graph", login_endpoint)).unwrap()
    }

    async fn mock_login(status: u16, body: serde_json::Value) -> MockServer {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(status).json_body(body);
            })
            .await;
        server
    }

    #[tokio::test]
    async fn client_credentials_form_is_posted() {
        let seen: Arc<Mutex<Option<HashMap<String, String>>>> = Arc::default();
        let upstream = Router::new().route(
            "/oauth2/token",
            post({
                let seen = seen.clone();
                move |Form(form): Form<HashMap<String, String>>| async move {
                    *seen.lock().unwrap() = Some(form);
                    Json(json!({"access_token": "tok", "expires_in": "3599"}))
                }
            }),
        );
        let (handle, addr) = spawn_axum(upstream).await;

        let tokenizer = tokenizer(format!("http://{}/oauth2/token", addr));
        assert_eq!(tokenizer.token().await.unwrap(), "tok");

        let form = seen.lock().unwrap().take().unwrap();
        assert_eq!(form["grant_type"], "client_credentials");
        assert_eq!(form["client_id"], "client-id");
        assert_eq!(form["client_secret"], "client-secret");
        assert_eq!(form["resource"], "https://graph.microsoft.com");
        handle.abort();
    }

    #[tokio::test]
    async fn token_is_cached_for_ninety_percent_of_expires_in() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(200)
                    .json_body(json!({"access_token": "tok", "expires_in": "3599", "token_type": "Bearer"}));
            })
            .await;

        let tokenizer = tokenizer(server.url("/oauth2/token"));
        assert_eq!(tokenizer.token().await.unwrap(), "tok");
        assert_eq!(tokenizer.token().await.unwrap(), "tok");
        mock.assert_async().await;

        let cached = tokenizer.cached().unwrap();
        assert_eq!(
            cached.expires_at - cached.obtained_at,
            TimeDelta::milliseconds(3_239_100)
        );
    }

    #[tokio::test]
    async fn error_description_is_surfaced() {
        let server = mock_login(
            401,
            json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            }),
        )
        .await;

        let err = tokenizer(server.url("/oauth2/token")).token().await.unwrap_err();
        assert_eq!(
            err,
            BrokerError::Protocol(
                "microsoft: error getting token: AADSTS7000215: Invalid client secret provided.".into()
            )
        );
    }

    #[tokio::test]
    async fn undecodable_error_body_falls_back_to_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(500).body("<html>oops</html>");
            })
            .await;

        let err = tokenizer(server.url("/oauth2/token")).token().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "microsoft: error getting token: 500 Internal Server Error"
        );
    }

    #[tokio::test]
    async fn non_numeric_expires_in_is_a_decode_error() {
        let server = mock_login(200, json!({"access_token": "tok", "expires_in": "soon"})).await;

        let tokenizer = tokenizer(server.url("/oauth2/token"));
        let err = tokenizer.token().await.unwrap_err();
        assert!(matches!(err, BrokerError::Decode(_)));
        assert!(err
            .to_string()
            .starts_with("microsoft: error converting expiresIn field for token: "));
        assert!(tokenizer.cached().is_none());
    }

    #[tokio::test]
    async fn unrepresentable_expires_in_is_a_decode_error() {
        let server = mock_login(
            200,
            json!({"access_token": "tok", "expires_in": "9223372036854775807"}),
        )
        .await;

        let tokenizer = tokenizer(server.url("/oauth2/token"));
        let err = tokenizer.token().await.unwrap_err();
        assert_eq!(
            err,
            BrokerError::Decode(
                "microsoft: error converting expiresIn field for token: 9223372036854775807 is out of range"
                    .into()
            )
        );
        assert!(tokenizer.cached().is_none());
    }

    #[tokio::test]
    async fn huge_expires_in_is_cached_until_the_end_of_time() {
        let server = mock_login(
            200,
            json!({"access_token": "forever", "expires_in": "9000000000000000"}),
        )
        .await;

        let tokenizer = tokenizer(server.url("/oauth2/token"));
        assert_eq!(tokenizer.token().await.unwrap(), "forever");
        assert_eq!(
            tokenizer.cached().unwrap().expires_at,
            chrono::DateTime::<chrono::Utc>::MAX_UTC
        );
    }

    #[tokio::test]
    async fn malformed_body_keeps_previous_token() {
        let hits = Hits::default();
        let upstream = Router::new().route(
            "/oauth2/token",
            post({
                let hits = hits.clone();
                move || {
                    let n = hits.record();
                    async move {
                        if n == 0 {
                            (StatusCode::OK, r#"{"access_token":"first","expires_in":"1"}"#.to_owned())
                        } else {
                            (StatusCode::OK, "{not json".to_owned())
                        }
                    }
                }
            }),
        );
        let (handle, addr) = spawn_axum(upstream).await;

        let tokenizer = tokenizer(format!("http://{}/oauth2/token", addr));
        assert_eq!(tokenizer.token().await.unwrap(), "first");

        tokio::time::sleep(Duration::from_millis(950)).await;
        let err = tokenizer.token().await.unwrap_err();
        assert!(err.to_string().starts_with("microsoft: error unmarshaling body: "), "{}", err);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(tokenizer.cached().unwrap().value, "first");
        assert_eq!(hits.count(), 2);
        handle.abort();
    }

    #[tokio::test]
    async fn slow_login_endpoint_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(200)
                    .delay(Duration::from_secs(2))
                    .json_body(json!({"access_token": "late", "expires_in": "3599"}));
            })
            .await;

        let mut cfg = microsoft_config("graph", server.url("/oauth2/token"));
        cfg.timeout = Duration::from_millis(100);
        let err = MicrosoftTokenizer::new(&cfg).unwrap().token().await.unwrap_err();
        assert_eq!(
            err,
            BrokerError::Timeout("microsoft: request timed out after 100ms".into())
        );
    }

    #[tokio::test]
    async fn zero_timeout_never_reaches_upstream() {
        let hits = Hits::default();
        let upstream = Router::new().route(
            "/oauth2/token",
            post({
                let hits = hits.clone();
                move || {
                    hits.record();
                    async { Json(json!({"access_token": "tok", "expires_in": "3599"})) }
                }
            }),
        );
        let (handle, addr) = spawn_axum(upstream).await;

        let mut cfg = microsoft_config("graph", format!("http://{}/oauth2/token", addr));
        cfg.timeout = Duration::ZERO;
        let err = MicrosoftTokenizer::new(&cfg).unwrap().token().await.unwrap_err();
        assert!(matches!(err, BrokerError::Timeout(_)));
        assert_eq!(hits.count(), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn instances_keep_separate_caches() {
        let first = mock_login(200, json!({"access_token": "tenant-a", "expires_in": "3599"})).await;
        let second = mock_login(200, json!({"access_token": "tenant-b", "expires_in": "3599"})).await;

        let a = MicrosoftTokenizer::new(&microsoft_config("graph-a", first.url("/oauth2/token"))).unwrap();
        let b = MicrosoftTokenizer::new(&microsoft_config("graph-b", second.url("/oauth2/token"))).unwrap();

        assert_eq!(a.token().await.unwrap(), "tenant-a");
        assert_eq!(b.token().await.unwrap(), "tenant-b");
        assert_eq!(a.token().await.unwrap(), "tenant-a");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_trigger_one_exchange() {
        let hits = Hits::default();
        let upstream = Router::new().route(
            "/oauth2/token",
            post({
                let hits = hits.clone();
                move || {
                    let n = hits.record();
                    async move {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Json(json!({"access_token": format!("tok-{}", n), "expires_in": "3599"}))
                    }
                }
            }),
        );
        let (handle, addr) = spawn_axum(upstream).await;

        let tokenizer = Arc::new(tokenizer(format!("http://{}/oauth2/token", addr)));
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let tokenizer = tokenizer.clone();
            tasks.push(tokio::spawn(async move { tokenizer.token().await }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "tok-0");
        }
        assert_eq!(hits.count(), 1);
        handle.abort();
    }
}
