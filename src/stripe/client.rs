//! HTTP implementation of [`StripeApi`] on top of `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::objects::{List, StripeCharge, StripeCustomer, StripeTransfer};
use super::{ListParams, StripeApi, StripeError};
use crate::config::Config;

/// Page size requested from the list endpoints (the API maximum).
const PAGE_LIMIT: &str = "100";

/// Client for the processor's REST API.
///
/// # Headers Sent
///
/// - `Authorization: Bearer <secret key>`
/// - `Stripe-Account: <acct id>` when acting on a connected account
/// - `Stripe-Version: <version>` when a version is pinned in config
///
/// Object ids are sent as single percent-encoded path segments, so an id
/// can never address a different endpoint.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: Url,
    secret_key: String,
    api_version: Option<String>,
}

impl StripeClient {
    pub fn new(
        api_base: &str,
        secret_key: impl Into<String>,
        api_version: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StripeError> {
        let api_base =
            Url::parse(api_base).map_err(|e| StripeError::BaseUrl(format!("{api_base}: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(StripeError::BaseUrl(api_base.to_string()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base,
            secret_key: secret_key.into(),
            api_version,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, StripeError> {
        Self::new(
            &config.stripe_api_base,
            config.stripe_secret_key.clone(),
            config.stripe_api_version.clone(),
            Duration::from_secs(config.stripe_timeout_secs),
        )
    }

    /// `{api_base}/v1/{segments...}`, each segment percent-encoded.
    ///
    /// # Errors
    ///
    /// - `InvalidId`: a segment is empty, `.` or `..`
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StripeError> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(StripeError::InvalidId((*bad).to_string()));
        }

        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| StripeError::BaseUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    /// GET `url` and decode the JSON body.
    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
        stripe_account: Option<&str>,
    ) -> Result<T, StripeError> {
        let mut request = self
            .http
            .get(url.clone())
            .bearer_auth(&self.secret_key)
            .query(query);
        if let Some(account) = stripe_account {
            request = request.header("Stripe-Account", account);
        }
        if let Some(version) = &self.api_version {
            request = request.header("Stripe-Version", version);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| status.to_string());
            tracing::warn!(
                url = %url,
                status = status.as_u16(),
                message = %message,
                "Processor API request failed"
            );
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
                body,
            });
        }

        serde_json::from_str(&body).map_err(StripeError::Decode)
    }

    async fn list<T: DeserializeOwned>(
        &self,
        object: &str,
        params: ListParams<'_>,
        expand: Option<&str>,
        stripe_account: Option<&str>,
    ) -> Result<List<T>, StripeError> {
        let mut query = vec![("limit", PAGE_LIMIT)];
        if let Some(customer) = params.customer {
            query.push(("customer", customer));
        }
        if let Some(cursor) = params.starting_after {
            query.push(("starting_after", cursor));
        }
        if let Some(expand) = expand {
            query.push(("expand[]", expand));
        }

        self.get(self.endpoint(&[object])?, &query, stripe_account)
            .await
    }
}

#[async_trait]
impl StripeApi for StripeClient {
    async fn retrieve_event(
        &self,
        event_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<Value, StripeError> {
        self.get(self.endpoint(&["events", event_id])?, &[], stripe_account)
            .await
    }

    async fn retrieve_customer(
        &self,
        customer_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<StripeCustomer, StripeError> {
        self.get(
            self.endpoint(&["customers", customer_id])?,
            &[],
            stripe_account,
        )
        .await
    }

    async fn retrieve_charge(
        &self,
        charge_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<StripeCharge, StripeError> {
        self.get(
            self.endpoint(&["charges", charge_id])?,
            &[("expand[]", "balance_transaction")],
            stripe_account,
        )
        .await
    }

    async fn retrieve_transfer(
        &self,
        transfer_id: &str,
        stripe_account: Option<&str>,
    ) -> Result<StripeTransfer, StripeError> {
        self.get(
            self.endpoint(&["transfers", transfer_id])?,
            &[],
            stripe_account,
        )
        .await
    }

    async fn list_customers(
        &self,
        params: ListParams<'_>,
    ) -> Result<List<StripeCustomer>, StripeError> {
        let params = ListParams {
            customer: None,
            ..params
        };
        self.list("customers", params, None, None).await
    }

    async fn list_charges(
        &self,
        params: ListParams<'_>,
        stripe_account: Option<&str>,
    ) -> Result<List<StripeCharge>, StripeError> {
        self.list(
            "charges",
            params,
            Some("data.balance_transaction"),
            stripe_account,
        )
        .await
    }

    async fn list_invoices(
        &self,
        params: ListParams<'_>,
        stripe_account: Option<&str>,
    ) -> Result<List<Value>, StripeError> {
        self.list("invoices", params, None, stripe_account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode, Uri},
    };
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(Uri, HeaderMap)>>>;

    /// Serve `body` with `status` for every request on a local port.
    async fn fake_processor(status: StatusCode, body: Value) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let recorder = seen.clone();
        let app = Router::new().fallback(move |uri: Uri, headers: HeaderMap| {
            let recorder = recorder.clone();
            let body = body.clone();
            async move {
                recorder.lock().unwrap().push((uri, headers));
                (status, Json(body))
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), seen)
    }

    fn client(api_base: &str, api_version: Option<&str>) -> StripeClient {
        StripeClient::new(
            api_base,
            "sk_test_123",
            api_version.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn endpoint_joins_below_api_base() {
        let url = client("https://api.example.test/", None)
            .endpoint(&["events", "evt_1"])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.test/v1/events/evt_1");

        let url = client("https://proxy.example.test/stripe/", None)
            .endpoint(&["charges", "ch_1"])
            .unwrap();
        assert_eq!(url.as_str(), "https://proxy.example.test/stripe/v1/charges/ch_1");
    }

    #[test]
    fn unusable_api_base_is_rejected() {
        let result = StripeClient::new(
            "mailto:billing@example.test",
            "sk_test_123",
            None,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(StripeError::BaseUrl(_))));
    }

    #[tokio::test]
    async fn charge_request_carries_auth_account_and_version() {
        let (base, seen) = fake_processor(
            StatusCode::OK,
            json!({"id": "ch_1", "amount": 100, "currency": "usd"}),
        )
        .await;

        let charge = client(&base, Some("2017-02-14"))
            .retrieve_charge("ch_1", Some("acct_1"))
            .await
            .unwrap();
        assert_eq!(charge.id, "ch_1");

        let seen = seen.lock().unwrap();
        let (uri, headers) = &seen[0];
        assert_eq!(uri.path(), "/v1/charges/ch_1");
        assert_eq!(uri.query(), Some("expand%5B%5D=balance_transaction"));
        assert_eq!(header(headers, "authorization"), Some("Bearer sk_test_123"));
        assert_eq!(header(headers, "stripe-account"), Some("acct_1"));
        assert_eq!(header(headers, "stripe-version"), Some("2017-02-14"));
    }

    #[tokio::test]
    async fn platform_request_omits_account_and_version() {
        let (base, seen) = fake_processor(StatusCode::OK, json!({"id": "evt_1"})).await;

        client(&base, None).retrieve_event("evt_1", None).await.unwrap();

        let seen = seen.lock().unwrap();
        let (uri, headers) = &seen[0];
        assert_eq!(uri.path(), "/v1/events/evt_1");
        assert!(headers.get("stripe-account").is_none());
        assert!(headers.get("stripe-version").is_none());
    }

    #[tokio::test]
    async fn event_id_stays_one_path_segment() {
        let (base, seen) = fake_processor(
            StatusCode::OK,
            json!({"id": "cus_1", "object": "customer"}),
        )
        .await;

        client(&base, None)
            .retrieve_event("../customers/cus_1", None)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0.path(), "/v1/events/..%2Fcustomers%2Fcus_1");
    }

    #[tokio::test]
    async fn dot_segment_ids_are_never_sent() {
        let (base, seen) = fake_processor(StatusCode::OK, json!({})).await;
        let client = client(&base, None);

        for id in ["..", ".", ""] {
            let err = client.retrieve_event(id, None).await.unwrap_err();
            assert!(matches!(err, StripeError::InvalidId(_)), "id {id:?}");
        }
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_charges_sends_filters_and_cursor() {
        let (base, seen) = fake_processor(
            StatusCode::OK,
            json!({"object": "list", "data": [], "has_more": false}),
        )
        .await;

        let page = client(&base, None)
            .list_charges(
                ListParams {
                    customer: Some("cus_1"),
                    starting_after: Some("ch_9"),
                },
                Some("acct_1"),
            )
            .await
            .unwrap();
        assert!(page.data.is_empty());
        assert!(!page.has_more);

        let seen = seen.lock().unwrap();
        let (uri, headers) = &seen[0];
        assert_eq!(uri.path(), "/v1/charges");
        assert_eq!(
            uri.query(),
            Some("limit=100&customer=cus_1&starting_after=ch_9&expand%5B%5D=data.balance_transaction")
        );
        assert_eq!(header(headers, "stripe-account"), Some("acct_1"));
    }

    #[tokio::test]
    async fn api_error_keeps_message_and_body() {
        let (base, _seen) = fake_processor(
            StatusCode::NOT_FOUND,
            json!({"error": {"type": "invalid_request_error", "message": "No such transfer: tr_x"}}),
        )
        .await;

        let err = client(&base, None)
            .retrieve_transfer("tr_x", None)
            .await
            .unwrap_err();

        match err {
            StripeError::Api {
                status,
                message,
                body,
            } => {
                assert_eq!(status, 404);
                assert_eq!(message, "No such transfer: tr_x");
                assert!(body.contains("invalid_request_error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
