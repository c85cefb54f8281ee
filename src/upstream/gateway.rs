use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;

use super::cache::TtlCache;
use super::client::{FetchError, OpenWeatherClient};
use super::key;
use super::LogicalRequest;

/// The first member failure of an all-or-nothing aggregate, annotated with
/// the logical request that produced it. The underlying kind and message
/// pass through unchanged.
#[derive(Error, Debug)]
#[error("{request}: {source}")]
pub struct AggregateError {
    pub request: LogicalRequest,
    #[source]
    pub source: FetchError,
}

/// Cache-fronted access to the upstream provider.
///
/// Owns the only shared mutable state in the process (the TTL cache) and
/// the fetch client. One gateway is built at startup and shared by every
/// concurrent request handler.
pub struct WeatherGateway {
    cache: TtlCache,
    client: OpenWeatherClient,
    default_ttl: Duration,
}

impl WeatherGateway {
    pub fn new(client: OpenWeatherClient, default_ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(),
            client,
            default_ttl,
        }
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    /// Resolves one logical request through the cache.
    ///
    /// On a miss the upstream is called and a success is written back under
    /// the derived key. Two requests racing on the same missing key both
    /// reach the upstream; the later write wins, which is harmless since
    /// both hold equally fresh documents. Failures are never cached.
    pub async fn fetch_cached(&self, request: &LogicalRequest) -> Result<Value, FetchError> {
        let cache_key = key::derive(request.kind, &request.params);
        if let Some(document) = self.cache.get(&cache_key) {
            tracing::debug!(%request, "cache hit");
            return Ok(document);
        }

        tracing::debug!(%request, "cache miss, querying upstream");
        let document = self.client.fetch(request.kind, &request.params).await?;
        self.cache.put(&cache_key, document.clone(), self.default_ttl);
        Ok(document)
    }

    /// Resolves an ordered sequence of logical requests concurrently.
    ///
    /// All-or-nothing: if any member fails, the whole aggregate fails with
    /// the first failure in input order; otherwise the documents come back
    /// positionally matched to the inputs regardless of completion order.
    /// Siblings of a failed member run to completion and may still populate
    /// the cache.
    pub async fn fetch_all(
        &self,
        requests: &[LogicalRequest],
    ) -> Result<Vec<Value>, AggregateError> {
        let outcomes = join_all(requests.iter().map(|r| self.fetch_cached(r))).await;

        let mut documents = Vec::with_capacity(outcomes.len());
        for (request, outcome) in requests.iter().zip(outcomes) {
            match outcome {
                Ok(document) => documents.push(document),
                Err(source) => {
                    return Err(AggregateError {
                        request: request.clone(),
                        source,
                    })
                }
            }
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer, ttl: Duration) -> WeatherGateway {
        let config = Config {
            port: 0,
            openweather_api_key: "test-key".to_string(),
            openweather_base_url: server.uri(),
            cache_ttl_secs: ttl.as_secs(),
            upstream_timeout_secs: 5,
        };
        let client = OpenWeatherClient::new(&config).unwrap();
        WeatherGateway::new(client, ttl)
    }

    #[tokio::test]
    async fn second_lookup_within_ttl_hits_the_cache() {
        let server = MockServer::start().await;
        let payload = json!({"name": "London", "main": {"temp": 11.2}});

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "London"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Duration::from_secs(600));
        let request = LogicalRequest::current_weather("London");

        let first = gateway.fetch_cached(&request).await.unwrap();
        let second = gateway.fetch_cached(&request).await.unwrap();

        // The hit must return exactly what the fetch stored.
        assert_eq!(first, payload);
        assert_eq!(second, payload);

        let cache_key = key::derive(request.kind, &request.params);
        assert!(gateway.cache().get(&cache_key).is_some());
    }

    #[tokio::test]
    async fn expired_entry_triggers_a_fresh_fetch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"temp": 9.0})))
            .expect(2)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Duration::from_millis(50));
        let request = LogicalRequest::current_weather("London");

        gateway.fetch_cached(&request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        gateway.fetch_cached(&request).await.unwrap();
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"cod": "404", "message": "city not found"})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Duration::from_secs(600));
        let request = LogicalRequest::current_weather("Atlantis");

        assert!(gateway.fetch_cached(&request).await.is_err());
        assert!(gateway.fetch_cached(&request).await.is_err());
        assert!(gateway.cache().is_empty());
    }

    #[tokio::test]
    async fn aggregate_output_is_positional_regardless_of_completion_order() {
        let server = MockServer::start().await;

        // The first input is made slower than the second; output order must
        // still mirror input order.
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "London"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "London"}))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "Paris"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Paris"})))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Duration::from_secs(600));
        let requests = vec![
            LogicalRequest::current_weather("London"),
            LogicalRequest::current_weather("Paris"),
        ];

        let documents = gateway.fetch_all(&requests).await.unwrap();

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0], json!({"name": "London"}));
        assert_eq!(documents[1], json!({"name": "Paris"}));
    }

    #[tokio::test]
    async fn one_failing_member_fails_the_whole_aggregate() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "London"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "London"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "Paris"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"cod": "404", "message": "city not found"})),
            )
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Duration::from_secs(600));
        let requests = vec![
            LogicalRequest::current_weather("London"),
            LogicalRequest::current_weather("Paris"),
        ];

        let error = gateway.fetch_all(&requests).await.unwrap_err();

        assert_eq!(error.request, requests[1]);
        assert_eq!(
            error.source,
            FetchError::UpstreamRejected("city not found".to_string())
        );
        // The member message survives wrapping untouched.
        assert!(error.to_string().contains("city not found"));
    }

    #[tokio::test]
    async fn surviving_siblings_of_a_failure_still_populate_the_cache() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "London"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "London"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "Paris"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Duration::from_secs(600));
        let requests = vec![
            LogicalRequest::current_weather("Paris"),
            LogicalRequest::current_weather("London"),
        ];

        assert!(gateway.fetch_all(&requests).await.is_err());

        let london_key = key::derive(requests[1].kind, &requests[1].params);
        assert!(gateway.cache().get(&london_key).is_some());
    }

    #[tokio::test]
    async fn mixed_endpoint_aggregate_resolves_both_kinds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "London"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"city": {"name": "London"}, "list": []})),
            )
            .mount(&server)
            .await;

        let gateway = gateway_for(&server, Duration::from_secs(600));
        let requests = vec![
            LogicalRequest::current_weather("London"),
            LogicalRequest::forecast("London"),
        ];

        let documents = gateway.fetch_all(&requests).await.unwrap();

        assert_eq!(documents[0]["name"], json!("London"));
        assert_eq!(documents[1]["city"]["name"], json!("London"));
    }
}
