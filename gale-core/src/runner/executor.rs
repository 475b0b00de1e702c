//! Per-request execution
//!
//! A worker runs exactly one unit of work: wait for a rate permit, re-check
//! the breaker, synthesize the request, fire it with a hard timeout, and
//! translate the outcome into metrics and breaker feedback. Failures never
//! escape the worker.

use crate::breaker::CircuitBreaker;
use crate::limiter::RateRegulator;
use crate::metrics::MetricsCollector;
use crate::request::template::GeneratedRequest;
use crate::request::validator::ResponseView;
use crate::request::{RequestGenerator, ResponseValidator};
use crate::runner::StopSignal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A received response, decoded for classification and validation
struct ExecutedResponse {
    status: u16,
    headers: HashMap<String, String>,
    body: String,
    /// Estimated wire size: body plus header bytes
    bytes: u64,
}

pub struct RequestExecutor {
    client: reqwest::blocking::Client,
    generator: Arc<RequestGenerator>,
    regulator: Arc<RateRegulator>,
    metrics: Arc<MetricsCollector>,
    breaker: Option<Arc<CircuitBreaker>>,
    validator: Option<Arc<ResponseValidator>>,
    request_timeout: Duration,
    /// End of the submission window; units reaching a worker later are
    /// dropped so the drain does not stretch past the deadline
    deadline: Instant,
    stop: Arc<StopSignal>,
}

impl RequestExecutor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        client: reqwest::blocking::Client,
        generator: Arc<RequestGenerator>,
        regulator: Arc<RateRegulator>,
        metrics: Arc<MetricsCollector>,
        breaker: Option<Arc<CircuitBreaker>>,
        validator: Option<Arc<ResponseValidator>>,
        request_timeout: Duration,
        deadline: Instant,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            client,
            generator,
            regulator,
            metrics,
            breaker,
            validator,
            request_timeout,
            deadline,
            stop,
        }
    }

    /// Whether the run is over; queued work observed after this point is
    /// cancelled, not counted
    fn run_ended(&self) -> bool {
        self.stop.is_signaled() || Instant::now() >= self.deadline
    }

    /// Run the full lifecycle for one request id
    pub fn execute_request(&self, request_id: u64, elapsed_ms: u64) {
        if self.run_ended() {
            return;
        }

        let wait_secs = self.regulator.acquire();
        self.metrics.record_rate_limiter_wait(wait_secs);

        if self.run_ended() {
            return;
        }

        if let Some(breaker) = &self.breaker {
            if !breaker.allow_request() {
                tracing::debug!("Circuit breaker open, skipping request {request_id}");
                self.metrics.record_skipped(request_id);
                return;
            }
        }

        let request = match self.generator.generate(request_id, elapsed_ms) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Failed to generate request {request_id}: {e}");
                self.metrics.record_skipped(request_id);
                return;
            }
        };

        let started = Instant::now();
        self.metrics.record_request_start(request_id);

        match self.send(request) {
            Ok(response) => {
                let response_time_ms = started.elapsed().as_millis() as u64;
                let mut success = (200..300).contains(&response.status);

                if success {
                    if let Some(validator) = &self.validator {
                        let outcome = validator.validate(&ResponseView {
                            status: response.status,
                            headers: &response.headers,
                            body: &response.body,
                        });
                        if !outcome.ok {
                            success = false;
                            tracing::debug!(
                                "Request {request_id} failed validation: {}",
                                outcome.describe()
                            );
                        }
                    }
                }

                self.metrics.record_response(
                    request_id,
                    response.status,
                    &response.body,
                    response.bytes,
                    response_time_ms,
                    success,
                );
                self.feed_breaker(success);
                tracing::debug!(
                    "Request {request_id} completed with status {}, took {response_time_ms} ms",
                    response.status
                );
            }
            Err(e) => {
                let response_time_ms = started.elapsed().as_millis() as u64;
                if e.is_timeout() {
                    tracing::warn!("Request {request_id} timed out after {response_time_ms} ms");
                    self.metrics.record_timeout(request_id, response_time_ms);
                } else {
                    tracing::warn!("Request {request_id} failed: {e}");
                    self.metrics.record_error(
                        request_id,
                        classify_error(&e),
                        &e.to_string(),
                        &cause_chain(&e),
                    );
                }
                self.feed_breaker(false);
            }
        }
    }

    fn feed_breaker(&self, success: bool) {
        if let Some(breaker) = &self.breaker {
            breaker.record_result(success);
        }
    }

    fn send(&self, request: GeneratedRequest) -> reqwest::Result<ExecutedResponse> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .timeout(self.request_timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send()?;
        let status = response.status().as_u16();

        let mut header_bytes = 0usize;
        let mut headers = HashMap::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            header_bytes += name.as_str().len() + value.len() + 4;
            headers.insert(
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            );
        }

        let body = response.text()?;
        Ok(ExecutedResponse {
            status,
            headers,
            bytes: (header_bytes + body.len()) as u64,
            body,
        })
    }
}

/// Map a transport error to its taxonomy kind
fn classify_error(error: &reqwest::Error) -> &'static str {
    if error.is_connect() {
        "connect"
    } else if error.is_redirect() {
        "redirect"
    } else if error.is_body() {
        "body"
    } else if error.is_decode() {
        "decode"
    } else if error.is_request() {
        "request"
    } else {
        "transport"
    }
}

/// Render the full cause chain, outermost first
fn cause_chain(error: &reqwest::Error) -> String {
    let mut chain = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
