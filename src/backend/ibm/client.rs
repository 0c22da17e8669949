// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP client abstraction for the IBM Qiskit Runtime API.
//!
//! Provides [`IbmHttpClient`] for abstracting HTTP operations,
//! [`ReqwestIbmClient`] for production use, and [`MockIbmClient`] for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::backend::selection::BackendCandidate;
use crate::error::RemoteError;

use super::{IbmJobRequest, IbmJobResult, IbmJobState};

/// Trait for IBM Quantum HTTP operations.
///
/// This trait enables testing the executor without real HTTP calls.
#[async_trait]
pub trait IbmHttpClient: Send + Sync {
    /// Submit a job and return its id.
    async fn submit_job(&self, request: &IbmJobRequest) -> Result<String, RemoteError>;

    /// Current state of a job.
    async fn get_job_state(&self, job_id: &str) -> Result<IbmJobState, RemoteError>;

    /// Results of a completed job.
    async fn get_job_results(&self, job_id: &str) -> Result<IbmJobResult, RemoteError>;

    /// Backends visible to the configured instance.
    async fn list_backends(&self) -> Result<Vec<BackendCandidate>, RemoteError>;
}

/// Map an unsuccessful HTTP status onto the remote error taxonomy.
pub fn classify_status(status: u16, body: &str) -> RemoteError {
    let msg = format!("IBM API returned {status}: {body}");
    match status {
        429 => RemoteError::RateLimited(msg),
        401 | 403 => RemoteError::AuthenticationFailed(msg),
        404 => RemoteError::NotFound(msg),
        400 | 422 => RemoteError::InvalidRequest(msg),
        409 => RemoteError::Rejected(msg),
        500..=599 => RemoteError::Unavailable(msg),
        _ => RemoteError::Http(msg),
    }
}

#[cfg(feature = "ibm")]
mod http {
    use super::*;
    use crate::config::IbmConfig;
    use secrecy::{ExposeSecret, SecretString};
    use serde::Deserialize;
    use std::time::Duration;
    use tracing::debug;

    /// Production HTTP client using reqwest.
    pub struct ReqwestIbmClient {
        client: reqwest::Client,
        base_url: String,
        instance: String,
        token: SecretString,
    }

    impl std::fmt::Debug for ReqwestIbmClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ReqwestIbmClient")
                .field("base_url", &self.base_url)
                .field("instance", &self.instance)
                .field("token", &"[REDACTED]")
                .finish()
        }
    }

    #[derive(Debug, Deserialize)]
    struct SubmitResponse {
        id: String,
    }

    #[derive(Debug, Deserialize)]
    struct BackendList {
        devices: Vec<BackendCandidate>,
    }

    fn transport_error(operation: &str, e: reqwest::Error) -> RemoteError {
        let msg = format!("{operation} request failed: {e}");
        if e.is_connect() || e.is_timeout() {
            RemoteError::Unavailable(msg)
        } else {
            RemoteError::Http(msg)
        }
    }

    impl ReqwestIbmClient {
        /// Create a client from IBM configuration.
        pub fn from_config(config: &IbmConfig) -> Result<Self, RemoteError> {
            let token = config.auth_token.clone().ok_or_else(|| {
                RemoteError::AuthenticationFailed(
                    "IBM Quantum token not configured. Set IBM_QUANTUM_TOKEN".into(),
                )
            })?;

            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_sec))
                .build()
                .map_err(|e| RemoteError::Http(format!("Failed to create client: {e}")))?;

            Ok(Self {
                client,
                base_url: config.api_url.trim_end_matches('/').to_string(),
                instance: config.instance.clone(),
                token: SecretString::from(token),
            })
        }

        async fn get_json<T: serde::de::DeserializeOwned>(
            &self,
            operation: &str,
            url: &str,
        ) -> Result<T, RemoteError> {
            let response = self
                .client
                .get(url)
                .bearer_auth(self.token.expose_secret())
                .header("Service-CRN", &self.instance)
                .send()
                .await
                .map_err(|e| transport_error(operation, e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status.as_u16(), &body));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| RemoteError::Http(format!("Failed to parse {operation} response: {e}")))
        }
    }

    #[async_trait]
    impl IbmHttpClient for ReqwestIbmClient {
        async fn submit_job(&self, request: &IbmJobRequest) -> Result<String, RemoteError> {
            let url = format!("{}/v1/jobs", self.base_url);

            let response = self
                .client
                .post(&url)
                .bearer_auth(self.token.expose_secret())
                .header("Service-CRN", &self.instance)
                .json(request)
                .send()
                .await
                .map_err(|e| transport_error("submit_job", e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status.as_u16(), &body));
            }

            let submitted: SubmitResponse = response.json().await.map_err(|e| {
                RemoteError::Http(format!("Failed to parse submit_job response: {e}"))
            })?;
            debug!(job_id = %submitted.id, "Job accepted by IBM");
            Ok(submitted.id)
        }

        async fn get_job_state(&self, job_id: &str) -> Result<IbmJobState, RemoteError> {
            let url = format!("{}/v1/jobs/{}", self.base_url, job_id);
            self.get_json("get_job_state", &url).await
        }

        async fn get_job_results(&self, job_id: &str) -> Result<IbmJobResult, RemoteError> {
            let url = format!("{}/v1/jobs/{}/results", self.base_url, job_id);
            self.get_json("get_job_results", &url).await
        }

        async fn list_backends(&self) -> Result<Vec<BackendCandidate>, RemoteError> {
            let url = format!("{}/v1/backends", self.base_url);
            let list: BackendList = self.get_json("list_backends", &url).await?;
            Ok(list.devices)
        }
    }
}

#[cfg(feature = "ibm")]
pub use http::ReqwestIbmClient;

// Stub for when the ibm feature is not enabled
#[cfg(not(feature = "ibm"))]
#[derive(Debug)]
pub struct ReqwestIbmClient;

#[cfg(not(feature = "ibm"))]
impl ReqwestIbmClient {
    pub fn from_config(_config: &crate::config::IbmConfig) -> Result<Self, RemoteError> {
        Err(RemoteError::NotFound(
            "IBM client requires the 'ibm' feature flag".into(),
        ))
    }
}

#[cfg(not(feature = "ibm"))]
#[async_trait]
impl IbmHttpClient for ReqwestIbmClient {
    async fn submit_job(&self, _request: &IbmJobRequest) -> Result<String, RemoteError> {
        Err(RemoteError::NotFound("IBM feature not enabled".into()))
    }
    async fn get_job_state(&self, _job_id: &str) -> Result<IbmJobState, RemoteError> {
        Err(RemoteError::NotFound("IBM feature not enabled".into()))
    }
    async fn get_job_results(&self, _job_id: &str) -> Result<IbmJobResult, RemoteError> {
        Err(RemoteError::NotFound("IBM feature not enabled".into()))
    }
    async fn list_backends(&self) -> Result<Vec<BackendCandidate>, RemoteError> {
        Err(RemoteError::NotFound("IBM feature not enabled".into()))
    }
}

/// Mock IBM client for testing.
///
/// `state_responses` are consumed one per poll; once drained the last
/// response repeats.
pub struct MockIbmClient {
    pub submit_response: Result<String, RemoteError>,
    pub state_responses: Mutex<VecDeque<Result<IbmJobState, RemoteError>>>,
    pub result_response: Result<IbmJobResult, RemoteError>,
    pub backends: Vec<BackendCandidate>,
    pub submitted: Mutex<Vec<IbmJobRequest>>,
}

impl MockIbmClient {
    pub fn with_states(states: Vec<Result<IbmJobState, RemoteError>>) -> Self {
        Self {
            state_responses: Mutex::new(states.into()),
            ..Self::default()
        }
    }
}

impl Default for MockIbmClient {
    fn default() -> Self {
        Self {
            submit_response: Ok("mock-job-id".to_string()),
            state_responses: Mutex::new(VecDeque::from([Ok(IbmJobState::with_status("DONE"))])),
            result_response: Ok(IbmJobResult { results: vec![] }),
            backends: vec![],
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IbmHttpClient for MockIbmClient {
    async fn submit_job(&self, request: &IbmJobRequest) -> Result<String, RemoteError> {
        self.submitted.lock().push(request.clone());
        self.submit_response.clone()
    }

    async fn get_job_state(&self, _job_id: &str) -> Result<IbmJobState, RemoteError> {
        let mut states = self.state_responses.lock();
        if states.len() > 1 {
            states.pop_front().unwrap_or_else(|| Err(RemoteError::NotFound("no state".into())))
        } else {
            states
                .front()
                .cloned()
                .unwrap_or_else(|| Err(RemoteError::NotFound("no state".into())))
        }
    }

    async fn get_job_results(&self, _job_id: &str) -> Result<IbmJobResult, RemoteError> {
        self.result_response.clone()
    }

    async fn list_backends(&self) -> Result<Vec<BackendCandidate>, RemoteError> {
        Ok(self.backends.clone())
    }
}
