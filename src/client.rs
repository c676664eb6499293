use std::{fmt, sync::Arc};

use tokio::{runtime::Handle, time::sleep};

use crate::{
    queue::Throttler,
    retry::{RetryDecision, RetryPolicy, RetryState},
    session::{MemoryTokenStore, Navigator, NoopNavigator, Session, SessionState, TokenStore},
    transport::TransportRequest,
    ApiResponse, PipelineError, PipelineOptions, ReqwestTransport, RequestSpec, ResponseCache,
    Result, Transport,
};

/// State shared by every pipeline handle and the queue pump.
pub(crate) struct Shared<T> {
    pub transport: T,
    pub options: PipelineOptions,
    pub cache: Arc<ResponseCache>,
    pub session: Session,
}

impl<T: Transport> Shared<T> {
    /// One network attempt: request-phase headers, transport call, status check.
    ///
    /// 2xx is success; a 404 is too when the caller asked for it.
    pub async fn dispatch(&self, spec: &RequestSpec) -> Result<ApiResponse> {
        let url = self.options.url_for(&spec.path);
        self.session.check_expiry();
        let mut headers = self.session.request_headers();
        headers.extend(spec.headers.iter().cloned());

        let timeout = spec.timeout.unwrap_or(if spec.is_upload() {
            self.options.upload_timeout
        } else {
            self.options.timeout
        });

        let request = TransportRequest {
            method: spec.method.clone(),
            url: url.clone(),
            headers,
            query: spec.query_pairs(),
            body: spec.body.clone(),
            timeout,
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|source| PipelineError::Transport {
                method: spec.method.clone(),
                url: url.clone(),
                source,
            })?;

        if response.is_success() || (spec.allow_not_found && response.is_not_found()) {
            return Ok(response);
        }
        Err(PipelineError::http(
            response.status,
            spec.method.clone(),
            url,
            response.data,
        ))
    }
}

/// Builder for [`HttpPipeline`].
pub struct PipelineBuilder<T = ReqwestTransport> {
    options: PipelineOptions,
    transport: T,
    token_store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
}

impl PipelineBuilder<ReqwestTransport> {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            transport: ReqwestTransport::default(),
            token_store: Arc::new(MemoryTokenStore::default()),
            navigator: Arc::new(NoopNavigator),
        }
    }
}

impl<T: Transport> PipelineBuilder<T> {
    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the HTTP transport.
    pub fn transport<U: Transport>(self, transport: U) -> PipelineBuilder<U> {
        PipelineBuilder {
            options: self.options,
            transport,
            token_store: self.token_store,
            navigator: self.navigator,
        }
    }

    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = store;
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Validates the options and starts the queue pump.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<HttpPipeline<T>> {
        self.options.validate().map_err(PipelineError::Config)?;
        let handle = Handle::try_current().map_err(|_| {
            PipelineError::Config("the pipeline must be built inside a tokio runtime".to_owned())
        })?;

        let cache = Arc::new(ResponseCache::new(self.options.cache_ttl));
        let session = Session::new(
            self.token_store,
            self.navigator,
            Arc::clone(&cache),
            self.options.client_version.clone(),
        );
        let shared = Arc::new(Shared {
            cache,
            transport: self.transport,
            options: self.options,
            session,
        });
        let queue = Throttler::start(Arc::clone(&shared), &handle);
        Ok(HttpPipeline { shared, queue })
    }
}

/// Outbound request pipeline for the back-office API.
///
/// Queued requests are dispatched one at a time with a pause between them,
/// GET responses are cached, transient failures and 429s are retried, and
/// 401/403 responses end the session. Clones share all state.
pub struct HttpPipeline<T = ReqwestTransport> {
    shared: Arc<Shared<T>>,
    queue: Throttler,
}

impl<T> Clone for HttpPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            queue: self.queue.clone(),
        }
    }
}

impl<T> fmt::Debug for HttpPipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("options", &self.shared.options)
            .field("session", &self.shared.session)
            .field("cached", &self.shared.cache.len())
            .finish()
    }
}

impl HttpPipeline<ReqwestTransport> {
    pub fn builder(options: PipelineOptions) -> PipelineBuilder<ReqwestTransport> {
        PipelineBuilder::new(options)
    }

    /// Pipeline with default options against `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(PipelineOptions::new(base_url)).build()
    }

    /// Pipeline configured from `BACKOFFICE_*` environment variables.
    ///
    /// See [`PipelineOptions::from_env`].
    pub fn from_env() -> Result<Self> {
        let options = PipelineOptions::from_env().map_err(PipelineError::Config)?;
        Self::builder(options).build()
    }
}

impl<T: Transport> HttpPipeline<T> {
    pub fn options(&self) -> &PipelineOptions {
        &self.shared.options
    }

    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    pub fn session_state(&self) -> SessionState {
        self.shared.session.state()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.shared.cache
    }

    pub fn clear_cache(&self) {
        self.shared.cache.clear();
    }

    /// Issues a request through the pipeline.
    ///
    /// A live cached GET short-circuits everything. Auth endpoints skip the
    /// queue. Failures are retried per [`RetryPolicy`], each retry going to
    /// the back of the queue after its backoff. Every failed attempt is
    /// logged; the final error is handed to the session interceptor and then
    /// returned as-is.
    pub async fn send(&self, spec: RequestSpec) -> Result<ApiResponse> {
        self.shared.session.check_expiry();
        let bypass_queue = spec.is_auth_endpoint();
        if !bypass_queue {
            if let Some(hit) = spec.cache_key().and_then(|key| self.shared.cache.get(&key)) {
                return Ok(hit);
            }
        }

        let policy = RetryPolicy::for_request(&self.shared.options, &spec);
        let mut state = RetryState::default();
        loop {
            let outcome = if bypass_queue {
                self.shared.dispatch(&spec).await
            } else {
                self.queue.enqueue(spec.clone()).await
            };
            let error = match outcome {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };
            self.shared
                .session
                .record_failure(&spec, &error, &self.shared.options.quiet_not_found);

            match policy.next(&mut state, &error) {
                #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
                RetryDecision::RateLimited { attempt, delay }
                | RetryDecision::Transient { attempt, delay } => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        method = %spec.method,
                        path = %spec.path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying api request"
                    );
                    sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    self.shared.session.after_failure(&spec, &error);
                    return Err(error);
                }
            }
        }
    }

    pub async fn get(&self, path: impl Into<String>) -> Result<ApiResponse> {
        self.send(RequestSpec::get(path)).await
    }
}
