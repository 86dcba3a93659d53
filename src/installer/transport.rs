//! Pluggable fetch transport with streamed progress and cooperative abort.

use crate::error::InstallError;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Bytes received so far and the announced total, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Triggers cancellation of every operation holding a matching [`AbortSignal`].
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation signal threaded through fetch and clone.
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn pair() -> (AbortHandle, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once abort is requested. Never resolves if the handle is
    /// dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// One GET request.
#[derive(Clone, Default)]
pub struct FetchRequest {
    pub url: String,
    pub progress: Option<ProgressFn>,
    pub abort: Option<AbortSignal>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Fully collected response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, InstallError>;
}

/// Transport over `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, InstallError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cucumber-host/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InstallError::Transport {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn download(&self, request: &FetchRequest) -> Result<FetchResponse, InstallError> {
        let transport_error = |e: reqwest::Error| InstallError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let total = response.content_length();

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport_error)?;
            body.extend_from_slice(&chunk);
            if let Some(progress) = &request.progress {
                progress(Progress {
                    loaded: body.len() as u64,
                    total,
                });
            }
        }

        debug!(url = %request.url, status, bytes = body.len(), "Fetched");
        Ok(FetchResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, InstallError> {
        match &request.abort {
            Some(signal) => {
                if signal.is_aborted() {
                    return Err(InstallError::Aborted(request.url.clone()));
                }
                tokio::select! {
                    result = self.download(&request) => result,
                    _ = signal.aborted() => Err(InstallError::Aborted(request.url.clone())),
                }
            }
            None => self.download(&request).await,
        }
    }
}
