// API client module: an async HTTP client for the remote execution
// service. It uploads the referenced files together with the command,
// streams the command's stdout back, lists what the command produced and
// fetches those files.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::ServiceEndpoint;
use crate::detect::FileSet;
use crate::error::{ReshError, Result, Step};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Acknowledgement of a created remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCommand {
    pub id: String,
}

/// A file the remote command left behind.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProducedFile {
    pub path: String,
}

/// The id is kept as a `serde_json::Value` because services disagree on
/// whether it is a number or a string.
#[derive(Deserialize, Debug)]
struct CreateResponse {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ListResponse {
    Bare(Vec<ProducedFile>),
    Wrapped { files: Vec<ProducedFile> },
}

/// Operations the orchestrator needs from the service.
#[async_trait]
pub trait CommandService: Send + Sync {
    /// Upload every file and submit the command. Returns on acknowledgement.
    async fn create(&self, command: &str, files: &FileSet) -> Result<CreatedCommand>;

    /// Copy remote stdout into `sink` until the remote command finishes.
    async fn stream_output(
        &self,
        command: &CreatedCommand,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()>;

    async fn list_files(&self, command: &CreatedCommand) -> Result<Vec<ProducedFile>>;

    /// Write the content of one produced file into `sink`, returning its size.
    async fn download(
        &self,
        command: &CreatedCommand,
        remote_path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64>;
}

/// HTTP implementation of [`CommandService`].
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    key: Option<String>,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(endpoint: &ServiceEndpoint) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("resh/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(ApiClient {
            client,
            base_url: endpoint.base_url.clone(),
            key: endpoint.credential_key.clone(),
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let req = self.client.request(method, url);
        match &self.key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send(step: Step, req: RequestBuilder) -> Result<Response> {
        let res = req.send().await.map_err(|e| ReshError::network(step, e))?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let message = res.text().await.unwrap_or_default();
            return Err(ReshError::ServiceError {
                step,
                file: None,
                status,
                message,
            });
        }
        Ok(res)
    }

    async fn upload_form(command: &str, files: &FileSet) -> Result<Form> {
        let mut form = Form::new().text("command", command.to_string());
        for (id, file) in files {
            let handle = tokio::fs::File::open(&file.absolute_path)
                .await
                .map_err(|e| ReshError::local_io(Step::Upload, &file.absolute_path, e))?;
            let len = handle
                .metadata()
                .await
                .map_err(|e| ReshError::local_io(Step::Upload, &file.absolute_path, e))?
                .len();
            debug!(id = %id, bytes = len, "attaching file");
            let body = Body::wrap_stream(ReaderStream::new(handle));
            let part = Part::stream_with_length(body, len).file_name(id.clone());
            form = form.part(id.clone(), part);
        }
        Ok(form)
    }

    /// Pipe a response body into `sink`, flushing every chunk.
    async fn pipe(
        step: Step,
        res: Response,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        sink_name: &str,
    ) -> Result<u64> {
        let mut written = 0u64;
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ReshError::network(step, e))?;
            sink.write_all(&chunk)
                .await
                .map_err(|e| ReshError::local_io(step, sink_name, e))?;
            sink.flush()
                .await
                .map_err(|e| ReshError::local_io(step, sink_name, e))?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }
}

#[async_trait]
impl CommandService for ApiClient {
    async fn create(&self, command: &str, files: &FileSet) -> Result<CreatedCommand> {
        let form = Self::upload_form(command, files).await?;
        info!(files = files.len(), "submitting command");
        let req = self
            .request(Method::POST, "/commands")
            .timeout(self.request_timeout)
            .multipart(form);
        let res = Self::send(Step::Create, req).await?;
        let status = res.status().as_u16();
        let body: CreateResponse = res
            .json()
            .await
            .map_err(|e| ReshError::network(Step::Create, e))?;

        if let Some(message) = body.error {
            return Err(ReshError::ServiceError {
                step: Step::Create,
                file: None,
                status,
                message,
            });
        }
        let id = match body.id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                return Err(ReshError::ServiceError {
                    step: Step::Create,
                    file: None,
                    status,
                    message: "response carried no command id".into(),
                })
            }
        };
        info!(id = %id, "command created");
        Ok(CreatedCommand { id })
    }

    async fn stream_output(
        &self,
        command: &CreatedCommand,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<()> {
        let req = self.request(Method::GET, &format!("/commands/{}/output", command.id));
        let res = Self::send(Step::Output, req).await?;
        let bytes = Self::pipe(Step::Output, res, sink, "<stdout>").await?;
        debug!(bytes, "remote output finished");
        Ok(())
    }

    async fn list_files(&self, command: &CreatedCommand) -> Result<Vec<ProducedFile>> {
        let req = self
            .request(Method::GET, &format!("/commands/{}/files", command.id))
            .timeout(self.request_timeout);
        let res = Self::send(Step::List, req).await?;
        let list: ListResponse = res
            .json()
            .await
            .map_err(|e| ReshError::network(Step::List, e))?;
        Ok(match list {
            ListResponse::Bare(files) | ListResponse::Wrapped { files } => files,
        })
    }

    async fn download(
        &self,
        command: &CreatedCommand,
        remote_path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let req = self
            .request(
                Method::GET,
                &format!("/commands/{}/files/download", command.id),
            )
            .query(&[("path", remote_path)])
            .timeout(self.request_timeout);
        let res = Self::send(Step::Download, req)
            .await
            .map_err(|e| e.for_file(remote_path))?;
        Self::pipe(Step::Download, res, sink, remote_path)
            .await
            .map_err(|e| e.for_file(remote_path))
    }
}
