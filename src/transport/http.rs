//! HTTP implementation of [`Transport`] against the host backend

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::error::{TransportError, TransportResult};
use super::wire::{
    ConnectRequest, ConnectionInfo, PathRequest, RawListing, UploadResponse, WriteRequest,
    WriteResponse,
};
use super::Transport;

const PLUGIN_PREFIX: &str = "plugin/mastersd/";
const UPLOAD_ENDPOINT: &str = "api/files/local";
const CONNECTION_ENDPOINT: &str = "api/connection";
const API_KEY_HEADER: &str = "X-Api-Key";

/// Staging a file near the size limit takes far longer than any other call
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Blocking HTTP client for the MasterSD plugin endpoints
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    upload_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the host at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url)
    }

    /// Create a transport with a custom reqwest client
    pub fn with_client(client: Client, base_url: &str) -> TransportResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join replaces the last segment unless the base ends in a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            api_key: None,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        })
    }

    /// Send the host API key with every request
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Timeout for staging uploads, replacing the client-wide one
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    fn plugin_url(&self, call: &str) -> TransportResult<Url> {
        Ok(self.base_url.join(PLUGIN_PREFIX)?.join(call)?)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    fn get<T: DeserializeOwned>(&self, url: Url) -> TransportResult<T> {
        debug!(%url, "GET");
        let response = self.authorize(self.client.get(url)).send()?;
        Ok(check(response)?.json()?)
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, url: Url, body: &B) -> TransportResult<T> {
        debug!(%url, "POST");
        let response = self.authorize(self.client.post(url)).json(body).send()?;
        Ok(check(response)?.json()?)
    }

    /// POST whose response body carries nothing of interest
    fn post_unit<B: Serialize>(&self, url: Url, body: &B) -> TransportResult<()> {
        debug!(%url, "POST");
        let response = self.authorize(self.client.post(url)).json(body).send()?;
        check(response)?;
        Ok(())
    }
}

/// Turn a non-success status into an error carrying the backend's message
fn check(response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .unwrap_or_else(|_| "Unable to read error message".to_string());

    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

impl Transport for HttpTransport {
    fn serial_ports(&self) -> TransportResult<Vec<String>> {
        let info: ConnectionInfo = self.get(self.base_url.join(CONNECTION_ENDPOINT)?)?;
        Ok(info.options.ports)
    }

    fn connect(&self, ports: &[String]) -> TransportResult<Option<bool>> {
        self.post(self.plugin_url("connect")?, &ConnectRequest { ports })
    }

    fn disconnect(&self) -> TransportResult<()> {
        let url = self.plugin_url("disconnect")?;
        debug!(%url, "GET");
        let response = self.authorize(self.client.get(url)).send()?;
        check(response)?;
        Ok(())
    }

    fn switch_control(&self) -> TransportResult<Option<bool>> {
        self.get(self.plugin_url("switch_control")?)
    }

    fn get_info(&self) -> TransportResult<RawListing> {
        self.get(self.plugin_url("get_info")?)
    }

    fn mkdir(&self, path: &str) -> TransportResult<()> {
        self.post_unit(self.plugin_url("mkdir")?, &PathRequest { path })
    }

    fn rmdir(&self, path: &str) -> TransportResult<()> {
        self.post_unit(self.plugin_url("rmdir")?, &PathRequest { path })
    }

    fn delete(&self, path: &str) -> TransportResult<()> {
        self.post_unit(self.plugin_url("delete")?, &PathRequest { path })
    }

    fn upload(&self, file: &Path) -> TransportResult<String> {
        let url = self.base_url.join(UPLOAD_ENDPOINT)?;
        debug!(%url, file = %file.display(), "POST multipart");

        let form = multipart::Form::new().file("file", file)?;
        let response = self
            .authorize(self.client.post(url))
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()?;
        let upload: UploadResponse = check(response)?.json()?;

        upload.staged_name().map(str::to_string).ok_or_else(|| {
            TransportError::UploadRejected(format!(
                "host did not stage {}",
                file.display()
            ))
        })
    }

    fn write_sd(&self, request: &WriteRequest) -> TransportResult<WriteResponse> {
        self.post(self.plugin_url("write_sd")?, request)
    }
}
