use std::{collections::BTreeMap, future::Future, time::Duration};

use reqwest::{header, multipart, Method};

use crate::{
    error::TransportError,
    request::RequestBody,
    response::{parse_body, ApiResponse},
};

/// A fully resolved outbound call.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The HTTP client the pipeline wraps.
///
/// Every HTTP status is an `Ok`; `Err` means no status was received.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<ApiResponse, TransportError> {
        let timeout = request.timeout;
        let mut builder = self
            .http
            .request(request.method, &request.url)
            .timeout(timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            Some(RequestBody::Json(body)) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .json(&body),
            Some(RequestBody::Multipart { files, fields }) => {
                builder.multipart(build_form(files, fields)?)
            }
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|err| classify(err, timeout))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect::<BTreeMap<_, _>>();
        let text = response
            .text()
            .await
            .map_err(|err| classify(err, timeout))?;

        Ok(ApiResponse {
            status,
            headers,
            data: parse_body(&text),
        })
    }
}

fn build_form(
    files: Vec<crate::FilePart>,
    fields: Vec<(String, String)>,
) -> Result<multipart::Form, TransportError> {
    let mut form = multipart::Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for file in files {
        let part = multipart::Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.content_type)
            .map_err(|err| TransportError::Request(format!("invalid content type: {err}")))?;
        form = form.part(file.field, part);
    }
    Ok(form)
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_builder() {
        TransportError::Request(err.to_string())
    } else {
        TransportError::Reqwest(err)
    }
}
