//! Blocking HTTP client plugged into the engine's transport.

use async_trait::async_trait;
use mealsync_engine::{HttpClient, HttpRequest, HttpResponse};
use ureq::{Agent, RequestBuilder};

/// [`HttpClient`] backed by `ureq`, run on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct UreqClient;

#[async_trait]
impl HttpClient for UreqClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        // ureq is synchronous, so wrap in spawn_blocking
        tokio::task::spawn_blocking(move || execute_blocking(request))
            .await
            .map_err(|e| format!("task join error: {e}"))?
    }
}

fn execute_blocking(request: HttpRequest) -> Result<HttpResponse, String> {
    let agent: Agent = Agent::config_builder()
        .timeout_global(Some(request.timeout))
        .http_status_as_error(false)
        .build()
        .into();

    let url = request.url.as_str();
    let headers = request.headers.as_slice();
    let body = request.body.as_slice();

    let result = match request.method {
        "GET" => with_headers(agent.get(url), headers).call(),
        "DELETE" => with_headers(agent.delete(url), headers).call(),
        "POST" => with_headers(agent.post(url), headers).send(body),
        "PUT" => with_headers(agent.put(url), headers).send(body),
        "PATCH" => with_headers(agent.patch(url), headers).send(body),
        other => return Err(format!("unsupported method {other}")),
    };

    let mut response = result.map_err(|e| e.to_string())?;
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_vec()
        .map_err(|e| format!("failed to read response body: {e}"))?;

    Ok(HttpResponse { status, body })
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}
