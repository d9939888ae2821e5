//! Scripted HTTP client for analyzer unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use webaudit_core::{CoreError, CoreResult, HttpClient, HttpErrorKind, HttpRequest, HttpResponse};

/// Answers requests from a table keyed by URL; unknown URLs fail to connect.
#[derive(Default)]
pub struct ScriptedHttp {
    routes: Mutex<HashMap<String, Result<HttpResponse, HttpErrorKind>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        let response = HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_string(),
            final_url: url.to_string(),
        };
        self.routes.lock().unwrap().insert(url.to_string(), Ok(response));
        self
    }

    pub fn fail(self, url: &str, kind: HttpErrorKind) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), Err(kind));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn request(&self, request: HttpRequest) -> CoreResult<HttpResponse> {
        let route = self.routes.lock().unwrap().get(&request.url).cloned();
        self.requests.lock().unwrap().push(request.clone());
        match route {
            Some(Ok(response)) => Ok(response),
            Some(Err(kind)) => Err(CoreError::http(kind, format!("scripted failure for {}", request.url))),
            None => Err(CoreError::http(HttpErrorKind::Connect, "connection refused")),
        }
    }
}
