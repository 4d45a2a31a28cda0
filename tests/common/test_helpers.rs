use async_trait::async_trait;
use sendgrid_retry::{ApiRequest, ApiResponse, Client, ClientConfig, Transport, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays scripted outcomes in order and records every request it sees.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(self: &Arc<Self>, status: u16, body: &str) -> Arc<Self> {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(ApiResponse { status, body: body.to_string() }));
        self.clone()
    }

    pub fn respond_times(self: &Arc<Self>, times: usize, status: u16, body: &str) -> Arc<Self> {
        for _ in 0..times {
            self.respond(status, body);
        }
        self.clone()
    }

    pub fn fail(self: &Arc<Self>, message: &str) -> Arc<Self> {
        self.script.lock().unwrap().push_back(Err(TransportError::new(message)));
        self.clone()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn issue_request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("script exhausted")))
    }
}

pub fn client(transport: &Arc<ScriptedTransport>) -> Client<Arc<ScriptedTransport>> {
    Client::new(ClientConfig::new("SG.test-key"), transport.clone())
}

pub const RATE_LIMITED_BODY: &str = r#"{"errors":[{"field":null,"message":"too many requests"}]}"#;
