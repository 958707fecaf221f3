use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::auth::AccessToken;

/// Clips are at most a minute long; anything past this is not a clip.
const MAX_RESPONSE_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Bearer-authenticated GET against the camera frontend.
///
/// Non-2xx responses surface as `TransportError::Status`; timeouts and
/// connection failures as `TransportError::Transport`.
pub trait HttpTransport: Send {
    fn get(
        &mut self,
        url: &Url,
        token: &AccessToken,
        query: &[(&str, String)],
    ) -> Result<Vec<u8>, TransportError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn get(
        &mut self,
        url: &Url,
        token: &AccessToken,
        query: &[(&str, String)],
    ) -> Result<Vec<u8>, TransportError> {
        let mut request = self
            .agent
            .request_url("GET", url)
            .set("Authorization", &token.bearer_header());
        for (key, value) in query {
            request = request.query(key, value);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(TransportError::Status(code)),
            Err(ureq::Error::Transport(transport)) => {
                return Err(TransportError::Transport(transport.to_string()))
            }
        };

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES + 1)
            .read_to_end(&mut body)
            .map_err(|e| TransportError::Transport(format!("read body: {}", e)))?;
        if body.len() as u64 > MAX_RESPONSE_BYTES {
            return Err(TransportError::Transport(format!(
                "response exceeds {} bytes",
                MAX_RESPONSE_BYTES
            )));
        }
        Ok(body)
    }
}
