//! HTTP speech synthesizer.
//!
//! Posts `{"text", "voice", "rate"}` as JSON and treats the response body as
//! encoded audio. Nothing else about the provider is assumed.

use async_trait::async_trait;
use lector_core::{SynthesisFailure, SynthesisOptions, SynthesizerPort};
use serde::Serialize;

use crate::error::CliError;

/// Request body sent to the endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate: Option<f32>,
}

/// Synthesizer backed by a single HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    defaults: SynthesisOptions,
}

impl HttpSynthesizer {
    /// Create a synthesizer for `endpoint`.
    ///
    /// `defaults` fill in voice parameters a request leaves unset.
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        defaults: SynthesisOptions,
    ) -> Result<Self, CliError> {
        let url = reqwest::Url::parse(endpoint).map_err(|e| {
            CliError::Arguments(format!("invalid synthesis URL '{endpoint}': {e}"))
        })?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("lector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CliError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: url.to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
            defaults,
        })
    }

    fn body<'a>(&'a self, text: &'a str, options: &'a SynthesisOptions) -> SynthesisBody<'a> {
        SynthesisBody {
            text,
            voice: options.voice.as_deref().or(self.defaults.voice.as_deref()),
            rate: options.rate.or(self.defaults.rate),
        }
    }
}

#[async_trait]
impl SynthesizerPort for HttpSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<Vec<u8>, SynthesisFailure> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.body(text, options));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        if let Some(failure) = SynthesisFailure::from_status(status, "") {
            let detail = response.text().await.unwrap_or_default();
            tracing::debug!(
                target: "lector.cli",
                status,
                detail = %detail,
                "Synthesis endpoint rejected request"
            );
            return Err(SynthesisFailure::from_status(status, detail.trim()).unwrap_or(failure));
        }

        let bytes = response.bytes().await.map_err(classify)?;
        Ok(bytes.to_vec())
    }
}

/// Classify a transport error.
fn classify(err: reqwest::Error) -> SynthesisFailure {
    if err.is_timeout() {
        SynthesisFailure::Timeout
    } else if err.is_connect() {
        SynthesisFailure::network(err.to_string())
    } else {
        // Body and protocol errors; retryability is inferred from the message
        SynthesisFailure::other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the request body.
    async fn serve_once(
        status_line: &'static str,
        body: &'static [u8],
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/tts", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&received).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if received.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            let head = format!(
                "{status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();

            let text = String::from_utf8_lossy(&received).to_string();
            text.split_once("\r\n\r\n").unwrap().1.to_string()
        });

        (url, handle)
    }

    #[tokio::test]
    async fn test_audio_bytes_are_returned() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", b"ID3-audio").await;
        let synth = HttpSynthesizer::new(
            &url,
            None,
            SynthesisOptions::default().with_voice("alloy"),
        )
        .unwrap();

        let bytes = synth
            .synthesize("Hello there.", &SynthesisOptions::default().with_rate(1.5))
            .await
            .unwrap();
        assert_eq!(bytes, b"ID3-audio");

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["text"], "Hello there.");
        assert_eq!(sent["voice"], "alloy");
        assert_eq!(sent["rate"], 1.5);
    }

    #[tokio::test]
    async fn test_server_errors_are_retryable() {
        let (url, _server) = serve_once("HTTP/1.1 503 Service Unavailable", b"busy").await;
        let synth = HttpSynthesizer::new(&url, None, SynthesisOptions::default()).unwrap();

        let failure = synth
            .synthesize("Hello.", &SynthesisOptions::default())
            .await
            .unwrap_err();
        assert_eq!(failure, SynthesisFailure::Server { status: 503 });
        assert!(failure.is_retryable());
    }

    #[tokio::test]
    async fn test_bad_request_is_terminal() {
        let (url, _server) = serve_once("HTTP/1.1 400 Bad Request", b"text too long").await;
        let synth = HttpSynthesizer::new(&url, None, SynthesisOptions::default()).unwrap();

        let failure = synth
            .synthesize("Hello.", &SynthesisOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            failure,
            SynthesisFailure::invalid_input("HTTP 400: text too long")
        );
        assert!(!failure.is_retryable());
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/tts", listener.local_addr().unwrap());
        drop(listener);

        let synth = HttpSynthesizer::new(&url, None, SynthesisOptions::default()).unwrap();
        let failure = synth
            .synthesize("Hello.", &SynthesisOptions::default())
            .await
            .unwrap_err();
        assert!(failure.is_retryable());
    }

    #[test]
    fn test_invalid_url_is_argument_error() {
        let err = HttpSynthesizer::new("not a url", None, SynthesisOptions::default()).unwrap_err();
        assert!(matches!(err, CliError::Arguments(_)));
    }
}
