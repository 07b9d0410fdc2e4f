//! Cloud speech-to-text backends

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::recognition::{PcmAudio, Recognizer, normalize_transcript, pcm_to_wav};
use crate::config::{SttConfig, SttProvider};
use crate::{Error, Result};

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Recognizes speech through a hosted transcription API
pub struct CloudRecognizer {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    language: String,
    base_url: String,
    provider: SttProvider,
}

impl CloudRecognizer {
    /// Create a recognizer from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(config: &SttConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .map(|k| SecretString::from(k.expose_secret().to_string()))
            .ok_or_else(|| {
                Error::Config(format!("API key required for {:?} STT", config.provider))
            })?;

        match config.provider {
            SttProvider::Whisper => {
                Self::new_whisper(api_key, config.model.clone(), config.language.clone())
            }
            SttProvider::Deepgram => {
                Self::new_deepgram(api_key, config.model.clone(), config.language.clone())
            }
        }
    }

    /// Create a recognizer using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new_whisper(api_key: SecretString, model: String, language: String) -> Result<Self> {
        Self::new(
            api_key,
            model,
            language,
            "https://api.openai.com/v1",
            SttProvider::Whisper,
        )
    }

    /// Create a recognizer using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new_deepgram(api_key: SecretString, model: String, language: String) -> Result<Self> {
        Self::new(
            api_key,
            model,
            language,
            "https://api.deepgram.com/v1",
            SttProvider::Deepgram,
        )
    }

    fn new(
        api_key: SecretString,
        model: String,
        language: String,
        base_url: &str,
        provider: SttProvider,
    ) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config(format!(
                "API key required for {provider:?} STT"
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            language,
            base_url: base_url.to_string(),
            provider,
        })
    }

    /// Point the recognizer at a different API host (proxies, self-hosted)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Which backend this recognizer talks to
    #[must_use]
    pub const fn provider(&self) -> SttProvider {
        self.provider
    }

    /// Transcribe using `OpenAI` Whisper
    async fn transcribe_whisper(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| unavailable("Whisper", &e))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .multipart(form)
            .send()
            .await
            .map_err(|e| unavailable("Whisper", &e))?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ServiceUnavailable(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| unavailable("Whisper", &e))?;
        let result: WhisperResponse = parse_body("Whisper", &body)?;

        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, wav: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Deepgram transcription");

        let url = format!(
            "{}/listen?model={}&language={}&punctuate=false",
            self.base_url, self.model, self.language
        );

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Token {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "audio/wav")
            .body(wav)
            .send()
            .await
            .map_err(|e| unavailable("Deepgram", &e))?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ServiceUnavailable(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| unavailable("Deepgram", &e))?;
        let result: DeepgramResponse = parse_body("Deepgram", &body)?;

        Ok(result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Recognizer for CloudRecognizer {
    fn name(&self) -> &'static str {
        match self.provider {
            SttProvider::Whisper => "whisper",
            SttProvider::Deepgram => "deepgram",
        }
    }

    async fn recognize(&self, audio: PcmAudio<'_>) -> Result<String> {
        let wav = pcm_to_wav(audio).map_err(|e| {
            Error::ServiceUnavailable(format!("could not encode audio for {}: {e}", self.name()))
        })?;

        let transcript = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(wav).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(wav).await?,
        };

        normalize_transcript(&transcript)
    }
}

fn unavailable(service: &str, err: &reqwest::Error) -> Error {
    Error::ServiceUnavailable(format!("{service} request failed: {err}"))
}

/// Decode a success body; anything unexpected counts as a service failure
fn parse_body<T: serde::de::DeserializeOwned>(service: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        tracing::debug!(service, error = %e, "unexpected response body");
        Error::ServiceUnavailable(format!("{service} returned a malformed response: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_config_error() {
        let config = SttConfig {
            provider: SttProvider::Deepgram,
            model: "nova-2".to_string(),
            language: "ko".to_string(),
            api_key: None,
            timeout: None,
        };

        assert!(matches!(
            CloudRecognizer::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_blank_key_rejected() {
        let result = CloudRecognizer::new_whisper(
            SecretString::from("  ".to_string()),
            "whisper-1".to_string(),
            "ko".to_string(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_base_url_override() {
        let recognizer = CloudRecognizer::new_whisper(
            SecretString::from("sk-test".to_string()),
            "whisper-1".to_string(),
            "ko".to_string(),
        )
        .unwrap()
        .with_base_url("http://localhost:9000/v1/");

        assert_eq!(recognizer.base_url, "http://localhost:9000/v1");
        assert_eq!(recognizer.name(), "whisper");
    }

    #[test]
    fn test_deepgram_response_shape() {
        let body = r#"{"results":{"channels":[{"alternatives":[{"transcript":"뮤직봇 스킵"}]}]}}"#;
        let parsed: DeepgramResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.channels[0].alternatives[0].transcript, "뮤직봇 스킵");
    }

    /// Serve one canned HTTP response on a local port
    async fn serve_once(content_type: &'static str, body: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Read the whole request so closing doesn't reset the connection
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    fn deepgram(base_url: String) -> CloudRecognizer {
        CloudRecognizer::new_deepgram(
            SecretString::from("dg-test".to_string()),
            "nova-2".to_string(),
            "ko".to_string(),
        )
        .unwrap()
        .with_base_url(base_url)
    }

    #[tokio::test]
    async fn test_html_body_is_unavailable() {
        let base_url = serve_once("text/html", "<html>proxy error</html>".to_string()).await;

        let data = vec![0u8; 64];
        let result = deepgram(base_url)
            .recognize(PcmAudio {
                data: &data,
                channels: 2,
                sample_rate: 48_000,
            })
            .await;

        assert!(matches!(result, Err(Error::ServiceUnavailable(_))), "{result:?}");
    }

    #[tokio::test]
    async fn test_transcript_is_normalized() {
        let body = r#"{"results":{"channels":[{"alternatives":[{"transcript":"  뮤직봇 스킵 "}]}]}}"#;
        let base_url = serve_once("application/json", body.to_string()).await;

        let data = vec![0u8; 64];
        let text = deepgram(base_url)
            .recognize(PcmAudio {
                data: &data,
                channels: 2,
                sample_rate: 48_000,
            })
            .await
            .unwrap();

        assert_eq!(text, "뮤직봇 스킵");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let data = vec![0u8; 64];
        let result = deepgram("http://127.0.0.1:9".to_string())
            .recognize(PcmAudio {
                data: &data,
                channels: 2,
                sample_rate: 48_000,
            })
            .await;

        assert!(matches!(result, Err(Error::ServiceUnavailable(_))));
    }
}
