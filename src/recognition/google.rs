//! Google Cloud Speech-to-Text client (v1 REST, synchronous recognize).

use super::credentials::{CredentialSource, TokenProvider};
use super::Recognizer;
use crate::config::RecognitionSettings;
use crate::error::{Result, StemmeError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// How requests to the Speech API are authorized.
#[derive(Debug)]
enum Auth {
    None,
    ApiKey(String),
    Bearer(TokenProvider),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig {
    language_code: String,
    enable_automatic_punctuation: bool,
    profanity_filter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    config: &'a RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Recognizer backed by the Google Cloud Speech-to-Text API.
pub struct GoogleSpeechRecognizer {
    client: reqwest::Client,
    endpoint: String,
    config: RecognitionConfig,
    auth: Auth,
}

impl GoogleSpeechRecognizer {
    /// Create a recognizer from settings and already-resolved credentials.
    pub fn new(settings: &RecognitionSettings, credentials: CredentialSource) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        let auth = match credentials {
            CredentialSource::None => Auth::None,
            CredentialSource::ApiKey(key) => Auth::ApiKey(key),
            CredentialSource::ServiceAccount(key) => {
                Auth::Bearer(TokenProvider::new(key, client.clone())?)
            }
            CredentialSource::AuthorizedUser(user) => {
                Auth::Bearer(TokenProvider::for_user(user, client.clone()))
            }
        };

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            config: RecognitionConfig {
                language_code: settings.language.clone(),
                enable_automatic_punctuation: settings.enable_punctuation,
                profanity_filter: settings.profanity_filter,
                model: settings.model.clone().filter(|m| !m.is_empty()),
            },
            auth,
        })
    }

    fn recognize_url(&self) -> String {
        format!("{}/v1/speech:recognize", self.endpoint)
    }
}

/// Joins the top alternative of every result into one transcript.
///
/// Each result covers a consecutive stretch of audio.
fn transcript_from(response: RecognizeResponse) -> Result<String> {
    let parts: Vec<String> = response
        .results
        .into_iter()
        .filter_map(|r| r.alternatives.into_iter().next())
        .map(|alt| {
            debug!(confidence = ?alt.confidence, "Recognized segment");
            alt.transcript.trim().to_string()
        })
        .filter(|t| !t.is_empty())
        .collect();

    if parts.is_empty() {
        return Err(StemmeError::SpeechNotRecognized);
    }

    Ok(parts.join(" "))
}

#[async_trait]
impl Recognizer for GoogleSpeechRecognizer {
    #[instrument(skip_all, fields(bytes = wav.len()))]
    async fn recognize(&self, wav: &[u8]) -> Result<String> {
        let body = RecognizeRequest {
            config: &self.config,
            audio: RecognitionAudio {
                content: STANDARD.encode(wav),
            },
        };

        let mut request = self.client.post(self.recognize_url()).json(&body);
        match &self.auth {
            Auth::None => {}
            Auth::ApiKey(key) => request = request.query(&[("key", key)]),
            Auth::Bearer(provider) => request = request.bearer_auth(provider.access_token().await?),
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(text);
            return Err(StemmeError::Recognition(format!("{} ({})", message, status)));
        }

        let parsed: RecognizeResponse = response.json().await?;
        let transcript = transcript_from(parsed)?;
        info!(chars = transcript.len(), "Speech recognized");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> RecognitionSettings {
        RecognitionSettings {
            endpoint: server.uri(),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_transcript_joins_results() {
        let response: RecognizeResponse = serde_json::from_value(serde_json::json!({
            "results": [
                { "alternatives": [{ "transcript": "hello there ", "confidence": 0.93 },
                                   { "transcript": "hello bear" }] },
                { "alternatives": [{ "transcript": " general Kenobi" }] }
            ]
        }))
        .unwrap();

        assert_eq!(transcript_from(response).unwrap(), "hello there general Kenobi");
    }

    #[test]
    fn test_empty_response_is_not_recognized() {
        let response: RecognizeResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            transcript_from(response),
            Err(StemmeError::SpeechNotRecognized)
        ));

        let response: RecognizeResponse = serde_json::from_value(serde_json::json!({
            "results": [{ "alternatives": [{ "transcript": "   " }] }, { "alternatives": [] }]
        }))
        .unwrap();
        assert!(matches!(
            transcript_from(response),
            Err(StemmeError::SpeechNotRecognized)
        ));
    }

    #[test]
    fn test_request_shape() {
        let config = RecognitionConfig {
            language_code: "en-US".into(),
            enable_automatic_punctuation: true,
            profanity_filter: false,
            model: None,
        };
        let body = serde_json::to_value(RecognizeRequest {
            config: &config,
            audio: RecognitionAudio { content: STANDARD.encode(b"RIFF") },
        })
        .unwrap();

        assert_eq!(body["config"]["languageCode"], "en-US");
        assert_eq!(body["config"]["enableAutomaticPunctuation"], true);
        assert!(body["config"].get("model").is_none());
        assert_eq!(body["audio"]["content"], "UklGRg==");
    }

    #[tokio::test]
    async fn test_recognize_with_api_key() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/speech:recognize"))
            .and(query_param("key", "AIza-test"))
            .and(body_partial_json(serde_json::json!({
                "config": { "languageCode": "en-US" },
                "audio": { "content": "UklGRg==" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{ "alternatives": [{ "transcript": "testing one two", "confidence": 0.9 }] }]
            })))
            .mount(&server)
            .await;

        let recognizer = GoogleSpeechRecognizer::new(
            &settings_for(&server),
            CredentialSource::ApiKey("AIza-test".into()),
        )
        .unwrap();

        assert_eq!(recognizer.recognize(b"RIFF").await.unwrap(), "testing one two");
    }

    #[tokio::test]
    async fn test_recognize_with_service_account() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.speech",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/speech:recognize"))
            .and(header("authorization", "Bearer ya29.speech"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{ "alternatives": [{ "transcript": "authorized" }] }]
            })))
            .mount(&server)
            .await;

        let mut key = crate::recognition::ServiceAccountKey::from_json(include_str!(
            "../../tests/fixtures/service_account.json"
        ))
        .unwrap();
        key.token_uri = format!("{}/token", server.uri());

        let recognizer = GoogleSpeechRecognizer::new(
            &settings_for(&server),
            CredentialSource::ServiceAccount(key),
        )
        .unwrap();

        assert_eq!(recognizer.recognize(b"RIFF").await.unwrap(), "authorized");
    }

    #[tokio::test]
    async fn test_recognize_with_user_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.user",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/speech:recognize"))
            .and(header("authorization", "Bearer ya29.user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{ "alternatives": [{ "transcript": "signed in" }] }]
            })))
            .mount(&server)
            .await;

        let mut user = crate::recognition::AuthorizedUser::from_json(include_str!(
            "../../tests/fixtures/authorized_user.json"
        ))
        .unwrap();
        user.token_uri = format!("{}/token", server.uri());

        let recognizer = GoogleSpeechRecognizer::new(
            &settings_for(&server),
            CredentialSource::AuthorizedUser(user),
        )
        .unwrap();

        assert_eq!(recognizer.recognize(b"RIFF").await.unwrap(), "signed in");
    }

    #[tokio::test]
    async fn test_silence_is_not_recognized() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/speech:recognize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalBilledTime": "1s"
            })))
            .mount(&server)
            .await;

        let recognizer =
            GoogleSpeechRecognizer::new(&settings_for(&server), CredentialSource::None).unwrap();

        assert!(matches!(
            recognizer.recognize(b"RIFF").await,
            Err(StemmeError::SpeechNotRecognized)
        ));
    }

    #[tokio::test]
    async fn test_service_error_message_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/speech:recognize"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {
                    "code": 403,
                    "message": "Cloud Speech-to-Text API has not been used in project 0",
                    "status": "PERMISSION_DENIED"
                }
            })))
            .mount(&server)
            .await;

        let recognizer =
            GoogleSpeechRecognizer::new(&settings_for(&server), CredentialSource::None).unwrap();

        let err = recognizer.recognize(b"RIFF").await.unwrap_err();
        assert!(matches!(err, StemmeError::Recognition(_)));
        assert!(err.to_string().contains("has not been used in project"));
        assert!(err.to_string().contains("403"));
    }
}
