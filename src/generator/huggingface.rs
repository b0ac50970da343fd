use crate::config::ModelConfig;
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SERVICE: &str = "caption model";
const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/models/";

/// Vision-to-text inference endpoint.
pub struct CaptionClient {
    http: Client,
    endpoint: Url,
    num_beams: u32,
    max_length: u32,
}

#[derive(Serialize)]
struct CaptionRequest<'a> {
    inputs: &'a str,
    parameters: CaptionParameters,
}

#[derive(Serialize)]
struct CaptionParameters {
    generate_kwargs: GenerateKwargs,
}

#[derive(Serialize)]
struct GenerateKwargs {
    num_beams: u32,
    max_length: u32,
}

#[derive(Deserialize)]
struct CaptionOutput {
    generated_text: String,
}

impl CaptionClient {
    pub fn new(token: &str, config: &ModelConfig) -> Result<Self> {
        let base = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| Error::Config(format!("invalid caption endpoint: {e}")))?;
        Self::with_base_url(token, config, base)
    }

    pub fn with_base_url(token: &str, config: &ModelConfig, base_url: Url) -> Result<Self> {
        let endpoint = base_url
            .join(&config.caption_model)
            .map_err(|e| Error::Config(format!("invalid caption model id: {e}")))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Config("HUGGINGFACE_TOKEN is not a valid header value".into()))?;
        auth.set_sensitive(true);

        let http = Client::builder()
            .default_headers(HeaderMap::from_iter([(AUTHORIZATION, auth)]))
            .build()
            .map_err(|source| Error::Request {
                service: SERVICE,
                source,
            })?;

        Ok(Self {
            http,
            endpoint,
            num_beams: config.num_beams,
            max_length: config.max_length,
        })
    }

    /// Captions an encoded image with beam search.
    pub async fn caption(&self, image: &[u8]) -> Result<String> {
        let encoded = STANDARD.encode(image);
        let request = CaptionRequest {
            inputs: &encoded,
            parameters: CaptionParameters {
                generate_kwargs: GenerateKwargs {
                    num_beams: self.num_beams,
                    max_length: self.max_length,
                },
            },
        };

        debug!("Requesting caption from {}", self.endpoint);
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|source| Error::Request {
                service: SERVICE,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BadResponse {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let outputs: Vec<CaptionOutput> = response.json().await.map_err(|source| Error::Request {
            service: SERVICE,
            source,
        })?;

        outputs
            .into_iter()
            .map(|output| output.generated_text.trim().to_string())
            .find(|text| !text.is_empty())
            .ok_or(Error::EmptyResponse(SERVICE))
    }
}
