use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SERVICE: &str = "text model";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Client for the hosted generative-text API.
pub struct GeminiClient {
    http: Client,
    base_url: Url,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        let base = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| Error::Config(format!("invalid text model endpoint: {e}")))?;
        Self::with_base_url(api_key, model, base)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: Url) -> Result<Self> {
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| Error::Config("GENIE_API_KEY is not a valid header value".into()))?;
        key.set_sensitive(true);

        let http = Client::builder()
            .default_headers(HeaderMap::from_iter([(
                HeaderName::from_static("x-goog-api-key"),
                key,
            )]))
            .build()
            .map_err(request_error)?;

        Ok(Self {
            http,
            base_url,
            model: model.trim_start_matches("models/").to_string(),
        })
    }

    /// Single-turn text generation. Returns the concatenated text of the first candidate.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = self.url(&format!("models/{}:generateContent", self.model))?;
        let request = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };

        debug!("Requesting text generation from {url}");
        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;
        let body: GenerateResponse = check_response(response)
            .await?
            .json()
            .await
            .map_err(request_error)?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyResponse(SERVICE));
        }
        Ok(text.to_string())
    }

    /// Every model visible to the API key, following pagination.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url("models")?;
            url.query_pairs_mut().append_pair("pageSize", "100");
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let response = self.http.get(url).send().await.map_err(request_error)?;
            let page: ListModelsResponse = check_response(response)
                .await?
                .json()
                .await
                .map_err(request_error)?;

            models.extend(page.models);
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }

    fn url(&self, suffix: &str) -> Result<Url> {
        self.base_url
            .join(suffix)
            .map_err(|e| Error::Config(format!("invalid text model url `{suffix}`: {e}")))
    }
}

async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::BadResponse {
        service: SERVICE,
        status: status.as_u16(),
        body,
    })
}

fn request_error(source: reqwest::Error) -> Error {
    Error::Request {
        service: SERVICE,
        source,
    }
}
