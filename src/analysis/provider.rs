use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{analysis::image::ChartImage, config::AnalysisConfig};

/// Turns a ticker and a chart image into free-form commentary.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, ticker: &str, image: &ChartImage) -> anyhow::Result<String>;
}

pub fn build_prompt(ticker: &str) -> String {
    format!(
        "Analyze stock ${ticker} based on the provided image.\n\
         Market Performance: Briefly compare actual market performance to the predicted price trend.\n\
         Risk Factors: Suggest concise entry and exit strategies for both traders and investors.\n\
         Market Trend: Identify the overall market trend based on the image.\n\
         Provide concise, actionable insights with no explanations."
    )
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Google Generative Language `generateContent` over REST.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(cfg: &AnalysisConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build gemini http client")?;
        Ok(Self {
            client,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl AnalysisProvider for GeminiClient {
    async fn analyze(&self, ticker: &str, image: &ChartImage) -> anyhow::Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            anyhow::bail!("GEMINI_API_KEY is not configured");
        };

        let payload = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text {
                        text: build_prompt(ticker),
                    },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: &image.mime_type,
                            data: STANDARD.encode(&image.bytes),
                        },
                    },
                ],
            }],
        };

        let resp = self
            .client
            .post(self.api_url())
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await
            .context("gemini request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("gemini returned {status}: {body}");
        }

        let parsed: GenerateContentResponse =
            resp.json().await.context("invalid gemini response JSON")?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|t| !t.trim().is_empty())
            .context("gemini response has no text candidate")?;

        debug!(model = %self.model, chars = text.len(), "analysis generated");
        Ok(text)
    }
}
