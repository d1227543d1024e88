use anyhow::{Context, Result, anyhow, bail};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tally_finance::CompletionBackend;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::OpenAI => "https://api.openai.com",
        }
    }

    pub fn default_key_env(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAI),
            other => bail!("unknown llm provider '{other}' (expected openai or anthropic)"),
        }
    }
}

/// Chat-completion client for one provider. Blocking from the caller's side.
#[derive(Clone)]
pub struct HttpBackend {
    provider: Provider,
    model: String,
    base_url: String,
    temperature: f32,
    api_key: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(
        provider: Provider,
        model: impl Into<String>,
        base_url: Option<&str>,
        temperature: f32,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            provider,
            model: model.into(),
            base_url: base_url
                .unwrap_or(provider.default_base_url())
                .trim_end_matches('/')
                .to_string(),
            temperature,
            api_key: api_key.into(),
            client,
        })
    }

    /// `Ok(None)` when the configured key variable is unset or empty.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let provider = cfg.provider()?;
        let key_env = cfg.api_key_env()?;
        let Some(key) = std::env::var(&key_env).ok().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let backend = Self::new(
            provider,
            cfg.model(),
            cfg.llm.base_url.as_deref(),
            cfg.llm.temperature,
            key.trim(),
            Duration::from_secs(cfg.llm.timeout_secs.max(1)),
        )?;
        Ok(Some(backend))
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_async(&self, system: &str, user: &str) -> Result<String> {
        match self.provider {
            Provider::Anthropic => self.anthropic_complete(system, user).await,
            Provider::OpenAI => self.openai_complete(system, user).await,
        }
    }

    async fn anthropic_complete(&self, system: &str, user: &str) -> Result<String> {
        let body = anthropic_request(&self.model, system, user, self.temperature);

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .context("anthropic request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("anthropic error: {status} {txt}");
        }

        let out: AnthropicResp = resp.json().await.context("parse anthropic response")?;
        Ok(out.text())
    }

    async fn openai_complete(&self, system: &str, user: &str) -> Result<String> {
        let body = openai_request(&self.model, system, user, self.temperature);

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("openai error: {status} {txt}");
        }

        let out: OpenAiResp = resp.json().await.context("parse openai response")?;
        out.text()
    }
}

impl CompletionBackend for HttpBackend {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        // Under #[tokio::main] a nested block_on panics, so step out of the
        // worker with block_in_place and reuse the running handle.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| handle.block_on(self.complete_async(system, user)))
        } else {
            let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
            rt.block_on(self.complete_async(system, user))
        }
    }
}

#[derive(Debug, Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicReq<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}

fn openai_request<'a>(model: &'a str, system: &'a str, user: &'a str, temperature: f32) -> OpenAiReq<'a> {
    OpenAiReq {
        model,
        messages: vec![
            Msg {
                role: "system",
                content: system,
            },
            Msg {
                role: "user",
                content: user,
            },
        ],
        temperature,
    }
}

fn anthropic_request<'a>(
    model: &'a str,
    system: &'a str,
    user: &'a str,
    temperature: f32,
) -> AnthropicReq<'a> {
    AnthropicReq {
        model,
        max_tokens: 300,
        system,
        messages: vec![Msg {
            role: "user",
            content: user,
        }],
        temperature,
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResp {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MsgOut,
}

#[derive(Debug, Deserialize)]
struct MsgOut {
    content: Option<String>,
}

impl OpenAiResp {
    fn text(self) -> Result<String> {
        let content = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("openai response has no message content"))?;
        Ok(content.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResp {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    t: String,
    text: Option<String>,
}

impl AnthropicResp {
    fn text(self) -> String {
        let mut s = String::new();
        for b in self.content {
            if b.t == "text" {
                if let Some(t) = b.text {
                    s.push_str(&t);
                }
            }
        }
        s.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_names() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert_eq!(" anthropic ".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert!("gemini".parse::<Provider>().is_err());
    }

    #[test]
    fn test_openai_request_body() {
        let body = serde_json::to_value(openai_request("gpt-4o-mini", "sys", "usr", 0.0)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "usr"}
                ],
                "temperature": 0.0
            })
        );
    }

    #[test]
    fn test_anthropic_request_body() {
        let body = serde_json::to_value(anthropic_request("claude", "sys", "usr", 0.0)).unwrap();
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "usr"}));
        assert_eq!(body["max_tokens"], 300);
    }

    #[test]
    fn test_response_text() {
        let openai: OpenAiResp = serde_json::from_value(json!({
            "choices": [{"message": {"content": "  {\"category\": \"Dining\"}\n"}}]
        }))
        .unwrap();
        assert_eq!(openai.text().unwrap(), "{\"category\": \"Dining\"}");

        let empty: OpenAiResp = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(empty.text().is_err());

        let anthropic: AnthropicResp = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "{\"category\":"},
                {"type": "tool_use"},
                {"type": "text", "text": " \"Dining\"}"}
            ]
        }))
        .unwrap();
        assert_eq!(anthropic.text(), "{\"category\": \"Dining\"}");
    }

    #[test]
    fn test_base_url_defaults_and_trims() {
        let b = HttpBackend::new(Provider::OpenAI, "m", None, 0.0, "k", Duration::from_secs(5)).unwrap();
        assert_eq!(b.base_url, "https://api.openai.com");
        let b = HttpBackend::new(
            Provider::Anthropic,
            "m",
            Some("http://localhost:8080/"),
            0.0,
            "k",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(b.base_url, "http://localhost:8080");
    }
}
