//! Automated participants.
//!
//! After a human message the room may ask an external chat-completion endpoint
//! (Ollama-style `POST /api/chat`) to speak as one of the AI personas. Failures
//! here are soft: the caller logs them and drops the turn.

use std::time::Duration;

use anyhow::{Context, bail};
use chatproto::persona::Persona;
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};

pub const DEFAULT_PROBABILITY: f64 = 0.8;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONTEXT_TURNS: usize = 5;
pub const PLACEHOLDER_REPLY: &str = "...";

const DIRECTIVE: &str = "You are chatting in a small room of people named after famous \
mathematicians. Stay in character at all times. Never reveal or hint that you are an AI \
or an automated participant. Reply like a person in a casual group chat: one or two short \
sentences, no lists, no greetings unless greeted. Now and then, when it fits, slip in a \
reference to mathematics.";

#[derive(Clone, Debug)]
pub struct ResponderConfig {
    /// Base URL of the completion service; `/api/chat` is appended.
    pub base_url: String,
    pub model: String,
    /// Chance that a human message triggers an AI turn. Clamped to `[0, 1]`.
    pub probability: f64,
    pub timeout: Duration,
    pub context_turns: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3".to_string(),
            probability: DEFAULT_PROBABILITY,
            timeout: DEFAULT_TIMEOUT,
            context_turns: DEFAULT_CONTEXT_TURNS,
        }
    }
}

pub struct Responder {
    cfg: ResponderConfig,
    http: reqwest::Client,
}

impl Responder {
    pub fn new(mut cfg: ResponderConfig) -> anyhow::Result<Self> {
        cfg.probability = if cfg.probability.is_nan() {
            0.0
        } else {
            cfg.probability.clamp(0.0, 1.0)
        };
        cfg.context_turns = cfg.context_turns.max(1);
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("build completion http client")?;
        Ok(Self { cfg, http })
    }

    pub fn context_turns(&self) -> usize {
        self.cfg.context_turns
    }

    pub fn should_fire<R: Rng>(&self, rng: &mut R) -> bool {
        rng.gen_bool(self.cfg.probability)
    }

    /// Ask the endpoint to continue `transcript` as `persona`.
    pub async fn complete(&self, persona: &Persona, transcript: &str) -> anyhow::Result<String> {
        let url = format!("{}/api/chat", self.cfg.base_url.trim_end_matches('/'));
        let req = json!({
            "model": self.cfg.model,
            "messages": [
                {"role": "system", "content": system_prompt(persona)},
                {"role": "user", "content": transcript},
            ],
            "stream": false,
        });

        let resp = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .context("completion request")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("completion http={}", status.as_u16());
        }

        let body = resp.text().await.context("completion body")?;
        let v: Value = serde_json::from_str(&body).context("completion body is not json")?;
        if !v.is_object() {
            bail!("completion body is not a json object");
        }
        Ok(extract_reply(&v))
    }
}

pub fn system_prompt(persona: &Persona) -> String {
    format!("Your name is {persona}. {DIRECTIVE}")
}

/// `message.content`, trimmed; the placeholder when absent or blank.
pub fn extract_reply(v: &Value) -> String {
    v.get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(PLACEHOLDER_REPLY)
        .to_string()
}

pub fn pick_speaker<R: Rng>(ai: &[Persona], rng: &mut R) -> Option<Persona> {
    ai.choose(rng).cloned()
}
