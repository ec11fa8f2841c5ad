//! HTTP `AiPort` adapter: prompt-hash cache, token-bucket rate limiter,
//! and a dual-form reply parser. Retry-on-transient-failure is handled
//! by the `reqwest_middleware` stack built in `http_client_factory`;
//! this module owns only the cache, the limiter, and response shaping.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::errors::AiError;
use crate::domain::ports::{AiDecision, AiDecisionKind, AiPort, AiPromptContext};

struct CacheEntry {
    decision: AiDecision,
    inserted_at: Instant,
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1) as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn seconds_until_next_token(&self) -> f64 {
        if self.refill_per_sec <= 0.0 {
            f64::INFINITY
        } else {
            (1.0 - self.tokens).max(0.0) / self.refill_per_sec
        }
    }
}

pub struct HttpAiClient {
    client: ClientWithMiddleware,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    cache_ttl: Duration,
    cache: Mutex<HashMap<u64, CacheEntry>>,
    limiter: Mutex<TokenBucket>,
}

impl HttpAiClient {
    pub fn new(
        client: ClientWithMiddleware,
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
        cache_ttl: Duration,
        requests_per_minute: u32,
    ) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            timeout,
            cache_ttl,
            cache: Mutex::new(HashMap::new()),
            limiter: Mutex::new(TokenBucket::new(requests_per_minute)),
        }
    }

    fn prompt_hash(context: &AiPromptContext) -> u64 {
        let serialized = serde_json::to_string(context).unwrap_or_default();
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        serialized.hash(&mut hasher);
        hasher.finish()
    }

    async fn cached(&self, key: u64) -> Option<AiDecision> {
        let mut cache = self.cache.lock().await;
        match cache.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.cache_ttl => {
                Some(entry.decision.clone())
            }
            Some(_) => {
                cache.remove(&key);
                None
            }
            None => None,
        }
    }

    async fn store(&self, key: u64, decision: AiDecision) {
        self.cache.lock().await.insert(
            key,
            CacheEntry {
                decision,
                inserted_at: Instant::now(),
            },
        );
    }

    async fn acquire_budget(&self) -> Result<(), AiError> {
        let wait = {
            let mut limiter = self.limiter.lock().await;
            if limiter.try_take() {
                return Ok(());
            }
            limiter.seconds_until_next_token()
        };

        if Duration::from_secs_f64(wait) > self.timeout {
            return Err(AiError::Transient {
                reason: "rate limit budget not available within the call timeout".to_string(),
            });
        }

        tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        let mut limiter = self.limiter.lock().await;
        if limiter.try_take() {
            Ok(())
        } else {
            Err(AiError::Transient {
                reason: "rate limiter still exhausted after waiting".to_string(),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct StructuredReply {
    decision: String,
    confidence: Decimal,
    entry: Option<Decimal>,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    reasoning: String,
}

fn parse_decision_kind(raw: &str) -> Result<AiDecisionKind, AiError> {
    match raw.to_uppercase().as_str() {
        "BUY" => Ok(AiDecisionKind::Buy),
        "SELL" => Ok(AiDecisionKind::Sell),
        "HOLD" => Ok(AiDecisionKind::Hold),
        other => Err(AiError::Parse {
            reason: format!("unrecognized decision {other}"),
        }),
    }
}

/// Accepts a strict JSON body first; falls back to a permissive
/// `key: value` tagged-text format since not every model reliably
/// emits well-formed JSON.
fn parse_reply(body: &str) -> Result<AiDecision, AiError> {
    if let Ok(structured) = serde_json::from_str::<StructuredReply>(body) {
        return Ok(AiDecision {
            decision: parse_decision_kind(&structured.decision)?,
            confidence: structured.confidence,
            entry: structured.entry,
            stop_loss: structured.stop_loss,
            take_profit: structured.take_profit,
            reasoning: structured.reasoning,
        });
    }

    let mut fields: HashMap<String, String> = HashMap::new();
    for line in body.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let decision_raw = fields
        .get("decision")
        .ok_or_else(|| AiError::Parse {
            reason: "no `decision:` field in tagged reply".to_string(),
        })?;
    let confidence = fields
        .get("confidence")
        .and_then(|v| v.parse::<Decimal>().ok())
        .ok_or_else(|| AiError::Parse {
            reason: "no parseable `confidence:` field in tagged reply".to_string(),
        })?;

    Ok(AiDecision {
        decision: parse_decision_kind(decision_raw)?,
        confidence,
        entry: fields.get("entry").and_then(|v| v.parse().ok()),
        stop_loss: fields.get("stop_loss").and_then(|v| v.parse().ok()),
        take_profit: fields.get("take_profit").and_then(|v| v.parse().ok()),
        reasoning: fields.get("reasoning").cloned().unwrap_or_default(),
    })
}

#[async_trait]
impl AiPort for HttpAiClient {
    async fn validate(&self, context: &AiPromptContext) -> Result<AiDecision, AiError> {
        let key = Self::prompt_hash(context);
        if let Some(decision) = self.cached(key).await {
            debug!("AI cache hit");
            return Ok(decision);
        }

        self.acquire_budget().await?;

        let mut request = self.client.post(&self.endpoint).json(context);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| AiError::Transient {
                reason: "AI call timed out".to_string(),
            })?
            .map_err(|e| AiError::Transient {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(if status.is_client_error() {
                AiError::Permanent {
                    reason: format!("AI endpoint returned {status}"),
                }
            } else {
                AiError::Transient {
                    reason: format!("AI endpoint returned {status}"),
                }
            });
        }

        let body = response.text().await.map_err(|e| AiError::Transient {
            reason: e.to_string(),
        })?;

        let decision = parse_reply(&body)?;
        self.store(key, decision.clone()).await;
        Ok(decision)
    }
}
