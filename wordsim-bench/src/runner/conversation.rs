//! Trial conversation runner
//!
//! A trial drives a model through every turn of a prompt. Each turn gets up
//! to `max_turn_attempts` calls with exponential backoff between them; a turn
//! that runs out of calls fails the whole conversation attempt, and the next
//! attempt restarts from the first turn. After `max_attempts` failed
//! conversations the trial is recorded as failed.
//!
//! Usage is merged into the caller's running totals as each call returns, so
//! dropping a trial part way through loses no billed call.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;

use super::contract::ResponseContract;
use crate::analysis::EvaluationResult;
use crate::prompts::{Prompt, TurnPrompt};
use crate::providers::{ModelCapability, ProviderError};
use crate::usage::UsageTotals;

/// Retry budgets and backoff for a trial
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialSettings {
    /// Full conversation attempts
    pub max_attempts: u32,
    /// Calls per turn within one conversation attempt
    pub max_turn_attempts: u32,
    /// Wait after the first failed call of a turn; doubles on each further failure
    pub backoff_base: Duration,
    /// Upper bound on a single model call
    pub timeout: Option<Duration>,
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_turn_attempts: 3,
            backoff_base: Duration::from_secs(1),
            timeout: None,
        }
    }
}

impl TrialSettings {
    /// Delay after failed call number `attempt_index` (0-based) of a turn
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt_index.min(20))
    }
}

/// One failed call within a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnFailure {
    /// Index of the turn in the prompt
    pub turn: usize,
    /// Index of the call within the turn
    pub attempt: u32,
    pub result: EvaluationResult,
}

/// Outcome of one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub prompt: Prompt,
    pub success: bool,
    /// Conversation attempts made
    pub attempts: u32,
    /// Model calls made across all attempts
    pub total_tries: u32,
    /// One list per failed conversation attempt
    pub failures: Vec<Vec<TurnFailure>>,
    pub usage: UsageTotals,
    /// One validated payload per turn, on success
    pub data: Option<Vec<Value>>,
}

impl TrialResult {
    /// The failure that ended the last failed attempt
    pub fn last_failure(&self) -> Option<&EvaluationResult> {
        self.failures.last()?.last().map(|f| &f.result)
    }
}

/// Runs trials against a model
#[derive(Debug, Clone, Default)]
pub struct TrialConversationRunner {
    settings: TrialSettings,
}

impl TrialConversationRunner {
    pub fn new(settings: TrialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TrialSettings {
        &self.settings
    }

    /// Run one trial of `prompt` against `model`.
    ///
    /// Every call's usage goes into both the trial result and `billed`.
    pub async fn run(
        &self,
        model: &dyn ModelCapability,
        contract: &dyn ResponseContract,
        prompt: &Prompt,
        billed: &mut UsageTotals,
    ) -> TrialResult {
        let mut usage = UsageTotals::new();
        let mut failures = Vec::new();
        let mut total_tries = 0;
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let mut attempt_failures = Vec::new();
            let mut data = Vec::with_capacity(prompt.turns.len());

            for (index, turn) in prompt.turns.iter().enumerate() {
                let outcome = self
                    .run_turn(
                        model,
                        contract,
                        index,
                        turn,
                        (&mut usage, &mut *billed),
                        &mut total_tries,
                        &mut attempt_failures,
                    )
                    .await;
                match outcome {
                    Some(payload) => data.push(payload),
                    None => break,
                }
            }

            if data.len() == prompt.turns.len() {
                tracing::debug!(
                    "Trial of {} on {} succeeded after {} attempt(s), {} call(s)",
                    prompt.id,
                    model.id(),
                    attempt,
                    total_tries
                );
                return TrialResult {
                    prompt: prompt.clone(),
                    success: true,
                    attempts: attempt,
                    total_tries,
                    failures,
                    usage,
                    data: Some(data),
                };
            }

            tracing::warn!(
                "Conversation attempt {}/{} of {} on {} failed at turn {}",
                attempt,
                max_attempts,
                prompt.id,
                model.id(),
                data.len() + 1
            );
            failures.push(attempt_failures);
        }

        TrialResult {
            prompt: prompt.clone(),
            success: false,
            attempts: max_attempts,
            total_tries,
            failures,
            usage,
            data: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_turn(
        &self,
        model: &dyn ModelCapability,
        contract: &dyn ResponseContract,
        index: usize,
        turn: &TurnPrompt,
        usage: (&mut UsageTotals, &mut UsageTotals),
        total_tries: &mut u32,
        failures: &mut Vec<TurnFailure>,
    ) -> Option<Value> {
        let max_turn_attempts = self.settings.max_turn_attempts.max(1);
        let (trial_usage, billed) = usage;

        for attempt in 0..max_turn_attempts {
            *total_tries += 1;
            match self.call(model, contract, turn, &mut *trial_usage, &mut *billed).await {
                Ok(payload) => return Some(payload),
                Err(result) => {
                    tracing::warn!(
                        "Turn {} call {}/{} on {}: {}",
                        index + 1,
                        attempt + 1,
                        max_turn_attempts,
                        model.id(),
                        result
                    );
                    failures.push(TurnFailure {
                        turn: index,
                        attempt,
                        result,
                    });
                    if attempt + 1 < max_turn_attempts {
                        sleep(self.settings.backoff(attempt)).await;
                    }
                }
            }
        }

        None
    }

    /// One model call, mapped onto the first check it fails
    async fn call(
        &self,
        model: &dyn ModelCapability,
        contract: &dyn ResponseContract,
        turn: &TurnPrompt,
        trial_usage: &mut UsageTotals,
        billed: &mut UsageTotals,
    ) -> Result<Value, EvaluationResult> {
        if let Some(delay) = model.rate_limit_delay().await {
            tracing::debug!("Waiting {:?} for rate limit on {}", delay, model.id());
            sleep(delay).await;
        }

        let request = model.make_request(&turn.text, contract.tool());
        let response = match self.settings.timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(response) => response,
                Err(_) => Err(ProviderError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
            None => request.await,
        };

        let response = response.map_err(|e| {
            tracing::error!("Request to {} failed: {}", model.id(), e);
            EvaluationResult::exception(e)
        })?;

        if let Some(call_usage) = &response.usage {
            for totals in [trial_usage, billed] {
                if let Err(e) = totals.merge(call_usage) {
                    tracing::warn!("Dropping usage of {}: {}", model.id(), e);
                }
            }
        }

        let text = response.data_text().trim();
        if text.is_empty() {
            return Err(EvaluationResult::NoData);
        }

        let parsed: Value = serde_json::from_str(text).map_err(|e| EvaluationResult::JsonSyntaxError {
            got: text.to_string(),
            error: e.to_string(),
        })?;

        let data = contract.repair(parsed);

        if let Err(errors) = contract.validate(&data) {
            return Err(EvaluationResult::JsonSchemaError { got: data, errors });
        }
        if let Err(reason) = contract.accept(&data, turn) {
            return Err(EvaluationResult::InvalidData { got: data, reason });
        }

        Ok(data)
    }
}
