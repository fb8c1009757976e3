//! Token and cost accounting per model
//!
//! Every model call may report a [`Usage`]. Usages are additive and keyed by
//! model identity; [`UsageTotals`] holds one running total per model for the
//! lifetime of a run.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Errors raised when two usages cannot be summed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UsageError {
    #[error("cannot add usage of model {other} to totals of model {model}")]
    ModelMismatch { model: String, other: String },

    #[error("cannot add cost in {other} to cost in {currency}")]
    CurrencyMismatch { currency: String, other: String },
}

/// Per-token pricing for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// Price of one million input tokens
    pub input_per_million: f64,
    /// Price of one million output tokens
    pub output_per_million: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Pricing {
    pub fn new(input_per_million: f64, output_per_million: f64, currency: impl Into<String>) -> Self {
        Self {
            input_per_million,
            output_per_million,
            currency: currency.into(),
        }
    }

    /// Price the given token counts
    pub fn cost_of(&self, input_tokens: u64, output_tokens: u64) -> Cost {
        let input = input_tokens as f64 * self.input_per_million / 1_000_000.0;
        let output = output_tokens as f64 * self.output_per_million / 1_000_000.0;
        Cost {
            input,
            output,
            total: input + output,
            currency: self.currency.clone(),
        }
    }
}

/// Monetary cost of a usage record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub input: f64,
    pub output: f64,
    pub total: f64,
    pub currency: String,
}

impl Cost {
    fn checked_add(&self, other: &Cost) -> Result<Cost, UsageError> {
        if self.currency != other.currency {
            return Err(UsageError::CurrencyMismatch {
                currency: self.currency.clone(),
                other: other.currency.clone(),
            });
        }
        Ok(Cost {
            input: self.input + other.input,
            output: self.output + other.output,
            total: self.total + other.total,
            currency: self.currency.clone(),
        })
    }
}

/// Token usage (and derived cost) of one or more calls to a single model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Cost>,
}

impl Usage {
    /// Build a usage record from raw token counts, pricing it when pricing is known
    pub fn from_tokens(
        model: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
        pricing: Option<&Pricing>,
    ) -> Self {
        Self {
            model: model.into(),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            cost: pricing.map(|p| p.cost_of(input_tokens, output_tokens)),
        }
    }

    /// An empty record for `model`
    pub fn zero(model: impl Into<String>) -> Self {
        Self::from_tokens(model, 0, 0, None)
    }

    /// Add `other` into `self`, field by field.
    ///
    /// Fails without modifying `self` when the models differ or when both
    /// sides carry a cost in different currencies. A side without a cost
    /// contributes nothing to the cost total.
    pub fn add(&mut self, other: &Usage) -> Result<(), UsageError> {
        if self.model != other.model {
            return Err(UsageError::ModelMismatch {
                model: self.model.clone(),
                other: other.model.clone(),
            });
        }

        let cost = match (&self.cost, &other.cost) {
            (Some(a), Some(b)) => Some(a.checked_add(b)?),
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };

        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.cost = cost;
        Ok(())
    }
}

/// Running usage totals, one entry per model, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageTotals {
    by_model: IndexMap<String, Usage>,
}

impl UsageTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one usage record into the totals for its model
    pub fn merge(&mut self, usage: &Usage) -> Result<(), UsageError> {
        match self.by_model.get_mut(&usage.model) {
            Some(total) => total.add(usage),
            None => {
                self.by_model.insert(usage.model.clone(), usage.clone());
                Ok(())
            }
        }
    }

    /// Merge every model's totals from `other`
    pub fn merge_totals(&mut self, other: &UsageTotals) -> Result<(), UsageError> {
        for usage in other.by_model.values() {
            self.merge(usage)?;
        }
        Ok(())
    }

    pub fn get(&self, model: &str) -> Option<&Usage> {
        self.by_model.get(model)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Usage> {
        self.by_model.values()
    }

    pub fn is_empty(&self) -> bool {
        self.by_model.is_empty()
    }

    /// Tokens summed across all models
    pub fn total_tokens(&self) -> u64 {
        self.by_model.values().map(|u| u.total_tokens).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_order_independent() {
        let a = Usage::from_tokens("m", 10, 5, None);
        let b = Usage::from_tokens("m", 3, 1, None);

        let mut forward = UsageTotals::new();
        forward.merge(&a).unwrap();
        forward.merge(&b).unwrap();

        let mut backward = UsageTotals::new();
        backward.merge(&b).unwrap();
        backward.merge(&a).unwrap();

        assert_eq!(forward, backward);
        let total = forward.get("m").unwrap();
        assert_eq!(total.input_tokens, 13);
        assert_eq!(total.output_tokens, 6);
        assert_eq!(total.total_tokens, 19);
    }

    #[test]
    fn test_totals_keyed_by_model() {
        let mut totals = UsageTotals::new();
        totals.merge(&Usage::from_tokens("a", 1, 1, None)).unwrap();
        totals.merge(&Usage::from_tokens("b", 2, 2, None)).unwrap();
        totals.merge(&Usage::from_tokens("a", 1, 1, None)).unwrap();

        let models: Vec<_> = totals.iter().map(|u| u.model.as_str()).collect();
        assert_eq!(models, vec!["a", "b"]);
        assert_eq!(totals.get("a").unwrap().total_tokens, 4);
        assert_eq!(totals.total_tokens(), 8);
    }

    #[test]
    fn test_cost_is_derived_and_summed() {
        let pricing = Pricing::new(2.0, 10.0, "USD");
        let mut usage = Usage::from_tokens("m", 1_000_000, 100_000, Some(&pricing));
        usage
            .add(&Usage::from_tokens("m", 500_000, 0, Some(&pricing)))
            .unwrap();

        let cost = usage.cost.unwrap();
        assert!((cost.input - 3.0).abs() < 1e-9);
        assert!((cost.output - 1.0).abs() < 1e-9);
        assert!((cost.total - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_mixed_currency_is_rejected() {
        let mut usd = Usage::from_tokens("m", 10, 10, Some(&Pricing::new(1.0, 1.0, "USD")));
        let eur = Usage::from_tokens("m", 10, 10, Some(&Pricing::new(1.0, 1.0, "EUR")));

        let before = usd.clone();
        assert!(matches!(usd.add(&eur), Err(UsageError::CurrencyMismatch { .. })));
        assert_eq!(usd, before);
    }

    #[test]
    fn test_model_mismatch_is_rejected() {
        let mut a = Usage::zero("a");
        assert!(matches!(
            a.add(&Usage::zero("b")),
            Err(UsageError::ModelMismatch { .. })
        ));
    }
}
