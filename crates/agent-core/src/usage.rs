//! Token Usage and Cost
//!
//! Additive token accounting plus pricing lookup. `Usage` forms a
//! commutative monoid under field-wise addition with the all-zero
//! default as identity, which is what lets per-call records be merged
//! into a session ledger in any order.

use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token counts for one provider response, or a running total of many.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt (messages + system + tool schemas)
    pub input_tokens: u64,
    /// Tokens produced by the model
    pub output_tokens: u64,
    /// Tokens written into the provider's prompt cache
    pub cache_write_tokens: u64,
    /// Tokens served from the provider's prompt cache
    pub cache_read_tokens: u64,
}

impl Usage {
    /// Sum of all four fields
    pub fn total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_write_tokens
            + self.cache_read_tokens
    }

    /// Field-wise difference against an earlier snapshot.
    ///
    /// Saturating: a ledger never goes backwards, so a negative delta
    /// indicates caller misuse and clamps to zero rather than wrapping.
    pub fn delta_since(&self, earlier: &Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens.saturating_sub(earlier.input_tokens),
            output_tokens: self.output_tokens.saturating_sub(earlier.output_tokens),
            cache_write_tokens: self
                .cache_write_tokens
                .saturating_sub(earlier.cache_write_tokens),
            cache_read_tokens: self
                .cache_read_tokens
                .saturating_sub(earlier.cache_read_tokens),
        }
    }

    /// Cost in USD against a pricing tier (rates are USD per million tokens)
    #[allow(clippy::cast_precision_loss)] // token counts fit the f64 mantissa in practice
    pub fn cost(&self, tier: &PricingTier) -> f64 {
        (self.input_tokens as f64 * tier.input
            + self.output_tokens as f64 * tier.output
            + self.cache_write_tokens as f64 * tier.cache_write
            + self.cache_read_tokens as f64 * tier.cache_read)
            / 1_000_000.0
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_add(rhs.input_tokens),
            output_tokens: self.output_tokens.saturating_add(rhs.output_tokens),
            cache_write_tokens: self.cache_write_tokens.saturating_add(rhs.cache_write_tokens),
            cache_read_tokens: self.cache_read_tokens.saturating_add(rhs.cache_read_tokens),
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "In: {}; Out: {}; Cache write: {}; Cache read: {}; Total: {}",
            self.input_tokens,
            self.output_tokens,
            self.cache_write_tokens,
            self.cache_read_tokens,
            self.total()
        )
    }
}

/// Per-million-token USD rates for one model tier
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricingTier {
    pub input: f64,
    pub output: f64,
    pub cache_write: f64,
    pub cache_read: f64,
}

impl PricingTier {
    pub const fn new(input: f64, output: f64, cache_write: f64, cache_read: f64) -> Self {
        Self {
            input,
            output,
            cache_write,
            cache_read,
        }
    }

    /// Long-context surcharge applied above the prompt-size cutoff
    const fn long_context(self) -> Self {
        Self {
            input: self.input * 2.0,
            output: self.output * 1.5,
            cache_write: self.cache_write * 2.0,
            cache_read: self.cache_read * 2.0,
        }
    }
}

/// Model family used as the pricing key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelClass {
    Opus,
    Sonnet,
    Haiku3,
    Haiku35,
}

impl ModelClass {
    /// Classify a provider model identifier.
    ///
    /// Matches the family substring, so dated ids, AWS-prefixed ids and
    /// versioned ids all resolve to the same class.
    pub fn of(model: &str) -> Option<Self> {
        if model.contains("opus") {
            Some(Self::Opus)
        } else if model.contains("sonnet") {
            Some(Self::Sonnet)
        } else if model.contains("haiku") {
            if model.contains("3-5") {
                Some(Self::Haiku35)
            } else {
                Some(Self::Haiku3)
            }
        } else {
            None
        }
    }

    const fn base_tier(self) -> PricingTier {
        // $ / million tokens: (input, output, cache write, cache read)
        match self {
            Self::Opus => PricingTier::new(15.0, 75.0, 18.75, 1.5),
            Self::Sonnet => PricingTier::new(3.0, 15.0, 3.75, 0.3),
            Self::Haiku3 => PricingTier::new(0.25, 1.25, 0.3, 0.03),
            Self::Haiku35 => PricingTier::new(1.0, 3.0, 1.25, 0.1),
        }
    }
}

/// Prompt-size cutoff above which the long-context tier applies
pub const LONG_CONTEXT_CUTOFF: u64 = 128_000;

/// Pure pricing lookup keyed by model class and prompt size.
///
/// Prompts at or above [`LONG_CONTEXT_CUTOFF`] tokens bill at the
/// long-context tier.
pub fn pricing_for(class: ModelClass, prompt_tokens: u64) -> PricingTier {
    let base = class.base_tier();
    if prompt_tokens < LONG_CONTEXT_CUTOFF {
        base
    } else {
        base.long_context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(inp: u64, out: u64, cw: u64, cr: u64) -> Usage {
        Usage {
            input_tokens: inp,
            output_tokens: out,
            cache_write_tokens: cw,
            cache_read_tokens: cr,
        }
    }

    #[test]
    fn test_monoid_identity() {
        let a = usage(10, 20, 30, 40);
        assert_eq!(a + Usage::default(), a);
        assert_eq!(Usage::default() + a, a);
    }

    #[test]
    fn test_monoid_commutative_associative() {
        let a = usage(1, 2, 3, 4);
        let b = usage(10, 20, 30, 40);
        let c = usage(100, 200, 300, 400);
        assert_eq!(a + b, b + a);
        assert_eq!((a + b) + c, a + (b + c));
    }

    #[test]
    fn test_total() {
        assert_eq!(usage(1, 2, 3, 4).total(), 10);
    }

    #[test]
    fn test_cost_determinism() {
        let u = usage(1_000_000, 0, 0, 0);
        let tier = PricingTier::new(3.0, 15.0, 3.75, 0.3);
        assert!((u.cost(&tier) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cost_all_fields() {
        let u = usage(1_000_000, 1_000_000, 1_000_000, 1_000_000);
        let tier = PricingTier::new(3.0, 15.0, 3.75, 0.3);
        assert!((u.cost(&tier) - 22.05).abs() < 1e-9);
    }

    #[test]
    fn test_delta_since() {
        let before = usage(100, 50, 0, 0);
        let after = usage(300, 80, 10, 5);
        assert_eq!(after.delta_since(&before), usage(200, 30, 10, 5));
    }

    #[test]
    fn test_delta_since_saturates() {
        let before = usage(100, 0, 0, 0);
        let after = usage(50, 0, 0, 0);
        assert_eq!(after.delta_since(&before).input_tokens, 0);
    }

    #[test]
    fn test_model_class_of() {
        assert_eq!(
            ModelClass::of("claude-3-opus-20240229"),
            Some(ModelClass::Opus)
        );
        assert_eq!(
            ModelClass::of("claude-3-7-sonnet-20250219"),
            Some(ModelClass::Sonnet)
        );
        assert_eq!(
            ModelClass::of("claude-3-haiku-20240307"),
            Some(ModelClass::Haiku3)
        );
        assert_eq!(
            ModelClass::of("claude-3-5-haiku-20241022"),
            Some(ModelClass::Haiku35)
        );
        assert_eq!(ModelClass::of("gpt-4o"), None);
    }

    #[test]
    fn test_pricing_threshold() {
        let base = pricing_for(ModelClass::Sonnet, 1_000);
        assert!((base.input - 3.0).abs() < f64::EPSILON);

        let long = pricing_for(ModelClass::Sonnet, LONG_CONTEXT_CUTOFF);
        assert!((long.input - 6.0).abs() < f64::EPSILON);
        assert!((long.output - 22.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display() {
        let u = usage(1, 2, 3, 4);
        assert_eq!(
            u.to_string(),
            "In: 1; Out: 2; Cache write: 3; Cache read: 4; Total: 10"
        );
    }
}
