//! C4: the second-opinion gate. Transport-agnostic; depends only on the
//! `AiPort` trait so tests can swap in a canned implementation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use crate::domain::ports::{AiDecisionKind, AiPort, AiPromptContext};
use crate::domain::types::{Signal, SignalDirection};

const CONFIDENCE_BOOST: Decimal = dec!(0.20);
const CONFIDENCE_PENALTY: Decimal = dec!(0.30);

pub struct AiValidator;

impl AiValidator {
    /// Validate a non-HOLD signal against the AI. Returns the signal
    /// unchanged if it is already HOLD (the AI is never consulted).
    ///
    /// `min_confidence` is the only place this threshold is checked;
    /// neither RiskGate nor the Supervisor re-check it afterward.
    pub async fn validate(
        mut signal: Signal,
        ai: &dyn AiPort,
        context: AiPromptContext,
        min_confidence: Decimal,
    ) -> Signal {
        if signal.is_hold() {
            return signal;
        }

        match ai.validate(&context).await {
            Ok(decision) => {
                signal.ai_confidence = Some(decision.confidence);
                if decision.decision != AiDecisionKind::Hold {
                    signal.ai_validated = Some(true);
                    signal.confidence = (signal.confidence + CONFIDENCE_BOOST).min(Decimal::ONE);
                    signal.reasons.push("AI corroborated the signal".to_string());
                } else {
                    signal.ai_validated = Some(false);
                    signal.confidence =
                        (signal.confidence - CONFIDENCE_PENALTY).max(Decimal::ZERO);
                    if signal.confidence < min_confidence {
                        debug!(
                            confidence = %signal.confidence,
                            min_confidence = %min_confidence,
                            "AI demotion threshold breached, demoting to HOLD"
                        );
                        signal.direction = SignalDirection::Hold;
                        signal.reasons.push("AI validation failed".to_string());
                    } else {
                        signal.reasons.push("AI weakened the signal".to_string());
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "AI validation unavailable, proceeding technical-only");
                signal.ai_validated = Some(false);
                signal.reasons.push(format!("AI unavailable: {e}"));
            }
        }

        signal
    }
}
