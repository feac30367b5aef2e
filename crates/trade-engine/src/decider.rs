use trading_core::{
    ManipulationAssessment, ManipulationRisk, SentimentAssessment, SignalAction, TechnicalSignal,
    TradeDecision,
};

/// Sentiment magnitude that counts as aligned or contradicting.
const SENTIMENT_THRESHOLD: f64 = 0.3;

/// Fuses the technical signal, the external sentiment read, and the
/// manipulation assessment into the final decision. Precedence:
/// manipulation veto, then technical WAIT, then sentiment contradiction.
pub struct StrategyDecider;

impl StrategyDecider {
    /// `sentiment` is `None` when no sentiment collaborator is wired in;
    /// the sentiment rules are disabled in that case.
    pub fn decide(
        technical: &TechnicalSignal,
        sentiment: Option<SentimentAssessment>,
        manipulation: &ManipulationAssessment,
    ) -> TradeDecision {
        let mut conflict_notes = Vec::new();
        let mut confidence = technical.confidence;

        let sentiment = sentiment.unwrap_or_else(SentimentAssessment::neutral);
        let aligned = match technical.action {
            SignalAction::Buy => sentiment.score > SENTIMENT_THRESHOLD,
            SignalAction::Sell => sentiment.score < -SENTIMENT_THRESHOLD,
            SignalAction::Wait => false,
        };
        let contradicted = match technical.action {
            SignalAction::Buy => sentiment.score < -SENTIMENT_THRESHOLD,
            SignalAction::Sell => sentiment.score > SENTIMENT_THRESHOLD,
            SignalAction::Wait => false,
        };

        if aligned {
            confidence += 0.1;
        }
        if contradicted {
            confidence -= 0.15;
        }
        if manipulation.risk == ManipulationRisk::Medium {
            confidence -= 0.2;
            conflict_notes.push(format!(
                "manipulation risk MEDIUM: {}",
                manipulation.evidence.join("; ")
            ));
        }
        let confidence = confidence.clamp(0.0, 1.0);

        // 1. Manipulation veto beats everything
        if manipulation.risk == ManipulationRisk::High {
            conflict_notes.push(format!(
                "manipulation risk HIGH vetoed {:?}: {}",
                technical.action,
                manipulation.evidence.join("; ")
            ));
            return TradeDecision {
                symbol: technical.symbol.clone(),
                action: SignalAction::Wait,
                confidence,
                conflict_notes,
            };
        }

        // 2. Nothing to trade
        if technical.action == SignalAction::Wait {
            return TradeDecision {
                symbol: technical.symbol.clone(),
                action: SignalAction::Wait,
                confidence,
                conflict_notes,
            };
        }

        // 3. Sentiment against the technical direction
        if contradicted {
            conflict_notes.push(format!(
                "sentiment {:.2} contradicts technical {:?}",
                sentiment.score, technical.action
            ));
            return TradeDecision {
                symbol: technical.symbol.clone(),
                action: SignalAction::Wait,
                confidence,
                conflict_notes,
            };
        }

        // 4. Technical action stands
        TradeDecision {
            symbol: technical.symbol.clone(),
            action: technical.action,
            confidence,
            conflict_notes,
        }
    }
}
