//! Keyword command classification
//!
//! Pure function on the hot path between ASR and the queue: an ordered rule
//! table evaluated in fixed precedence, no learned model. First matching
//! rule wins on ambiguity; unmatched text falls through to a news request
//! carrying the raw utterance.

use crate::types::{Command, CommandKind, Priority};

/// Lexical cues that promote a non-interrupt command to `Refinement`
pub const REFINEMENT_CUES: &[&str] = &["actually", "instead", "wait"];

/// One row of the precedence table
struct Rule {
    kind: CommandKind,
    phrases: &'static [&'static str],
}

/// Precedence order, highest first. Domain keyword order is fixed:
/// weather > stock > news.
const RULES: &[Rule] = &[
    Rule {
        kind: CommandKind::Stop,
        phrases: &["stop", "halt", "cancel", "be quiet", "shut up", "enough", "never mind"],
    },
    Rule {
        kind: CommandKind::DeepDive,
        phrases: &["tell me more", "more detail", "deep dive", "elaborate", "go deeper", "dig into"],
    },
    Rule {
        kind: CommandKind::Skip,
        phrases: &["skip", "next", "move on"],
    },
    Rule {
        kind: CommandKind::Repeat,
        phrases: &["repeat", "say that again", "once more", "come again"],
    },
    Rule {
        kind: CommandKind::Continue,
        phrases: &["continue", "keep going", "go on", "carry on"],
    },
    Rule {
        kind: CommandKind::VolumeUp,
        phrases: &["volume up", "louder", "turn it up", "speak up"],
    },
    Rule {
        kind: CommandKind::VolumeDown,
        phrases: &["volume down", "quieter", "softer", "turn it down"],
    },
    Rule {
        kind: CommandKind::SpeedUp,
        phrases: &["speed up", "faster", "talk faster"],
    },
    Rule {
        kind: CommandKind::SpeedDown,
        phrases: &["slow down", "slower", "talk slower"],
    },
    Rule {
        kind: CommandKind::Help,
        phrases: &["help", "what can you do", "how does this work"],
    },
    Rule {
        kind: CommandKind::Settings,
        phrases: &["settings", "preferences", "configuration"],
    },
    Rule {
        kind: CommandKind::WeatherRequest,
        phrases: &["weather", "temperature", "forecast", "rain", "sunny", "humidity"],
    },
    Rule {
        kind: CommandKind::StockRequest,
        phrases: &["stock", "stocks", "share price", "market", "ticker", "nasdaq", "dow"],
    },
    Rule {
        kind: CommandKind::NewsRequest,
        phrases: &["news", "headline", "headlines", "story", "stories", "what's happening"],
    },
];

/// Classify transcribed text into a command
///
/// Deterministic: identical input yields identical kind and priority.
pub fn classify(text: &str) -> Command {
    let normalized = text.trim().to_lowercase();

    let kind = RULES
        .iter()
        .find(|rule| rule.phrases.iter().any(|p| normalized.contains(p)))
        .map(|rule| rule.kind)
        .unwrap_or(CommandKind::NewsRequest);

    let mut command = Command::new(kind, text);

    // Request kinds carry the raw utterance so the dispatcher can build a
    // query from it.
    if matches!(
        kind,
        CommandKind::NewsRequest | CommandKind::StockRequest | CommandKind::WeatherRequest
    ) {
        command = command.with_payload(text.trim());
    }

    // Refinement cues supersede the kind's base priority, but never
    // demote an Immediate command.
    if command.priority != Priority::Immediate
        && REFINEMENT_CUES.iter().any(|cue| normalized.contains(cue))
    {
        command = command.with_priority(Priority::Refinement);
    }

    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_is_deterministic() {
        let a = classify("tell me the news about rust");
        let b = classify("tell me the news about rust");
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.priority, b.priority);
    }

    #[test]
    fn test_interrupt_precedence() {
        // "stop" beats the news keyword later in the utterance
        let cmd = classify("stop reading the news");
        assert_eq!(cmd.kind, CommandKind::Stop);
        assert_eq!(cmd.priority, Priority::Immediate);
    }

    #[test]
    fn test_deep_dive() {
        let cmd = classify("tell me more about that");
        assert_eq!(cmd.kind, CommandKind::DeepDive);
        assert_eq!(cmd.priority, Priority::Contextual);
    }

    #[test]
    fn test_navigation() {
        assert_eq!(classify("skip this one").kind, CommandKind::Skip);
        assert_eq!(classify("say that again").kind, CommandKind::Repeat);
        assert_eq!(classify("keep going").kind, CommandKind::Continue);
    }

    #[test]
    fn test_controls() {
        assert_eq!(classify("a bit louder please").kind, CommandKind::VolumeUp);
        assert_eq!(classify("talk slower").kind, CommandKind::SpeedDown);
    }

    #[test]
    fn test_domain_precedence_weather_over_stock_over_news() {
        // Fixed order: weather > stock > news
        let cmd = classify("weather news for the stock market");
        assert_eq!(cmd.kind, CommandKind::WeatherRequest);

        let cmd = classify("stock market news");
        assert_eq!(cmd.kind, CommandKind::StockRequest);
    }

    #[test]
    fn test_default_is_news_with_raw_payload() {
        let cmd = classify("anything interesting about space lately");
        assert_eq!(cmd.kind, CommandKind::NewsRequest);
        assert_eq!(
            cmd.payload.as_deref(),
            Some("anything interesting about space lately")
        );
    }

    #[test]
    fn test_refinement_cues() {
        let cmd = classify("actually give me the weather instead");
        assert_eq!(cmd.kind, CommandKind::WeatherRequest);
        assert_eq!(cmd.priority, Priority::Refinement);

        // Refinement never demotes an interrupt
        let cmd = classify("wait, stop");
        assert_eq!(cmd.kind, CommandKind::Stop);
        assert_eq!(cmd.priority, Priority::Immediate);
    }
}
