//! Command dispatch
//!
//! Turns a classified command into a response plan: nothing, a canned
//! phrase, or an LLM generation request. Session mutations (news cursor,
//! voice options) happen here, before generation starts.

use voice_assistant_command::{Command, CommandKind, Priority};
use voice_assistant_core::{GenerateRequest, VoiceOptions};

use crate::dialog::DialogState;

/// What the turn should do after dispatch
#[derive(Debug)]
pub enum ResponsePlan {
    /// No spoken reply (Stop, expired commands)
    Silent,
    /// Canned phrase, synthesized without the LLM
    Speak(String),
    /// Streamed LLM generation
    Generate(GenerateRequest),
}

/// Command-to-plan mapping
#[derive(Debug, Clone)]
pub struct Dispatcher {
    system_prompt: String,
    max_tokens: u32,
    temperature: f32,
}

impl Dispatcher {
    pub fn new(system_prompt: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_tokens,
            temperature,
        }
    }

    fn request(&self, state: &DialogState, user_prompt: String) -> GenerateRequest {
        GenerateRequest::new(&self.system_prompt)
            .with_history(state.history.iter().cloned())
            .with_user_message(user_prompt)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
    }

    /// Map a command to a plan, applying its session mutations
    pub fn plan(&self, command: &Command, state: &mut DialogState) -> ResponsePlan {
        // Aged-out commands are delivered for bookkeeping but answered
        // with nothing - speaking a 5-second-old request back would be
        // more confusing than silence.
        if command.priority == Priority::Expired {
            tracing::debug!(kind = ?command.kind, "dropping expired command");
            return ResponsePlan::Silent;
        }

        let query = command
            .payload
            .clone()
            .unwrap_or_else(|| command.origin_text.clone());

        match command.kind {
            CommandKind::Stop => ResponsePlan::Silent,

            CommandKind::Repeat => match &state.last_response {
                Some(last) => ResponsePlan::Speak(last.clone()),
                None => ResponsePlan::Speak("I haven't said anything yet.".to_string()),
            },

            CommandKind::Continue => ResponsePlan::Generate(self.request(
                state,
                "Continue from where you left off.".to_string(),
            )),

            CommandKind::DeepDive => {
                let prompt = match &state.last_response {
                    Some(last) => format!(
                        "Go into more depth on what you just said: \"{last}\". \
                         Add details you previously left out."
                    ),
                    None => query,
                };
                ResponsePlan::Generate(self.request(state, prompt))
            }

            CommandKind::Skip => {
                state.current_news_item_index += 1;
                let index = state.current_news_item_index;
                ResponsePlan::Generate(self.request(
                    state,
                    format!("Skip the current item and present item {index} of the briefing."),
                ))
            }

            CommandKind::VolumeUp => {
                state.voice.adjust_volume(VoiceOptions::VOLUME_STEP);
                ResponsePlan::Speak("Volume up.".to_string())
            }
            CommandKind::VolumeDown => {
                state.voice.adjust_volume(-VoiceOptions::VOLUME_STEP);
                ResponsePlan::Speak("Volume down.".to_string())
            }
            CommandKind::SpeedUp => {
                state.voice.adjust_rate(VoiceOptions::RATE_STEP);
                ResponsePlan::Speak("Speaking faster.".to_string())
            }
            CommandKind::SpeedDown => {
                state.voice.adjust_rate(-VoiceOptions::RATE_STEP);
                ResponsePlan::Speak("Speaking slower.".to_string())
            }

            CommandKind::Help => ResponsePlan::Speak(
                "You can ask me for news, stock prices, or the weather. \
                 Say stop to interrupt me, skip for the next item, or \
                 tell me more to go deeper."
                    .to_string(),
            ),

            CommandKind::Settings => ResponsePlan::Speak(
                "Settings can be changed by voice: say louder, quieter, \
                 faster, or slower."
                    .to_string(),
            ),

            CommandKind::NewsRequest => {
                state.current_news_item_index = 0;
                ResponsePlan::Generate(
                    self.request(state, format!("Give a short spoken news briefing for: {query}")),
                )
            }

            CommandKind::StockRequest => ResponsePlan::Generate(self.request(
                state,
                format!("Answer this stock/market question in one or two spoken sentences: {query}"),
            )),

            CommandKind::WeatherRequest => ResponsePlan::Generate(self.request(
                state,
                format!("Answer this weather question in one or two spoken sentences: {query}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_assistant_command::classify;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new("system", 128, 0.7)
    }

    #[test]
    fn test_stop_is_silent() {
        let mut state = DialogState::new();
        let plan = dispatcher().plan(&classify("stop"), &mut state);
        assert!(matches!(plan, ResponsePlan::Silent));
    }

    #[test]
    fn test_repeat_replays_last_response() {
        let mut state = DialogState::new();
        state.last_response = Some("The sky is clear.".to_string());

        let plan = dispatcher().plan(&classify("say that again"), &mut state);
        match plan {
            ResponsePlan::Speak(text) => assert_eq!(text, "The sky is clear."),
            other => panic!("expected Speak, got {other:?}"),
        }
    }

    #[test]
    fn test_skip_advances_news_cursor() {
        let mut state = DialogState::new();
        dispatcher().plan(&classify("skip"), &mut state);
        assert_eq!(state.current_news_item_index, 1);
        dispatcher().plan(&classify("skip"), &mut state);
        assert_eq!(state.current_news_item_index, 2);
    }

    #[test]
    fn test_volume_commands_mutate_voice() {
        let mut state = DialogState::new();
        let before = state.voice.volume;
        dispatcher().plan(&classify("louder"), &mut state);
        assert!(state.voice.volume > before);
    }

    #[test]
    fn test_requests_generate_with_history() {
        let mut state = DialogState::new();
        state.record_exchange("hi", "hello");

        let plan = dispatcher().plan(&classify("news about rust"), &mut state);
        match plan {
            ResponsePlan::Generate(req) => {
                // system + 2 history + 1 user prompt
                assert_eq!(req.messages.len(), 4);
            }
            other => panic!("expected Generate, got {other:?}"),
        }
    }

    #[test]
    fn test_expired_command_is_silent() {
        use voice_assistant_command::{Command, CommandKind, Priority};

        let mut state = DialogState::new();
        let cmd = Command::new(CommandKind::NewsRequest, "old").with_priority(Priority::Expired);
        assert!(matches!(
            dispatcher().plan(&cmd, &mut state),
            ResponsePlan::Silent
        ));
    }
}
