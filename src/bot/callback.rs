//! Inline button payloads: `"<action>_<response_id>"`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Why a button payload could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackParseError {
    /// Not exactly one `_` separator
    #[error("malformed callback payload: {0:?}")]
    Malformed(String),
    /// Action name is not one we issue
    #[error("unknown callback action: {0:?}")]
    UnknownAction(String),
    /// Id part is not an integer
    #[error("invalid response id: {0:?}")]
    InvalidId(String),
}

/// Rewrite requests served by the text model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAction {
    /// Shorter and simpler
    Summarize,
    /// Proofread and reworded
    Paraphrase,
    /// Longer and more detailed
    Elaborate,
    /// Specifics removed
    Generalize,
}

impl TextAction {
    /// Instruction placed in front of the text sent to the model
    #[must_use]
    pub const fn instruction(self) -> &'static str {
        match self {
            Self::Summarize => {
                "summarize this for me make it more simple and shorter but understandable: \n"
            }
            Self::Paraphrase => {
                "paraphrase the following text by proofreading, rewording, and/or rephrasing it. \
                 I'm looking for a refined version that maintains clarity and coherence.: \n"
            }
            Self::Elaborate => {
                "Elaborate this make it longer by providing more details, but ensure it remains \
                 understandable.: \n"
            }
            Self::Generalize => {
                "generalize this statement, eliminate the specifics and make it more organized \
                 and comprehensible.: \n"
            }
        }
    }

    /// Full model prompt for `text`
    #[must_use]
    pub fn prompt(self, text: &str) -> String {
        format!("{} + {text}", self.instruction())
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Paraphrase => "paraphrase",
            Self::Elaborate => "elaborate",
            Self::Generalize => "generalize",
        }
    }
}

/// What a button asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Read the response aloud
    Tts,
    /// Rewrite the response
    Text(TextAction),
}

impl CallbackAction {
    const fn name(self) -> &'static str {
        match self {
            Self::Tts => "tts",
            Self::Text(action) => action.name(),
        }
    }
}

impl FromStr for CallbackAction {
    type Err = CallbackParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tts" => Ok(Self::Tts),
            "summarize" => Ok(Self::Text(TextAction::Summarize)),
            "paraphrase" => Ok(Self::Text(TextAction::Paraphrase)),
            "elaborate" => Ok(Self::Text(TextAction::Elaborate)),
            "generalize" => Ok(Self::Text(TextAction::Generalize)),
            other => Err(CallbackParseError::UnknownAction(other.to_string())),
        }
    }
}

/// Decoded button payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackToken {
    /// Requested action
    pub action: CallbackAction,
    /// Response the action applies to
    pub response_id: i64,
}

impl CallbackToken {
    /// Token for `action` on `response_id`
    #[must_use]
    pub const fn new(action: CallbackAction, response_id: i64) -> Self {
        Self {
            action,
            response_id,
        }
    }

    /// Decodes a payload.
    ///
    /// # Errors
    ///
    /// Fails unless the payload is `<known action>_<integer>` with exactly one `_`.
    pub fn parse(data: &str) -> Result<Self, CallbackParseError> {
        let mut parts = data.split('_');
        let (Some(action), Some(id), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CallbackParseError::Malformed(data.to_string()));
        };
        let action = action.parse()?;
        let response_id = id
            .parse()
            .map_err(|_| CallbackParseError::InvalidId(id.to_string()))?;
        Ok(Self::new(action, response_id))
    }

    /// Encodes the payload stored in the button
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.action.name(), self.response_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_actions() {
        assert_eq!(
            CallbackToken::parse("tts_123"),
            Ok(CallbackToken::new(CallbackAction::Tts, 123))
        );
        assert_eq!(
            CallbackToken::parse("generalize_1700000000"),
            Ok(CallbackToken::new(
                CallbackAction::Text(TextAction::Generalize),
                1_700_000_000
            ))
        );
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        assert!(matches!(
            CallbackToken::parse("bogus"),
            Err(CallbackParseError::Malformed(_))
        ));
        assert!(matches!(
            CallbackToken::parse("tts_1_2"),
            Err(CallbackParseError::Malformed(_))
        ));
        assert!(matches!(
            CallbackToken::parse("dance_5"),
            Err(CallbackParseError::UnknownAction(_))
        ));
        assert!(matches!(
            CallbackToken::parse("tts_abc"),
            Err(CallbackParseError::InvalidId(_))
        ));
    }

    #[test]
    fn test_encoded_token_parses_back() {
        let token = CallbackToken::new(CallbackAction::Text(TextAction::Paraphrase), 77);
        assert_eq!(token.encode(), "paraphrase_77");
        assert_eq!(CallbackToken::parse(&token.encode()), Ok(token));
    }

    #[test]
    fn test_prompt_joins_instruction_and_text() {
        let prompt = TextAction::Summarize.prompt("long text");
        assert!(prompt.starts_with("summarize this for me"));
        assert!(prompt.ends_with(": \n + long text"));
    }
}
