//! Sampling message types
//!
//! Wire shapes follow the sampling protocol: camelCase fields, content as a
//! `type`-tagged union.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Speaker of a sampling message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text payload, `None` for binary content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A single message attached to a sampling request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl SamplingMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::text(text),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::text(text),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }
}

/// Advisory model selection hints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelPreferences {
    pub cost_priority: Option<f64>,
    pub speed_priority: Option<f64>,
    pub intelligence_priority: Option<f64>,
    pub hints: Vec<ModelHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHint {
    pub name: String,
}

impl ModelPreferences {
    /// Clamp every priority weight into [0, 1]
    pub fn clamped(mut self) -> Self {
        for weight in [
            &mut self.cost_priority,
            &mut self.speed_priority,
            &mut self.intelligence_priority,
        ] {
            if let Some(w) = weight.as_mut() {
                *w = if w.is_nan() { 0.0 } else { w.clamp(0.0, 1.0) };
            }
        }
        self
    }

    pub fn hint_names(&self) -> impl Iterator<Item = &str> {
        self.hints.iter().map(|h| h.name.as_str())
    }
}

/// Which server contexts the host should include
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextInclusion {
    #[default]
    None,
    ThisServer,
    AllServers,
}

impl FromStr for ContextInclusion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "thisserver" => Ok(Self::ThisServer),
            "allservers" => Ok(Self::AllServers),
            _ => Err(format!(
                "Invalid context inclusion '{}'. Valid values: none, this-server, all-servers",
                s
            )),
        }
    }
}
