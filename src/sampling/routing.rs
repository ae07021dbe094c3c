//! Dispatch routing
//!
//! Decides whether a pending request goes to the model (AI path), to a human
//! reviewer (HITL path), or is rejected outright.
//!
//! - `manual`: always HITL
//! - `llm`: always AI
//! - `hybrid`: ordered rules, first match wins; no match falls back to HITL
//!   when `fallback_to_human` is set, else AI

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::request::SamplingRequest;
use crate::config::SamplingConfig;
use crate::types::{Result, SamplingError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    #[default]
    Manual,
    Llm,
    Hybrid,
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingMode::Manual => write!(f, "manual"),
            SamplingMode::Llm => write!(f, "llm"),
            SamplingMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for SamplingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" | "human" => Ok(SamplingMode::Manual),
            "llm" | "ai" => Ok(SamplingMode::Llm),
            "hybrid" => Ok(SamplingMode::Hybrid),
            _ => Err(format!(
                "Invalid sampling mode '{}'. Valid values: manual, llm, hybrid",
                s
            )),
        }
    }
}

/// Rule predicate, e.g. `{ type = "low_cost_request", value = 0.01 }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Request comes from this server, matched against its id or display name
    TrustedServer(String),
    /// Estimated cost at or below this amount
    LowCostRequest(f64),
    /// Any text message matches this regex
    SafeContentPattern(String),
    /// A model hint contains this substring
    ModelPreference(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "reason", rename_all = "snake_case")]
pub enum RuleAction {
    AutoApprove,
    RequireReview,
    Reject(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub condition: RuleCondition,
    pub action: RuleAction,
}

fn default_enabled() -> bool {
    true
}

/// Where a pending request should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Ai,
    Hitl,
    Reject(String),
}

impl From<&RuleAction> for RouteDecision {
    fn from(action: &RuleAction) -> Self {
        match action {
            RuleAction::AutoApprove => RouteDecision::Ai,
            RuleAction::RequireReview => RouteDecision::Hitl,
            RuleAction::Reject(reason) => RouteDecision::Reject(reason.clone()),
        }
    }
}

// =============================================================================
// Router
// =============================================================================

#[derive(Debug)]
struct CompiledRule {
    rule: RoutingRule,
    pattern: Option<Regex>,
}

impl CompiledRule {
    fn matches(&self, request: &SamplingRequest) -> bool {
        match &self.rule.condition {
            RuleCondition::TrustedServer(server) => {
                request.server_id == *server || request.server_name == *server
            }
            RuleCondition::LowCostRequest(max) => {
                request.estimated_cost.is_some_and(|cost| cost <= *max)
            }
            RuleCondition::SafeContentPattern(_) => self.pattern.as_ref().is_some_and(|re| {
                request
                    .messages
                    .iter()
                    .filter_map(|m| m.text())
                    .any(|text| re.is_match(text))
            }),
            RuleCondition::ModelPreference(hint) => {
                let wanted = hint.to_lowercase();
                request.model_preferences.as_ref().is_some_and(|prefs| {
                    prefs
                        .hint_names()
                        .any(|name| name.to_lowercase().contains(&wanted))
                })
            }
        }
    }
}

/// Routing rules compiled once per configuration
#[derive(Debug)]
pub struct Router {
    mode: SamplingMode,
    fallback_to_human: bool,
    rules: Vec<CompiledRule>,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            mode: SamplingMode::default(),
            fallback_to_human: true,
            rules: Vec::new(),
        }
    }
}

impl Router {
    pub fn new(mode: SamplingMode, rules: &[RoutingRule], fallback_to_human: bool) -> Result<Self> {
        let rules = rules
            .iter()
            .filter(|r| r.enabled)
            .map(|rule| {
                let pattern = match &rule.condition {
                    RuleCondition::SafeContentPattern(p) => Some(Regex::new(p).map_err(|e| {
                        SamplingError::Config(format!(
                            "Rule '{}' has an invalid pattern: {}",
                            rule.name, e
                        ))
                    })?),
                    _ => None,
                };
                Ok(CompiledRule {
                    rule: rule.clone(),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            mode,
            fallback_to_human,
            rules,
        })
    }

    pub fn from_config(config: &SamplingConfig) -> Result<Self> {
        Self::new(config.mode, &config.rules, config.fallback_to_human)
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    pub fn decide(&self, request: &SamplingRequest) -> RouteDecision {
        match self.mode {
            SamplingMode::Manual => RouteDecision::Hitl,
            SamplingMode::Llm => RouteDecision::Ai,
            SamplingMode::Hybrid => {
                if let Some(compiled) = self.rules.iter().find(|c| c.matches(request)) {
                    debug!(
                        request_id = %request.id,
                        rule = %compiled.rule.name,
                        "Routing rule matched"
                    );
                    return RouteDecision::from(&compiled.rule.action);
                }
                if self.fallback_to_human {
                    RouteDecision::Hitl
                } else {
                    RouteDecision::Ai
                }
            }
        }
    }
}
