use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request body sent to the decision service as a single POST.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRequest {
    pub task: String,
    /// Base64-encoded half-scale screenshot.
    pub image: String,
    /// Opaque raw response bodies from earlier iterations, insertion-ordered.
    pub history: Vec<String>,
}

/// Successful decision service response.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionResponse {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Input,
    Swipe,
    OpenApp,
    Done,
    Terminate,
    Wait,
    Unknown,
}

impl ActionKind {
    /// Terminal actions end the iteration chain and clear history.
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionKind::Done | ActionKind::Terminate)
    }
}

/// One decoded action, consumed exactly once by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    /// Action name as received on the wire, kept for user-facing messages.
    pub name: String,
    pub parameters: Map<String, Value>,
}

impl ActionDescriptor {
    pub fn from_response(response: &DecisionResponse) -> Self {
        Self {
            kind: parse_action_kind(&response.action),
            name: response.action.trim().to_string(),
            parameters: response.parameters.clone(),
        }
    }

    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.parameters.get(key).and_then(Value::as_i64)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

/// Terminal actions match case-insensitively; everything else is exact.
fn parse_action_kind(action: &str) -> ActionKind {
    let trimmed = action.trim();
    if trimmed.eq_ignore_ascii_case("done") {
        return ActionKind::Done;
    }
    if trimmed.eq_ignore_ascii_case("terminate") {
        return ActionKind::Terminate;
    }
    match trimmed {
        "click" => ActionKind::Click,
        "input" => ActionKind::Input,
        "swipe" => ActionKind::Swipe,
        "open_app" => ActionKind::OpenApp,
        "wait" => ActionKind::Wait,
        _ => ActionKind::Unknown,
    }
}
