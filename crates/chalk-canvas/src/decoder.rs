//! Assembly of actions from remote agent output.
//!
//! Two delivery modes are supported: function-call arguments streamed in
//! fragments keyed by call id, and ```` ```whiteboard ```` fenced JSON blocks
//! embedded in a text response. Both hand back only validated actions.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::bounds::SafeBounds;
use crate::protocol::WhiteboardAction;
use crate::validate::{ValidatedAction, validate};

/// Fence tag that marks an action block inside a text response.
pub const FENCE_TAG: &str = "whiteboard";

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // An unterminated block at the end of the text is stripped too.
    Regex::new(r"(?s)```whiteboard[^\S\n]*\n?(.*?)(?:```|\z)").expect("valid fence regex")
});

/// Accumulates streamed function-call arguments until the call completes.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingDecoder {
    bounds: SafeBounds,
    pending: HashMap<String, String>,
}

impl StreamingDecoder {
    pub fn new(bounds: SafeBounds) -> Self {
        Self {
            bounds,
            pending: HashMap::new(),
        }
    }

    pub fn bounds(&self) -> &SafeBounds {
        &self.bounds
    }

    pub fn set_bounds(&mut self, bounds: SafeBounds) {
        self.bounds = bounds;
    }

    /// Append an argument fragment for `call_id`.
    pub fn push_fragment(&mut self, call_id: &str, fragment: &str) {
        trace!(call_id, len = fragment.len(), "Function call fragment");
        self.pending
            .entry(call_id.to_string())
            .or_default()
            .push_str(fragment);
    }

    /// Complete a call. The accumulated buffer wins over `arguments` when it
    /// is non-empty. The pending entry is removed whatever the outcome.
    pub fn finish(&mut self, call_id: &str, name: &str, arguments: &str) -> Option<ValidatedAction> {
        let buffered = self.pending.remove(call_id).unwrap_or_default();
        let source = if buffered.trim().is_empty() {
            arguments
        } else {
            buffered.as_str()
        };

        match WhiteboardAction::from_call(name, source) {
            Ok(action) => {
                debug!(call_id, kind = %action.kind(), "Function call decoded");
                Some(validate(action, &self.bounds))
            }
            Err(e) => {
                warn!(call_id, name, error = %e, "Dropping function call");
                None
            }
        }
    }

    pub fn is_pending(&self, call_id: &str) -> bool {
        self.pending.contains_key(call_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every in-flight call.
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "Discarding pending function calls");
        }
        self.pending.clear();
    }
}

/// Result of batch decoding: the human-visible text and the actions that
/// were embedded in it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchDecoded {
    pub text: String,
    pub actions: Vec<ValidatedAction>,
}

/// Strip every whiteboard block from `text` and decode its actions.
///
/// A block that fails to parse contributes no actions, but is still removed
/// from the text. Individual entries with unknown kinds or bad params are
/// dropped one at a time.
pub fn decode_batch(text: &str, bounds: &SafeBounds) -> BatchDecoded {
    let mut actions = Vec::new();

    for caps in FENCE_RE.captures_iter(text) {
        let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let entries = match serde_json::from_str::<Value>(body.trim()) {
            Ok(Value::Array(entries)) => entries,
            Ok(entry @ Value::Object(_)) => vec![entry],
            Ok(other) => {
                warn!(kind = json_kind(&other), "Whiteboard block is not an action list");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Malformed whiteboard block");
                continue;
            }
        };

        for entry in entries {
            match serde_json::from_value::<WhiteboardAction>(entry) {
                Ok(action) => actions.push(validate(action, bounds)),
                Err(e) => warn!(error = %e, "Dropping whiteboard action"),
            }
        }
    }

    let cleaned = FENCE_RE.replace_all(text, "");
    BatchDecoded {
        text: cleaned.trim().to_string(),
        actions,
    }
}

/// Render actions as a fenced whiteboard block.
pub fn encode_batch<'a, I>(actions: I) -> Result<String, serde_json::Error>
where
    I: IntoIterator<Item = &'a WhiteboardAction>,
{
    let actions: Vec<&WhiteboardAction> = actions.into_iter().collect();
    let body = serde_json::to_string_pretty(&actions)?;
    Ok(format!("```{FENCE_TAG}\n{body}\n```"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ActionKind, EquationParams, MoveCursorParams};

    fn bounds() -> SafeBounds {
        SafeBounds::from_canvas(1000.0, 700.0, 40.0)
    }

    #[test]
    fn test_fragments_assemble_equation() {
        let mut decoder = StreamingDecoder::new(bounds());
        decoder.push_fragment("c1", r#"{"la"#);
        decoder.push_fragment("c1", r#"tex":"x^2"}"#);
        assert!(decoder.is_pending("c1"));

        let action = decoder.finish("c1", "draw_equation", "").unwrap();
        assert_eq!(action.kind(), ActionKind::DrawEquation);
        let WhiteboardAction::DrawEquation(EquationParams { latex, .. }) = action.action() else {
            panic!("wrong variant");
        };
        assert_eq!(latex, "x^2");
        assert!(!decoder.is_pending("c1"));
        assert_eq!(decoder.pending_count(), 0);
    }

    #[test]
    fn test_finish_falls_back_to_done_arguments() {
        let mut decoder = StreamingDecoder::new(bounds());
        let action = decoder
            .finish("c9", "move_cursor", r#"{"x": 5000, "y": -20}"#)
            .unwrap();
        assert_eq!(
            action.action(),
            &WhiteboardAction::MoveCursor(MoveCursorParams { x: 860.0, y: 40.0 })
        );
    }

    #[test]
    fn test_malformed_call_dropped_and_removed() {
        let mut decoder = StreamingDecoder::new(bounds());
        decoder.push_fragment("c2", r#"{"latex": "#);
        assert!(decoder.finish("c2", "draw_equation", "").is_none());
        assert!(!decoder.is_pending("c2"));

        decoder.push_fragment("c3", "{}");
        assert!(decoder.finish("c3", "draw_hologram", "").is_none());
        assert!(!decoder.is_pending("c3"));
    }

    #[test]
    fn test_interleaved_calls_and_clear() {
        let mut decoder = StreamingDecoder::new(bounds());
        decoder.push_fragment("a", r#"{"x":"#);
        decoder.push_fragment("b", r#"{"latex""#);
        decoder.push_fragment("a", "100, \"y\": 200}");
        assert_eq!(decoder.pending_count(), 2);

        let a = decoder.finish("a", "move_cursor", "").unwrap();
        assert_eq!(a.kind(), ActionKind::MoveCursor);

        decoder.clear();
        decoder.clear();
        assert_eq!(decoder.pending_count(), 0);
        // A late done for a cleared call has nothing buffered and no args.
        assert!(decoder.finish("b", "draw_equation", "").is_none());
    }

    #[test]
    fn test_batch_strips_block_and_clamps() {
        let text = "Let's plot a point.\n```whiteboard\n[{\"type\": \"move_cursor\", \"params\": {\"x\": 5000, \"y\": -20}}]\n```\nSee?";
        let decoded = decode_batch(text, &bounds());
        assert_eq!(decoded.text, "Let's plot a point.\n\nSee?");
        assert_eq!(decoded.actions.len(), 1);
        let WhiteboardAction::MoveCursor(p) = decoded.actions[0].action() else {
            panic!("wrong variant");
        };
        assert!(p.x <= 860.0);
        assert!(p.y >= 40.0);
    }

    #[test]
    fn test_batch_parse_failure_keeps_text() {
        let text = "Here you go ```whiteboard\n[{\"type\": \"move_cursor\", \n``` done";
        let decoded = decode_batch(text, &bounds());
        assert_eq!(decoded.text, "Here you go  done");
        assert!(decoded.actions.is_empty());
    }

    #[test]
    fn test_batch_drops_bad_entries_individually() {
        let text = r#"```whiteboard
[
  {"type": "draw_hologram", "params": {}},
  {"type": "clear_whiteboard"},
  {"type": "move_cursor", "params": {"x": "far"}},
  {"type": "draw_equation", "params": {"latex": "e^{i\\pi}"}}
]
```"#;
        let decoded = decode_batch(text, &bounds());
        let kinds: Vec<ActionKind> = decoded.actions.iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec![ActionKind::ClearWhiteboard, ActionKind::DrawEquation]);
        assert!(decoded.text.is_empty());
    }

    #[test]
    fn test_unterminated_block_stripped() {
        let decoded = decode_batch("Drawing now ```whiteboard\n[{\"type\": \"clear_", &bounds());
        assert_eq!(decoded.text, "Drawing now");
        assert!(decoded.actions.is_empty());
    }

    #[test]
    fn test_text_without_block_untouched() {
        let decoded = decode_batch("  plain answer  ", &bounds());
        assert_eq!(decoded.text, "plain answer");
        assert!(decoded.actions.is_empty());
    }

    #[test]
    fn test_encode_then_decode_reproduces_validated_actions() {
        let b = bounds();
        let raw = vec![
            WhiteboardAction::MoveCursor(MoveCursorParams { x: 5000.0, y: -20.0 }),
            WhiteboardAction::ClearWhiteboard,
            WhiteboardAction::DrawEquation(EquationParams {
                latex: "\\frac{a}{b}".into(),
                x: Some(100.0),
                y: Some(100.0),
                font_size: Some(32.0),
                color: Some("#1e40af".into()),
            }),
        ];
        let validated: Vec<ValidatedAction> = raw.into_iter().map(|a| validate(a, &b)).collect();
        let block = encode_batch(validated.iter().map(|a| a.action())).unwrap();
        let decoded = decode_batch(&block, &b);
        assert_eq!(decoded.actions, validated);
        assert!(decoded.text.is_empty());
    }
}
