//! Chat broadcast composition.
//!
//! A broadcast is a single in-game `tellraw` command addressed to every
//! player, built from up to three colored text segments:
//!
//! 1. the source label, always present, rendered as `[source] `
//! 2. the player label, rendered as `<player> `
//! 3. the message text itself

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Colors used for each broadcast segment.
///
/// Values are passed through verbatim as the `color` of each text component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastColors {
    pub source: String,
    pub player: String,
    pub message: String,
}

impl Default for BroadcastColors {
    fn default() -> Self {
        Self {
            source: "gold".to_string(),
            player: "green".to_string(),
            message: "white".to_string(),
        }
    }
}

/// One colored text component of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub color: String,
    pub text: String,
}

/// Builds the ordered segments for a broadcast.
///
/// Empty `player` or `message` values are treated as absent.
pub fn segments(colors: &BroadcastColors, source: &str, player: Option<&str>, message: Option<&str>) -> Vec<Segment> {
    let mut segments = vec![Segment {
        color: colors.source.clone(),
        text: format!("[{source}] "),
    }];
    if let Some(player) = player.filter(|p| !p.is_empty()) {
        segments.push(Segment {
            color: colors.player.clone(),
            text: format!("<{player}> "),
        });
    }
    if let Some(message) = message.filter(|m| !m.is_empty()) {
        segments.push(Segment {
            color: colors.message.clone(),
            text: message.to_string(),
        });
    }
    segments
}

/// Composes the full broadcast command.
pub fn compose(colors: &BroadcastColors, source: &str, player: Option<&str>, message: Option<&str>) -> String {
    format!("tellraw @a {}", json!(segments(colors, source, player, message)))
}

/// A `tellraw` command showing plain, uncolored text to every player.
pub fn tellraw_text(text: &str) -> String {
    format!("tellraw @a {}", json!({ "text": text }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_three_segments_in_order() {
        let colors = BroadcastColors::default();
        let segments = segments(&colors, "Bot", Some("Alice"), Some("hi"));
        let texts: Vec<_> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["[Bot] ", "<Alice> ", "hi"]);
        assert_eq!(segments[0].color, colors.source);
        assert_eq!(segments[1].color, colors.player);
        assert_eq!(segments[2].color, colors.message);
    }

    #[test]
    fn test_source_only() {
        let segments = segments(&BroadcastColors::default(), "QQ", None, Some(""));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "[QQ] ");
    }

    #[test]
    fn test_message_without_player() {
        let segments = segments(&BroadcastColors::default(), "QQ", None, Some("server restarting"));
        let texts: Vec<_> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["[QQ] ", "server restarting"]);
    }

    #[test]
    fn test_compose_renders_tellraw_json() {
        let colors = BroadcastColors {
            source: "yellow".to_string(),
            player: "aqua".to_string(),
            message: "white".to_string(),
        };
        let command = compose(&colors, "Bot", Some("Alice"), Some("hi"));
        assert_eq!(
            command,
            r#"tellraw @a [{"color":"yellow","text":"[Bot] "},{"color":"aqua","text":"<Alice> "},{"color":"white","text":"hi"}]"#
        );
    }

    #[test]
    fn test_tellraw_text_escapes_quotes() {
        assert_eq!(tellraw_text(r#"say "hi""#), r#"tellraw @a {"text":"say \"hi\""}"#);
    }
}
