//! Interpretation of a single event-stream frame.

use crate::api::ChatCompletionChunk;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Outcome of parsing one frame. At most one per frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    Delta(ChatCompletionChunk),
    /// The producer finished; no further frames should be read.
    Done,
    /// Not a data frame (comments, `event:` lines, blank frames).
    Ignored,
    /// A data frame whose payload is not a delta record. Recoverable.
    Malformed(MalformedFrame),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed frame payload ({reason}): {payload}")]
pub struct MalformedFrame {
    pub payload: String,
    pub reason: String,
}

fn extract_data_payload(frame: &str) -> Option<&str> {
    frame.trim().strip_prefix(DATA_PREFIX).map(str::trim)
}

pub fn parse_frame(frame: &str) -> FrameEvent {
    let Some(payload) = extract_data_payload(frame) else {
        return FrameEvent::Ignored;
    };

    if payload == DONE_SENTINEL {
        return FrameEvent::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => FrameEvent::Delta(chunk),
        Err(err) => FrameEvent::Malformed(MalformedFrame {
            payload: payload.to_string(),
            reason: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_of(event: FrameEvent) -> Option<String> {
        match event {
            FrameEvent::Delta(chunk) => chunk.delta.content,
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn handles_prefix_spacing_variants() {
        let variants = [
            r#"data: {"delta":{"content":"Hello"}}"#,
            r#"data:{"delta":{"content":"Hello"}}"#,
            "  data:   {\"delta\":{\"content\":\"Hello\"}}  \n",
        ];
        for frame in variants {
            assert_eq!(content_of(parse_frame(frame)).as_deref(), Some("Hello"));
        }
    }

    #[test]
    fn recognizes_done_sentinel() {
        assert_eq!(parse_frame("data: [DONE]"), FrameEvent::Done);
        assert_eq!(parse_frame("data:[DONE]\n"), FrameEvent::Done);
    }

    #[test]
    fn ignores_non_data_frames() {
        assert_eq!(parse_frame(""), FrameEvent::Ignored);
        assert_eq!(parse_frame(": keep-alive"), FrameEvent::Ignored);
        assert_eq!(
            parse_frame("event: error\ndata: {\"detail\":\"boom\"}"),
            FrameEvent::Ignored
        );
        assert_eq!(parse_frame("id: 7"), FrameEvent::Ignored);
    }

    #[test]
    fn reports_malformed_payloads() {
        match parse_frame("data: {not json") {
            FrameEvent::Malformed(bad) => {
                assert_eq!(bad.payload, "{not json");
                assert!(!bad.reason.is_empty());
                let err: &dyn std::error::Error = &bad;
                assert_eq!(
                    err.to_string(),
                    format!("malformed frame payload ({}): {{not json", bad.reason)
                );
            }
            other => panic!("expected malformed frame, got {other:?}"),
        }

        assert!(matches!(
            parse_frame(r#"data: {"detail":"no delta here"}"#),
            FrameEvent::Malformed(_)
        ));
    }

    #[test]
    fn delta_without_content_is_still_a_delta() {
        match parse_frame(r#"data: {"delta":{"role":"assistant","finish_reason":"stop"}}"#) {
            FrameEvent::Delta(chunk) => {
                assert!(chunk.delta.content.is_none());
                assert_eq!(chunk.delta.finish_reason.as_deref(), Some("stop"));
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }
}
