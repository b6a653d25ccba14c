//! Control protocol messages
//!
//! One JSON object per line, dispatched on the `op` field. Anything that
//! fails to parse is answered with ack 400 and otherwise ignored.

use serde::Deserialize;

/// Client-to-server control message
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "lowercase", deny_unknown_fields)]
pub enum ControlRequest {
    Auth {
        token: String,
    },
    Subscribe {
        topics: Vec<String>,
        #[serde(default)]
        lossless: bool,
    },
    Unsubscribe {
        topics: Vec<String>,
    },
}

/// Parse one control line
pub fn parse_control_line(line: &str) -> Result<ControlRequest, serde_json::Error> {
    serde_json::from_str(line.trim())
}

/// Extract just the `op` field, tolerating otherwise malformed requests
///
/// The unauthenticated state answers 401 to any recognizable non-auth op,
/// even one missing its required fields, before full parsing happens.
pub fn peek_op(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
    value.get("op")?.as_str().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auth() {
        let request = parse_control_line(r#"{"op":"auth","token":"devtoken"}"#).unwrap();
        assert_eq!(
            request,
            ControlRequest::Auth {
                token: "devtoken".into()
            }
        );
    }

    #[test]
    fn parses_subscribe_with_default_lossless() {
        let request =
            parse_control_line(r#"{"op":"subscribe","topics":["l1.BTCUSDT","trade.*"]}"#).unwrap();
        assert_eq!(
            request,
            ControlRequest::Subscribe {
                topics: vec!["l1.BTCUSDT".into(), "trade.*".into()],
                lossless: false,
            }
        );
    }

    #[test]
    fn parses_subscribe_lossless() {
        let request = parse_control_line(
            r#"{"op":"subscribe","topics":["trade.*"],"lossless":true}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            ControlRequest::Subscribe {
                topics: vec!["trade.*".into()],
                lossless: true,
            }
        );
    }

    #[test]
    fn parses_unsubscribe() {
        let request = parse_control_line(r#"{"op":"unsubscribe","topics":["trade.*"]}"#).unwrap();
        assert_eq!(
            request,
            ControlRequest::Unsubscribe {
                topics: vec!["trade.*".into()]
            }
        );
    }

    #[test]
    fn unknown_op_is_an_error() {
        assert!(parse_control_line(r#"{"op":"frobnicate"}"#).is_err());
    }

    #[test]
    fn bare_subscribe_without_topics_is_an_error() {
        assert!(parse_control_line(r#"{"op":"subscribe"}"#).is_err());
    }

    #[test]
    fn trailing_newline_is_tolerated() {
        assert!(parse_control_line("{\"op\":\"auth\",\"token\":\"t\"}\n").is_ok());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_control_line("not json at all").is_err());
    }

    #[test]
    fn peek_op_survives_missing_fields() {
        assert_eq!(peek_op(r#"{"op":"subscribe"}"#).as_deref(), Some("subscribe"));
        assert_eq!(peek_op(r#"{"op":"auth"}"#).as_deref(), Some("auth"));
        assert_eq!(peek_op(r#"{"token":"x"}"#), None);
        assert_eq!(peek_op("garbage"), None);
    }
}
