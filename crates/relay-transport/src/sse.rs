//! Server-sent events written by the stream owner.
//!
//! Framing, multi-line data and keep-alive comments are handled by
//! [`axum::response::sse`]; this module only builds the two kinds of event
//! the relay emits.

use axum::response::sse::Event;
use relay_core::SessionId;

/// Name of the event announcing where to post messages.
pub const ENDPOINT_EVENT: &str = "endpoint";

/// Comment text written on idle streams.
pub const KEEP_ALIVE_TEXT: &str = "keep-alive";

/// The announcement telling the peer where to post messages for
/// `session_id`.
///
/// `message_path` must not contain a carriage return.
pub fn endpoint_event(message_path: &str, session_id: &SessionId) -> Event {
    Event::default()
        .event(ENDPOINT_EVENT)
        .data(format!("{message_path}?sessionId={session_id}"))
}

/// Unnamed event carrying one serialized message.
///
/// Serialized JSON never contains a raw carriage return, so any
/// `to_json` output is accepted.
pub fn message_event(json: &str) -> Event {
    Event::default().data(json)
}

/// Wire text of `event` as an event-stream response body writes it.
#[cfg(test)]
pub(crate) async fn render(event: Event) -> String {
    use axum::response::IntoResponse;
    use axum::response::sse::Sse;

    let stream = futures::stream::once(async move { Ok::<_, std::convert::Infallible>(event) });
    let body = Sse::new(stream).into_response().into_body();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn endpoint_frame() {
        let id = SessionId::parse("abc").unwrap();
        assert_eq!(
            render(endpoint_event("/message", &id)).await,
            "event: endpoint\ndata: /message?sessionId=abc\n\n"
        );
    }

    #[tokio::test]
    async fn message_frame() {
        let frame = render(message_event(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)).await;
        assert_eq!(frame, "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\n");
    }

    #[tokio::test]
    async fn multiline_data_gets_one_data_line_each() {
        assert_eq!(render(message_event("a\nb")).await, "data: a\ndata: b\n\n");
    }

    proptest! {
        #[test]
        fn frame_has_single_terminator(data in "[a-z{}\":, \n]{0,64}") {
            let frame = futures::executor::block_on(render(message_event(&data)));
            prop_assert!(frame.ends_with("\n\n"));
            prop_assert_eq!(frame.matches("\n\n").count(), 1);
            prop_assert_eq!(
                frame.lines().filter(|l| l.starts_with("data:")).count(),
                data.split('\n').count()
            );
        }
    }
}
