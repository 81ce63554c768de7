use bytes::Bytes;
use futures::StreamExt;
use kaiwa_llm::streaming::parse_sse_bytes;
use kaiwa_llm::{collect_stream, LlmError, StreamEvent};
use std::convert::Infallible;
use tokio_util::sync::CancellationToken;

fn byte_stream(
    chunks: Vec<&str>,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let owned: Vec<Result<Bytes, Infallible>> = chunks
        .into_iter()
        .map(|c| Ok(Bytes::from(c.to_string())))
        .collect();
    futures::stream::iter(owned)
}

fn delta(content: &str) -> String {
    format!(
        "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}},\"finish_reason\":null}}]}}\n\n",
        serde_json::to_string(content).unwrap()
    )
}

#[tokio::test]
async fn parses_chunks_in_order() {
    let frames = format!(
        "{}{}{}data: [DONE]\n\n",
        delta("The "),
        delta("pH is "),
        delta("7.8.")
    );
    let mut stream = parse_sse_bytes(byte_stream(vec![&frames]));

    let mut contents = Vec::new();
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            StreamEvent::Message { content } => contents.push(content),
            StreamEvent::Done { .. } => break,
        }
    }
    assert_eq!(contents, vec!["The ", "pH is ", "7.8."]);
}

#[tokio::test]
async fn handles_frames_split_across_byte_chunks() {
    let frame = delta("water temperature");
    let (head, tail) = frame.split_at(20);
    let mut stream = parse_sse_bytes(byte_stream(vec![head, tail, "data: [DONE]\n\n"]));

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(
        first,
        StreamEvent::Message {
            content: "water temperature".to_string()
        }
    );
}

#[tokio::test]
async fn finish_reason_terminates_the_stream() {
    let frames = format!(
        "{}data: {{\"choices\":[{{\"delta\":{{}},\"finish_reason\":\"stop\"}}]}}\n\n{}",
        delta("done"),
        delta("never seen")
    );
    let mut stream = parse_sse_bytes(byte_stream(vec![&frames]));

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[1],
        StreamEvent::Done {
            finish_reason: Some(ref r)
        } if r == "stop"
    ));
}

#[tokio::test]
async fn empty_deltas_are_skipped() {
    let frames = format!("{}{}data: [DONE]\n\n", delta(""), delta("text"));
    let mut stream = parse_sse_bytes(byte_stream(vec![&frames]));

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(
        first,
        StreamEvent::Message {
            content: "text".to_string()
        }
    );
}

#[tokio::test]
async fn collect_stream_concatenation_matches_chunks() {
    let frames = format!(
        "{}{}{}data: [DONE]\n\n",
        delta("a"),
        delta("b"),
        delta("c")
    );
    let stream = parse_sse_bytes(byte_stream(vec![&frames]));

    let mut seen = String::new();
    let cancel = CancellationToken::new();
    let text = collect_stream(stream, &cancel, |chunk| seen.push_str(chunk))
        .await
        .unwrap();

    assert_eq!(text, "abc");
    assert_eq!(seen, text);
}

#[tokio::test]
async fn collect_stream_observes_cancellation() {
    // A stream that never ends on its own.
    let pending: kaiwa_llm::ChatStream = Box::pin(futures::stream::pending());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = collect_stream(pending, &cancel, |_| {}).await;
    assert!(matches!(result, Err(LlmError::Canceled)));
}

#[tokio::test]
async fn malformed_chunk_yields_invalid_response() {
    let frames = "data: {not json}\n\n";
    let mut stream = parse_sse_bytes(byte_stream(vec![frames]));

    let event = stream.next().await.unwrap();
    assert!(matches!(event, Err(LlmError::InvalidResponse(_))));
}
