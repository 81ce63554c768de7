use bytes::Bytes;
use futures::StreamExt;
use kaiwa_expert::sse::{parse_expert_stream, ExpertFrame};
use std::convert::Infallible;

fn byte_stream(
    chunks: Vec<&str>,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let owned: Vec<Result<Bytes, Infallible>> = chunks
        .into_iter()
        .map(|c| Ok(Bytes::from(c.to_string())))
        .collect();
    futures::stream::iter(owned)
}

async fn collect(chunks: Vec<&str>) -> Vec<ExpertFrame> {
    let mut stream = Box::pin(parse_expert_stream(byte_stream(chunks)));
    let mut frames = Vec::new();
    while let Some(frame) = stream.next().await {
        frames.push(frame.unwrap());
    }
    frames
}

#[tokio::test]
async fn content_frames_then_done() {
    let frames = collect(vec![
        "data: {\"content\":\"nitrite \"}\n\n",
        "data: {\"content\":\"levels are \"}\n\ndata: {\"content\":\"normal\"}\n\n",
        "data: {\"done\":true}\n\n",
    ])
    .await;

    assert_eq!(
        frames,
        vec![
            ExpertFrame::Content("nitrite ".to_string()),
            ExpertFrame::Content("levels are ".to_string()),
            ExpertFrame::Content("normal".to_string()),
            ExpertFrame::Done,
        ]
    );
}

#[tokio::test]
async fn error_frame_terminates_stream() {
    let frames = collect(vec![
        "data: {\"content\":\"partial\"}\n\n",
        "data: {\"error\":\"backend unavailable\"}\n\n",
        "data: {\"content\":\"never delivered\"}\n\n",
    ])
    .await;

    assert_eq!(frames.len(), 2);
    assert_eq!(
        frames[1],
        ExpertFrame::Error("backend unavailable".to_string())
    );
}

#[tokio::test]
async fn event_lines_are_not_authoritative() {
    let frames = collect(vec![
        "event: message\ndata: {\"content\":\"hello\"}\n\n",
        "event: close\n\n",
        "data: {\"done\":true}\n\n",
    ])
    .await;

    assert_eq!(
        frames,
        vec![
            ExpertFrame::Content("hello".to_string()),
            ExpertFrame::Done,
        ]
    );
}

#[tokio::test]
async fn raw_text_payload_becomes_content() {
    let frames = collect(vec![
        "data: shrimp molt every few weeks\n\n",
        "data: {\"done\":true}\n\n",
    ])
    .await;

    assert_eq!(
        frames[0],
        ExpertFrame::Content("shrimp molt every few weeks".to_string())
    );
}

#[tokio::test]
async fn frame_split_across_byte_chunks() {
    let frames = collect(vec![
        "data: {\"cont",
        "ent\":\"dissolved oxygen\"}\n\n",
        "data: {\"done\":true}\n\n",
    ])
    .await;

    assert_eq!(
        frames[0],
        ExpertFrame::Content("dissolved oxygen".to_string())
    );
}
