//! Integration tests for cozeflow-relay driving the async relay end to end.

use bytes::Bytes;
use cozeflow_relay::{ClientFrame, RelayFrame, StreamRelay, relay};
use futures::StreamExt;

fn chunks(parts: &[&str]) -> impl futures::Stream<Item = Result<Bytes, String>> + Send + 'static {
  let owned: Vec<Result<Bytes, String>> = parts
    .iter()
    .map(|p| Ok(Bytes::from(p.to_string())))
    .collect();
  futures::stream::iter(owned)
}

async fn collect_sse(stream: impl futures::Stream<Item = ClientFrame>) -> Vec<String> {
  stream.map(|f| f.to_sse()).collect().await
}

fn frames(out: &[ClientFrame]) -> Vec<RelayFrame> {
  out
    .iter()
    .filter_map(|f| match f {
      ClientFrame::Frame(frame) => Some(frame.clone()),
      ClientFrame::Terminator => None,
    })
    .collect()
}

#[tokio::test]
async fn test_messages_then_done() {
  let body = chunks(&[
    "data: {\"event\":\"Message\",\"content\":\"A\"}\n\n",
    "data: {\"event\":\"Message\",\"content\":\"B\"}\n\n",
    "data: {\"event\":\"Done\",\"logid\":\"L9\"}\n\n",
  ]);

  let out = collect_sse(relay(body)).await;

  assert_eq!(
    out,
    vec![
      "data: {\"content\":\"A\",\"event\":\"Message\"}\n\n",
      "data: {\"content\":\"B\",\"event\":\"Message\"}\n\n",
      "data: {\"content\":\"workflow completed\",\"event\":\"Done\",\"logid\":\"L9\"}\n\n",
      "data: [DONE]\n\n",
    ]
  );
}

#[tokio::test]
async fn test_parameter_error_terminates() {
  let body = chunks(&[
    "data: {\"event\":\"Error\",\"error_code\":5000,\"error_message\":\"bad input\"}\n\n",
    "data: {\"event\":\"Message\",\"content\":\"never relayed\"}\n\n",
  ]);

  let out: Vec<ClientFrame> = relay(body).collect().await;

  assert_eq!(out.len(), 2);
  let relayed = frames(&out);
  assert_eq!(relayed[0].content, "parameter error");
  assert_eq!(relayed[0].error_code, Some(5000));
  assert_eq!(out[1], ClientFrame::Terminator);
}

#[tokio::test]
async fn test_split_frame_matches_whole_frame() {
  let whole = "data: {\"event\":\"Message\",\"content\":\"字幕\",\"node_title\":\"End\"}\n\n";

  let whole_out = collect_sse(relay(chunks(&[whole]))).await;

  for split in 1..whole.len() {
    if !whole.is_char_boundary(split) {
      continue;
    }
    let (head, tail) = whole.split_at(split);
    let split_out = collect_sse(relay(chunks(&[head, tail]))).await;
    assert_eq!(split_out, whole_out, "split at byte {}", split);
  }
}

#[tokio::test]
async fn test_split_inside_multibyte_character() {
  let whole = "data: {\"content\":\"字幕\"}\n".as_bytes().to_vec();
  let (head, tail) = whole.split_at(19);
  let body = futures::stream::iter(vec![
    Ok::<_, String>(Bytes::copy_from_slice(head)),
    Ok(Bytes::copy_from_slice(tail)),
  ]);

  let out: Vec<ClientFrame> = relay(body).collect().await;
  assert_eq!(frames(&out)[0].content, "字幕");
}

#[tokio::test]
async fn test_transport_error_still_terminates() {
  let body = futures::stream::iter(vec![
    Ok(Bytes::from_static(b"data: {\"event\":\"Message\",\"content\":\"A\"}\n\n")),
    Err("connection reset by peer".to_string()),
    Ok(Bytes::from_static(b"data: {\"event\":\"Message\",\"content\":\"B\"}\n\n")),
  ]);

  let out: Vec<ClientFrame> = relay(body).collect().await;

  let relayed = frames(&out);
  assert_eq!(relayed.len(), 2);
  assert_eq!(relayed[0].content, "A");
  assert!(relayed[1].is_terminal());
  assert!(relayed[1].content.contains("connection reset by peer"));
  assert_eq!(out.last(), Some(&ClientFrame::Terminator));
}

#[tokio::test]
async fn test_stream_end_without_terminal_frame() {
  let body = chunks(&["data: {\"content\":\"legacy\"}\n\n", "data: not json\n\n"]);

  let out: Vec<ClientFrame> = relay(body).collect().await;
  let relayed = frames(&out);

  assert_eq!(relayed[0].content, "legacy");
  assert_eq!(relayed[1].content, "not json");
  assert_eq!(out.last(), Some(&ClientFrame::Terminator));
  assert_eq!(
    out.iter().filter(|f| **f == ClientFrame::Terminator).count(),
    1
  );
}

#[test]
fn test_empty_body_still_terminates() {
  let mut relay = StreamRelay::new();
  assert_eq!(relay.finish(), vec![ClientFrame::Terminator]);
}

#[tokio::test]
async fn test_terminal_frame_with_odd_field_types_closes_relay() {
  let body = chunks(&[
    "data: {\"event\":\"Done\",\"logid\":12345}\n\n",
    "data: {\"event\":\"Message\",\"content\":\"after done\"}\n\n",
  ]);
  let out = collect_sse(relay(body)).await;
  assert_eq!(
    out,
    vec![
      "data: {\"content\":\"workflow completed\",\"event\":\"Done\",\"logid\":\"12345\"}\n\n",
      "data: [DONE]\n\n",
    ]
  );

  let body = chunks(&[
    "data: {\"event\":\"Error\",\"error_code\":\"5000\"}\n\n",
    "data: {\"event\":\"Message\",\"content\":\"after error\"}\n\n",
  ]);
  let out: Vec<ClientFrame> = relay(body).collect().await;
  let relayed = frames(&out);
  assert_eq!(relayed.len(), 1);
  assert_eq!(relayed[0].content, "parameter error");
  assert_eq!(out.last(), Some(&ClientFrame::Terminator));
}
