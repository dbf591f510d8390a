//! The relay state machine and its async driver.

use std::fmt::Display;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::client::{ClientFrame, RelayFrame};
use crate::decoder::{DecodedLine, FrameDecoder};
use crate::frame::UpstreamFrame;

/// Synchronous relay core.
///
/// Feed it upstream chunks in order; it returns the client frames each chunk
/// produces. Once a terminal frame has been relayed the relay is closed and
/// later input is ignored. The terminator is produced exactly once, either
/// right after a terminal frame or by [`StreamRelay::finish`].
#[derive(Debug, Default)]
pub struct StreamRelay {
  decoder: FrameDecoder,
  closed: bool,
  terminated: bool,
  relayed: usize,
}

impl StreamRelay {
  pub fn new() -> Self {
    Self::default()
  }

  /// Whether no more upstream input will be relayed.
  pub fn is_closed(&self) -> bool {
    self.closed
  }

  /// Number of content frames relayed so far.
  pub fn relayed(&self) -> usize {
    self.relayed
  }

  pub fn feed(&mut self, chunk: &[u8]) -> Vec<ClientFrame> {
    if self.closed {
      return Vec::new();
    }

    let mut out = Vec::new();
    for line in self.decoder.push(chunk) {
      self.handle_line(line, &mut out);
      if self.closed {
        break;
      }
    }
    out
  }

  /// Relay a transport failure as a final error frame.
  pub fn fail(&mut self, message: impl Display) -> Vec<ClientFrame> {
    if self.closed {
      return Vec::new();
    }

    warn!(error = %message, "relay_transport_error");
    let mut out = vec![ClientFrame::Frame(RelayFrame::error(format!(
      "stream interrupted: {}",
      message
    )))];
    self.relayed += 1;
    self.close(&mut out);
    out
  }

  /// End the relay: decode any trailing partial line, then terminate.
  pub fn finish(&mut self) -> Vec<ClientFrame> {
    let mut out = Vec::new();
    if !self.closed {
      if let Some(line) = self.decoder.flush() {
        self.handle_line(line, &mut out);
      }
    }
    self.close(&mut out);
    out
  }

  fn handle_line(&mut self, line: DecodedLine, out: &mut Vec<ClientFrame>) {
    let payload = match line {
      DecodedLine::Done => {
        debug!("upstream sent end-of-stream marker");
        self.close(out);
        return;
      }
      DecodedLine::Data(payload) => payload,
    };

    let frame = UpstreamFrame::parse(&payload);
    if let UpstreamFrame::Malformed { raw } = &frame {
      warn!(raw = %raw, "relay_frame_undecodable");
    }

    let terminal = frame.is_terminal();
    if let Some(relay_frame) = frame.into_relay_frame() {
      self.relayed += 1;
      out.push(ClientFrame::Frame(relay_frame));
    }

    if terminal {
      self.close(out);
    }
  }

  fn close(&mut self, out: &mut Vec<ClientFrame>) {
    self.closed = true;
    if !self.terminated {
      self.terminated = true;
      out.push(ClientFrame::Terminator);
      info!(frames = self.relayed, "relay_closed");
    }
  }
}

/// Relay an upstream body as a stream of client frames.
///
/// The body is dropped as soon as the relay closes, so a terminal frame
/// releases the connection without reading the rest of it. The returned
/// stream always ends with [`ClientFrame::Terminator`].
pub fn relay<S, E>(body: S) -> impl Stream<Item = ClientFrame> + Send
where
  S: Stream<Item = Result<Bytes, E>> + Send + 'static,
  E: Display + Send,
{
  async_stream::stream! {
    let mut state = StreamRelay::new();
    let mut body = Box::pin(body);

    while let Some(chunk) = body.next().await {
      let frames = match chunk {
        Ok(bytes) => state.feed(&bytes),
        Err(e) => state.fail(e),
      };
      for frame in frames {
        yield frame;
      }
      if state.is_closed() {
        break;
      }
    }
    drop(body);

    for frame in state.finish() {
      yield frame;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn contents(frames: &[ClientFrame]) -> Vec<String> {
    frames
      .iter()
      .map(|f| match f {
        ClientFrame::Frame(frame) => frame.content.clone(),
        ClientFrame::Terminator => "[DONE]".to_string(),
      })
      .collect()
  }

  #[test]
  fn test_terminal_frame_closes_relay() {
    let mut relay = StreamRelay::new();
    let out = relay.feed(
      b"data: {\"event\":\"Done\"}\n\ndata: {\"event\":\"Message\",\"content\":\"late\"}\n\n",
    );

    assert_eq!(contents(&out), vec!["workflow completed", "[DONE]"]);
    assert!(relay.is_closed());
    assert!(relay.feed(b"data: {\"content\":\"x\"}\n").is_empty());
    assert!(relay.finish().is_empty());
  }

  #[test]
  fn test_done_marker_ends_without_frame() {
    let mut relay = StreamRelay::new();
    let out = relay.feed(b"data: [DONE]\n\n");
    assert_eq!(out, vec![ClientFrame::Terminator]);
    assert_eq!(relay.relayed(), 0);
  }

  #[test]
  fn test_finish_flushes_partial_line() {
    let mut relay = StreamRelay::new();
    assert!(relay.feed(b"data: {\"content\":\"tail\"}").is_empty());
    assert_eq!(contents(&relay.finish()), vec!["tail", "[DONE]"]);
  }

  #[test]
  fn test_fail_emits_error_then_terminator() {
    let mut relay = StreamRelay::new();
    let out = relay.fail("connection reset");

    assert_eq!(
      contents(&out),
      vec!["stream interrupted: connection reset", "[DONE]"]
    );
    assert!(relay.finish().is_empty());
    assert!(relay.fail("again").is_empty());
  }
}
