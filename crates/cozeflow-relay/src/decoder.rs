//! Line decoder for the upstream data-frame stream.

/// Prefix every payload line carries.
pub const DATA_PREFIX: &str = "data: ";

/// Payload of the literal end-of-stream frame.
pub const DONE_MARKER: &str = "[DONE]";

/// One complete line of interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine {
  /// The payload of a `data: ` line, prefix removed.
  Data(String),
  /// The literal `data: [DONE]` line.
  Done,
}

/// Splits a byte stream into lines, holding back the trailing incomplete one.
///
/// Bytes are buffered rather than text so that a multi-byte character split
/// across two reads is decoded only once it is whole.
#[derive(Debug, Default)]
pub struct FrameDecoder {
  buffer: Vec<u8>,
}

impl FrameDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a chunk and return every line it completes.
  pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedLine> {
    self.buffer.extend_from_slice(chunk);

    let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
      return Vec::new();
    };

    let rest = self.buffer.split_off(last_newline + 1);
    let complete = std::mem::replace(&mut self.buffer, rest);

    complete
      .split(|b| *b == b'\n')
      .filter_map(decode_line)
      .collect()
  }

  /// Decode whatever is left once the stream has ended.
  pub fn flush(&mut self) -> Option<DecodedLine> {
    let rest = std::mem::take(&mut self.buffer);
    decode_line(&rest)
  }

  /// Number of bytes held back waiting for a newline.
  pub fn pending(&self) -> usize {
    self.buffer.len()
  }
}

fn decode_line(raw: &[u8]) -> Option<DecodedLine> {
  let text = String::from_utf8_lossy(raw);
  let line = text.strip_suffix('\r').unwrap_or(text.as_ref());
  let payload = line.strip_prefix(DATA_PREFIX)?;

  if payload == DONE_MARKER {
    Some(DecodedLine::Done)
  } else {
    Some(DecodedLine::Data(payload.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_complete_lines() {
    let mut decoder = FrameDecoder::new();
    let lines = decoder.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");

    assert_eq!(
      lines,
      vec![
        DecodedLine::Data("{\"a\":1}".into()),
        DecodedLine::Data("{\"b\":2}".into()),
      ]
    );
    assert_eq!(decoder.pending(), 0);
  }

  #[test]
  fn test_split_line_is_held_back() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"data: {\"con").is_empty());
    assert_eq!(decoder.pending(), 11);

    let lines = decoder.push(b"tent\":\"x\"}\n\n");
    assert_eq!(lines, vec![DecodedLine::Data("{\"content\":\"x\"}".into())]);
  }

  #[test]
  fn test_split_multibyte_character() {
    let bytes = "data: 参数\n".as_bytes();
    // Split inside the first CJK character.
    let (head, tail) = bytes.split_at(8);

    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(head).is_empty());
    assert_eq!(decoder.push(tail), vec![DecodedLine::Data("参数".into())]);
  }

  #[test]
  fn test_done_marker_and_other_lines() {
    let mut decoder = FrameDecoder::new();
    let lines = decoder.push(b"id: 3\r\nevent: Done\r\ndata: [DONE]\r\n");
    assert_eq!(lines, vec![DecodedLine::Done]);
  }

  #[test]
  fn test_flush_trailing_line() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"data: tail").is_empty());
    assert_eq!(decoder.flush(), Some(DecodedLine::Data("tail".into())));
    assert_eq!(decoder.flush(), None);
  }
}
