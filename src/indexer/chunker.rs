#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
    /// Byte offset of `text` inside the (trimmed) source text.
    pub offset: usize,
}

/// Rounds a byte position up to a char boundary.
fn ceil_char_boundary(text: &str, byte_pos: usize) -> usize {
    if byte_pos >= text.len() {
        return text.len();
    }
    let mut pos = byte_pos;
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Rounds a byte position down to a char boundary.
fn floor_char_boundary(text: &str, byte_pos: usize) -> usize {
    if byte_pos >= text.len() {
        return text.len();
    }
    let mut pos = byte_pos;
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Sliding window of at most `max_chunk_size` bytes with `overlap` bytes carried
/// into the next window. Windows end on the latest paragraph, line, sentence or word
/// break available.
pub fn chunk_text(text: &str, max_chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.len() <= max_chunk_size {
        return vec![TextChunk {
            text: text.to_string(),
            chunk_index: 0,
            offset: 0,
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chunk_index = 0;

    while start < text.len() {
        let limit = (start + max_chunk_size).min(text.len());
        let mut end = floor_char_boundary(text, limit);
        if end <= start {
            // window narrower than a single char
            end = ceil_char_boundary(text, limit);
        }

        let actual_end = if end < text.len() {
            find_break_point(text, start, end)
        } else {
            end
        };

        let window = &text[start..actual_end];
        let chunk_text = window.trim();
        if !chunk_text.is_empty() {
            let leading = window.len() - window.trim_start().len();
            chunks.push(TextChunk {
                text: chunk_text.to_string(),
                chunk_index,
                offset: start + leading,
            });
            chunk_index += 1;
        }

        if actual_end >= text.len() {
            break;
        }

        let next_start = if actual_end > overlap {
            floor_char_boundary(text, actual_end - overlap)
        } else {
            actual_end
        };

        if next_start <= start {
            start = actual_end;
        } else {
            start = next_start;
        }
    }

    chunks
}

fn find_break_point(text: &str, start: usize, max_end: usize) -> usize {
    let segment = &text[start..max_end];

    if let Some(pos) = segment.rfind("\n\n") {
        if pos > 0 {
            return start + pos + 2;
        }
    }
    if let Some(pos) = segment.rfind('\n') {
        if pos > 0 {
            return start + pos + 1;
        }
    }
    for sentinel in [". ", "? ", "! ", "。", "？", "！"] {
        if let Some(pos) = segment.rfind(sentinel) {
            return start + pos + sentinel.len();
        }
    }
    if let Some(pos) = segment.rfind(' ') {
        if pos > 0 {
            return start + pos + 1;
        }
    }
    max_end
}
