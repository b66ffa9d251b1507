//! Line-aligned chunking

use crate::types::Chunk;

/// Split `content` into windows of whole lines, each holding at most
/// `max_lines` lines and `max_bytes` bytes. A single line longer than
/// `max_bytes` is split at char boundaries into chunks that share its line
/// number. Empty content yields no chunks.
pub fn chunk_content(content: &str, max_lines: usize, max_bytes: usize) -> Vec<Chunk> {
    let max_lines = max_lines.max(1);
    let max_bytes = max_bytes.max(4);

    let mut chunks = Vec::new();
    let mut start_byte = 0usize;
    let mut start_line = 1u32;
    let mut lines_in_chunk = 0usize;
    let mut bytes_in_chunk = 0usize;

    for (i, line) in content.split_inclusive('\n').enumerate() {
        let line_no = i as u32 + 1;

        if lines_in_chunk > 0
            && (lines_in_chunk + 1 > max_lines || bytes_in_chunk + line.len() > max_bytes)
        {
            push_chunk(
                &mut chunks,
                &content[start_byte..start_byte + bytes_in_chunk],
                start_line,
                line_no - 1,
            );
            start_byte += bytes_in_chunk;
            start_line = line_no;
            lines_in_chunk = 0;
            bytes_in_chunk = 0;
        }

        if line.len() > max_bytes {
            for piece in split_at_char_boundaries(line, max_bytes) {
                push_chunk(&mut chunks, piece, line_no, line_no);
            }
            start_byte += line.len();
            start_line = line_no + 1;
            continue;
        }

        lines_in_chunk += 1;
        bytes_in_chunk += line.len();
    }

    if lines_in_chunk > 0 {
        let end_line = start_line + lines_in_chunk as u32 - 1;
        push_chunk(
            &mut chunks,
            &content[start_byte..start_byte + bytes_in_chunk],
            start_line,
            end_line,
        );
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, content: &str, start_line: u32, end_line: u32) {
    chunks.push(Chunk {
        index: chunks.len() as u32,
        start_line,
        end_line,
        content: content.to_string(),
    });
}

fn split_at_char_boundaries(text: &str, max_bytes: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut cut = rest.len().min(max_bytes);
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (piece, tail) = rest.split_at(cut);
        pieces.push(piece);
        rest = tail;
    }
    pieces
}
