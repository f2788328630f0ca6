// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal control-sequence handling for the preview collector: attention
//! signal detection and control-sequence stripping. A small hand-written
//! state machine, since plain-text preview extraction from raw screen
//! buffers has no off-the-shelf crate fit for this shape.

const BEL: u8 = 0x07;
const ESC: u8 = 0x1b;

/// Scan raw PTY output for an attention signal: a standalone BEL outside any
/// OSC sequence, or an OSC 9 (excluding iTerm's `ESC ] 9 ; 4 ;` progress-bar
/// frames), OSC 99, or OSC 777 sequence. Must run on the raw bytes before
/// stripping removes the very sequences being detected.
pub fn has_attention_signal(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == ESC && bytes.get(i + 1) == Some(&b']') {
            let (is_attention, next) = scan_osc(bytes, i + 2);
            if is_attention {
                return true;
            }
            i = next;
            continue;
        }
        if bytes[i] == BEL {
            return true;
        }
        i += 1;
    }
    false
}

/// Scan one OSC body starting right after `ESC ]`, returning whether it is
/// an attention-worthy OSC and the index just past the sequence terminator.
fn scan_osc(bytes: &[u8], start: usize) -> (bool, usize) {
    let mut content_end = start;
    while content_end < bytes.len() {
        match bytes[content_end] {
            BEL => break,
            ESC if bytes.get(content_end + 1) == Some(&b'\\') => break,
            _ => content_end += 1,
        }
    }

    let end = match bytes.get(content_end) {
        Some(&BEL) => content_end + 1,
        Some(&ESC) => content_end + 2,
        _ => content_end,
    };

    let body = &bytes[start..content_end.min(bytes.len())];
    let is_progress_bar = body.starts_with(b"9;4;");
    let is_attention = !is_progress_bar
        && (body.starts_with(b"9;") || body.starts_with(b"99;") || body.starts_with(b"777;")
            || body == b"9"
            || body == b"99"
            || body == b"777");
    (is_attention, end)
}

/// Strip CSI/OSC/escape sequences and bare carriage returns, leaving plain
/// text. Idempotent: stripping already-clean text is a no-op.
pub fn strip_control_sequences(bytes: &[u8]) -> String {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\r' {
            i += 1;
            continue;
        }
        if b != ESC {
            out.push(b);
            i += 1;
            continue;
        }

        match bytes.get(i + 1) {
            Some(b'[') => {
                // CSI: ESC [ ... <final byte in 0x40..=0x7e>
                let mut j = i + 2;
                while j < bytes.len() && !(0x40..=0x7e).contains(&bytes[j]) {
                    j += 1;
                }
                i = (j + 1).min(bytes.len());
            }
            Some(b']') => {
                // OSC: ESC ] ... terminated by BEL or ST (ESC \).
                let (_, end) = scan_osc(bytes, i + 2);
                i = end;
            }
            Some(&c) if matches!(c, b'(' | b')' | b'#' | b'%') => {
                // Two-byte escapes: character-set designators and friends.
                i += 3.min(bytes.len() - i);
            }
            Some(_) => {
                // Lone single-letter escape.
                i += 2;
            }
            None => {
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
#[path = "ansi_tests.rs"]
mod tests;
