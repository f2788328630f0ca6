// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{has_attention_signal, strip_control_sequences};

#[yare::parameterized(
    progress_bar_osc_9_4 = { b"\x1b]9;4;1;50\x07building..." as &[u8], false },
    non_progress_osc_9 = { b"\x1b]9;task complete\x07", true },
    osc_99 = { b"\x1b]99;waiting for input\x07", true },
    osc_777 = { b"\x1b]777;notify\x07", true },
    standalone_bel = { b"plain output\x07more output", true },
    clean_text = { b"hello world\n", false },
    osc_9_terminated_by_st = { b"\x1b]9;done\x1b\\", true },
    bel_inside_progress_bar_osc_is_not_a_standalone_bel = { b"\x1b]9;4;1;50\x07", false },
    multiple_progress_bars_then_a_bel_is_attention = { b"\x1b]9;4;1;10\x07\x1b]9;4;1;20\x07\x07", true },
)]
fn attention_detection(bytes: &[u8], expected: bool) {
    assert_eq!(has_attention_signal(bytes), expected);
}

#[test]
fn strip_removes_csi_sequences() {
    let bytes = b"\x1b[31mred\x1b[0m text";
    assert_eq!(strip_control_sequences(bytes), "red text");
}

#[test]
fn strip_removes_osc_sequences() {
    let bytes = b"\x1b]0;window title\x07visible";
    assert_eq!(strip_control_sequences(bytes), "visible");
}

#[test]
fn strip_removes_bare_carriage_returns() {
    let bytes = b"line one\rline two\n";
    assert_eq!(strip_control_sequences(bytes), "line oneline two\n");
}

#[test]
fn strip_is_idempotent_on_control_free_text() {
    let text = "no escapes here, just text\n";
    assert_eq!(strip_control_sequences(text.as_bytes()), text);
}

#[test]
fn strip_is_idempotent_when_applied_twice() {
    let bytes = b"\x1b[1mbold\x1b[0m plain";
    let once = strip_control_sequences(bytes);
    let twice = strip_control_sequences(once.as_bytes());
    assert_eq!(once, twice);
}

mod props {
    use super::strip_control_sequences;
    use proptest::prelude::*;

    // Round-trip law: strip(strip(x)) == strip(x) for arbitrary
    // bytes, and strip(x) == x when x is already control-free.
    proptest! {
        #[test]
        fn strip_is_idempotent_on_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..200)) {
            let once = strip_control_sequences(&bytes);
            let twice = strip_control_sequences(once.as_bytes());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn strip_is_a_no_op_on_control_free_ascii(text in "[ -~\n]{0,200}") {
            prop_assert_eq!(strip_control_sequences(text.as_bytes()), text);
        }
    }
}
