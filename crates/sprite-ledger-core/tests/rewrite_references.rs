use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sprite_ledger_core::prelude::*;
use sprite_ledger_core::rewrite::new_tag;

fn mapping(pairs: &[(u64, u64)]) -> MappingStore {
    pairs
        .iter()
        .map(|&(s, e)| (LegacyKey(s), GlobalKey(e)))
        .collect()
}

#[test]
fn rewrites_all_three_forms() {
    let m = mapping(&[(1, 10), (5, 14)]);
    let out = Rewriter::new(&m).rewrite("see :emoji:s1: and ![](/emoji/s5.png)");
    assert_eq!(out.text, "see :emoji:e10: and :emoji:e14:");
    assert_eq!(out.changes.len(), 2);
    assert_eq!(out.changes[0].form, ReferenceForm::Tag);
    assert_eq!(out.changes[1].form, ReferenceForm::AbsolutePath);

    let out = Rewriter::new(&m).rewrite_text("![](emoji/s1.png)x![](emoji/s5.png)");
    assert_eq!(out, ":emoji:e10:x:emoji:e14:");
}

#[test]
fn unmapped_references_are_left_alone() {
    let m = mapping(&[(1, 10)]);
    let text = "keep :emoji:s2: and ![](/emoji/s3.png) and ![](emoji/s4.png)";
    let out = Rewriter::new(&m).rewrite(text);
    assert_eq!(out.text, text);
    assert!(!out.changed());
}

#[test]
fn leading_zero_is_not_a_key() {
    let m = mapping(&[(1, 10)]);
    let text = ":emoji:s01: ![](/emoji/s001.png)";
    assert_eq!(Rewriter::new(&m).rewrite_text(text), text);
}

#[test]
fn near_misses_do_not_match() {
    let m = mapping(&[(1, 10)]);
    for text in [
        ":emoji:s1",
        "emoji:s1:",
        ":emoji:S1:",
        "![](/emoji/s1.jpg)",
        "![alt](/emoji/s1.png)",
        "![](/img/s1.png)",
    ] {
        assert_eq!(Rewriter::new(&m).rewrite_text(text), text);
    }
}

#[test]
fn rewrite_is_idempotent() {
    let m = mapping(&[(1, 10), (5, 14), (12, 0)]);
    let r = Rewriter::new(&m);
    for text in [
        "see :emoji:s1: and ![](/emoji/s5.png)",
        ":emoji:s12::emoji:s1:",
        ":emoji:e10: already packed",
        // replacing the path form exposes a new tag-shaped span
        ":emoji:s1![](emoji/s5.png)",
        "",
    ] {
        let once = r.rewrite_text(text);
        let twice = r.rewrite_text(&once);
        assert_eq!(once, twice, "input {text:?}");
    }
}

fn random_fragment(rng: &mut StdRng) -> String {
    // ids 1..=6 are mapped below, 7..=9 are not
    let id = rng.gen_range(1..10u64);
    match rng.gen_range(0..10) {
        0 => format!(":emoji:s{id}:"),
        1 => format!("![](/emoji/s{id}.png)"),
        2 => format!("![](emoji/s{id}.png)"),
        3 => format!(":emoji:e{id}:"),
        4 => format!(":emoji:s0{id}:"),
        5 => ":emoji:s".to_string(),
        6 => format!("![](/emoji/s{id}.jpg)"),
        7 => format!("{id}:"),
        8 => "emoji".to_string(),
        _ => " words ".to_string(),
    }
}

#[test]
fn rewrite_is_idempotent_on_random_text() {
    let m = mapping(&[(1, 10), (2, 11), (3, 0), (4, 4), (5, 14), (6, 2)]);
    let r = Rewriter::new(&m);
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..300 {
        let parts = rng.gen_range(0..12);
        let text: String = (0..parts).map(|_| random_fragment(&mut rng)).collect();
        let once = r.rewrite_text(&text);
        let twice = r.rewrite(&once);
        assert!(!twice.changed(), "input {text:?} changed again: {:?}", twice.text);
        assert_eq!(once, twice.text, "input {text:?}");
    }
}

#[test]
fn replacement_exposing_a_new_span_is_converted() {
    let m = mapping(&[(1, 10), (5, 14)]);
    // `![](emoji/s5.png)` becomes `:emoji:e14:`, whose leading colon closes `:emoji:s1` into a tag
    let out = Rewriter::new(&m).rewrite(":emoji:s1![](emoji/s5.png)");
    assert_eq!(out.text, ":emoji:e10:emoji:e14:");
    assert_eq!(out.changes.len(), 2);
    assert_eq!(out.changes[0].form, ReferenceForm::RelativePath);
    assert_eq!(out.changes[1].form, ReferenceForm::Tag);
}

#[test]
fn packed_keys_are_never_rewritten_back() {
    let m = mapping(&[(10, 1)]);
    let text = ":emoji:e10:";
    assert_eq!(Rewriter::new(&m).rewrite_text(text), text);
    assert_eq!(new_tag(GlobalKey(3)), ":emoji:e3:");
}

#[test]
fn legacy_texts_per_form() {
    let k = LegacyKey(9);
    assert_eq!(ReferenceForm::Tag.legacy_text(k), ":emoji:s9:");
    assert_eq!(ReferenceForm::AbsolutePath.legacy_text(k), "![](/emoji/s9.png)");
    assert_eq!(ReferenceForm::RelativePath.legacy_text(k), "![](emoji/s9.png)");
    assert!(ReferenceForm::Tag.is_reversible());
    assert!(!ReferenceForm::AbsolutePath.is_reversible());
    assert!(!ReferenceForm::RelativePath.is_reversible());
}
