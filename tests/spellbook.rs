// Spellbook invariant tests.
// These tests are native-friendly and avoid wasm/browser APIs.

use std::collections::HashSet;

use spellweave::{Orb, SPELLBOOK, find_by_combo, spell_named};

fn combo_key(combo: &[Orb; 3]) -> [u8; 3] {
    let mut counts = [0u8; 3];
    for orb in combo {
        let idx = match orb {
            Orb::Quas => 0,
            Orb::Wex => 1,
            Orb::Exort => 2,
        };
        counts[idx] += 1;
    }
    counts
}

#[test]
fn spellbook_has_ten_distinct_entries() {
    assert_eq!(SPELLBOOK.len(), 10);
    let mut names = HashSet::new();
    let mut sigils = HashSet::new();
    let mut combos = HashSet::new();
    for spell in SPELLBOOK.iter() {
        assert!(names.insert(spell.name), "duplicate name '{}'", spell.name);
        assert!(
            sigils.insert(spell.sigil),
            "duplicate sigil '{}' for '{}'",
            spell.sigil,
            spell.name
        );
        assert!(
            combos.insert(combo_key(&spell.combo)),
            "duplicate combination for '{}'",
            spell.name
        );
    }
}

#[test]
fn spellbook_covers_every_orb_multiset() {
    // 10 unordered multisets of 3 orbs from 3 kinds; the table must cover all,
    // so every full triple the player can assemble resolves to a spell.
    let combos: HashSet<[u8; 3]> = SPELLBOOK.iter().map(|s| combo_key(&s.combo)).collect();
    assert_eq!(combos.len(), 10);
    for &a in Orb::ALL.iter() {
        for &b in Orb::ALL.iter() {
            for &c in Orb::ALL.iter() {
                let spell = find_by_combo([a, b, c]);
                assert!(spell.is_some(), "triple {a:?}{b:?}{c:?} has no spell");
            }
        }
    }
}

#[test]
fn find_by_combo_agrees_with_table_rows() {
    for spell in SPELLBOOK.iter() {
        let found = find_by_combo(spell.combo).expect("own combo resolves");
        assert_eq!(found.name, spell.name);
        // Reversed ordering lands on the same entry.
        let reversed = [spell.combo[2], spell.combo[1], spell.combo[0]];
        assert_eq!(find_by_combo(reversed).expect("reversed").name, spell.name);
    }
}

#[test]
fn spell_fields_are_well_formed() {
    for spell in SPELLBOOK.iter() {
        assert!(!spell.name.is_empty());
        assert!(!spell.description.is_empty());
        assert!(!spell.sigil.is_empty());
        assert!(
            spell.color.starts_with('#') && spell.color.len() == 7,
            "color '{}' for '{}' is not #rrggbb",
            spell.color,
            spell.name
        );
        let hint = spell.combo_hint();
        assert_eq!(hint.matches(" + ").count(), 2, "hint '{hint}' malformed");
        for letter in hint.split(" + ") {
            assert!(matches!(letter, "Q" | "W" | "E"), "bad hint letter '{letter}'");
        }
    }
}

#[test]
fn spell_named_round_trips_every_entry() {
    for spell in SPELLBOOK.iter() {
        let found = spell_named(spell.name).expect("name lookup");
        assert_eq!(found.combo, spell.combo);
    }
    assert!(spell_named("Tornado").is_some());
    assert!(spell_named("tornado").is_none(), "lookup is case-sensitive");
    assert!(spell_named("Black Hole").is_none());
}
