//! Spellbook: the fixed combination table.
//! Ten spells, each an unordered triple of orbs. Matching is order-independent
//! (per-orb counts), so any ordering of a valid triple invokes the same spell.

/// One of the three orb inputs, keyed Q/W/E.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Orb {
    Quas,
    Wex,
    Exort,
}

impl Orb {
    pub const ALL: [Orb; 3] = [Orb::Quas, Orb::Wex, Orb::Exort];

    pub fn letter(self) -> char {
        match self {
            Orb::Quas => 'Q',
            Orb::Wex => 'W',
            Orb::Exort => 'E',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Orb::Quas => "quas",
            Orb::Wex => "wex",
            Orb::Exort => "exort",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Orb::Quas => "#4a9eff",
            Orb::Wex => "#a855f7",
            Orb::Exort => "#ef4444",
        }
    }

    /// Map a lowercased key name ("q" / "w" / "e") to an orb.
    pub fn from_key(key: &str) -> Option<Orb> {
        match key {
            "q" => Some(Orb::Quas),
            "w" => Some(Orb::Wex),
            "e" => Some(Orb::Exort),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Orb::Quas => 0,
            Orb::Wex => 1,
            Orb::Exort => 2,
        }
    }
}

/// A named outcome of an orb triple. `sigil` is the glyph drawn on the canvas
/// where the challenge panel hides the name (recall modes) and in the slot
/// squares; it stands in for per-spell artwork.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Spell {
    pub name: &'static str,
    pub combo: [Orb; 3],
    pub color: &'static str,
    pub sigil: &'static str,
    pub description: &'static str,
}

impl Spell {
    /// "Q + Q + E" style hint string for the reference grid and classic mode.
    pub fn combo_hint(&self) -> String {
        let letters: Vec<String> = self.combo.iter().map(|o| o.letter().to_string()).collect();
        letters.join(" + ")
    }
}

use Orb::{Exort, Quas, Wex};

pub static SPELLBOOK: [Spell; 10] = [
    Spell {
        name: "Cold Snap",
        combo: [Quas, Quas, Quas],
        color: "#4a9eff",
        sigil: "❄",
        description: "Freezes enemy in place",
    },
    Spell {
        name: "Ghost Walk",
        combo: [Quas, Quas, Wex],
        color: "#7c3aed",
        sigil: "☾",
        description: "Become invisible and slow",
    },
    Spell {
        name: "Ice Wall",
        combo: [Quas, Quas, Exort],
        color: "#06b6d4",
        sigil: "▣",
        description: "Creates wall of ice",
    },
    Spell {
        name: "EMP",
        combo: [Wex, Wex, Wex],
        color: "#a855f7",
        sigil: "⚡",
        description: "Drains mana in area",
    },
    Spell {
        name: "Tornado",
        combo: [Wex, Wex, Quas],
        color: "#8b5cf6",
        sigil: "❋",
        description: "Lifts enemies into air",
    },
    Spell {
        name: "Alacrity",
        combo: [Wex, Wex, Exort],
        color: "#f59e0b",
        sigil: "⇶",
        description: "Increases attack speed",
    },
    Spell {
        name: "Sun Strike",
        combo: [Exort, Exort, Exort],
        color: "#ef4444",
        sigil: "☀",
        description: "Global fire beam",
    },
    Spell {
        name: "Forge Spirit",
        combo: [Exort, Exort, Quas],
        color: "#f97316",
        sigil: "⚒",
        description: "Summons fire spirit",
    },
    Spell {
        name: "Chaos Meteor",
        combo: [Exort, Exort, Wex],
        color: "#dc2626",
        sigil: "☄",
        description: "Summons burning meteor",
    },
    Spell {
        name: "Deafening Blast",
        combo: [Quas, Wex, Exort],
        color: "#fbbf24",
        sigil: "◉",
        description: "Pushes and disarms",
    },
];

fn orb_counts(combo: &[Orb; 3]) -> [u8; 3] {
    let mut counts = [0u8; 3];
    for orb in combo {
        counts[orb.index()] += 1;
    }
    counts
}

/// Order-independent lookup: the multiset of `orbs` against each table entry.
pub fn find_by_combo(orbs: [Orb; 3]) -> Option<&'static Spell> {
    let want = orb_counts(&orbs);
    SPELLBOOK.iter().find(|s| orb_counts(&s.combo) == want)
}

pub fn spell_named(name: &str) -> Option<&'static Spell> {
    SPELLBOOK.iter().find(|s| s.name == name)
}
