//! Spellweave core crate.
//!
//! Orb-combination reflex game: three orbs (quas / wex / exort, keyed Q/W/E)
//! are combined and invoked against a fixed ten-spell combination table,
//! optionally under time pressure. `start_game()` wires the whole browser
//! surface; the spellbook table and session state machine are plain Rust and
//! run under native `cargo test`.

use wasm_bindgen::prelude::*;

mod game;

pub use game::spellbook::{Orb, SPELLBOOK, Spell, find_by_combo, spell_named};
pub use game::{ChallengeOutcome, GameMode, InvokeOutcome, Session};

// Optional small allocator for size (feature gated)
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn wasm_start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Unified entrypoint: builds the menu, overlays, and canvas scene, then
/// hands control to the frame loop. Call once from JS after module init.
#[wasm_bindgen]
pub fn start_game() -> Result<(), JsValue> {
    game::mount()
}
