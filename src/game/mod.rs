//! Orb-combination gameplay: session state machine, canvas scene, and input.
//!
//! The pure layer (`GameMode`, `Session`, the outcome enums) never touches the
//! browser and runs under native `cargo test`. The wasm layer owns a single
//! fixed canvas for the scene plus small DOM overlays for score / streak /
//! clock, a mode menu, and a spell reference grid, all driven by one
//! `requestAnimationFrame` loop with whole-second tick detection.

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, Document, Element, HtmlCanvasElement, window};

pub mod spellbook;

use spellbook::{Orb, SPELLBOOK, Spell, find_by_combo};

// --- Tunables ----------------------------------------------------------------

const SCORE_PER_HIT: i64 = 100;
const TIMED_START_SECS: i32 = 60;
const TIMED_BONUS_SECS: i32 = 5;
const CHALLENGE_DELAY_MS: f64 = 500.0;
const FEEDBACK_LIFETIME_MS: f64 = 1000.0;
const PARTICLE_LIFETIME_MS: f64 = 900.0;

// --- Modes -------------------------------------------------------------------

/// The four play modes. No session at all (the menu) is represented by the
/// absence of a `Session`, not by a fifth variant.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GameMode {
    Practice,
    Classic,
    Timed,
    Combo,
}

impl GameMode {
    pub fn from_name(name: &str) -> Option<GameMode> {
        match name {
            "practice" => Some(GameMode::Practice),
            "classic" => Some(GameMode::Classic),
            "timed" => Some(GameMode::Timed),
            "combo" => Some(GameMode::Combo),
            _ => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            GameMode::Practice => "Practice",
            GameMode::Classic => "Classic",
            GameMode::Timed => "Time Attack",
            GameMode::Combo => "Combo Rush",
        }
    }

    /// Practice is the only mode without a target to invoke.
    pub fn has_challenge(self) -> bool {
        !matches!(self, GameMode::Practice)
    }

    /// Classic spells out the target's combo; the recall modes show only the sigil.
    pub fn reveals_combo(self) -> bool {
        matches!(self, GameMode::Classic)
    }

    pub fn countdown_secs(self) -> Option<i32> {
        match self {
            GameMode::Timed => Some(TIMED_START_SECS),
            _ => None,
        }
    }
}

// --- Session (pure state machine) --------------------------------------------

/// Result of judging an invoked spell against the current challenge target.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChallengeOutcome {
    Hit { gained: i64, bonus_secs: i32 },
    Miss,
}

/// Result of an invoke attempt, surfaced to the UI layer for feedback.
#[derive(Debug)]
pub enum InvokeOutcome {
    /// Fewer than three orbs pending ("Need 3 orbs!").
    NotEnoughOrbs,
    /// No table entry matches the triple ("Invalid combination!"). With the
    /// full ten-spell table every triple matches; the variant guards table edits.
    UnknownCombo,
    Invoked {
        spell: &'static Spell,
        challenge: Option<ChallengeOutcome>,
    },
}

/// The single mutable game record: pending orbs, slotted spells, challenge
/// target, score, streak, and remaining time. Reset wholesale on game start,
/// mutated in place by the handlers, no concurrent writers.
pub struct Session {
    pub mode: GameMode,
    /// Pending orb selections, oldest first, at most three.
    pub orbs: Vec<Orb>,
    /// The two most recently invoked spells (cast with D / F).
    pub slots: [Option<&'static Spell>; 2],
    pub challenge: Option<&'static Spell>,
    pub score: i64,
    pub streak: i64,
    pub best_streak: i64,
    /// Remaining seconds; meaningful only in Timed.
    pub time_left: i32,
    pub game_over: bool,
}

impl Session {
    pub fn new(mode: GameMode) -> Self {
        Session {
            mode,
            orbs: Vec::new(),
            slots: [None, None],
            challenge: None,
            score: 0,
            streak: 0,
            best_streak: 0,
            time_left: mode.countdown_secs().unwrap_or(0),
            game_over: false,
        }
    }

    /// Append an orb; when three are already pending the oldest is dropped.
    pub fn push_orb(&mut self, orb: Orb) {
        if self.orbs.len() >= 3 {
            self.orbs.remove(0);
        }
        self.orbs.push(orb);
    }

    pub fn assign_challenge(&mut self, spell: &'static Spell) {
        self.challenge = Some(spell);
    }

    /// Attempt to invoke the pending triple. The pending orbs are kept either
    /// way, so the same spell can be re-invoked. A successful match is slotted
    /// before the challenge comparison; a wrong-but-valid spell therefore
    /// still lands in a slot while resetting the streak.
    pub fn invoke(&mut self) -> InvokeOutcome {
        if self.orbs.len() < 3 {
            return InvokeOutcome::NotEnoughOrbs;
        }
        let triple = [self.orbs[0], self.orbs[1], self.orbs[2]];
        let Some(spell) = find_by_combo(triple) else {
            return InvokeOutcome::UnknownCombo;
        };
        self.slot_spell(spell);

        let challenge = if self.mode.has_challenge() {
            match self.challenge {
                Some(target) if target.name == spell.name => {
                    self.score += SCORE_PER_HIT;
                    self.streak += 1;
                    if self.streak > self.best_streak {
                        self.best_streak = self.streak;
                    }
                    let bonus_secs = if self.mode == GameMode::Timed {
                        self.time_left += TIMED_BONUS_SECS;
                        TIMED_BONUS_SECS
                    } else {
                        0
                    };
                    // Cleared here; the caller schedules the next target.
                    self.challenge = None;
                    Some(ChallengeOutcome::Hit {
                        gained: SCORE_PER_HIT,
                        bonus_secs,
                    })
                }
                Some(_) => {
                    self.streak = 0;
                    Some(ChallengeOutcome::Miss)
                }
                // Between challenges (regeneration delay): nothing to judge.
                None => None,
            }
        } else {
            None
        };

        InvokeOutcome::Invoked { spell, challenge }
    }

    /// First empty slot, else shift: slot 0 takes slot 1, slot 1 takes the new spell.
    fn slot_spell(&mut self, spell: &'static Spell) {
        if self.slots[0].is_none() {
            self.slots[0] = Some(spell);
        } else if self.slots[1].is_none() {
            self.slots[1] = Some(spell);
        } else {
            self.slots[0] = self.slots[1];
            self.slots[1] = Some(spell);
        }
    }

    /// Spell in the given slot, if any. Casting never consumes the slot.
    pub fn cast(&self, slot: usize) -> Option<&'static Spell> {
        self.slots.get(slot).copied().flatten()
    }

    /// One whole-second tick. Returns true when the timed clock just expired.
    pub fn tick_second(&mut self) -> bool {
        if self.mode == GameMode::Timed && !self.game_over {
            self.time_left -= 1;
            if self.time_left <= 0 {
                self.time_left = 0;
                self.game_over = true;
                return true;
            }
        }
        false
    }
}

fn format_clock(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

// --- Clock -------------------------------------------------------------------

/// Whole-second tick detection against performance.now().
struct GameClock {
    start_ms: f64,
    last_second: i64, // index of last processed whole second
}

impl GameClock {
    fn new(now: f64) -> Self {
        Self {
            start_ms: now,
            last_second: 0,
        }
    }
    fn elapsed_secs(&self, now: f64) -> i64 {
        ((now - self.start_ms) / 1000.0).floor() as i64
    }
}

// --- Wasm-side runtime state --------------------------------------------------

// Transient centered message ("Need 3 orbs!", "Cast: ...").
struct Feedback {
    text: String,
    color: String,
    start_ms: f64,
}

// Canvas-space particle burst fragment.
struct Particle {
    x: f64,
    y: f64,
    dx: f64,
    dy: f64,
    color: String,
    start_ms: f64,
}

struct GameState {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    session: Session,
    clock: GameClock,
    /// When set, a new challenge is assigned once the frame clock passes it.
    next_challenge_at: Option<f64>,
    /// Elapsed seconds frozen at the moment the timed clock expired.
    final_elapsed: Option<i64>,
    feedback: Option<Feedback>,
    particles: Vec<Particle>,
}

thread_local! {
    static STATE: std::cell::RefCell<Option<GameState>> = std::cell::RefCell::new(None);
}

// --- Canvas layout ------------------------------------------------------------

const CANVAS_W: f64 = 720.0;
const CANVAS_H: f64 = 540.0;

const SOCKET_Y: f64 = 208.0;
const SOCKET_SPACING: f64 = 92.0;
const SOCKET_R: f64 = 27.0;

const ORB_BTN_Y: f64 = 318.0;
const ORB_BTN_SPACING: f64 = 112.0;
const ORB_BTN_R: f64 = 34.0;

const INVOKE_W: f64 = 220.0;
const INVOKE_H: f64 = 46.0;
const INVOKE_Y: f64 = 390.0;

const SLOT_SIZE: f64 = 76.0;
const SLOT_Y: f64 = 452.0;
const SLOT_OFFSET_X: f64 = 132.0;

fn socket_center(i: usize) -> (f64, f64) {
    (CANVAS_W / 2.0 + (i as f64 - 1.0) * SOCKET_SPACING, SOCKET_Y)
}

fn orb_button_center(i: usize) -> (f64, f64) {
    (CANVAS_W / 2.0 + (i as f64 - 1.0) * ORB_BTN_SPACING, ORB_BTN_Y)
}

fn invoke_rect() -> (f64, f64, f64, f64) {
    (CANVAS_W / 2.0 - INVOKE_W / 2.0, INVOKE_Y, INVOKE_W, INVOKE_H)
}

fn slot_rect(i: usize) -> (f64, f64, f64, f64) {
    let cx = if i == 0 {
        CANVAS_W / 2.0 - SLOT_OFFSET_X
    } else {
        CANVAS_W / 2.0 + SLOT_OFFSET_X
    };
    (cx - SLOT_SIZE / 2.0, SLOT_Y, SLOT_SIZE, SLOT_SIZE)
}

// --- DOM styles ---------------------------------------------------------------

const CANVAS_STYLE: &str = "position:fixed; left:50%; top:46%; transform:translate(-50%,-50%); box-shadow:0 0 32px 0 rgba(0,0,0,0.28); border-radius:18px; border:2px solid #222; background:#101018; z-index:20;";
const MENU_STYLE: &str = "position:fixed; left:50%; top:44%; transform:translate(-50%,-50%); display:flex; flex-direction:column; gap:14px; align-items:center; z-index:50; font-family:'Fira Code', monospace; color:#e8e8f0;";
const MENU_BTN_STYLE: &str = "min-width:240px; padding:10px 18px; font-family:inherit; font-size:16px; color:#ffd166; background:rgba(0,0,0,0.42); border:1px solid #444; border-radius:8px; cursor:pointer; text-align:center;";
const REFERENCE_STYLE: &str = "position:fixed; left:50%; bottom:12px; transform:translateX(-50%); display:flex; flex-wrap:wrap; gap:8px; justify-content:center; max-width:900px; font-family:'Fira Code', monospace; font-size:12px; color:#cfcfe8; z-index:30;";
const REFERENCE_CARD_STYLE: &str = "min-width:78px; padding:5px 7px; background:rgba(0,0,0,0.42); border:1px solid #333; border-radius:6px; text-align:center;";

fn hud_style(left_px: i32) -> String {
    format!(
        "position:fixed; top:10px; left:{left_px}px; font-family:'Fira Code', monospace; font-size:15px; padding:4px 8px; background:rgba(0,0,0,0.42); border:1px solid #333; border-radius:6px; color:#ffd166; z-index:45; letter-spacing:0.5px;"
    )
}

fn apply_style(el: &Element, base: &str, visible: bool) {
    if visible {
        el.set_attribute("style", base).ok();
    } else {
        el.set_attribute("style", &format!("{base} display:none;")).ok();
    }
}

// --- Mount / DOM setup --------------------------------------------------------

/// Build the menu, overlays, reference grid, and canvas, register listeners,
/// and start the frame loop. Safe to call into an empty `<body>`.
pub fn mount() -> Result<(), JsValue> {
    let win = window().ok_or_else(|| JsValue::from_str("no window"))?;
    let doc = win
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;

    // Create / reuse the scene canvas.
    let canvas: HtmlCanvasElement = if let Some(el) = doc.get_element_by_id("sw-canvas") {
        el.dyn_into()?
    } else {
        let c: HtmlCanvasElement = doc.create_element("canvas")?.dyn_into()?;
        c.set_id("sw-canvas");
        c.set_width(CANVAS_W as u32);
        c.set_height(CANVAS_H as u32);
        if let Some(body) = doc.body() {
            body.append_child(&c)?;
        }
        c
    };
    let ctx: CanvasRenderingContext2d = canvas.get_context("2d")?.unwrap().dyn_into()?;
    ctx.set_text_align("center");

    ensure_overlay(&doc, "sw-score", "Score: 0", &hud_style(12))?;
    ensure_overlay(&doc, "sw-streak", "Streak: 0", &hud_style(150))?;
    ensure_overlay(&doc, "sw-clock", "00:00", &hud_style(300))?;
    build_menu(&doc)?;
    build_reference_grid(&doc)?;
    show_game_surface(&doc, false);

    // Keyboard listener (q/w/e orbs, r invoke, d/f cast, Escape menu, Enter replay).
    {
        let closure = Closure::wrap(Box::new(move |evt: web_sys::KeyboardEvent| {
            on_key(&evt.key());
        }) as Box<dyn FnMut(_)>);
        doc.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    // Canvas clicks hit-test orb buttons, the invoke band, and the spell slots.
    // Offset coordinates are canvas-local, so no DomRect dependency is needed.
    {
        let closure = Closure::wrap(Box::new(move |evt: web_sys::MouseEvent| {
            on_canvas_click(evt.offset_x() as f64, evt.offset_y() as f64);
        }) as Box<dyn FnMut(_)>);
        canvas.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    start_frame_loop();
    Ok(())
}

fn ensure_overlay(doc: &Document, id: &str, text: &str, style: &str) -> Result<(), JsValue> {
    if doc.get_element_by_id(id).is_none() {
        if let Some(body) = doc.body() {
            let div = doc.create_element("div")?;
            div.set_id(id);
            div.set_text_content(Some(text));
            div.set_attribute("style", style).ok();
            body.append_child(&div)?;
        }
    }
    Ok(())
}

fn build_menu(doc: &Document) -> Result<(), JsValue> {
    if doc.get_element_by_id("sw-menu").is_some() {
        return Ok(());
    }
    let menu = doc.create_element("div")?;
    menu.set_id("sw-menu");
    menu.set_attribute("style", MENU_STYLE).ok();

    let title = doc.create_element("div")?;
    title.set_text_content(Some("Spellweave"));
    title
        .set_attribute("style", "font-size:34px; color:#ffd166; letter-spacing:2px; margin-bottom:8px;")
        .ok();
    menu.append_child(&title)?;

    let blurbs: [(GameMode, &str); 4] = [
        (GameMode::Practice, "free invoking, no pressure"),
        (GameMode::Classic, "targets with combo hints"),
        (GameMode::Timed, "60 seconds, +5 per hit"),
        (GameMode::Combo, "chase the longest streak"),
    ];
    for (mode, blurb) in blurbs {
        let btn = doc.create_element("button")?;
        btn.set_inner_html(&format!(
            "{}<br><span style='font-size:12px;color:#8a8aa8;'>{}</span>",
            mode.title(),
            blurb
        ));
        btn.set_attribute("style", MENU_BTN_STYLE).ok();
        let closure = Closure::wrap(Box::new(move |_evt: web_sys::MouseEvent| {
            begin_session(mode);
        }) as Box<dyn FnMut(_)>);
        btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())?;
        closure.forget();
        menu.append_child(&btn)?;
    }

    if let Some(body) = doc.body() {
        body.append_child(&menu)?;
    }
    Ok(())
}

// Spell reference grid: sigil, name, and combo for every table entry, so the
// recall modes' sigils can actually be learned.
fn build_reference_grid(doc: &Document) -> Result<(), JsValue> {
    if doc.get_element_by_id("sw-reference").is_some() {
        return Ok(());
    }
    let grid = doc.create_element("div")?;
    grid.set_id("sw-reference");
    grid.set_attribute("style", REFERENCE_STYLE).ok();
    for spell in SPELLBOOK.iter() {
        let card = doc.create_element("div")?;
        card.set_attribute("style", REFERENCE_CARD_STYLE).ok();
        card.set_inner_html(&format!(
            "<div style='font-size:20px;color:{};'>{}</div><div>{}</div><div style='color:#8a8aa8;'>{}</div>",
            spell.color,
            spell.sigil,
            spell.name,
            spell.combo_hint()
        ));
        grid.append_child(&card)?;
    }
    if let Some(body) = doc.body() {
        body.append_child(&grid)?;
    }
    Ok(())
}

fn show_game_surface(doc: &Document, active: bool) {
    if let Some(el) = doc.get_element_by_id("sw-canvas") {
        apply_style(&el, CANVAS_STYLE, active);
    }
    for (id, left) in [("sw-score", 12), ("sw-streak", 150), ("sw-clock", 300)] {
        if let Some(el) = doc.get_element_by_id(id) {
            apply_style(&el, &hud_style(left), active);
        }
    }
    if let Some(el) = doc.get_element_by_id("sw-reference") {
        apply_style(&el, REFERENCE_STYLE, active);
    }
    if let Some(el) = doc.get_element_by_id("sw-menu") {
        apply_style(&el, MENU_STYLE, !active);
    }
}

// --- Session lifecycle --------------------------------------------------------

fn begin_session(mode: GameMode) {
    let Some(win) = window() else { return };
    let Some(doc) = win.document() else { return };
    let Some((canvas, ctx)) = lookup_canvas(&doc) else {
        return;
    };

    let now = now_ms();
    let mut session = Session::new(mode);
    if mode.has_challenge() {
        session.assign_challenge(&SPELLBOOK[rand_index(SPELLBOOK.len())]);
    }
    let state = GameState {
        canvas,
        ctx,
        session,
        clock: GameClock::new(now),
        next_challenge_at: None,
        final_elapsed: None,
        feedback: None,
        particles: Vec::new(),
    };
    STATE.with(|cell| cell.replace(Some(state)));
    show_game_surface(&doc, true);
}

fn end_to_menu() {
    STATE.with(|cell| cell.replace(None));
    if let Some(doc) = window().and_then(|w| w.document()) {
        show_game_surface(&doc, false);
    }
}

fn lookup_canvas(doc: &Document) -> Option<(HtmlCanvasElement, CanvasRenderingContext2d)> {
    let canvas: HtmlCanvasElement = doc.get_element_by_id("sw-canvas")?.dyn_into().ok()?;
    let ctx: CanvasRenderingContext2d = canvas.get_context("2d").ok()??.dyn_into().ok()?;
    Some((canvas, ctx))
}

// --- Input handling -----------------------------------------------------------

enum Followup {
    Menu,
    Restart(GameMode),
}

fn on_key(key: &str) {
    let lower = key.to_ascii_lowercase();
    let followup = STATE.with(|cell| {
        let mut borrow = cell.borrow_mut();
        let state = borrow.as_mut()?;
        if state.session.game_over {
            return match lower.as_str() {
                "enter" => Some(Followup::Restart(state.session.mode)),
                "escape" => Some(Followup::Menu),
                _ => None,
            };
        }
        match lower.as_str() {
            "q" | "w" | "e" => {
                if let Some(orb) = Orb::from_key(&lower) {
                    handle_orb(state, orb);
                }
                None
            }
            "r" => {
                handle_invoke(state);
                None
            }
            "d" => {
                handle_cast(state, 0);
                None
            }
            "f" => {
                handle_cast(state, 1);
                None
            }
            "escape" => Some(Followup::Menu),
            _ => None,
        }
    });
    match followup {
        Some(Followup::Restart(mode)) => begin_session(mode),
        Some(Followup::Menu) => end_to_menu(),
        None => {}
    }
}

fn on_canvas_click(x: f64, y: f64) {
    STATE.with(|cell| {
        let mut borrow = cell.borrow_mut();
        let Some(state) = borrow.as_mut() else { return };
        if state.session.game_over {
            return;
        }
        for (i, orb) in Orb::ALL.iter().enumerate() {
            let (cx, cy) = orb_button_center(i);
            if (x - cx).hypot(y - cy) <= ORB_BTN_R {
                handle_orb(state, *orb);
                return;
            }
        }
        let (ix, iy, iw, ih) = invoke_rect();
        if x >= ix && x < ix + iw && y >= iy && y < iy + ih {
            handle_invoke(state);
            return;
        }
        for slot in 0..2 {
            let (sx, sy, sw, sh) = slot_rect(slot);
            if x >= sx && x < sx + sw && y >= sy && y < sy + sh {
                handle_cast(state, slot);
                return;
            }
        }
    });
}

fn handle_orb(state: &mut GameState, orb: Orb) {
    state.session.push_orb(orb);
    let idx = Orb::ALL.iter().position(|&o| o == orb).unwrap_or(0);
    let (bx, by) = orb_button_center(idx);
    spawn_burst(state, bx, by, orb.color(), 8);
    play_sound(orb.name());
}

fn handle_invoke(state: &mut GameState) {
    let now = now_ms();
    match state.session.invoke() {
        InvokeOutcome::NotEnoughOrbs => {
            set_feedback(state, "Need 3 orbs!", "#ef4444", now);
            play_sound("error");
        }
        InvokeOutcome::UnknownCombo => {
            set_feedback(state, "Invalid combination!", "#ef4444", now);
            play_sound("error");
        }
        InvokeOutcome::Invoked { challenge, .. } => {
            play_sound("invoke");
            let (ix, iy, iw, ih) = invoke_rect();
            spawn_burst(state, ix + iw / 2.0, iy + ih / 2.0, "#fbbf24", 15);
            match challenge {
                Some(ChallengeOutcome::Hit { .. }) => {
                    play_sound("success");
                    state.next_challenge_at = Some(now + CHALLENGE_DELAY_MS);
                }
                Some(ChallengeOutcome::Miss) => {
                    set_feedback(state, "Wrong spell!", "#ef4444", now);
                    play_sound("error");
                }
                None => {}
            }
        }
    }
}

fn handle_cast(state: &mut GameState, slot: usize) {
    if let Some(spell) = state.session.cast(slot) {
        let now = now_ms();
        let (sx, sy, sw, sh) = slot_rect(slot);
        spawn_burst(state, sx + sw / 2.0, sy + sh / 2.0, spell.color, 12);
        set_feedback(state, &format!("Cast: {}", spell.name), spell.color, now);
    }
}

fn set_feedback(state: &mut GameState, text: &str, color: &str, now: f64) {
    state.feedback = Some(Feedback {
        text: text.to_string(),
        color: color.to_string(),
        start_ms: now,
    });
}

// --- Effects / sound ----------------------------------------------------------

fn spawn_burst(state: &mut GameState, x: f64, y: f64, color: &str, count: usize) {
    let now = now_ms();
    let spin = (rand_index(628) as f64) / 100.0;
    for i in 0..count {
        let angle = (i as f64 / count as f64) * std::f64::consts::TAU + spin;
        let speed = 42.0 + 13.0 * ((i * 7) % 5) as f64;
        state.particles.push(Particle {
            x,
            y,
            dx: angle.cos() * speed,
            dy: angle.sin() * speed,
            color: color.to_string(),
            // Staggered births so the burst unfolds instead of popping at once.
            start_ms: now + i as f64 * 18.0,
        });
    }
}

/// Play an optional `<audio id="sw-audio-{name}">` element if the host page
/// ships one; absence is silent.
fn play_sound(name: &str) {
    if let Some(doc) = window().and_then(|w| w.document()) {
        if let Some(el) = doc.get_element_by_id(&format!("sw-audio-{name}")) {
            if let Ok(audio) = el.dyn_into::<web_sys::HtmlAudioElement>() {
                audio.set_current_time(0.0);
                audio.set_volume(0.3);
                let _ = audio.play();
            }
        }
    }
}

// --- Frame loop ---------------------------------------------------------------

type FrameCallback = std::rc::Rc<std::cell::RefCell<Option<Closure<dyn FnMut(f64)>>>>;

fn start_frame_loop() {
    let f: FrameCallback = std::rc::Rc::new(std::cell::RefCell::new(None));
    let g = f.clone();
    *g.borrow_mut() = Some(Closure::wrap(Box::new(move |ts: f64| {
        STATE.with(|state_cell| {
            if let Some(state) = state_cell.borrow_mut().as_mut() {
                tick(state, ts);
            }
        });
        if let Some(w) = window() {
            let _ =
                w.request_animation_frame(f.borrow().as_ref().unwrap().as_ref().unchecked_ref());
        }
    }) as Box<dyn FnMut(f64)>));
    if let Some(w) = window() {
        let _ = w.request_animation_frame(g.borrow().as_ref().unwrap().as_ref().unchecked_ref());
    }
}

fn tick(state: &mut GameState, now: f64) {
    // Whole-second detection
    let whole = state.clock.elapsed_secs(now);
    if whole > state.clock.last_second {
        for _ in state.clock.last_second + 1..=whole {
            if state.session.tick_second() {
                state.final_elapsed = Some(whole);
            }
        }
        state.clock.last_second = whole;
    }

    // Due challenge regeneration (scheduled 500 ms after a hit)
    if let Some(due) = state.next_challenge_at {
        if now >= due && !state.session.game_over {
            state
                .session
                .assign_challenge(&SPELLBOOK[rand_index(SPELLBOOK.len())]);
            state.next_challenge_at = None;
        }
    }

    // Expire transient effects
    state
        .particles
        .retain(|p| now - p.start_ms < PARTICLE_LIFETIME_MS);
    if let Some(fb) = &state.feedback {
        if now - fb.start_ms >= FEEDBACK_LIFETIME_MS {
            state.feedback = None;
        }
    }

    render(state, now);
    sync_overlays(state, now);
}

fn sync_overlays(state: &GameState, now: f64) {
    if let Some(doc) = window().and_then(|w| w.document()) {
        if let Some(el) = doc.get_element_by_id("sw-score") {
            el.set_text_content(Some(&format!("Score: {}", state.session.score)));
        }
        if let Some(el) = doc.get_element_by_id("sw-streak") {
            el.set_text_content(Some(&format!("Streak: {}", state.session.streak)));
        }
        if let Some(el) = doc.get_element_by_id("sw-clock") {
            let text = if state.session.mode == GameMode::Timed {
                format_clock(state.session.time_left as i64)
            } else {
                let elapsed = state
                    .final_elapsed
                    .unwrap_or_else(|| state.clock.elapsed_secs(now));
                format_clock(elapsed)
            };
            el.set_text_content(Some(&text));
        }
    }
}

// --- Rendering ----------------------------------------------------------------

fn render(state: &mut GameState, now: f64) {
    let ctx = &state.ctx;
    let w = state.canvas.width() as f64;
    let h = state.canvas.height() as f64;

    // Background with a subtle one-second pulse.
    let phase = ((now - state.clock.start_ms) / 1000.0).fract();
    let pulse = ((phase * std::f64::consts::TAU).sin() * 0.5 + 0.5) * 0.25;
    let bg = (15.0 + pulse * 20.0) as i32;
    ctx.set_fill_style_str(&format!("rgb({},{},{})", bg, bg, bg + 10));
    ctx.fill_rect(0.0, 0.0, w, h);

    render_challenge(state);
    render_sockets(state);
    render_orb_buttons(state);
    render_invoke_band(state);
    render_slots(state);
    render_particles(state, now);
    render_feedback(state, now);

    if state.session.game_over {
        render_game_over(state, now);
    }
}

fn render_challenge(state: &GameState) {
    let ctx = &state.ctx;
    let cx = CANVAS_W / 2.0;
    if !state.session.mode.has_challenge() {
        ctx.set_font("16px 'Fira Code', monospace");
        ctx.set_fill_style_str("#8a8aa8");
        ctx.fill_text("practice: invoke freely", cx, 52.0).ok();
        return;
    }
    let Some(target) = state.session.challenge else {
        // Regeneration gap after a hit.
        return;
    };
    ctx.set_font("15px 'Fira Code', monospace");
    ctx.set_fill_style_str("#8a8aa8");
    ctx.fill_text("Invoke:", cx, 40.0).ok();
    if state.session.mode.reveals_combo() {
        ctx.set_font("30px 'Fira Code', monospace");
        ctx.set_fill_style_str(target.color);
        ctx.fill_text(target.name, cx, 78.0).ok();
        ctx.set_font("18px 'Fira Code', monospace");
        ctx.set_fill_style_str("#e8e8f0");
        ctx.fill_text(&target.combo_hint(), cx, 108.0).ok();
    } else {
        // Recall modes: sigil only, layered stroke+fill for contrast.
        ctx.set_font("58px 'Noto Serif SC', serif");
        ctx.set_line_width(6.0);
        ctx.set_stroke_style_str("rgba(0,0,0,0.85)");
        ctx.stroke_text(target.sigil, cx, 96.0).ok();
        ctx.set_fill_style_str(target.color);
        ctx.fill_text(target.sigil, cx, 96.0).ok();
    }
}

fn render_sockets(state: &GameState) {
    let ctx = &state.ctx;
    for i in 0..3 {
        let (cx, cy) = socket_center(i);
        ctx.begin_path();
        ctx.arc(cx, cy, SOCKET_R, 0.0, std::f64::consts::TAU).ok();
        match state.session.orbs.get(i) {
            Some(orb) => {
                ctx.set_fill_style_str(orb.color());
                ctx.fill();
                ctx.set_font("26px 'Fira Code', monospace");
                ctx.set_fill_style_str("#ffffff");
                ctx.fill_text(&orb.letter().to_string(), cx, cy + 9.0).ok();
            }
            None => {
                ctx.set_stroke_style_str("rgba(150,160,220,0.35)");
                ctx.set_line_width(2.0);
                ctx.stroke();
            }
        }
    }
}

fn render_orb_buttons(state: &GameState) {
    let ctx = &state.ctx;
    for (i, orb) in Orb::ALL.iter().enumerate() {
        let (cx, cy) = orb_button_center(i);
        ctx.begin_path();
        ctx.arc(cx, cy, ORB_BTN_R, 0.0, std::f64::consts::TAU).ok();
        ctx.set_fill_style_str(orb.color());
        ctx.set_global_alpha(0.8);
        ctx.fill();
        ctx.set_global_alpha(1.0);
        ctx.set_stroke_style_str("rgba(255,255,255,0.4)");
        ctx.set_line_width(2.0);
        ctx.stroke();
        ctx.set_font("30px 'Fira Code', monospace");
        ctx.set_fill_style_str("#ffffff");
        ctx.fill_text(&orb.letter().to_string(), cx, cy + 10.0).ok();
        ctx.set_font("12px 'Fira Code', monospace");
        ctx.set_fill_style_str("#cfcfe8");
        ctx.fill_text(orb.name(), cx, cy + ORB_BTN_R + 16.0).ok();
    }
}

fn render_invoke_band(state: &GameState) {
    let ctx = &state.ctx;
    let (x, y, w, h) = invoke_rect();
    ctx.set_fill_style_str("rgba(251,191,36,0.16)");
    ctx.fill_rect(x, y, w, h);
    ctx.set_stroke_style_str("#fbbf24");
    ctx.set_line_width(2.0);
    ctx.stroke_rect(x, y, w, h);
    ctx.set_font("18px 'Fira Code', monospace");
    ctx.set_fill_style_str("#fbbf24");
    ctx.fill_text("Invoke (R)", x + w / 2.0, y + h / 2.0 + 6.0).ok();
}

fn render_slots(state: &GameState) {
    let ctx = &state.ctx;
    for i in 0..2 {
        let (x, y, w, h) = slot_rect(i);
        match state.session.slots[i] {
            Some(spell) => {
                ctx.set_fill_style_str("rgba(0,0,0,0.35)");
                ctx.fill_rect(x, y, w, h);
                ctx.set_stroke_style_str(spell.color);
                ctx.set_line_width(2.0);
                ctx.stroke_rect(x, y, w, h);
                ctx.set_font("34px 'Noto Serif SC', serif");
                ctx.set_fill_style_str(spell.color);
                ctx.fill_text(spell.sigil, x + w / 2.0, y + h / 2.0 + 6.0).ok();
                ctx.set_font("11px 'Fira Code', monospace");
                ctx.set_fill_style_str("#cfcfe8");
                ctx.fill_text(spell.name, x + w / 2.0, y + h - 8.0).ok();
            }
            None => {
                ctx.set_fill_style_str("rgba(100,150,255,0.08)");
                ctx.fill_rect(x, y, w, h);
                ctx.set_stroke_style_str("rgba(150,160,220,0.25)");
                ctx.set_line_width(1.0);
                ctx.stroke_rect(x, y, w, h);
            }
        }
        ctx.set_font("12px 'Fira Code', monospace");
        ctx.set_fill_style_str("#8a8aa8");
        let key = if i == 0 { "D" } else { "F" };
        ctx.fill_text(key, x + w / 2.0, y - 6.0).ok();
    }
}

fn render_particles(state: &GameState, now: f64) {
    let ctx = &state.ctx;
    for p in &state.particles {
        let age = now - p.start_ms;
        if age < 0.0 {
            continue; // staggered birth not reached yet
        }
        let t = (age / PARTICLE_LIFETIME_MS).clamp(0.0, 1.0);
        let px = p.x + p.dx * t;
        let py = p.y + p.dy * t + 22.0 * t * t;
        let radius = 4.0 * (1.0 - t) + 1.0;
        ctx.set_global_alpha(1.0 - t);
        ctx.set_fill_style_str(&p.color);
        ctx.begin_path();
        ctx.arc(px, py, radius, 0.0, std::f64::consts::TAU).ok();
        ctx.fill();
    }
    ctx.set_global_alpha(1.0);
}

fn render_feedback(state: &GameState, now: f64) {
    let ctx = &state.ctx;
    if let Some(fb) = &state.feedback {
        let age = now - fb.start_ms;
        let alpha = 1.0 - (age / FEEDBACK_LIFETIME_MS).clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        ctx.set_global_alpha(alpha);
        ctx.set_font("30px 'Fira Code', monospace");
        ctx.set_line_width(6.0);
        ctx.set_stroke_style_str("rgba(0,0,0,0.8)");
        ctx.stroke_text(&fb.text, CANVAS_W / 2.0, CANVAS_H / 2.0).ok();
        ctx.set_fill_style_str(&fb.color);
        ctx.fill_text(&fb.text, CANVAS_W / 2.0, CANVAS_H / 2.0).ok();
        ctx.set_global_alpha(1.0);
    }
}

fn render_game_over(state: &GameState, now: f64) {
    let ctx = &state.ctx;
    let w = state.canvas.width() as f64;
    let h = state.canvas.height() as f64;
    ctx.set_fill_style_str("rgba(0,0,0,0.55)");
    ctx.fill_rect(0.0, 0.0, w, h);

    let cx = w / 2.0;
    ctx.set_fill_style_str("#ffffff");
    ctx.set_font("52px 'Fira Code', monospace");
    ctx.set_line_width(6.0);
    ctx.set_stroke_style_str("#000000");
    ctx.stroke_text("Time's Up!", cx, h / 2.0 - 60.0).ok();
    ctx.fill_text("Time's Up!", cx, h / 2.0 - 60.0).ok();

    let elapsed = state
        .final_elapsed
        .unwrap_or_else(|| state.clock.elapsed_secs(now));
    ctx.set_font("20px 'Fira Code', monospace");
    ctx.set_fill_style_str("#ffd166");
    ctx.fill_text(
        &format!("Final score {}", state.session.score),
        cx,
        h / 2.0 - 10.0,
    )
    .ok();
    ctx.fill_text(
        &format!("Best streak {}", state.session.best_streak),
        cx,
        h / 2.0 + 20.0,
    )
    .ok();
    ctx.fill_text(&format!("Time {}", format_clock(elapsed)), cx, h / 2.0 + 50.0)
        .ok();
    ctx.set_fill_style_str("#cfcfe8");
    ctx.set_font("15px 'Fira Code', monospace");
    ctx.fill_text("Enter: play again   Esc: menu", cx, h / 2.0 + 92.0)
        .ok();
}

// --- Helpers ------------------------------------------------------------------

fn now_ms() -> f64 {
    window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0)
}

fn rand_index(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let now = now_ms();
    // Simple linear transform and modulus for prototype randomness (not crypto secure)
    (now as u64 as usize)
        .wrapping_mul(1664525)
        .wrapping_add(1013904223)
        % len
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::spellbook::spell_named;

    fn challenged_session(mode: GameMode, target: &str) -> Session {
        let mut session = Session::new(mode);
        session.assign_challenge(spell_named(target).expect("target in table"));
        session
    }

    #[test]
    fn test_gameclock_whole_seconds() {
        let start = 2_000.0;
        let clock = GameClock::new(start);
        assert_eq!(clock.elapsed_secs(start), 0);
        assert_eq!(clock.elapsed_secs(start + 999.0), 0);
        assert_eq!(clock.elapsed_secs(start + 1_000.0), 1);
        assert_eq!(clock.elapsed_secs(start + 61_500.0), 61);
    }

    #[test]
    fn test_push_orb_drops_oldest_beyond_three() {
        let mut session = Session::new(GameMode::Practice);
        session.push_orb(Orb::Quas);
        session.push_orb(Orb::Quas);
        session.push_orb(Orb::Quas);
        session.push_orb(Orb::Wex);
        assert_eq!(session.orbs, vec![Orb::Quas, Orb::Quas, Orb::Wex]);
    }

    #[test]
    fn test_invoke_needs_three_orbs() {
        let mut session = Session::new(GameMode::Practice);
        session.push_orb(Orb::Quas);
        session.push_orb(Orb::Wex);
        assert!(matches!(session.invoke(), InvokeOutcome::NotEnoughOrbs));
        assert_eq!(session.orbs.len(), 2);
    }

    #[test]
    fn test_practice_invoke_slots_without_scoring() {
        let mut session = Session::new(GameMode::Practice);
        for _ in 0..3 {
            session.push_orb(Orb::Quas);
        }
        match session.invoke() {
            InvokeOutcome::Invoked { spell, challenge } => {
                assert_eq!(spell.name, "Cold Snap");
                assert!(challenge.is_none());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(session.score, 0);
        assert_eq!(session.slots[0].map(|s| s.name), Some("Cold Snap"));
        // Pending orbs survive the invoke.
        assert_eq!(session.orbs.len(), 3);
    }

    #[test]
    fn test_challenge_hit_scores_and_clears_target() {
        let mut session = challenged_session(GameMode::Classic, "Tornado");
        session.push_orb(Orb::Wex);
        session.push_orb(Orb::Quas);
        session.push_orb(Orb::Wex);
        match session.invoke() {
            InvokeOutcome::Invoked { challenge, .. } => {
                assert_eq!(
                    challenge,
                    Some(ChallengeOutcome::Hit {
                        gained: 100,
                        bonus_secs: 0
                    })
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(session.score, 100);
        assert_eq!(session.streak, 1);
        assert_eq!(session.best_streak, 1);
        assert!(session.challenge.is_none());
    }

    #[test]
    fn test_challenge_hit_in_timed_grants_bonus_time() {
        let mut session = challenged_session(GameMode::Timed, "EMP");
        assert_eq!(session.time_left, 60);
        for _ in 0..3 {
            session.push_orb(Orb::Wex);
        }
        match session.invoke() {
            InvokeOutcome::Invoked { challenge, .. } => {
                assert_eq!(
                    challenge,
                    Some(ChallengeOutcome::Hit {
                        gained: 100,
                        bonus_secs: 5
                    })
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(session.time_left, 65);
    }

    #[test]
    fn test_wrong_spell_resets_streak_but_still_slots() {
        let mut session = challenged_session(GameMode::Combo, "Sun Strike");
        session.streak = 4;
        session.best_streak = 4;
        for _ in 0..3 {
            session.push_orb(Orb::Quas);
        }
        match session.invoke() {
            InvokeOutcome::Invoked { spell, challenge } => {
                assert_eq!(spell.name, "Cold Snap");
                assert_eq!(challenge, Some(ChallengeOutcome::Miss));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(session.streak, 0);
        assert_eq!(session.best_streak, 4);
        assert_eq!(session.score, 0);
        assert_eq!(session.slots[0].map(|s| s.name), Some("Cold Snap"));
        // Target stays until it is actually invoked.
        assert!(session.challenge.is_some());
    }

    #[test]
    fn test_invoke_between_challenges_judges_nothing() {
        let mut session = Session::new(GameMode::Combo);
        session.streak = 2;
        for _ in 0..3 {
            session.push_orb(Orb::Exort);
        }
        match session.invoke() {
            InvokeOutcome::Invoked { challenge, .. } => assert!(challenge.is_none()),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(session.streak, 2);
    }

    #[test]
    fn test_slot_shift_keeps_two_most_recent() {
        let mut session = Session::new(GameMode::Practice);
        let cold_snap = spell_named("Cold Snap").unwrap();
        let emp = spell_named("EMP").unwrap();
        let sun_strike = spell_named("Sun Strike").unwrap();
        session.slot_spell(cold_snap);
        session.slot_spell(emp);
        session.slot_spell(sun_strike);
        assert_eq!(session.slots[0].map(|s| s.name), Some("EMP"));
        assert_eq!(session.slots[1].map(|s| s.name), Some("Sun Strike"));
    }

    #[test]
    fn test_cast_returns_slot_without_consuming() {
        let mut session = Session::new(GameMode::Practice);
        let ghost_walk = spell_named("Ghost Walk").unwrap();
        session.slot_spell(ghost_walk);
        assert_eq!(session.cast(0).map(|s| s.name), Some("Ghost Walk"));
        assert_eq!(session.cast(0).map(|s| s.name), Some("Ghost Walk"));
        assert!(session.cast(1).is_none());
        assert!(session.cast(7).is_none());
    }

    #[test]
    fn test_timed_clock_runs_out() {
        let mut session = Session::new(GameMode::Timed);
        session.time_left = 2;
        assert!(!session.tick_second());
        assert!(session.tick_second());
        assert!(session.game_over);
        assert_eq!(session.time_left, 0);
        // Further ticks are inert once the game is over.
        assert!(!session.tick_second());
        assert_eq!(session.time_left, 0);
    }

    #[test]
    fn test_untimed_modes_ignore_ticks() {
        for mode in [GameMode::Practice, GameMode::Classic, GameMode::Combo] {
            let mut session = Session::new(mode);
            for _ in 0..120 {
                assert!(!session.tick_second());
            }
            assert!(!session.game_over);
        }
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(600), "10:00");
        assert_eq!(format_clock(-3), "00:00");
    }

    #[test]
    fn test_mode_names_round_trip() {
        for (name, mode) in [
            ("practice", GameMode::Practice),
            ("classic", GameMode::Classic),
            ("timed", GameMode::Timed),
            ("combo", GameMode::Combo),
        ] {
            assert_eq!(GameMode::from_name(name), Some(mode));
        }
        assert_eq!(GameMode::from_name("arcade"), None);
    }
}
