//! The combat engine: session registry, lifecycle, and the submit path.
//!
//! Lock order is challenge board, then the active-session index, then the
//! session map, then a single session. Submitting an action only ever
//! takes the session map briefly and then that one session's mutex.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use gr_mechanics::DiceSource;
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::action::ActionRequest;
use crate::challenge::{ChallengeBoard, PvpChallenge};
use crate::clock::{Clock, SystemClock};
use crate::combatant::{Combatant, CombatantSpec, Side};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventSink, NullSink, RESULT_EVENT, ResultEvent};
use crate::finalize;
use crate::ids::{EntityId, SessionId};
use crate::inventory::{InMemoryInventory, Inventory};
use crate::leaderboard::{Leaderboard, LeaderboardEntry};
use crate::ledger::{InMemoryLedger, Ledger, Transfer};
use crate::resolver::{self, ResolveContext};
use crate::session::{AvailableItem, AvailableSpell, CombatSession, CombatType};
use crate::turn::Ending;

/// Builds the dice stream for a new session from a per-engine counter.
pub type DiceFactory = Arc<dyn Fn(u64) -> Box<dyn DiceSource + Send> + Send + Sync>;

struct Slot {
    session: CombatSession,
    dice: Box<dyn DiceSource + Send>,
}

type SharedSlot = Arc<Mutex<Slot>>;

/// A server-side combat engine. Share it by reference; every method takes
/// `&self`.
pub struct CombatEngine {
    config: EngineConfig,
    ledger: Arc<dyn Ledger>,
    inventory: Arc<dyn Inventory>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    dice_factory: DiceFactory,
    next_stream: AtomicU64,
    challenges: Mutex<ChallengeBoard>,
    latest: Mutex<HashMap<(EntityId, CombatType), SessionId>>,
    sessions: RwLock<HashMap<SessionId, SharedSlot>>,
    leaderboard: Mutex<Leaderboard>,
}

impl std::fmt::Debug for CombatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatEngine")
            .field("config", &self.config)
            .field("sessions", &self.sessions.read().len())
            .field("challenges", &self.challenges.lock().len())
            .finish()
    }
}

fn seeded_factory(seed: Option<u64>) -> DiceFactory {
    Arc::new(move |stream: u64| -> Box<dyn DiceSource + Send> {
        match seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed.wrapping_add(stream))),
            None => Box::new(StdRng::from_os_rng()),
        }
    })
}

impl CombatEngine {
    /// Create an engine with in-memory collaborators.
    pub fn new(config: EngineConfig) -> Self {
        let dice_factory = seeded_factory(config.seed);
        let leaderboard = Leaderboard::new(config.initial_rating, config.rating_k);
        Self {
            config,
            ledger: Arc::new(InMemoryLedger::new()),
            inventory: Arc::new(InMemoryInventory::new()),
            events: Arc::new(NullSink),
            clock: Arc::new(SystemClock),
            dice_factory,
            next_stream: AtomicU64::new(0),
            challenges: Mutex::new(ChallengeBoard::new()),
            latest: Mutex::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            leaderboard: Mutex::new(leaderboard),
        }
    }

    /// Use an external gold/XP ledger.
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Use an external inventory.
    pub fn with_inventory(mut self, inventory: Arc<dyn Inventory>) -> Self {
        self.inventory = inventory;
        self
    }

    /// Publish results to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Read time from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace how session dice are made.
    pub fn with_dice_factory(mut self, factory: DiceFactory) -> Self {
        self.dice_factory = factory;
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn new_dice(&self) -> Box<dyn DiceSource + Send> {
        let stream = self.next_stream.fetch_add(1, Ordering::Relaxed);
        (self.dice_factory)(stream)
    }

    fn slot(&self, id: SessionId) -> EngineResult<SharedSlot> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(EngineError::SessionNotFound(id))
    }

    fn latest_for(&self, player: EntityId, combat_type: CombatType) -> Option<SessionId> {
        self.latest.lock().get(&(player, combat_type)).copied()
    }

    // ---- session creation ----

    /// Start a PvE encounter from a roster. Players and allies form the
    /// party, enemies the opposition. AI combatants that win initiative act
    /// before this returns.
    pub fn start_encounter(&self, roster: Vec<CombatantSpec>) -> EngineResult<CombatSession> {
        let combatants = roster
            .into_iter()
            .map(|spec| {
                let side = spec.default_side();
                Combatant::from_spec(spec, side)
            })
            .collect();
        self.open_session(SessionId::new(), CombatType::Pve, combatants, None, Vec::new())
    }

    fn open_session(
        &self,
        id: SessionId,
        combat_type: CombatType,
        combatants: Vec<Combatant>,
        wager: Option<u64>,
        escrow: Vec<Transfer>,
    ) -> EngineResult<CombatSession> {
        let now = self.clock.now();
        let mut dice = self.new_dice();
        let mut session =
            CombatSession::start(id, combat_type, combatants, wager, &mut *dice, now)?;

        let mut latest = self.latest.lock();
        for player in session.players() {
            if self.is_engaged(&latest, player.entity_id, combat_type) {
                return Err(EngineError::AlreadyInCombat(player.entity_id, combat_type));
            }
        }

        let (ending, consumed) = {
            let mut ctx =
                ResolveContext::new(&mut *dice, self.inventory.as_ref(), now, self.config.flee_dc);
            let ending = resolver::settle(&mut session, &mut ctx);
            (ending, ctx.consumed().to_vec())
        };
        self.seal(&mut session, ending, &consumed, escrow, &mut *dice, now)?;

        info!(
            session = %session.id,
            combat_type = %combat_type,
            combatants = session.combatants.len(),
            wager = wager.unwrap_or(0),
            "session started"
        );
        let players: Vec<EntityId> = session.players().map(|c| c.entity_id).collect();
        self.sessions.write().insert(
            id,
            Arc::new(Mutex::new(Slot {
                session: session.clone(),
                dice,
            })),
        );
        for player in players {
            latest.insert((player, combat_type), id);
        }
        drop(latest);

        if ending.is_some() {
            self.after_finish(&session);
        }
        Ok(self.decorate(session))
    }

    /// Whether `player` has an unfinished session on this track.
    fn is_engaged(
        &self,
        latest: &HashMap<(EntityId, CombatType), SessionId>,
        player: EntityId,
        combat_type: CombatType,
    ) -> bool {
        let Some(id) = latest.get(&(player, combat_type)) else {
            return false;
        };
        let slot = self.sessions.read().get(id).cloned();
        slot.is_some_and(|slot| slot.lock().session.is_active())
    }

    // ---- the submit path ----

    /// Submit an action for `actor` in a session.
    ///
    /// Resolves the action and every AI turn after it, finalizes the session
    /// if it ended, and commits all of it, or nothing: on any error the
    /// stored session is unchanged.
    pub fn submit_action(
        &self,
        session_id: SessionId,
        actor: EntityId,
        request: &ActionRequest,
    ) -> EngineResult<CombatSession> {
        self.resolve_in(session_id, |_| Ok((actor, request.clone())))
    }

    /// Submit an action in the player's PvE session.
    pub fn submit_pve_action(
        &self,
        player: EntityId,
        request: &ActionRequest,
    ) -> EngineResult<CombatSession> {
        let id = self.active_id(player, CombatType::Pve)?;
        self.submit_action(id, player, request)
    }

    /// Submit an action in the player's PvP session.
    pub fn submit_pvp_action(
        &self,
        player: EntityId,
        request: &ActionRequest,
    ) -> EngineResult<CombatSession> {
        let id = self.active_id(player, CombatType::Pvp)?;
        self.submit_action(id, player, request)
    }

    /// Defend on behalf of a player who let their turn lapse.
    pub fn expire_idle_turn(&self, session_id: SessionId) -> EngineResult<CombatSession> {
        self.resolve_in(session_id, |session| {
            if !session.is_active() {
                return Err(EngineError::SessionNotActive(session.id));
            }
            let current = session.current_turn_entity_id;
            info!(session = %session.id, player = %current, "turn expired, defending");
            Ok((current, ActionRequest::defend()))
        })
    }

    fn active_id(&self, player: EntityId, combat_type: CombatType) -> EngineResult<SessionId> {
        self.latest_for(player, combat_type)
            .ok_or(EngineError::NoActiveSession {
                player,
                combat_type,
            })
    }

    /// Lock one session, pick the actor and request from its current state,
    /// resolve on a copy and commit.
    fn resolve_in<F>(&self, session_id: SessionId, pick: F) -> EngineResult<CombatSession>
    where
        F: FnOnce(&CombatSession) -> EngineResult<(EntityId, ActionRequest)>,
    {
        let shared = self.slot(session_id)?;
        let committed = {
            let mut guard = shared.lock();
            let slot = &mut *guard;
            let (actor, request) = pick(&slot.session)?;
            let now = self.clock.now();
            let mut working = slot.session.clone();

            let (ending, consumed) = {
                let mut ctx = ResolveContext::new(
                    &mut *slot.dice,
                    self.inventory.as_ref(),
                    now,
                    self.config.flee_dc,
                );
                let ending = resolver::submit(&mut working, actor, &request, &mut ctx)?;
                (ending, ctx.consumed().to_vec())
            };
            self.seal(&mut working, ending, &consumed, Vec::new(), &mut *slot.dice, now)?;
            debug!(session = %session_id, version = working.version, "action committed");
            slot.session = working.clone();
            (working, ending.is_some())
        };

        let (session, finished) = committed;
        if finished {
            self.after_finish(&session);
        }
        Ok(self.decorate(session))
    }

    /// Finalize if the fight ended, then take used items and apply the
    /// ledger batch. Items are put back if the ledger refuses. Bumps the
    /// version on success.
    fn seal(
        &self,
        working: &mut CombatSession,
        ending: Option<Ending>,
        consumed: &[(EntityId, String)],
        mut batch: Vec<Transfer>,
        dice: &mut dyn DiceSource,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if let Some(ending) = ending {
            let payout = finalize::finalize(
                working,
                ending,
                self.ledger.as_ref(),
                self.config.defeat_penalty,
                dice,
                now,
            )?;
            batch.extend(payout);
        }

        let mut taken: Vec<&(EntityId, String)> = Vec::new();
        for entry in consumed {
            if let Err(err) = self.inventory.consume(entry.0, &entry.1) {
                self.restore_items(&taken);
                return Err(err.into());
            }
            taken.push(entry);
        }

        if !batch.is_empty() {
            if let Err(err) = self.ledger.apply(&batch) {
                warn!(session = %working.id, error = %err, "ledger rejected batch, rolling back");
                self.restore_items(&taken);
                return Err(err.into());
            }
            info!(session = %working.id, transfers = batch.len(), "ledger batch applied");
        }

        working.version += 1;
        Ok(())
    }

    fn restore_items(&self, taken: &[&(EntityId, String)]) {
        for (owner, item) in taken.iter().rev() {
            self.inventory.restore(*owner, item);
        }
    }

    /// Leaderboard and notification work once a session is committed as
    /// finished. Never fails.
    fn after_finish(&self, session: &CombatSession) {
        let Some(result) = &session.result else {
            return;
        };
        if session.combat_type == CombatType::Pvp {
            let name = |id: Option<EntityId>| {
                id.and_then(|id| session.combatant(id))
                    .map(|c| (c.entity_id, c.name.clone()))
            };
            if let (Some((winner, winner_name)), Some((loser, loser_name))) =
                (name(result.winner_id), name(result.loser_id))
            {
                self.leaderboard
                    .lock()
                    .record_duel(winner, &winner_name, loser, &loser_name);
            }
        }

        let event = ResultEvent {
            session_id: session.id,
            result: result.clone(),
        };
        if let Err(err) = self.events.publish(RESULT_EVENT, &event) {
            warn!(session = %session.id, error = %err, "could not publish combat result");
        }
    }

    // ---- reads ----

    /// Full state of a session.
    pub fn session(&self, id: SessionId) -> EngineResult<CombatSession> {
        let shared = self.slot(id)?;
        let session = shared.lock().session.clone();
        Ok(self.decorate(session))
    }

    /// The player's latest PvE session, if any. A finished session stays
    /// visible until a new one replaces it.
    pub fn pve_state(&self, player: EntityId) -> Option<CombatSession> {
        self.track_state(player, CombatType::Pve)
    }

    /// The player's latest PvP session, if any.
    pub fn pvp_state(&self, player: EntityId) -> Option<CombatSession> {
        self.track_state(player, CombatType::Pvp)
    }

    fn track_state(&self, player: EntityId, combat_type: CombatType) -> Option<CombatSession> {
        let id = self.latest_for(player, combat_type)?;
        self.session(id).ok()
    }

    /// Fill in the spells and items each player could use right now.
    fn decorate(&self, mut session: CombatSession) -> CombatSession {
        let mut spells = Vec::new();
        let mut items = Vec::new();
        for player in session.players() {
            for spell in &player.spells {
                spells.push(AvailableSpell {
                    owner: player.entity_id,
                    spell_id: spell.id.clone(),
                    name: spell.name.clone(),
                    mp_cost: spell.mp_cost,
                    ready: player.mp.current >= spell.mp_cost && player.cooldown(&spell.id) == 0,
                });
            }
            for item in &player.items {
                items.push(AvailableItem {
                    owner: player.entity_id,
                    item_id: item.id.clone(),
                    name: item.name.clone(),
                    quantity: self.inventory.quantity(player.entity_id, &item.id),
                });
            }
        }
        session.available_spells = spells;
        session.available_items = items;
        session
    }

    // ---- PvP ----

    /// Challenge `target` to a duel. The challenger must be able to cover
    /// the wager now; gold only moves when the challenge is accepted.
    pub fn challenge(
        &self,
        challenger: CombatantSpec,
        target: EntityId,
        wager: Option<u64>,
    ) -> EngineResult<PvpChallenge> {
        let now = self.clock.now();
        if let (Some(id), Some(stake)) = (challenger.entity_id, wager.filter(|w| *w > 0)) {
            let balance = self.ledger.gold(id)?;
            if balance < stake {
                return Err(crate::ledger::LedgerError::InsufficientGold {
                    character: id,
                    balance,
                    needed: stake,
                }
                .into());
            }
        }
        let challenge =
            self.challenges
                .lock()
                .open(challenger, target, wager, self.config.challenge_ttl(), now)?;
        info!(
            challenge = %challenge.session_id,
            challenger = %challenge.challenger_id,
            target = %challenge.target_id,
            "challenge issued"
        );
        Ok(challenge)
    }

    /// Open challenges directed at `player`.
    pub fn pending_challenges(&self, player: EntityId) -> Vec<PvpChallenge> {
        self.challenges
            .lock()
            .for_target(player, self.clock.now())
    }

    /// Accept a challenge with the defender's snapshot. Escrows the wager
    /// from both sides and creates the duel in one step.
    pub fn accept(
        &self,
        challenge_id: SessionId,
        defender: CombatantSpec,
    ) -> EngineResult<CombatSession> {
        let now = self.clock.now();
        let mut board = self.challenges.lock();
        let (challenge, challenger) = board.get(challenge_id, now)?;

        let defender = match defender.entity_id {
            Some(id) if id != challenge.target_id => {
                return Err(EngineError::InvalidChallenge(
                    "only the challenged character can accept".to_string(),
                ));
            }
            Some(_) => defender,
            None => defender.with_id(challenge.target_id),
        };

        let mut escrow = Vec::new();
        if let Some(stake) = challenge.wager {
            escrow.push(Transfer::DebitGold {
                character: challenge.challenger_id,
                amount: stake,
            });
            escrow.push(Transfer::DebitGold {
                character: challenge.target_id,
                amount: stake,
            });
        }

        let combatants = vec![
            Combatant::from_spec(challenger, Side::Party),
            Combatant::from_spec(defender, Side::Opposition),
        ];
        let session = self.open_session(
            challenge.session_id,
            CombatType::Pvp,
            combatants,
            challenge.wager,
            escrow,
        )?;
        board.remove(challenge_id, now)?;
        if let Some(stake) = challenge.wager {
            info!(session = %session.id, stake, "wager escrowed");
        }
        Ok(session)
    }

    /// Turn a challenge down. Nothing was escrowed, so nothing moves.
    pub fn decline(&self, challenge_id: SessionId) -> EngineResult<PvpChallenge> {
        let challenge = self
            .challenges
            .lock()
            .remove(challenge_id, self.clock.now())?;
        info!(challenge = %challenge_id, "challenge declined");
        Ok(challenge)
    }

    /// PvP standings, best first.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.leaderboard.lock().standings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{
        CombatItem, CombatStats, CombatantKind, DropEntry, ItemEffect, Rarity, RewardTable, Spell,
        SpellDelivery, SpellEffect,
    };
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::events::RecordingSink;
    use crate::session::{Outcome, SessionStatus};
    use chrono::Duration;
    use gr_mechanics::{DiceExpr, ScriptedDice};
    use proptest::prelude::*;

    fn start_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn scripted(script: Vec<u32>) -> DiceFactory {
        Arc::new(move |_: u64| -> Box<dyn DiceSource + Send> {
            Box::new(ScriptedDice::new(script.clone()))
        })
    }

    struct Harness {
        engine: CombatEngine,
        ledger: Arc<InMemoryLedger>,
        inventory: Arc<InMemoryInventory>,
        sink: Arc<RecordingSink>,
        clock: Arc<ManualClock>,
    }

    fn harness(script: Vec<u32>) -> Harness {
        let ledger = Arc::new(InMemoryLedger::new());
        let inventory = Arc::new(InMemoryInventory::new());
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let engine = CombatEngine::new(EngineConfig::default())
            .with_ledger(ledger.clone())
            .with_inventory(inventory.clone())
            .with_event_sink(sink.clone())
            .with_clock(clock.clone())
            .with_dice_factory(scripted(script));
        Harness {
            engine,
            ledger,
            inventory,
            sink,
            clock,
        }
    }

    fn hero(id: EntityId) -> CombatantSpec {
        CombatantSpec::new("Aria", CombatantKind::Player, 30)
            .with_id(id)
            .with_mana(20, 10)
            .with_stats(CombatStats {
                armor_class: 14,
                attack_bonus: 5,
                damage: DiceExpr::new(1, 8, 3),
                dex_modifier: 2,
                save_modifier: 0,
            })
            .with_spell(Spell {
                id: "meteor".into(),
                name: "Meteor".into(),
                mp_cost: 20,
                effect: SpellEffect::Damage {
                    dice: DiceExpr::new(8, 6, 0),
                },
                delivery: SpellDelivery::Automatic,
                cooldown: 0,
            })
            .with_item(CombatItem {
                id: "potion".into(),
                name: "Healing Potion".into(),
                effect: ItemEffect::Heal {
                    dice: DiceExpr::new(2, 4, 2),
                },
            })
    }

    fn ghoul() -> CombatantSpec {
        CombatantSpec::new("Ghoul", CombatantKind::Enemy, 20)
            .with_stats(CombatStats {
                armor_class: 12,
                attack_bonus: 3,
                damage: DiceExpr::new(1, 6, 1),
                dex_modifier: 0,
                save_modifier: 0,
            })
            .with_rewards(RewardTable {
                xp: 50,
                gold: 12,
                drops: vec![DropEntry {
                    name: "Ghoul Claw".into(),
                    quantity: 1,
                    rarity: Rarity::Common,
                    chance: 100,
                }],
            })
    }

    fn duelist(name: &str, id: EntityId) -> CombatantSpec {
        CombatantSpec::new(name, CombatantKind::Player, 30)
            .with_id(id)
            .with_stats(CombatStats {
                armor_class: 12,
                attack_bonus: 4,
                damage: DiceExpr::flat(40),
                dex_modifier: 0,
                save_modifier: 0,
            })
    }

    #[test]
    fn forced_hit_kills_enemy_and_pays_out() {
        // initiative 20 / 1, then attack 15 for a flat 25, then the claw drop roll
        let h = harness(vec![20, 1, 15, 50]);
        let aria = EntityId::new();
        let mut spec = hero(aria);
        spec.stats.damage = DiceExpr::flat(25);
        let s = h.engine.start_encounter(vec![spec, ghoul()]).unwrap();
        assert_eq!(s.version, 1);
        assert_eq!(s.current_turn_entity_id, aria);

        let s = h
            .engine
            .submit_pve_action(aria, &ActionRequest::attack())
            .unwrap();
        assert_eq!(s.status, SessionStatus::Finished);
        let result = s.result.as_ref().unwrap();
        assert_eq!(result.outcome, Outcome::Victory);
        assert_eq!(result.xp_gained, Some(50));
        assert_eq!(result.gold_gained, Some(12));
        assert_eq!(result.loot.len(), 1);
        assert_eq!(h.ledger.gold(aria).unwrap(), 12);
        assert_eq!(h.ledger.experience(aria).unwrap(), 50);

        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "combat:result");
        assert_eq!(events[0].1.session_id, s.id);
    }

    #[test]
    fn finished_session_rejects_further_actions_and_never_pays_twice() {
        let h = harness(vec![20, 1, 15, 50]);
        let aria = EntityId::new();
        let mut spec = hero(aria);
        spec.stats.damage = DiceExpr::flat(25);
        h.engine.start_encounter(vec![spec, ghoul()]).unwrap();
        let done = h
            .engine
            .submit_pve_action(aria, &ActionRequest::attack())
            .unwrap();
        let err = h
            .engine
            .submit_pve_action(aria, &ActionRequest::attack())
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionNotActive(_)));
        assert_eq!(h.ledger.gold(aria).unwrap(), 12);
        assert_eq!(h.engine.session(done.id).unwrap(), done);
        assert_eq!(h.engine.pve_state(aria).unwrap().status, SessionStatus::Finished);
    }

    #[test]
    fn out_of_turn_submission_changes_nothing() {
        let h = harness(vec![20, 1]);
        let aria = EntityId::new();
        let s = h.engine.start_encounter(vec![hero(aria), ghoul()]).unwrap();
        let ghoul_id = s.combatants[1].entity_id;
        let err = h
            .engine
            .submit_action(s.id, ghoul_id, &ActionRequest::attack())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalState);
        let after = h.engine.session(s.id).unwrap();
        assert_eq!(after, s);
    }

    #[test]
    fn spell_without_mana_is_rejected_and_state_unchanged() {
        let h = harness(vec![20, 1]);
        let aria = EntityId::new();
        let s = h.engine.start_encounter(vec![hero(aria), ghoul()]).unwrap();
        let err = h
            .engine
            .submit_pve_action(aria, &ActionRequest::cast("meteor"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientMana { .. }));
        assert_eq!(h.engine.pve_state(aria).unwrap(), s);
    }

    #[test]
    fn forced_flee_success_moves_nothing() {
        // initiative, then flee roll 15 + 2
        let h = harness(vec![20, 1, 15]);
        let aria = EntityId::new();
        h.ledger.set_gold(aria, 100);
        h.engine.start_encounter(vec![hero(aria), ghoul()]).unwrap();
        let s = h
            .engine
            .submit_pve_action(aria, &ActionRequest::flee())
            .unwrap();
        let result = s.result.unwrap();
        assert_eq!(result.outcome, Outcome::Fled);
        assert_eq!(result.xp_gained, None);
        assert_eq!(result.gold_gained, None);
        assert_eq!(h.ledger.gold(aria).unwrap(), 100);
    }

    #[test]
    fn enemy_that_wins_initiative_acts_before_start_returns() {
        // ghoul first: attack 18 + 3 hits for 4 + 1
        let h = harness(vec![1, 20, 18, 4]);
        let aria = EntityId::new();
        let s = h.engine.start_encounter(vec![hero(aria), ghoul()]).unwrap();
        assert_eq!(s.current_turn_entity_id, aria);
        assert_eq!(s.combatants[0].hp.current, 25);
        assert_eq!(s.round, 1);
        assert_eq!(s.version, 1);
    }

    #[test]
    fn second_pve_session_is_refused_while_first_is_active() {
        let h = harness(vec![20, 1]);
        let aria = EntityId::new();
        h.engine.start_encounter(vec![hero(aria), ghoul()]).unwrap();
        let err = h
            .engine
            .start_encounter(vec![hero(aria), ghoul()])
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyInCombat(id, CombatType::Pve) if id == aria));
    }

    #[test]
    fn stale_expected_version_conflicts() {
        let h = harness(vec![20, 1]);
        let aria = EntityId::new();
        let s = h.engine.start_encounter(vec![hero(aria), ghoul()]).unwrap();
        let err = h
            .engine
            .submit_pve_action(aria, &ActionRequest::defend().expecting(s.version + 5))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
    }

    #[test]
    fn item_use_consumes_inventory_on_commit() {
        // initiative; potion 2 + 2 + 2; ghoul misses with a 1
        let h = harness(vec![20, 1, 2, 2, 1]);
        let aria = EntityId::new();
        h.inventory.set_quantity(aria, "potion", 1);
        let s = h
            .engine
            .start_encounter(vec![hero(aria).with_hp(10), ghoul()])
            .unwrap();
        assert_eq!(s.available_items[0].quantity, 1);
        let s = h
            .engine
            .submit_pve_action(aria, &ActionRequest::use_item("potion"))
            .unwrap();
        assert_eq!(s.combatants[0].hp.current, 16);
        assert_eq!(h.inventory.quantity(aria, "potion"), 0);
        assert_eq!(s.available_items[0].quantity, 0);

        let err = h
            .engine
            .submit_pve_action(aria, &ActionRequest::use_item("potion"))
            .unwrap_err();
        assert!(matches!(err, EngineError::ItemDepleted(_)));
    }

    #[test]
    fn ledger_outage_keeps_session_active_and_items_intact() {
        // the killing blow needs a payout, which the ledger refuses
        let h = harness(vec![20, 1, 15, 50]);
        let aria = EntityId::new();
        let mut spec = hero(aria);
        spec.stats.damage = DiceExpr::flat(25);
        let before = h.engine.start_encounter(vec![spec, ghoul()]).unwrap();
        h.ledger.set_available(false);
        let err = h
            .engine
            .submit_pve_action(aria, &ActionRequest::attack())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Collaborator);
        let after = h.engine.pve_state(aria).unwrap();
        assert_eq!(after, before);
        assert!(after.is_active());
        assert!(h.sink.events().is_empty());
    }

    #[test]
    fn pvp_wager_moves_the_pot_to_the_winner() {
        // initiative 20 / 1, challenger hits for a flat 40
        let h = harness(vec![20, 1, 15]);
        let (aria, brann) = (EntityId::new(), EntityId::new());
        h.ledger.set_gold(aria, 500);
        h.ledger.set_gold(brann, 500);

        let c = h
            .engine
            .challenge(duelist("Aria", aria), brann, Some(100))
            .unwrap();
        assert_eq!(h.engine.pending_challenges(brann).len(), 1);
        let s = h.engine.accept(c.session_id, duelist("Brann", brann)).unwrap();
        assert_eq!(s.id, c.session_id);
        assert_eq!(s.wager, Some(100));
        assert_eq!(h.ledger.gold(aria).unwrap(), 400);
        assert_eq!(h.ledger.gold(brann).unwrap(), 400);
        assert!(h.engine.pending_challenges(brann).is_empty());

        let s = h
            .engine
            .submit_pvp_action(aria, &ActionRequest::attack())
            .unwrap();
        let result = s.result.unwrap();
        assert_eq!(result.outcome, Outcome::Victory);
        assert_eq!(result.winner_id, Some(aria));
        assert_eq!(result.gold_gained, Some(200));
        assert_eq!(h.ledger.gold(aria).unwrap(), 600);
        assert_eq!(h.ledger.gold(brann).unwrap(), 400);

        let board = h.engine.leaderboard();
        assert_eq!(board[0].character_id, aria);
        assert_eq!(board[0].rating, 1016);
        assert_eq!(board[1].losses, 1);
    }

    #[test]
    fn pvp_forbids_fleeing() {
        let h = harness(vec![20, 1]);
        let (aria, brann) = (EntityId::new(), EntityId::new());
        let c = h.engine.challenge(duelist("Aria", aria), brann, None).unwrap();
        h.engine.accept(c.session_id, duelist("Brann", brann)).unwrap();
        let err = h
            .engine
            .submit_pvp_action(aria, &ActionRequest::flee())
            .unwrap_err();
        assert!(matches!(err, EngineError::FleeNotAllowed(CombatType::Pvp)));
    }

    #[test]
    fn wager_must_be_affordable() {
        let h = harness(vec![]);
        let (aria, brann) = (EntityId::new(), EntityId::new());
        h.ledger.set_gold(aria, 10);
        let err = h
            .engine
            .challenge(duelist("Aria", aria), brann, Some(50))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalState);
    }

    #[test]
    fn failed_escrow_creates_no_session() {
        let h = harness(vec![20, 1]);
        let (aria, brann) = (EntityId::new(), EntityId::new());
        h.ledger.set_gold(aria, 100);
        h.ledger.set_gold(brann, 20);
        let c = h
            .engine
            .challenge(duelist("Aria", aria), brann, Some(50))
            .unwrap();
        let err = h
            .engine
            .accept(c.session_id, duelist("Brann", brann))
            .unwrap_err();
        assert!(matches!(err, EngineError::Ledger(_)));
        assert_eq!(h.ledger.gold(aria).unwrap(), 100);
        assert!(h.engine.pvp_state(aria).is_none());
        assert!(matches!(
            h.engine.session(c.session_id),
            Err(EngineError::SessionNotFound(_))
        ));
        // the challenge is still open
        assert_eq!(h.engine.pending_challenges(brann).len(), 1);
    }

    #[test]
    fn only_the_target_can_accept() {
        let h = harness(vec![20, 1]);
        let (aria, brann) = (EntityId::new(), EntityId::new());
        let c = h.engine.challenge(duelist("Aria", aria), brann, None).unwrap();
        let err = h
            .engine
            .accept(c.session_id, duelist("Cato", EntityId::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn expired_challenge_cannot_be_accepted() {
        let h = harness(vec![20, 1]);
        let (aria, brann) = (EntityId::new(), EntityId::new());
        let c = h.engine.challenge(duelist("Aria", aria), brann, None).unwrap();
        h.clock.advance(Duration::seconds(301));
        assert!(h.engine.pending_challenges(brann).is_empty());
        let err = h
            .engine
            .accept(c.session_id, duelist("Brann", brann))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn decline_removes_challenge() {
        let h = harness(vec![]);
        let (aria, brann) = (EntityId::new(), EntityId::new());
        h.ledger.set_gold(aria, 100);
        let c = h
            .engine
            .challenge(duelist("Aria", aria), brann, Some(30))
            .unwrap();
        h.engine.decline(c.session_id).unwrap();
        assert!(h.engine.pending_challenges(brann).is_empty());
        assert_eq!(h.ledger.gold(aria).unwrap(), 100);
        assert!(h.engine.decline(c.session_id).is_err());
    }

    #[test]
    fn idle_turn_defends_for_the_player() {
        // ghoul attacks the defending player: 18 + 3 hits, 5 + 1 halved
        let h = harness(vec![20, 1, 18, 5]);
        let aria = EntityId::new();
        let s = h.engine.start_encounter(vec![hero(aria), ghoul()]).unwrap();
        let s = h.engine.expire_idle_turn(s.id).unwrap();
        assert!(s.log.entries().iter().any(|e| e.action == "defend"));
        assert_eq!(s.combatants[0].hp.current, 27);
        assert_eq!(s.current_turn_entity_id, aria);
    }

    #[test]
    fn no_session_means_not_found() {
        let h = harness(vec![]);
        let nobody = EntityId::new();
        assert!(h.engine.pve_state(nobody).is_none());
        let err = h
            .engine
            .submit_pve_action(nobody, &ActionRequest::attack())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn concurrent_sessions_resolve_independently() {
        let engine = CombatEngine::new(EngineConfig::default().with_seed(99));
        let players: Vec<EntityId> = (0..8).map(|_| EntityId::new()).collect();
        for p in &players {
            engine.start_encounter(vec![hero(*p), ghoul()]).unwrap();
        }

        std::thread::scope(|scope| {
            for p in &players {
                let engine = &engine;
                scope.spawn(move || {
                    for _ in 0..50 {
                        let Some(state) = engine.pve_state(*p) else {
                            break;
                        };
                        if !state.is_active() {
                            break;
                        }
                        let request = ActionRequest::attack().expecting(state.version);
                        match engine.submit_pve_action(*p, &request) {
                            Ok(_) | Err(EngineError::SessionNotActive(_)) => {}
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                    }
                });
            }
        });

        for p in &players {
            let s = engine.pve_state(*p).unwrap();
            if s.is_active() {
                assert_eq!(s.current_turn_entity_id, *p);
                assert!(s.current_actor().is_some_and(|c| c.is_alive()));
            } else {
                assert!(s.result.is_some());
            }
        }
    }

    #[test]
    fn racing_submissions_on_one_session_serialize() {
        let engine = CombatEngine::new(EngineConfig::default().with_seed(7));
        let aria = EntityId::new();
        let start = engine
            .start_encounter(vec![hero(aria), ghoul()])
            .unwrap();
        let version = start.version;

        let outcomes: Vec<EngineResult<CombatSession>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let engine = &engine;
                    scope.spawn(move || {
                        engine.submit_pve_action(aria, &ActionRequest::defend().expecting(version))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let committed = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(committed, 1);
        for err in outcomes.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(
                err.kind(),
                ErrorKind::ConcurrencyConflict | ErrorKind::IllegalState
            ));
        }
        assert_eq!(engine.pve_state(aria).unwrap().version, version + 1);
    }

    proptest! {
        #[test]
        fn seeded_fights_keep_their_invariants(seed in any::<u64>()) {
            let engine = CombatEngine::new(EngineConfig::default().with_seed(seed));
            let aria = EntityId::new();
            let mut s = engine.start_encounter(vec![hero(aria), ghoul()]).unwrap();
            let mut version = s.version;
            for _ in 0..100 {
                if !s.is_active() {
                    break;
                }
                prop_assert!(s.current_actor().is_some_and(|c| c.is_alive() && c.is_player()));
                s = engine.submit_pve_action(aria, &ActionRequest::attack()).unwrap();
                prop_assert_eq!(s.version, version + 1);
                version = s.version;
            }
            prop_assert!(!s.is_active());
            let result = s.result.as_ref().unwrap();
            let paid = engine.ledger.gold(aria).unwrap();
            match result.outcome {
                Outcome::Victory => prop_assert_eq!(paid, 12),
                _ => prop_assert_eq!(paid, 0),
            }
            prop_assert!(engine.submit_pve_action(aria, &ActionRequest::attack()).is_err());
        }
    }
}
