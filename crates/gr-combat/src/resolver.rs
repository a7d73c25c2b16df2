//! Action validation and resolution.
//!
//! Validation happens entirely before the first mutation, so a rejected
//! action leaves the session untouched. Once an action is accepted its
//! effects are applied in causal order, one log entry per sub-effect.

use chrono::{DateTime, Utc};
use gr_mechanics::{DiceSource, attack_roll, flee_check, saving_throw};
use tracing::debug;

use crate::action::{ActionKind, ActionRequest};
use crate::ai;
use crate::combatant::{CombatItem, Combatant, ItemEffect, Spell, SpellDelivery, SpellEffect};
use crate::error::{EngineError, EngineResult};
use crate::ids::EntityId;
use crate::inventory::Inventory;
use crate::log::{ActorType, LogDraft};
use crate::session::{CombatSession, CombatType};
use crate::status::StatusEffect;
use crate::turn::{self, Ending, TurnPhase};

/// Everything resolution needs besides the session itself.
pub struct ResolveContext<'a> {
    dice: &'a mut dyn DiceSource,
    inventory: &'a dyn Inventory,
    now: DateTime<Utc>,
    flee_dc: i32,
    consumed: Vec<(EntityId, String)>,
}

impl<'a> ResolveContext<'a> {
    /// Create a context.
    pub fn new(
        dice: &'a mut dyn DiceSource,
        inventory: &'a dyn Inventory,
        now: DateTime<Utc>,
        flee_dc: i32,
    ) -> Self {
        Self {
            dice,
            inventory,
            now,
            flee_dc,
            consumed: Vec::new(),
        }
    }

    /// Items used during resolution, in order. They are taken from the
    /// inventory only when the caller commits.
    pub fn consumed(&self) -> &[(EntityId, String)] {
        &self.consumed
    }

    /// Time stamped on log entries.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn dice(&mut self) -> &mut dyn DiceSource {
        &mut *self.dice
    }

    /// Units still usable: the inventory quantity minus what this cycle has
    /// already spent.
    fn available(&self, owner: EntityId, item_id: &str) -> u32 {
        let pending = self
            .consumed
            .iter()
            .filter(|(o, i)| *o == owner && i == item_id)
            .count();
        self.inventory
            .quantity(owner, item_id)
            .saturating_sub(u32::try_from(pending).unwrap_or(u32::MAX))
    }
}

/// A validated action, ready to apply.
#[derive(Debug, Clone)]
enum Plan {
    Attack { target: EntityId },
    Cast { spell: Spell, target: EntityId },
    UseItem { item: CombatItem, target: EntityId },
    Defend,
    Flee,
}

/// How a hostile spell reached its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Landing {
    Hit { critical: bool },
    Miss,
    Saved,
}

/// Resolve a player's action and every AI turn that follows it, stopping
/// when a player holds the turn again or the session ends.
pub fn submit(
    session: &mut CombatSession,
    actor: EntityId,
    request: &ActionRequest,
    ctx: &mut ResolveContext<'_>,
) -> EngineResult<Option<Ending>> {
    if !session.is_active() {
        return Err(EngineError::SessionNotActive(session.id));
    }
    if let Some(expected) = request.expected_version.filter(|v| *v != session.version) {
        return Err(EngineError::ConcurrencyConflict {
            expected,
            actual: session.version,
        });
    }
    if let Some(ending) = perform(session, actor, request, ctx)? {
        return Ok(Some(ending));
    }
    Ok(after_turn(session, ctx))
}

/// Play out AI turns until a player is up or the fight ends.
pub fn settle(session: &mut CombatSession, ctx: &mut ResolveContext<'_>) -> Option<Ending> {
    loop {
        let current = session.current_turn_entity_id;
        let ai_turn = session.combatant(current).is_some_and(|c| !c.is_player());
        if !ai_turn {
            return None;
        }
        if let Some(ending) = ai::take_turn(session, current, ctx) {
            return Some(ending);
        }
        if let TurnPhase::SessionFinished(ending) = turn::advance(session, ctx.now) {
            return Some(ending);
        }
    }
}

fn after_turn(session: &mut CombatSession, ctx: &mut ResolveContext<'_>) -> Option<Ending> {
    match turn::advance(session, ctx.now) {
        TurnPhase::SessionFinished(ending) => Some(ending),
        _ => settle(session, ctx),
    }
}

/// Validate and apply a single action for `actor`. Does not move the turn.
pub fn perform(
    session: &mut CombatSession,
    actor: EntityId,
    request: &ActionRequest,
    ctx: &mut ResolveContext<'_>,
) -> EngineResult<Option<Ending>> {
    if !session.is_active() {
        return Err(EngineError::SessionNotActive(session.id));
    }
    let kind = request.kind()?;
    let combatant = session
        .combatant(actor)
        .ok_or(EngineError::CombatantNotFound(actor))?;
    if actor != session.current_turn_entity_id {
        return Err(EngineError::NotYourTurn {
            actor,
            current: session.current_turn_entity_id,
        });
    }

    let plan = plan(session, combatant, kind, request, ctx)?;
    debug!(session = %session.id, actor = %combatant.name, action = %kind, "resolving action");
    Ok(execute(session, actor, plan, ctx))
}

fn plan(
    session: &CombatSession,
    actor: &Combatant,
    kind: ActionKind,
    request: &ActionRequest,
    ctx: &ResolveContext<'_>,
) -> EngineResult<Plan> {
    match kind {
        ActionKind::Attack => Ok(Plan::Attack {
            target: pick_target(session, actor, request.target_id, true)?,
        }),
        ActionKind::CastSpell => {
            let spell_id = request
                .spell_id
                .as_deref()
                .ok_or(EngineError::MissingField {
                    action: "cast_spell",
                    field: "spellId",
                })?;
            let spell = actor
                .spell(spell_id)
                .ok_or_else(|| EngineError::UnknownSpell(spell_id.to_string()))?;
            if actor.mp.current < spell.mp_cost {
                return Err(EngineError::InsufficientMana {
                    spell: spell.name.clone(),
                    cost: spell.mp_cost,
                    available: actor.mp.current,
                });
            }
            let rounds = actor.cooldown(&spell.id);
            if rounds > 0 {
                return Err(EngineError::SpellOnCooldown {
                    spell: spell.name.clone(),
                    rounds,
                });
            }
            let target = pick_target(session, actor, request.target_id, spell.effect.is_hostile())?;
            Ok(Plan::Cast {
                spell: spell.clone(),
                target,
            })
        }
        ActionKind::UseItem => {
            let item_id = request
                .item_id
                .as_deref()
                .ok_or(EngineError::MissingField {
                    action: "use_item",
                    field: "itemId",
                })?;
            let item = actor
                .item(item_id)
                .ok_or_else(|| EngineError::UnknownItem(item_id.to_string()))?;
            if ctx.available(actor.entity_id, &item.id) == 0 {
                return Err(EngineError::ItemDepleted(item.name.clone()));
            }
            let target = pick_target(session, actor, request.target_id, item.effect.is_hostile())?;
            Ok(Plan::UseItem {
                item: item.clone(),
                target,
            })
        }
        ActionKind::Defend => Ok(Plan::Defend),
        ActionKind::Flee => match session.combat_type {
            CombatType::Pve => Ok(Plan::Flee),
            CombatType::Pvp => Err(EngineError::FleeNotAllowed(CombatType::Pvp)),
        },
    }
}

/// Check an explicit target, or pick the default one: the first living
/// opponent in turn order for hostile actions, the actor otherwise.
fn pick_target(
    session: &CombatSession,
    actor: &Combatant,
    requested: Option<EntityId>,
    hostile: bool,
) -> EngineResult<EntityId> {
    let Some(id) = requested else {
        if !hostile {
            return Ok(actor.entity_id);
        }
        return session
            .living_on(actor.side.opponent())
            .first()
            .map(|c| c.entity_id)
            .ok_or_else(|| EngineError::InvalidTarget("no opponent left standing".to_string()));
    };

    let target = session
        .combatant(id)
        .ok_or_else(|| EngineError::InvalidTarget(format!("{id} is not in this fight")))?;
    if !target.is_alive() {
        return Err(EngineError::InvalidTarget(format!(
            "{} is already down",
            target.name
        )));
    }
    if hostile && target.side == actor.side {
        return Err(EngineError::InvalidTarget(format!(
            "{} is on your side",
            target.name
        )));
    }
    if !hostile && target.side != actor.side {
        return Err(EngineError::InvalidTarget(format!(
            "{} is not on your side",
            target.name
        )));
    }
    Ok(target.entity_id)
}

fn execute(
    session: &mut CombatSession,
    actor: EntityId,
    plan: Plan,
    ctx: &mut ResolveContext<'_>,
) -> Option<Ending> {
    match plan {
        Plan::Attack { target } => strike(session, actor, target, ctx),
        Plan::Cast { spell, target } => cast(session, actor, &spell, target, ctx),
        Plan::UseItem { item, target } => use_item(session, actor, &item, target, ctx),
        Plan::Defend => defend(session, actor, ctx.now),
        Plan::Flee => return flee(session, actor, ctx),
    }
    None
}

/// Name and log actor type of a combatant.
fn who(session: &CombatSession, id: EntityId) -> (String, ActorType) {
    session
        .combatant(id)
        .map(|c| (c.name.clone(), c.actor_type()))
        .unwrap_or_else(|| ("Unknown".to_string(), ActorType::System))
}

fn strike(session: &mut CombatSession, attacker: EntityId, target: EntityId, ctx: &mut ResolveContext<'_>) {
    let Some((bonus, weapon)) = session
        .combatant(attacker)
        .map(|c| (c.attack_bonus(), c.stats.damage))
    else {
        return;
    };
    let Some(armor) = session.combatant(target).map(Combatant::armor_class) else {
        return;
    };
    let (name, actor_type) = who(session, attacker);
    let (target_name, _) = who(session, target);

    let roll = attack_roll(ctx.dice(), bonus, armor);
    let verdict = if roll.critical {
        "critical hit!"
    } else if roll.hit {
        "hit"
    } else {
        "miss"
    };
    session.record(
        ctx.now,
        LogDraft::new(
            &name,
            actor_type,
            "attack",
            format!(
                "{name} attacks {target_name}: {} vs AC {armor}, {verdict}",
                roll.total
            ),
        )
        .with_roll(roll.natural),
    );

    if roll.hit {
        let damage = weapon.roll(ctx.dice(), roll.critical);
        deal_damage(session, &name, actor_type, target, damage.total, ctx.now);
    }
}

fn cast(
    session: &mut CombatSession,
    caster: EntityId,
    spell: &Spell,
    target: EntityId,
    ctx: &mut ResolveContext<'_>,
) {
    let Some(c) = session.combatant_mut(caster) else {
        return;
    };
    c.mp.spend(spell.mp_cost);
    if spell.cooldown > 0 {
        c.cooldowns.insert(spell.id.clone(), spell.cooldown);
    }
    let bonus = c.attack_bonus();
    let (name, actor_type) = who(session, caster);
    let (target_name, _) = who(session, target);
    session.record(
        ctx.now,
        LogDraft::new(
            &name,
            actor_type,
            "cast_spell",
            format!(
                "{name} casts {} on {target_name} ({} MP)",
                spell.name, spell.mp_cost
            ),
        ),
    );

    match spell.effect {
        SpellEffect::Damage { dice } => match deliver(session, caster, bonus, spell, target, ctx) {
            Landing::Hit { critical } => {
                let damage = dice.roll(ctx.dice(), critical);
                deal_damage(session, &name, actor_type, target, damage.total, ctx.now);
            }
            Landing::Saved => {
                let damage = dice.roll(ctx.dice(), false);
                deal_damage(session, &name, actor_type, target, damage.total / 2, ctx.now);
            }
            Landing::Miss => {}
        },
        SpellEffect::Heal { dice } => {
            let amount = dice.roll(ctx.dice(), false).total;
            heal(session, &name, actor_type, target, amount, ctx.now);
        }
        SpellEffect::Buff { status, duration } => {
            let effect = StatusEffect::new(&spell.name, status, duration).from_source(caster);
            apply_status(session, &name, actor_type, target, effect, ctx.now);
        }
        SpellEffect::Debuff { status, duration } => {
            if let Landing::Hit { .. } = deliver(session, caster, bonus, spell, target, ctx) {
                let effect = StatusEffect::new(&spell.name, status, duration).from_source(caster);
                apply_status(session, &name, actor_type, target, effect, ctx.now);
            }
        }
    }
}

/// Roll whatever the spell's delivery calls for.
fn deliver(
    session: &mut CombatSession,
    caster: EntityId,
    bonus: i32,
    spell: &Spell,
    target: EntityId,
    ctx: &mut ResolveContext<'_>,
) -> Landing {
    let Some((armor, save_modifier)) = session
        .combatant(target)
        .map(|t| (t.armor_class(), t.stats.save_modifier))
    else {
        return Landing::Miss;
    };
    match spell.delivery {
        SpellDelivery::Automatic => Landing::Hit { critical: false },
        SpellDelivery::Attack => {
            let (name, actor_type) = who(session, caster);
            let roll = attack_roll(ctx.dice(), bonus, armor);
            let verdict = if roll.critical {
                "critical hit!"
            } else if roll.hit {
                "hit"
            } else {
                "miss"
            };
            session.record(
                ctx.now,
                LogDraft::new(
                    &name,
                    actor_type,
                    "spell_attack",
                    format!("{}: {} vs AC {armor}, {verdict}", spell.name, roll.total),
                )
                .with_roll(roll.natural),
            );
            if roll.hit {
                Landing::Hit {
                    critical: roll.critical,
                }
            } else {
                Landing::Miss
            }
        }
        SpellDelivery::Save { dc } => {
            let (name, actor_type) = who(session, target);
            let save = saving_throw(ctx.dice(), save_modifier, dc);
            let verdict = if save.success { "resists" } else { "fails" };
            session.record(
                ctx.now,
                LogDraft::new(
                    &name,
                    actor_type,
                    "save",
                    format!(
                        "{name} {verdict} {} ({} vs DC {dc})",
                        spell.name, save.total
                    ),
                )
                .with_roll(save.natural),
            );
            if save.success {
                Landing::Saved
            } else {
                Landing::Hit { critical: false }
            }
        }
    }
}

fn use_item(
    session: &mut CombatSession,
    user: EntityId,
    item: &CombatItem,
    target: EntityId,
    ctx: &mut ResolveContext<'_>,
) {
    ctx.consumed.push((user, item.id.clone()));
    let (name, actor_type) = who(session, user);
    let (target_name, _) = who(session, target);
    let message = if user == target {
        format!("{name} uses {}", item.name)
    } else {
        format!("{name} uses {} on {target_name}", item.name)
    };
    session.record(
        ctx.now,
        LogDraft::new(&name, actor_type, "use_item", message),
    );

    match item.effect {
        ItemEffect::Heal { dice } => {
            let amount = dice.roll(ctx.dice(), false).total;
            heal(session, &name, actor_type, target, amount, ctx.now);
        }
        ItemEffect::Damage { dice } => {
            let amount = dice.roll(ctx.dice(), false).total;
            deal_damage(session, &name, actor_type, target, amount, ctx.now);
        }
        ItemEffect::RestoreMana { amount } => {
            let restored = session
                .combatant_mut(target)
                .map(|t| t.mp.restore(amount))
                .unwrap_or(0);
            session.record(
                ctx.now,
                LogDraft::new(
                    &name,
                    actor_type,
                    "restore_mana",
                    format!("{target_name} recovers {restored} MP"),
                ),
            );
        }
        ItemEffect::Buff { status, duration } => {
            let effect = StatusEffect::new(&item.name, status, duration).from_source(user);
            apply_status(session, &name, actor_type, target, effect, ctx.now);
        }
    }
}

fn defend(session: &mut CombatSession, actor: EntityId, now: DateTime<Utc>) {
    let Some(c) = session.combatant_mut(actor) else {
        return;
    };
    c.add_status(StatusEffect::defending().from_source(actor));
    let (name, actor_type) = who(session, actor);
    session.record(
        now,
        LogDraft::new(
            &name,
            actor_type,
            "defend",
            format!("{name} takes a defensive stance"),
        ),
    );
}

fn flee(session: &mut CombatSession, actor: EntityId, ctx: &mut ResolveContext<'_>) -> Option<Ending> {
    let (dex, side) = session
        .combatant(actor)
        .map(|c| (c.stats.dex_modifier, c.side))?;
    let (name, actor_type) = who(session, actor);

    let dc = ctx.flee_dc;
    let check = flee_check(ctx.dice(), dex, dc);
    if check.success {
        session.record(
            ctx.now,
            LogDraft::new(&name, actor_type, "flee", format!("{name} escapes!"))
                .with_roll(check.natural),
        );
        return Some(Ending::Fled(actor));
    }

    session.record(
        ctx.now,
        LogDraft::new(
            &name,
            actor_type,
            "flee",
            format!("{name} tries to flee but is cut off"),
        )
        .with_roll(check.natural),
    );
    let pursuer = session
        .living_on(side.opponent())
        .first()
        .map(|c| (c.entity_id, c.name.clone()));
    if let Some((pursuer, pursuer_name)) = pursuer {
        session.record(
            ctx.now,
            LogDraft::system(
                "free_attack",
                format!("{pursuer_name} strikes at the fleeing {name}"),
            ),
        );
        strike(session, pursuer, actor, ctx);
    }
    None
}

/// Apply damage after defenses and log it. Returns the damage taken.
fn deal_damage(
    session: &mut CombatSession,
    source: &str,
    source_type: ActorType,
    target: EntityId,
    raw: u32,
    now: DateTime<Utc>,
) -> u32 {
    let Some(t) = session.combatant_mut(target) else {
        return 0;
    };
    let taken = t.mitigate(raw);
    t.hp.reduce(taken);
    let name = t.name.clone();
    let down = !t.is_alive();
    let message = if taken < raw {
        format!("{name} braces and takes {taken} damage")
    } else {
        format!("{name} takes {taken} damage")
    };
    session.record(
        now,
        LogDraft::new(source, source_type, "damage", message).with_damage(taken),
    );
    if down {
        session.record(now, LogDraft::system("defeated", format!("{name} falls")));
    }
    taken
}

fn heal(
    session: &mut CombatSession,
    source: &str,
    source_type: ActorType,
    target: EntityId,
    amount: u32,
    now: DateTime<Utc>,
) -> u32 {
    let Some(t) = session.combatant_mut(target) else {
        return 0;
    };
    let healed = t.hp.restore(amount);
    let message = format!("{} recovers {healed} HP", t.name);
    session.record(
        now,
        LogDraft::new(source, source_type, "heal", message).with_healing(healed),
    );
    healed
}

fn apply_status(
    session: &mut CombatSession,
    source: &str,
    source_type: ActorType,
    target: EntityId,
    effect: StatusEffect,
    now: DateTime<Utc>,
) {
    let Some(t) = session.combatant_mut(target) else {
        return;
    };
    let message = format!(
        "{} is affected by {} ({}) for {} round(s)",
        t.name, effect.name, effect.kind, effect.duration
    );
    t.add_status(effect);
    session.record(
        now,
        LogDraft::new(source, source_type, "status", message),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{CombatStats, CombatantKind, CombatantSpec, Side};
    use crate::ids::SessionId;
    use crate::inventory::InMemoryInventory;
    use crate::status::StatusKind;
    use gr_mechanics::{DiceExpr, ScriptedDice};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn hero() -> CombatantSpec {
        CombatantSpec::new("Aria", CombatantKind::Player, 30)
            .with_mana(20, 10)
            .with_stats(CombatStats {
                armor_class: 14,
                attack_bonus: 5,
                damage: DiceExpr::new(1, 8, 3),
                dex_modifier: 2,
                save_modifier: 1,
            })
            .with_spell(Spell {
                id: "firebolt".into(),
                name: "Firebolt".into(),
                mp_cost: 4,
                effect: SpellEffect::Damage {
                    dice: DiceExpr::new(2, 6, 0),
                },
                delivery: SpellDelivery::Attack,
                cooldown: 2,
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
            .with_spell(Spell {
                id: "mend".into(),
                name: "Mend".into(),
                mp_cost: 3,
                effect: SpellEffect::Heal {
                    dice: DiceExpr::new(1, 4, 4),
                },
                delivery: SpellDelivery::Automatic,
                cooldown: 0,
            })
            .with_spell(Spell {
                id: "hex".into(),
                name: "Hex".into(),
                mp_cost: 2,
                effect: SpellEffect::Debuff {
                    status: StatusKind::Attack(-2),
                    duration: 2,
                },
                delivery: SpellDelivery::Save { dc: 13 },
                cooldown: 0,
            })
            .with_spell(Spell {
                id: "frost".into(),
                name: "Frost Nova".into(),
                mp_cost: 3,
                effect: SpellEffect::Damage {
                    dice: DiceExpr::new(2, 6, 0),
                },
                delivery: SpellDelivery::Save { dc: 13 },
                cooldown: 0,
            })
            .with_spell(Spell {
                id: "ward".into(),
                name: "Ward".into(),
                mp_cost: 2,
                effect: SpellEffect::Buff {
                    status: StatusKind::Armor(2),
                    duration: 2,
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
            .with_item(CombatItem {
                id: "firebomb".into(),
                name: "Firebomb".into(),
                effect: ItemEffect::Damage {
                    dice: DiceExpr::new(2, 4, 1),
                },
            })
            .with_item(CombatItem {
                id: "ether".into(),
                name: "Ether".into(),
                effect: ItemEffect::RestoreMana { amount: 8 },
            })
            .with_item(CombatItem {
                id: "tonic".into(),
                name: "Battle Tonic".into(),
                effect: ItemEffect::Buff {
                    status: StatusKind::Attack(2),
                    duration: 3,
                },
            })
    }

    fn actions(entries: &[crate::log::LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.action.as_str()).collect()
    }

    fn ghoul(hp: u32) -> CombatantSpec {
        CombatantSpec::new("Ghoul", CombatantKind::Enemy, hp).with_stats(CombatStats {
            armor_class: 12,
            attack_bonus: 3,
            damage: DiceExpr::new(1, 6, 1),
            dex_modifier: 0,
            save_modifier: 0,
        })
    }

    /// Aria always acts first (initiative 20 vs 1).
    fn pve(enemies: Vec<CombatantSpec>) -> CombatSession {
        let mut roster = vec![Combatant::from_spec(hero(), Side::Party)];
        roster.extend(
            enemies
                .into_iter()
                .map(|e| Combatant::from_spec(e, Side::Opposition)),
        );
        let mut rolls = vec![20];
        rolls.extend(std::iter::repeat_n(1, roster.len() - 1));
        let mut dice = ScriptedDice::new(rolls);
        CombatSession::start(SessionId::new(), CombatType::Pve, roster, None, &mut dice, now())
            .unwrap()
    }

    fn aria(s: &CombatSession) -> EntityId {
        s.players().next().unwrap().entity_id
    }

    fn first_enemy(s: &CombatSession) -> EntityId {
        s.living_on(Side::Opposition)[0].entity_id
    }

    #[test]
    fn attack_hit_deals_weapon_damage_and_logs_roll_then_damage() {
        let mut s = pve(vec![ghoul(20)]);
        let (hero, enemy) = (aria(&s), first_enemy(&s));
        let inv = InMemoryInventory::new();
        // d20 = 10 (+5 = 15 vs AC 12), 1d8 = 4 (+3)
        let mut dice = ScriptedDice::new([10, 4]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let before = s.log.len();
        perform(&mut s, hero, &ActionRequest::attack(), &mut ctx).unwrap();
        assert_eq!(s.combatant(enemy).unwrap().hp.current, 13);
        let new = s.log.since(before as u64);
        assert_eq!(new[0].action, "attack");
        assert_eq!(new[0].roll, Some(10));
        assert_eq!(new[1].action, "damage");
        assert_eq!(new[1].damage, Some(7));
    }

    #[test]
    fn natural_one_misses_whatever_the_bonus() {
        let mut s = pve(vec![ghoul(20)]);
        let (hero, enemy) = (aria(&s), first_enemy(&s));
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([1]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        perform(&mut s, hero, &ActionRequest::attack(), &mut ctx).unwrap();
        assert_eq!(s.combatant(enemy).unwrap().hp.current, 20);
    }

    #[test]
    fn critical_doubles_weapon_dice() {
        let mut s = pve(vec![ghoul(40)]);
        let (hero, enemy) = (aria(&s), first_enemy(&s));
        let inv = InMemoryInventory::new();
        // nat 20, then two d8s (4 + 4) + 3
        let mut dice = ScriptedDice::new([20, 4, 4]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        perform(&mut s, hero, &ActionRequest::attack(), &mut ctx).unwrap();
        assert_eq!(s.combatant(enemy).unwrap().hp.current, 29);
    }

    #[test]
    fn hitting_a_defender_halves_damage() {
        let mut s = pve(vec![ghoul(20)]);
        let (hero, enemy) = (aria(&s), first_enemy(&s));
        s.combatant_mut(enemy)
            .unwrap()
            .add_status(StatusEffect::defending());
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([15, 6]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        perform(&mut s, hero, &ActionRequest::attack(), &mut ctx).unwrap();
        // (6 + 3) / 2
        assert_eq!(s.combatant(enemy).unwrap().hp.current, 16);
    }

    #[test]
    fn out_of_turn_action_is_rejected_without_mutation() {
        let mut s = pve(vec![ghoul(20)]);
        let enemy = first_enemy(&s);
        let snapshot = s.clone();
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([20, 8]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let err = submit(&mut s, enemy, &ActionRequest::attack(), &mut ctx).unwrap_err();
        assert!(matches!(err, EngineError::NotYourTurn { .. }));
        assert_eq!(s, snapshot);
    }

    #[test]
    fn insufficient_mana_is_rejected_without_mutation() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        let snapshot = s.clone();
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let err = submit(&mut s, hero, &ActionRequest::cast("meteor"), &mut ctx).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientMana {
                cost: 20,
                available: 10,
                ..
            }
        ));
        assert_eq!(s, snapshot);
    }

    #[test]
    fn unknown_spell_and_missing_field_are_validation_errors() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let err = perform(&mut s, hero, &ActionRequest::cast("wish"), &mut ctx).unwrap_err();
        assert!(matches!(err, EngineError::UnknownSpell(_)));
        let bare = ActionRequest::new(ActionKind::CastSpell);
        let err = perform(&mut s, hero, &bare, &mut ctx).unwrap_err();
        assert!(matches!(err, EngineError::MissingField { field: "spellId", .. }));
    }

    #[test]
    fn spell_spends_mana_and_starts_cooldown() {
        let mut s = pve(vec![ghoul(30)]);
        let (hero, enemy) = (aria(&s), first_enemy(&s));
        let inv = InMemoryInventory::new();
        // to-hit 12 (+5 = 17 vs 12), damage 3 + 5
        let mut dice = ScriptedDice::new([12, 3, 5]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        perform(&mut s, hero, &ActionRequest::cast("firebolt"), &mut ctx).unwrap();
        let caster = s.combatant(hero).unwrap();
        assert_eq!(caster.mp.current, 6);
        assert_eq!(caster.cooldown("firebolt"), 2);
        assert_eq!(s.combatant(enemy).unwrap().hp.current, 22);

        let err = perform(&mut s, hero, &ActionRequest::cast("firebolt"), &mut ctx).unwrap_err();
        assert!(matches!(err, EngineError::SpellOnCooldown { rounds: 2, .. }));
    }

    #[test]
    fn heal_defaults_to_self_and_caps_at_max() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        s.combatant_mut(hero).unwrap().hp.current = 28;
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([4]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        perform(&mut s, hero, &ActionRequest::cast("mend"), &mut ctx).unwrap();
        assert_eq!(s.combatant(hero).unwrap().hp.current, 30);
        assert_eq!(s.log.entries().last().unwrap().healing, Some(2));
    }

    #[test]
    fn heal_cannot_target_an_enemy() {
        let mut s = pve(vec![ghoul(20)]);
        let (hero, enemy) = (aria(&s), first_enemy(&s));
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let err = perform(&mut s, hero, &ActionRequest::cast("mend").at(enemy), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTarget(_)));
    }

    #[test]
    fn successful_save_negates_debuff() {
        let mut s = pve(vec![ghoul(20)]);
        let (hero, enemy) = (aria(&s), first_enemy(&s));
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([15]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        perform(&mut s, hero, &ActionRequest::cast("hex"), &mut ctx).unwrap();
        assert!(s.combatant(enemy).unwrap().status_effects.is_empty());

        let mut dice = ScriptedDice::new([3]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        perform(&mut s, hero, &ActionRequest::cast("hex"), &mut ctx).unwrap();
        assert_eq!(s.combatant(enemy).unwrap().attack_bonus(), 1);
    }

    #[test]
    fn item_use_is_recorded_for_commit_and_checks_stock() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        s.combatant_mut(hero).unwrap().hp.current = 10;
        let inv = InMemoryInventory::new();
        inv.set_quantity(hero, "potion", 1);
        let mut dice = ScriptedDice::new([3, 3]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        perform(&mut s, hero, &ActionRequest::use_item("potion"), &mut ctx).unwrap();
        assert_eq!(s.combatant(hero).unwrap().hp.current, 18);
        assert_eq!(ctx.consumed(), &[(hero, "potion".to_string())]);
        // the inventory itself is untouched until commit
        assert_eq!(inv.quantity(hero, "potion"), 1);

        let err = perform(&mut s, hero, &ActionRequest::use_item("potion"), &mut ctx).unwrap_err();
        assert!(matches!(err, EngineError::ItemDepleted(_)));
    }

    #[test]
    fn flee_success_ends_the_fight() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([9]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let ending = submit(&mut s, hero, &ActionRequest::flee(), &mut ctx).unwrap();
        assert_eq!(ending, Some(Ending::Fled(hero)));
    }

    #[test]
    fn failed_flee_draws_a_free_attack() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        let inv = InMemoryInventory::new();
        // flee 2 + 2 < 10, free attack 15 + 3 vs 14 hits for 5 + 1
        let mut dice = ScriptedDice::new([2, 15, 5]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let ending = perform(&mut s, hero, &ActionRequest::flee(), &mut ctx).unwrap();
        assert_eq!(ending, None);
        assert_eq!(s.combatant(hero).unwrap().hp.current, 24);
        assert!(s.log.entries().iter().any(|e| e.action == "free_attack"));
    }

    #[test]
    fn flee_rolls_against_the_configured_difficulty() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        let inv = InMemoryInventory::new();
        // 12 + 2 = 14 falls short of DC 15; the ghoul's free attack misses on a 1
        let mut dice = ScriptedDice::new([12, 1]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 15);
        assert_eq!(perform(&mut s, hero, &ActionRequest::flee(), &mut ctx).unwrap(), None);

        let mut dice = ScriptedDice::new([12]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 14);
        assert_eq!(
            perform(&mut s, hero, &ActionRequest::flee(), &mut ctx).unwrap(),
            Some(Ending::Fled(hero))
        );
    }

    #[test]
    fn killing_the_last_enemy_finishes_before_the_turn_moves() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        let inv = InMemoryInventory::new();
        s.combatant_mut(hero).unwrap().stats.damage = DiceExpr::flat(25);
        let mut dice = ScriptedDice::new([15]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let ending = submit(&mut s, hero, &ActionRequest::attack(), &mut ctx).unwrap();
        assert_eq!(ending, Some(Ending::PartyWon));
        assert_eq!(s.current_turn_entity_id, hero);
        assert_eq!(s.round, 1);
    }

    #[test]
    fn enemy_turns_run_inline_until_the_player_is_up() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        let inv = InMemoryInventory::new();
        // Aria defends; the ghoul attacks (18 + 3 hits) for 5 + 1, halved to 3
        let mut dice = ScriptedDice::new([18, 5]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let ending = submit(&mut s, hero, &ActionRequest::defend(), &mut ctx).unwrap();
        assert_eq!(ending, None);
        assert_eq!(s.current_turn_entity_id, hero);
        assert_eq!(s.round, 2);
        let h = s.combatant(hero).unwrap();
        assert_eq!(h.hp.current, 27);
        // Defending is cleared as Aria's new turn begins
        assert!(!h.is_defending());
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        s.version = 3;
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let err = submit(&mut s, hero, &ActionRequest::defend().expecting(2), &mut ctx)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ConcurrencyConflict {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn attack_on_own_side_is_invalid() {
        let mut s = pve(vec![ghoul(20), ghoul(10)]);
        let hero = aria(&s);
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let err = perform(&mut s, hero, &ActionRequest::attack().at(hero), &mut ctx).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTarget(_)));
    }

    #[test]
    fn save_spell_halves_damage_when_resisted() {
        let mut s = pve(vec![ghoul(20)]);
        let (hero, enemy) = (aria(&s), first_enemy(&s));
        let inv = InMemoryInventory::new();
        // save 15 vs DC 13 resists, 2d6 = 6 + 5 halved to 5
        let mut dice = ScriptedDice::new([15, 6, 5]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let before = s.log.len();
        perform(&mut s, hero, &ActionRequest::cast("frost"), &mut ctx).unwrap();
        assert_eq!(s.combatant(enemy).unwrap().hp.current, 15);
        assert_eq!(s.combatant(hero).unwrap().mp.current, 7);
        let new = s.log.since(before as u64);
        assert_eq!(actions(new), vec!["cast_spell", "save", "damage"]);
        assert_eq!(new[1].actor, "Ghoul");
        assert_eq!(new[1].roll, Some(15));
        assert_eq!(new[2].damage, Some(5));
    }

    #[test]
    fn save_spell_deals_full_damage_on_a_failed_save() {
        let mut s = pve(vec![ghoul(20)]);
        let (hero, enemy) = (aria(&s), first_enemy(&s));
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new([3, 4, 4]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let before = s.log.len();
        perform(&mut s, hero, &ActionRequest::cast("frost"), &mut ctx).unwrap();
        assert_eq!(s.combatant(enemy).unwrap().hp.current, 12);
        let new = s.log.since(before as u64);
        assert!(new[1].message.contains("fails"));
        assert_eq!(new[2].damage, Some(8));
    }

    #[test]
    fn buff_spell_lands_on_the_caster_without_a_roll() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        let inv = InMemoryInventory::new();
        let mut dice = ScriptedDice::new(Vec::new());
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let before = s.log.len();
        perform(&mut s, hero, &ActionRequest::cast("ward"), &mut ctx).unwrap();
        let caster = s.combatant(hero).unwrap();
        assert_eq!(caster.mp.current, 8);
        assert_eq!(caster.armor_class(), 16);
        assert_eq!(caster.status_effects[0].source, Some(hero));
        let new = s.log.since(before as u64);
        assert_eq!(actions(new), vec!["cast_spell", "status"]);
        assert!(new[1].message.contains("Ward"));
    }

    #[test]
    fn damage_item_hits_the_first_opponent_without_a_roll() {
        let mut s = pve(vec![ghoul(20)]);
        let (hero, enemy) = (aria(&s), first_enemy(&s));
        let inv = InMemoryInventory::new();
        inv.set_quantity(hero, "firebomb", 1);
        // 2d4 = 3 + 2, +1
        let mut dice = ScriptedDice::new([3, 2]);
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let before = s.log.len();
        perform(&mut s, hero, &ActionRequest::use_item("firebomb"), &mut ctx).unwrap();
        assert_eq!(s.combatant(enemy).unwrap().hp.current, 14);
        assert_eq!(ctx.consumed(), &[(hero, "firebomb".to_string())]);
        let new = s.log.since(before as u64);
        assert_eq!(actions(new), vec!["use_item", "damage"]);
        assert!(new[0].message.contains("on Ghoul"));
        assert_eq!(new[1].damage, Some(6));
    }

    #[test]
    fn mana_item_restores_up_to_the_cap() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        s.combatant_mut(hero).unwrap().mp.current = 15;
        let inv = InMemoryInventory::new();
        inv.set_quantity(hero, "ether", 1);
        let mut dice = ScriptedDice::new(Vec::new());
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let before = s.log.len();
        perform(&mut s, hero, &ActionRequest::use_item("ether"), &mut ctx).unwrap();
        assert_eq!(s.combatant(hero).unwrap().mp.current, 20);
        let new = s.log.since(before as u64);
        assert_eq!(actions(new), vec!["use_item", "restore_mana"]);
        assert_eq!(new[1].message, "Aria recovers 5 MP");
    }

    #[test]
    fn buff_item_raises_attack_bonus() {
        let mut s = pve(vec![ghoul(20)]);
        let hero = aria(&s);
        let inv = InMemoryInventory::new();
        inv.set_quantity(hero, "tonic", 2);
        let mut dice = ScriptedDice::new(Vec::new());
        let mut ctx = ResolveContext::new(&mut dice, &inv, now(), 10);
        let before = s.log.len();
        perform(&mut s, hero, &ActionRequest::use_item("tonic"), &mut ctx).unwrap();
        let user = s.combatant(hero).unwrap();
        assert_eq!(user.attack_bonus(), 7);
        assert_eq!(user.status_effects[0].kind, StatusKind::Attack(2));
        assert_eq!(user.status_effects[0].duration, 3);
        let new = s.log.since(before as u64);
        assert_eq!(actions(new), vec!["use_item", "status"]);
    }
}
