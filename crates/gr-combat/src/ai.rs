//! Turn logic for enemies and allies.
//!
//! The AI only picks an [`ActionRequest`]; the request goes through the same
//! validation as a player's. Choices are deterministic given the session.

use tracing::{debug, warn};

use crate::action::ActionRequest;
use crate::combatant::{Combatant, SpellEffect};
use crate::ids::EntityId;
use crate::log::LogDraft;
use crate::resolver::{self, ResolveContext};
use crate::session::CombatSession;
use crate::turn::Ending;

/// HP fraction below which a combatant tries to heal itself.
pub const HEAL_THRESHOLD: f64 = 0.35;

fn castable(c: &Combatant, spell_id: &str, mp_cost: u32) -> bool {
    c.mp.current >= mp_cost && c.cooldown(spell_id) == 0
}

/// Pick an action for `id`.
///
/// In order of preference: heal itself when badly hurt, blast the weakest
/// opponent with a damage spell, or hit the weakest opponent with its weapon.
pub fn choose(session: &CombatSession, id: EntityId) -> ActionRequest {
    let Some(me) = session.combatant(id) else {
        return ActionRequest::attack();
    };

    if me.hp.fraction() < HEAL_THRESHOLD {
        let heal = me.spells.iter().find(|s| {
            matches!(s.effect, SpellEffect::Heal { .. }) && castable(me, &s.id, s.mp_cost)
        });
        if let Some(spell) = heal {
            return ActionRequest::cast(&spell.id);
        }
    }

    let weakest = session
        .living_on(me.side.opponent())
        .into_iter()
        .min_by_key(|c| c.hp.current)
        .map(|c| c.entity_id);
    let Some(target) = weakest else {
        return ActionRequest::attack();
    };

    let blast = me.spells.iter().find(|s| {
        matches!(s.effect, SpellEffect::Damage { .. }) && castable(me, &s.id, s.mp_cost)
    });
    match blast {
        Some(spell) => ActionRequest::cast(&spell.id).at(target),
        None => ActionRequest::attack().at(target),
    }
}

/// Choose and resolve a turn for `id`.
pub fn take_turn(
    session: &mut CombatSession,
    id: EntityId,
    ctx: &mut ResolveContext<'_>,
) -> Option<Ending> {
    let request = choose(session, id);
    act_or_fallback(session, id, &request, ctx)
}

/// Resolve `request`, falling back to a plain attack and then to passing.
/// AI mistakes are never surfaced to players.
pub(crate) fn act_or_fallback(
    session: &mut CombatSession,
    id: EntityId,
    request: &ActionRequest,
    ctx: &mut ResolveContext<'_>,
) -> Option<Ending> {
    debug!(session = %session.id, actor = %id, action = %request.action, "AI decision");
    let err = match resolver::perform(session, id, request, ctx) {
        Ok(ending) => return ending,
        Err(err) => err,
    };
    warn!(session = %session.id, actor = %id, error = %err, "AI action rejected, falling back to attack");

    let err = match resolver::perform(session, id, &ActionRequest::attack(), ctx) {
        Ok(ending) => return ending,
        Err(err) => err,
    };
    warn!(session = %session.id, actor = %id, error = %err, "AI fallback failed, passing turn");

    let (name, actor_type) = session
        .combatant(id)
        .map(|c| (c.name.clone(), c.actor_type()))
        .unwrap_or_else(|| (id.to_string(), crate::log::ActorType::System));
    session.record(
        ctx.now(),
        LogDraft::new(&name, actor_type, "pass", format!("{name} hesitates")),
    );
    None
}
