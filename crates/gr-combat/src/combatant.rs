//! Combatants and the roster snapshots they are built from.

use std::collections::BTreeMap;

use gr_mechanics::{DiceExpr, Track};
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;
use crate::log::ActorType;
use crate::status::{StatusEffect, StatusKind};

/// Who controls a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatantKind {
    /// A human-controlled character.
    Player,
    /// A monster, driven by the AI.
    Enemy,
    /// A summon or companion fighting for the party, driven by the AI.
    Ally,
}

impl std::fmt::Display for CombatantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Player => write!(f, "player"),
            Self::Enemy => write!(f, "enemy"),
            Self::Ally => write!(f, "ally"),
        }
    }
}

/// Which side of the fight a combatant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Players and their allies (PvE), or the challenger (PvP).
    Party,
    /// Enemies (PvE), or the challenged player (PvP).
    Opposition,
}

impl Side {
    /// The other side.
    pub fn opponent(self) -> Self {
        match self {
            Self::Party => Self::Opposition,
            Self::Opposition => Self::Party,
        }
    }
}

/// Fixed combat numbers from the character sheet or enemy template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CombatStats {
    /// Base armor class.
    pub armor_class: i32,
    /// Bonus added to weapon and spell attack rolls.
    pub attack_bonus: i32,
    /// Weapon (or unarmed) damage.
    pub damage: DiceExpr,
    /// DEX modifier, used for initiative and fleeing.
    pub dex_modifier: i32,
    /// Bonus on saving throws.
    pub save_modifier: i32,
}

impl Default for CombatStats {
    fn default() -> Self {
        Self {
            armor_class: 10,
            attack_bonus: 0,
            damage: DiceExpr::new(1, 4, 0),
            dex_modifier: 0,
            save_modifier: 0,
        }
    }
}

/// How a damaging or hindering spell reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpellDelivery {
    /// Roll to hit against armor class, like a weapon. Natural 20 crits.
    Attack,
    /// Always lands.
    Automatic,
    /// The target rolls a saving throw: damage is halved and debuffs are
    /// shrugged off on a success.
    Save {
        /// Difficulty class of the save.
        dc: i32,
    },
}

/// What a spell does once it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpellEffect {
    /// Deal damage to an opponent.
    Damage {
        /// Damage dice.
        dice: DiceExpr,
    },
    /// Restore HP to an ally (or self).
    Heal {
        /// Healing dice.
        dice: DiceExpr,
    },
    /// Attach a beneficial status to an ally (or self).
    Buff {
        /// The status to attach.
        status: StatusKind,
        /// Rounds it lasts.
        duration: u32,
    },
    /// Attach a harmful status to an opponent.
    Debuff {
        /// The status to attach.
        status: StatusKind,
        /// Rounds it lasts.
        duration: u32,
    },
}

impl SpellEffect {
    /// Whether the effect is aimed at the other side.
    pub fn is_hostile(&self) -> bool {
        matches!(self, Self::Damage { .. } | Self::Debuff { .. })
    }
}

/// A spell a combatant knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spell {
    /// Stable identifier used in action requests.
    pub id: String,
    /// Display name.
    pub name: String,
    /// MP spent on casting.
    pub mp_cost: u32,
    /// What it does.
    pub effect: SpellEffect,
    /// How it reaches a hostile target. Ignored for friendly spells.
    #[serde(default = "default_delivery")]
    pub delivery: SpellDelivery,
    /// Rounds before it can be cast again (0 = no cooldown).
    #[serde(default)]
    pub cooldown: u32,
}

fn default_delivery() -> SpellDelivery {
    SpellDelivery::Automatic
}

/// What an item does when used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemEffect {
    /// Restore HP.
    Heal {
        /// Healing dice.
        dice: DiceExpr,
    },
    /// Damage an opponent. Thrown items never miss.
    Damage {
        /// Damage dice.
        dice: DiceExpr,
    },
    /// Restore MP.
    RestoreMana {
        /// MP restored.
        amount: u32,
    },
    /// Attach a beneficial status.
    Buff {
        /// The status to attach.
        status: StatusKind,
        /// Rounds it lasts.
        duration: u32,
    },
}

impl ItemEffect {
    /// Whether the effect is aimed at the other side.
    pub fn is_hostile(&self) -> bool {
        matches!(self, Self::Damage { .. })
    }
}

/// An item a combatant carries. Quantity lives in the inventory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatItem {
    /// Stable identifier used in action requests and the inventory.
    pub id: String,
    /// Display name.
    pub name: String,
    /// What using it does.
    pub effect: ItemEffect,
}

/// Loot rarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    /// Common.
    Common,
    /// Uncommon.
    Uncommon,
    /// Rare.
    Rare,
    /// Epic.
    Epic,
    /// Legendary.
    Legendary,
}

/// One line of an enemy's drop table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropEntry {
    /// Item name.
    pub name: String,
    /// How many drop.
    pub quantity: u32,
    /// Rarity.
    pub rarity: Rarity,
    /// Drop chance in percent (1-100), rolled on a d100.
    pub chance: u32,
}

/// What defeating an enemy is worth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RewardTable {
    /// Experience awarded.
    pub xp: u64,
    /// Gold awarded.
    pub gold: u64,
    /// Independent drop chances.
    pub drops: Vec<DropEntry>,
}

/// A roster snapshot: everything needed to put one participant into a
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatantSpec {
    /// Character id. Enemies and summons without one get a fresh id.
    #[serde(default)]
    pub entity_id: Option<EntityId>,
    /// Display name.
    pub name: String,
    /// Who controls it.
    #[serde(rename = "type")]
    pub kind: CombatantKind,
    /// Maximum HP.
    pub max_hp: u32,
    /// Starting HP (defaults to max).
    #[serde(default)]
    pub hp: Option<u32>,
    /// Maximum MP.
    #[serde(default)]
    pub max_mp: u32,
    /// Starting MP (defaults to max).
    #[serde(default)]
    pub mp: Option<u32>,
    /// Combat numbers.
    #[serde(default)]
    pub stats: CombatStats,
    /// Known spells.
    #[serde(default)]
    pub spells: Vec<Spell>,
    /// Carried items.
    #[serde(default)]
    pub items: Vec<CombatItem>,
    /// Rewards for defeating it (enemies).
    #[serde(default)]
    pub rewards: Option<RewardTable>,
}

impl CombatantSpec {
    /// A bare spec with default stats.
    pub fn new(name: impl Into<String>, kind: CombatantKind, max_hp: u32) -> Self {
        Self {
            entity_id: None,
            name: name.into(),
            kind,
            max_hp,
            hp: None,
            max_mp: 0,
            mp: None,
            stats: CombatStats::default(),
            spells: Vec::new(),
            items: Vec::new(),
            rewards: None,
        }
    }

    /// Set the entity id.
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.entity_id = Some(id);
        self
    }

    /// Set current HP.
    pub fn with_hp(mut self, hp: u32) -> Self {
        self.hp = Some(hp);
        self
    }

    /// Set maximum and current MP.
    pub fn with_mana(mut self, max_mp: u32, mp: u32) -> Self {
        self.max_mp = max_mp;
        self.mp = Some(mp);
        self
    }

    /// Set the combat numbers.
    pub fn with_stats(mut self, stats: CombatStats) -> Self {
        self.stats = stats;
        self
    }

    /// Teach a spell.
    pub fn with_spell(mut self, spell: Spell) -> Self {
        self.spells.push(spell);
        self
    }

    /// Carry an item.
    pub fn with_item(mut self, item: CombatItem) -> Self {
        self.items.push(item);
        self
    }

    /// Set the reward table.
    pub fn with_rewards(mut self, rewards: RewardTable) -> Self {
        self.rewards = Some(rewards);
        self
    }

    /// The side this kind of combatant fights on in PvE.
    pub fn default_side(&self) -> Side {
        match self.kind {
            CombatantKind::Player | CombatantKind::Ally => Side::Party,
            CombatantKind::Enemy => Side::Opposition,
        }
    }
}

/// A participant in a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combatant {
    /// Identifier.
    pub entity_id: EntityId,
    /// Display name.
    pub name: String,
    /// Who controls it.
    #[serde(rename = "type")]
    pub kind: CombatantKind,
    /// Which side it fights on.
    pub side: Side,
    /// Hit points.
    pub hp: Track,
    /// Mana points.
    pub mp: Track,
    /// Initiative, fixed once rolled.
    pub initiative: i32,
    /// Combat numbers.
    pub stats: CombatStats,
    /// Known spells.
    pub spells: Vec<Spell>,
    /// Carried items.
    pub items: Vec<CombatItem>,
    /// Rewards for defeating it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewards: Option<RewardTable>,
    /// Active status effects.
    pub status_effects: Vec<StatusEffect>,
    /// Remaining cooldown rounds by spell id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cooldowns: BTreeMap<String, u32>,
}

impl Combatant {
    /// Build a combatant from a roster snapshot. Initiative is rolled later.
    pub fn from_spec(spec: CombatantSpec, side: Side) -> Self {
        let hp = Track::with_current(spec.hp.unwrap_or(spec.max_hp), spec.max_hp);
        let mp = Track::with_current(spec.mp.unwrap_or(spec.max_mp), spec.max_mp);
        Self {
            entity_id: spec.entity_id.unwrap_or_default(),
            name: spec.name,
            kind: spec.kind,
            side,
            hp,
            mp,
            initiative: 0,
            stats: spec.stats,
            spells: spec.spells,
            items: spec.items,
            rewards: spec.rewards,
            status_effects: Vec::new(),
            cooldowns: BTreeMap::new(),
        }
    }

    /// Whether the combatant is still standing.
    pub fn is_alive(&self) -> bool {
        !self.hp.is_empty()
    }

    /// Whether a human submits this combatant's actions.
    pub fn is_player(&self) -> bool {
        self.kind == CombatantKind::Player
    }

    /// How this combatant appears in the log.
    pub fn actor_type(&self) -> ActorType {
        match self.kind {
            CombatantKind::Player | CombatantKind::Ally => ActorType::Player,
            CombatantKind::Enemy => ActorType::Enemy,
        }
    }

    /// Attack bonus including status effects.
    pub fn attack_bonus(&self) -> i32 {
        self.stats.attack_bonus
            + self
                .status_effects
                .iter()
                .map(|e| match e.kind {
                    StatusKind::Attack(n) => n,
                    _ => 0,
                })
                .sum::<i32>()
    }

    /// Armor class including status effects.
    pub fn armor_class(&self) -> i32 {
        self.stats.armor_class
            + self
                .status_effects
                .iter()
                .map(|e| match e.kind {
                    StatusKind::Armor(n) => n,
                    _ => 0,
                })
                .sum::<i32>()
    }

    /// Whether a Defending effect is active.
    pub fn is_defending(&self) -> bool {
        self.status_effects
            .iter()
            .any(|e| e.kind == StatusKind::Defending)
    }

    /// Damage actually taken from a hit of `raw` after defenses.
    pub fn mitigate(&self, raw: u32) -> u32 {
        if self.is_defending() { raw / 2 } else { raw }
    }

    /// Look up a known spell.
    pub fn spell(&self, id: &str) -> Option<&Spell> {
        self.spells.iter().find(|s| s.id == id)
    }

    /// Look up a carried item.
    pub fn item(&self, id: &str) -> Option<&CombatItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Rounds left before `spell_id` can be cast again.
    pub fn cooldown(&self, spell_id: &str) -> u32 {
        self.cooldowns.get(spell_id).copied().unwrap_or(0)
    }

    /// Attach a status effect. A second effect with the same name replaces
    /// the first rather than stacking.
    pub fn add_status(&mut self, effect: StatusEffect) {
        self.status_effects.retain(|e| e.name != effect.name);
        self.status_effects.push(effect);
    }
}
