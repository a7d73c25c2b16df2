use gr_combat::{
    CombatItem, CombatStats, CombatantKind, CombatantSpec, DropEntry, ItemEffect, Rarity,
    RewardTable, Spell, SpellDelivery, SpellEffect,
};
use gr_mechanics::DiceExpr;
use miette::IntoDiagnostic;

pub fn run(duelist: bool) -> miette::Result<()> {
    let json = if duelist {
        serde_json::to_string_pretty(&duelists().0)
    } else {
        serde_json::to_string_pretty(&roster())
    }
    .into_diagnostic()?;
    println!("{json}");
    Ok(())
}

fn mage(name: &str) -> CombatantSpec {
    CombatantSpec::new(name, CombatantKind::Player, 28)
        .with_mana(20, 20)
        .with_stats(CombatStats {
            armor_class: 13,
            attack_bonus: 4,
            damage: DiceExpr::new(1, 6, 2),
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
            cooldown: 1,
        })
        .with_spell(Spell {
            id: "mend".into(),
            name: "Mend".into(),
            mp_cost: 3,
            effect: SpellEffect::Heal {
                dice: DiceExpr::new(1, 8, 2),
            },
            delivery: SpellDelivery::Automatic,
            cooldown: 0,
        })
        .with_item(CombatItem {
            id: "healing_potion".into(),
            name: "Healing Potion".into(),
            effect: ItemEffect::Heal {
                dice: DiceExpr::new(2, 4, 2),
            },
        })
}

fn ghoul(name: &str) -> CombatantSpec {
    CombatantSpec::new(name, CombatantKind::Enemy, 16)
        .with_stats(CombatStats {
            armor_class: 12,
            attack_bonus: 3,
            damage: DiceExpr::new(1, 6, 1),
            dex_modifier: 1,
            save_modifier: 0,
        })
        .with_rewards(RewardTable {
            xp: 40,
            gold: 9,
            drops: vec![DropEntry {
                name: "Ghoul Claw".into(),
                quantity: 1,
                rarity: Rarity::Common,
                chance: 60,
            }],
        })
}

/// A mage and a hired sword against two ghouls.
pub fn roster() -> Vec<CombatantSpec> {
    let sword = CombatantSpec::new("Hired Sword", CombatantKind::Ally, 24).with_stats(CombatStats {
        armor_class: 15,
        attack_bonus: 4,
        damage: DiceExpr::new(1, 8, 2),
        dex_modifier: 0,
        save_modifier: 0,
    });
    vec![mage("Aria"), sword, ghoul("Ghoul"), ghoul("Ghoul Brute")]
}

/// Two evenly matched duelists.
pub fn duelists() -> (CombatantSpec, CombatantSpec) {
    let brann = CombatantSpec::new("Brann", CombatantKind::Player, 34).with_stats(CombatStats {
        armor_class: 15,
        attack_bonus: 5,
        damage: DiceExpr::new(1, 10, 3),
        dex_modifier: 0,
        save_modifier: 2,
    });
    (mage("Aria"), brann)
}
