use colored::Colorize;
use gr_mechanics::{DiceExpr, QualityBonuses, QualityTier, quality_roll};
use miette::IntoDiagnostic;

pub fn run(expr: &str, crit: bool, seed: Option<u64>) -> miette::Result<()> {
    let expr: DiceExpr = expr.parse().into_diagnostic()?;
    let mut dice = super::dice(seed);
    let roll = expr.roll(&mut dice, crit);

    let faces = roll
        .dice
        .values()
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let modifier = match roll.modifier {
        0 => String::new(),
        m => format!(" {m:+}"),
    };
    let label = if crit {
        format!("{expr} {}", "(critical)".yellow())
    } else {
        expr.to_string()
    };
    println!("  {label}  [{faces}]{modifier} = {}", roll.total.to_string().bold());
    Ok(())
}

pub fn quality(bonuses: &QualityBonuses, seed: Option<u64>) -> miette::Result<()> {
    let mut dice = super::dice(seed);
    let roll = quality_roll(&mut dice, bonuses);
    let tier = match roll.tier {
        QualityTier::Poor => roll.tier.to_string().red(),
        QualityTier::Common => roll.tier.to_string().normal(),
        QualityTier::Fine => roll.tier.to_string().green(),
        QualityTier::Superior => roll.tier.to_string().cyan(),
        QualityTier::Masterwork => roll.tier.to_string().magenta(),
        QualityTier::Legendary => roll.tier.to_string().yellow().bold(),
    };
    println!(
        "  d20 {} {:+} = {}  Tier: {tier}",
        roll.natural, roll.bonus, roll.total
    );
    Ok(())
}
