use serde_json::json;

use crate::{
    database::db_structs::CategoryWinner,
    model::{
        constants::ECHAPPEE_REWARD_COINS,
        effects::{CoinReason, Effect, NotificationKind},
        recompute::UserOutcome,
        structures::category::Category
    }
};

/// Picks the week's Échappée winners from the recomputed population.
///
/// For the overall rating and each stat the highest value wins; on a tie the
/// user seen first keeps the title. Progression goes to the largest strictly
/// positive overall delta and is skipped when nobody improved.
pub fn select_winners(outcomes: &[UserOutcome], week_label: &str) -> Vec<CategoryWinner> {
    let mut winners = Vec::new();

    for category in Category::ranked() {
        if let Some((user_id, value)) = best(outcomes, |o| Some(category_value(o, category))) {
            winners.push(CategoryWinner {
                week_label: week_label.to_string(),
                category,
                user_id,
                value
            });
        }
    }

    let progression = best(outcomes, |o| {
        let delta = o.ovr_delta();
        (delta > 0).then_some(delta)
    });

    if let Some((user_id, value)) = progression {
        winners.push(CategoryWinner {
            week_label: week_label.to_string(),
            category: Category::Progression,
            user_id,
            value
        });
    }

    winners
}

/// Coin reward and feed notification for every rewarded category.
pub fn winner_effects(winners: &[CategoryWinner]) -> Vec<Effect> {
    winners
        .iter()
        .filter(|w| w.category.is_rewarded())
        .flat_map(|w| {
            [
                Effect::Coins {
                    user_id: w.user_id,
                    amount: ECHAPPEE_REWARD_COINS,
                    reason: CoinReason::Echappee,
                    metadata: json!({ "category": w.category, "value": w.value, "week": w.week_label }),
                    idempotency_key: format!("echappee:{}:{}", w.week_label, w.category)
                },
                Effect::Notify {
                    user_id: w.user_id,
                    kind: NotificationKind::EchappeeWinner,
                    payload: json!({ "category": w.category, "value": w.value, "week": w.week_label })
                }
            ]
        })
        .collect()
}

fn category_value(outcome: &UserOutcome, category: Category) -> i32 {
    match category {
        Category::Overall => outcome.profile.ovr,
        Category::Stat(stat) => outcome.profile.stats.get(stat),
        Category::Progression => outcome.ovr_delta()
    }
}

/// First-seen maximum; only a strictly greater value replaces the leader.
fn best(outcomes: &[UserOutcome], value: impl Fn(&UserOutcome) -> Option<i32>) -> Option<(i32, i32)> {
    let mut leader: Option<(i32, i32)> = None;

    for outcome in outcomes {
        let Some(v) = value(outcome) else { continue };

        match leader {
            Some((_, best)) if v <= best => {}
            _ => leader = Some((outcome.user_id(), v))
        }
    }

    leader
}
