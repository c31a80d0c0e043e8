use serde_json::json;

use crate::{
    database::db_structs::{LeaderboardSnapshot, PerformanceProfile, WeeklyHistoryRecord},
    model::{
        aggregator::{AggregatedInputs, UserInputs, WeeklyTotals},
        constants::{COINS_PER_KM, IN_FORM_OVR_DELTA, IN_FORM_PODIUMS, SEASON_POINTS_PER_KM, STAT_MAX, STAT_MIN},
        decay::decay,
        effects::{CoinReason, Effect, NotificationKind},
        race_bonus::{capped_race_boost, RaceBonus},
        stats_engine::StatsEngine,
        streak::{is_milestone, next_streak, streak_bonus},
        structures::{period_type::PeriodType, six_stats::SixStats, special_card::SpecialCard, tier::Tier},
        week::WeekWindow
    },
    utils::progress_utils::progress_bar
};

/// The pure collaborators and time coordinates shared by every user in a run.
pub struct RecomputeContext<'a> {
    pub window: &'a WeekWindow,
    pub stats_engine: &'a dyn StatsEngine,
    pub race_bonus: &'a dyn RaceBonus
}

/// Everything one user's recompute produces. Nothing here has been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct UserOutcome {
    pub profile: PerformanceProfile,
    /// Pre-recompute values under the closing week's label
    pub closing: WeeklyHistoryRecord,
    /// Post-recompute values under the opening week's label
    pub opening: WeeklyHistoryRecord,
    pub weekly: LeaderboardSnapshot,
    pub effects: Vec<Effect>,
    pub active: bool,
    pub decayed: bool
}

impl UserOutcome {
    pub fn user_id(&self) -> i32 {
        self.profile.user_id
    }

    pub fn ovr_delta(&self) -> i32 {
        self.profile.ovr - self.profile.prev_ovr
    }
}

/// Stats together with the values derived from them.
#[derive(Debug, Clone, Copy)]
struct Rated {
    stats: SixStats,
    /// This run's capped race bonus, carried through every re-derivation
    ovr_bonus: i32,
    ovr: i32,
    tier: Tier
}

impl Rated {
    fn new(engine: &dyn StatsEngine, stats: SixStats, ovr_bonus: i32) -> Rated {
        let stats = stats.clamped();
        let ovr = (engine.compute_ovr(&stats) + ovr_bonus).clamp(STAT_MIN, STAT_MAX);

        Rated {
            stats,
            ovr_bonus,
            ovr,
            tier: engine.tier(ovr)
        }
    }

    fn with_stats(self, engine: &dyn StatsEngine, stats: SixStats) -> Rated {
        Rated::new(engine, stats, self.ovr_bonus)
    }
}

/// # Weekly recompute
///
/// A pure function of the current card and the user's aggregated inputs.
///
/// Steps:
/// 1. The user is active if they rode at least once in the trailing week.
///     Active users earn coins and season points proportional to distance.
/// 2. With cached rides, the card is recomputed from scratch; without, it carries over.
/// 3. Race bonuses are summed, capped, and applied to resistance and the overall rating.
/// 4. Inventory boosts are added to their stats, which are then clamped at 99.
/// 5. Special card eligibility is decided from the overall delta and career podiums.
/// 6. Inactive users decay, unless they already decayed four weeks in a row.
/// 7. The streak advances, possibly earning a bonus and a milestone notification.
///
/// The tier is re-derived after every step that touches a stat.
pub fn recompute_user(current: &PerformanceProfile, inputs: UserInputs<'_>, ctx: &RecomputeContext<'_>) -> UserOutcome {
    let engine = ctx.stats_engine;
    let window = ctx.window;
    let user_id = current.user_id;
    let active = inputs.weekly.rides > 0;
    let mut effects = Vec::new();

    if active {
        effects.extend(activity_rewards(user_id, &inputs.weekly, window));
    }

    let base = if inputs.activities.is_empty() {
        current.stats
    } else {
        engine.compute_stats(inputs.activities)
    };
    let mut rated = Rated::new(engine, base, 0);

    let race = capped_race_boost(ctx.race_bonus, inputs.races);
    if race.resistance > 0 || race.overall > 0 {
        let mut stats = rated.stats;
        stats.resistance += race.resistance;
        rated = Rated::new(engine, stats, race.overall);
    }

    if !inputs.boosts.is_empty() {
        let mut stats = rated.stats;
        for boost in inputs.boosts {
            *stats.get_mut(boost.stat) += boost.amount;
        }
        rated = rated.with_stats(engine, stats);
    }

    let in_form = rated.ovr - current.ovr >= IN_FORM_OVR_DELTA || inputs.podiums >= IN_FORM_PODIUMS;
    let special_card = in_form.then_some(SpecialCard::InForm);

    let mut decayed = false;
    if !active {
        if let Some(stats) = decay(&rated.stats, current.streak) {
            rated = rated.with_stats(engine, stats);
            decayed = true;
        }
    }

    let streak = next_streak(current.streak, active);
    if let Some(coins) = streak_bonus(streak) {
        effects.push(Effect::Coins {
            user_id,
            amount: coins,
            reason: CoinReason::StreakBonus,
            metadata: json!({ "streak": streak, "week": window.opening_label }),
            idempotency_key: format!("streak-bonus:{}:{}", user_id, window.opening_label)
        });
    }

    effects.push(Effect::AssignQuests { user_id });

    if rated.tier != current.tier {
        effects.push(Effect::Notify {
            user_id,
            kind: NotificationKind::TierChange,
            payload: json!({ "from": current.tier, "to": rated.tier, "ovr": rated.ovr })
        });
    }

    if is_milestone(streak) {
        effects.push(Effect::Notify {
            user_id,
            kind: NotificationKind::StreakMilestone,
            payload: json!({ "streak": streak })
        });
    }

    let profile = PerformanceProfile {
        user_id,
        stats: rated.stats,
        ovr: rated.ovr,
        tier: rated.tier,
        streak,
        special_card,
        prev_stats: current.stats,
        prev_ovr: current.ovr,
        prev_tier: current.tier,
        last_synced_at: Some(window.as_of)
    };

    UserOutcome {
        closing: history_record(current, &window.closing_label, &inputs.weekly),
        opening: history_record(&profile, &window.opening_label, &inputs.weekly),
        weekly: weekly_snapshot(&profile, &window.opening_label, &inputs.weekly),
        profile,
        effects,
        active,
        decayed
    }
}

/// Recomputes every profile, in order. No I/O.
pub fn recompute_population(
    profiles: &[PerformanceProfile],
    inputs: &AggregatedInputs,
    ctx: &RecomputeContext<'_>
) -> Vec<UserOutcome> {
    let bar = progress_bar(profiles.len() as u64, "Recomputing profiles".to_string());
    let mut outcomes = Vec::with_capacity(profiles.len());

    for profile in profiles {
        outcomes.push(recompute_user(profile, inputs.for_user(profile.user_id), ctx));
        bar.inc(1);
    }

    bar.finish();
    outcomes
}

fn activity_rewards(user_id: i32, weekly: &WeeklyTotals, window: &WeekWindow) -> Vec<Effect> {
    let mut effects = Vec::new();

    let coins = (weekly.km * COINS_PER_KM).round() as i32;
    if coins > 0 {
        effects.push(Effect::Coins {
            user_id,
            amount: coins,
            reason: CoinReason::WeeklyRide,
            metadata: json!({ "km": weekly.km, "rides": weekly.rides, "week": window.opening_label }),
            idempotency_key: format!("weekly-ride:{}:{}", user_id, window.opening_label)
        });
    }

    let points = (weekly.km * SEASON_POINTS_PER_KM).round() as i32;
    if points > 0 {
        effects.push(Effect::SeasonPoints {
            user_id,
            points,
            metric: "distance_km".to_string(),
            value: weekly.km,
            idempotency_key: format!("season-distance:{}:{}", user_id, window.opening_label)
        });
    }

    effects
}

fn history_record(profile: &PerformanceProfile, week_label: &str, weekly: &WeeklyTotals) -> WeeklyHistoryRecord {
    WeeklyHistoryRecord {
        user_id: profile.user_id,
        week_label: week_label.to_string(),
        stats: profile.stats,
        ovr: profile.ovr,
        tier: profile.tier,
        km: weekly.km,
        elevation: weekly.elevation,
        rides: weekly.rides
    }
}

fn weekly_snapshot(profile: &PerformanceProfile, week_label: &str, weekly: &WeeklyTotals) -> LeaderboardSnapshot {
    LeaderboardSnapshot {
        user_id: profile.user_id,
        period_type: PeriodType::Weekly,
        period_label: week_label.to_string(),
        km: weekly.km,
        elevation: weekly.elevation,
        rides: weekly.rides,
        ovr: profile.ovr,
        last_week_label: week_label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        database::db_structs::{RaceResult, StatBoost},
        model::{
            aggregator::{UserInputs, WeeklyTotals},
            effects::{CoinReason, Effect, NotificationKind},
            race_bonus::DefaultRaceBonus,
            recompute::{recompute_user, RecomputeContext},
            stats_engine::{tier_for, DefaultStatsEngine, StatsEngine},
            structures::{six_stats::SixStats, special_card::SpecialCard, stat::Stat, tier::Tier},
            week::WeekWindow
        },
        utils::test_utils::{generate_activities, generate_profile, test_window}
    };

    fn context(window: &WeekWindow) -> RecomputeContext<'_> {
        RecomputeContext {
            window,
            stats_engine: &DefaultStatsEngine,
            race_bonus: &DefaultRaceBonus
        }
    }

    fn no_inputs() -> UserInputs<'static> {
        UserInputs {
            weekly: WeeklyTotals::default(),
            activities: &[],
            races: &[],
            boosts: &[],
            podiums: 0
        }
    }

    fn coins(effects: &[Effect], reason: CoinReason) -> Option<i32> {
        effects.iter().find_map(|e| match e {
            Effect::Coins { amount, reason: r, .. } if *r == reason => Some(*amount),
            _ => None
        })
    }

    fn notified(effects: &[Effect], kind: NotificationKind) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, Effect::Notify { kind: k, .. } if *k == kind))
    }

    #[test]
    fn test_full_recompute_is_deterministic() {
        let window = test_window();
        let ctx = context(&window);
        let profile = generate_profile(1, 40, 2);
        let activities = generate_activities(1, 30, 5);
        let inputs = UserInputs {
            activities: &activities,
            ..no_inputs()
        };

        let first = recompute_user(&profile, inputs, &ctx);
        let second = recompute_user(&profile, inputs, &ctx);

        assert_eq!(first.profile.stats, second.profile.stats);
        assert_eq!(first.profile.ovr, second.profile.ovr);
        assert_eq!(first.profile.tier, second.profile.tier);
        assert_eq!(first, second);
    }

    #[test]
    fn test_tier_matches_ovr_band() {
        let window = test_window();
        let ctx = context(&window);
        let activities = generate_activities(1, 50, 19);
        let inputs = UserInputs {
            activities: &activities,
            ..no_inputs()
        };

        let outcome = recompute_user(&generate_profile(1, 40, 1), inputs, &ctx);

        assert_eq!(outcome.profile.tier, tier_for(outcome.profile.ovr));
        assert_eq!(
            outcome.profile.ovr,
            DefaultStatsEngine.compute_ovr(&outcome.profile.stats)
        );
    }

    #[test]
    fn test_first_inactive_week_after_active_streak() {
        let window = test_window();
        let ctx = context(&window);
        let profile = generate_profile(1, 50, 3);

        let outcome = recompute_user(&profile, no_inputs(), &ctx);

        assert_eq!(outcome.profile.streak, -1);
        assert!(outcome.decayed);
        assert!(!outcome.active);
        assert_eq!(outcome.profile.stats.pace, 49);
        assert_eq!(outcome.profile.stats, SixStats::uniform(49));
        assert_eq!(outcome.profile.ovr, 49);
        assert_eq!(outcome.profile.tier, Tier::Bronze);
        assert!(notified(&outcome.effects, NotificationKind::TierChange));
    }

    #[test]
    fn test_decay_saturates_for_continuously_inactive_user() {
        let window = test_window();
        let ctx = context(&window);
        let mut profile = generate_profile(1, 80, -1);
        let mut paces = Vec::new();

        for _ in 0..5 {
            let outcome = recompute_user(&profile, no_inputs(), &ctx);
            paces.push(outcome.profile.stats.pace);
            profile = outcome.profile;
        }

        // Prior streak -1: three more decays reach -4, then frozen
        assert_eq!(paces, vec![78, 76, 74, 74, 74]);
        assert_eq!(profile.streak, -6);
    }

    #[test]
    fn test_reactivation_with_race_win() {
        let window = test_window();
        let ctx = context(&window);
        let profile = generate_profile(1, 60, -2);
        let races = [RaceResult {
            user_id: 1,
            position: 1,
            field_size: 50
        }];
        let inputs = UserInputs {
            weekly: WeeklyTotals {
                km: 20.0,
                elevation: 180.0,
                rides: 1
            },
            races: &races,
            ..no_inputs()
        };

        let outcome = recompute_user(&profile, inputs, &ctx);

        assert_eq!(outcome.profile.streak, 1);
        assert!(!outcome.decayed);
        assert_eq!(coins(&outcome.effects, CoinReason::WeeklyRide), Some(40));
        // Winner of a 50 rider field: +3 resistance, +2 overall
        assert_eq!(outcome.profile.stats.resistance, 63);
        assert_eq!(outcome.profile.ovr, 61 + 2);
        assert_eq!(outcome.profile.tier, tier_for(outcome.profile.ovr));
        assert!(outcome
            .effects
            .iter()
            .any(|e| matches!(e, Effect::SeasonPoints { points: 20, idempotency_key, .. }
                if idempotency_key == "season-distance:1:2026-W42")));
    }

    #[test]
    fn test_race_bonus_capped() {
        let window = test_window();
        let ctx = context(&window);
        let profile = generate_profile(1, 60, 1);
        let races = vec![
            RaceResult {
                user_id: 1,
                position: 1,
                field_size: 100
            };
            6
        ];
        let inputs = UserInputs {
            weekly: WeeklyTotals {
                km: 90.0,
                elevation: 0.0,
                rides: 6
            },
            races: &races,
            ..no_inputs()
        };

        let outcome = recompute_user(&profile, inputs, &ctx);

        assert_eq!(outcome.profile.stats.resistance, 65);
        // 365 / 6 rounds to 61, plus the capped +3
        assert_eq!(outcome.profile.ovr, 61 + 3);
    }

    #[test]
    fn test_boosts_clamp_at_99() {
        let window = test_window();
        let ctx = context(&window);
        let profile = generate_profile(1, 97, 2);
        let boosts = [
            StatBoost {
                user_id: 1,
                stat: Stat::Sprint,
                amount: 5
            },
            StatBoost {
                user_id: 1,
                stat: Stat::Mountain,
                amount: 1
            }
        ];
        let inputs = UserInputs {
            weekly: WeeklyTotals {
                km: 10.0,
                elevation: 0.0,
                rides: 1
            },
            boosts: &boosts,
            ..no_inputs()
        };

        let outcome = recompute_user(&profile, inputs, &ctx);

        assert_eq!(outcome.profile.stats.sprint, 99);
        assert_eq!(outcome.profile.stats.mountain, 98);
        assert_eq!(outcome.profile.stats.pace, 97);
    }

    #[test]
    fn test_in_form_via_career_podiums() {
        let window = test_window();
        let ctx = context(&window);
        let profile = generate_profile(1, 55, 4);
        let inputs = UserInputs {
            weekly: WeeklyTotals {
                km: 15.0,
                elevation: 0.0,
                rides: 1
            },
            podiums: 3,
            ..no_inputs()
        };

        let outcome = recompute_user(&profile, inputs, &ctx);

        assert_eq!(outcome.ovr_delta(), 0);
        assert_eq!(outcome.profile.special_card, Some(SpecialCard::InForm));
    }

    #[test]
    fn test_in_form_via_overall_jump() {
        let window = test_window();
        let ctx = context(&window);
        let profile = generate_profile(1, 50, 2);
        let boosts = [Stat::Pace, Stat::Endurance, Stat::Mountain, Stat::Resistance, Stat::Sprint, Stat::Technique]
            .map(|stat| StatBoost {
                user_id: 1,
                stat,
                amount: 5
            });
        let inputs = UserInputs {
            weekly: WeeklyTotals {
                km: 5.0,
                elevation: 0.0,
                rides: 1
            },
            boosts: &boosts,
            ..no_inputs()
        };

        let outcome = recompute_user(&profile, inputs, &ctx);

        assert_eq!(outcome.ovr_delta(), 5);
        assert_eq!(outcome.profile.special_card, Some(SpecialCard::InForm));
    }

    #[test]
    fn test_no_special_card_on_flat_week() {
        let window = test_window();
        let ctx = context(&window);
        let mut profile = generate_profile(1, 55, 4);
        profile.special_card = Some(SpecialCard::InForm);
        let inputs = UserInputs {
            weekly: WeeklyTotals {
                km: 15.0,
                elevation: 0.0,
                rides: 1
            },
            podiums: 2,
            ..no_inputs()
        };

        let outcome = recompute_user(&profile, inputs, &ctx);

        assert_eq!(outcome.profile.special_card, None);
    }

    #[test]
    fn test_history_rows_carry_pre_and_post_values() {
        let window = test_window();
        let ctx = context(&window);
        let profile = generate_profile(9, 50, 3);

        let outcome = recompute_user(&profile, no_inputs(), &ctx);

        assert_eq!(outcome.closing.week_label, window.closing_label);
        assert_eq!(outcome.closing.stats, SixStats::uniform(50));
        assert_eq!(outcome.closing.ovr, 50);
        assert_eq!(outcome.opening.week_label, window.opening_label);
        assert_eq!(outcome.opening.stats, SixStats::uniform(49));
        assert_eq!(outcome.profile.prev_stats, SixStats::uniform(50));
        assert_eq!(outcome.profile.prev_tier, Tier::Silver);
    }

    #[test]
    fn test_quests_assigned_regardless_of_activity() {
        let window = test_window();
        let ctx = context(&window);

        let inactive = recompute_user(&generate_profile(1, 50, -5), no_inputs(), &ctx);
        assert!(inactive
            .effects
            .iter()
            .any(|e| matches!(e, Effect::AssignQuests { user_id: 1 })));
        assert_eq!(coins(&inactive.effects, CoinReason::WeeklyRide), None);
    }

    #[test]
    fn test_streak_bonus_and_milestone() {
        let window = test_window();
        let ctx = context(&window);
        let active = UserInputs {
            weekly: WeeklyTotals {
                km: 30.0,
                elevation: 0.0,
                rides: 2
            },
            ..no_inputs()
        };

        let at_four = recompute_user(&generate_profile(1, 50, 3), active, &ctx);
        assert_eq!(at_four.profile.streak, 4);
        assert_eq!(coins(&at_four.effects, CoinReason::StreakBonus), Some(40));
        assert!(!notified(&at_four.effects, NotificationKind::StreakMilestone));

        let at_five = recompute_user(&generate_profile(1, 50, 4), active, &ctx);
        assert_eq!(coins(&at_five.effects, CoinReason::StreakBonus), None);
        assert!(notified(&at_five.effects, NotificationKind::StreakMilestone));
    }
}
