//! Combat Resolution
//!
//! Pure damage math. No match state, no locking.

use serde::{Deserialize, Serialize};

use crate::game::state::Player;

/// Minimum damage any hit deals.
pub const MIN_DAMAGE: u32 = 1;

/// Damage dealt by an attacker to a defender.
///
/// `max(1, attack - defense / 2)` with integer (floor) division.
#[inline]
pub fn damage(attack: u32, defense: u32) -> u32 {
    attack.saturating_sub(defense / 2).max(MIN_DAMAGE)
}

/// Result of a single hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitOutcome {
    /// Damage applied.
    pub damage: u32,
    /// Target health after the hit.
    pub remaining_health: u32,
    /// Target dropped to zero.
    pub defeated: bool,
}

/// Apply one hit to `target`. Health is clamped at zero.
pub fn strike(attack: u32, target: &mut Player) -> HitOutcome {
    let dealt = damage(attack, target.defense);
    target.health = target.health.saturating_sub(dealt);

    HitOutcome {
        damage: dealt,
        remaining_health: target.health,
        defeated: target.health == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{PlayerId, BASE_ATTACK, BASE_DEFENSE, MAX_HEALTH};
    use proptest::prelude::*;

    fn dummy(health: u32, defense: u32) -> Player {
        Player {
            id: PlayerId::new("target"),
            username: "target".into(),
            health,
            gold: 0,
            level: 1,
            attack: BASE_ATTACK,
            defense,
            inventory: Vec::new(),
        }
    }

    #[test]
    fn test_base_stats_damage() {
        assert_eq!(damage(BASE_ATTACK, BASE_DEFENSE), 8);
    }

    #[test]
    fn test_damage_floor() {
        assert_eq!(damage(1, 100), 1);
        assert_eq!(damage(0, 0), 1);
    }

    #[test]
    fn test_defense_halved_with_floor() {
        // 7 / 2 == 3
        assert_eq!(damage(10, 7), 7);
    }

    #[test]
    fn test_strike_clamps_at_zero() {
        let mut target = dummy(3, BASE_DEFENSE);
        let outcome = strike(BASE_ATTACK, &mut target);
        assert_eq!(outcome.damage, 8);
        assert_eq!(outcome.remaining_health, 0);
        assert!(outcome.defeated);
        assert_eq!(target.health, 0);
    }

    #[test]
    fn test_strike_from_full_health() {
        let mut target = dummy(MAX_HEALTH, BASE_DEFENSE);
        let outcome = strike(BASE_ATTACK, &mut target);
        assert_eq!(outcome.remaining_health, 92);
        assert!(!outcome.defeated);
    }

    proptest! {
        #[test]
        fn prop_damage_at_least_one(attack in 0u32..10_000, defense in 0u32..10_000) {
            prop_assert!(damage(attack, defense) >= MIN_DAMAGE);
        }

        #[test]
        fn prop_damage_never_exceeds_attack_unless_floored(attack in 1u32..10_000, defense in 0u32..10_000) {
            prop_assert!(damage(attack, defense) <= attack);
        }

        #[test]
        fn prop_strike_never_underflows(health in 0u32..=MAX_HEALTH, attack in 0u32..1_000, defense in 0u32..1_000) {
            let mut target = dummy(health, defense);
            let outcome = strike(attack, &mut target);
            prop_assert!(target.health <= health);
            prop_assert_eq!(outcome.defeated, target.health == 0);
        }
    }
}
