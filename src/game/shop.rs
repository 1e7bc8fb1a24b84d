//! Item Shop
//!
//! The fixed item catalog and the purchase transaction.

use std::collections::BTreeMap;

use crate::game::error::MatchError;
use crate::game::state::{Item, ItemCategory, ItemId, Player, MAX_HEALTH};

/// Read-only item catalog shared by every match.
#[derive(Clone, Debug)]
pub struct Catalog {
    items: BTreeMap<ItemId, Item>,
}

impl Catalog {
    /// The standard catalog: sword, shield and health potion.
    pub fn standard() -> Self {
        Self::from_items(vec![
            Item {
                id: ItemId::from("sword"),
                name: "Sword".into(),
                category: ItemCategory::Weapon,
                attack: 5,
                defense: 0,
                health: 0,
                cost: 10,
                description: "Increases attack by 5".into(),
            },
            Item {
                id: ItemId::from("shield"),
                name: "Shield".into(),
                category: ItemCategory::Armor,
                attack: 0,
                defense: 5,
                health: 0,
                cost: 10,
                description: "Increases defense by 5".into(),
            },
            Item {
                id: ItemId::from("potion"),
                name: "Health Potion".into(),
                category: ItemCategory::Potion,
                attack: 0,
                defense: 0,
                health: 20,
                cost: 5,
                description: "Restores 20 health".into(),
            },
        ])
    }

    /// Build a catalog from arbitrary items. Later duplicates win.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
        }
    }

    /// Look up an item.
    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    /// All items in id order.
    pub fn items(&self) -> Vec<Item> {
        self.items.values().cloned().collect()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Empty catalog?
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Charge `player` for `item` and apply it.
///
/// Either everything is applied (gold, inventory, stat bonuses, potion
/// healing) or nothing is.
pub fn purchase(player: &mut Player, item: &Item) -> Result<(), MatchError> {
    if player.gold < item.cost {
        return Err(MatchError::InsufficientGold {
            cost: item.cost,
            available: player.gold,
        });
    }

    player.gold -= item.cost;
    player.attack = player.attack.saturating_add(item.attack);
    player.defense = player.defense.saturating_add(item.defense);
    if item.category == ItemCategory::Potion {
        player.health = player.health.saturating_add(item.health).min(MAX_HEALTH);
    }
    player.inventory.push(item.clone());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{PlayerId, BASE_ATTACK, BASE_DEFENSE};

    fn buyer(gold: u32, health: u32) -> Player {
        Player {
            id: PlayerId::new("buyer"),
            username: "buyer".into(),
            health,
            gold,
            level: 1,
            attack: BASE_ATTACK,
            defense: BASE_DEFENSE,
            inventory: Vec::new(),
        }
    }

    #[test]
    fn test_standard_catalog() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.len(), 3);
        let ids: Vec<_> = catalog.items().into_iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec!["potion", "shield", "sword"]);
    }

    #[test]
    fn test_buy_sword_adds_attack() {
        let catalog = Catalog::standard();
        let mut player = buyer(100, 100);
        purchase(&mut player, catalog.get(&"sword".into()).unwrap()).unwrap();

        assert_eq!(player.gold, 90);
        assert_eq!(player.attack, BASE_ATTACK + 5);
        assert_eq!(player.defense, BASE_DEFENSE);
        assert_eq!(player.inventory.len(), 1);
    }

    #[test]
    fn test_potion_caps_health() {
        let catalog = Catalog::standard();
        let potion = catalog.get(&"potion".into()).unwrap();

        let mut hurt = buyer(100, 70);
        purchase(&mut hurt, potion).unwrap();
        assert_eq!(hurt.health, 90);

        let mut healthy = buyer(100, 95);
        purchase(&mut healthy, potion).unwrap();
        assert_eq!(healthy.health, MAX_HEALTH);
    }

    #[test]
    fn test_insufficient_gold_leaves_player_untouched() {
        let catalog = Catalog::standard();
        let mut player = buyer(9, 50);
        let before = player.clone();

        let result = purchase(&mut player, catalog.get(&"shield".into()).unwrap());
        assert_eq!(
            result,
            Err(MatchError::InsufficientGold { cost: 10, available: 9 })
        );
        assert_eq!(player, before);
    }

    #[test]
    fn test_exact_gold_allowed() {
        let catalog = Catalog::standard();
        let mut player = buyer(5, 50);
        purchase(&mut player, catalog.get(&"potion".into()).unwrap()).unwrap();
        assert_eq!(player.gold, 0);
    }

    #[test]
    fn test_duplicates_allowed() {
        let catalog = Catalog::standard();
        let sword = catalog.get(&"sword".into()).unwrap();
        let mut player = buyer(100, 100);
        purchase(&mut player, sword).unwrap();
        purchase(&mut player, sword).unwrap();
        assert_eq!(player.inventory.len(), 2);
        assert_eq!(player.attack, BASE_ATTACK + 10);
    }
}
