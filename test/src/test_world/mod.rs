use std::collections::{BTreeMap, BTreeSet};

use lockstep_shared::{
    CatalogEntry, CellPos, ContainerKind, Holder, MapId, ObjectGraph, ObjectId, SyncEnum,
};

pub const HOME_MAP: MapId = MapId(0);
pub const CAVE_MAP: MapId = MapId(1);

/// The only container kind of the test protocol, registered first.
pub const INVENTORY: ContainerKind = ContainerKind(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stance {
    Passive,
    Defensive,
    Aggressive,
}

impl SyncEnum for Stance {
    fn to_repr(self) -> i32 {
        match self {
            Stance::Passive => 0,
            Stance::Defensive => 1,
            Stance::Aggressive => 2,
        }
    }

    fn from_repr(repr: i32) -> Option<Self> {
        match repr {
            0 => Some(Stance::Passive),
            1 => Some(Stance::Defensive),
            2 => Some(Stance::Aggressive),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThingDef {
    pub name: String,
    pub stack_limit: u16,
}

impl ThingDef {
    pub fn new(name: &str, stack_limit: u16) -> Self {
        Self {
            name: name.to_string(),
            stack_limit,
        }
    }
}

impl CatalogEntry for ThingDef {
    fn def_name(&self) -> &str {
        &self.name
    }
}

pub fn thing_defs() -> Vec<ThingDef> {
    vec![
        ThingDef::new("Steel", 75),
        ThingDef::new("WoodLog", 75),
        ThingDef::new("MealSimple", 10),
        ThingDef::new("Rifle", 1),
    ]
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pawn {
    pub name: String,
    pub map: MapId,
    pub pos: CellPos,
    pub drafted: bool,
    pub hp: i32,
    pub stance: Stance,
    pub skills: Vec<u8>,
    pub inventory: Vec<ObjectId>,
    pub equipped: Option<ObjectId>,
    pub queued_moves: Vec<CellPos>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub def: ThingDef,
    pub holder: Holder,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub volume: f32,
    pub speed: u8,
    pub colony_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: 0.5,
            speed: 1,
            colony_name: "New Arrivals".to_string(),
        }
    }
}

/// A deterministic toy colony sim: two maps, pawns standing on them, and
/// items either on the ground or in a pawn's inventory.
#[derive(Clone, Debug, PartialEq)]
pub struct TestWorld {
    maps: BTreeSet<MapId>,
    pawns: BTreeMap<ObjectId, Pawn>,
    items: BTreeMap<ObjectId, Item>,
    next_id: i32,
    pub settings: Settings,
    /// Every mutation applied by a command, in application order.
    pub events: Vec<String>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            maps: [HOME_MAP, CAVE_MAP].into_iter().collect(),
            pawns: BTreeMap::new(),
            items: BTreeMap::new(),
            next_id: 1,
            settings: Settings::default(),
            events: Vec::new(),
        }
    }

    fn allocate(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn spawn_pawn(&mut self, name: &str, map: MapId, pos: CellPos) -> ObjectId {
        let id = self.allocate();
        self.pawns.insert(
            id,
            Pawn {
                name: name.to_string(),
                map,
                pos,
                drafted: false,
                hp: 100,
                stance: Stance::Defensive,
                skills: vec![0; 4],
                inventory: Vec::new(),
                equipped: None,
                queued_moves: Vec::new(),
            },
        );
        id
    }

    /// Spawns an item on `map`, or in `owner`'s inventory when given.
    pub fn spawn_item(&mut self, def: ThingDef, map: MapId, owner: Option<ObjectId>) -> ObjectId {
        let id = self.allocate();
        let holder = match owner {
            Some(owner) => {
                if let Some(pawn) = self.pawns.get_mut(&owner) {
                    pawn.inventory.push(id);
                }
                Holder::Container {
                    kind: INVENTORY,
                    owner,
                }
            }
            None => Holder::Map(map),
        };
        self.items.insert(id, Item { def, holder });
        id
    }

    pub fn pawn(&self, id: ObjectId) -> Option<&Pawn> {
        self.pawns.get(&id)
    }

    pub fn pawn_mut(&mut self, id: ObjectId) -> Option<&mut Pawn> {
        self.pawns.get_mut(&id)
    }

    pub fn item(&self, id: ObjectId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn pawns(&self) -> impl Iterator<Item = (&ObjectId, &Pawn)> {
        self.pawns.iter()
    }

    pub fn record(&mut self, event: String) {
        self.events.push(event);
    }

    fn detach(&mut self, item: ObjectId) {
        let Some(Holder::Container { owner, .. }) = self.items.get(&item).map(|item| item.holder)
        else {
            return;
        };
        if let Some(pawn) = self.pawns.get_mut(&owner) {
            pawn.inventory.retain(|held| *held != item);
            if pawn.equipped == Some(item) {
                pawn.equipped = None;
            }
        }
    }

    /// Moves an item into a pawn's inventory. Both must share a map.
    pub fn give_item(&mut self, item: ObjectId, pawn: ObjectId) -> bool {
        if self.items.get(&item).is_none() || self.map_of(item) != self.map_of(pawn) {
            return false;
        }
        self.detach(item);
        let Some(owner) = self.pawns.get_mut(&pawn) else {
            return false;
        };
        owner.inventory.push(item);
        if let Some(item) = self.items.get_mut(&item) {
            item.holder = Holder::Container {
                kind: INVENTORY,
                owner: pawn,
            };
        }
        true
    }

    /// Drops a held item on the ground of its owner's map.
    pub fn drop_item(&mut self, item: ObjectId) -> bool {
        let Some(map) = self.map_of(item) else {
            return false;
        };
        self.detach(item);
        match self.items.get_mut(&item) {
            Some(item) => {
                item.holder = Holder::Map(map);
                true
            }
            None => false,
        }
    }

    pub fn equip(&mut self, pawn: ObjectId, item: ObjectId) -> bool {
        match self.pawns.get_mut(&pawn) {
            Some(owner) if owner.inventory.contains(&item) => {
                owner.equipped = Some(item);
                true
            }
            _ => false,
        }
    }

    /// Destroys a pawn together with everything it carries, or a single item.
    pub fn destroy(&mut self, id: ObjectId) {
        if let Some(pawn) = self.pawns.remove(&id) {
            for item in pawn.inventory {
                self.items.remove(&item);
            }
            return;
        }
        self.detach(id);
        self.items.remove(&id);
    }

    pub fn add_map(&mut self, map: MapId) {
        self.maps.insert(map);
    }

    pub fn remove_map(&mut self, map: MapId) {
        self.maps.remove(&map);
        let doomed: Vec<ObjectId> = self
            .pawns
            .iter()
            .filter(|(_, pawn)| pawn.map == map)
            .map(|(id, _)| *id)
            .collect();
        for id in doomed {
            self.destroy(id);
        }
        self.items
            .retain(|_, item| item.holder != Holder::Map(map));
    }
}

impl ObjectGraph for TestWorld {
    fn holder_of(&self, id: ObjectId) -> Option<Holder> {
        if let Some(pawn) = self.pawns.get(&id) {
            return Some(Holder::Map(pawn.map));
        }
        self.items.get(&id).map(|item| item.holder)
    }

    fn map_exists(&self, map: MapId) -> bool {
        self.maps.contains(&map)
    }
}
