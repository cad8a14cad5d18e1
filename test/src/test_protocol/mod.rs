use std::time::Duration;

use lockstep_shared::{
    ArgSpec, Capture, CaptureSet, CellPos, EngineConfig, FieldAccessor, GlobalFieldAccessor,
    HandlerOptions, IndexedFieldAccessor, ObjectId, Protocol, SyncChoice, SyncContext,
    SyncDelegate, SyncField, SyncMethod, SyncType, ValueRef,
};

use crate::test_world::{thing_defs, Stance, TestWorld, ThingDef, INVENTORY};

fn target_id(target: ValueRef) -> Option<ObjectId> {
    target.and_then(|target| target.downcast_ref::<ObjectId>()).copied()
}

fn pawn_target() -> SyncType {
    SyncType::object::<ObjectId>()
}

/// Captured environment of the "haul to" order issued from a pawn's
/// context menu.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HaulOrder {
    pub pawn: Option<ObjectId>,
    pub cell: CellPos,
    pub priority: u8,
}

impl CaptureSet for HaulOrder {
    fn captures() -> Vec<Capture<Self>> {
        vec![
            Capture::new(
                "pawn",
                SyncType::nullable::<ObjectId>(SyncType::object::<ObjectId>()),
                |env: &HaulOrder| env.pawn,
                |env: &mut HaulOrder, pawn: Option<ObjectId>| env.pawn = pawn,
            )
            .resolve_map(),
            Capture::new(
                "cell",
                SyncType::of::<CellPos>(),
                |env: &HaulOrder| env.cell,
                |env: &mut HaulOrder, cell: CellPos| env.cell = cell,
            ),
            Capture::new(
                "priority",
                SyncType::of::<u8>(),
                |env: &HaulOrder| env.priority,
                |env: &mut HaulOrder, priority: u8| env.priority = priority,
            ),
        ]
    }
}

pub fn protocol() -> Protocol<TestWorld> {
    protocol_with(EngineConfig::default())
}

pub fn protocol_with(config: EngineConfig) -> Protocol<TestWorld> {
    let mut protocol = Protocol::builder();
    protocol.config(config);
    let inventory = protocol.add_container_kind("Inventory");
    assert_eq!(inventory, INVENTORY);

    protocol
        .add_defs(thing_defs())
        .add_field(
            SyncField::new(
                GlobalFieldAccessor::new(
                    "Settings.volume",
                    |world: &TestWorld| world.settings.volume,
                    |world: &mut TestWorld, volume: f32| world.settings.volume = volume,
                ),
                SyncType::of::<f32>(),
            )
            .buffer_changes(),
        )
        .add_field(
            SyncField::new(
                GlobalFieldAccessor::new(
                    "Settings.speed",
                    |world: &TestWorld| world.settings.speed,
                    |world: &mut TestWorld, speed: u8| world.settings.speed = speed,
                ),
                SyncType::of::<u8>(),
            )
            .post_apply(|world: &mut TestWorld, _| {
                let speed = world.settings.speed;
                world.record(format!("speed {speed}"));
            }),
        )
        .add_field(
            SyncField::new(
                FieldAccessor::new(
                    "Pawn.drafted",
                    |world: &TestWorld, pawn: &ObjectId| world.pawn(*pawn).map(|p| p.drafted),
                    |world: &mut TestWorld, pawn: &ObjectId, drafted: bool| {
                        world.pawn_mut(*pawn).map(|p| p.drafted = drafted).is_some()
                    },
                ),
                SyncType::of::<bool>(),
            )
            .target(pawn_target())
            .post_apply(|world: &mut TestWorld, target| {
                let Some(pawn) = target_id(target) else {
                    return;
                };
                if let Some(drafted) = world.pawn(pawn).map(|p| p.drafted) {
                    world.record(format!("{pawn:?} drafted {drafted}"));
                }
            }),
        )
        .add_field(
            SyncField::new(
                FieldAccessor::new(
                    "Pawn.hp",
                    |world: &TestWorld, pawn: &ObjectId| world.pawn(*pawn).map(|p| p.hp),
                    |world: &mut TestWorld, pawn: &ObjectId, hp: i32| {
                        world.pawn_mut(*pawn).map(|p| p.hp = hp).is_some()
                    },
                ),
                SyncType::of::<i32>(),
            )
            .target(pawn_target())
            .post_apply(|world: &mut TestWorld, target| {
                let Some(pawn) = target_id(target) else {
                    return;
                };
                if world.pawn(pawn).is_some_and(|p| p.hp <= 0) {
                    world.destroy(pawn);
                    world.record(format!("{pawn:?} died"));
                }
            }),
        )
        .add_field(
            SyncField::new(
                FieldAccessor::new(
                    "Pawn.stance",
                    |world: &TestWorld, pawn: &ObjectId| world.pawn(*pawn).map(|p| p.stance),
                    |world: &mut TestWorld, pawn: &ObjectId, stance: Stance| {
                        world.pawn_mut(*pawn).map(|p| p.stance = stance).is_some()
                    },
                ),
                SyncType::enumeration::<Stance>(),
            )
            .target(pawn_target()),
        )
        .add_field(
            SyncField::new(
                IndexedFieldAccessor::new(
                    "Pawn.skills[].level",
                    |world: &TestWorld, pawn: &ObjectId, skill: &u8| {
                        world.pawn(*pawn)?.skills.get(usize::from(*skill)).copied()
                    },
                    |world: &mut TestWorld, pawn: &ObjectId, skill: &u8, level: u8| {
                        match world
                            .pawn_mut(*pawn)
                            .and_then(|p| p.skills.get_mut(usize::from(*skill)))
                        {
                            Some(slot) => {
                                *slot = level;
                                true
                            }
                            None => false,
                        }
                    },
                ),
                SyncType::of::<u8>(),
            )
            .target(pawn_target())
            .index(SyncType::of::<u8>())
            .pre_apply(|world: &mut TestWorld, target| {
                if let Some(pawn) = target_id(target) {
                    world.record(format!("{pawn:?} trains"));
                }
            }),
        )
        .add_method(
            SyncMethod::new("Pawn.Kill", |world: &mut TestWorld, target, _args, _inv| {
                if let Some(pawn) = target_id(target) {
                    world.destroy(pawn);
                    world.record(format!("{pawn:?} killed"));
                }
            })
            .target(pawn_target()),
        )
        .add_method(
            SyncMethod::new("Pawn.MoveTo", |world: &mut TestWorld, target, _args, inv| {
                let (Some(pawn), Some(cell)) = (target_id(target), inv.mouse_cell) else {
                    return;
                };
                let queued = inv.queue_order;
                if let Some(p) = world.pawn_mut(pawn) {
                    if queued {
                        p.queued_moves.push(cell);
                    } else {
                        p.pos = cell;
                        p.queued_moves.clear();
                    }
                }
                world.record(format!("{pawn:?} move {cell:?} queued={queued}"));
            })
            .target(pawn_target())
            .context(SyncContext::MOUSE_CELL | SyncContext::QUEUE_ORDER),
        )
        .add_method(
            SyncMethod::new("Pawn.GiveItem", |world: &mut TestWorld, target, args, _inv| {
                let (Some(pawn), Some(item)) = (target_id(target), args.get::<ObjectId>(0).copied())
                else {
                    return;
                };
                if world.give_item(item, pawn) {
                    world.record(format!("{item:?} given to {pawn:?}"));
                }
            })
            .target(pawn_target())
            .arg(SyncType::object::<ObjectId>())
            .cancel_if_any_arg_null(),
        )
        .add_method(
            SyncMethod::new("Item.Drop", |world: &mut TestWorld, target, _args, _inv| {
                if let Some(item) = target_id(target) {
                    if world.drop_item(item) {
                        world.record(format!("{item:?} dropped"));
                    }
                }
            })
            .target(SyncType::object::<ObjectId>()),
        )
        .add_method(
            SyncMethod::new("Colony.DraftSelected", |world: &mut TestWorld, _target, _args, inv| {
                for pawn in &inv.selected {
                    if let Some(p) = world.pawn_mut(*pawn) {
                        p.drafted = true;
                    }
                }
                world.record(format!("drafted {:?}", inv.selected));
            })
            .context(SyncContext::CURRENT_MAP | SyncContext::SELECTED)
            .cancel_if_no_selected(),
        )
        .add_method(
            SyncMethod::new("Colony.Rename", |world: &mut TestWorld, _target, mut args, _inv| {
                if let Some(name) = args.take::<String>(0) {
                    world.record(format!("renamed {name}"));
                    world.settings.colony_name = name;
                }
            })
            .arg(SyncType::of::<String>())
            .min_time(Duration::from_millis(500)),
        )
        .add_method(
            SyncMethod::new("Debug.HealAll", |world: &mut TestWorld, _target, _args, _inv| {
                let ids: Vec<ObjectId> = world.pawns().map(|(id, _)| *id).collect();
                for id in ids {
                    if let Some(p) = world.pawn_mut(id) {
                        p.hp = 100;
                    }
                }
                world.record("healed".to_string());
            })
            .debug_only(),
        )
        .add_method(
            SyncMethod::new("Host.SpawnItem", |world: &mut TestWorld, _target, args, inv| {
                let (Some(Some(def)), Some(owner)) = (
                    args.get::<Option<ThingDef>>(0).cloned(),
                    args.get::<ObjectId>(1).copied(),
                ) else {
                    return;
                };
                let name = def.name.clone();
                let item = world.spawn_item(def, inv.map, Some(owner));
                world.record(format!("spawned {name} as {item:?} for {owner:?}"));
            })
            .arg(SyncType::def::<ThingDef>())
            .arg(ArgSpec::new(SyncType::object::<ObjectId>()).resolve_map())
            .cancel_if_any_arg_null()
            .host_only(),
        )
        .add_delegate(
            SyncDelegate::<TestWorld, HaulOrder>::from_capture_set(
                "Pawn.HaulTo",
                |world: &mut TestWorld, env: &HaulOrder, _args, _inv| {
                    let Some(pawn) = env.pawn else {
                        return;
                    };
                    if let Some(p) = world.pawn_mut(pawn) {
                        p.pos = env.cell;
                    }
                    world.record(format!(
                        "{pawn:?} hauls to {:?} priority {}",
                        env.cell, env.priority
                    ));
                },
            )
            .cancel_if_field_null("pawn"),
        )
        .add_choice(
            SyncChoice::new(
                "Pawn.Equip",
                |world: &TestWorld, target, _args| {
                    target_id(target)
                        .and_then(|pawn| world.pawn(pawn))
                        .map(|p| p.inventory.clone())
                        .unwrap_or_default()
                },
                |world: &mut TestWorld, target, item: ObjectId, _args, _inv| {
                    if let Some(pawn) = target_id(target) {
                        if world.equip(pawn, item) {
                            world.record(format!("{pawn:?} equips {item:?}"));
                        }
                    }
                },
            )
            .target(pawn_target()),
        );

    protocol.lock();
    protocol
}
