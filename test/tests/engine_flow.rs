use std::any::Any;

use lockstep_shared::{
    Args, CellPos, CommandEnvelope, CommandKind, Engine, EngineConfig, HandlerError, HostType,
    MapId, ObjectId, Protocol, ScheduledCommand, SerializationError, SyncId, SyncMethod, ValueRef,
};
use lockstep_test::{
    protocol, thing_defs, HaulOrder, Session, TestWorld, ThingDef, CAVE_MAP, HOME_MAP,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn val<T: Any>(value: &T) -> ValueRef<'_> {
    Some(value)
}

fn def(name: &str) -> ThingDef {
    thing_defs()
        .into_iter()
        .find(|def| def.name == name)
        .expect("test def exists")
}

/// Two pawns at home, one in the cave.
fn colony() -> (TestWorld, ObjectId, ObjectId, ObjectId) {
    let mut world = TestWorld::new();
    let ada = world.spawn_pawn("Ada", HOME_MAP, CellPos::new(1, 1, 0));
    let bo = world.spawn_pawn("Bo", HOME_MAP, CellPos::new(2, 1, 0));
    let cy = world.spawn_pawn("Cy", CAVE_MAP, CellPos::new(0, 0, 0));
    (world, ada, bo, cy)
}

#[test]
fn field_command_runs_on_every_peer_and_not_before() {
    init_logging();
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);

    let synced = session
        .client
        .sync_field("Pawn.drafted", val(&ada), val(&true), None)
        .unwrap();

    assert!(synced);
    // nothing changes until the command comes back sequenced
    assert!(!session.client.world.pawn(ada).unwrap().drafted);

    let (host, client) = session.settle();

    assert_eq!(host.executed, 1);
    assert_eq!(client.executed, 1);
    assert!(session.host.world.pawn(ada).unwrap().drafted);
    assert!(session.in_sync());
}

#[test]
fn field_partitions_on_its_target_map() {
    let (world, _, _, cy) = colony();
    let mut session = Session::new(world);

    session
        .client
        .sync_field("Pawn.hp", val(&cy), val(&40i32), None)
        .unwrap();
    session
        .client
        .sync_field("Settings.speed", None, val(&3u8), None)
        .unwrap();

    let outgoing = session.client.engine.take_outgoing();
    assert_eq!(
        outgoing.iter().map(|envelope| envelope.map).collect::<Vec<_>>(),
        vec![CAVE_MAP, MapId::GLOBAL]
    );
}

#[test]
fn outside_a_session_calls_are_local() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);
    session.client.engine.end_session();

    let synced = session
        .client
        .sync_field("Pawn.drafted", val(&ada), val(&true), None)
        .unwrap();

    assert!(!synced);
    assert!(!session.client.engine.should_sync());
    assert!(session.client.engine.take_outgoing().is_empty());
    assert!(!session.client.engine.queue_custom(1, MapId::GLOBAL, Vec::new()));
}

#[test]
fn lethal_hp_runs_post_apply_hook() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);

    session
        .host
        .sync_field("Pawn.hp", val(&ada), val(&0i32), None)
        .unwrap();
    session.settle();

    assert!(session.host.world.pawn(ada).is_none());
    assert!(session
        .client
        .world
        .events
        .contains(&format!("{ada:?} died")));
    assert!(session.in_sync());
}

#[test]
fn indexed_field_writes_one_element() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);

    session
        .client
        .sync_field("Pawn.skills[].level", val(&ada), val(&12u8), val(&2u8))
        .unwrap();
    session.settle();

    assert_eq!(session.client.world.pawn(ada).unwrap().skills, vec![0, 0, 12, 0]);
    assert_eq!(session.client.world.events, vec![format!("{ada:?} trains")]);
    assert!(session.in_sync());
}

#[test]
fn out_of_range_index_declines_before_any_hook() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);
    let before = session.client.world.clone();

    session
        .client
        .sync_field("Pawn.skills[].level", val(&ada), val(&12u8), val(&9u8))
        .unwrap();
    let (host, client) = session.settle();

    assert_eq!((host.declined, client.declined), (1, 1));
    assert!(session.client.world.events.is_empty());
    assert_eq!(session.client.world, before);
    assert!(session.in_sync());
}

#[test]
fn move_carries_mouse_cell_and_queue_order() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);
    let cell = CellPos::new(7, 3, 0);
    {
        let ui = session.client.engine.ui_mut();
        ui.current_map = HOME_MAP;
        ui.mouse_cell = Some(cell);
        ui.queue_order = true;
    }

    session
        .client
        .sync_method("Pawn.MoveTo", val(&ada), Args::new())
        .unwrap();
    session.settle();

    let pawn = session.host.world.pawn(ada).unwrap();
    assert_eq!(pawn.queued_moves, vec![cell]);
    assert_eq!(pawn.pos, CellPos::new(1, 1, 0));
    assert!(session.in_sync());
}

#[test]
fn selection_is_limited_to_the_command_map() {
    let (world, ada, bo, cy) = colony();
    let mut session = Session::new(world);
    {
        let ui = session.client.engine.ui_mut();
        ui.current_map = HOME_MAP;
        ui.selected = vec![ada, cy, bo];
    }

    session
        .client
        .sync_method("Colony.DraftSelected", None, Args::new())
        .unwrap();
    session.settle();

    let world = &session.host.world;
    assert!(world.pawn(ada).unwrap().drafted);
    assert!(world.pawn(bo).unwrap().drafted);
    assert!(!world.pawn(cy).unwrap().drafted);
    assert!(session.in_sync());
}

#[test]
fn empty_selection_cancels_the_call() {
    let (world, _, _, _) = colony();
    let mut session = Session::new(world);
    session.client.engine.ui_mut().current_map = HOME_MAP;

    let synced = session
        .client
        .sync_method("Colony.DraftSelected", None, Args::new())
        .unwrap();

    assert!(!synced);
    assert!(session.client.engine.take_outgoing().is_empty());
}

#[test]
fn null_argument_cancels_the_call() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);

    let synced = session
        .client
        .sync_method("Pawn.GiveItem", val(&ada), Args::new().with_null())
        .unwrap();

    assert!(!synced);
    assert_eq!(session.exchange(), 0);
    session.settle();
    assert!(session.host.world.pawn(ada).unwrap().inventory.is_empty());
}

#[test]
fn give_item_moves_it_into_the_inventory() {
    let (mut world, ada, _, _) = colony();
    let steel = world.spawn_item(def("Steel"), HOME_MAP, None);
    let mut session = Session::new(world);

    session
        .client
        .sync_method("Pawn.GiveItem", val(&ada), Args::new().with(steel))
        .unwrap();
    session.settle();

    assert_eq!(session.host.world.pawn(ada).unwrap().inventory, vec![steel]);
    assert!(session.in_sync());
}

#[test]
fn objects_from_two_maps_cannot_share_a_command() {
    let (mut world, ada, _, _) = colony();
    let ore = world.spawn_item(def("Steel"), CAVE_MAP, None);
    let mut session = Session::new(world);

    let error = session
        .client
        .sync_method("Pawn.GiveItem", val(&ada), Args::new().with(ore))
        .unwrap_err();

    assert!(matches!(
        error,
        HandlerError::Serialization(SerializationError::PartitionMismatch { .. })
    ));
    assert!(session.client.engine.take_outgoing().is_empty());
}

#[test]
fn wrong_argument_count_is_refused() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);

    let error = session
        .client
        .sync_method("Pawn.GiveItem", val(&ada), Args::new())
        .unwrap_err();

    assert!(matches!(
        error,
        HandlerError::ArgumentCount {
            expected: 1,
            found: 0,
            ..
        }
    ));
}

#[test]
fn handler_used_as_the_wrong_kind_is_refused() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);

    let error = session
        .client
        .sync_field("Pawn.Kill", val(&ada), val(&true), None)
        .unwrap_err();

    assert!(matches!(error, HandlerError::KindMismatch { .. }));
    assert!(matches!(
        session.client.sync_method("Pawn.Fly", None, Args::new()),
        Err(HandlerError::UnknownHandler { .. })
    ));
}

#[test]
fn debug_only_call_is_swallowed_outside_debug_mode() {
    let (world, _, _, _) = colony();
    let mut session = Session::new(world);

    let synced = session
        .host
        .sync_method("Debug.HealAll", None, Args::new())
        .unwrap();

    assert!(synced);
    assert!(session.host.engine.take_outgoing().is_empty());
}

#[test]
fn debug_only_call_runs_in_debug_mode() {
    let (mut world, ada, _, _) = colony();
    world.pawn_mut(ada).unwrap().hp = 10;
    let config = EngineConfig {
        debug_mode: true,
        ..EngineConfig::default()
    };
    let mut session = Session::with_config(config, world);

    session
        .client
        .sync_method("Debug.HealAll", None, Args::new())
        .unwrap();
    session.settle();

    assert_eq!(session.client.world.pawn(ada).unwrap().hp, 100);
    assert!(session.in_sync());
}

#[test]
fn host_only_call_is_swallowed_on_a_client() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);
    let args = || Args::new().with(Some(def("Rifle"))).with(ada);

    assert!(session
        .client
        .sync_method("Host.SpawnItem", None, args())
        .unwrap());
    assert!(session.client.engine.take_outgoing().is_empty());

    assert!(session.host.sync_method("Host.SpawnItem", None, args()).unwrap());
    session.settle();

    let inventory = &session.client.world.pawn(ada).unwrap().inventory;
    assert_eq!(inventory.len(), 1);
    assert_eq!(session.client.world.item(inventory[0]).unwrap().def, def("Rifle"));
    assert!(session.in_sync());
}

#[test]
fn delegate_replays_its_captured_environment() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);
    let order = HaulOrder {
        pawn: Some(ada),
        cell: CellPos::new(9, 9, 0),
        priority: 2,
    };

    let client = &mut session.client;
    assert!(client
        .engine
        .sync_delegate(&client.world, "Pawn.HaulTo", &order, Args::new())
        .unwrap());
    session.settle();

    assert_eq!(session.host.world.pawn(ada).unwrap().pos, CellPos::new(9, 9, 0));
    assert!(session
        .host
        .world
        .events
        .contains(&format!("{ada:?} hauls to {:?} priority 2", CellPos::new(9, 9, 0))));
    assert!(session.in_sync());
}

#[test]
fn delegate_declines_when_its_pawn_is_gone() {
    let (world, ada, _, _) = colony();
    let mut session = Session::new(world);
    let order = HaulOrder {
        pawn: Some(ada),
        cell: CellPos::new(4, 4, 0),
        priority: 1,
    };

    session
        .host
        .sync_method("Pawn.Kill", val(&ada), Args::new())
        .unwrap();
    let client = &mut session.client;
    client
        .engine
        .sync_delegate(&client.world, "Pawn.HaulTo", &order, Args::new())
        .unwrap();
    let (host, client) = session.settle();

    assert_eq!((host.executed, host.declined), (1, 1));
    assert_eq!((client.executed, client.declined), (1, 1));
    assert!(session.in_sync());
}

#[test]
fn choice_travels_as_an_option_index() {
    let (mut world, ada, _, _) = colony();
    let _steel = world.spawn_item(def("Steel"), HOME_MAP, Some(ada));
    let rifle = world.spawn_item(def("Rifle"), HOME_MAP, Some(ada));
    let mut session = Session::new(world);

    let client = &mut session.client;
    assert!(client
        .engine
        .sync_choice(&client.world, "Pawn.Equip", val(&ada), Args::new(), &rifle)
        .unwrap());
    assert!(!client
        .engine
        .sync_choice(&client.world, "Pawn.Equip", val(&ada), Args::new(), &ObjectId(999))
        .unwrap());
    session.settle();

    assert_eq!(session.host.world.pawn(ada).unwrap().equipped, Some(rifle));
    assert!(session.in_sync());
}

#[test]
fn rename_is_throttled() {
    let (world, _, _, _) = colony();
    let mut session = Session::new(world);

    for name in ["Haven", "Havenwood"] {
        assert!(session
            .host
            .sync_method("Colony.Rename", None, Args::new().with(name.to_string()))
            .unwrap());
    }
    assert_eq!(session.exchange(), 1);
    for _ in 0..=session.lead_ticks() {
        session.step();
    }

    assert_eq!(session.client.world.settings.colony_name, "Haven");
    assert!(session.in_sync());
}

#[test]
fn custom_commands_are_handed_back_in_order() {
    let (world, _, _, _) = colony();
    let mut session = Session::new(world);

    assert!(session.host.engine.queue_custom(7, MapId::GLOBAL, vec![1, 2]));
    assert!(session.client.engine.queue_custom(8, MapId::GLOBAL, vec![3]));
    let (host, client) = session.settle();

    let codes: Vec<(CommandKind, Vec<u8>)> = client
        .custom
        .iter()
        .map(|command| (command.kind, command.payload.clone()))
        .collect();
    assert_eq!(
        codes,
        vec![
            (CommandKind::Custom(7), vec![1, 2]),
            (CommandKind::Custom(8), vec![3]),
        ]
    );
    assert_eq!(host.custom, client.custom);
    assert_eq!(client.executed, 0);
}

#[test]
fn only_the_host_sequences() {
    let (world, _, _, _) = colony();
    let mut session = Session::new(world);
    let envelope = CommandEnvelope::new(CommandKind::Custom(1), MapId::GLOBAL, Vec::new());

    assert!(session.client.engine.sequence(envelope.clone(), 3).is_none());
    assert_eq!(session.host.engine.sequence(envelope, 3).unwrap().tick, 7);
}

#[test]
fn removed_map_drops_its_commands() {
    let (world, _, _, cy) = colony();
    let mut session = Session::new(world);

    session
        .client
        .sync_field("Pawn.drafted", val(&cy), val(&true), None)
        .unwrap();
    session.exchange();
    session.step();
    assert_eq!(session.client.engine.pending(CAVE_MAP), 1);

    session.host.world.remove_map(CAVE_MAP);
    session.client.world.remove_map(CAVE_MAP);
    let (host, client) = session.step();

    assert_eq!(host.executed + client.executed, 0);
    assert_eq!(session.client.engine.pending(CAVE_MAP), 0);
    let late = ScheduledCommand::new(
        CommandEnvelope::new(CommandKind::Custom(2), CAVE_MAP, Vec::new()),
        session.tick + 1,
    );
    assert!(!session.client.engine.receive(late));
    assert!(session.in_sync());
}

#[test]
fn map_created_late_keeps_its_commands() {
    let (world, _, _, _) = colony();
    let mut session = Session::new(world);
    let outpost = MapId(5);
    let early = ScheduledCommand::new(
        CommandEnvelope::new(CommandKind::Custom(3), outpost, vec![1]),
        1,
    );
    assert!(session.client.engine.receive(early));

    let client = &mut session.client;
    let report = client.engine.execute(&mut client.world, outpost, 1).unwrap();
    assert!(report.custom.is_empty());
    assert_eq!(client.engine.pending(outpost), 1);

    client.world.add_map(outpost);
    let report = client.engine.execute(&mut client.world, outpost, 2).unwrap();
    assert_eq!(report.custom.len(), 1);

    let later = ScheduledCommand::new(
        CommandEnvelope::new(CommandKind::Custom(3), outpost, vec![2]),
        3,
    );
    assert!(client.engine.receive(later));
}

#[test]
fn unknown_sync_id_is_fatal() {
    let (mut world, _, _, _) = colony();
    let mut engine = Engine::new(protocol(), HostType::Client).unwrap();
    engine.start_session();
    let bogus: SyncId = 999;
    let envelope = CommandEnvelope::new(
        CommandKind::Sync,
        MapId::GLOBAL,
        bogus.to_le_bytes().to_vec(),
    );
    engine.receive(ScheduledCommand::new(envelope, 1));

    let error = engine.execute(&mut world, MapId::GLOBAL, 1).unwrap_err();

    assert_eq!(error, HandlerError::UnknownSyncId { sync_id: 999 });
    assert!(error.is_protocol_fatal());
    assert!(!engine.is_executing());
    assert!(engine.should_sync());
}

#[test]
fn handler_lists_are_compared_at_handshake() {
    let host = Engine::new(protocol(), HostType::Host).unwrap();
    let client = Engine::new(protocol(), HostType::Client).unwrap();
    assert!(host
        .verify_remote_handlers(client.handler_list_hash())
        .is_ok());

    let mut stale = Protocol::<TestWorld>::builder();
    stale.add_method(SyncMethod::new("Pawn.Kill", |_: &mut TestWorld, _, _, _| {}));
    stale.lock();
    let stale = Engine::new(stale, HostType::Client).unwrap();

    let error = host
        .verify_remote_handlers(stale.handler_list_hash())
        .unwrap_err();
    assert!(matches!(error, HandlerError::HandlerListMismatch { .. }));
    assert!(error.is_protocol_fatal());
}
