use std::any::Any;

use lockstep_shared::{
    CommandEnvelope, EngineConfig, HandlerError, HostType, MapId, ScheduledCommand, SerdeErr,
    ValueRef,
};
use lockstep_test::{to_bytes, Peer, TestWorld};

fn val<T: Any>(value: &T) -> ValueRef<'_> {
    Some(value)
}

/// Encodes a `Settings.speed = speed` command without running it.
fn speed_command(issuer: &mut Peer, speed: u8) -> CommandEnvelope {
    issuer
        .sync_field("Settings.speed", None, val(&speed), None)
        .unwrap();
    let mut outgoing = issuer.engine.take_outgoing();
    assert_eq!(outgoing.len(), 1);
    outgoing.remove(0)
}

fn peer(host_type: HostType) -> Peer {
    Peer::new(host_type, EngineConfig::default(), TestWorld::new())
}

#[test]
fn commands_run_in_tick_then_arrival_order() {
    let mut issuer = peer(HostType::Client);
    let c1 = speed_command(&mut issuer, 2);
    let c2 = speed_command(&mut issuer, 3);
    let c3 = speed_command(&mut issuer, 4);

    let mut receiver = peer(HostType::Client);
    receiver.engine.receive(ScheduledCommand::new(c1, 100));
    receiver.engine.receive(ScheduledCommand::new(c2, 100));
    receiver.engine.receive(ScheduledCommand::new(c3, 99));

    assert_eq!(receiver.execute(98).unwrap().executed, 0);
    assert_eq!(receiver.engine.pending(MapId::GLOBAL), 3);

    let report = receiver.execute(100).unwrap();

    assert_eq!(report.executed, 3);
    assert_eq!(receiver.world.events, vec!["speed 4", "speed 2", "speed 3"]);
    assert_eq!(receiver.world.settings.speed, 3);
}

#[test]
fn late_command_runs_at_the_next_step() {
    let mut issuer = peer(HostType::Client);
    let early = speed_command(&mut issuer, 2);
    let late = speed_command(&mut issuer, 5);

    let mut receiver = peer(HostType::Client);
    receiver.engine.receive(ScheduledCommand::new(early, 10));
    receiver.execute(10).unwrap();
    receiver.engine.receive(ScheduledCommand::new(late, 9));

    let report = receiver.execute(11).unwrap();

    assert_eq!(report.executed, 1);
    assert_eq!(receiver.world.settings.speed, 5);
}

#[test]
fn host_stamps_are_monotonic_per_map() {
    let mut issuer = peer(HostType::Client);
    let mut host = peer(HostType::Host);
    let lead = host.engine.config().command_lead_ticks;

    let first = host.engine.sequence(speed_command(&mut issuer, 2), 10).unwrap();
    // an envelope that spent longer on the wire
    let second = host.engine.sequence(speed_command(&mut issuer, 3), 8).unwrap();

    assert_eq!(first.tick, 10 + lead);
    assert_eq!(second.tick, first.tick);
}

#[test]
fn broadcast_bytes_round_trip_to_the_same_order() {
    let mut issuer = peer(HostType::Client);
    let mut host = peer(HostType::Host);
    let mut receiver = peer(HostType::Client);

    for speed in [2, 3, 4] {
        let command = host
            .engine
            .sequence(speed_command(&mut issuer, speed), 0)
            .unwrap();
        assert!(receiver.engine.receive_bytes(&to_bytes(&command)).unwrap());
    }
    receiver.execute(host.engine.config().command_lead_ticks).unwrap();

    assert_eq!(receiver.world.events, vec!["speed 2", "speed 3", "speed 4"]);
}

#[test]
fn oversized_payload_is_refused_before_allocation() {
    let config = EngineConfig {
        max_payload_len: 4,
        ..EngineConfig::default()
    };
    let mut issuer = peer(HostType::Client);
    let mut receiver = Peer::new(HostType::Client, config, TestWorld::new());
    let command = ScheduledCommand::new(speed_command(&mut issuer, 2), 1);

    let error = receiver
        .engine
        .receive_bytes(&to_bytes(&command))
        .unwrap_err();

    assert!(matches!(
        error,
        HandlerError::Serde(SerdeErr::BlobTooLong { max: 4, .. })
    ));
    assert_eq!(receiver.engine.pending(MapId::GLOBAL), 0);
}
