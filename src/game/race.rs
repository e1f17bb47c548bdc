//! Race loop: fixed-rate ticks until someone reaches the finish line

use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::util::time::{race_tick, unix_millis};
use crate::ws::protocol::ServerMsg;

use super::player::PlayerId;
use super::registry::SharedRoom;
use super::room::Room;
use super::{session, snapshot};

/// Drive race `epoch` until it ends, the room stops running or a newer game starts
pub async fn run(shared: SharedRoom, epoch: u64) {
    let mut ticker = interval(race_tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let mut room = shared.lock();
        if !room.is_running_epoch(epoch) {
            debug!(room_code = %room.code, epoch, "Race loop stopping");
            break;
        }
        if tick(&mut room, unix_millis()).is_some() {
            session::end_game(&mut room, &shared);
            break;
        }
    }
}

/// One race step: sabotage, AI presses, movement, then the snapshot.
/// Returns the tick's first finisher.
pub fn tick(room: &mut Room, now: u64) -> Option<PlayerId> {
    room.aggregate_sabotage(now);
    room.drive_race_ai(now);
    let finisher = room.advance_racers(now);
    room.bump_race_tick();
    room.broadcast(ServerMsg::GameStateUpdate(snapshot::race_snapshot(room)));
    finisher
}
