use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use uuid::Uuid;

use crate::hud::HudEvent;
use crate::session::RacerSnapshot;
use crate::vehicle::ControlCommand;

/// Send a snapshot every N ticks (20 Hz at the default 60 Hz tick)
pub const SNAPSHOT_EVERY: u64 = 3;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    Welcome {
        client_id: Uuid,
        racer_id: Option<Uuid>,
        track: &'a str,
    },
    Pong,
    Snapshot {
        tick: u64,
        racers: &'a [RacerSnapshot],
    },
    Hud(&'a HudEvent),
}

pub struct SharedGameState {
    pub tick: u64,
    pub track_name: String,
    clients: HashMap<Uuid, UnboundedSender<String>>,  // client id -> outgoing channel
    free_slots: Vec<Uuid>,                            // player racers nobody drives yet
    claimed: HashMap<Uuid, Uuid>,                     // client id -> racer id
    inputs: HashMap<Uuid, ControlCommand>,            // racer id -> latest input
}

impl SharedGameState {
    pub fn new(player_slots: Vec<Uuid>, track_name: impl Into<String>) -> Self {
        let mut free_slots = player_slots;
        // pop() hands out the first slot first
        free_slots.reverse();

        Self {
            tick: 0,
            track_name: track_name.into(),
            clients: HashMap::new(),
            free_slots,
            claimed: HashMap::new(),
            inputs: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn register_client(&mut self, tx: UnboundedSender<String>) -> Uuid {
        let client = Uuid::new_v4();
        self.clients.insert(client, tx);
        client
    }

    /// Give the client a free player racer; spectators get `None`.
    pub fn claim_slot(&mut self, client: Uuid) -> Option<Uuid> {
        if let Some(racer) = self.claimed.get(&client) {
            return Some(*racer);
        }

        let racer = self.free_slots.pop()?;
        self.claimed.insert(client, racer);
        info!(%client, %racer, "player slot claimed");
        Some(racer)
    }

    pub fn set_input(&mut self, client: Uuid, command: ControlCommand) -> bool {
        match self.claimed.get(&client) {
            Some(racer) => {
                self.inputs.insert(*racer, command);
                true
            }
            None => false,
        }
    }

    /// Drop the client; its racer goes back to the pool with neutral input.
    pub fn release(&mut self, client: Uuid) {
        self.clients.remove(&client);
        if let Some(racer) = self.claimed.remove(&client) {
            self.inputs.insert(racer, ControlCommand::default());
            self.free_slots.push(racer);
            info!(%client, %racer, "player slot released");
        }
    }

    pub fn player_inputs(&self) -> Vec<(Uuid, ControlCommand)> {
        self.inputs.iter().map(|(id, cmd)| (*id, *cmd)).collect()
    }

    pub fn send_to(&self, client: Uuid, msg: &ServerMessage<'_>) {
        if let (Some(tx), Ok(json)) = (self.clients.get(&client), serde_json::to_string(msg)) {
            let _ = tx.send(json);
        }
    }

    fn broadcast(&self, msg: &ServerMessage<'_>) {
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(err) => {
                debug!(%err, "message not serialisable");
                return;
            }
        };

        for tx in self.clients.values() {
            let _ = tx.send(json.clone());
        }
    }

    pub fn broadcast_hud(&self, events: &[HudEvent]) {
        for event in events {
            self.broadcast(&ServerMessage::Hud(event));
        }
    }

    pub fn broadcast_snapshot(&self, racers: &[RacerSnapshot]) {
        self.broadcast(&ServerMessage::Snapshot {
            tick: self.tick,
            racers,
        });
    }
}
