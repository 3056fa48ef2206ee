use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_async;
use tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::RaceError;
use crate::state::{ServerMessage, SharedGameState};
use crate::vehicle::ControlCommand;

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Input {
        #[serde(default)]
        throttle: f32,
        #[serde(default)]
        steer: f32,
        #[serde(default)]
        handbrake: bool,
    },
    Ping,
}

pub async fn start_websocket_server(
    addr: SocketAddr,
    state: Arc<Mutex<SharedGameState>>,
) -> Result<(), RaceError> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket listening on ws://{}", addr);

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };

        tokio::spawn(handle_connection(raw, peer, Arc::clone(&state)));
    }
}

async fn handle_connection(raw: TcpStream, peer: SocketAddr, state: Arc<Mutex<SharedGameState>>) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!(%peer, %err, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) Outgoing message channel + send loop
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 2) Register, claim a player racer, welcome
    // -------------------------------
    let client = {
        let mut game = state.lock().await;
        let client = game.register_client(tx);
        let racer = game.claim_slot(client);
        game.send_to(
            client,
            &ServerMessage::Welcome {
                client_id: client,
                racer_id: racer,
                track: &game.track_name,
            },
        );
        info!(%peer, %client, racer = ?racer, "client connected");
        client
    };

    // -------------------------------
    // 3) Receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(err) => {
                debug!(%client, %err, "read error");
                break;
            }
        };

        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else { continue };

        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Ping) => {
                state.lock().await.send_to(client, &ServerMessage::Pong);
            }
            Ok(ClientMessage::Input { throttle, steer, handbrake }) => {
                let command = ControlCommand::new(throttle, steer, handbrake);
                if !state.lock().await.set_input(client, command) {
                    debug!(%client, "input from spectator ignored");
                }
            }
            Err(err) => debug!(%client, %err, "unparseable client message"),
        }
    }

    info!(%client, "client disconnected");
    state.lock().await.release(client);
}
