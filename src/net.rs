use std::sync::Arc;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_async;
use tungstenite::Message;
use uuid::Uuid;

use crate::race_core::hud::HudEvent;
use crate::state::{ClientRole, InputFrame, SharedGameState};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Input(InputFrame),
    Ping,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ServerMessage<'a> {
    Welcome {
        client_id: Uuid,
        role: ClientRole,
        hud: &'a [HudEvent],
    },
    Pong,
}

pub async fn start_websocket_server(addr: String, state: Arc<Mutex<SharedGameState>>) -> Result<()> {
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("binding WebSocket port {addr}"))?;

    info!("WebSocket listening on ws://{addr}");

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        let state_clone = Arc::clone(&state);

        tokio::spawn(async move {
            if let Err(e) = handle_client(raw, state_clone).await {
                warn!("client {peer}: {e:#}");
            }
        });
    }
}

async fn handle_client(raw: TcpStream, state: Arc<Mutex<SharedGameState>>) -> Result<()> {
    let ws = accept_async(raw).await.wrap_err("WebSocket handshake")?;
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) Outgoing message channel
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // -------------------------------
    // 2) Register + welcome (with the HUD a late joiner missed)
    // -------------------------------
    let client_id = {
        let mut game = state.lock().await;
        let (id, role) = game.register_client(tx.clone());
        let welcome = serde_json::to_string(&ServerMessage::Welcome {
            client_id: id,
            role,
            hud: &game.hud_history,
        })?;
        let _ = tx.send(welcome);
        id
    };

    // -------------------------------
    // 3) Send loop
    // -------------------------------
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 4) Receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                debug!("client {client_id} read error: {e}");
                break;
            }
        };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else { continue };

        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Ping) => {
                let _ = tx.send(serde_json::to_string(&ServerMessage::Pong)?);
            }
            Ok(ClientMessage::Input(input)) => {
                state.lock().await.update_input(&client_id, input);
            }
            Err(e) => debug!("client {client_id}: ignoring message ({e})"),
        }
    }

    info!("client {client_id} disconnected");
    state.lock().await.remove_client(&client_id);
    Ok(())
}
