//! In-process mock cache node for integration tests.
//!
//! Speaks the real wire protocol over TCP: login handshake with a
//! plaintext ack, then framed commands against a small in-memory store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use roomzin_client::protocol::{decode_fields, encode_frame, read_frame, Field};

pub const MOCK_TOKEN: &str = "mock-token";
pub const MOCK_CODECS: &str = "wifi,pool,gym|free_cancellation,breakfast";

#[derive(Default)]
struct Store {
    /// property id -> segment
    properties: BTreeMap<String, String>,
    /// property id -> room types
    rooms: BTreeMap<String, BTreeSet<String>>,
}

/// A running mock node; dropping the handle stops accepting.
pub struct MockNode {
    pub port: u16,
    _accept_task: tokio::task::JoinHandle<()>,
}

pub async fn spawn_mock_node() -> MockNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let store = Arc::new(Mutex::new(Store::default()));

    let accept_task = tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let store = store.clone();
            tokio::spawn(async move {
                let _ = serve_connection(socket, store).await;
            });
        }
    });

    MockNode {
        port,
        _accept_task: accept_task,
    }
}

async fn serve_connection(
    mut socket: TcpStream,
    store: Arc<Mutex<Store>>,
) -> std::io::Result<()> {
    // Login frame, then plaintext ack.
    let Ok((_, login_payload)) = read_frame(&mut socket).await else {
        return Ok(());
    };
    let (_, fields) = split_command(&login_payload);
    let token_ok = fields
        .first()
        .map(|f| f.as_text() == MOCK_TOKEN)
        .unwrap_or(false);
    if !token_ok {
        socket.write_all(b"LOGIN FAILED").await?;
        return Ok(());
    }
    socket.write_all(b"LOGIN OK").await?;

    loop {
        let Ok((header, payload)) = read_frame(&mut socket).await else {
            return Ok(());
        };
        let (name, fields) = split_command(&payload);
        let body = handle_command(&store, &name, &fields);
        socket
            .write_all(&encode_frame(header.correlation_id, &body))
            .await?;
    }
}

fn split_command(payload: &Bytes) -> (String, Vec<Field>) {
    let name_len = payload[0] as usize;
    let name = String::from_utf8_lossy(&payload[1..1 + name_len]).into_owned();
    let count = u16::from_le_bytes([payload[1 + name_len], payload[2 + name_len]]);
    let region = payload.slice(3 + name_len..);
    let fields = decode_fields(&region, count).unwrap_or_default();
    (name, fields)
}

fn handle_command(store: &Arc<Mutex<Store>>, name: &str, fields: &[Field]) -> Bytes {
    let mut store = store.lock().unwrap();
    match name {
        "GETCODECS" => success(&[Field {
            id: 1,
            field_type: 0x09,
            data: Bytes::from_static(MOCK_CODECS.as_bytes()),
        }]),
        "SETPROP" => {
            let segment = fields[0].as_text();
            let property_id = fields[2].as_text();
            store.properties.insert(property_id, segment);
            success(&[])
        }
        "PROPEXIST" => {
            let exists = store.properties.contains_key(&fields[0].as_text());
            success(&[Field::byte(1, exists as u8)])
        }
        "DELPROP" => {
            let property_id = fields[0].as_text();
            store.properties.remove(&property_id);
            store.rooms.remove(&property_id);
            success(&[])
        }
        "SETROOMPKG" => {
            let property_id = fields[0].as_text();
            let room_type = fields[1].as_text();
            store.rooms.entry(property_id).or_default().insert(room_type);
            success(&[])
        }
        "PROPROOMLIST" => {
            let property_id = fields[0].as_text();
            let rooms = store.rooms.get(&property_id).cloned().unwrap_or_default();
            let out: Vec<Field> = rooms
                .iter()
                .enumerate()
                .map(|(i, room)| Field::string((i + 1) as u16, room))
                .collect();
            success(&out)
        }
        "SETROOMAVL" | "INCROOMAVL" | "DECROOMAVL" => {
            let amount = fields[3].data[0];
            success(&[Field::byte(1, amount)])
        }
        "SEARCHPROP" => {
            let segment = fields[0].as_text();
            let matched: Vec<String> = store
                .properties
                .iter()
                .filter(|(_, seg)| **seg == segment)
                .map(|(id, _)| id.clone())
                .collect();
            if matched.is_empty() {
                return error_response("NOT_FOUND:no properties in segment");
            }
            let out: Vec<Field> = matched
                .iter()
                .enumerate()
                .map(|(i, id)| Field {
                    id: (i + 1) as u16,
                    field_type: 0x01,
                    data: short_string_id(id),
                })
                .collect();
            success(&out)
        }
        "GETSEGMENTS" => {
            let mut counts: BTreeMap<String, u32> = BTreeMap::new();
            for segment in store.properties.values() {
                *counts.entry(segment.clone()).or_default() += 1;
            }
            let mut out = Vec::new();
            for (i, (segment, count)) in counts.iter().enumerate() {
                out.push(Field::string((i * 2 + 1) as u16, segment));
                out.push(Field::u32((i * 2 + 2) as u16, *count));
            }
            success(&out)
        }
        _ => error_response("VALIDATION_ERROR:unknown command"),
    }
}

/// Encode a property id in the 16-byte short-string form.
fn short_string_id(id: &str) -> Bytes {
    let mut raw = [0u8; 16];
    let bytes = id.as_bytes();
    let left = bytes.len().min(6);
    raw[..left].copy_from_slice(&bytes[..left]);
    raw[6] = 0xF0;
    let right = (bytes.len() - left).min(9);
    raw[7..7 + right].copy_from_slice(&bytes[left..left + right]);
    Bytes::copy_from_slice(&raw)
}

fn success(fields: &[Field]) -> Bytes {
    response("SUCCESS", fields)
}

fn error_response(message: &str) -> Bytes {
    response("ERROR", &[Field::string(1, message)])
}

fn response(status: &str, fields: &[Field]) -> Bytes {
    let encoded = roomzin_client::protocol::encode_fields(fields);
    let mut body = BytesMut::new();
    body.put_u8(status.len() as u8);
    body.put_slice(status.as_bytes());
    body.put_u16_le(fields.len() as u16);
    body.put_slice(&encoded);
    body.freeze()
}
