//! Integration tests for bowler-client.
//!
//! A scripted mock device sits on the far end of an in-memory duplex
//! stream: it frames requests with the same protocol stack, hands each
//! parsed request to a reply function, and mirrors every request to the
//! test through a channel so byte-level assertions stay in the test body.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use bowler_client::codec::PacketAssembler;
use bowler_client::protocol::{assemble_packet, FrameBuffer, ParsedPacket};
use bowler_client::registry::NamespaceIdTable;
use bowler_client::transport::loopback;
use bowler_client::{namespaces, BowlerValue, Device, DeviceOptions, MacAddress, Method};

/// Device-side namespace table shared by the mock and its reply builders.
fn device_ids() -> NamespaceIdTable {
    let mut ids = NamespaceIdTable::new();
    ids.insert(1, "bcs.rpc");
    ids.insert(2, "neuronrobotics.dyio");
    ids.insert(3, "bcs.io");
    ids
}

/// Status reply with a raw body.
fn status_reply(ids: &NamespaceIdTable, namespace: &str, rpc: &str, body: &[u8]) -> Bytes {
    let mut asm = PacketAssembler::new();
    if !body.is_empty() {
        asm.put_bytes(0, body);
    }
    assemble_packet(MacAddress::BROADCAST, Method::Status, namespace, rpc, ids, asm).unwrap()
}

/// `_nms` composite reply: `"name;version\0"` plus the namespace count.
fn nms_reply(ids: &NamespaceIdTable, name: &str, count: u8) -> Bytes {
    let mut body = Vec::new();
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(b";1.0.0\x00");
    body.push(count);
    status_reply(ids, "bcs.core", "_nms", &body)
}

/// Spawn the scripted device. Every parsed request is mirrored on the
/// returned channel; `reply` builds zero or more response packets.
fn spawn_mock_device(
    mut stream: DuplexStream,
    mut reply: impl FnMut(&ParsedPacket) -> Vec<Bytes> + Send + 'static,
) -> mpsc::UnboundedReceiver<ParsedPacket> {
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let ids = device_ids();
        let mut frames = FrameBuffer::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            for packet in frames.push(&buf[..n]).packets {
                let request = ParsedPacket::parse(&packet, &ids).expect("mock parses requests");
                let _ = seen_tx.send(request.clone());
                for bytes in reply(&request) {
                    if stream.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
    seen_rx
}

fn quiet_options() -> DeviceOptions {
    DeviceOptions {
        introspect_namespaces: false,
        introspect_rpcs: false,
        heartbeat: None,
        request_timeout: Duration::from_millis(300),
        ..DeviceOptions::default()
    }
}

/// Ping round-trip: documented request bytes out, empty reply decoded.
#[tokio::test]
async fn test_ping_round_trip() {
    let (transport, peer) = loopback(1024);
    let mut seen = spawn_mock_device(peer, |request| {
        assert_eq!(request.rpc, "_png");
        vec![status_reply(&device_ids(), "bcs.core", "_png", &[])]
    });

    let device = Device::connect(transport, quiet_options()).await.unwrap();
    let reply = device
        .command_to()
        .at("bcs.core")
        .rpc("_png")
        .call(&[])
        .await
        .unwrap();
    assert!(reply.is_empty());

    let request = seen.recv().await.unwrap();
    assert_eq!(request.header.method, Method::Get);
    assert_eq!(request.header.size, 4);
    assert_eq!(request.header.checksum, 0x11);
    assert!(request.header.mac.is_broadcast());
    device.shutdown().await;
}

/// Namespace discovery fills the id table from `_nms` composite replies.
#[tokio::test]
async fn test_namespace_discovery() {
    let (transport, peer) = loopback(1024);
    let names = ["bcs.core", "bcs.rpc", "neuronrobotics.dyio"];
    let _seen = spawn_mock_device(peer, move |request| {
        assert_eq!(request.rpc, "_nms");
        let index = request.body[0] as usize;
        vec![nms_reply(&device_ids(), names[index], names.len() as u8)]
    });

    let options = DeviceOptions {
        introspect_namespaces: true,
        ..quiet_options()
    };
    let device = Device::connect(transport, options).await.unwrap();

    let ids = device.dispatcher().namespace_ids();
    assert_eq!(
        ids,
        vec![
            (0, "bcs.core".to_string()),
            (1, "bcs.rpc".to_string()),
            (2, "neuronrobotics.dyio".to_string()),
        ]
    );
    device.shutdown().await;
}

/// Multi-method dispatch: `_pwr.critical(true)` vs `_pwr.get()` byte-level.
#[tokio::test]
async fn test_multi_method_dispatch() {
    let (transport, peer) = loopback(1024);
    let mut seen = spawn_mock_device(peer, |_request| {
        // override on, 7.4 volts
        vec![status_reply(
            &device_ids(),
            "neuronrobotics.dyio",
            "_pwr",
            &[0x01, 0x00, 0x00, 0x1C, 0xE8],
        )]
    });

    let device = Device::connect(transport, quiet_options()).await.unwrap();
    device
        .supports_namespace(namespaces::dyio::contribution())
        .unwrap();
    device.dispatcher().register_namespace_id(2, "neuronrobotics.dyio");

    let power = device.command_to().at("neuronrobotics.dyio").rpc("_pwr");

    power.critical().call(&[true.into()]).await.unwrap();
    let request = seen.recv().await.unwrap();
    assert_eq!(request.header.method, Method::Critical);
    assert_eq!(request.header.method.code(), 0x30);
    assert_eq!(&request.body[..], &[0x01]);
    assert_eq!(request.header.size as usize, 4 + request.body.len());

    let state = power.get().call(&[]).await.unwrap();
    let request = seen.recv().await.unwrap();
    assert_eq!(request.header.method, Method::Get);
    assert_eq!(request.header.method.code(), 0x10);
    assert!(request.body.is_empty());
    assert_eq!(state.get("override"), Some(&BowlerValue::Bool(true)));
    assert_eq!(state.get("voltage"), Some(&BowlerValue::Fixed1000(7.4)));
    device.shutdown().await;
}

/// Two coalesced replies in one chunk resolve two pending calls in order.
#[tokio::test]
async fn test_framing_coalescence_and_fifo() {
    let (transport, mut peer) = loopback(4096);
    let device = Device::connect(transport, quiet_options()).await.unwrap();

    let png = device.command_to().at("bcs.core").rpc("_png");
    let first = png.defer(&[]).await.unwrap();
    let second = png.defer(&[]).await.unwrap();

    // drain the two requests, then answer both in a single 30-byte write
    let mut buf = [0u8; 64];
    let mut got = 0;
    while got < 30 {
        got += peer.read(&mut buf[got..]).await.unwrap();
    }
    let ids = device_ids();
    let mut chunk = status_reply(&ids, "bcs.core", "_png", &[]).to_vec();
    chunk.extend_from_slice(&status_reply(&ids, "bcs.core", "_png", &[]));
    assert_eq!(chunk.len(), 30);
    peer.write_all(&chunk).await.unwrap();

    first.wait().await.unwrap();
    second.wait().await.unwrap();
    device.shutdown().await;
}

/// FIFO correlation with distinct observable replies.
#[tokio::test]
async fn test_fifo_correlation_orders_identical_calls() {
    let (transport, peer) = loopback(4096);
    let mut counter = 0u8;
    let _seen = spawn_mock_device(peer, move |request| {
        assert_eq!(request.rpc, "gchm");
        counter += 1;
        vec![status_reply(
            &device_ids(),
            "bcs.io",
            "gchm",
            &[request.body[0], counter],
        )]
    });

    let device = Device::connect(transport, quiet_options()).await.unwrap();
    device
        .supports_namespace(namespaces::io::contribution())
        .unwrap();
    device.dispatcher().register_namespace_id(3, "bcs.io");

    let gchm = device.command_to().at("bcs.io").rpc("gchm");
    let a = gchm.defer(&[BowlerValue::UInt8(1)]).await.unwrap();
    let b = gchm.defer(&[BowlerValue::UInt8(2)]).await.unwrap();

    let ra = a.wait().await.unwrap();
    let rb = b.wait().await.unwrap();
    assert_eq!(ra.get("mode"), Some(&BowlerValue::UInt8(1)));
    assert_eq!(rb.get("mode"), Some(&BowlerValue::UInt8(2)));
    device.shutdown().await;
}

/// Full RPC introspection synthesizes callable entries from type codes.
#[tokio::test]
async fn test_rpc_introspection_generates_codecs() {
    let (transport, peer) = loopback(4096);

    // the device advertises one RPC the host has no contribution for:
    // neuronrobotics.dyio#gvlt, get -> status, recv row [FixedPointThreePlaces]
    let _seen = spawn_mock_device(peer, move |request| {
        let ids = device_ids();
        match (request.namespace.as_str(), request.rpc.as_str()) {
            ("bcs.core", "_nms") => {
                let names = ["bcs.core", "bcs.rpc", "neuronrobotics.dyio"];
                let index = request.body[0] as usize;
                vec![nms_reply(&ids, names[index], names.len() as u8)]
            }
            ("bcs.rpc", "_rpc") => {
                let (ns, index) = (request.body[0], request.body[1]);
                // only the dyio namespace reports an RPC
                if ns == 2 {
                    assert_eq!(index, 0);
                    vec![status_reply(&ids, "bcs.rpc", "_rpc", &[ns, 0, 1, b'g', b'v', b'l', b't'])]
                } else {
                    vec![status_reply(&ids, "bcs.rpc", "_rpc", &[ns, index, 0, 0, 0, 0, 0])]
                }
            }
            ("bcs.rpc", "args") => {
                let (ns, index) = (request.body[0], request.body[1]);
                vec![status_reply(
                    &ids,
                    "bcs.rpc",
                    "args",
                    // send get with no args, recv status with one fixed-point
                    &[ns, index, 0x10, 0, 0x00, 1, 42],
                )]
            }
            ("neuronrobotics.dyio", "gvlt") => {
                assert_eq!(request.header.method, Method::Get);
                vec![status_reply(
                    &ids,
                    "neuronrobotics.dyio",
                    "gvlt",
                    &[0x00, 0x00, 0x1C, 0xED],
                )]
            }
            other => panic!("unexpected request {other:?}"),
        }
    });

    let options = DeviceOptions {
        introspect_namespaces: true,
        introspect_rpcs: true,
        ..quiet_options()
    };
    let device = Device::connect(transport, options).await.unwrap();

    // the synthesized entry is callable and decodes by the declared row
    let reply = device
        .command_to()
        .at("neuronrobotics.dyio")
        .rpc("gvlt")
        .call(&[])
        .await
        .unwrap();
    assert_eq!(reply.get("arg0"), Some(&BowlerValue::Fixed1000(7.405)));

    // and it shows up in the catalog
    let json = device.catalog_json().unwrap();
    assert!(json.contains("gvlt"));
    device.shutdown().await;
}

/// A corrupted checksum drops the packet; the next good reply still lands.
#[tokio::test]
async fn test_bad_checksum_dropped_good_reply_delivered() {
    let (transport, mut peer) = loopback(4096);
    let device = Device::connect(transport, quiet_options()).await.unwrap();

    let pending = device
        .command_to()
        .at("bcs.core")
        .rpc("_png")
        .defer(&[])
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let _ = peer.read(&mut buf).await.unwrap();

    let ids = device_ids();
    let mut corrupted = status_reply(&ids, "bcs.core", "_png", &[]).to_vec();
    corrupted[10] ^= 0xFF;
    // follow the corrupt packet with a clean one
    corrupted.extend_from_slice(&status_reply(&ids, "bcs.core", "_png", &[]));
    peer.write_all(&corrupted).await.unwrap();

    pending.wait().await.unwrap();
    device.shutdown().await;
}

/// Write failure after peer teardown surfaces as TransportClosed.
#[tokio::test]
async fn test_transport_teardown_fails_calls() {
    let (transport, peer) = loopback(64);
    let device = Device::connect(transport, quiet_options()).await.unwrap();
    drop(peer);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = device
        .command_to()
        .at("bcs.core")
        .rpc("_png")
        .call(&[])
        .await;
    assert!(matches!(
        result,
        Err(bowler_client::BowlerError::TransportClosed)
    ));
}

/// Heartbeat pings flow without any explicit call.
#[tokio::test]
async fn test_heartbeat_pings_periodically() {
    let (transport, peer) = loopback(1024);
    let mut seen = spawn_mock_device(peer, |request| {
        assert_eq!(request.rpc, "_png");
        vec![status_reply(&device_ids(), "bcs.core", "_png", &[])]
    });

    let options = DeviceOptions {
        heartbeat: Some(Duration::from_millis(30)),
        ..quiet_options()
    };
    let device = Device::connect(transport, options).await.unwrap();

    // two beats is enough to prove the loop is alive
    let first = seen.recv().await.unwrap();
    let second = seen.recv().await.unwrap();
    assert_eq!(first.rpc, "_png");
    assert_eq!(second.rpc, "_png");
    device.shutdown().await;
}
