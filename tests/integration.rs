//! Integration tests for ptp-vcam.
//!
//! These tests drive the real TCP drivers over loopback sockets.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ptp_vcam::config::{EmulatorConfig, FujiPorts};
use ptp_vcam::device::Model;
use ptp_vcam::driver::{init_ack, FujiServer, PtpIpServer};
use ptp_vcam::protocol::codes::{ec, op, prop, rc};
use ptp_vcam::protocol::{data_phase, BulkContainer, BulkKind, FramerConfig, InitIdentity};
use ptp_vcam::protocol::{PacketReader, PtpIpPacket};
use ptp_vcam::Result;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn config(model: Model) -> EmulatorConfig {
    EmulatorConfig::builder()
        .model(model)
        .bind_address(LOCALHOST)
        .ptpip_port(0)
        .fuji_ports(FujiPorts {
            command: 0,
            event: 0,
            liveview: 0,
        })
        .secondary_idle_tick(Duration::from_millis(10))
        .serve_forever(false)
        .build()
}

async fn start_ptpip(model: Model) -> (SocketAddr, JoinHandle<Result<()>>) {
    let server = PtpIpServer::bind(config(model)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let task = tokio::spawn(async move { server.run(CancellationToken::new()).await });
    (addr, task)
}

/// Minimal PTP/IP initiator.
struct Initiator {
    reader: PacketReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Initiator {
    async fn connect(addr: SocketAddr) -> Self {
        let (read_half, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: PacketReader::new(read_half, FramerConfig::default()),
            writer,
        }
    }

    async fn send(&mut self, packet: PtpIpPacket) {
        self.writer.write_all(&packet.encode()).await.unwrap();
    }

    async fn recv(&mut self) -> PtpIpPacket {
        let bytes = self.reader.read_packet().await.unwrap();
        PtpIpPacket::decode(&bytes).unwrap()
    }

    async fn init(&mut self) -> Bytes {
        self.send(PtpIpPacket::InitCommandRequest(InitIdentity {
            guid: [0x42; 16],
            name: "test host".to_string(),
            version: 0x0001_0000,
        }))
        .await;
        self.reader.read_packet().await.unwrap()
    }

    async fn command(&mut self, code: u16, transaction_id: u32, params: &[u32]) {
        self.send(PtpIpPacket::CommandRequest {
            data_phase: data_phase::NONE_OR_IN,
            code,
            transaction_id,
            params: params.to_vec(),
        })
        .await;
    }

    /// Send a command and read its bare response code.
    async fn transact(&mut self, code: u16, transaction_id: u32, params: &[u32]) -> u16 {
        self.command(code, transaction_id, params).await;
        match self.recv().await {
            PtpIpPacket::CommandResponse {
                code,
                transaction_id: tid,
                ..
            } => {
                assert_eq!(tid, transaction_id);
                code
            }
            other => panic!("expected CommandResponse, got {:?}", other),
        }
    }

    /// Read StartData + EndData + CommandResponse and return the payload.
    async fn recv_data(&mut self, transaction_id: u32) -> Bytes {
        let total = match self.recv().await {
            PtpIpPacket::StartData {
                transaction_id: tid,
                total_length,
            } => {
                assert_eq!(tid, transaction_id);
                total_length
            }
            other => panic!("expected StartData, got {:?}", other),
        };
        let payload = match self.recv().await {
            PtpIpPacket::EndData { payload, .. } => payload,
            other => panic!("expected EndData, got {:?}", other),
        };
        assert_eq!(payload.len() as u64, total);

        match self.recv().await {
            PtpIpPacket::CommandResponse { code, .. } => assert_eq!(code, rc::OK),
            other => panic!("expected CommandResponse, got {:?}", other),
        }
        payload
    }
}

fn words(payload: &[u8]) -> Vec<u32> {
    payload
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[tokio::test]
async fn test_ptpip_init_ack_is_canned() {
    let (addr, task) = start_ptpip(Model::Canon).await;
    let mut client = Initiator::connect(addr).await;

    let ack = client.init().await;
    assert_eq!(ack.len(), 46);
    assert_eq!(ack, init_ack().encode());

    drop(client);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_ptpip_event_channel_on_same_port() {
    let (addr, task) = start_ptpip(Model::Canon).await;
    let mut client = Initiator::connect(addr).await;
    client.init().await;

    let mut events = TcpStream::connect(addr).await.unwrap();
    events
        .write_all(&PtpIpPacket::InitEventRequest { connection_number: 1 }.encode())
        .await
        .unwrap();
    let mut ack = [0u8; 8];
    events.read_exact(&mut ack).await.unwrap();
    assert_eq!(
        PtpIpPacket::decode(&ack).unwrap(),
        PtpIpPacket::InitEventAck
    );

    // Command channel still answers after the side channel is up.
    assert_eq!(client.transact(op::OPEN_SESSION, 1, &[1]).await, rc::OK);

    drop(events);
    drop(client);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_ptpip_session_gating() {
    let (addr, task) = start_ptpip(Model::Generic).await;
    let mut client = Initiator::connect(addr).await;
    client.init().await;

    assert_eq!(
        client.transact(op::GET_STORAGE_IDS, 1, &[]).await,
        rc::SESSION_NOT_OPEN
    );
    assert_eq!(client.transact(op::OPEN_SESSION, 2, &[7]).await, rc::OK);
    assert_eq!(
        client.transact(op::OPEN_SESSION, 3, &[8]).await,
        rc::SESSION_ALREADY_OPEN
    );
    assert_eq!(
        client.transact(0x9999, 4, &[]).await,
        rc::OPERATION_NOT_SUPPORTED
    );

    client.command(op::GET_STORAGE_IDS, 5, &[]).await;
    assert_eq!(client.recv_data(5).await.as_ref(), &[0, 0, 0, 0]);

    drop(client);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_ptpip_device_info() {
    let (addr, task) = start_ptpip(Model::Canon).await;
    let mut client = Initiator::connect(addr).await;
    client.init().await;

    client.command(op::GET_DEVICE_INFO, 0, &[]).await;
    let info = client.recv_data(0).await;

    // StandardVersion 100, then the Canon vendor extension id.
    assert_eq!(&info[0..2], &100u16.to_le_bytes());
    assert_eq!(&info[2..6], &0x0Bu32.to_le_bytes());

    drop(client);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_eos_event_queue_over_ptpip() {
    let (addr, task) = start_ptpip(Model::Canon).await;
    let mut client = Initiator::connect(addr).await;
    client.init().await;

    assert_eq!(client.transact(op::OPEN_SESSION, 1, &[1]).await, rc::OK);
    assert_eq!(client.transact(op::EOS_SET_REMOTE_MODE, 2, &[1]).await, rc::OK);
    assert_eq!(client.transact(op::EOS_SET_EVENT_MODE, 3, &[1]).await, rc::OK);

    // First poll is the snapshot.
    client.command(op::EOS_GET_EVENT, 4, &[]).await;
    let snapshot = client.recv_data(4).await;
    assert!(snapshot.len() > 8);

    // Second poll with nothing queued is the empty terminator.
    client.command(op::EOS_GET_EVENT, 5, &[]).await;
    assert_eq!(words(&client.recv_data(5).await), vec![0, 0]);

    // SetDevicePropValueEx with an inbound data phase.
    let mut body = BytesMut::new();
    body.put_u32_le(12);
    body.put_u32_le(prop::EOS_APERTURE);
    body.put_u32_le(0x28);
    let body = body.freeze();

    client
        .send(PtpIpPacket::CommandRequest {
            data_phase: data_phase::OUT,
            code: op::EOS_SET_DEVICE_PROP_VALUE_EX,
            transaction_id: 6,
            params: vec![],
        })
        .await;
    client
        .send(PtpIpPacket::StartData {
            transaction_id: 6,
            total_length: body.len() as u64,
        })
        .await;
    client
        .send(PtpIpPacket::EndData {
            transaction_id: 6,
            payload: body,
        })
        .await;
    match client.recv().await {
        PtpIpPacket::CommandResponse {
            code,
            transaction_id,
            ..
        } => {
            assert_eq!(code, rc::OK);
            assert_eq!(transaction_id, 6);
        }
        other => panic!("expected CommandResponse, got {:?}", other),
    }

    client.command(op::EOS_GET_EVENT, 7, &[]).await;
    assert_eq!(
        words(&client.recv_data(7).await),
        vec![16, ec::EOS_PROP_VALUE_CHANGED, prop::EOS_APERTURE, 0x28]
    );

    drop(client);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_ptpip_idle_client_keeps_session() {
    let mut config = config(Model::Canon);
    config.framer = FramerConfig {
        idle_retries: 2,
        idle_interval_ms: 50,
        ..FramerConfig::default()
    };
    let server = PtpIpServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let task = tokio::spawn(async move { server.run(CancellationToken::new()).await });

    let mut client = Initiator::connect(addr).await;
    client.init().await;
    assert_eq!(client.transact(op::OPEN_SESSION, 1, &[1]).await, rc::OK);

    // Well past the 150 ms silence budget.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(
        client.transact(op::OPEN_SESSION, 2, &[1]).await,
        rc::SESSION_ALREADY_OPEN
    );

    drop(client);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_ptpip_probe() {
    let (addr, task) = start_ptpip(Model::Generic).await;
    let mut client = Initiator::connect(addr).await;
    client.init().await;

    client.send(PtpIpPacket::ProbeRequest).await;
    assert_eq!(client.recv().await, PtpIpPacket::ProbeResponse);

    drop(client);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_ptpip_rejects_command_before_init() {
    let (addr, task) = start_ptpip(Model::Generic).await;
    let mut client = Initiator::connect(addr).await;

    client.command(op::OPEN_SESSION, 1, &[1]).await;

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, ptp_vcam::VcamError::Protocol(_)));
}

#[tokio::test]
async fn test_ptpip_cancel_before_connect() {
    let server = PtpIpServer::bind(config(Model::Generic)).await.unwrap();
    let token = CancellationToken::new();

    token.cancel();
    assert!(!server.serve_one(&token).await.unwrap());
}

/// Read one raw bulk container off a Fuji socket.
async fn recv_bulk(reader: &mut PacketReader<tokio::net::tcp::OwnedReadHalf>) -> BulkContainer {
    BulkContainer::decode(&reader.read_packet().await.unwrap()).unwrap()
}

#[tokio::test]
async fn test_fuji_flow_opens_side_ports() {
    let server = FujiServer::bind(config(Model::Fuji)).await.unwrap();
    let [command, event, liveview] = server.local_addrs().unwrap();
    let task = tokio::spawn(async move { server.run(CancellationToken::new()).await });

    let (read_half, mut writer) = TcpStream::connect(command).await.unwrap().into_split();
    let mut reader = PacketReader::new(read_half, FramerConfig::default());

    // Any first packet gets the canned ack.
    writer.write_all(&[8, 0, 0, 0, 1, 0, 0, 0]).await.unwrap();
    let ack = reader.read_packet().await.unwrap();
    assert_eq!(ack.len(), 68);
    assert_eq!(&ack[28..36], &[b'X', 0, b'-', 0, b'A', 0, b'2', 0]);

    // Vendor device info works without a session.
    writer
        .write_all(&BulkContainer::command(op::FUJI_GET_DEVICE_INFO, 1, &[]).encode())
        .await
        .unwrap();
    let data = recv_bulk(&mut reader).await;
    assert_eq!(data.kind, BulkKind::Data);
    assert_eq!(recv_bulk(&mut reader).await.code, rc::OK);

    writer
        .write_all(&BulkContainer::command(op::OPEN_SESSION, 2, &[1]).encode())
        .await
        .unwrap();
    assert_eq!(recv_bulk(&mut reader).await.code, rc::OK);

    // Data phase travels as a plain Data container.
    let set = BulkContainer::command(op::SET_DEVICE_PROP_VALUE, 3, &[u32::from(prop::F_NUMBER)]);
    writer.write_all(&set.encode()).await.unwrap();
    writer
        .write_all(
            &BulkContainer::data(op::SET_DEVICE_PROP_VALUE, 3, Bytes::from_static(&[0x20, 0x03]))
                .encode(),
        )
        .await
        .unwrap();
    let response = recv_bulk(&mut reader).await;
    assert_eq!((response.kind, response.transaction_id), (BulkKind::Response, 3));

    writer
        .write_all(&BulkContainer::command(op::INITIATE_OPEN_CAPTURE, 4, &[]).encode())
        .await
        .unwrap();
    assert_eq!(recv_bulk(&mut reader).await.code, rc::OK);

    let event_socket = TcpStream::connect(event).await.unwrap();
    let liveview_socket = TcpStream::connect(liveview).await.unwrap();

    // A second request does not open the ports twice.
    writer
        .write_all(&BulkContainer::command(op::TERMINATE_OPEN_CAPTURE, 5, &[]).encode())
        .await
        .unwrap();
    assert_eq!(recv_bulk(&mut reader).await.code, rc::OK);

    drop(event_socket);
    drop(liveview_socket);
    drop(writer);
    drop(reader);
    task.await.unwrap().unwrap();
}
