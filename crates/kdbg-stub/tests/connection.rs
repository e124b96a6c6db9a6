use kdbg_stub::codec::{decode_command, encode_notification};
use kdbg_stub::{Notification, StubCommand, StubConnection, StubTransport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn connection_reports_connected_first() {
    let (host, _stub) = tokio::io::duplex(1024);
    let (_conn, mut notes) = StubConnection::spawn(host);
    assert_eq!(notes.recv().await, Some(Notification::Connected));
}

#[tokio::test]
async fn commands_reach_the_stub_in_order_with_sequence_numbers() {
    let (host, mut stub) = tokio::io::duplex(1024);
    let (conn, _notes) = StubConnection::spawn(host);

    conn.send(StubCommand::SetBreakpoint {
        slot: 0,
        address: 0x4010,
    })
    .unwrap();
    conn.send(StubCommand::Continue).unwrap();

    let mut buf = vec![0u8; 9];
    stub.read_exact(&mut buf).await.unwrap();

    let (first, seq1, used) = decode_command(&buf).unwrap().unwrap();
    let (second, seq2, _) = decode_command(&buf[used..]).unwrap().unwrap();
    assert_eq!(
        first,
        StubCommand::SetBreakpoint {
            slot: 0,
            address: 0x4010
        }
    );
    assert_eq!(second, StubCommand::Continue);
    assert_eq!(seq2, seq1.wrapping_add(1));
}

#[tokio::test]
async fn notifications_split_across_reads_are_reassembled() {
    let (host, mut stub) = tokio::io::duplex(1024);
    let (_conn, mut notes) = StubConnection::spawn(host);
    assert_eq!(notes.recv().await, Some(Notification::Connected));

    let bytes = encode_notification(&Notification::Text("kernel booted".into()));
    let (head, tail) = bytes.split_at(4);
    stub.write_all(head).await.unwrap();
    stub.flush().await.unwrap();
    tokio::task::yield_now().await;
    stub.write_all(tail).await.unwrap();

    assert_eq!(
        notes.recv().await,
        Some(Notification::Text("kernel booted".into()))
    );
}

#[tokio::test]
async fn closing_the_stream_reports_connection_lost_once() {
    let (host, mut stub) = tokio::io::duplex(1024);
    let (_conn, mut notes) = StubConnection::spawn(host);
    assert_eq!(notes.recv().await, Some(Notification::Connected));

    stub.write_all(&encode_notification(&Notification::Break(0x4010)))
        .await
        .unwrap();
    drop(stub);

    assert_eq!(notes.recv().await, Some(Notification::Break(0x4010)));
    assert!(matches!(
        notes.recv().await,
        Some(Notification::ConnectionLost(_))
    ));
    assert_eq!(notes.recv().await, None);
}

#[tokio::test]
async fn unknown_bytes_do_not_drop_the_connection() {
    let (host, mut stub) = tokio::io::duplex(1024);
    let (_conn, mut notes) = StubConnection::spawn(host);
    assert_eq!(notes.recv().await, Some(Notification::Connected));

    let mut bytes = vec![0x42];
    bytes.extend(encode_notification(&Notification::Started));
    stub.write_all(&bytes).await.unwrap();

    assert_eq!(notes.recv().await, Some(Notification::Unrecognized(0x42)));
    assert_eq!(notes.recv().await, Some(Notification::Started));
}
