use crossbeam_channel::bounded;
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::Message;
use webmpc_mock_server::{MainLoop, MockServer, NetworkThread};
use webmpc_protocol::{
    decode_server_message, ClientCommand, Decoded, PlaybackState, ServerMessage,
};

type Ws = tungstenite::WebSocket<TcpStream>;

fn connect(addr: std::net::SocketAddr, subprotocol: Option<&str>) -> (Ws, Option<String>) {
    let stream = TcpStream::connect(addr).expect("tcp connect");
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(200)));

    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    if let Some(p) = subprotocol {
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_str(p).unwrap());
    }
    let (ws, response) = tungstenite::client(request, stream).expect("ws connect");
    let _ = ws.get_ref().set_read_timeout(Some(Duration::from_millis(50)));
    let agreed = response
        .headers()
        .get("Sec-WebSocket-Protocol")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    (ws, agreed)
}

fn send(ws: &mut Ws, cmd: &ClientCommand) {
    ws.send(Message::Text(serde_json::to_string(cmd).unwrap().into()))
        .unwrap();
}

fn read_server_message(ws: &mut Ws, mut tick: impl FnMut(), timeout: Duration) -> ServerMessage {
    let deadline = Instant::now() + timeout;
    loop {
        tick();
        match ws.read() {
            Ok(Message::Text(s)) => match decode_server_message(s.as_str()).expect("valid server json") {
                Decoded::Message(msg) => return msg,
                Decoded::UnknownType(t) => panic!("unexpected type {t}"),
            },
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => panic!("ws read failed: {e:?}"),
        }
        if Instant::now() >= deadline {
            panic!("timeout waiting for server message");
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn ws_subprotocol_queries_and_queue_updates() {
    let (in_tx, in_rx) = bounded(webmpc_mock_server::INBOUND_CAP);
    let (out_tx, out_rx) = bounded(webmpc_mock_server::OUTBOUND_CAP);

    let net = NetworkThread::spawn_with_addr("127.0.0.1:0", in_tx, out_rx).expect("spawn net");
    let mut main_loop = MainLoop::new(in_rx, out_tx);
    let log = main_loop.command_log();

    let (mut ws, agreed) = connect(net.listen_addr(), Some("soap"));
    assert_eq!(agreed.as_deref(), Some("soap"));

    send(&mut ws, &ClientCommand::GetFiles);
    match read_server_message(&mut ws, || main_loop.tick(), Duration::from_secs(2)) {
        ServerMessage::Files(files) => assert!(files.contains(&"single.ogg".to_string())),
        other => panic!("expected files, got: {other:?}"),
    }

    send(
        &mut ws,
        &ClientCommand::Add {
            uri: "single.ogg".into(),
        },
    );
    match read_server_message(&mut ws, || main_loop.tick(), Duration::from_secs(2)) {
        ServerMessage::Playlist(tracks) => {
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].id, Some(1));
        }
        other => panic!("expected playlist, got: {other:?}"),
    }

    send(&mut ws, &ClientCommand::PlayId { id: 1 });
    send(&mut ws, &ClientCommand::Status);
    match read_server_message(&mut ws, || main_loop.tick(), Duration::from_secs(2)) {
        ServerMessage::Status(status) => {
            assert_eq!(status.state, PlaybackState::Play);
            assert_eq!(status.songid, Some(1));
            assert_eq!(status.progress(), Some((0, 180)));
        }
        other => panic!("expected status, got: {other:?}"),
    }

    // Garbage is ignored; the connection stays usable.
    ws.send(Message::Text("{not json".into())).unwrap();
    send(&mut ws, &ClientCommand::CurrentSong);
    match read_server_message(&mut ws, || main_loop.tick(), Duration::from_secs(2)) {
        ServerMessage::CurrentSong(track) => assert_eq!(track.file, "single.ogg"),
        other => panic!("expected current song, got: {other:?}"),
    }

    assert_eq!(log.lock().unwrap().len(), 5);
    net.shutdown();
}

#[test]
fn newest_client_replaces_previous_one() {
    let server = MockServer::start("127.0.0.1:0").expect("start server");

    let (mut first, _) = connect(server.addr(), None);
    let (mut second, agreed) = connect(server.addr(), None);
    assert_eq!(agreed, None);

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match first.read() {
            Ok(Message::Close(_)) | Err(tungstenite::Error::ConnectionClosed) => break,
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Ok(_) => {}
            Err(_) => break,
        }
        if Instant::now() >= deadline {
            panic!("first client was never closed");
        }
    }

    send(&mut second, &ClientCommand::Status);
    match read_server_message(&mut second, || {}, Duration::from_secs(2)) {
        ServerMessage::Status(status) => assert_eq!(status.state, PlaybackState::Stop),
        other => panic!("expected status, got: {other:?}"),
    }
    assert_eq!(server.accepted(), 2);
}
