//! Manager session tests against a scripted in-process manager server.
//!
//! Each test binds 127.0.0.1:0, accepts one connection and plays a fixed
//! script: banner, login exchange, then whatever the test needs.

use asterisk_agi_tokio::{
    AsteriskError, FrameReader, ManagerAction, ManagerFrame, ManagerOptions, ManagerSession,
    SessionState,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const BANNER: &str = "Asterisk Call Manager/7.0.3\r\n";

struct ScriptedPeer {
    stream: TcpStream,
    reader: FrameReader,
}

impl ScriptedPeer {
    async fn accept(listener: TcpListener) -> Self {
        let (stream, _) = listener
            .accept()
            .await
            .unwrap();
        Self {
            stream,
            reader: FrameReader::new(),
        }
    }

    async fn send(&mut self, text: &str) {
        self.stream
            .write_all(text.as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> ManagerFrame {
        self.reader
            .read_frame(&mut self.stream)
            .await
            .unwrap()
    }

    async fn login(&mut self, accept: bool) -> ManagerFrame {
        self.send(BANNER)
            .await;
        let login = self
            .recv()
            .await;
        let id = login
            .action_id()
            .unwrap()
            .to_string();
        let reply = if accept {
            format!(
                "Response: Success\r\nActionID: {}\r\nMessage: Authentication accepted\r\n\r\n",
                id
            )
        } else {
            format!(
                "Response: Error\r\nActionID: {}\r\nMessage: Authentication failed\r\n\r\n",
                id
            )
        };
        self.send(&reply)
            .await;
        login
    }
}

async fn spawn_peer<F, Fut, T>(script: F) -> (ManagerOptions, JoinHandle<T>)
where
    F: FnOnce(ScriptedPeer) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener
        .local_addr()
        .unwrap()
        .port();
    let handle = tokio::spawn(async move {
        let peer = ScriptedPeer::accept(listener).await;
        script(peer).await
    });
    let options = ManagerOptions::new("127.0.0.1", "admin", "amp111").with_port(port);
    (options, handle)
}

#[tokio::test]
async fn connect_login_and_logoff() {
    let (options, peer) = spawn_peer(|mut peer| async move {
        let login = peer
            .login(true)
            .await;
        let logoff = peer
            .recv()
            .await;
        peer.send(&format!(
            "Response: Goodbye\r\nActionID: {}\r\nMessage: Thanks for all the fish.\r\n\r\n",
            logoff
                .action_id()
                .unwrap()
        ))
        .await;
        (login, logoff)
    })
    .await;

    let mut session = ManagerSession::new(options);
    session
        .connect()
        .await
        .unwrap();
    assert!(session.is_logged_in());
    assert_eq!(session.banner(), Some("Asterisk Call Manager/7.0.3"));

    session
        .disconnect()
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);

    let (login, logoff) = peer
        .await
        .unwrap();
    assert_eq!(login.header("Username"), Some("admin"));
    assert_eq!(login.header("Secret"), Some("amp111"));
    assert_eq!(logoff.header("Action"), Some("Logoff"));
}

#[tokio::test]
async fn rejected_login_tears_down() {
    let (options, peer) = spawn_peer(|mut peer| async move {
        peer.login(false)
            .await;
    })
    .await;

    let mut session = ManagerSession::new(options);
    let err = session
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(err, AsteriskError::AuthenticationFailed { .. }));
    assert_eq!(err.to_string(), "Authentication failed: Authentication failed");
    assert_eq!(session.state(), SessionState::Disconnected);
    peer.await
        .unwrap();
}

#[tokio::test]
async fn connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener
        .local_addr()
        .unwrap()
        .port();
    drop(listener);

    let mut session =
        ManagerSession::new(ManagerOptions::new("127.0.0.1", "admin", "x").with_port(port));
    let err = session
        .connect()
        .await
        .unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn command_output_and_interleaved_events() {
    let (options, peer) = spawn_peer(|mut peer| async move {
        peer.login(true)
            .await;
        let command = peer
            .recv()
            .await;
        let id = command
            .action_id()
            .unwrap()
            .to_string();
        peer.send("Event: PeerStatus\r\nPeer: SIP/100\r\nPeerStatus: Registered\r\n\r\n")
            .await;
        peer.send(&format!(
            "Response: Follows\r\nPrivilege: Command\r\nActionID: {}\r\nSystem uptime: 1 hour, 2 minutes\n--END COMMAND--\r\n\r\n",
            id
        ))
        .await;
        command
    })
    .await;

    let peers = Arc::new(Mutex::new(Vec::new()));
    let sink = peers.clone();

    let mut session = ManagerSession::new(options);
    session.register_event_handler("peerstatus", move |_, frame, _, _| {
        sink.lock()
            .unwrap()
            .push(
                frame
                    .header("PeerStatus")
                    .unwrap_or("")
                    .to_string(),
            );
    });
    session
        .connect()
        .await
        .unwrap();

    let reply = session
        .send_action("Command", &[("Command", "core show uptime")])
        .await
        .unwrap();
    assert_eq!(reply.response(), Some("Follows"));
    assert_eq!(reply.data(), Some("System uptime: 1 hour, 2 minutes"));
    assert_eq!(
        *peers
            .lock()
            .unwrap(),
        vec!["Registered".to_string()]
    );

    let command = peer
        .await
        .unwrap();
    assert_eq!(command.header("Command"), Some("core show uptime"));
}

#[tokio::test]
async fn echoed_action_id_matches_regardless_of_parameter_order() {
    let (options, peer) = spawn_peer(|mut peer| async move {
        peer.login(true)
            .await;
        for _ in 0..2 {
            let action = peer
                .recv()
                .await;
            // Echo every header back, ActionID included, in reverse order.
            let mut reply = String::from("Response: Success\r\n");
            for (key, value) in action
                .headers()
                .iter()
                .rev()
            {
                reply.push_str(&format!("{}: {}\r\n", key, value));
            }
            reply.push_str("\r\n");
            peer.send(&reply)
                .await;
        }
    })
    .await;

    let mut session = ManagerSession::new(options);
    session
        .connect()
        .await
        .unwrap();

    let forward = session
        .send_request(
            ManagerAction::new("Setvar")
                .param("Variable", "FOO")
                .param("Value", "bar"),
        )
        .await
        .unwrap();
    let reverse = session
        .send_request(
            ManagerAction::new("Setvar")
                .param("Value", "bar")
                .param("Variable", "FOO"),
        )
        .await
        .unwrap();

    assert!(forward
        .action_id()
        .is_some());
    assert!(reverse
        .action_id()
        .is_some());
    assert_ne!(forward.action_id(), reverse.action_id());
    peer.await
        .unwrap();
}

#[tokio::test]
async fn event_list_with_list_valued_parameter() {
    let (options, peer) = spawn_peer(|mut peer| async move {
        peer.login(true)
            .await;
        let action = peer
            .recv()
            .await;
        let id = action
            .action_id()
            .unwrap()
            .to_string();
        peer.send(&format!(
            "Response: Success\r\nActionID: {id}\r\nEventList: start\r\nMessage: Queue status will follow\r\n\r\n"
        ))
        .await;
        peer.send(&format!(
            "Event: QueueMember\r\nActionID: {id}\r\nQueue: support\r\nName: SIP/100\r\n\r\n"
        ))
        .await;
        peer.send(&format!(
            "Event: QueueMember\r\nActionID: {id}\r\nQueue: support\r\nName: SIP/101\r\n\r\n"
        ))
        .await;
        peer.send(&format!(
            "Event: QueueStatusComplete\r\nActionID: {id}\r\nEventList: Complete\r\nListItems: 2\r\n\r\n"
        ))
        .await;
        action
    })
    .await;

    let mut session = ManagerSession::new(options);
    session
        .connect()
        .await
        .unwrap();

    let reply = session
        .send_request(
            ManagerAction::new("QueueStatus")
                .param("Queue", "support")
                .param_list("Variable", ["a=1", "b=2"]),
        )
        .await
        .unwrap();

    assert_eq!(reply.event_name(), Some("QueueStatusComplete"));
    let members: Vec<_> = reply
        .events()
        .iter()
        .filter_map(|e| e.header("Name"))
        .collect();
    assert_eq!(members, vec!["SIP/100", "SIP/101"]);

    let action = peer
        .await
        .unwrap();
    assert_eq!(action.header_values("Variable"), vec!["a=1", "b=2"]);
}

#[tokio::test]
async fn peer_closing_mid_wait_is_an_error() {
    let (options, peer) = spawn_peer(|mut peer| async move {
        peer.login(true)
            .await;
        let _ = peer
            .recv()
            .await;
        peer.send("Response: Success\r\nActionID: nope\r\n")
            .await;
    })
    .await;

    let mut session = ManagerSession::new(options);
    session
        .connect()
        .await
        .unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        session.send_action("Ping", &[]),
    )
    .await
    .expect("closed stream must end the wait");
    assert!(matches!(result, Err(AsteriskError::ConnectionClosed)));
    peer.await
        .unwrap();
}
