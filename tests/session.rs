//! End-to-end session scenarios against scripted servers.

#![expect(clippy::unwrap_used, reason = "test code can panic")]

mod common;

use common::{accept_control, bind, read_tx, serve_login, test_config, write_event, write_reply};
use mxc::{
    field_id::FieldId,
    macroman,
    session::{
        DisconnectReason, ServerEvent, Session, SessionError, SessionStatus,
    },
    records::{FileInfo, FourCC},
    transaction::Params,
};

async fn next_non_status(events: &mut mxc::session::EventStream) -> Option<ServerEvent> {
    while let Some(event) = events.recv().await {
        if !matches!(event, ServerEvent::StatusChanged(_)) {
            return Some(event);
        }
    }
    None
}

#[tokio::test]
async fn login_success_reports_server_identity() {
    let (listener, port) = bind().await;
    let server = tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        let login = serve_login(&mut stream).await;
        let params = Params::decode(&login.payload).unwrap();
        assert_eq!(params.first_negated_str(FieldId::Login).as_deref(), Some("guest"));
        assert_eq!(params.first_negated_str(FieldId::Password).as_deref(), Some(""));
        assert_eq!(params.first_str(FieldId::UserName).as_deref(), Some("Alice"));
        assert_eq!(params.first_u16(FieldId::UserIconId), Some(414));
        assert_eq!(params.first_u16(FieldId::Version), Some(123));
        stream
    });

    let (session, mut events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    let info = session.login("guest", "", "Alice", 414).await.unwrap();
    assert_eq!(info.name.as_deref(), Some("Test"));
    assert_eq!(info.version, 151);
    assert_eq!(session.status(), SessionStatus::LoggedIn);

    let mut statuses = Vec::new();
    while statuses.last() != Some(&SessionStatus::LoggedIn) {
        match events.recv().await.unwrap() {
            ServerEvent::StatusChanged(status) => statuses.push(status),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(
        statuses,
        vec![
            SessionStatus::Connecting,
            SessionStatus::Handshaking,
            SessionStatus::Connected,
            SessionStatus::LoggingIn,
            SessionStatus::LoggedIn,
        ]
    );
    let _stream = server.await.unwrap();
}

#[tokio::test]
async fn login_failure_surfaces_error_text() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        let login = read_tx(&mut stream).await;
        write_reply(
            &mut stream,
            &login.header,
            1,
            &[(FieldId::ErrorText, b"Bad password".to_vec())],
        )
        .await;
        stream
    });

    let (session, _events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    let err = session.login("guest", "wrong", "Alice", 414).await.unwrap_err();
    match err {
        SessionError::LoginFailed(text) => assert_eq!(text.as_deref(), Some("Bad password")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.status(), SessionStatus::Connected);
}

#[tokio::test]
async fn handshake_refusal_reports_code() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut magic = [0u8; 12];
        stream.read_exact(&mut magic).await.unwrap();
        stream.write_all(b"TRTP\x00\x00\x00\x02").await.unwrap();
        stream
    });
    let err = Session::connect("127.0.0.1", port, test_config())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::Handshake(2)));
}

#[tokio::test]
async fn chat_round_trip_delivers_echo_in_order() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        let chat = read_tx(&mut stream).await;
        assert_eq!(chat.header.ty, 105);
        let params = Params::decode(&chat.payload).unwrap();
        assert_eq!(params.first_str(FieldId::Data).as_deref(), Some("hello"));
        write_event(
            &mut stream,
            106,
            &[(FieldId::Data, b" Alice:  hello".to_vec())],
        )
        .await;
        stream
    });

    let (session, mut events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    session.send_chat("hello", false).await.unwrap();
    assert_eq!(
        next_non_status(&mut events).await,
        Some(ServerEvent::ChatMessage(" Alice:  hello".to_owned()))
    );
}

#[tokio::test]
async fn file_listing_decodes_folder_and_file_records() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        let list = read_tx(&mut stream).await;
        assert_eq!(list.header.ty, 200);
        let docs = FileInfo {
            type_code: FourCC::FOLDER,
            creator: FourCC(*b"\0\0\0\0"),
            size: 3,
            name_script: 0,
            name: "Docs".to_owned(),
        };
        let readme = FileInfo {
            type_code: FourCC(*b"TEXT"),
            creator: FourCC(*b"ttxt"),
            size: 1234,
            name_script: 0,
            name: "readme.txt".to_owned(),
        };
        write_reply(
            &mut stream,
            &list.header,
            0,
            &[
                (FieldId::FileNameWithInfo, docs.encode()),
                (FieldId::FileNameWithInfo, readme.encode()),
            ],
        )
        .await;
        stream
    });

    let (session, _events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    let files = session.get_file_list(&[]).await.unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0].is_folder());
    assert_eq!(files[0].size, 3);
    assert_eq!(files[0].name, "Docs");
    assert_eq!(files[1].name, "readme.txt");
    assert_eq!(files[1].size, 1234);
    assert!(!files[1].is_folder());
}

#[tokio::test]
async fn admin_denial_keeps_session_alive() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        let delete = read_tx(&mut stream).await;
        assert_eq!(delete.header.ty, 351);
        let params = Params::decode(&delete.payload).unwrap();
        assert_eq!(params.first_negated_str(FieldId::Login).as_deref(), Some("ghost"));
        write_reply(
            &mut stream,
            &delete.header,
            1,
            &[(FieldId::ErrorText, b"Permission denied".to_vec())],
        )
        .await;
        stream
    });

    let (session, _events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    let err = session.delete_user("ghost").await.unwrap_err();
    match err {
        SessionError::Server { code, text } => {
            assert_eq!(code, 1);
            assert_eq!(text.as_deref(), Some("Permission denied"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.status(), SessionStatus::LoggedIn);
}

#[tokio::test]
async fn timeout_frees_the_slot_for_later_requests() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        // Swallow the first user-list request, answer the second.
        let _ignored = read_tx(&mut stream).await;
        let second = read_tx(&mut stream).await;
        write_reply(&mut stream, &second.header, 0, &[]).await;
        stream
    });

    let mut config = test_config();
    config.reply_timeout_seconds = 1;
    let (session, _events) = Session::connect("127.0.0.1", port, config).await.unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    let err = session.get_user_list().await.unwrap_err();
    assert!(matches!(err, SessionError::Timeout));
    let users = session.get_user_list().await.unwrap();
    assert!(users.is_empty());
}

#[tokio::test]
async fn agreement_event_honours_sentinel() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        write_event(
            &mut stream,
            109,
            &[(FieldId::NoServerAgreement, vec![1])],
        )
        .await;
        write_event(
            &mut stream,
            109,
            &[(FieldId::Data, macroman::encode_text("Be excellent\rto each other"))],
        )
        .await;
        stream
    });

    let (session, mut events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    assert_eq!(
        next_non_status(&mut events).await,
        Some(ServerEvent::AgreementRequired(
            "Be excellent\nto each other".to_owned()
        ))
    );
}

#[tokio::test]
async fn user_notifications_distinguish_join_change_leave() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        let joined = [
            (FieldId::UserId, 5u16.to_be_bytes().to_vec()),
            (FieldId::UserIconId, 128u16.to_be_bytes().to_vec()),
            (FieldId::UserFlags, 0u16.to_be_bytes().to_vec()),
            (FieldId::UserName, b"Bob".to_vec()),
        ];
        write_event(&mut stream, 301, &joined).await;
        write_event(&mut stream, 301, &joined).await;
        write_event(&mut stream, 302, &[(FieldId::UserId, 5u16.to_be_bytes().to_vec())]).await;
        stream
    });

    let (session, mut events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    assert!(matches!(
        next_non_status(&mut events).await,
        Some(ServerEvent::UserJoined(user)) if user.name == "Bob"
    ));
    assert!(matches!(
        next_non_status(&mut events).await,
        Some(ServerEvent::UserChanged(_))
    ));
    assert_eq!(
        next_non_status(&mut events).await,
        Some(ServerEvent::UserLeft(5))
    );
}

#[tokio::test]
async fn connection_loss_drains_pending_and_closes_stream() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        let _request = read_tx(&mut stream).await;
        drop(stream);
    });

    let (session, mut events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    let err = session.get_user_list().await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));

    let mut saw_disconnect = false;
    while let Some(event) = events.recv().await {
        if let ServerEvent::Disconnected(reason) = event {
            assert_eq!(reason, DisconnectReason::ConnectionLost);
            saw_disconnect = true;
        }
    }
    assert!(saw_disconnect);
    assert_eq!(session.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn local_disconnect_closes_stream_without_further_events() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        // Keep the socket open; the client is the one leaving.
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        drop(stream);
    });

    let (session, mut events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    session.disconnect().await;
    assert_eq!(session.status(), SessionStatus::Disconnected);
    let mut last = None;
    while let Some(event) = events.recv().await {
        last = Some(event);
    }
    assert_eq!(
        last,
        Some(ServerEvent::Disconnected(DisconnectReason::Local))
    );
    assert!(matches!(
        session.get_user_list().await.unwrap_err(),
        SessionError::NotConnected
    ));
}

#[tokio::test]
async fn server_disconnect_message_ends_the_session() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        write_event(
            &mut stream,
            111,
            &[(FieldId::Data, b"Going down for maintenance".to_vec())],
        )
        .await;
        stream
    });

    let (session, mut events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    let mut reason = None;
    while let Some(event) = events.recv().await {
        if let ServerEvent::Disconnected(r) = event {
            reason = Some(r);
        }
    }
    assert_eq!(
        reason,
        Some(DisconnectReason::ServerShutdown(Some(
            "Going down for maintenance".to_owned()
        )))
    );
    assert_eq!(session.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn operations_require_login() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let stream = accept_control(&listener).await;
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        drop(stream);
    });
    let (session, _events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    assert!(matches!(
        session.get_user_list().await.unwrap_err(),
        SessionError::NotConnected
    ));
    assert!(matches!(
        session.send_chat("hi", false).await.unwrap_err(),
        SessionError::NotConnected
    ));
}

#[tokio::test]
async fn broadcast_and_private_messages_are_classified() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        write_event(&mut stream, 104, &[(FieldId::Data, b"hi all".to_vec())]).await;
        write_event(
            &mut stream,
            104,
            &[
                (FieldId::UserId, 9u16.to_be_bytes().to_vec()),
                (FieldId::Data, b"psst".to_vec()),
            ],
        )
        .await;
        stream
    });

    let (session, mut events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    assert_eq!(
        next_non_status(&mut events).await,
        Some(ServerEvent::ServerBroadcast("hi all".to_owned()))
    );
    assert_eq!(
        next_non_status(&mut events).await,
        Some(ServerEvent::PrivateMessage {
            user_id: 9,
            text: "psst".to_owned()
        })
    );
}

#[tokio::test]
async fn download_request_returns_reference_and_size() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let mut stream = accept_control(&listener).await;
        serve_login(&mut stream).await;
        let request = read_tx(&mut stream).await;
        assert_eq!(request.header.ty, 202);
        write_reply(
            &mut stream,
            &request.header,
            0,
            &[
                (FieldId::ReferenceNumber, 42u32.to_be_bytes().to_vec()),
                (FieldId::TransferSize, 1234u32.to_be_bytes().to_vec()),
            ],
        )
        .await;
        stream
    });

    let (session, _events) = Session::connect("127.0.0.1", port, test_config())
        .await
        .unwrap();
    session.login("guest", "", "Alice", 414).await.unwrap();
    let reference = session
        .request_download_file("readme.txt", &[], false)
        .await
        .unwrap();
    assert_eq!(reference.reference, 42);
    assert_eq!(reference.size, 1234);
    assert_eq!(reference.item_count, None);
}
